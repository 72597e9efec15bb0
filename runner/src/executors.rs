mod local;
mod mpi;
mod pbs;


pub use local::LocalExecutor;
pub use mpi::MpiExecutor;
pub use pbs::PbsExecutor;

use nix::sys::signal::Signal;
use std::{
    io,
    os::unix::process::ExitStatusExt,
    path::{Path, PathBuf},
    process::{Command, ExitStatus},
};
use thiserror::Error;
use tracing::{debug, error};

/// Shell used for every rendered command line
pub const DEFAULT_SHELL: &str = "/bin/sh";

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Failed to start {}", .program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to pipe the batch script into {}", .program.display())]
    Pipe {
        program: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Job failed with exit status {code}")]
    JobFailure { code: i32 },
}

impl ExecutorError {
    /// status the whole invocation should terminate with
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::JobFailure { code } => *code,
            Self::Spawn { .. } | Self::Pipe { .. } => 1,
        }
    }
}

/// Where the payload runs, independent of an optional batch wrapper
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    Local,
    Mpi(&'a MpiExecutor),
}

impl<'a> Target<'a> {
    pub fn mpi(&self) -> Option<&'a MpiExecutor> {
        match *self {
            Self::Local => None,
            Self::Mpi(mpi) => Some(mpi),
        }
    }
}

/// Run `command` through `shell -c` and block until it exits
pub(crate) fn run_shell(shell: &Path, command: &str) -> Result<(), ExecutorError> {
    debug!(shell = ?shell, command, "Spawning shell");

    let status = Command::new(shell)
        .arg("-c")
        .arg(command)
        .status()
        .map_err(|source| ExecutorError::Spawn {
            program: shell.to_path_buf(),
            source,
        })?;

    check_status(shell, status)
}

/// Map a finished child to success or a job failure carrying its exit code
pub(crate) fn check_status(program: &Path, status: ExitStatus) -> Result<(), ExecutorError> {
    if status.success() {
        return Ok(());
    }

    let code = match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => {
            match Signal::try_from(signal) {
                Ok(signal) => error!("{} was killed by {signal}", program.display()),
                Err(_) => error!("{} was killed by signal {signal}", program.display()),
            }

            128 + signal
        }
        (None, None) => 1,
    };

    error!("{} exited with status {code}", program.display());

    Err(ExecutorError::JobFailure { code })
}
