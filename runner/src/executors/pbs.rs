use super::{check_status, ExecutorError, MpiExecutor, DEFAULT_SHELL};
use crate::{
    command::CommandLine,
    config::{ConfigErrors, PBS_NAME_LIMIT},
    environment::Environment,
    locator::Locator,
    resources::ResourceRequest,
};
use std::{
    io::Write,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};
use tracing::{debug, info, instrument, warn};

/// Executor submitting jobs to PBS and blocking until they finish
#[derive(Debug, Clone)]
pub struct PbsExecutor {
    qsub: PathBuf,
    queue: Option<String>,
    environment: Environment,
}

impl PbsExecutor {
    /// `qsub` has to be resolvable, there is no fallback to local execution
    pub fn load(
        queue: Option<String>,
        locator: &Locator,
        environment: Environment,
    ) -> Result<Self, ConfigErrors> {
        let qsub = locator.require("qsub")?;
        debug!(qsub = ?qsub, "Resolved PBS submitter");

        Ok(Self::new(qsub, queue, environment))
    }

    pub fn new(qsub: PathBuf, queue: Option<String>, environment: Environment) -> Self {
        Self {
            qsub,
            queue: queue.filter(|queue| !queue.is_empty()),
            environment,
        }
    }

    pub fn qsub(&self) -> &Path {
        &self.qsub
    }

    /// Generate the job script for `command`, wrapped into the MPI launcher when `mpi` is given
    pub fn script(
        &self,
        command: &CommandLine,
        request: &ResourceRequest,
        mpi: Option<&MpiExecutor>,
    ) -> Vec<u8> {
        let mut header = String::new();

        header.push_str(&format!("#!{DEFAULT_SHELL}\n"));
        header.push_str(&format!("#PBS -S {DEFAULT_SHELL}\n"));
        header.push_str(&format!("#PBS -N {}\n", request.job_name));
        // qsub returns only once the job has finished
        header.push_str("#PBS -W block=true\n");
        header.push_str("#PBS -e localhost:/dev/null\n");
        header.push_str("#PBS -o localhost:/dev/null\n");

        if let Some(ref queue) = self.queue {
            header.push_str(&format!("#PBS -q {queue}\n"));
        }

        let chunks = mpi.map_or(1, MpiExecutor::processes);
        header.push_str(&format!("#PBS -l {}\n", request.select_clause(chunks)));

        // jobs start in a sanitized environment, values may not be UTF-8
        let mut script = header.into_bytes();
        script.extend(self.environment.shell_exports());

        let mut body = String::new();
        body.push_str("if test \"$PBS_O_WORKDIR\" != \"\"; then\n");
        body.push_str("  cd \"$PBS_O_WORKDIR\"\n");
        body.push_str("fi\n");

        let payload = match mpi {
            Some(mpi) => format!("{} {}", mpi.prefix(), command),
            None => command.render(),
        };
        body.push_str(&format!("{payload}{}\n", request.redirection()));

        script.extend_from_slice(body.as_bytes());
        script
    }

    /// pipe the generated script into `qsub` and wait for the job to complete
    #[instrument(skip_all, fields(job = %request.job_name), level = "info")]
    pub fn submit(
        &self,
        command: &CommandLine,
        request: &ResourceRequest,
        mpi: Option<&MpiExecutor>,
    ) -> Result<(), ExecutorError> {
        if request.job_name.len() > PBS_NAME_LIMIT {
            warn!(
                "Job name '{}' exceeds {PBS_NAME_LIMIT} characters and will be truncated by PBS",
                request.job_name
            );
        }

        let script = self.script(command, request, mpi);
        debug!("Submitting batch script:\n{}", String::from_utf8_lossy(&script));

        let mut child = Command::new(&self.qsub)
            .args(["-S", DEFAULT_SHELL])
            .stdin(Stdio::piped())
            .spawn()
            .map_err(|source| ExecutorError::Spawn {
                program: self.qsub.clone(),
                source,
            })?;

        // Dropping stdin closes the pipe, qsub reads until end of input
        let written = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(&script),
            None => Ok(()),
        };

        let status = child.wait().map_err(|source| ExecutorError::Spawn {
            program: self.qsub.clone(),
            source,
        })?;

        // a submitter that gave up early reports its own status
        check_status(&self.qsub, status)?;
        written.map_err(|source| ExecutorError::Pipe {
            program: self.qsub.clone(),
            source,
        })?;
        info!("Batch job finished");

        Ok(())
    }
}
