use super::{run_shell, ExecutorError, DEFAULT_SHELL};
use crate::command::{stderr_redirection, CommandLine};
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

/// Executor running a command line synchronously in the current environment
#[derive(Debug, Clone)]
pub struct LocalExecutor {
    shell: PathBuf,
}

impl Default for LocalExecutor {
    fn default() -> Self {
        Self {
            shell: PathBuf::from(DEFAULT_SHELL),
        }
    }
}

impl LocalExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shell(shell: impl Into<PathBuf>) -> Self {
        Self {
            shell: shell.into(),
        }
    }

    pub fn shell(&self) -> &Path {
        &self.shell
    }

    /// the shell command, with stderr sent to `log_path` when given
    pub fn invocation(&self, command: &CommandLine, log_path: Option<&Path>) -> String {
        format!("{}{}", command.render(), stderr_redirection(log_path))
    }

    /// execute the command and block until it exits
    #[instrument(skip(self, command), level = "info")]
    pub fn run(&self, command: &CommandLine, log_path: Option<&Path>) -> Result<(), ExecutorError> {
        let invocation = self.invocation(command, log_path);

        run_shell(&self.shell, &invocation)?;
        info!("Local job finished");

        Ok(())
    }
}
