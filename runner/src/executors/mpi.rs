use super::{run_shell, ExecutorError, DEFAULT_SHELL};
use crate::{
    command::{stderr_redirection, CommandLine, Token, Value},
    config::{ConfigErrors, MpiConfig},
    environment::Environment,
    locator::{existing_dir, existing_file, Locator},
};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// Launcher names tried in order
const LAUNCHERS: [&str; 2] = ["openmpirun", "mpirun"];

/// Executor wrapping command lines into an MPI launcher invocation
#[derive(Debug, Clone)]
pub struct MpiExecutor {
    launcher: PathBuf,
    // 0 lets the launcher decide
    processes: u32,
    hosts: Option<String>,
    hosts_file: Option<PathBuf>,
    // appended verbatim
    options: String,
    environment: Environment,
    shell: PathBuf,
}

impl MpiExecutor {
    /// Validate the MPI setup and resolve the launcher, `locator` is searched after `config.dir`
    pub fn load(
        config: &MpiConfig,
        locator: &Locator,
        environment: Environment,
    ) -> Result<Self, ConfigErrors> {
        let mut dirs = Vec::new();

        if let Some(ref dir) = config.dir {
            let dir = existing_dir(dir)?;
            dirs.push(dir.join("bin"));
            dirs.push(dir);
        }

        let hosts_file = config
            .hosts_file
            .as_deref()
            .map(existing_file)
            .transpose()?;

        let locator = locator.prepend(dirs);
        let launcher = LAUNCHERS
            .iter()
            .find_map(|name| locator.find(name))
            .ok_or(ConfigErrors::MpiLauncherNotFound)?;

        debug!(launcher = ?launcher, "Resolved MPI launcher");

        Ok(Self {
            launcher,
            processes: config.processes,
            hosts: config.hosts.clone().filter(|hosts| !hosts.is_empty()),
            hosts_file,
            options: config.options.clone(),
            environment,
            shell: PathBuf::from(DEFAULT_SHELL),
        })
    }

    pub fn with_shell(mut self, shell: impl Into<PathBuf>) -> Self {
        self.shell = shell.into();
        self
    }

    pub fn launcher(&self) -> &Path {
        &self.launcher
    }

    pub fn processes(&self) -> u32 {
        self.processes
    }

    /// Launcher, environment forwarding and extra options.
    ///
    /// Placement flags are left out, the batch system decides placement for submitted jobs.
    pub fn prefix(&self) -> CommandLine {
        let mut command = CommandLine::new(self.launcher.display());
        self.append_forwarding(&mut command);
        command
    }

    /// full launcher invocation for `command`, run outside of a batch system
    pub fn invocation(&self, command: &CommandLine, log_path: Option<&Path>) -> String {
        let mut mpirun = CommandLine::new(self.launcher.display());

        if self.processes > 0 {
            mpirun.append(Token::option("--np", self.processes));
        }

        if let Some(ref hosts) = self.hosts {
            mpirun.append(Token::option("--host", hosts.as_str()));
        } else if let Some(ref hosts_file) = self.hosts_file {
            mpirun.append(Token::option(
                "--hostfile",
                Value::quoted(hosts_file.display()),
            ));
        }

        self.append_forwarding(&mut mpirun);
        mpirun.append(command.render());

        format!("{mpirun}{}", stderr_redirection(log_path))
    }

    fn append_forwarding(&self, command: &mut CommandLine) {
        command.extend(self.environment.mpi_exports());

        if !self.options.trim().is_empty() {
            command.append(self.options.as_str());
        }
    }

    /// launch the command through MPI and block until every rank exits
    #[instrument(skip(self, command), level = "info")]
    pub fn run(&self, command: &CommandLine, log_path: Option<&Path>) -> Result<(), ExecutorError> {
        let invocation = self.invocation(command, log_path);

        run_shell(&self.shell, &invocation)?;
        info!("MPI job finished");

        Ok(())
    }
}
