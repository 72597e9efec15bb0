use crate::{
    command::CommandLine,
    config::ConfigErrors,
    executors::{ExecutorError, LocalExecutor, MpiExecutor, PbsExecutor, Target},
    resources::ResourceRequest,
};
use std::io::{self, Write};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    Config(#[from] ConfigErrors),
    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

impl DispatchError {
    /// status the whole invocation should terminate with
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 1,
            Self::Executor(error) => error.exit_code(),
        }
    }

    pub fn is_job_failure(&self) -> bool {
        matches!(self, Self::Executor(ExecutorError::JobFailure { .. }))
    }
}

/// Runs command lines locally or through MPI, optionally wrapped into a PBS submission.
///
/// Every dispatch blocks until the job has completed. The rendered command is echoed to the
/// diagnostic sink (stderr by default) before it is executed.
pub struct Dispatcher {
    local: LocalExecutor,
    mpi: Option<MpiExecutor>,
    pbs: Option<PbsExecutor>,
    diagnostics: Box<dyn Write + Send>,
}

impl Dispatcher {
    pub fn new(mpi: Option<MpiExecutor>, pbs: Option<PbsExecutor>) -> Self {
        Self {
            local: LocalExecutor::new(),
            mpi,
            pbs,
            diagnostics: Box::new(io::stderr()),
        }
    }

    pub fn with_local(mut self, local: LocalExecutor) -> Self {
        self.local = local;
        self
    }

    pub fn with_diagnostics(mut self, sink: impl Write + Send + 'static) -> Self {
        self.diagnostics = Box::new(sink);
        self
    }

    pub fn mpi(&self) -> Option<&MpiExecutor> {
        self.mpi.as_ref()
    }

    pub fn pbs(&self) -> Option<&PbsExecutor> {
        self.pbs.as_ref()
    }

    /// run without MPI, through PBS when it is configured
    pub fn run(
        &mut self,
        command: &CommandLine,
        request: &ResourceRequest,
    ) -> Result<(), DispatchError> {
        let use_batch = self.pbs.is_some();
        self.dispatch(command, request, false, use_batch)
    }

    /// run through MPI, through PBS when it is configured
    pub fn mpirun(
        &mut self,
        command: &CommandLine,
        request: &ResourceRequest,
    ) -> Result<(), DispatchError> {
        let use_batch = self.pbs.is_some();
        self.dispatch(command, request, true, use_batch)
    }

    pub fn dispatch(
        &mut self,
        command: &CommandLine,
        request: &ResourceRequest,
        use_mpi: bool,
        use_batch: bool,
    ) -> Result<(), DispatchError> {
        let target = if use_mpi {
            Target::Mpi(self.mpi.as_ref().ok_or(ConfigErrors::NoMpiConfigured)?)
        } else {
            Target::Local
        };
        let batch = if use_batch {
            Some(self.pbs.as_ref().ok_or(ConfigErrors::NoBatchConfigured)?)
        } else {
            None
        };

        request.validate()?;
        echo(self.diagnostics.as_mut(), command, request);

        info!(
            job = %request.job_name,
            mpi = use_mpi,
            batch = use_batch,
            "Dispatching job"
        );

        match (target, batch) {
            (target, Some(pbs)) => pbs.submit(command, request, target.mpi())?,
            (Target::Mpi(mpi), None) => mpi.run(command, request.log_path.as_deref())?,
            (Target::Local, None) => self.local.run(command, request.log_path.as_deref())?,
        }

        Ok(())
    }
}

/// auditable record of what is about to run
fn echo(sink: &mut dyn Write, command: &CommandLine, request: &ResourceRequest) {
    let line = format!("{command}{}", request.redirection());

    if let Err(error) = writeln!(sink, "{line}").and_then(|_| sink.flush()) {
        warn!(error = ?error, "Failed to echo command: {line}");
    }
}
