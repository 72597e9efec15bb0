use crate::{command::stderr_redirection, config::ConfigErrors};
use std::{
    fmt::{self, Display},
    path::PathBuf,
};

/// Memory ceiling in the largest unit that keeps it a non-zero integer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryLimit {
    Gigabytes(u64),
    Megabytes(u64),
    Kilobytes(u64),
}

impl MemoryLimit {
    /// Convert a fractional GB amount, values are truncated and never rounded up.
    /// Anything below one KB (including 0) means "unconstrained".
    pub fn from_gb(memory: f64) -> Option<Self> {
        if memory >= 1.0 {
            Some(Self::Gigabytes(memory as u64))
        } else if memory >= 0.001 {
            Some(Self::Megabytes((memory * 1000.0) as u64))
        } else if memory >= 0.000001 {
            Some(Self::Kilobytes((memory * 1000.0 * 1000.0) as u64))
        } else {
            None
        }
    }
}

impl Display for MemoryLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gigabytes(value) => write!(f, "{value}gb"),
            Self::Megabytes(value) => write!(f, "{value}mb"),
            Self::Kilobytes(value) => write!(f, "{value}kb"),
        }
    }
}

/// Resources associated with one dispatched job
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRequest {
    pub threads: u32,
    /// fractional GB, 0 means unspecified
    pub memory_gb: f64,
    /// stderr of the job is redirected here when set
    pub log_path: Option<PathBuf>,
    pub job_name: String,
}

impl Default for ResourceRequest {
    fn default() -> Self {
        Self {
            threads: 1,
            memory_gb: 0.0,
            log_path: None,
            job_name: "name".to_owned(),
        }
    }
}

impl ResourceRequest {
    pub fn new(job_name: impl Into<String>) -> Self {
        Self {
            job_name: job_name.into(),
            ..Self::default()
        }
    }

    pub fn threads(mut self, threads: u32) -> Self {
        self.threads = threads;
        self
    }

    pub fn memory(mut self, memory_gb: f64) -> Self {
        self.memory_gb = memory_gb;
        self
    }

    pub fn log(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    pub fn validate(&self) -> Result<(), ConfigErrors> {
        if self.threads == 0 {
            return Err(ConfigErrors::InvalidThreads);
        }
        if !self.memory_gb.is_finite() || self.memory_gb < 0.0 {
            return Err(ConfigErrors::InvalidMemory(self.memory_gb));
        }

        Ok(())
    }

    pub fn memory_limit(&self) -> Option<MemoryLimit> {
        MemoryLimit::from_gb(self.memory_gb)
    }

    /// PBS `select` value: `chunks` chunks of `threads` CPUs each, one MPI rank per chunk
    pub fn select_clause(&self, chunks: u32) -> String {
        let mut clause = format!(
            "select={}:ncpus={}:mpiprocs=1",
            chunks.max(1),
            self.threads
        );

        if let Some(limit) = self.memory_limit() {
            clause.push_str(&format!(":mem={limit}"));
        }

        clause
    }

    /// shell suffix sending stderr to the log file, empty without one
    pub fn redirection(&self) -> String {
        stderr_redirection(self.log_path.as_deref())
    }
}
