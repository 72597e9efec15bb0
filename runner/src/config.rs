use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File},
    io::Error,
    os::unix::fs::MetadataExt,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{error, warn};

/// PBS silently truncates job names longer than this
pub const PBS_NAME_LIMIT: usize = 15;

// check if a file is executable
pub fn check_executable(path: &Path) -> Result<bool, ConfigErrors> {
    if !path.is_file() {
        Err(ConfigErrors::FileNotFound(path.to_path_buf()))
    } else {
        match File::open(path).map(|file| file.metadata()) {
            Ok(Ok(metadata)) => Ok((metadata.mode() & 0o111) != 0),
            Ok(Err(e)) | Err(e) => Err(ConfigErrors::MetadataNotFound(e)),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("No {0} in the executable search path")]
    ExecutableNotFound(String),
    #[error("No openmpirun nor mpirun found")]
    MpiLauncherNotFound,
    #[error("{} does not exist", .0.display())]
    DirectoryNotFound(PathBuf),
    #[error("{} does not exist", .0.display())]
    FileNotFound(PathBuf),
    #[error("Metadata not found")]
    MetadataNotFound(#[from] Error),
    #[error("Thread count must be at least 1")]
    InvalidThreads,
    #[error("Memory must be a non-negative number of GB, got {0}")]
    InvalidMemory(f64),
    #[error("No MPI configured")]
    NoMpiConfigured,
    #[error("No batch system configured")]
    NoBatchConfigured,
    #[error("Failed to parse configuration file")]
    InvalidConfigFile(#[from] serde_yaml::Error),
    #[error("Configuration contains errors, see log above")]
    FailedPreflight,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RunnerConfig {
    // directory of the toolkit install, resolved next to the executable when missing
    #[serde(default)]
    pub toolkit_dir: Option<PathBuf>,
    #[serde(default)]
    pub resources: ResourceConfig,
    #[serde(default)]
    pub mpi: MpiConfig,
    #[serde(default)]
    pub pbs: PbsConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ResourceConfig {
    #[serde(default = "default_threads")]
    pub threads: u32,
    // maximum memory in GB
    #[serde(default = "default_max_malloc")]
    pub max_malloc: f64,
    pub logfile: Option<PathBuf>,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            max_malloc: default_max_malloc(),
            logfile: None,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MpiConfig {
    // install directory of a non-standard MPI implementation
    pub dir: Option<PathBuf>,
    // identical to --np for mpirun, 0 lets the launcher decide
    #[serde(default, alias = "np")]
    pub processes: u32,
    // identical to --host for mpirun
    pub hosts: Option<String>,
    // identical to --hostfile for mpirun
    pub hosts_file: Option<PathBuf>,
    #[serde(default)]
    pub options: String,
}

impl MpiConfig {
    /// MPI is used as soon as any placement information is given
    pub fn is_requested(&self) -> bool {
        self.processes > 0
            || self.hosts.as_deref().is_some_and(|hosts| !hosts.is_empty())
            || self.hosts_file.is_some()
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PbsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_pbs_name")]
    pub name: String,
    pub queue: Option<String>,
}

impl Default for PbsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            name: default_pbs_name(),
            queue: None,
        }
    }
}

impl RunnerConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigErrors> {
        if !path.is_file() {
            return Err(ConfigErrors::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;

        Ok(serde_yaml::from_str(&content)?)
    }

    /// Validate the merged configuration, reporting every problem before failing
    pub fn preflight_checks(&self) -> Result<(), ConfigErrors> {
        // attempt to catch all errors instead of piece-by-piece to make debugging easier for users
        let mut contains_error = false;

        if self.resources.threads == 0 {
            error!("resources.threads must be at least 1");
            contains_error = true;
        }

        if !self.resources.max_malloc.is_finite() || self.resources.max_malloc < 0.0 {
            error!(
                "resources.max_malloc must be a non-negative number of GB, got {}",
                self.resources.max_malloc
            );
            contains_error = true;
        }

        if let Some(ref dir) = self.toolkit_dir {
            if !dir.is_dir() {
                error!("toolkit_dir {} does not exist", dir.display());
                contains_error = true;
            }
        }

        if let Some(ref dir) = self.mpi.dir {
            if !dir.is_dir() {
                error!("mpi.dir {} does not exist", dir.display());
                contains_error = true;
            }
        }

        if let Some(ref hosts_file) = self.mpi.hosts_file {
            if !hosts_file.exists() {
                error!("mpi.hosts_file {} does not exist", hosts_file.display());
                contains_error = true;
            }
        }

        if self.mpi.hosts.is_some() && self.mpi.hosts_file.is_some() {
            warn!("Both mpi.hosts and mpi.hosts_file are set, the explicit host list wins");
        }

        if self.pbs.name.len() > PBS_NAME_LIMIT {
            warn!(
                "pbs.name '{}' is longer than {PBS_NAME_LIMIT} characters and will be truncated by PBS",
                self.pbs.name
            );
        }

        if self.pbs.enabled && self.pbs.name.is_empty() {
            error!("pbs.name cannot be empty when submitting through PBS");
            contains_error = true;
        }

        if contains_error {
            Err(ConfigErrors::FailedPreflight)
        } else {
            Ok(())
        }
    }
}

fn default_threads() -> u32 {
    1
}

fn default_max_malloc() -> f64 {
    4.0
}

fn default_pbs_name() -> String {
    "cicada-pipe".to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    pub fn parse_full_config() {
        let config: RunnerConfig = serde_yaml::from_str(
            r#"
toolkit_dir: /opt/cicada
resources:
  threads: 8
  max_malloc: 16.5
  logfile: run.log
mpi:
  np: 4
  hosts: "a,b"
  options: "--bind-to none"
pbs:
  enabled: true
  queue: long
"#,
        )
        .unwrap();

        assert_eq!(config.toolkit_dir, Some(PathBuf::from("/opt/cicada")));
        assert_eq!(config.resources.threads, 8);
        assert_eq!(config.resources.max_malloc, 16.5);
        assert_eq!(config.mpi.processes, 4);
        assert_eq!(config.mpi.options, "--bind-to none");
        assert!(config.mpi.is_requested());
        assert!(config.pbs.enabled);
        assert_eq!(config.pbs.name, "cicada-pipe");
        assert_eq!(config.pbs.queue.as_deref(), Some("long"));
    }

    #[test]
    pub fn defaults_when_empty() {
        let config: RunnerConfig = serde_yaml::from_str("{}").unwrap();

        assert_eq!(config, RunnerConfig::default());
        assert_eq!(config.resources.threads, 1);
        assert_eq!(config.resources.max_malloc, 4.0);
        assert!(!config.mpi.is_requested());
        assert!(!config.pbs.enabled);
    }

    #[test]
    pub fn unknown_fields_are_rejected() {
        assert!(serde_yaml::from_str::<RunnerConfig>("executor: local").is_err());
        assert!(serde_yaml::from_str::<RunnerConfig>("mpi:\n  nodes: 3").is_err());
    }

    #[test]
    pub fn preflight_reports_invalid_values() {
        let mut config = RunnerConfig::default();
        config.resources.threads = 0;
        config.mpi.dir = Some(PathBuf::from("/nonexistent/mpi/dir"));

        assert!(matches!(
            config.preflight_checks(),
            Err(ConfigErrors::FailedPreflight)
        ));

        let mut config = RunnerConfig::default();
        config.resources.max_malloc = -2.0;
        assert!(config.preflight_checks().is_err());

        assert!(RunnerConfig::default().preflight_checks().is_ok());
    }

    #[test]
    pub fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "pbs:\n  enabled: true\n  name: learn").unwrap();

        let config = RunnerConfig::from_file(file.path()).unwrap();
        assert!(config.pbs.enabled);
        assert_eq!(config.pbs.name, "learn");

        assert!(matches!(
            RunnerConfig::from_file(Path::new("/nonexistent/config.yaml")),
            Err(ConfigErrors::FileNotFound(_))
        ));
    }

    #[test]
    pub fn executable_bits_are_checked() {
        let dir = tempfile::tempdir().unwrap();
        let script = crate::test_utils::write_script(dir.path(), "tool", "exit 0");
        let plain = dir.path().join("plain");
        fs::write(&plain, "data").unwrap();

        assert!(check_executable(&script).unwrap());
        assert!(!check_executable(&plain).unwrap());
        assert!(check_executable(&dir.path().join("missing")).is_err());
    }
}
