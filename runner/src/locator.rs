use crate::config::{check_executable, ConfigErrors};
use std::{
    env,
    fs,
    path::{Path, PathBuf},
};
use tracing::debug;

/// Executable search over explicit directories followed by the captured `PATH`
#[derive(Debug, Clone, Default)]
pub struct Locator {
    paths: Vec<PathBuf>,
}

impl Locator {
    /// search only the `PATH` of the current process
    pub fn from_env() -> Self {
        Self {
            paths: env::var_os("PATH")
                .map(|paths| env::split_paths(&paths).collect())
                .unwrap_or_default(),
        }
    }

    /// search exactly the given directories
    pub fn new(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            paths: paths.into_iter().collect(),
        }
    }

    /// a locator that looks into `dirs` before any directory already known
    pub fn prepend(&self, dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        let mut paths: Vec<PathBuf> = dirs.into_iter().collect();
        paths.extend(self.paths.iter().cloned());

        Self { paths }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn find(&self, name: &str) -> Option<PathBuf> {
        let candidate = Path::new(name);

        // names with a directory component are never searched
        if candidate.components().count() > 1 {
            return is_executable(candidate).then(|| candidate.to_path_buf());
        }

        let found = self
            .paths
            .iter()
            .map(|dir| dir.join(name))
            .find(|path| is_executable(path));

        debug!(name, found = ?found, "Executable lookup");

        found
    }

    pub fn require(&self, name: &str) -> Result<PathBuf, ConfigErrors> {
        self.find(name)
            .ok_or_else(|| ConfigErrors::ExecutableNotFound(name.to_owned()))
    }
}

fn is_executable(path: &Path) -> bool {
    check_executable(path).unwrap_or(false)
}

/// Canonical form of a directory that has to exist
pub fn existing_dir(dir: &Path) -> Result<PathBuf, ConfigErrors> {
    if !dir.is_dir() {
        return Err(ConfigErrors::DirectoryNotFound(dir.to_path_buf()));
    }

    Ok(fs::canonicalize(dir)?)
}

/// Canonical form of a file that has to exist
pub fn existing_file(path: &Path) -> Result<PathBuf, ConfigErrors> {
    if !path.exists() {
        return Err(ConfigErrors::FileNotFound(path.to_path_buf()));
    }

    Ok(fs::canonicalize(path)?)
}

/// Launcher helpers shipped with the toolkit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolkit {
    /// MPI based pipe runner
    pub mpipe: PathBuf,
    /// thread based pipe runner
    pub thrpe: PathBuf,
}

impl Toolkit {
    const SUBDIRS: [&'static str; 3] = ["bin", "progs", "scripts"];

    /// Resolve the helpers below `dir`, or next to the running executable when no directory is
    /// given.
    pub fn locate(dir: Option<&Path>, locator: &Locator) -> Result<Self, ConfigErrors> {
        let dirs = match dir {
            Some(dir) => {
                let dir = existing_dir(dir)?;
                let mut dirs = vec![dir.clone()];
                dirs.extend(Self::subdirs(&dir));
                dirs
            }
            None => {
                let exe = env::current_exe()?;
                let mut dirs = Vec::new();

                if let Some(exe_dir) = exe.parent() {
                    dirs.push(exe_dir.to_path_buf());
                    let root = exe_dir.parent().unwrap_or(exe_dir);
                    dirs.extend(Self::subdirs(root));
                }

                dirs
            }
        };

        Self::search(&locator.prepend(dirs))
    }

    fn subdirs(root: &Path) -> impl Iterator<Item = PathBuf> + '_ {
        Self::SUBDIRS
            .into_iter()
            .map(move |subdir| root.join(subdir))
            .filter(|path| path.is_dir())
    }

    fn search(locator: &Locator) -> Result<Self, ConfigErrors> {
        Ok(Self {
            mpipe: locator.require("mpipe")?,
            thrpe: locator.require("thrpe")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::write_script;

    #[test]
    pub fn find_prefers_earlier_directories() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        write_script(second.path(), "mpirun", "exit 0");
        let expected = write_script(first.path(), "mpirun", "exit 0");

        let locator = Locator::new([first.path().to_path_buf(), second.path().to_path_buf()]);
        assert_eq!(locator.find("mpirun"), Some(expected));
        assert_eq!(locator.find("openmpirun"), None);
    }

    #[test]
    pub fn find_skips_non_executable_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("qsub"), "not a program").unwrap();

        let locator = Locator::new([dir.path().to_path_buf()]);
        assert_eq!(locator.find("qsub"), None);
        assert!(matches!(
            locator.require("qsub"),
            Err(ConfigErrors::ExecutableNotFound(name)) if name == "qsub"
        ));
    }

    #[test]
    pub fn explicit_paths_are_not_searched() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "tool", "exit 0");

        let locator = Locator::default();
        assert_eq!(locator.find(script.to_str().unwrap()), Some(script));
        assert_eq!(locator.find("tool"), None);
    }

    #[test]
    pub fn toolkit_searches_known_subdirectories() {
        let root = tempfile::tempdir().unwrap();
        let progs = root.path().join("progs");
        let scripts = root.path().join("scripts");
        fs::create_dir(&progs).unwrap();
        fs::create_dir(&scripts).unwrap();
        write_script(&progs, "mpipe", "exit 0");
        write_script(&scripts, "thrpe", "exit 0");

        let toolkit = Toolkit::locate(Some(root.path()), &Locator::default()).unwrap();
        let root = fs::canonicalize(root.path()).unwrap();

        assert_eq!(toolkit.mpipe, root.join("progs").join("mpipe"));
        assert_eq!(toolkit.thrpe, root.join("scripts").join("thrpe"));
    }

    #[test]
    pub fn toolkit_requires_existing_directory() {
        assert!(matches!(
            Toolkit::locate(Some(Path::new("/nonexistent/toolkit")), &Locator::default()),
            Err(ConfigErrors::DirectoryNotFound(_))
        ));
    }

    #[test]
    pub fn toolkit_requires_both_helpers() {
        let root = tempfile::tempdir().unwrap();
        write_script(root.path(), "thrpe", "exit 0");

        assert!(matches!(
            Toolkit::locate(Some(root.path()), &Locator::default()),
            Err(ConfigErrors::ExecutableNotFound(name)) if name == "mpipe"
        ));
    }
}
