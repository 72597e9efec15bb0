use std::{
    collections::BTreeMap,
    env,
    ffi::{OsStr, OsString},
    os::unix::ffi::OsStrExt,
};

/// Variables re-exported into MPI ranks and batch jobs when set in the invoking environment
pub const FORWARDED_VARIABLES: [&str; 3] = ["TMPDIR_SPEC", "LD_LIBRARY_PATH", "DYLD_LIBRARY_PATH"];

/// Snapshot of the allow-listed environment variables, taken once and handed to every backend
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    variables: BTreeMap<&'static str, OsString>,
}

impl Environment {
    /// read the allow-listed variables from the current process
    pub fn capture() -> Self {
        Self::from_lookup(|name| env::var_os(name))
    }

    /// build a snapshot from any source, variables outside the allow-list are ignored
    pub fn from_lookup<F>(mut lookup: F) -> Self
    where
        F: FnMut(&str) -> Option<OsString>,
    {
        Self {
            variables: FORWARDED_VARIABLES
                .iter()
                .filter_map(|name| lookup(*name).map(|value| (*name, value)))
                .collect(),
        }
    }

    pub fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let pairs: BTreeMap<&str, &str> = pairs.into_iter().collect();

        Self::from_lookup(|name| pairs.get(name).map(OsString::from))
    }

    /// present variables, in allow-list order
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &OsString)> + '_ {
        FORWARDED_VARIABLES
            .iter()
            .filter_map(|name| self.variables.get(name).map(|value| (*name, value)))
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// `-x NAME` for every present variable, Open MPI syntax
    pub fn mpi_exports(&self) -> Vec<String> {
        self.iter()
            .flat_map(|(name, _)| ["-x".to_owned(), name.to_owned()])
            .collect()
    }

    /// `export NAME='value'` lines for a POSIX shell script, values are passed through verbatim
    pub fn shell_exports(&self) -> Vec<u8> {
        let mut exports = Vec::new();

        for (name, value) in self.iter() {
            exports.extend_from_slice(format!("export {name}=").as_bytes());
            exports.extend(single_quote(value));
            exports.push(b'\n');
        }

        exports
    }
}

/// single-quoted shell word, embedded `'` become `'\''`
fn single_quote(value: &OsStr) -> Vec<u8> {
    let mut quoted = Vec::with_capacity(value.len() + 2);
    quoted.push(b'\'');

    for &byte in value.as_bytes() {
        if byte == b'\'' {
            quoted.extend_from_slice(b"'\\''");
        } else {
            quoted.push(byte);
        }
    }

    quoted.push(b'\'');
    quoted
}
