//! Shell invocation descriptors.

use std::{ffi::OsStr, fmt, path::Path};

use serde::{Deserialize, Serialize};

/// Executable and arguments used to launch one session's shell.
///
/// Resolved once when a session is created and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellSpec {
    pub executable: String,
    pub args: Vec<String>,
}

impl ShellSpec {
    #[must_use]
    pub fn new<S, I>(executable: S, args: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            executable: executable.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Classify the executable for title heuristics.
    #[must_use]
    pub fn kind(&self) -> ShellKind {
        ShellKind::from_executable(&self.executable)
    }
}

impl fmt::Display for ShellSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.executable)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Shell family, as far as title filtering cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShellKind {
    Zsh,
    Bash,
    Other,
}

impl ShellKind {
    /// Classify by the executable's file stem, so `bash.exe` is `Bash`.
    #[must_use]
    pub fn from_executable(executable: &str) -> Self {
        let stem = Path::new(executable)
            .file_stem()
            .and_then(OsStr::to_str)
            .unwrap_or(executable)
            .to_ascii_lowercase();

        if stem.ends_with("zsh") {
            Self::Zsh
        } else if stem.ends_with("bash") {
            Self::Bash
        } else {
            Self::Other
        }
    }
}
