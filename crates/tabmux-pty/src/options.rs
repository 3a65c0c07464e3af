//! Spawn configuration for PTY sessions.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tabmux_core::{TerminalSize, events::DEFAULT_CAPACITY};

/// How a session's pseudo-terminal and shell are set up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnOptions {
    /// Initial width in columns.
    pub cols: u16,
    /// Initial height in rows.
    pub rows: u16,
    /// Working directory. `None` means the user's home directory.
    pub cwd: Option<PathBuf>,
    /// Value of `TERM` in the child environment.
    pub term: String,
    /// Size of a single PTY read.
    pub read_buffer: usize,
    /// Events buffered per subscriber before the oldest are dropped.
    pub event_capacity: usize,
}

impl Default for SpawnOptions {
    fn default() -> Self {
        Self {
            cols: 80,
            rows: 30,
            cwd: None,
            term: "xterm-256color".to_string(),
            read_buffer: 8192,
            event_capacity: DEFAULT_CAPACITY,
        }
    }
}

impl SpawnOptions {
    #[must_use]
    pub const fn with_size(mut self, cols: u16, rows: u16) -> Self {
        self.cols = cols;
        self.rows = rows;
        self
    }

    #[must_use]
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    #[must_use]
    pub const fn size(&self) -> TerminalSize {
        TerminalSize::new(self.cols, self.rows)
    }

    /// Directory the shell starts in.
    #[must_use]
    pub fn working_dir(&self) -> Option<PathBuf> {
        self.cwd.clone().or_else(dirs::home_dir)
    }
}
