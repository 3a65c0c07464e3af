//! Collaborator traits: the process behind a session and the renderer in front of it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{ShellKind, ShellSpec};

/// Stable session identifier.
///
/// Unlike a session's index, the id never changes while the session lives.
pub type SessionId = Uuid;

/// Terminal dimensions in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TerminalSize {
    pub cols: u16,
    pub rows: u16,
}

impl TerminalSize {
    #[must_use]
    pub const fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }
}

/// How a session's process terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitStatus {
    pub code: u32,
}

impl ExitStatus {
    #[must_use]
    pub const fn new(code: u32) -> Self {
        Self { code }
    }

    #[must_use]
    pub const fn success(&self) -> bool {
        self.code == 0
    }
}

/// Opaque reference to the place a renderer surface is mounted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerHandle(String);

impl ContainerHandle {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ContainerHandle {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Spawn error.
#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("Failed to open pseudo-terminal: {0}")]
    Pty(String),
    #[error("Failed to spawn {executable}: {reason}")]
    Spawn { executable: String, reason: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A live child process driven through a pseudo-terminal.
///
/// All subscription methods return hot streams: a subscriber only sees
/// events emitted after it subscribed. Output is held back until
/// [`TerminalProcess::start`] so that subscribers attached right after
/// spawning miss nothing.
pub trait TerminalProcess: Send + Sync {
    /// Shell this process was launched with.
    fn shell(&self) -> &ShellSpec;

    fn kind(&self) -> ShellKind {
        self.shell().kind()
    }

    /// OS process id, if the platform reports one.
    fn pid(&self) -> Option<u32>;

    /// Decoded output chunks.
    fn data(&self) -> broadcast::Receiver<String>;

    /// Operational errors.
    fn errors(&self) -> broadcast::Receiver<String>;

    /// Fires exactly once when the process terminates.
    fn exits(&self) -> broadcast::Receiver<ExitStatus>;

    /// Begin dispatching output and exit events. Calling it again is a no-op.
    fn start(&self);

    /// Queue `text` for the process input. Never blocks; order is preserved.
    fn write(&self, text: &str);

    /// Resize the pseudo-terminal. Ignored once the process has exited.
    fn resize(&self, cols: u16, rows: u16);

    /// Terminate the process. Safe to call any number of times.
    fn kill(&self);
}

/// Produces a fresh process for every new session.
pub trait ProcessSpawner: Send + Sync {
    /// Spawn a new process.
    ///
    /// # Errors
    /// Returns error if the pseudo-terminal or child process cannot be created.
    fn spawn(&self) -> Result<Arc<dyn TerminalProcess>, SpawnError>;
}

/// A terminal-emulator surface showing one session.
pub trait Renderer: Send + Sync {
    /// Render process output.
    fn write(&self, text: &str);

    /// Take keyboard focus.
    fn focus(&self);

    /// Fit the surface to its container.
    fn fit(&self);

    /// Current fitted dimensions.
    fn size(&self) -> TerminalSize;

    /// Release the surface. Called once when its session is destroyed.
    fn dispose(&self) {}

    /// Key input typed into the surface.
    fn keys(&self) -> broadcast::Receiver<String>;

    /// Surface size changes.
    fn resizes(&self) -> broadcast::Receiver<TerminalSize>;

    /// Raw title changes requested by the program running in the terminal.
    fn titles(&self) -> broadcast::Receiver<String>;
}

/// Opens renderer surfaces inside containers.
pub trait RendererHost: Send + Sync {
    /// Open the surface for session `id`.
    fn open(&self, id: SessionId, container: &ContainerHandle) -> Arc<dyn Renderer>;
}
