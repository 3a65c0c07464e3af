//! Shell processes on pseudo-terminals.
//!
//! Provides:
//! - `ShellResolver` - Pick the shell and launch flags for a new session
//! - `PtySession` - One shell on one PTY, with hot output/error/exit streams
//! - `PtySpawner` - `ProcessSpawner` implementation used by the session registry
//! - `Utf8Decoder` - Chunk-safe decoding of PTY output

pub mod decoder;
pub mod options;
pub mod session;
pub mod shell;

pub use decoder::Utf8Decoder;
pub use options::SpawnOptions;
pub use session::{PtyError, PtySession, PtySpawner};
pub use shell::{
    Platform, ShellResolver, ShellVars, probe_login_shell, resolve_executable_path, resolve_shell,
};
