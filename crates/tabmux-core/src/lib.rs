//! Core abstractions for terminal session multiplexing.
//!
//! This crate provides the shared building blocks:
//! - `EventHub` - Hot broadcast streams with explicit subscriptions
//! - `LifecycleEvent` - Session create/focus/destroy notifications
//! - `ShellSpec` / `ShellKind` - What a session runs
//! - Process and renderer collaborator traits

pub mod events;
pub mod lifecycle;
pub mod shell_spec;
pub mod traits;

pub use events::{EventHub, WindowEvents, recv_next};
pub use lifecycle::{LifecycleEvent, LifecycleKind};
pub use shell_spec::{ShellKind, ShellSpec};
pub use traits::{
    ContainerHandle, ExitStatus, ProcessSpawner, Renderer, RendererHost, SessionId, SpawnError,
    TerminalProcess, TerminalSize,
};
