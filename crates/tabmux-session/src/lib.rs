//! Session multiplexing for tabbed terminals.
//!
//! Provides:
//! - `SessionRegistry` - Create, focus and destroy shell sessions
//! - `TitleFilter` - Shell-specific title heuristics
//! - `ListenerSet` - Per-session listener bookkeeping

pub mod listeners;
pub mod registry;
pub mod title;

#[cfg(test)]
mod testing;

pub use listeners::{ListenerKind, ListenerSet};
pub use registry::{RegistryConfig, RegistryError, SessionInfo, SessionRegistry};
pub use title::{TitleFilter, accept_title};
