//! Title filtering.
//!
//! Shells announce titles through escape sequences, and some announce more
//! than they mean. The rules here are tuned to what zsh and bash emit in
//! practice, not to anything the terminal protocol guarantees.

use tabmux_core::ShellKind;

/// Decide whether the `seq`-th title event (0-based, counting rejected ones)
/// should replace a session's title.
///
/// - zsh sends titles in pairs, so only even events are kept.
/// - bash briefly reports the working directory, so `~`-prefixed titles are dropped.
/// - Anything else is taken as-is.
#[must_use]
pub fn accept_title(kind: ShellKind, title: &str, seq: usize) -> bool {
    match kind {
        ShellKind::Zsh => seq % 2 == 0,
        ShellKind::Bash => !title.starts_with('~'),
        ShellKind::Other => true,
    }
}

/// Per-session title filter that tracks how many events it has seen.
#[derive(Debug, Clone)]
pub struct TitleFilter {
    kind: ShellKind,
    seen: usize,
}

impl TitleFilter {
    #[must_use]
    pub const fn new(kind: ShellKind) -> Self {
        Self { kind, seen: 0 }
    }

    /// Count `title` and report whether it should be applied.
    pub fn accept(&mut self, title: &str) -> bool {
        let seq = self.seen;
        self.seen += 1;
        accept_title(self.kind, title, seq)
    }

    #[must_use]
    pub const fn seen(&self) -> usize {
        self.seen
    }
}
