//! Session lifecycle notifications.

use serde::{Deserialize, Serialize};

/// What happened to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LifecycleKind {
    Create,
    FocusTab,
    Destroy,
}

/// Broadcast whenever the registry creates, focuses or destroys a session.
///
/// `create` events carry no index; `focusTab` and `destroy` always do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub kind: LifecycleKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
}

impl LifecycleEvent {
    #[must_use]
    pub const fn create() -> Self {
        Self {
            kind: LifecycleKind::Create,
            index: None,
        }
    }

    #[must_use]
    pub const fn focus_tab(index: usize) -> Self {
        Self {
            kind: LifecycleKind::FocusTab,
            index: Some(index),
        }
    }

    #[must_use]
    pub const fn destroy(index: usize) -> Self {
        Self {
            kind: LifecycleKind::Destroy,
            index: Some(index),
        }
    }
}
