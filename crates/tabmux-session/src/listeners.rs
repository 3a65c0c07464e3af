//! Per-session listener bookkeeping.

use tokio::task::JoinHandle;

/// What a listener task is subscribed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerKind {
    /// Process output forwarded to the renderer.
    Data,
    /// Process errors, which destroy the session.
    Error,
    /// Process exit, which destroys the session.
    Exit,
    /// Renderer key input forwarded to the process.
    Keys,
    /// Renderer size changes forwarded to the process.
    Resize,
    /// Renderer title changes, filtered into the session title.
    Title,
    /// Shared window-size notifications.
    Window,
}

/// Every listener task one session holds.
///
/// Released all at once: either explicitly through [`ListenerSet::release_all`]
/// or when the set is dropped.
#[derive(Debug, Default)]
pub struct ListenerSet {
    handles: Vec<(ListenerKind, JoinHandle<()>)>,
}

impl ListenerSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: ListenerKind, handle: JoinHandle<()>) {
        self.handles.push((kind, handle));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Number of listener tasks still running.
    #[must_use]
    pub fn active(&self) -> usize {
        self.handles
            .iter()
            .filter(|(_, handle)| !handle.is_finished())
            .count()
    }

    #[must_use]
    pub fn kinds(&self) -> Vec<ListenerKind> {
        self.handles.iter().map(|(kind, _)| *kind).collect()
    }

    /// Abort every listener. Returns how many were held.
    pub fn release_all(&mut self) -> usize {
        let count = self.handles.len();
        for (_, handle) in self.handles.drain(..) {
            handle.abort();
        }
        count
    }
}

impl Drop for ListenerSet {
    fn drop(&mut self) {
        self.release_all();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_release_all_aborts_tasks() {
        let mut set = ListenerSet::new();
        set.push(ListenerKind::Data, tokio::spawn(std::future::pending()));
        set.push(ListenerKind::Exit, tokio::spawn(std::future::pending()));
        assert_eq!(set.kinds(), [ListenerKind::Data, ListenerKind::Exit]);

        tokio::task::yield_now().await;
        assert_eq!(set.active(), 2);

        assert_eq!(set.release_all(), 2);
        assert!(set.is_empty());
        assert_eq!(set.release_all(), 0);
    }

    #[tokio::test]
    async fn test_finished_tasks_are_not_active() {
        let mut set = ListenerSet::new();
        set.push(ListenerKind::Title, tokio::spawn(async {}));
        set.push(ListenerKind::Keys, tokio::spawn(std::future::pending()));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(set.len(), 2);
        assert_eq!(set.active(), 1);
    }

    #[tokio::test]
    async fn test_drop_aborts_tasks() {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let mut set = ListenerSet::new();
        set.push(
            ListenerKind::Window,
            tokio::spawn(async move {
                let _tx = tx;
                std::future::pending::<()>().await;
            }),
        );
        drop(set);

        // The sender is dropped along with the aborted task.
        let result = tokio::time::timeout(Duration::from_secs(1), rx).await;
        assert!(matches!(result, Ok(Err(_))));
    }
}
