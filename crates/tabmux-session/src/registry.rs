//! The session registry.
//!
//! Owns the ordered collection of sessions and the current index, wires each
//! session's process to its renderer surface, and broadcasts lifecycle events.

use std::{
    mem,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tabmux_core::{
    ContainerHandle, EventHub, LifecycleEvent, ProcessSpawner, Renderer, RendererHost, SessionId,
    ShellSpec, SpawnError, TerminalProcess, WindowEvents, events::DEFAULT_CAPACITY, recv_next,
};
use tokio::{runtime::Handle, sync::broadcast};
use uuid::Uuid;

use crate::{
    listeners::{ListenerKind, ListenerSet},
    title::TitleFilter,
};

/// Registry error.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Session index {index} out of range ({len} sessions)")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("No sessions")]
    Empty,
    #[error("Spawn failed: {0}")]
    Spawn(#[from] SpawnError),
    #[error("Session listeners need a Tokio runtime")]
    NoRuntime,
}

/// Registry settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Title a session shows until its shell sets one.
    pub default_title: String,
    /// Lifecycle events buffered per subscriber.
    pub lifecycle_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            default_title: "Terminal".to_string(),
            lifecycle_capacity: DEFAULT_CAPACITY,
        }
    }
}

impl RegistryConfig {
    #[must_use]
    pub fn with_default_title(mut self, title: impl Into<String>) -> Self {
        self.default_title = title.into();
        self
    }
}

/// Point-in-time view of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub index: usize,
    pub id: SessionId,
    pub title: String,
    pub shell: ShellSpec,
    pub pid: Option<u32>,
}

struct Session {
    id: SessionId,
    title: String,
    process: Arc<dyn TerminalProcess>,
    renderer: Arc<dyn Renderer>,
    listeners: ListenerSet,
}

impl Session {
    /// Stop listening and kill the process. The renderer is left to the caller.
    fn shut_down(&mut self) -> usize {
        let released = self.listeners.release_all();
        self.process.kill();
        released
    }

    fn info(&self, index: usize) -> SessionInfo {
        SessionInfo {
            index,
            id: self.id,
            title: self.title.clone(),
            shell: self.process.shell().clone(),
            pid: self.process.pid(),
        }
    }
}

#[derive(Default)]
struct State {
    sessions: Vec<Session>,
    current: Option<usize>,
}

impl State {
    fn check(&self, index: usize) -> Result<(), RegistryError> {
        let len = self.sessions.len();
        if len == 0 {
            Err(RegistryError::Empty)
        } else if index >= len {
            Err(RegistryError::IndexOutOfRange { index, len })
        } else {
            Ok(())
        }
    }

    /// Remove the session at `index` and keep `current` pointing at a live slot.
    fn remove(&mut self, index: usize) -> Session {
        let session = self.sessions.remove(index);
        let len = self.sessions.len();
        self.current = match self.current {
            _ if len == 0 => None,
            Some(current) if index < current => Some(current - 1),
            Some(current) => Some(current.min(len - 1)),
            None => Some(0),
        };
        session
    }
}

struct Shared {
    state: Mutex<State>,
    lifecycle: EventHub<LifecycleEvent>,
    spawner: Arc<dyn ProcessSpawner>,
    host: Arc<dyn RendererHost>,
    window: WindowEvents,
    config: RegistryConfig,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_title(&self, id: SessionId, title: String) {
        let mut state = self.lock();
        if let Some(session) = state.sessions.iter_mut().find(|s| s.id == id) {
            session.title = title;
        }
        drop(state);
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        for mut session in state.sessions.drain(..) {
            session.shut_down();
            session.renderer.dispose();
        }
    }
}

/// Multiplexes shell sessions behind renderer surfaces.
///
/// Cheap to clone; clones share the same collection. Dropping the last
/// clone kills every remaining session without emitting lifecycle events.
#[derive(Clone)]
pub struct SessionRegistry {
    shared: Arc<Shared>,
}

impl SessionRegistry {
    /// Create a registry with the default configuration.
    #[must_use]
    pub fn new(
        spawner: Arc<dyn ProcessSpawner>,
        host: Arc<dyn RendererHost>,
        window: WindowEvents,
    ) -> Self {
        Self::with_config(spawner, host, window, RegistryConfig::default())
    }

    #[must_use]
    pub fn with_config(
        spawner: Arc<dyn ProcessSpawner>,
        host: Arc<dyn RendererHost>,
        window: WindowEvents,
        config: RegistryConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                lifecycle: EventHub::with_capacity(config.lifecycle_capacity),
                spawner,
                host,
                window,
                config,
            }),
        }
    }

    /// Open a surface in `container`, spawn a shell for it and focus the new tab.
    ///
    /// Must be called from within a Tokio runtime, which drives the session's
    /// listeners. Returns the new session's index.
    ///
    /// # Errors
    /// Returns error if there is no runtime or the process cannot be spawned.
    pub fn create(&self, container: &ContainerHandle) -> Result<usize, RegistryError> {
        let runtime = Handle::try_current().map_err(|_| RegistryError::NoRuntime)?;

        let id = Uuid::new_v4();
        let renderer = self.shared.host.open(id, container);
        let process = match self.shared.spawner.spawn() {
            Ok(process) => process,
            Err(err) => {
                tracing::warn!(container = container.as_str(), %err, "Failed to spawn session");
                renderer.dispose();
                return Err(err.into());
            }
        };

        let listeners = self.wire(&runtime, id, &process, &renderer);

        // Create and its focus event go out under the same lock.
        let mut state = self.shared.lock();
        state.sessions.push(Session {
            id,
            title: self.shared.config.default_title.clone(),
            process: Arc::clone(&process),
            renderer: Arc::clone(&renderer),
            listeners,
        });
        let index = state.sessions.len() - 1;
        state.current = Some(index);
        process.start();
        self.shared.lifecycle.emit(LifecycleEvent::create());
        self.shared.lifecycle.emit(LifecycleEvent::focus_tab(index));
        drop(state);

        tracing::info!(
            session = %id,
            index,
            shell = %process.shell(),
            pid = ?process.pid(),
            "Session created"
        );

        renderer.focus();
        renderer.fit();
        Ok(index)
    }

    /// Make session `index` current and give it input focus.
    ///
    /// # Errors
    /// Returns error if `index` does not name a session.
    pub fn focus_tab(&self, index: usize) -> Result<(), RegistryError> {
        let mut state = self.shared.lock();
        state.check(index)?;
        state.current = Some(index);
        self.shared.lifecycle.emit(LifecycleEvent::focus_tab(index));
        let renderer = Arc::clone(&state.sessions[index].renderer);
        drop(state);
        renderer.focus();
        Ok(())
    }

    /// Re-announce the current session, focus it and fit its surface.
    ///
    /// # Errors
    /// Returns error if there are no sessions.
    pub fn focus_current_tab(&self) -> Result<(), RegistryError> {
        let state = self.shared.lock();
        let index = state.current.ok_or(RegistryError::Empty)?;
        state.check(index)?;
        self.shared.lifecycle.emit(LifecycleEvent::focus_tab(index));
        let renderer = Arc::clone(&state.sessions[index].renderer);
        drop(state);
        renderer.focus();
        renderer.fit();
        Ok(())
    }

    /// Destroy session `index`, or the current one when `None`.
    ///
    /// Later sessions move down one index. Returns the destroyed index.
    ///
    /// # Errors
    /// Returns error if there are no sessions or `index` is out of range.
    pub fn destroy(&self, index: Option<usize>) -> Result<usize, RegistryError> {
        let (index, session) = {
            let mut state = self.shared.lock();
            let index = match index {
                Some(index) => index,
                None => state.current.ok_or(RegistryError::Empty)?,
            };
            state.check(index)?;
            (index, self.destroy_locked(&mut state, index))
        };
        session.renderer.dispose();
        Ok(index)
    }

    /// Destroy every session in order, then leave the registry empty.
    pub fn destroy_all(&self) {
        let sessions = {
            let mut state = self.shared.lock();
            state.current = None;
            let mut sessions = mem::take(&mut state.sessions);
            for (index, session) in sessions.iter_mut().enumerate() {
                let released = session.shut_down();
                self.shared.lifecycle.emit(LifecycleEvent::destroy(index));
                tracing::info!(session = %session.id, index, released, "Session destroyed");
            }
            sessions
        };
        for session in sessions {
            session.renderer.dispose();
        }
    }

    /// Destroy the session with `id` if it still exists.
    fn destroy_by_id(&self, id: SessionId) -> Option<usize> {
        let (index, session) = {
            let mut state = self.shared.lock();
            let index = state.sessions.iter().position(|s| s.id == id)?;
            (index, self.destroy_locked(&mut state, index))
        };
        session.renderer.dispose();
        Some(index)
    }

    fn destroy_locked(&self, state: &mut State, index: usize) -> Session {
        let mut session = state.remove(index);
        let released = session.shut_down();
        self.shared.lifecycle.emit(LifecycleEvent::destroy(index));
        tracing::info!(
            session = %session.id,
            index,
            released,
            current = ?state.current,
            "Session destroyed"
        );
        session
    }

    /// Subscribe every listener a session needs. Receivers are taken here so
    /// nothing emitted before the tasks first run is lost.
    fn wire(
        &self,
        runtime: &Handle,
        id: SessionId,
        process: &Arc<dyn TerminalProcess>,
        renderer: &Arc<dyn Renderer>,
    ) -> ListenerSet {
        let mut listeners = ListenerSet::new();

        let mut data = process.data();
        let output = Arc::clone(renderer);
        listeners.push(
            ListenerKind::Data,
            runtime.spawn(async move {
                while let Some(chunk) = recv_next(&mut data).await {
                    output.write(&chunk);
                }
            }),
        );

        let mut errors = process.errors();
        let registry = Arc::downgrade(&self.shared);
        listeners.push(
            ListenerKind::Error,
            runtime.spawn(async move {
                if let Some(message) = recv_next(&mut errors).await {
                    tracing::warn!(session = %id, %message, "Session process error");
                    destroy_weak(&registry, id);
                }
            }),
        );

        let mut exits = process.exits();
        let registry = Arc::downgrade(&self.shared);
        listeners.push(
            ListenerKind::Exit,
            runtime.spawn(async move {
                if let Some(status) = recv_next(&mut exits).await {
                    if status.success() {
                        tracing::info!(session = %id, "Session process exited");
                    } else {
                        tracing::info!(session = %id, code = status.code, "Session process failed");
                    }
                    destroy_weak(&registry, id);
                }
            }),
        );

        let mut keys = renderer.keys();
        let input = Arc::clone(process);
        listeners.push(
            ListenerKind::Keys,
            runtime.spawn(async move {
                while let Some(text) = recv_next(&mut keys).await {
                    input.write(&text);
                }
            }),
        );

        let mut resizes = renderer.resizes();
        let target = Arc::clone(process);
        listeners.push(
            ListenerKind::Resize,
            runtime.spawn(async move {
                while let Some(size) = recv_next(&mut resizes).await {
                    target.resize(size.cols, size.rows);
                }
            }),
        );

        let mut titles = renderer.titles();
        let mut filter = TitleFilter::new(process.kind());
        let registry = Arc::downgrade(&self.shared);
        listeners.push(
            ListenerKind::Title,
            runtime.spawn(async move {
                while let Some(title) = recv_next(&mut titles).await {
                    if !filter.accept(&title) {
                        continue;
                    }
                    tracing::debug!(
                        session = %id,
                        %title,
                        seen = filter.seen(),
                        "Session title changed"
                    );
                    let Some(shared) = registry.upgrade() else {
                        break;
                    };
                    shared.set_title(id, title);
                }
            }),
        );

        let mut window = self.shared.window.subscribe();
        let surface = Arc::clone(renderer);
        let target = Arc::clone(process);
        listeners.push(
            ListenerKind::Window,
            runtime.spawn(async move {
                while recv_next(&mut window).await.is_some() {
                    surface.fit();
                    let size = surface.size();
                    target.resize(size.cols, size.rows);
                }
            }),
        );

        tracing::debug!(session = %id, kinds = ?listeners.kinds(), "Session listeners wired");
        listeners
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.lock().sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shared.lock().sessions.is_empty()
    }

    /// Index of the focused session, `None` when empty.
    #[must_use]
    pub fn current(&self) -> Option<usize> {
        self.shared.lock().current
    }

    #[must_use]
    pub fn sessions(&self) -> Vec<SessionInfo> {
        self.shared
            .lock()
            .sessions
            .iter()
            .enumerate()
            .map(|(index, session)| session.info(index))
            .collect()
    }

    /// The focused session, read together with its index.
    #[must_use]
    pub fn current_session(&self) -> Option<SessionInfo> {
        let state = self.shared.lock();
        let info = state
            .current
            .and_then(|index| state.sessions.get(index).map(|s| s.info(index)));
        drop(state);
        info
    }

    /// Get the title of session `index`.
    ///
    /// # Errors
    /// Returns error if `index` does not name a session.
    pub fn title(&self, index: usize) -> Result<String, RegistryError> {
        let state = self.shared.lock();
        state.check(index)?;
        let title = state.sessions[index].title.clone();
        drop(state);
        Ok(title)
    }

    /// Number of listener tasks session `index` still has running.
    ///
    /// # Errors
    /// Returns error if `index` does not name a session.
    pub fn active_listeners(&self, index: usize) -> Result<usize, RegistryError> {
        let state = self.shared.lock();
        state.check(index)?;
        let active = state.sessions[index].listeners.active();
        drop(state);
        Ok(active)
    }

    /// Subscribe to lifecycle events emitted from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.shared.lifecycle.subscribe()
    }

    /// Stream of lifecycle events emitted from now on.
    #[must_use]
    pub fn events(&self) -> BoxStream<'static, LifecycleEvent> {
        self.shared.lifecycle.stream()
    }

    /// The window-size source every session listens to.
    #[must_use]
    pub fn window(&self) -> &WindowEvents {
        &self.shared.window
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (sessions, current) = {
            let state = self.shared.lock();
            (state.sessions.len(), state.current)
        };
        f.debug_struct("SessionRegistry")
            .field("sessions", &sessions)
            .field("current", &current)
            .finish_non_exhaustive()
    }
}

fn destroy_weak(registry: &Weak<Shared>, id: SessionId) {
    if let Some(shared) = registry.upgrade() {
        SessionRegistry { shared }.destroy_by_id(id);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::StreamExt;
    use tabmux_core::{ExitStatus, LifecycleKind, TerminalSize};
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::testing::{FakeHost, FakeSpawner};

    struct Harness {
        registry: SessionRegistry,
        spawner: Arc<FakeSpawner>,
        host: Arc<FakeHost>,
        events: broadcast::Receiver<LifecycleEvent>,
    }

    impl Harness {
        fn new() -> Self {
            let spawner = Arc::new(FakeSpawner::new());
            let host = Arc::new(FakeHost::new());
            let registry = SessionRegistry::new(spawner.clone(), host.clone(), WindowEvents::new());
            let events = registry.subscribe();
            Self {
                registry,
                spawner,
                host,
                events,
            }
        }

        fn create(&self) -> usize {
            assert_ok!(self.registry.create(&ContainerHandle::from("tabs")))
        }

        fn drain(&mut self) -> Vec<LifecycleEvent> {
            let mut events = Vec::new();
            while let Ok(event) = self.events.try_recv() {
                events.push(event);
            }
            events
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn test_create_appends_and_focuses_new_tab() {
        let mut h = Harness::new();

        for expected in 0..3 {
            assert_eq!(h.create(), expected);
            assert_eq!(h.registry.current(), Some(expected));
            assert_eq!(h.registry.len(), expected + 1);
            assert_eq!(
                h.drain(),
                [LifecycleEvent::create(), LifecycleEvent::focus_tab(expected)]
            );
        }

        let renderer = h.host.renderer(0);
        assert_eq!(renderer.focuses(), 1);
        assert_eq!(renderer.fits(), 1);
        assert_eq!(renderer.container.as_str(), "tabs");
        assert!(h.spawner.process(0).started());
    }

    #[tokio::test]
    async fn test_create_announces_its_own_focus_under_concurrent_focus() {
        let h = Harness::new();
        h.create();
        let mut events = h.registry.subscribe();

        // Switches back to tab 0 as soon as it sees the next create.
        let mut watched = h.registry.subscribe();
        let registry = h.registry.clone();
        let switcher = std::thread::spawn(move || {
            while let Ok(event) = watched.blocking_recv() {
                if event.kind == LifecycleKind::Create {
                    return registry.focus_tab(0).is_ok();
                }
            }
            false
        });

        let index = h.create();
        assert!(switcher.join().unwrap());

        let seen: Vec<_> = std::iter::from_fn(|| events.try_recv().ok()).collect();
        assert_eq!(
            seen,
            [
                LifecycleEvent::create(),
                LifecycleEvent::focus_tab(index),
                LifecycleEvent::focus_tab(0),
            ]
        );
        assert_eq!(h.registry.current(), Some(0));
        assert_eq!(h.host.renderer(index).focuses(), 1);
        assert_eq!(h.host.renderer(index).fits(), 1);
    }

    #[tokio::test]
    async fn test_current_session_matches_surface_id() {
        let h = Harness::new();
        assert_eq!(h.registry.current_session(), None);
        h.create();
        h.create();
        assert_ok!(h.registry.focus_tab(0));

        let current = h.registry.current_session().unwrap();
        assert_eq!(current.index, 0);
        assert_eq!(current.id, h.host.renderer(0).id);
        assert_ne!(current.id, h.host.renderer(1).id);

        assert_ok!(h.registry.destroy(None));
        let current = h.registry.current_session().unwrap();
        assert_eq!(current.index, 0);
        assert_eq!(current.id, h.host.renderer(1).id);
    }

    #[tokio::test]
    async fn test_create_wires_process_and_renderer() {
        let h = Harness::new();
        h.create();
        let process = h.spawner.process(0);
        let renderer = h.host.renderer(0);

        process.data.emit("hello ".to_string());
        process.data.emit("world".to_string());
        renderer.keys.emit("ls\n".to_string());
        renderer.resizes.emit(TerminalSize::new(100, 40));
        settle().await;

        assert_eq!(renderer.output(), "hello world");
        assert_eq!(process.written(), "ls\n");
        assert_eq!(process.resizes(), [(100, 40)]);

        renderer.set_size(90, 20);
        h.registry.window().notify_resized();
        settle().await;

        assert_eq!(renderer.fits(), 2);
        assert_eq!(process.resizes(), [(100, 40), (90, 20)]);
        assert_eq!(assert_ok!(h.registry.active_listeners(0)), 7);
    }

    #[tokio::test]
    async fn test_window_resize_reaches_every_session() {
        let h = Harness::new();
        h.create();
        h.create();
        h.host.renderer(0).set_size(70, 10);

        h.registry.window().notify_resized();
        settle().await;

        assert_eq!(h.spawner.process(0).resizes(), [(70, 10)]);
        assert_eq!(h.spawner.process(1).resizes(), [(80, 30)]);
    }

    #[tokio::test]
    async fn test_focus_tab_switches_without_fitting() {
        let mut h = Harness::new();
        h.create();
        h.create();
        h.drain();

        assert_ok!(h.registry.focus_tab(0));
        assert_eq!(h.registry.current(), Some(0));
        assert_eq!(h.drain(), [LifecycleEvent::focus_tab(0)]);

        let renderer = h.host.renderer(0);
        assert_eq!(renderer.focuses(), 2);
        assert_eq!(renderer.fits(), 1);
    }

    #[tokio::test]
    async fn test_focus_tab_out_of_range_leaves_state_alone() {
        let mut h = Harness::new();
        h.create();
        h.create();
        h.drain();

        let err = assert_err!(h.registry.focus_tab(5));
        assert!(matches!(
            err,
            RegistryError::IndexOutOfRange { index: 5, len: 2 }
        ));
        assert_eq!(h.registry.current(), Some(1));
        assert!(h.drain().is_empty());
    }

    #[tokio::test]
    async fn test_focus_on_empty_registry_fails() {
        let h = Harness::new();
        assert!(matches!(h.registry.focus_tab(0), Err(RegistryError::Empty)));
        assert!(matches!(
            h.registry.focus_current_tab(),
            Err(RegistryError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_focus_current_tab_fits() {
        let mut h = Harness::new();
        h.create();
        h.drain();

        assert_ok!(h.registry.focus_current_tab());
        assert_eq!(h.drain(), [LifecycleEvent::focus_tab(0)]);
        assert_eq!(h.host.renderer(0).fits(), 2);
    }

    #[tokio::test]
    async fn test_destroy_kills_once_and_releases_everything() {
        let mut h = Harness::new();
        h.create();
        h.drain();
        let process = h.spawner.process(0);
        let renderer = h.host.renderer(0);
        assert!(process.receiver_count() > 0);

        assert_eq!(assert_ok!(h.registry.destroy(None)), 0);
        settle().await;

        assert_eq!(process.kills(), 1);
        assert_eq!(process.receiver_count(), 0);
        assert_eq!(renderer.receiver_count(), 0);
        assert_eq!(h.registry.window().listener_count(), 0);
        assert!(renderer.disposed());
        assert_eq!(h.drain(), [LifecycleEvent::destroy(0)]);
        assert!(h.registry.is_empty());
        assert_eq!(h.registry.current(), None);

        assert!(matches!(h.registry.destroy(None), Err(RegistryError::Empty)));
        assert!(matches!(h.registry.destroy(Some(0)), Err(RegistryError::Empty)));
        assert_eq!(process.kills(), 1);
    }

    #[tokio::test]
    async fn test_destroy_compacts_and_clamps_current() {
        let h = Harness::new();
        h.create();
        h.create();
        h.create();
        let ids: Vec<_> = h.registry.sessions().iter().map(|s| s.id).collect();

        // Before current: current follows its session down.
        assert_ok!(h.registry.destroy(Some(0)));
        assert_eq!(h.registry.current(), Some(1));
        let remaining: Vec<_> = h.registry.sessions().iter().map(|s| s.id).collect();
        assert_eq!(remaining, ids[1..]);

        // The current last session: current clamps to the new last index.
        assert_ok!(h.registry.destroy(None));
        assert_eq!(h.registry.current(), Some(0));
        assert_eq!(h.registry.sessions()[0].id, ids[1]);
    }

    #[tokio::test]
    async fn test_destroy_after_current_keeps_current() {
        let h = Harness::new();
        h.create();
        h.create();
        h.create();
        assert_ok!(h.registry.focus_tab(0));

        assert_ok!(h.registry.destroy(Some(2)));
        assert_eq!(h.registry.current(), Some(0));

        let err = assert_err!(h.registry.destroy(Some(2)));
        assert!(matches!(
            err,
            RegistryError::IndexOutOfRange { index: 2, len: 2 }
        ));
        assert_eq!(h.registry.len(), 2);
    }

    #[tokio::test]
    async fn test_exit_destroys_session() {
        let mut h = Harness::new();
        h.create();
        h.create();
        h.drain();

        let exited = h.spawner.process(0);
        exited.exits.emit(ExitStatus::new(0));
        settle().await;

        assert_eq!(h.drain(), [LifecycleEvent::destroy(0)]);
        assert_eq!(exited.kills(), 1);
        assert!(h.host.renderer(0).disposed());
        assert_eq!(h.registry.len(), 1);
        assert_eq!(h.registry.current(), Some(0));
    }

    #[tokio::test]
    async fn test_failures_look_like_normal_exit() {
        let mut h = Harness::new();
        h.create();
        h.create();
        h.drain();

        h.spawner.process(0).errors.emit("read failed".to_string());
        h.spawner.process(1).exits.emit(ExitStatus::new(137));
        settle().await;

        let kinds: Vec<_> = h.drain().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, [LifecycleKind::Destroy, LifecycleKind::Destroy]);
        assert!(h.registry.is_empty());
    }

    #[tokio::test]
    async fn test_error_and_exit_destroy_only_once() {
        let mut h = Harness::new();
        h.create();
        h.drain();

        let process = h.spawner.process(0);
        process.errors.emit("write failed".to_string());
        process.exits.emit(ExitStatus::new(1));
        settle().await;

        assert_eq!(h.drain(), [LifecycleEvent::destroy(0)]);
        assert_eq!(process.kills(), 1);
    }

    #[tokio::test]
    async fn test_destroy_all_in_order() {
        let mut h = Harness::new();
        h.create();
        h.create();
        h.create();
        h.drain();

        h.registry.destroy_all();

        assert_eq!(
            h.drain(),
            [
                LifecycleEvent::destroy(0),
                LifecycleEvent::destroy(1),
                LifecycleEvent::destroy(2),
            ]
        );
        assert!(h.registry.is_empty());
        assert_eq!(h.registry.current(), None);
        for n in 0..3 {
            assert_eq!(h.spawner.process(n).kills(), 1);
            assert!(h.host.renderer(n).disposed());
        }
    }

    #[tokio::test]
    async fn test_destroy_all_on_empty_does_nothing() {
        let mut h = Harness::new();
        h.registry.destroy_all();
        assert!(h.drain().is_empty());
    }

    #[tokio::test]
    async fn test_spawn_failure_disposes_surface() {
        let mut h = Harness::new();
        h.spawner.fail_next();

        let err = assert_err!(h.registry.create(&ContainerHandle::from("tabs")));
        assert!(matches!(err, RegistryError::Spawn(_)));
        assert_eq!(h.host.opened(), 1);
        assert!(h.host.renderer(0).disposed());
        assert!(h.registry.is_empty());
        assert!(h.drain().is_empty());
    }

    #[test]
    fn test_create_needs_runtime() {
        let h = Harness::new();
        let err = assert_err!(h.registry.create(&ContainerHandle::from("tabs")));
        assert!(matches!(err, RegistryError::NoRuntime));
        assert_eq!(h.host.opened(), 0);
    }

    // Title rules follow what current zsh/bash releases emit and may need
    // retuning for other versions.
    #[tokio::test]
    async fn test_zsh_titles_filtered() {
        let h = Harness::new();
        h.spawner.set_shell(ShellSpec::new("/usr/bin/zsh", ["--login"]));
        h.create();
        assert_eq!(assert_ok!(h.registry.title(0)), "Terminal");

        let renderer = h.host.renderer(0);
        for title in ["A", "B", "C", "D"] {
            renderer.titles.emit(title.to_string());
        }
        settle().await;

        assert_eq!(assert_ok!(h.registry.title(0)), "C");
    }

    #[tokio::test]
    async fn test_bash_titles_filtered() {
        let h = Harness::new();
        h.spawner.set_shell(ShellSpec::new("/bin/bash", ["--login"]));
        h.create();

        let renderer = h.host.renderer(0);
        renderer.titles.emit("my-script".to_string());
        renderer.titles.emit("~/proj".to_string());
        settle().await;

        assert_eq!(assert_ok!(h.registry.title(0)), "my-script");
    }

    #[tokio::test]
    async fn test_other_shell_titles_accepted() {
        let h = Harness::new();
        h.create();

        h.host.renderer(0).titles.emit("~/anything".to_string());
        settle().await;

        assert_eq!(assert_ok!(h.registry.title(0)), "~/anything");
    }

    #[tokio::test]
    async fn test_custom_default_title() {
        let spawner = Arc::new(FakeSpawner::new());
        let host = Arc::new(FakeHost::new());
        let config = RegistryConfig::default().with_default_title("shell");
        let registry = SessionRegistry::with_config(spawner, host, WindowEvents::new(), config);

        assert_ok!(registry.create(&ContainerHandle::from("tabs")));
        assert_eq!(assert_ok!(registry.title(0)), "shell");
    }

    #[tokio::test]
    async fn test_sessions_snapshot() {
        let h = Harness::new();
        h.create();
        h.create();

        let sessions = h.registry.sessions();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[1].index, 1);
        assert_eq!(sessions[1].title, "Terminal");
        assert_eq!(sessions[1].shell.executable, "/bin/sh");
        assert_eq!(sessions[1].pid, Some(4242));
        assert_ne!(sessions[0].id, sessions[1].id);
    }

    #[tokio::test]
    async fn test_events_stream() {
        let h = Harness::new();
        let mut events = h.registry.events();
        h.create();

        assert_eq!(events.next().await, Some(LifecycleEvent::create()));
        assert_eq!(events.next().await, Some(LifecycleEvent::focus_tab(0)));
    }

    #[tokio::test]
    async fn test_dropping_registry_kills_sessions() {
        let h = Harness::new();
        h.create();
        let process = h.spawner.process(0);
        let renderer = h.host.renderer(0);

        drop(h.registry);

        assert_eq!(process.kills(), 1);
        assert!(renderer.disposed());
    }

    #[test]
    fn test_config_defaults() {
        let config: RegistryConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, RegistryConfig::default());
        assert_eq!(config.default_title, "Terminal");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_real_shell_round_trip() {
        use tabmux_pty::{PtySpawner, SpawnOptions};

        let spawner = PtySpawner::new(SpawnOptions::default().with_cwd("/"))
            .with_shell(ShellSpec::new("/bin/sh", Vec::<String>::new()));
        let host = Arc::new(FakeHost::new());
        let registry = SessionRegistry::new(Arc::new(spawner), host.clone(), WindowEvents::new());

        assert_ok!(registry.create(&ContainerHandle::from("tabs")));
        let renderer = host.renderer(0);
        renderer.keys.emit("echo tabmux-$((40 + 2))\n".to_string());

        let echoed = tokio::time::timeout(Duration::from_secs(5), async {
            while !renderer.output().contains("tabmux-42") {
                settle().await;
            }
        })
        .await;
        assert!(echoed.is_ok(), "output: {:?}", renderer.output());

        renderer.keys.emit("exit\n".to_string());
        let gone = tokio::time::timeout(Duration::from_secs(5), async {
            while !registry.is_empty() {
                settle().await;
            }
        })
        .await;
        assert!(gone.is_ok());
        assert!(renderer.disposed());
    }
}
