//! Renderer surfaces drawn by the ratatui front end.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};

use tabmux_core::{ContainerHandle, EventHub, Renderer, RendererHost, SessionId, TerminalSize};
use tokio::sync::broadcast;

use crate::screen::Screen;

/// One tab's surface: a plain-text screen plus the input streams the
/// registry listens to.
pub struct TuiSurface {
    id: SessionId,
    container: ContainerHandle,
    viewport: Arc<Mutex<TerminalSize>>,
    size: Mutex<TerminalSize>,
    screen: Mutex<Screen>,
    disposed: AtomicBool,
    keys: EventHub<String>,
    resizes: EventHub<TerminalSize>,
    titles: EventHub<String>,
}

impl TuiSurface {
    fn new(
        id: SessionId,
        container: ContainerHandle,
        viewport: Arc<Mutex<TerminalSize>>,
    ) -> Self {
        let size = *viewport.lock().unwrap_or_else(PoisonError::into_inner);
        Self {
            id,
            container,
            viewport,
            size: Mutex::new(size),
            screen: Mutex::new(Screen::new()),
            disposed: AtomicBool::new(false),
            keys: EventHub::new(),
            resizes: EventHub::new(),
            titles: EventHub::new(),
        }
    }

    /// Forward typed input to whoever listens for this surface's keys.
    pub fn send_keys(&self, text: String) {
        self.keys.emit(text);
    }

    /// Lines to draw in a pane `rows` high.
    pub fn visible_lines(&self, rows: usize) -> Vec<String> {
        self.screen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .tail(rows)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

impl Renderer for TuiSurface {
    fn write(&self, text: &str) {
        let titles = self
            .screen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .feed(text);
        for title in titles {
            self.titles.emit(title);
        }
    }

    fn focus(&self) {
        tracing::debug!(
            session = %self.id,
            container = self.container.as_str(),
            "Surface focused"
        );
    }

    fn fit(&self) {
        let fitted = *self.viewport.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = std::mem::replace(
            &mut *self.size.lock().unwrap_or_else(PoisonError::into_inner),
            fitted,
        );
        if previous != fitted {
            self.resizes.emit(fitted);
        }
    }

    fn size(&self) -> TerminalSize {
        *self.size.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
    }

    fn keys(&self) -> broadcast::Receiver<String> {
        self.keys.subscribe()
    }

    fn resizes(&self) -> broadcast::Receiver<TerminalSize> {
        self.resizes.subscribe()
    }

    fn titles(&self) -> broadcast::Receiver<String> {
        self.titles.subscribe()
    }
}

/// Opens [`TuiSurface`]s sized to the output pane.
///
/// Surfaces are keyed by the session they belong to, so a surface is never
/// mistaken for a neighbour while the registry compacts its indices.
pub struct TuiHost {
    viewport: Arc<Mutex<TerminalSize>>,
    surfaces: Mutex<HashMap<SessionId, Arc<TuiSurface>>>,
}

impl TuiHost {
    pub fn new(viewport: TerminalSize) -> Self {
        Self {
            viewport: Arc::new(Mutex::new(viewport)),
            surfaces: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_viewport(&self, viewport: TerminalSize) {
        *self.viewport.lock().unwrap_or_else(PoisonError::into_inner) = viewport;
    }

    /// The live surface of session `id`.
    pub fn surface(&self, id: SessionId) -> Option<Arc<TuiSurface>> {
        self.surfaces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .filter(|surface| !surface.is_disposed())
            .cloned()
    }
}

impl RendererHost for TuiHost {
    fn open(&self, id: SessionId, container: &ContainerHandle) -> Arc<dyn Renderer> {
        let surface = Arc::new(TuiSurface::new(
            id,
            container.clone(),
            Arc::clone(&self.viewport),
        ));
        let mut surfaces = self.surfaces.lock().unwrap_or_else(PoisonError::into_inner);
        surfaces.retain(|_, surface| !surface.is_disposed());
        surfaces.insert(id, Arc::clone(&surface));
        drop(surfaces);
        surface
    }
}
