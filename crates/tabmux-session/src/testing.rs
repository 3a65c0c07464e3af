//! In-memory process and renderer collaborators for registry tests.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use tabmux_core::{
    ContainerHandle, EventHub, ExitStatus, ProcessSpawner, Renderer, RendererHost, SessionId,
    ShellSpec, SpawnError, TerminalProcess, TerminalSize,
};
use tokio::sync::broadcast;

/// Process double: records input and lets tests emit output, errors and exits.
pub struct FakeProcess {
    shell: ShellSpec,
    pub data: EventHub<String>,
    pub errors: EventHub<String>,
    pub exits: EventHub<ExitStatus>,
    written: Mutex<String>,
    resizes: Mutex<Vec<(u16, u16)>>,
    kills: AtomicUsize,
    started: AtomicBool,
}

impl FakeProcess {
    pub fn new(shell: ShellSpec) -> Self {
        Self {
            shell,
            data: EventHub::new(),
            errors: EventHub::new(),
            exits: EventHub::new(),
            written: Mutex::new(String::new()),
            resizes: Mutex::new(Vec::new()),
            kills: AtomicUsize::new(0),
            started: AtomicBool::new(false),
        }
    }

    pub fn written(&self) -> String {
        self.written.lock().unwrap().clone()
    }

    pub fn resizes(&self) -> Vec<(u16, u16)> {
        self.resizes.lock().unwrap().clone()
    }

    pub fn kills(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Subscriptions still held on this process's streams.
    pub fn receiver_count(&self) -> usize {
        self.data.receiver_count() + self.errors.receiver_count() + self.exits.receiver_count()
    }
}

impl TerminalProcess for FakeProcess {
    fn shell(&self) -> &ShellSpec {
        &self.shell
    }

    fn pid(&self) -> Option<u32> {
        Some(4242)
    }

    fn data(&self) -> broadcast::Receiver<String> {
        self.data.subscribe()
    }

    fn errors(&self) -> broadcast::Receiver<String> {
        self.errors.subscribe()
    }

    fn exits(&self) -> broadcast::Receiver<ExitStatus> {
        self.exits.subscribe()
    }

    fn start(&self) {
        self.started.store(true, Ordering::SeqCst);
    }

    fn write(&self, text: &str) {
        self.written.lock().unwrap().push_str(text);
    }

    fn resize(&self, cols: u16, rows: u16) {
        self.resizes.lock().unwrap().push((cols, rows));
    }

    fn kill(&self) {
        self.kills.fetch_add(1, Ordering::SeqCst);
    }
}

/// Spawner double handing out [`FakeProcess`]es.
pub struct FakeSpawner {
    shell: Mutex<ShellSpec>,
    spawned: Mutex<Vec<Arc<FakeProcess>>>,
    fail_next: AtomicBool,
}

impl Default for FakeSpawner {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeSpawner {
    pub fn new() -> Self {
        Self::with_shell(ShellSpec::new("/bin/sh", ["--login"]))
    }

    pub fn with_shell(shell: ShellSpec) -> Self {
        Self {
            shell: Mutex::new(shell),
            spawned: Mutex::new(Vec::new()),
            fail_next: AtomicBool::new(false),
        }
    }

    pub fn set_shell(&self, shell: ShellSpec) {
        *self.shell.lock().unwrap() = shell;
    }

    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn process(&self, n: usize) -> Arc<FakeProcess> {
        Arc::clone(&self.spawned.lock().unwrap()[n])
    }
}

impl ProcessSpawner for FakeSpawner {
    fn spawn(&self) -> Result<Arc<dyn TerminalProcess>, SpawnError> {
        let shell = self.shell.lock().unwrap().clone();
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(SpawnError::Spawn {
                executable: shell.executable,
                reason: "refused by test".to_string(),
            });
        }

        let process = Arc::new(FakeProcess::new(shell));
        self.spawned.lock().unwrap().push(Arc::clone(&process));
        let process: Arc<dyn TerminalProcess> = process;
        Ok(process)
    }
}

/// Renderer double: records output and calls, and lets tests emit input.
pub struct FakeRenderer {
    pub id: SessionId,
    pub container: ContainerHandle,
    pub keys: EventHub<String>,
    pub resizes: EventHub<TerminalSize>,
    pub titles: EventHub<String>,
    output: Mutex<String>,
    size: Mutex<TerminalSize>,
    focuses: AtomicUsize,
    fits: AtomicUsize,
    disposed: AtomicBool,
}

impl FakeRenderer {
    pub fn new(id: SessionId, container: ContainerHandle) -> Self {
        Self {
            id,
            container,
            keys: EventHub::new(),
            resizes: EventHub::new(),
            titles: EventHub::new(),
            output: Mutex::new(String::new()),
            size: Mutex::new(TerminalSize::new(80, 30)),
            focuses: AtomicUsize::new(0),
            fits: AtomicUsize::new(0),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn output(&self) -> String {
        self.output.lock().unwrap().clone()
    }

    pub fn set_size(&self, cols: u16, rows: u16) {
        *self.size.lock().unwrap() = TerminalSize::new(cols, rows);
    }

    pub fn focuses(&self) -> usize {
        self.focuses.load(Ordering::SeqCst)
    }

    pub fn fits(&self) -> usize {
        self.fits.load(Ordering::SeqCst)
    }

    pub fn disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Subscriptions still held on this renderer's streams.
    pub fn receiver_count(&self) -> usize {
        self.keys.receiver_count() + self.resizes.receiver_count() + self.titles.receiver_count()
    }
}

impl Renderer for FakeRenderer {
    fn write(&self, text: &str) {
        self.output.lock().unwrap().push_str(text);
    }

    fn focus(&self) {
        self.focuses.fetch_add(1, Ordering::SeqCst);
    }

    fn fit(&self) {
        self.fits.fetch_add(1, Ordering::SeqCst);
    }

    fn size(&self) -> TerminalSize {
        *self.size.lock().unwrap()
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

/// Host double that remembers every renderer it opened.
#[derive(Default)]
pub struct FakeHost {
    opened: Mutex<Vec<Arc<FakeRenderer>>>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn renderer(&self, n: usize) -> Arc<FakeRenderer> {
        Arc::clone(&self.opened.lock().unwrap()[n])
    }

    pub fn opened(&self) -> usize {
        self.opened.lock().unwrap().len()
    }
}

impl RendererHost for FakeHost {
    fn open(&self, id: SessionId, container: &ContainerHandle) -> Arc<dyn Renderer> {
        let renderer = Arc::new(FakeRenderer::new(id, container.clone()));
        self.opened.lock().unwrap().push(Arc::clone(&renderer));
        renderer
    }
}
