//! PTY-backed shell sessions.
//!
//! Wraps `portable-pty`: one `PtySession` owns one child process and three
//! dedicated I/O threads:
//! - reader: PTY output -> `Utf8Decoder` -> data hub
//! - writer: ordered input queue -> PTY input
//! - waiter: child exit -> exit hub (after the reader drains)

use std::{
    fmt,
    io::{self, Read, Write},
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
        mpsc as std_mpsc,
    },
    thread,
    time::Duration,
};

use portable_pty::{
    Child, ChildKiller, CommandBuilder, MasterPty, PtyPair, PtySize, native_pty_system,
};
use tabmux_core::{
    EventHub, ExitStatus, ProcessSpawner, ShellKind, ShellSpec, SpawnError, TerminalProcess,
    TerminalSize,
};
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::{decoder::Utf8Decoder, options::SpawnOptions, shell::resolve_shell};

/// How long the exit event waits for the reader to drain remaining output.
const EXIT_DRAIN_GRACE: Duration = Duration::from_millis(200);

#[cfg(unix)]
const EIO: i32 = 5;

/// Errors that can occur while setting up a PTY session.
#[derive(Debug, thiserror::Error)]
pub enum PtyError {
    #[error("Failed to create PTY: {0}")]
    Creation(String),

    #[error("Failed to spawn {executable}: {reason}")]
    Spawn { executable: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl From<PtyError> for SpawnError {
    fn from(err: PtyError) -> Self {
        match err {
            PtyError::Creation(msg) => Self::Pty(msg),
            PtyError::Spawn { executable, reason } => Self::Spawn { executable, reason },
            PtyError::Io(err) => Self::Io(err),
        }
    }
}

struct StartGates {
    reader: oneshot::Sender<()>,
    waiter: oneshot::Sender<()>,
}

/// One shell process running on a pseudo-terminal.
///
/// Output and exit events are held back until [`PtySession::start`], so
/// callers can subscribe right after spawning without missing anything.
/// The process is killed when the session is dropped.
pub struct PtySession {
    shell: ShellSpec,
    kind: ShellKind,
    pid: Option<u32>,
    master: Mutex<Box<dyn MasterPty + Send>>,
    killer: Mutex<Box<dyn ChildKiller + Send + Sync>>,
    input: mpsc::UnboundedSender<String>,
    data: EventHub<String>,
    errors: EventHub<String>,
    exits: EventHub<ExitStatus>,
    exited: Arc<AtomicBool>,
    killed: AtomicBool,
    size: Mutex<TerminalSize>,
    gates: Mutex<Option<StartGates>>,
}

impl PtySession {
    /// Spawn a shell on a new pseudo-terminal.
    ///
    /// When `shell` is `None` the shell is resolved with
    /// [`ShellResolver`](crate::ShellResolver) from the process environment.
    ///
    /// # Errors
    /// Returns error if the PTY cannot be opened or the shell cannot be spawned.
    pub fn spawn(shell: Option<ShellSpec>, options: &SpawnOptions) -> Result<Self, PtyError> {
        let shell = shell.unwrap_or_else(resolve_shell);
        let size = options.size();

        let PtyPair { master, slave } = native_pty_system()
            .openpty(pty_size(size))
            .map_err(|e| PtyError::Creation(e.to_string()))?;

        let reader = master
            .try_clone_reader()
            .map_err(|e| PtyError::Creation(e.to_string()))?;
        let writer = master
            .take_writer()
            .map_err(|e| PtyError::Creation(e.to_string()))?;

        let mut cmd = CommandBuilder::new(&shell.executable);
        cmd.args(&shell.args);
        if let Some(cwd) = options.working_dir() {
            cmd.cwd(cwd);
        }
        cmd.env("TERM", &options.term);

        let child = slave.spawn_command(cmd).map_err(|e| PtyError::Spawn {
            executable: shell.executable.clone(),
            reason: e.to_string(),
        })?;
        drop(slave);

        let pid = child.process_id();
        let mut killer = child.clone_killer();

        let data = EventHub::with_capacity(options.event_capacity);
        let errors = EventHub::with_capacity(options.event_capacity);
        let exits = EventHub::with_capacity(1);
        let exited = Arc::new(AtomicBool::new(false));

        let (input, input_rx) = mpsc::unbounded_channel();
        let (reader_gate, reader_gate_rx) = oneshot::channel();
        let (waiter_gate, waiter_gate_rx) = oneshot::channel();
        let (reader_done, reader_done_rx) = std_mpsc::channel();

        let threads = spawn_io_thread(format!("pty-writer-{}", pid.unwrap_or_default()), {
            let errors = errors.clone();
            move || drain_input(writer, input_rx, &errors)
        })
        .and_then(|()| {
            spawn_io_thread(format!("pty-reader-{}", pid.unwrap_or_default()), {
                let data = data.clone();
                let errors = errors.clone();
                let buffer = options.read_buffer;
                move || {
                    if reader_gate_rx.blocking_recv().is_ok() {
                        pump_output(reader, buffer, &data, &errors);
                    }
                    let _ = reader_done.send(());
                }
            })
        })
        .and_then(|()| {
            spawn_io_thread(format!("pty-waiter-{}", pid.unwrap_or_default()), {
                let exits = exits.clone();
                let errors = errors.clone();
                let exited = Arc::clone(&exited);
                move || {
                    let status = wait_for_exit(child, &exited, &errors);
                    if waiter_gate_rx.blocking_recv().is_ok() {
                        let _ = reader_done_rx.recv_timeout(EXIT_DRAIN_GRACE);
                        exits.emit(status);
                    }
                }
            })
        });

        if let Err(err) = threads {
            let _ = killer.kill();
            return Err(err);
        }

        tracing::debug!(
            shell = %shell,
            pid = ?pid,
            cols = size.cols,
            rows = size.rows,
            "PTY session created"
        );

        Ok(Self {
            kind: shell.kind(),
            shell,
            pid,
            master: Mutex::new(master),
            killer: Mutex::new(killer),
            input,
            data,
            errors,
            exits,
            exited,
            killed: AtomicBool::new(false),
            size: Mutex::new(size),
            gates: Mutex::new(Some(StartGates {
                reader: reader_gate,
                waiter: waiter_gate,
            })),
        })
    }

    /// Get the shell this session runs.
    #[must_use]
    pub const fn shell(&self) -> &ShellSpec {
        &self.shell
    }

    #[must_use]
    pub const fn kind(&self) -> ShellKind {
        self.kind
    }

    #[must_use]
    pub const fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Get the current terminal size.
    #[must_use]
    pub fn size(&self) -> TerminalSize {
        *self.size.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the child process has terminated.
    #[must_use]
    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }

    /// Subscribe to decoded output.
    #[must_use]
    pub fn subscribe_data(&self) -> broadcast::Receiver<String> {
        self.data.subscribe()
    }

    /// Subscribe to operational errors.
    #[must_use]
    pub fn subscribe_errors(&self) -> broadcast::Receiver<String> {
        self.errors.subscribe()
    }

    /// Subscribe to the exit notification.
    #[must_use]
    pub fn subscribe_exit(&self) -> broadcast::Receiver<ExitStatus> {
        self.exits.subscribe()
    }

    /// Release held-back output and exit events. Later calls do nothing.
    pub fn start(&self) {
        let gates = self
            .gates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(StartGates { reader, waiter }) = gates {
            let _ = reader.send(());
            let _ = waiter.send(());
            tracing::debug!(pid = ?self.pid, "PTY output started");
        }
    }

    /// Queue text for the shell's input.
    pub fn write(&self, text: &str) {
        if self.input.send(text.to_owned()).is_err() {
            tracing::debug!(pid = ?self.pid, "Dropped write to closed PTY");
        }
    }

    /// Resize the terminal. Does nothing once the shell has exited.
    pub fn resize(&self, cols: u16, rows: u16) {
        if self.has_exited() {
            tracing::debug!(pid = ?self.pid, "Ignoring resize of exited PTY");
            return;
        }

        let size = TerminalSize::new(cols, rows);
        let result = self
            .master
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .resize(pty_size(size));

        match result {
            Ok(()) => {
                *self.size.lock().unwrap_or_else(PoisonError::into_inner) = size;
                tracing::debug!(cols, rows, "PTY resized");
            }
            Err(err) => tracing::warn!(cols, rows, %err, "PTY resize failed"),
        }
    }

    /// Terminate the shell. Killing an exited or already killed shell is a no-op.
    pub fn kill(&self) {
        if self.has_exited() || self.killed.swap(true, Ordering::SeqCst) {
            return;
        }
        let result = self
            .killer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .kill();
        match result {
            Ok(()) => tracing::debug!(pid = ?self.pid, "Killed shell"),
            Err(err) => tracing::debug!(pid = ?self.pid, ?err, "Kill failed, shell likely gone"),
        }
    }
}

impl Drop for PtySession {
    fn drop(&mut self) {
        self.kill();
    }
}

impl fmt::Debug for PtySession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let size = self.size();
        f.debug_struct("PtySession")
            .field("shell", &self.shell.executable)
            .field("pid", &self.pid)
            .field("size", &format!("{}x{}", size.cols, size.rows))
            .field("exited", &self.has_exited())
            .finish()
    }
}

impl TerminalProcess for PtySession {
    fn shell(&self) -> &ShellSpec {
        &self.shell
    }

    fn kind(&self) -> ShellKind {
        self.kind
    }

    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn data(&self) -> broadcast::Receiver<String> {
        self.subscribe_data()
    }

    fn errors(&self) -> broadcast::Receiver<String> {
        self.subscribe_errors()
    }

    fn exits(&self) -> broadcast::Receiver<ExitStatus> {
        self.subscribe_exit()
    }

    fn start(&self) {
        Self::start(self);
    }

    fn write(&self, text: &str) {
        Self::write(self, text);
    }

    fn resize(&self, cols: u16, rows: u16) {
        Self::resize(self, cols, rows);
    }

    fn kill(&self) {
        Self::kill(self);
    }
}

/// Spawns [`PtySession`]s for the session registry.
#[derive(Debug, Clone, Default)]
pub struct PtySpawner {
    shell: Option<ShellSpec>,
    options: SpawnOptions,
}

impl PtySpawner {
    #[must_use]
    pub const fn new(options: SpawnOptions) -> Self {
        Self {
            shell: None,
            options,
        }
    }

    /// Launch `shell` instead of resolving one per session.
    #[must_use]
    pub fn with_shell(mut self, shell: ShellSpec) -> Self {
        self.shell = Some(shell);
        self
    }
}

impl ProcessSpawner for PtySpawner {
    fn spawn(&self) -> Result<Arc<dyn TerminalProcess>, SpawnError> {
        let session = PtySession::spawn(self.shell.clone(), &self.options)?;
        Ok(Arc::new(session))
    }
}

const fn pty_size(size: TerminalSize) -> PtySize {
    PtySize {
        rows: size.rows,
        cols: size.cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

fn spawn_io_thread<F>(name: String, f: F) -> Result<(), PtyError>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new().name(name).spawn(f)?;
    Ok(())
}

fn drain_input(
    mut writer: Box<dyn Write + Send>,
    mut input: mpsc::UnboundedReceiver<String>,
    errors: &EventHub<String>,
) {
    while let Some(text) = input.blocking_recv() {
        if let Err(err) = writer
            .write_all(text.as_bytes())
            .and_then(|()| writer.flush())
        {
            tracing::debug!(?err, "PTY write failed");
            errors.emit(format!("write failed: {err}"));
            break;
        }
    }
}

fn pump_output(
    mut reader: Box<dyn Read + Send>,
    buffer: usize,
    data: &EventHub<String>,
    errors: &EventHub<String>,
) {
    let mut decoder = Utf8Decoder::new();
    let mut buf = vec![0u8; buffer.max(1)];

    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                let text = decoder.decode(&buf[..n]);
                if !text.is_empty() {
                    data.emit(text);
                }
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) if is_end_of_stream(&err) => break,
            Err(err) => {
                tracing::debug!(?err, "PTY read failed");
                errors.emit(format!("read failed: {err}"));
                break;
            }
        }
    }

    let rest = decoder.finish();
    if !rest.is_empty() {
        data.emit(rest);
    }
}

fn wait_for_exit(
    mut child: Box<dyn Child + Send + Sync>,
    exited: &AtomicBool,
    errors: &EventHub<String>,
) -> ExitStatus {
    let status = match child.wait() {
        Ok(status) => ExitStatus::new(status.exit_code()),
        Err(err) => {
            errors.emit(format!("wait failed: {err}"));
            ExitStatus::new(1)
        }
    };
    exited.store(true, Ordering::SeqCst);
    tracing::debug!(code = status.code, "Shell exited");
    status
}

/// Reading the master after the child side closes fails with `EIO` on Unix.
fn is_end_of_stream(err: &io::Error) -> bool {
    #[cfg(unix)]
    let closed = err.raw_os_error() == Some(EIO);
    #[cfg(not(unix))]
    let closed = false;
    closed || err.kind() == io::ErrorKind::BrokenPipe
}
