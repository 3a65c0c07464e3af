//! Tabbed shell multiplexer with ratatui.
//!
//! Run with: cargo run -p tabmux-tui
//!
//! Ctrl+T opens a tab, Ctrl+N switches to the next one, Ctrl+W closes the
//! current one and Ctrl+Q quits. Everything else goes to the focused shell.
//! Logs go to `tabmux.log` in the temp directory; filter with `RUST_LOG`.

mod keys;
mod screen;
mod surface;

use std::{
    fs::File,
    io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Tabs},
};
use tabmux_core::{ContainerHandle, TerminalSize, WindowEvents};
use tabmux_pty::{PtySpawner, SpawnOptions};
use tabmux_session::SessionRegistry;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    keys::{Command, key_to_input},
    surface::TuiHost,
};

/// Rows taken by the tab bar, pane borders and status line.
const CHROME_ROWS: u16 = 4;
/// Columns taken by the pane borders.
const CHROME_COLS: u16 = 2;

#[tokio::main]
async fn main() -> io::Result<()> {
    let log_path = init_logging()?;

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, &log_path);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(e) = result {
        eprintln!("Error: {e}");
    }

    Ok(())
}

fn init_logging() -> io::Result<PathBuf> {
    let path = std::env::temp_dir().join("tabmux.log");
    let file = File::create(&path)?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    Ok(path)
}

const fn pane_size(width: u16, height: u16) -> TerminalSize {
    TerminalSize::new(
        width.saturating_sub(CHROME_COLS),
        height.saturating_sub(CHROME_ROWS),
    )
}

struct App {
    registry: SessionRegistry,
    host: Arc<TuiHost>,
    container: ContainerHandle,
    status: String,
}

impl App {
    fn new(viewport: TerminalSize) -> Self {
        let host = Arc::new(TuiHost::new(viewport));
        let spawner =
            PtySpawner::new(SpawnOptions::default().with_size(viewport.cols, viewport.rows));
        let registry = SessionRegistry::new(Arc::new(spawner), host.clone(), WindowEvents::new());

        Self {
            registry,
            host,
            container: ContainerHandle::from("main"),
            status: String::new(),
        }
    }

    fn new_tab(&mut self) {
        match self.registry.create(&self.container) {
            Ok(index) => self.status = format!("Opened tab {}", index + 1),
            Err(e) => {
                tracing::error!(%e, "Failed to open tab");
                self.status = format!("Failed: {e}");
            }
        }
    }

    fn next_tab(&mut self) {
        let Some(current) = self.registry.current() else {
            return;
        };
        let next = (current + 1) % self.registry.len().max(1);
        if let Err(e) = self.registry.focus_tab(next) {
            self.status = format!("Failed: {e}");
        }
    }

    fn close_tab(&mut self) {
        match self.registry.destroy(None) {
            Ok(index) => self.status = format!("Closed tab {}", index + 1),
            Err(e) => self.status = format!("Failed: {e}"),
        }
    }

    fn resize(&self, width: u16, height: u16) {
        self.host.set_viewport(pane_size(width, height));
        self.registry.window().notify_resized();
    }

    fn send_input(&self, text: String) {
        if let Some(surface) = self
            .registry
            .current_session()
            .and_then(|session| self.host.surface(session.id))
        {
            surface.send_keys(text);
        }
    }
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    log_path: &Path,
) -> io::Result<()> {
    let size = terminal.size()?;
    let mut app = App::new(pane_size(size.width, size.height));
    app.new_tab();
    tracing::info!(log = %log_path.display(), "tabmux started");

    loop {
        terminal.draw(|f| ui(f, &app))?;

        if !event::poll(Duration::from_millis(50))? {
            continue;
        }

        match event::read()? {
            Event::Key(key) if key.kind == KeyEventKind::Press => match Command::from_key(&key) {
                Some(Command::Quit) => {
                    app.registry.destroy_all();
                    return Ok(());
                }
                Some(Command::NewTab) => app.new_tab(),
                Some(Command::NextTab) => app.next_tab(),
                Some(Command::CloseTab) => app.close_tab(),
                None => {
                    if let Some(text) = key_to_input(&key) {
                        app.send_input(text);
                    }
                }
            },
            Event::Resize(width, height) => app.resize(width, height),
            _ => {}
        }
    }
}

fn ui(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Tabs
            Constraint::Min(3),    // Output
            Constraint::Length(1), // Status
        ])
        .split(f.area());

    let sessions = app.registry.sessions();
    let current = app.registry.current_session();

    // Tab bar
    let titles = sessions
        .iter()
        .map(|s| format!("{}:{}", s.index + 1, s.title));
    let tabs = Tabs::new(titles)
        .select(current.as_ref().map_or(0, |s| s.index))
        .highlight_style(Style::default().fg(Color::Yellow));
    f.render_widget(tabs, chunks[0]);

    // Output pane
    let surface = current.as_ref().and_then(|s| app.host.surface(s.id));
    let pane_title = current
        .as_ref()
        .map_or_else(|| "No sessions".to_string(), |s| s.shell.to_string());
    let rows = usize::from(chunks[1].height.saturating_sub(2));
    let lines: Vec<Line> = match &surface {
        Some(surface) => surface
            .visible_lines(rows)
            .into_iter()
            .map(Line::from)
            .collect(),
        None => vec![Line::from("Press Ctrl+T to open a shell.")],
    };
    let output =
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(pane_title));
    f.render_widget(output, chunks[1]);

    // Status bar
    let status_style = if app.status.starts_with("Failed") {
        Style::default().fg(Color::Red)
    } else {
        Style::default().fg(Color::Green)
    };
    let key = Style::default().fg(Color::Yellow);
    let status = Paragraph::new(Line::from(vec![
        Span::raw(" "),
        Span::styled(&app.status, status_style),
        Span::raw(" | "),
        Span::styled("Ctrl+T", key),
        Span::raw(" new | "),
        Span::styled("Ctrl+N", key),
        Span::raw(" next | "),
        Span::styled("Ctrl+W", key),
        Span::raw(" close | "),
        Span::styled("Ctrl+Q", key),
        Span::raw(" quit "),
    ]));
    f.render_widget(status, chunks[2]);
}
