// SPDX-License-Identifier: GPL-3.0-only

//! Terminal UI
//!
//! Three screens: Read watches a directory for new images and saves what is
//! decoded, Codes lists saved codes for copying and deleting, Generate turns
//! typed text into a code. Tab and Shift+Tab switch screens; leaving Read
//! stops scanning.
//!
//! Codes are drawn with Unicode half-block characters, two modules per cell.

use crate::code::{Code, CodeFormat, CodeId};
use crate::config::Config;
use crate::constants::{self, timing};
use crate::content::ContentKind;
use crate::errors::GenerationError;
use crate::generator::{self, CodeMatrix, EcLevel, GenerateOptions};
use crate::repository::{CodeList, CodeRepository, RepositoryListener, ScanNotice};
use crate::scanner::{self, DecodeEvent, DirectoryWatchSource, ScanListener, StopHandle};
use crate::store::DeleteOutcome;

use crossterm::{
    clipboard::CopyToClipboard,
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    buffer::Buffer,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::Line,
    widgets::{Block, List, ListItem, ListState, Paragraph, Tabs, Widget, Wrap},
};
use std::io::{self, stdout};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Runtime;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Screen shown by the terminal UI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenRoute {
    Read,
    Codes,
    Generate,
}

impl ScreenRoute {
    pub const ALL: [ScreenRoute; 3] = [ScreenRoute::Read, ScreenRoute::Codes, ScreenRoute::Generate];

    pub fn title(self) -> &'static str {
        match self {
            ScreenRoute::Read => "Read",
            ScreenRoute::Codes => "Codes",
            ScreenRoute::Generate => "Generate",
        }
    }

    fn index(self) -> usize {
        match self {
            ScreenRoute::Read => 0,
            ScreenRoute::Codes => 1,
            ScreenRoute::Generate => 2,
        }
    }

    pub fn next(self) -> Self {
        Self::ALL[(self.index() + 1) % Self::ALL.len()]
    }

    pub fn previous(self) -> Self {
        Self::ALL[(self.index() + Self::ALL.len() - 1) % Self::ALL.len()]
    }

    fn hint(self) -> &'static str {
        match self {
            ScreenRoute::Read => "Enter start/stop | Tab switch | Esc quit",
            ScreenRoute::Codes => "c copy | d delete | r reload | Tab switch | Esc quit",
            ScreenRoute::Generate => {
                "F2 format | F3 level | Ctrl+S save | Ctrl+E export | Tab switch | Esc quit"
            }
        }
    }
}

/// Run the terminal UI
pub fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    let repository = rt.block_on(CodeRepository::open_sqlite(&config.database_path()))?;
    info!(version = constants::app_version(), "Starting terminal UI");

    // Set up terminal
    enable_raw_mode()?;
    let mut terminal = restore_on_error(
        || {
            let mut stdout = stdout();
            execute!(stdout, EnterAlternateScreen)?;
            Terminal::new(CrosstermBackend::new(stdout))
        },
        || {
            let _ = execute!(stdout(), LeaveAlternateScreen);
            let _ = disable_raw_mode();
        },
    )?;

    let mut app = App::new(config, repository);
    let result = run_app(&mut terminal, &rt, &mut app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    // Let saves and deletes started just before quitting reach the database
    app.finish(&rt);
    result
}

/// Run `setup`, calling `restore` if it fails
fn restore_on_error<T>(
    setup: impl FnOnce() -> io::Result<T>,
    restore: impl FnOnce(),
) -> io::Result<T> {
    setup().inspect_err(|e| {
        warn!(error = %e, "Terminal setup failed, restoring");
        restore();
    })
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    rt: &Runtime,
    app: &mut App,
) -> Result<(), Box<dyn std::error::Error>> {
    loop {
        app.pump();
        terminal.draw(|f| app.draw(f))?;

        if event::poll(timing::UI_TICK)?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            match app.handle_key(key, rt) {
                Effect::Quit => break,
                Effect::Copy(text) => {
                    match execute!(terminal.backend_mut(), CopyToClipboard::to_clipboard_from(text))
                    {
                        Ok(()) => app.set_status("Copied to clipboard"),
                        Err(e) => {
                            error!(error = %e, "Clipboard copy failed");
                            app.set_status(format!("Copy failed: {}", e));
                        }
                    }
                }
                Effect::None => {}
            }
        }
    }

    Ok(())
}

/// Work finished in the background, applied on the UI thread
enum UiEvent {
    Decoded(DecodeEvent),
    Notice(ScanNotice),
    ScanEnded { session: u64, result: Result<(), String> },
    Saved(Code),
    Deleted(CodeId, DeleteOutcome),
    Status(String),
}

/// Side effects that need the terminal itself
enum Effect {
    None,
    Quit,
    Copy(String),
}

/// Shows decodes on the Read screen and saves them
struct UiListener {
    save: Arc<RepositoryListener>,
    events: mpsc::UnboundedSender<UiEvent>,
}

impl ScanListener for UiListener {
    fn on_decode(&self, event: &DecodeEvent) {
        self.save.on_decode(event);
        let _ = self.events.send(UiEvent::Decoded(event.clone()));
    }

    fn on_permission_denied(&self) {
        self.save.on_permission_denied();
    }

    fn on_detector_error(&self, error: &crate::errors::DetectorError) {
        self.save.on_detector_error(error);
    }
}

struct ScanSession {
    id: u64,
    dir: PathBuf,
    stop: StopHandle,
}

#[derive(Default)]
struct ReadScreen {
    dir_input: String,
    session: Option<ScanSession>,
    sessions_started: u64,
    last: Option<DecodeEvent>,
    saved: usize,
}

struct GenerateScreen {
    text: String,
    format: CodeFormat,
    ec_level: EcLevel,
    preview: Option<Result<CodeMatrix, GenerationError>>,
}

impl GenerateScreen {
    fn regenerate(&mut self) {
        self.preview = if self.text.is_empty() {
            None
        } else {
            let options = GenerateOptions {
                ec_level: self.ec_level,
            };
            Some(generator::generate(&self.text, &self.format, &options))
        };
    }
}

struct App {
    route: ScreenRoute,
    config: Config,
    repository: CodeRepository,
    codes: CodeList,
    codes_rx: watch::Receiver<CodeList>,
    codes_state: ListState,
    read: ReadScreen,
    generate: GenerateScreen,
    status: Option<(String, Instant)>,
    events_tx: mpsc::UnboundedSender<UiEvent>,
    events_rx: mpsc::UnboundedReceiver<UiEvent>,
    /// Writes and scan tasks still running, joined before exit
    pending: Vec<JoinHandle<()>>,
}

impl App {
    fn new(config: Config, repository: CodeRepository) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let codes_rx = repository.subscribe();
        let codes = repository.codes();
        let mut codes_state = ListState::default();
        if !codes.is_empty() {
            codes_state.select(Some(0));
        }

        let dir_input = dirs::picture_dir()
            .or_else(dirs::home_dir)
            .map(|p| p.display().to_string())
            .unwrap_or_default();

        let generate = GenerateScreen {
            text: String::new(),
            format: config.default_format.clone(),
            ec_level: config.qr_ec_level,
            preview: None,
        };

        Self {
            route: ScreenRoute::Read,
            config,
            repository,
            codes,
            codes_rx,
            codes_state,
            read: ReadScreen {
                dir_input,
                ..ReadScreen::default()
            },
            generate,
            status: None,
            events_tx,
            events_rx,
            pending: Vec::new(),
        }
    }

    fn set_status(&mut self, message: impl Into<String>) {
        self.status = Some((message.into(), Instant::now()));
    }

    fn status_line(&self) -> String {
        match &self.status {
            Some((message, at)) if at.elapsed() < timing::STATUS_TIMEOUT => message.clone(),
            _ => self.route.hint().to_string(),
        }
    }

    /// Apply background results and list changes
    fn pump(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            self.apply(event);
        }

        if self.codes_rx.has_changed().unwrap_or(false) {
            self.codes = self.codes_rx.borrow_and_update().clone();
            let selected = match self.codes_state.selected() {
                _ if self.codes.is_empty() => None,
                Some(i) => Some(i.min(self.codes.len() - 1)),
                None => Some(0),
            };
            self.codes_state.select(selected);
        }

        self.pending.retain(|task| !task.is_finished());
    }

    fn apply(&mut self, event: UiEvent) {
        match event {
            UiEvent::Decoded(decoded) => {
                self.set_status(format!("Decoded {}", decoded.format.display_name()));
                self.read.last = Some(decoded);
            }
            UiEvent::Notice(ScanNotice::Saved(code)) => {
                self.read.saved += 1;
                self.set_status(format!("Saved code #{}", code.id));
            }
            UiEvent::Notice(ScanNotice::Failed(e)) => self.set_status(format!("Not saved: {}", e)),
            UiEvent::Notice(ScanNotice::PermissionDenied) => {
                self.set_status("Permission denied: cannot read the watch directory");
            }
            UiEvent::Notice(ScanNotice::DetectorError(e)) => warn!(error = %e, "Frame skipped"),
            UiEvent::ScanEnded { session, result } => {
                if self.read.session.as_ref().is_some_and(|s| s.id == session) {
                    self.read.session = None;
                }
                if let Err(e) = result {
                    self.set_status(format!("Scanning stopped: {}", e));
                }
            }
            UiEvent::Saved(code) => self.set_status(format!("Saved code #{}", code.id)),
            UiEvent::Deleted(id, DeleteOutcome::Deleted) => {
                self.set_status(format!("Deleted code #{}", id));
            }
            UiEvent::Deleted(id, DeleteOutcome::NotFound) => {
                self.set_status(format!("Code #{} was already gone", id));
            }
            UiEvent::Status(message) => self.set_status(message),
        }
    }

    /// Run a repository write in the background and report back
    fn spawn_write<F>(&mut self, rt: &Runtime, write: F)
    where
        F: Future<Output = UiEvent> + Send + 'static,
    {
        let events = self.events_tx.clone();
        self.pending.push(rt.spawn(async move {
            let _ = events.send(write.await);
        }));
    }

    fn finish(&mut self, rt: &Runtime) {
        self.stop_scan();
        let pending = std::mem::take(&mut self.pending);
        if pending.is_empty() {
            return;
        }
        info!(count = pending.len(), "Waiting for pending tasks");
        let results = rt.block_on(futures::future::join_all(pending));
        for result in results {
            if let Err(e) = result {
                warn!(error = %e, "Pending task failed");
            }
        }
    }

    fn switch_route(&mut self, route: ScreenRoute) {
        if self.route == ScreenRoute::Read && route != ScreenRoute::Read {
            self.stop_scan();
        }
        self.route = route;
        self.status = None;
    }

    fn handle_key(&mut self, key: KeyEvent, rt: &Runtime) -> Effect {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char('c') if ctrl => return Effect::Quit,
            KeyCode::Esc => return Effect::Quit,
            KeyCode::Tab => {
                self.switch_route(self.route.next());
                return Effect::None;
            }
            KeyCode::BackTab => {
                self.switch_route(self.route.previous());
                return Effect::None;
            }
            _ => {}
        }

        match self.route {
            ScreenRoute::Read => self.read_key(key, rt),
            ScreenRoute::Codes => return self.codes_key(key, rt),
            ScreenRoute::Generate => self.generate_key(key, ctrl, rt),
        }
        Effect::None
    }

    fn read_key(&mut self, key: KeyEvent, rt: &Runtime) {
        match key.code {
            KeyCode::Enter if self.read.session.is_some() => self.stop_scan(),
            KeyCode::Enter => self.start_scan(rt),
            KeyCode::Backspace if self.read.session.is_none() => {
                self.read.dir_input.pop();
            }
            KeyCode::Char(c) if self.read.session.is_none() => self.read.dir_input.push(c),
            _ => {}
        }
    }

    fn start_scan(&mut self, rt: &Runtime) {
        let dir = PathBuf::from(self.read.dir_input.trim());
        if !dir.is_dir() {
            self.set_status(format!("Not a directory: {}", dir.display()));
            return;
        }

        // RepositoryListener spawns its writer on the current runtime
        let _enter = rt.enter();
        let (save, mut notices, writer) = RepositoryListener::spawn(self.repository.clone());
        let listener = Arc::new(UiListener {
            save,
            events: self.events_tx.clone(),
        });
        let pipeline = scanner::pipeline_from_config(&self.config, listener);

        self.read.sessions_started += 1;
        let session = self.read.sessions_started;
        self.read.session = Some(ScanSession {
            id: session,
            dir: dir.clone(),
            stop: pipeline.stop_handle(),
        });

        let forward = self.events_tx.clone();
        rt.spawn(async move {
            while let Some(notice) = notices.recv().await {
                if forward.send(UiEvent::Notice(notice)).is_err() {
                    break;
                }
            }
        });

        let events = self.events_tx.clone();
        let poll = self.config.watch_poll_interval();
        let run = rt.spawn(async move {
            let mut source = DirectoryWatchSource::new(dir, poll).skip_existing();
            let result = pipeline
                .run(&mut source)
                .await
                .map(|_| ())
                .map_err(|e| e.to_string());
            let _ = events.send(UiEvent::ScanEnded { session, result });
        });
        // The writer drains once the run task drops the pipeline and its listener
        self.pending.push(run);
        self.pending.push(writer);

        self.set_status("Scanning: drop images into the directory");
    }

    fn stop_scan(&mut self) {
        if let Some(session) = self.read.session.take() {
            session.stop.stop();
            info!(dir = %session.dir.display(), "Stopped scanning");
            self.set_status("Scanning stopped");
        }
    }

    fn selected_code(&self) -> Option<&Code> {
        self.codes_state.selected().and_then(|i| self.codes.get(i))
    }

    fn codes_key(&mut self, key: KeyEvent, rt: &Runtime) -> Effect {
        let len = self.codes.len();
        match key.code {
            KeyCode::Up | KeyCode::Char('k') if len > 0 => {
                let i = self.codes_state.selected().unwrap_or(0);
                self.codes_state.select(Some(i.saturating_sub(1)));
            }
            KeyCode::Down | KeyCode::Char('j') if len > 0 => {
                let i = self.codes_state.selected().map_or(0, |i| i + 1);
                self.codes_state.select(Some(i.min(len - 1)));
            }
            KeyCode::Home if len > 0 => self.codes_state.select(Some(0)),
            KeyCode::End if len > 0 => self.codes_state.select(Some(len - 1)),
            KeyCode::Enter | KeyCode::Char('c') => {
                if let Some(code) = self.selected_code() {
                    return Effect::Copy(code.content.clone());
                }
            }
            KeyCode::Delete | KeyCode::Char('d') => {
                if let Some(id) = self.selected_code().map(|c| c.id) {
                    let repository = self.repository.clone();
                    self.spawn_write(rt, async move {
                        match repository.delete(id).await {
                            Ok(outcome) => UiEvent::Deleted(id, outcome),
                            Err(e) => UiEvent::Status(format!("Delete failed: {}", e)),
                        }
                    });
                }
            }
            KeyCode::Char('r') => {
                let repository = self.repository.clone();
                self.spawn_write(rt, async move {
                    match repository.refresh().await {
                        Ok(()) => UiEvent::Status("Reloaded".into()),
                        Err(e) => UiEvent::Status(format!("Reload failed: {}", e)),
                    }
                });
            }
            _ => {}
        }
        Effect::None
    }

    fn generate_key(&mut self, key: KeyEvent, ctrl: bool, rt: &Runtime) {
        match key.code {
            KeyCode::Char('s') if ctrl => self.save_generated(rt),
            KeyCode::Char('e') if ctrl => self.export_generated(),
            KeyCode::Char('u') if ctrl => {
                self.generate.text.clear();
                self.generate.regenerate();
            }
            KeyCode::F(2) => {
                let formats = CodeFormat::GENERATABLE;
                let i = formats
                    .iter()
                    .position(|f| *f == self.generate.format)
                    .map_or(0, |i| (i + 1) % formats.len());
                self.generate.format = formats[i].clone();
                self.generate.regenerate();
            }
            KeyCode::F(3) => {
                self.generate.ec_level = self.generate.ec_level.next();
                self.generate.regenerate();
            }
            KeyCode::Backspace => {
                self.generate.text.pop();
                self.generate.regenerate();
            }
            KeyCode::Char(c) if !ctrl => {
                self.generate.text.push(c);
                self.generate.regenerate();
            }
            _ => {}
        }
    }

    fn save_generated(&mut self, rt: &Runtime) {
        let (text, format) = match &self.generate.preview {
            Some(Ok(matrix)) => (matrix.text().to_string(), matrix.format().clone()),
            Some(Err(e)) => {
                let message = format!("Cannot save: {}", e);
                self.set_status(message);
                return;
            }
            None => {
                self.set_status("Type something to generate first");
                return;
            }
        };

        let repository = self.repository.clone();
        self.spawn_write(rt, async move {
            match repository.add(&text, format).await {
                Ok(code) => UiEvent::Saved(code),
                Err(e) => UiEvent::Status(format!("Save failed: {}", e)),
            }
        });
    }

    fn export_generated(&mut self) {
        let Some(Ok(matrix)) = &self.generate.preview else {
            self.set_status("Nothing to export");
            return;
        };

        let dir = dirs::picture_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(constants::APP_DIR_NAME);
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let path = dir.join(format!("code_{}.png", timestamp));

        let result = std::fs::create_dir_all(&dir)
            .map_err(crate::errors::AppError::from)
            .and_then(|()| matrix.save_png(&path, &self.config.render_options()));
        match result {
            Ok(()) => self.set_status(format!("Exported: {}", path.display())),
            Err(e) => {
                error!(error = %e, "Failed to export code image");
                self.set_status(format!("Export failed: {}", e));
            }
        }
    }

    fn draw(&mut self, f: &mut Frame) {
        let [tabs_area, body, status_area] = Layout::vertical([
            Constraint::Length(1),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .areas(f.area());

        let tabs = Tabs::new(ScreenRoute::ALL.iter().map(|r| r.title()))
            .select(self.route.index())
            .highlight_style(
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            );
        f.render_widget(tabs, tabs_area);

        match self.route {
            ScreenRoute::Read => self.draw_read(f, body),
            ScreenRoute::Codes => self.draw_codes(f, body),
            ScreenRoute::Generate => self.draw_generate(f, body),
        }

        let message = self.status_line();
        f.render_widget(StatusBar { message: &message }, status_area);
    }

    fn draw_read(&self, f: &mut Frame, area: Rect) {
        let read = &self.read;
        let mut lines = vec![
            Line::from(format!("Watch directory: {}", read.dir_input)),
            Line::from(match &read.session {
                Some(_) => "State: scanning".to_string(),
                None => "State: idle".to_string(),
            }),
            Line::from(format!("Saved this session: {}", read.saved)),
            Line::from(""),
        ];

        match &read.last {
            Some(last) => {
                let kind = ContentKind::classify(&last.content);
                lines.push(Line::from(format!(
                    "Last decoded ({}, {}):",
                    last.format.display_name(),
                    kind.summary()
                )));
                lines.push(Line::from(last.content.clone()));
            }
            None => lines.push(Line::from("Nothing decoded yet")),
        }

        let paragraph = Paragraph::new(lines)
            .block(Block::bordered().title(format!(" codeshelf {} ", constants::app_version())))
            .wrap(Wrap { trim: false });
        f.render_widget(paragraph, area);
    }

    fn draw_codes(&mut self, f: &mut Frame, area: Rect) {
        let [list_area, detail_area] =
            Layout::vertical([Constraint::Min(3), Constraint::Length(5)]).areas(area);

        let items: Vec<ListItem> = self
            .codes
            .iter()
            .map(|code| {
                let kind = ContentKind::classify(&code.content);
                let first_line = code.content.lines().next().unwrap_or_default();
                ListItem::new(format!(
                    "{:>4}  {:<6}  {}  [{}]",
                    code.id,
                    code.format.display_name(),
                    first_line,
                    kind.action_label()
                ))
            })
            .collect();

        let list = List::new(items)
            .block(Block::bordered().title(format!(" Saved codes ({}) ", self.codes.len())))
            .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
            .highlight_symbol("> ");
        f.render_stateful_widget(list, list_area, &mut self.codes_state);

        let detail = match self.selected_code() {
            Some(code) => vec![
                Line::from(format!(
                    "#{}  {}  {}",
                    code.id,
                    code.format.display_name(),
                    code.created_at
                        .with_timezone(&chrono::Local)
                        .format("%Y-%m-%d %H:%M:%S")
                )),
                Line::from(ContentKind::classify(&code.content).summary()),
                Line::from(code.content.clone()),
            ],
            None => vec![Line::from("No saved codes")],
        };
        let detail = Paragraph::new(detail)
            .block(Block::bordered())
            .wrap(Wrap { trim: false });
        f.render_widget(detail, detail_area);
    }

    fn draw_generate(&self, f: &mut Frame, area: Rect) {
        let [input_area, preview_area] =
            Layout::vertical([Constraint::Length(3), Constraint::Min(0)]).areas(area);

        let title = format!(
            " Text ({}, level {}) ",
            self.generate.format.display_name(),
            self.generate.ec_level
        );
        let input = Paragraph::new(format!("{}_", self.generate.text))
            .block(Block::bordered().title(title));
        f.render_widget(input, input_area);

        match &self.generate.preview {
            Some(Ok(matrix)) => f.render_widget(MatrixWidget { matrix }, preview_area),
            Some(Err(e)) => f.render_widget(Message(&e.to_string()), preview_area),
            None => f.render_widget(Message("Type text to generate a code"), preview_area),
        }
    }
}

/// Centered one-line message
struct Message<'a>(&'a str);

impl Widget for Message<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let width = self.0.chars().count() as u16;
        let x = area.x + area.width.saturating_sub(width) / 2;
        let y = area.y + area.height / 2;
        if y < area.y + area.height && x < area.x + area.width {
            let text: String = self.0.chars().take(area.width as usize).collect();
            buf.set_string(x, y, text, Style::default());
        }
    }
}

/// Renders a code matrix with half-block characters, black on white
struct MatrixWidget<'a> {
    matrix: &'a CodeMatrix,
}

impl MatrixWidget<'_> {
    const QUIET: usize = 2;
    /// Bar height of linear codes, in half cells
    const BAR_ROWS: usize = 16;
}

impl Widget for MatrixWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let matrix = self.matrix;
        let quiet = Self::QUIET;
        let rows = if matrix.is_linear() {
            Self::BAR_ROWS
        } else {
            matrix.height()
        };

        let width = matrix.width() + quiet * 2;
        let cells_high = (rows + quiet * 2).div_ceil(2);
        if width > area.width as usize || cells_high > area.height as usize {
            Message("Too large to preview here, export with Ctrl+E").render(area, buf);
            return;
        }

        let x_offset = area.x + (area.width - width as u16) / 2;
        let y_offset = area.y + (area.height - cells_high as u16) / 2;

        let dark = |x: usize, y: usize| -> bool {
            if x < quiet || y < quiet || y >= quiet + rows {
                return false;
            }
            let row = if matrix.is_linear() { 0 } else { y - quiet };
            matrix.get(x - quiet, row)
        };
        let color = |dark: bool| if dark { Color::Black } else { Color::White };

        // Each terminal cell shows two modules: top as fg, bottom as bg
        for ty in 0..cells_high {
            for tx in 0..width {
                let top = dark(tx, ty * 2);
                let bottom = dark(tx, ty * 2 + 1);
                if let Some(cell) = buf.cell_mut((x_offset + tx as u16, y_offset + ty as u16)) {
                    cell.set_char('▀');
                    cell.set_fg(color(top));
                    cell.set_bg(color(bottom));
                }
            }
        }
    }
}

/// Status bar widget
struct StatusBar<'a> {
    message: &'a str,
}

impl Widget for StatusBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        // Fill background
        for x in area.x..area.x + area.width {
            if let Some(cell) = buf.cell_mut((x, area.y)) {
                cell.set_char(' ');
                cell.set_bg(Color::DarkGray);
            }
        }

        let text: String = self.message.chars().take(area.width as usize).collect();
        buf.set_string(
            area.x,
            area.y,
            text,
            Style::default().fg(Color::White).bg(Color::DarkGray),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routes_cycle_both_ways() {
        let mut route = ScreenRoute::Read;
        for _ in 0..ScreenRoute::ALL.len() {
            route = route.next();
        }
        assert_eq!(route, ScreenRoute::Read);
        assert_eq!(ScreenRoute::Read.previous(), ScreenRoute::Generate);
        assert_eq!(ScreenRoute::Codes.next().title(), "Generate");
    }

    #[test]
    fn test_matrix_widget_draws_finder_corner() {
        let matrix =
            generator::generate("hi", &CodeFormat::Qr, &GenerateOptions::default()).unwrap();
        let area = Rect::new(0, 0, 30, 15);
        let mut buf = Buffer::empty(area);
        MatrixWidget { matrix: &matrix }.render(area, &mut buf);

        // 25 columns and 13 rows centered in 30x15
        let quiet_cell = buf.cell((2, 1)).unwrap();
        assert_eq!(quiet_cell.fg, Color::White);
        assert_eq!(quiet_cell.bg, Color::White);

        let corner = buf.cell((4, 2)).unwrap();
        assert_eq!(corner.symbol(), "▀");
        assert_eq!(corner.fg, Color::Black);
        assert_eq!(corner.bg, Color::Black);
    }

    #[test]
    fn test_matrix_widget_reports_oversized_code() {
        let matrix =
            generator::generate("hi", &CodeFormat::Qr, &GenerateOptions::default()).unwrap();
        let area = Rect::new(0, 0, 10, 5);
        let mut buf = Buffer::empty(area);
        MatrixWidget { matrix: &matrix }.render(area, &mut buf);
        assert_ne!(buf.cell((0, 2)).unwrap().symbol(), "▀");
    }

    #[test]
    fn test_restore_runs_only_when_setup_fails() {
        let mut restored = false;
        let value = restore_on_error(|| Ok(7), || restored = true).unwrap();
        assert_eq!(value, 7);
        assert!(!restored);

        let result: io::Result<()> =
            restore_on_error(|| Err(io::Error::other("no tty")), || restored = true);
        assert!(result.is_err());
        assert!(restored);
    }

    #[test]
    fn test_quit_waits_for_scanned_code_to_be_saved() {
        let rt = Runtime::new().unwrap();
        let store = Arc::new(crate::store::MemoryStore::new());
        let repository = rt.block_on(CodeRepository::open(store.clone())).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            watch_poll_ms: 10,
            ..Config::default()
        };

        let mut app = App::new(config, repository);
        app.read.dir_input = dir.path().display().to_string();
        app.start_scan(&rt);
        assert!(app.read.session.is_some());

        let matrix =
            generator::generate("SHELF-042", &CodeFormat::Qr, &GenerateOptions::default())
                .unwrap();
        let render = crate::generator::RenderOptions::default();
        let deadline = Instant::now() + std::time::Duration::from_secs(10);
        let mut written = 0;
        let decoded = loop {
            assert!(Instant::now() < deadline, "nothing decoded");
            // Files present when the watcher starts are skipped, so keep adding.
            // Renaming keeps the watcher from reading a half-written image.
            let staging = dir.path().join("staging.part");
            matrix.save_png(&staging, &render).unwrap();
            std::fs::rename(&staging, dir.path().join(format!("{written}.png"))).unwrap();
            written += 1;

            rt.block_on(async { tokio::time::sleep(std::time::Duration::from_millis(50)).await });
            let mut found = None;
            while let Ok(event) = app.events_rx.try_recv() {
                if let UiEvent::Decoded(event) = event {
                    found = Some(event);
                }
            }
            if let Some(event) = found {
                break event;
            }
        };
        assert_eq!(decoded.content, "SHELF-042");

        // Quit right away; the queued save must still land
        app.finish(&rt);
        assert!(app.read.session.is_none());
        assert_eq!(store.insert_count(), 1);
    }

    #[test]
    fn test_saving_over_capacity_preview_writes_nothing() {
        let rt = Runtime::new().unwrap();
        let store = Arc::new(crate::store::MemoryStore::new());
        let repository = rt.block_on(CodeRepository::open(store.clone())).unwrap();
        let mut app = App::new(Config::default(), repository);

        app.generate.text = "x".repeat(EcLevel::H.byte_capacity() + 1);
        app.generate.ec_level = EcLevel::H;
        app.generate.regenerate();
        app.save_generated(&rt);
        app.finish(&rt);

        assert_eq!(store.insert_count(), 0);
        let (status, _) = app.status.as_ref().unwrap();
        assert!(status.starts_with("Cannot save"), "{status}");
    }

    #[test]
    fn test_status_bar_truncates_multibyte_text() {
        let area = Rect::new(0, 0, 3, 1);
        let mut buf = Buffer::empty(area);
        StatusBar { message: "ééééé" }.render(area, &mut buf);
        assert_eq!(buf.cell((2, 0)).unwrap().symbol(), "é");
    }
}
