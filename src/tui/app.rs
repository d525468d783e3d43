//! TUI Application - Main entry point and run loop

use std::io::{self, Stdout};
use std::sync::Arc;
use std::time::Duration;

use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend as TerminalBackend, CrosstermBackend},
    layout::{Constraint, Direction, Layout, Rect},
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame, Terminal,
};
use tokio::sync::mpsc;

use super::events::{handle_key_event, poll_event, Action};
use super::state::{ActivityEvent, ActivityEventType, AppState, InputMode, SyncStatus};
use super::theme::{icons, DashboardTheme};
use super::widgets::{card_lines, utils};
use crate::backend::Backend;
use crate::config::SyncTimings;
use crate::error::AssignmentError;
use crate::model::Column;
use crate::session::{SessionContext, SessionGuard};
use crate::sync::{SyncEngine, SyncEvent};

const TICK_RATE: Duration = Duration::from_millis(50);

/// TUI Application
pub struct TuiApp {
    state: AppState,
    theme: DashboardTheme,
    backend: Arc<dyn Backend>,
    guard: SessionGuard,
    context: SessionContext,
    timings: SyncTimings,
    engine: SyncEngine,
    events: mpsc::UnboundedReceiver<SyncEvent>,
    logout: bool,
}

impl TuiApp {
    /// Create the dashboard for an entered session. The engine starts with [`run`](Self::run).
    pub fn new(
        backend: Arc<dyn Backend>,
        guard: SessionGuard,
        context: SessionContext,
        timings: SyncTimings,
    ) -> Self {
        let (engine, events) = SyncEngine::new(backend.clone(), &context, timings);
        Self {
            state: AppState::new(context.username()),
            theme: DashboardTheme::new(),
            backend,
            guard,
            context,
            timings,
            engine,
            events,
            logout: false,
        }
    }

    /// Run the TUI application
    pub async fn run(mut self) -> anyhow::Result<()> {
        let mut terminal = self.setup_terminal()?;

        self.state.push_event(ActivityEvent::info(format!(
            "Signed in as {}",
            self.context.username()
        )));
        self.engine.start();

        let result = self.main_loop(&mut terminal).await;

        self.engine.shutdown().await;
        self.restore_terminal(&mut terminal)?;

        if self.logout {
            self.guard.logout(&self.context)?;
            tracing::info!(username = %self.context.username(), "Logged out");
        }

        result
    }

    /// Setup terminal for TUI
    fn setup_terminal(&self) -> anyhow::Result<Terminal<CrosstermBackend<Stdout>>> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;
        Ok(terminal)
    }

    /// Restore terminal to normal state
    fn restore_terminal(
        &self,
        terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    ) -> anyhow::Result<()> {
        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        )?;
        terminal.show_cursor()?;
        Ok(())
    }

    /// Main event loop
    async fn main_loop<B: TerminalBackend>(
        &mut self,
        terminal: &mut Terminal<B>,
    ) -> anyhow::Result<()> {
        loop {
            terminal.draw(|frame| self.render(frame))?;

            if let Some(key) = poll_event(TICK_RATE)? {
                let action = handle_key_event(key, &mut self.state);
                self.dispatch(action);
            }

            self.drain_events().await;

            if self.state.should_quit {
                break;
            }
        }

        Ok(())
    }

    /// Fold pending engine events; a reload request swaps in a fresh engine
    async fn drain_events(&mut self) {
        let mut reload = false;
        while let Ok(event) = self.events.try_recv() {
            if matches!(event, SyncEvent::ReloadRequested) {
                reload = true;
            }
            self.state.apply(event);
        }
        if reload {
            self.reload().await;
        }
    }

    async fn reload(&mut self) {
        tracing::info!(username = %self.context.username(), "Reloading dashboard");
        self.engine.shutdown().await;
        self.state.reset_for_reload();

        let (engine, events) =
            SyncEngine::new(self.backend.clone(), &self.context, self.timings);
        engine.start();
        self.engine = engine;
        self.events = events;
    }

    fn dispatch(&mut self, action: Action) {
        match action {
            Action::Quit => self.state.should_quit = true,
            Action::Logout => {
                self.logout = true;
                self.state.should_quit = true;
            }
            Action::Refresh => {
                self.state
                    .push_event(ActivityEvent::info(format!("{} Manual refresh", icons::REFRESH)));
                self.engine.refresh_now();
            }
            Action::CycleWorker => {
                let Some(case_number) = self.state.selected_task().map(|t| t.case_number.clone())
                else {
                    return;
                };
                match self.state.next_worker(&case_number) {
                    Some(worker) => self.engine.select_worker(&case_number, worker),
                    None => self
                        .state
                        .push_event(ActivityEvent::warning("No workers available")),
                }
            }
            Action::Assign => {
                let Some(task) = self.state.selected_task().cloned() else {
                    return;
                };
                match self.engine.assign(&task) {
                    Ok(()) => {}
                    // already alerted by the engine
                    Err(AssignmentError::NoWorkerSelected { .. }) => {}
                    Err(e) => self
                        .state
                        .push_event(ActivityEvent::warning(e.user_message())),
                }
            }
            Action::SubmitUpload { case_number, path } => {
                self.state.push_event(ActivityEvent::info(format!(
                    "{} Uploading {} for task {}",
                    icons::UPLOAD,
                    path.display(),
                    case_number
                )));
                self.engine.upload_file(&case_number, path);
            }
            Action::NextColumn
            | Action::PrevColumn
            | Action::ScrollUp
            | Action::ScrollDown
            | Action::EditUpload
            | Action::CancelInput
            | Action::None => {}
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Rendering
    // ─────────────────────────────────────────────────────────────────────

    /// Render the UI
    fn render(&self, frame: &mut Frame) {
        let area = frame.area();
        let banner_height = if self.state.notification.is_some() { 1 } else { 0 };

        // Header, Banner, Board, Bottom panels, Footer
        let main_chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Length(banner_height),
                Constraint::Min(10),
                Constraint::Length(10),
                Constraint::Length(1),
            ])
            .split(area);

        self.render_header(frame, main_chunks[0]);
        self.render_banner(frame, main_chunks[1]);

        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Ratio(1, 3),
                Constraint::Ratio(1, 3),
                Constraint::Ratio(1, 3),
            ])
            .split(main_chunks[2]);
        for (column, area) in Column::ALL.into_iter().zip(columns.iter()) {
            self.render_column(frame, *area, column);
        }

        let bottom = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(main_chunks[3]);
        self.render_activity(frame, bottom[0]);
        self.render_details(frame, bottom[1]);

        self.render_footer(frame, main_chunks[4]);
    }

    fn render_header(&self, frame: &mut Frame, area: Rect) {
        let status_style = match self.state.status {
            SyncStatus::Live => self.theme.success(),
            SyncStatus::Connecting => self.theme.warning(),
            SyncStatus::Reloading => self.theme.highlight(),
        };

        let timer = if self.state.refreshing {
            Span::styled(format!("{} Refreshing...", icons::REFRESH), self.theme.accent())
        } else if self.state.status == SyncStatus::Live {
            Span::styled(
                format!(
                    "{} Next refresh in {}",
                    icons::REFRESH,
                    utils::format_countdown(self.state.countdown)
                ),
                self.theme.text(),
            )
        } else {
            Span::styled("", self.theme.dimmed())
        };

        let header = Line::from(vec![
            Span::styled(format!("{} FMS CONTROLLER", icons::APP), self.theme.header()),
            Span::raw("  │  "),
            Span::styled(&self.state.username, self.theme.accent()),
            Span::raw("  │  "),
            Span::styled(self.state.status.to_string(), status_style),
            Span::raw("  │  "),
            timer,
            Span::raw("  │  "),
            Span::styled(
                format!("{} tasks", self.state.board.total()),
                self.theme.text(),
            ),
            Span::raw("  "),
            Span::styled(
                format!("{} {}", icons::NEW_MESSAGE, self.state.flagged_threads()),
                self.theme.dimmed(),
            ),
        ]);

        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(self.theme.header())
            .title(" TASK BOARD ");

        frame.render_widget(Paragraph::new(header).block(block), area);
    }

    fn render_banner(&self, frame: &mut Frame, area: Rect) {
        if let Some(notification) = &self.state.notification {
            let line = Line::from(Span::styled(
                format!(" {} {} ", icons::NEW_MESSAGE, notification.message),
                self.theme.banner(),
            ));
            frame.render_widget(Paragraph::new(line), area);
        }
    }

    fn render_column(&self, frame: &mut Frame, area: Rect, column: Column) {
        let focused = self.state.focus == column;
        let selected = self.state.selected_index(column);
        let width = area.width.saturating_sub(2) as usize;

        let cards = self.state.cards(column);
        let mut lines: Vec<Line> = Vec::new();
        let mut selected_span = (0usize, 0usize);
        for (index, card) in cards.iter().enumerate() {
            let is_selected = focused && index == selected;
            let card = card_lines(card, &self.theme, width, is_selected);
            if index == selected {
                selected_span = (lines.len(), card.len());
            }
            lines.extend(card);
            lines.push(Line::from(""));
        }
        if cards.is_empty() {
            lines.push(Line::from(Span::styled("  No tasks", self.theme.dimmed())));
        }

        // keep the selected card in view
        let visible = area.height.saturating_sub(2) as usize;
        let (start, len) = selected_span;
        let offset = (start + len).saturating_sub(visible);

        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(self.theme.column_border(column, focused))
            .title(format!(" {} ({}) ", column, cards.len()));

        let paragraph = Paragraph::new(lines)
            .block(block)
            .scroll((offset as u16, 0));
        frame.render_widget(paragraph, area);
    }

    fn render_activity(&self, frame: &mut Frame, area: Rect) {
        let events: Vec<Line> = self
            .state
            .events
            .iter()
            .take(area.height.saturating_sub(2) as usize)
            .map(|e| {
                let style = match e.event_type {
                    ActivityEventType::Info => self.theme.text(),
                    ActivityEventType::Message => self.theme.accent(),
                    ActivityEventType::Warning => self.theme.warning(),
                    ActivityEventType::Error => self.theme.error(),
                };
                Line::from(vec![
                    Span::raw(" "),
                    Span::styled(e.icon(), style),
                    Span::raw(" "),
                    Span::styled(&e.message, style),
                ])
            })
            .collect();

        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(self.theme.dimmed())
            .title(" ACTIVITY ");

        frame.render_widget(Paragraph::new(events).block(block), area);
    }

    fn render_details(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(self.theme.dimmed())
            .title(" DETAILS ");

        let Some(task) = self.state.selected_task() else {
            let empty = Line::from(Span::styled(" Select a task", self.theme.dimmed()));
            frame.render_widget(Paragraph::new(empty).block(block), area);
            return;
        };
        let card = self.state.card(task);

        let field = |label: &'static str, value: Option<&str>| {
            Line::from(vec![
                Span::styled(format!(" {:<10}", label), self.theme.dimmed()),
                Span::styled(value.unwrap_or("-").to_string(), self.theme.text()),
            ])
        };

        let mut lines = vec![
            Line::from(Span::styled(format!(" {}", card.headline), self.theme.highlight())),
            field("FBG", Some(card.fbg.as_str()).filter(|f| !f.is_empty())),
            field("Created", card.created_by.as_deref()),
            field("Date", card.date.as_deref()),
            field("Assigned", card.assigned_to.as_deref()),
            field("Worker", card.selected_worker.as_deref()),
        ];

        if card.messages.is_empty() {
            lines.push(Line::from(Span::styled(" No messages", self.theme.dimmed())));
        }
        for message in &card.messages {
            lines.push(Line::from(vec![
                Span::styled(
                    format!(" {} ({}): ", message.sender, message.date),
                    self.theme.accent(),
                ),
                Span::styled(message.message.clone(), self.theme.text()),
            ]));
        }

        let paragraph = Paragraph::new(lines)
            .block(block)
            .wrap(Wrap { trim: false });
        frame.render_widget(paragraph, area);
    }

    fn render_footer(&self, frame: &mut Frame, area: Rect) {
        let footer = match &self.state.input {
            InputMode::UploadPath {
                case_number,
                buffer,
            } => Line::from(vec![
                Span::styled(
                    format!(" {} File for {}: ", icons::UPLOAD, case_number),
                    self.theme.accent(),
                ),
                Span::styled(format!("{}_", buffer), self.theme.text()),
                Span::raw("  "),
                Span::styled("[Enter]", self.theme.highlight()),
                Span::raw(" upload "),
                Span::styled("[Esc]", self.theme.highlight()),
                Span::raw(" cancel"),
            ]),
            InputMode::Normal => {
                let key = |k: &'static str| Span::styled(k, self.theme.highlight());
                let label = |l: &'static str| Span::styled(l, Style::default());
                Line::from(vec![
                    Span::raw(" "),
                    key("[q]"),
                    label("uit "),
                    key("[r]"),
                    label("efresh "),
                    key("[Tab]"),
                    label(" column "),
                    key("[j/k]"),
                    label(" select "),
                    key("[w]"),
                    label("orker "),
                    key("[a]"),
                    label("ssign "),
                    key("[u]"),
                    label("pload "),
                    key("[L]"),
                    label("ogout"),
                ])
            }
        };

        frame.render_widget(Paragraph::new(footer), area);
    }
}
