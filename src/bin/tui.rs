//! Attendance TUI - terminal dashboard for the worker
//!
//! Runs the same worker session as the headless agent and renders it:
//! - clock, presence (inside/outside, distance) and the notification badge
//! - today's attendance marks
//! - order progress bars, colored by level
//! - toasts, dismissed after the configured TTL
//!
//! Keys: `c` check in, `a` toggle automatic attendance, `p` update progress,
//! `x` complete an order, `r` mark a notification read, `n` refresh
//! notifications, `q` quit.

use attendance_agent::domain::attendance::{AttendanceSession, Progress, ProgressLevel};
use attendance_agent::domain::types::{
    ClockReading, NotificationId, OrderId, Toast, ToastKind,
};
use attendance_agent::infra::{Config, Metrics};
use attendance_agent::io::location::{FixCache, LocationWatch};
use attendance_agent::io::{HttpWorkerApi, PresenceSnapshot, Presenter, SharedPresence};
use attendance_agent::services::{UserAction, WorkerSession};
use clap::Parser;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use parking_lot::Mutex;
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, List, ListItem, Paragraph},
    Frame, Terminal,
};
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Maximum toasts on screen at once
const MAX_TOASTS: usize = 8;

/// Attendance TUI - worker dashboard
#[derive(Parser, Debug)]
#[command(name = "attendance-tui", version, about)]
struct Args {
    /// Path to TOML configuration file (default: $CONFIG_FILE or config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,
}

/// What the bottom line is collecting
#[derive(Debug, Clone, PartialEq, Eq)]
enum InputMode {
    Normal,
    /// "<order-id> <0-100>"
    Progress(String),
    /// "<order-id>"
    Complete(String),
    ConfirmComplete(OrderId),
    /// "<notification-id>"
    Read(String),
}

/// Result of one key press
#[derive(Debug, Clone, PartialEq, Eq)]
enum KeyOutcome {
    None,
    Action(UserAction),
    Quit,
}

/// Everything the dashboard renders, written by the session through `Presenter`
#[derive(Debug)]
struct DashboardState {
    toasts: VecDeque<Toast>,
    toast_ttl: Duration,
    progress: FxHashMap<OrderId, (Progress, ProgressLevel)>,
    completed: usize,
    attendance: Vec<String>,
    unread: usize,
    clock: Option<ClockReading>,
    presence: PresenceSnapshot,
    shared_presence: SharedPresence,
    input: InputMode,
}

impl DashboardState {
    fn new(toast_ttl: Duration, shared_presence: SharedPresence) -> Self {
        Self {
            toasts: VecDeque::new(),
            toast_ttl,
            progress: FxHashMap::default(),
            completed: 0,
            attendance: Vec::new(),
            unread: 0,
            clock: None,
            presence: PresenceSnapshot::default(),
            shared_presence,
            input: InputMode::Normal,
        }
    }

    fn push_toast(&mut self, toast: Toast) {
        if self.toasts.len() == MAX_TOASTS {
            self.toasts.pop_front();
        }
        self.toasts.push_back(toast);
    }

    /// Drop toasts older than the TTL; called every frame
    fn prune_toasts(&mut self) {
        let ttl = self.toast_ttl;
        self.toasts.retain(|t| !t.is_expired(ttl));
    }

    /// Orders sorted by id for stable rendering
    fn orders(&self) -> Vec<(OrderId, Progress, ProgressLevel)> {
        let mut orders: Vec<_> =
            self.progress.iter().map(|(id, (progress, level))| (*id, *progress, *level)).collect();
        orders.sort_by_key(|(id, _, _)| *id);
        orders
    }

    fn parse_prompt(&mut self, command: String) -> KeyOutcome {
        match command.parse::<UserAction>() {
            Ok(action) => KeyOutcome::Action(action),
            Err(e) => {
                self.push_toast(Toast::error(e.to_string()));
                KeyOutcome::None
            }
        }
    }

    fn handle_key(&mut self, code: KeyCode) -> KeyOutcome {
        let mode = std::mem::replace(&mut self.input, InputMode::Normal);
        match mode {
            InputMode::Normal => match code {
                KeyCode::Char('q') | KeyCode::Esc => KeyOutcome::Quit,
                KeyCode::Char('c') => KeyOutcome::Action(UserAction::CheckIn),
                KeyCode::Char('a') => KeyOutcome::Action(if self.presence.auto_check_in {
                    UserAction::DisableAutoCheckIn
                } else {
                    UserAction::EnableAutoCheckIn
                }),
                KeyCode::Char('n') => KeyOutcome::Action(UserAction::RefreshNotifications),
                KeyCode::Char('p') => {
                    self.input = InputMode::Progress(String::new());
                    KeyOutcome::None
                }
                KeyCode::Char('x') => {
                    self.input = InputMode::Complete(String::new());
                    KeyOutcome::None
                }
                KeyCode::Char('r') => {
                    self.input = InputMode::Read(String::new());
                    KeyOutcome::None
                }
                _ => KeyOutcome::None,
            },
            InputMode::ConfirmComplete(order) => match code {
                KeyCode::Char('y') | KeyCode::Char('Y') => {
                    KeyOutcome::Action(UserAction::CompleteOrder(order))
                }
                _ => KeyOutcome::None,
            },
            InputMode::Progress(buffer) => match edit(buffer, code) {
                Edit::Editing(buffer) => {
                    self.input = InputMode::Progress(buffer);
                    KeyOutcome::None
                }
                Edit::Submit(buffer) => self.parse_prompt(format!("progress {buffer}")),
                Edit::Cancel => KeyOutcome::None,
            },
            InputMode::Read(buffer) => match edit(buffer, code) {
                Edit::Editing(buffer) => {
                    self.input = InputMode::Read(buffer);
                    KeyOutcome::None
                }
                Edit::Submit(buffer) => self.parse_prompt(format!("read {buffer}")),
                Edit::Cancel => KeyOutcome::None,
            },
            InputMode::Complete(buffer) => match edit(buffer, code) {
                Edit::Editing(buffer) => {
                    self.input = InputMode::Complete(buffer);
                    KeyOutcome::None
                }
                Edit::Submit(buffer) => match buffer.trim().parse::<u64>() {
                    Ok(id) => {
                        self.input = InputMode::ConfirmComplete(OrderId(id));
                        KeyOutcome::None
                    }
                    Err(_) => {
                        self.push_toast(Toast::error(format!("Invalid order id: {buffer}")));
                        KeyOutcome::None
                    }
                },
                Edit::Cancel => KeyOutcome::None,
            },
        }
    }
}

enum Edit {
    Editing(String),
    Submit(String),
    Cancel,
}

/// Line editing for numeric prompts
fn edit(mut buffer: String, code: KeyCode) -> Edit {
    match code {
        KeyCode::Enter => Edit::Submit(buffer),
        KeyCode::Esc => Edit::Cancel,
        KeyCode::Backspace => {
            buffer.pop();
            Edit::Editing(buffer)
        }
        KeyCode::Char(c) if c.is_ascii_digit() || c == ' ' => {
            buffer.push(c);
            Edit::Editing(buffer)
        }
        _ => Edit::Editing(buffer),
    }
}

/// Presenter handle given to the session task
#[derive(Clone)]
struct Dashboard(Arc<Mutex<DashboardState>>);

impl Presenter for Dashboard {
    fn show_toast(&mut self, toast: Toast) {
        self.0.lock().push_toast(toast);
    }

    fn set_progress(&mut self, order: OrderId, progress: Progress, level: ProgressLevel) {
        self.0.lock().progress.insert(order, (progress, level));
    }

    fn show_attendance(&mut self, session: &AttendanceSession) {
        self.0.lock().attendance = session.display_lines().into_vec();
    }

    fn set_notification_badge(&mut self, count: usize) {
        self.0.lock().unread = count;
    }

    fn remove_notification(&mut self, id: NotificationId) {
        self.0.lock().toasts.retain(|t| t.notification != Some(id));
    }

    fn order_completed(&mut self, order: OrderId) {
        let mut state = self.0.lock();
        state.progress.remove(&order);
        state.completed += 1;
    }

    fn set_clock(&mut self, clock: &ClockReading) {
        self.0.lock().clock = Some(clock.clone());
    }

    fn set_presence(&mut self, presence: PresenceSnapshot) {
        let mut state = self.0.lock();
        state.shared_presence.set(presence.clone());
        state.presence = presence;
    }
}

fn status_server_failed(port: u16, e: &(dyn std::error::Error + Send + Sync)) -> Toast {
    Toast::error(format!("Status server on port {port} failed: {e}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config_path = args.config.unwrap_or_else(|| Config::resolve_config_path(&[]));
    let config = Config::load_from_path(&config_path);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(Metrics::new());
    let presence = SharedPresence::new();

    let state =
        Arc::new(Mutex::new(DashboardState::new(config.toast_ttl(), presence.clone())));

    // No log output in the terminal UI: a status server that cannot start is
    // reported on the dashboard
    let metrics_port = config.metrics_port();
    if metrics_port > 0 {
        let status_metrics = metrics.clone();
        let status_shutdown = shutdown_rx.clone();
        let status_state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = attendance_agent::io::status::start_status_server(
                metrics_port,
                status_metrics,
                presence,
                status_shutdown,
            )
            .await
            {
                status_state.lock().push_toast(status_server_failed(metrics_port, &*e));
            }
        });
    }

    let api = HttpWorkerApi::new(config.server_base_url())?;
    let watch = LocationWatch::from_config(&config, FixCache::new());
    let (action_tx, action_rx) = mpsc::channel(32);

    let mut session = WorkerSession::new(&config, api, Dashboard(state.clone()), metrics);
    let session_handle = tokio::spawn(async move {
        session.run(watch, action_rx, shutdown_rx).await;
    });

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_ui(&mut terminal, state, action_tx);

    let _ = shutdown_tx.send(true);
    let _ = tokio::time::timeout(Duration::from_secs(2), session_handle).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn run_ui(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    state: Arc<Mutex<DashboardState>>,
    actions: mpsc::Sender<UserAction>,
) -> anyhow::Result<()> {
    let tick_rate = Duration::from_millis(100);

    loop {
        {
            let mut s = state.lock();
            s.prune_toasts();
            terminal.draw(|f| draw_ui(f, &s))?;
        }

        if event::poll(tick_rate)? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                let outcome = state.lock().handle_key(key.code);
                match outcome {
                    KeyOutcome::Quit => return Ok(()),
                    KeyOutcome::Action(action) => {
                        if actions.try_send(action).is_err() {
                            state.lock().push_toast(Toast::error("Busy, try again"));
                        }
                    }
                    KeyOutcome::None => {}
                }
            }
        }
    }
}

fn draw_ui(f: &mut Frame, state: &DashboardState) {
    let main_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Length(7), // Presence + attendance
            Constraint::Min(0),    // Orders + toasts
            Constraint::Length(3), // Footer
        ])
        .split(f.area());

    draw_header(f, main_chunks[0], state);

    let middle = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(main_chunks[1]);
    draw_presence_panel(f, middle[0], state);
    draw_attendance_panel(f, middle[1], state);

    let bottom = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(main_chunks[2]);
    draw_orders_panel(f, bottom[0], state);
    draw_toast_panel(f, bottom[1], state);

    draw_footer(f, main_chunks[3], state);
}

fn draw_header(f: &mut Frame, area: Rect, state: &DashboardState) {
    let (time, date) = state
        .clock
        .as_ref()
        .map(|c| (c.time.as_str(), c.date.as_str()))
        .unwrap_or(("--:--:--", ""));

    let mut spans = vec![
        Span::styled(
            "Attendance ",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::raw("| "),
        Span::styled(time, Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(format!(" {date} | Auto: ")),
    ];
    spans.push(if state.presence.auto_check_in {
        Span::styled("ON", Style::default().fg(Color::Green))
    } else {
        Span::styled("OFF", Style::default().fg(Color::DarkGray))
    });
    // Badge hidden when there is nothing unread
    if state.unread > 0 {
        spans.push(Span::raw(" | "));
        spans.push(Span::styled(
            format!("{} unread", state.unread),
            Style::default().fg(Color::Black).bg(Color::Yellow),
        ));
    }

    let header = Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL));
    f.render_widget(header, area);
}

fn draw_presence_panel(f: &mut Frame, area: Rect, state: &DashboardState) {
    let presence = &state.presence;
    let (status, color) = match (presence.latitude, presence.inside) {
        (None, _) => ("ACQUIRING", Color::DarkGray),
        (Some(_), true) => ("IN WORKSHOP", Color::Green),
        (Some(_), false) => ("OUTSIDE", Color::Red),
    };

    let fmt = |v: Option<f64>, unit: &str| {
        v.map(|v| format!("{v:.1}{unit}")).unwrap_or_else(|| "-".to_string())
    };
    let position = match (presence.latitude, presence.longitude) {
        (Some(lat), Some(lon)) => format!("{lat:.5}, {lon:.5}"),
        _ => "-".to_string(),
    };

    let text = vec![
        Line::from(Span::styled(status, Style::default().fg(color).add_modifier(Modifier::BOLD))),
        Line::from(format!("Distance:  {}", fmt(presence.distance_m, " m"))),
        Line::from(format!("Accuracy:  {}", fmt(presence.accuracy_m, " m"))),
        Line::from(format!("Position:  {position}")),
    ];

    let panel = Paragraph::new(text).block(
        Block::default()
            .title(" Presence ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(color)),
    );
    f.render_widget(panel, area);
}

fn draw_attendance_panel(f: &mut Frame, area: Rect, state: &DashboardState) {
    let lines: Vec<Line> = if state.attendance.is_empty() {
        vec![Line::from(Span::styled("No marks yet", Style::default().fg(Color::DarkGray)))]
    } else {
        state.attendance.iter().map(|l| Line::from(l.as_str())).collect()
    };

    let panel = Paragraph::new(lines).block(
        Block::default()
            .title(" Today ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );
    f.render_widget(panel, area);
}

fn level_color(level: ProgressLevel) -> Color {
    match level {
        ProgressLevel::Low => Color::Red,
        ProgressLevel::Medium => Color::Yellow,
        ProgressLevel::High => Color::Green,
    }
}

fn draw_orders_panel(f: &mut Frame, area: Rect, state: &DashboardState) {
    let block = Block::default()
        .title(format!(" Orders ({} completed) ", state.completed))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Magenta));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let orders = state.orders();
    if orders.is_empty() {
        let hint = Paragraph::new("Press 'p' to report progress on an order")
            .style(Style::default().fg(Color::DarkGray));
        f.render_widget(hint, inner);
        return;
    }

    let visible = (inner.height / 3).max(1) as usize;
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints(vec![Constraint::Length(3); visible.min(orders.len())])
        .split(inner);

    for ((order, progress, level), row) in orders.iter().zip(rows.iter()) {
        let gauge = Gauge::default()
            .block(Block::default().title(format!(" Order #{order} ")).borders(Borders::ALL))
            .gauge_style(Style::default().fg(level_color(*level)))
            .percent(progress.value() as u16)
            .label(progress.to_string());
        f.render_widget(gauge, *row);
    }
}

fn toast_color(kind: ToastKind) -> Color {
    match kind {
        ToastKind::Success => Color::Green,
        ToastKind::Error => Color::Red,
        ToastKind::Warning => Color::Yellow,
        ToastKind::Info => Color::Cyan,
    }
}

fn draw_toast_panel(f: &mut Frame, area: Rect, state: &DashboardState) {
    let items: Vec<ListItem> = state
        .toasts
        .iter()
        .rev()
        .map(|t| {
            ListItem::new(vec![
                Line::from(Span::styled(
                    t.title.as_str(),
                    Style::default().fg(toast_color(t.kind)).add_modifier(Modifier::BOLD),
                )),
                Line::from(format!("  {}", t.message)),
            ])
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .title(" Messages ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow)),
    );
    f.render_widget(list, area);
}

fn draw_footer(f: &mut Frame, area: Rect, state: &DashboardState) {
    let text = match &state.input {
        InputMode::Normal => {
            "c check in | a auto attendance | p progress | x complete | r mark read | n refresh | q quit"
                .to_string()
        }
        InputMode::Progress(buffer) => format!("Order id and progress (0-100): {buffer}_"),
        InputMode::Complete(buffer) => format!("Order id to complete: {buffer}_"),
        InputMode::ConfirmComplete(order) => format!("Mark order #{order} as completed? (y/n)"),
        InputMode::Read(buffer) => format!("Notification id: {buffer}_"),
    };

    let footer = Paragraph::new(text).block(Block::default().borders(Borders::ALL));
    f.render_widget(footer, area);
}
