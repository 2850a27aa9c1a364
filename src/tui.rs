use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::path::Path;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossterm::ExecutableCommand;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use miette::IntoDiagnostic;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Gauge, Paragraph, Wrap};

use crate::app::{ProgressEvent, ProgressSink, ProgressSinkKind};
use crate::error::SkcmError;
use crate::fs_util::walk_files;
use crate::store::Store;

const RECENT_MAX: usize = 5;
const LOG_CAPACITY: usize = 300;
const TREE_REFRESH: Duration = Duration::from_secs(3);
const POLL: Duration = Duration::from_millis(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Screen {
    Progress,
    Logs,
    Help,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Resolve,
    Prepare,
    Process,
    Verify,
    Store,
}

const PHASES: [Phase; 5] = [
    Phase::Resolve,
    Phase::Prepare,
    Phase::Process,
    Phase::Verify,
    Phase::Store,
];

impl Phase {
    fn label(self) -> &'static str {
        match self {
            Phase::Resolve => "Resolve",
            Phase::Prepare => "Prepare",
            Phase::Process => "Process",
            Phase::Verify => "Verify",
            Phase::Store => "Store",
        }
    }

    fn parse(name: &str) -> Option<Self> {
        PHASES.into_iter().find(|phase| phase.label() == name)
    }

    fn position(self) -> usize {
        PHASES.iter().position(|phase| *phase == self).unwrap_or(0)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

fn operation(kind: ProgressSinkKind) -> &'static str {
    match kind {
        ProgressSinkKind::Download => "download",
        ProgressSinkKind::Sort => "sort",
        ProgressSinkKind::Dupes => "dupes",
        ProgressSinkKind::Genes => "genes",
        ProgressSinkKind::Survival => "survival",
    }
}

/// Sorted project tree and temp folder as seen on disk.
#[derive(Debug, Clone, Default)]
struct TreeSummary {
    sorted_files: usize,
    sorted_bytes: u64,
    pending_files: usize,
}

impl TreeSummary {
    fn scan(store: &Store) -> Self {
        let (sorted_files, sorted_bytes) = file_stats(store.project_dir().as_std_path());
        let (pending_files, _) = file_stats(store.temp_dir().as_std_path());
        Self {
            sorted_files,
            sorted_bytes,
            pending_files,
        }
    }
}

#[derive(Debug)]
struct Monitor {
    phase: Phase,
    status: String,
    step: Option<(usize, usize)>,
    gdc_requests: u64,
    last_latency_ms: Option<u128>,
    recent: VecDeque<String>,
    log: VecDeque<String>,
    screen: Screen,
    tree: TreeSummary,
    tree_scanned: Instant,
    started: Instant,
    running: bool,
}

impl Monitor {
    fn new(store: &Store) -> Self {
        Self {
            phase: Phase::Resolve,
            status: "starting".to_string(),
            step: None,
            gdc_requests: 0,
            last_latency_ms: None,
            recent: VecDeque::new(),
            log: VecDeque::new(),
            screen: Screen::Progress,
            tree: TreeSummary::scan(store),
            tree_scanned: Instant::now(),
            started: Instant::now(),
            running: false,
        }
    }

    fn record(&mut self, message: &str) {
        if let Some((phase, payload)) = parse_phase(message) {
            if phase != self.phase {
                self.step = None;
            }
            self.phase = phase;
            self.status = payload.to_string();
            if let Some(step) = parse_step(payload) {
                self.step = Some(step);
            }
        } else if message == "gdc.request" {
            self.gdc_requests += 1;
        } else if let Some(latency) = parse_latency(message) {
            self.last_latency_ms = Some(latency);
        } else {
            self.status = message.to_string();
        }
        push_bounded(&mut self.recent, message.to_string(), RECENT_MAX);
        let stamp = chrono::Local::now().format("%H:%M:%S");
        push_bounded(&mut self.log, format!("[{stamp}] {message}"), LOG_CAPACITY);
    }

    /// Share of the run behind us: finished phases plus the item share of
    /// the current one.
    fn ratio(&self) -> f64 {
        let within = match self.step {
            Some((done, total)) if total > 0 => done.min(total) as f64 / total as f64,
            _ => 0.0,
        };
        ((self.phase.position() as f64 + within) / PHASES.len() as f64).clamp(0.0, 1.0)
    }
}

struct MonitorSink {
    monitor: Arc<Mutex<Monitor>>,
}

impl ProgressSink for MonitorSink {
    fn event(&self, event: ProgressEvent) {
        if let Ok(mut monitor) = self.monitor.lock() {
            monitor.record(event.message.trim());
        }
    }
}

enum Outcome<R> {
    Finished(Result<R, SkcmError>),
    Crashed,
    Aborted,
}

fn check_worker<R>(rx: &Receiver<Result<R, SkcmError>>) -> Option<Outcome<R>> {
    match rx.try_recv() {
        Ok(result) => Some(Outcome::Finished(result)),
        Err(TryRecvError::Disconnected) => Some(Outcome::Crashed),
        Err(TryRecvError::Empty) => None,
    }
}

/// Full-screen progress view for one pipeline command.
pub struct Tui {
    kind: ProgressSinkKind,
    store: Store,
    monitor: Arc<Mutex<Monitor>>,
    log_offset: usize,
}

impl Tui {
    pub fn new(kind: ProgressSinkKind, store: &Store) -> Self {
        Self {
            kind,
            store: store.clone(),
            monitor: Arc::new(Mutex::new(Monitor::new(store))),
            log_offset: 0,
        }
    }

    /// Runs `job` on a worker thread and redraws until it returns.
    /// `Esc` aborts the screen.
    pub fn run<F, R>(&mut self, job: F) -> miette::Result<R>
    where
        F: FnOnce(&dyn ProgressSink) -> Result<R, SkcmError> + Send + 'static,
        R: Send + 'static,
    {
        self.set_running(true);
        enable_raw_mode().into_diagnostic()?;
        io::stdout().execute(EnterAlternateScreen).into_diagnostic()?;

        let (tx, rx) = mpsc::channel();
        let sink = MonitorSink {
            monitor: Arc::clone(&self.monitor),
        };
        let worker = thread::spawn(move || tx.send(job(&sink)));

        let outcome = self.drive(&rx);

        self.set_running(false);
        let restored = disable_raw_mode()
            .and_then(|()| io::stdout().execute(LeaveAlternateScreen).map(|_| ()))
            .into_diagnostic();
        let outcome = outcome?;
        restored?;
        match outcome {
            Outcome::Finished(result) => {
                worker.join().ok();
                result.map_err(miette::Report::new)
            }
            Outcome::Crashed => {
                worker.join().ok();
                Err(miette::Report::msg(format!(
                    "{} stopped unexpectedly",
                    operation(self.kind)
                )))
            }
            Outcome::Aborted => Err(miette::Report::msg(format!(
                "{} aborted",
                operation(self.kind)
            ))),
        }
    }

    fn drive<R>(&mut self, rx: &Receiver<Result<R, SkcmError>>) -> miette::Result<Outcome<R>> {
        let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout())).into_diagnostic()?;
        terminal.clear().into_diagnostic()?;

        let mut blink = false;
        loop {
            self.rescan_tree();
            if let Ok(monitor) = self.monitor.lock() {
                terminal
                    .draw(|frame| self.draw(frame, &monitor, blink))
                    .into_diagnostic()?;
            }

            if let Some(outcome) = check_worker(rx) {
                return Ok(outcome);
            }
            if event::poll(POLL).into_diagnostic()? {
                if let Event::Key(key) = event::read().into_diagnostic()? {
                    if self.on_key(key) {
                        return Ok(Outcome::Aborted);
                    }
                }
            }
            blink = !blink;
        }
    }

    /// Returns `true` when the screen should close.
    fn on_key(&mut self, key: KeyEvent) -> bool {
        if key.kind != KeyEventKind::Press {
            return false;
        }
        let screen = match key.code {
            KeyCode::Esc => return true,
            KeyCode::Char('q') => return !self.is_running(),
            KeyCode::F(1) | KeyCode::Char('?') => Screen::Help,
            KeyCode::F(3) => Screen::Progress,
            KeyCode::F(4) => Screen::Logs,
            KeyCode::PageUp => {
                self.scroll_log(5);
                return false;
            }
            KeyCode::PageDown => {
                self.scroll_log(-5);
                return false;
            }
            _ => return false,
        };
        if let Ok(mut monitor) = self.monitor.lock() {
            monitor.screen = screen;
        }
        false
    }

    fn is_running(&self) -> bool {
        self.monitor
            .lock()
            .map(|monitor| monitor.running)
            .unwrap_or(false)
    }

    fn set_running(&self, running: bool) {
        if let Ok(mut monitor) = self.monitor.lock() {
            monitor.running = running;
            if running {
                monitor.started = Instant::now();
            }
        }
    }

    fn rescan_tree(&self) {
        if let Ok(mut monitor) = self.monitor.lock() {
            if monitor.tree_scanned.elapsed() >= TREE_REFRESH {
                monitor.tree = TreeSummary::scan(&self.store);
                monitor.tree_scanned = Instant::now();
            }
        }
    }

    fn scroll_log(&mut self, delta: isize) {
        let lines = self
            .monitor
            .lock()
            .map(|monitor| monitor.log.len())
            .unwrap_or(0);
        self.log_offset = self
            .log_offset
            .saturating_add_signed(delta)
            .min(lines.saturating_sub(1));
    }

    fn draw(&self, frame: &mut ratatui::Frame, monitor: &Monitor, blink: bool) {
        if monitor.screen == Screen::Help {
            frame.render_widget(help(), frame.area());
            return;
        }
        let [top, body, bottom] = Layout::vertical([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(2),
        ])
        .areas(frame.area());

        frame.render_widget(self.title(monitor, blink), top);
        match monitor.screen {
            Screen::Logs => frame.render_widget(log_view(monitor, self.log_offset), body),
            _ => self.draw_progress(frame, monitor, body),
        }
        frame.render_widget(
            Paragraph::new(Span::styled(
                "F1 help · F3 progress · F4 logs · PgUp/PgDn scroll · Esc abort",
                Style::default().fg(Color::DarkGray),
            ))
            .block(Block::default().borders(Borders::TOP)),
            bottom,
        );
    }

    fn title(&self, monitor: &Monitor, blink: bool) -> Paragraph<'static> {
        let accent = Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD);
        let pending = if monitor.tree.pending_files == 0 {
            Color::Green
        } else {
            Color::Yellow
        };
        Paragraph::new(vec![
            Line::from(vec![
                Span::styled("skcm ", accent),
                Span::styled(operation(self.kind), accent),
                Span::raw(format!("   project {}  ", self.store.project())),
                Span::styled(if blink { "●" } else { " " }, Style::default().fg(Color::Green)),
            ]),
            Line::from(vec![
                Span::styled(
                    format!(
                        "sorted {} files ({})   ",
                        monitor.tree.sorted_files,
                        human_size(monitor.tree.sorted_bytes)
                    ),
                    Style::default().fg(Color::Gray),
                ),
                Span::styled(
                    format!("temp folder {} files", monitor.tree.pending_files),
                    Style::default().fg(pending),
                ),
            ]),
        ])
        .block(Block::default().borders(Borders::BOTTOM))
    }

    fn draw_progress(&self, frame: &mut ratatui::Frame, monitor: &Monitor, area: Rect) {
        let [left, right] =
            Layout::horizontal([Constraint::Percentage(60), Constraint::Percentage(40)])
                .areas(area);
        let [gauge_area, status_area] =
            Layout::vertical([Constraint::Length(3), Constraint::Min(4)]).areas(left);

        let ratio = monitor.ratio();
        let gauge = Gauge::default()
            .block(Block::default().borders(Borders::ALL).title(" progress "))
            .gauge_style(Style::default().fg(if monitor.running {
                Color::Cyan
            } else {
                Color::Green
            }))
            .ratio(ratio)
            .label(format!("{} {:>3.0}%", monitor.phase, ratio * 100.0));
        frame.render_widget(gauge, gauge_area);
        frame.render_widget(status_panel(monitor), status_area);
        frame.render_widget(self.paths_panel(), right);
    }

    fn paths_panel(&self) -> Paragraph<'static> {
        let row = |label: &str, value: String| {
            Line::from(vec![
                Span::styled(format!("{label:<10}"), Style::default().fg(Color::Gray)),
                Span::raw(value),
            ])
        };
        Paragraph::new(vec![
            row("project", self.store.project_dir().to_string()),
            row("analysis", self.store.analysis_dir().to_string()),
            row("downloads", self.store.download_root().to_string()),
            row("temp", self.store.temp_dir().to_string()),
        ])
        .block(Block::default().borders(Borders::LEFT).title(" folders "))
        .wrap(Wrap { trim: true })
    }
}

fn status_panel(monitor: &Monitor) -> Paragraph<'static> {
    let current = monitor.phase.position();
    let steps = PHASES
        .iter()
        .enumerate()
        .flat_map(|(idx, phase)| {
            let (mark, color) = if idx < current || (!monitor.running && idx == current) {
                ("✓", Color::Green)
            } else if idx == current {
                ("▶", Color::Cyan)
            } else {
                ("·", Color::DarkGray)
            };
            [
                Span::styled(format!("{mark} {phase}"), Style::default().fg(color)),
                Span::raw("  "),
            ]
        })
        .collect::<Vec<_>>();

    let gray = Style::default().fg(Color::Gray);
    let mut lines = vec![
        Line::from(steps),
        Line::from(vec![Span::styled("status  ", gray), Span::raw(monitor.status.clone())]),
        Line::from(vec![
            Span::styled("elapsed ", gray),
            Span::raw(format!("{:.1}s", monitor.started.elapsed().as_secs_f64())),
        ]),
    ];
    if monitor.gdc_requests > 0 {
        let latency = monitor
            .last_latency_ms
            .map_or_else(|| "--".to_string(), |ms| format!("{ms} ms"));
        lines.push(Line::from(vec![
            Span::styled("gdc     ", gray),
            Span::raw(format!("{} requests, last {latency}", monitor.gdc_requests)),
        ]));
    }
    lines.push(Line::from(""));
    lines.extend(
        monitor
            .recent
            .iter()
            .rev()
            .map(|message| Line::from(Span::styled(format!("- {message}"), gray))),
    );
    Paragraph::new(lines).wrap(Wrap { trim: true })
}

fn log_view(monitor: &Monitor, offset: usize) -> Paragraph<'static> {
    const VISIBLE: usize = 14;
    let end = monitor.log.len().saturating_sub(offset);
    let start = end.saturating_sub(VISIBLE);
    let lines = monitor
        .log
        .iter()
        .skip(start)
        .take(end - start)
        .map(|line| Line::from(line.clone()))
        .collect::<Vec<_>>();
    Paragraph::new(lines)
        .block(Block::default().title(" log "))
        .wrap(Wrap { trim: true })
}

fn help() -> Paragraph<'static> {
    Paragraph::new(vec![
        Line::from("F1/? help   F3 progress   F4 log"),
        Line::from("PgUp/PgDn scroll the log   q quit when finished   Esc abort"),
        Line::from("skcm init | download | sort | dupes | genes | survival"),
        Line::from("RUST_LOG=info prints detailed logs on stderr"),
    ])
    .block(Block::default().borders(Borders::ALL).title(" help "))
    .wrap(Wrap { trim: true })
}

/// `phase=<Phase>; <payload>` messages sent by the pipelines.
fn parse_phase(message: &str) -> Option<(Phase, &str)> {
    let (name, payload) = message.strip_prefix("phase=")?.split_once(';')?;
    Some((Phase::parse(name.trim())?, payload.trim()))
}

/// Trailing `(done/total)` counter, e.g. `a.maf.gz (3/10)`.
fn parse_step(payload: &str) -> Option<(usize, usize)> {
    let inner = payload.trim_end().strip_suffix(')')?;
    let (_, counter) = inner.rsplit_once('(')?;
    let (done, total) = counter.split_once('/')?;
    Some((done.trim().parse().ok()?, total.trim().parse().ok()?))
}

fn parse_latency(message: &str) -> Option<u128> {
    let (_, rest) = message.split_once("latency_ms=")?;
    rest.split_whitespace().next()?.parse().ok()
}

fn push_bounded(buffer: &mut VecDeque<String>, item: String, max: usize) {
    if buffer.len() == max {
        buffer.pop_front();
    }
    buffer.push_back(item);
}

fn file_stats(root: &Path) -> (usize, u64) {
    if !root.is_dir() {
        return (0, 0);
    }
    let files = walk_files(root, &[]).unwrap_or_default();
    let bytes = files
        .iter()
        .filter_map(|file| std::fs::metadata(file).ok())
        .map(|meta| meta.len())
        .sum();
    (files.len(), bytes)
}

fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}
