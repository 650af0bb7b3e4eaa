use std::{collections::BTreeMap, io::stdout, time::Duration};

use crate::cancel::CancelToken;
use crate::gui::error::GuiError;
use crate::status::Status;
use crate::tracker::TrackerStats;

use crossterm::{
    event::{self, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    prelude::*,
    widgets::{
        block::{Position, Title},
        Block, Borders, Cell, Gauge, Paragraph, Row, Table,
    },
    Terminal,
};

/// What the monitor shows on one refresh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonitorSnapshot {
    /// Scheduler state, if a paradigm is being played.
    pub scheduler: Option<Status>,
    /// Paradigm progress in percent.
    pub progress: f64,
    pub pins: BTreeMap<String, f64>,
    pub tracker: Option<TrackerStats>,
    /// Nothing left to watch: the monitor closes by itself.
    pub finished: bool,
}

/// Show `snapshot()` until the run finishes, `cancel` fires, or the user
/// presses a key. A key press cancels `cancel`. Returns the last snapshot.
pub fn monitor<F>(cancel: &CancelToken, snapshot: F) -> Result<MonitorSnapshot, GuiError>
where
    F: FnMut() -> MonitorSnapshot,
{
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let last = monitor_loop(cancel, snapshot);
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;
    last
}

fn monitor_loop<F>(cancel: &CancelToken, mut snapshot: F) -> Result<MonitorSnapshot, GuiError>
where
    F: FnMut() -> MonitorSnapshot,
{
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.clear()?;

    loop {
        let snap = snapshot();
        terminal.draw(|frame| render(frame, &snap))?;
        if snap.finished || cancel.is_cancelled() {
            return Ok(snap);
        }
        if event::poll(Duration::from_millis(16))? {
            if let event::Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    cancel.cancel();
                    return Ok(snap);
                }
            }
        }
    }
}

fn tracker_lines(stats: &TrackerStats) -> Vec<Line<'static>> {
    let missing = stats
        .missing_per_arena
        .iter()
        .map(|(arena, n)| format!("{}:{}", arena, n))
        .collect::<Vec<_>>()
        .join(" ");
    vec![
        Line::from(format!(
            " frames {}  tracked {}  skipped {}",
            stats.frame_count, stats.tracked_frames, stats.skipped_frames
        )),
        Line::from(format!(
            " flies {}  missing {}  relaxation {:.3}{}",
            stats.found_flies,
            stats.missing_fly,
            stats.relaxation_factor,
            if stats.arenas_locked { "  locked" } else { "" }
        )),
        Line::from(format!(" missing per arena {}", missing)),
    ]
}

fn render(frame: &mut Frame, snap: &MonitorSnapshot) {
    let title = Title::from(" LearnMem ".magenta().bold());
    let instructions = Title::from(" Press any key to stop ");
    let outer = Block::default()
        .title(title.alignment(Alignment::Center))
        .title(
            instructions
                .alignment(Alignment::Center)
                .position(Position::Bottom),
        )
        .borders(Borders::ALL);
    let area = outer.inner(frame.size());
    frame.render_widget(outer, frame.size());

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(3),
            Constraint::Length(5),
        ])
        .split(area);

    let status = snap
        .scheduler
        .map_or_else(|| "no paradigm".to_owned(), |s| s.to_string());
    let gauge = Gauge::default()
        .block(Block::default().title(" Paradigm ").borders(Borders::ALL))
        .gauge_style(Style::default().fg(Color::Magenta))
        .ratio((snap.progress / 100.0).clamp(0.0, 1.0))
        .label(format!("{} {:.1}%", status, snap.progress));
    frame.render_widget(gauge, chunks[0]);

    let rows = snap.pins.iter().map(|(hardware, value)| {
        let style = if *value > 0.0 {
            Style::default().fg(Color::Magenta).bold()
        } else {
            Style::default()
        };
        Row::new(vec![
            Cell::from(hardware.clone()),
            Cell::from(format!("{:.2}", value)),
        ])
        .style(style)
    });
    let table = Table::new(rows, [Constraint::Percentage(60), Constraint::Percentage(40)])
        .header(Row::new(vec!["Hardware", "Value"]).style(Style::default().bold()))
        .block(Block::default().title(" Pins ").borders(Borders::ALL));
    frame.render_widget(table, chunks[1]);

    let lines = match &snap.tracker {
        Some(stats) => tracker_lines(stats),
        None => vec![Line::from(" not tracking")],
    };
    let tracker = Paragraph::new(lines)
        .block(Block::default().title(" Tracker ").borders(Borders::ALL));
    frame.render_widget(tracker, chunks[2]);
}
