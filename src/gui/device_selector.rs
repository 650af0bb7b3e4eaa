use std::{io::stdout, path::PathBuf, time::Duration};

use crate::gui::error::GuiError;

use crossterm::{
    event::{self, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    prelude::*,
    widgets::{
        block::{Position, Title},
        *,
    },
    Terminal,
};

/// What a key press does to the selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Choice {
    Move(usize),
    Select(usize),
    Quit,
    Ignore,
}

fn on_key(code: KeyCode, cursor: usize, n_ports: usize) -> Choice {
    match code {
        KeyCode::Down | KeyCode::Char('j') => Choice::Move((cursor + 1) % n_ports),
        KeyCode::Up | KeyCode::Char('k') => Choice::Move((cursor + n_ports - 1) % n_ports),
        KeyCode::Enter => Choice::Select(cursor),
        KeyCode::Char('q') | KeyCode::Esc => Choice::Quit,
        _ => Choice::Ignore,
    }
}

/// Let the user pick the serial device the board is on. `None` if they quit.
pub fn device_selector(mut available_ports: Vec<PathBuf>) -> Result<Option<PathBuf>, GuiError> {
    if available_ports.is_empty() {
        return Err(GuiError::NoDevices);
    }

    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let selected = select_loop(&available_ports);
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(selected?.map(|i| available_ports.swap_remove(i)))
}

fn select_loop(available_ports: &[PathBuf]) -> Result<Option<usize>, GuiError> {
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.clear()?;

    let n_ports = available_ports.len();
    let mut cursor = 0;
    let mut list_state = ListState::default().with_selected(Some(cursor));
    loop {
        let title = Title::from(" Select the Firmata board ".magenta().bold());
        let instructions = Title::from(Line::from(vec![
            " Navigate ".into(),
            "<Up>/<Down>".magenta().bold(),
            " Select ".into(),
            "<Enter>".magenta().bold(),
            " Quit ".into(),
            "<Q> ".magenta().bold(),
        ]));
        let block = Block::default()
            .title(title.alignment(Alignment::Center))
            .title(
                instructions
                    .alignment(Alignment::Center)
                    .position(Position::Bottom),
            )
            .borders(Borders::ALL);
        let port_names = available_ports.iter().map(|p| p.to_string_lossy());
        let list = List::new(port_names)
            .style(Style::default().fg(Color::White))
            .highlight_symbol(">>")
            .highlight_style(Style::default().fg(Color::Magenta))
            .block(block);
        list_state.select(Some(cursor));
        terminal.draw(|frame| {
            let area = frame.size();
            frame.render_stateful_widget(list, area, &mut list_state);
        })?;

        if !event::poll(Duration::from_millis(16))? {
            continue;
        }
        if let event::Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match on_key(key.code, cursor, n_ports) {
                Choice::Move(next) => cursor = next,
                Choice::Select(i) => return Ok(Some(i)),
                Choice::Quit => return Ok(None),
                Choice::Ignore => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_wraps_around() {
        assert_eq!(on_key(KeyCode::Down, 2, 3), Choice::Move(0));
        assert_eq!(on_key(KeyCode::Up, 0, 3), Choice::Move(2));
        assert_eq!(on_key(KeyCode::Char('j'), 0, 3), Choice::Move(1));
        assert_eq!(on_key(KeyCode::Enter, 1, 3), Choice::Select(1));
        assert_eq!(on_key(KeyCode::Char('q'), 1, 3), Choice::Quit);
        assert_eq!(on_key(KeyCode::Char('x'), 1, 3), Choice::Ignore);
    }

    #[test]
    fn no_ports_is_an_error() {
        assert!(matches!(device_selector(Vec::new()), Err(GuiError::NoDevices)));
    }
}
