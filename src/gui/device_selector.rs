use std::{io::stdout, path::PathBuf, time::Duration};

use crate::gui::error::ScopeGuiError;
use crate::transport::available_ports;

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

/// Lets the user pick one of the attached serial devices. `status` is shown
/// above the list, e.g. why the previous pick could not be opened.
///
/// Returns `None` if the user quits instead.
pub fn device_selector(status: Option<&str>) -> Result<Option<PathBuf>, ScopeGuiError> {
    let mut available_ports = available_ports()?;

    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.clear()?;

    let res = select_loop(&mut terminal, &mut available_ports, status);

    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(res?.map(|i| available_ports.swap_remove(i)))
}

fn select_loop<B: Backend>(
    terminal: &mut Terminal<B>,
    available_ports: &mut Vec<PathBuf>,
    status: Option<&str>,
) -> Result<Option<usize>, ScopeGuiError> {
    let mut cursor = 0;
    let mut list_state = ListState::default().with_selected(Some(cursor));
    loop {
        let n_ports = available_ports.len();
        let title = Title::from(" Device Selector ".magenta().bold());
        let instructions = Title::from(Line::from(vec![
            " Navigate ".into(),
            "<Up>/<Down>".magenta().bold(),
            " Select ".into(),
            "<Enter>".magenta().bold(),
            " Rescan ".into(),
            "<R>".magenta().bold(),
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

        let port_names: Vec<String> = if n_ports == 0 {
            vec!["(no serial devices found)".to_owned()]
        } else {
            available_ports
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect()
        };
        let list = List::new(port_names)
            .style(Style::default().fg(Color::White))
            .highlight_symbol(">>")
            .highlight_style(Style::default().fg(Color::Magenta))
            .block(block);
        list_state.select((n_ports > 0).then_some(cursor));

        terminal.draw(|frame| {
            let area = frame.size();
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Length(1), Constraint::Min(3)])
                .split(area);
            let status_line = Paragraph::new(status.unwrap_or("").red());
            frame.render_widget(status_line, chunks[0]);
            frame.render_stateful_widget(list, chunks[1], &mut list_state);
        })?;

        if event::poll(Duration::from_millis(16))? {
            if let event::Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Down if n_ports > 0 => {
                            cursor = (cursor + 1) % n_ports;
                        }
                        KeyCode::Up if n_ports > 0 => {
                            cursor = (cursor + n_ports - 1) % n_ports;
                        }
                        KeyCode::Enter if n_ports > 0 => return Ok(Some(cursor)),
                        KeyCode::Char('r') => {
                            *available_ports = available_ports_or_empty();
                            cursor = 0;
                        }
                        KeyCode::Char('q') | KeyCode::Esc => return Ok(None),
                        _ => {}
                    }
                }
            }
        }
    }
}

fn available_ports_or_empty() -> Vec<PathBuf> {
    available_ports().unwrap_or_else(|e| {
        log::warn!("Could not list serial devices: {}", e);
        Vec::new()
    })
}
