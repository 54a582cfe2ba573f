use std::{
    io::stdout,
    path::Path,
    time::Duration,
};

use crate::connection::{Connection, LinkStatus};
use crate::export_log::ExportError;
use crate::gui::error::ScopeGuiError;
use crate::sample::{Channel, ChannelVisibility, Sample, Volt};
use crate::scope_buffers::RingBufferSet;
use crate::session::{ScopeSink, Session};

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    prelude::*,
    widgets::{block::Title, *},
    Terminal,
};

/// Full scale of the microphone ADC, in volts.
const MIC_FULL_SCALE: Volt = 3.3;

/// Full scale of a 12-bit accelerometer reading.
const AXIS_FULL_SCALE: f64 = 4095.0;

const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// What the terminal scope shows: a snapshot of the traces taken on each
/// redraw, plus the readouts that are refreshed on every sample.
#[derive(Debug, Default)]
pub struct ScopeView {
    traces: [Vec<(f64, f64)>; 4],
    latest: Option<Sample>,
    rms: Volt,
}

impl ScopeView {
    /// The trace of `channel` as of the last redraw; empty when hidden.
    pub fn trace(&self, channel: Channel) -> &[(f64, f64)] {
        &self.traces[channel as usize]
    }

    /// The most recent sample, if any has arrived.
    pub fn latest(&self) -> Option<&Sample> {
        self.latest.as_ref()
    }

    /// The RMS shown on the level meter.
    pub fn rms(&self) -> Volt {
        self.rms
    }
}

impl ScopeSink for ScopeView {
    fn readout(&mut self, sample: &Sample, rms: Volt) {
        self.latest = Some(*sample);
        self.rms = rms;
    }

    fn redraw(&mut self, buffers: &RingBufferSet, visibility: &ChannelVisibility) {
        for channel in Channel::ALL {
            self.traces[channel as usize] = if visibility.is_visible(channel) {
                buffers.points(channel)
            } else {
                Vec::new()
            };
        }
    }
}

fn channel_color(channel: Channel) -> Color {
    match channel {
        Channel::Mic => Color::Blue,
        Channel::X => Color::Red,
        Channel::Y => Color::Green,
        Channel::Z => Color::Cyan,
    }
}

struct App<'a> {
    session: &'a mut Session,
    connection: &'a mut Connection,
    export_path: &'a Path,
    view: ScopeView,
    message: String,
}

impl App<'_> {
    fn on_tick(&mut self) {
        self.connection
            .pump(self.session, &mut self.view, FRAME_INTERVAL);
    }

    /// Returns false once the user asked to quit.
    fn on_key(&mut self, code: KeyCode) -> bool {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => return false,
            KeyCode::Char('p') => {
                let paused = self.session.toggle_pause();
                self.message = if paused { "Paused" } else { "Resumed" }.to_owned();
            }
            KeyCode::Char(c @ '1'..='4') => {
                let channel = Channel::ALL[c as usize - '1' as usize];
                let shown = self.session.toggle_channel(channel);
                self.message = format!("{} {}", channel, if shown { "shown" } else { "hidden" });
                self.view
                    .redraw(self.session.buffers(), self.session.visibility());
            }
            KeyCode::Char('e') => {
                self.message = match self.session.export_to(self.export_path) {
                    Ok(n) => format!("Exported {} samples to {}", n, self.export_path.display()),
                    Err(ExportError::NoData) => "No data to export".to_owned(),
                    Err(e) => format!("Export failed: {}", e),
                };
            }
            KeyCode::Char('c') => {
                self.session.clear_export_log();
                self.message = "Recording cleared".to_owned();
            }
            _ => {}
        }
        true
    }

    fn status_line(&self) -> Line<'static> {
        let link = match self.connection.status() {
            LinkStatus::Open if self.session.is_paused() => "paused".yellow(),
            LinkStatus::Open => "connected".green(),
            LinkStatus::Ended => "stream ended".yellow(),
            LinkStatus::Failed(msg) => {
                Span::styled(format!("failed: {}", msg), Style::default().fg(Color::Red))
            }
            LinkStatus::Disconnected => "disconnected".red(),
        };
        Line::from(vec![
            Span::styled(
                format!(" {} ", self.connection.name()),
                Style::default().add_modifier(Modifier::BOLD),
            ),
            link,
            format!(
                "  {:?}  recorded {}  rejected {}  ",
                self.session.format(),
                self.session.export_log().len(),
                self.session.stats().rejected_lines
            )
            .into(),
            Span::styled(self.message.clone(), Style::default().fg(Color::Magenta)),
        ])
    }
}

/// Runs the terminal oscilloscope on `session`, fed by `connection`, until
/// the user quits.
pub fn run_scope(
    session: &mut Session,
    connection: &mut Connection,
    export_path: &Path,
) -> Result<(), ScopeGuiError> {
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.clear()?;

    let app = App {
        session,
        connection,
        export_path,
        view: ScopeView::default(),
        message: String::new(),
    };
    let res = run_app(&mut terminal, app);

    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res
}

fn run_app<B: Backend>(terminal: &mut Terminal<B>, mut app: App) -> Result<(), ScopeGuiError> {
    loop {
        app.on_tick();
        terminal.draw(|f| ui(f, &app))?;

        // the pump above already waited, so only peek at the keyboard
        if event::poll(Duration::ZERO)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press && !app.on_key(key.code) {
                    return Ok(());
                }
            }
        }
    }
}

fn dataset(view: &ScopeView, channel: Channel) -> Dataset<'_> {
    Dataset::default()
        .name(channel.to_string())
        .marker(symbols::Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(channel_color(channel)))
        .data(view.trace(channel))
}

fn axis(title: &str, bounds: [f64; 2], labels: &[&str]) -> Axis<'static> {
    Axis::default()
        .title(Span::styled(title.to_owned(), Style::default().fg(Color::Gray)))
        .style(Style::default().fg(Color::White))
        .bounds(bounds)
        .labels(labels.iter().map(|l| Span::from(l.to_string())).collect())
}

fn ui(f: &mut Frame, app: &App) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Percentage(45),
            Constraint::Percentage(45),
            Constraint::Length(3),
            Constraint::Length(1),
        ])
        .split(f.size());

    f.render_widget(Paragraph::new(app.status_line()), rows[0]);

    let window = [0.0, (app.session.buffers().len().max(2) - 1) as f64];

    let mic_chart = Chart::new(vec![dataset(&app.view, Channel::Mic)])
        .block(
            Block::default()
                .title(Title::from(" Microphone ".blue().bold()))
                .borders(Borders::ALL),
        )
        .x_axis(Axis::default().bounds(window))
        .y_axis(axis("V", [0.0, MIC_FULL_SCALE], &["0.0", "1.65", "3.3"]));
    f.render_widget(mic_chart, rows[1]);

    let accel_chart = Chart::new(
        [Channel::X, Channel::Y, Channel::Z]
            .into_iter()
            .map(|c| dataset(&app.view, c))
            .collect(),
    )
    .block(
        Block::default()
            .title(Title::from(" ADXL354 ".magenta().bold()))
            .borders(Borders::ALL),
    )
    .x_axis(Axis::default().bounds(window))
    .y_axis(axis("raw", [0.0, AXIS_FULL_SCALE], &["0", "2048", "4095"]));
    f.render_widget(accel_chart, rows[2]);

    let readout_row = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(rows[3]);

    let readout = match app.view.latest() {
        Some(s) => format!("Mic {:.3} V   X:{}  Y:{}  Z:{}", s.mic, s.x, s.y, s.z),
        None => "Waiting for data...".to_owned(),
    };
    f.render_widget(
        Paragraph::new(readout).block(Block::default().title(" Now ").borders(Borders::ALL)),
        readout_row[0],
    );

    let level = Gauge::default()
        .block(Block::default().title(" Volume (RMS) ").borders(Borders::ALL))
        .gauge_style(Style::default().fg(Color::Blue))
        .ratio((app.view.rms() / MIC_FULL_SCALE).clamp(0.0, 1.0))
        .label(format!("{:.3} V", app.view.rms()));
    f.render_widget(level, readout_row[1]);

    let help = Line::from(vec![
        " Quit ".into(),
        "<Q>".magenta().bold(),
        " Pause ".into(),
        "<P>".magenta().bold(),
        " Channels ".into(),
        "<1-4>".magenta().bold(),
        " Export ".into(),
        "<E>".magenta().bold(),
        " Clear ".into(),
        "<C>".magenta().bold(),
    ]);
    f.render_widget(Paragraph::new(help), rows[4]);
}
