use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use crestron_panel::{
    AggregateControl, AnalogJoin, ConnectionStatus, DigitalJoin, JoinId, JoinKind, LinearRange,
    Panel, PanelConfig, SerialJoin, StatusReceiver,
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use std::io;

// Default join numbers, used when no join map is configured
const ALL_MICS: u32 = 20;
const BOARDROOM_MIC: u32 = 21;
const TRAINING_MIC: u32 = 22;
const WIRELESS_MIC: u32 = 23;
const SPEAKER_VOLUME: u32 = 1;
const CLIMATE_SETPOINT: u32 = 2;
const ALERT_TEXT: u32 = 1;

const CLIMATE_RANGE: LinearRange = LinearRange::new(16.0, 30.0);

/// Join from the configured map, or the demo default
fn join_id(
    panel: &Panel,
    kind: JoinKind,
    name: &str,
    fallback: u32,
) -> Result<JoinId, Box<dyn std::error::Error>> {
    match panel.joins().lookup(kind, name) {
        Ok(id) => Ok(id),
        Err(_) => JoinId::new(fallback).ok_or_else(|| format!("invalid join {}", fallback).into()),
    }
}

struct App {
    panel: Panel,
    mics: AggregateControl,
    volume: AnalogJoin,
    climate: AnalogJoin,
    alert: SerialJoin,
    status: StatusReceiver,
    connection: ConnectionStatus,
    selected_mic: usize,
    status_message: String,
}

impl App {
    fn new(panel: Panel) -> Result<Self, Box<dyn std::error::Error>> {
        let digital = |name, fallback| join_id(&panel, JoinKind::Digital, name, fallback);
        let mics = panel.aggregate(
            digital("ALL_MICS", ALL_MICS)?,
            [
                digital("BOARDROOM_MIC", BOARDROOM_MIC)?,
                digital("TRAINING_MIC", TRAINING_MIC)?,
                digital("WIRELESS_MIC", WIRELESS_MIC)?,
            ],
        )?;
        let volume = panel.analog(
            join_id(&panel, JoinKind::Analog, "SPEAKER_VOLUME", SPEAKER_VOLUME)?,
            50.0,
        );
        let climate = panel.analog(
            join_id(&panel, JoinKind::Analog, "CLIMATE_SETPOINT", CLIMATE_SETPOINT)?,
            CLIMATE_RANGE.to_percent(21.0),
        );
        let alert = panel.serial(
            join_id(&panel, JoinKind::Serial, "ALERT_TEXT", ALERT_TEXT)?,
            "",
        );

        let mut status = panel.connection().subscribe();
        let connection = status.current();
        let status_message = if panel.is_live() {
            "Live: j/k select, Space toggle, a all mics, +/- volume, [/] climate, q quit".to_string()
        } else {
            "Offline mode: changes stay on this panel. q to quit".to_string()
        };

        Ok(Self {
            panel,
            mics,
            volume,
            climate,
            alert,
            status,
            connection,
            selected_mic: 0,
            status_message,
        })
    }

    /// Microphone rows: constituents first, then the combined control
    fn mic_rows(&self) -> Vec<(&'static str, &DigitalJoin)> {
        let names = ["Boardroom", "Training Room", "Wireless"];
        let mut rows: Vec<(&'static str, &DigitalJoin)> = names
            .iter()
            .copied()
            .zip(self.mics.constituents())
            .collect();
        rows.push(("All Mics", self.mics.aggregate()));
        rows
    }

    fn select_next(&mut self) {
        let count = self.mic_rows().len();
        self.selected_mic = (self.selected_mic + 1) % count;
    }

    fn select_previous(&mut self) {
        let count = self.mic_rows().len();
        if self.selected_mic == 0 {
            self.selected_mic = count - 1;
        } else {
            self.selected_mic -= 1;
        }
    }

    fn toggle_selected(&mut self) {
        let rows = self.mic_rows();
        let is_aggregate = self.selected_mic + 1 == rows.len();
        let (name, mic) = rows[self.selected_mic];
        let on = if is_aggregate {
            self.mics.toggle()
        } else {
            mic.toggle()
        };
        self.status_message = format!("{}: {}", name, if on { "ON" } else { "OFF" });
    }

    fn toggle_all(&mut self) {
        let on = self.mics.toggle();
        self.status_message = format!("All Mics: {}", if on { "ON" } else { "OFF" });
    }

    fn adjust_volume(&mut self, delta: i16) {
        let value = self.volume.adjust(delta);
        self.status_message = format!("Volume: {}%", value);
    }

    fn adjust_climate(&mut self, delta: f64) {
        let current = self.climate.value_in(CLIMATE_RANGE);
        let target = (current + delta).clamp(CLIMATE_RANGE.min, CLIMATE_RANGE.max);
        self.climate.set_in(CLIMATE_RANGE, target);
        self.status_message = format!("Set point: {:.1} °C", self.climate.value_in(CLIMATE_RANGE));
    }

    fn poll_connection(&mut self) {
        let latest = self.status.current();
        if latest != self.connection {
            self.status_message = format!("Control processor {}", latest);
            self.connection = latest;
        }
    }
}

fn ui(f: &mut Frame, app: &App) {
    let outer_chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(f.size());

    render_connection(f, app, outer_chunks[0]);

    let inner_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(outer_chunks[1]);

    render_microphones(f, app, inner_chunks[0]);
    render_room(f, app, inner_chunks[1]);
    render_status(f, app, outer_chunks[2]);
}

fn render_connection(f: &mut Frame, app: &App, area: Rect) {
    let color = match &app.connection {
        ConnectionStatus::Connected => Color::Green,
        ConnectionStatus::Initializing | ConnectionStatus::Disconnected => Color::Yellow,
        ConnectionStatus::Error { .. } => Color::Red,
        ConnectionStatus::Unavailable { .. } => Color::Gray,
    };
    let block = Block::default()
        .title(" Control Processor ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(color));

    let line = Line::from(vec![
        Span::styled("Status: ", Style::default().fg(Color::Yellow)),
        Span::styled(
            app.connection.to_string(),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ),
        Span::raw(if app.panel.is_live() { "" } else { "  (offline)" }),
    ]);
    f.render_widget(Paragraph::new(line).block(block), area);
}

fn render_microphones(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .title(format!(
            " Microphones ({}/{} on) ",
            app.mics.active_count(),
            app.mics.constituents().len()
        ))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let items: Vec<ListItem> = app
        .mic_rows()
        .into_iter()
        .map(|(name, mic)| {
            let on = mic.value();
            ListItem::new(Line::from(vec![
                Span::styled(format!("{:<14}", name), Style::default().fg(Color::Yellow)),
                Span::styled(
                    if on { "ON" } else { "OFF" },
                    if on {
                        Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
                    } else {
                        Style::default().fg(Color::Red)
                    },
                ),
                Span::styled(
                    format!("  join {}", mic.id()),
                    Style::default().fg(Color::DarkGray),
                ),
            ]))
        })
        .collect();

    let mut state = ListState::default();
    state.select(Some(app.selected_mic));

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol(">> ");

    f.render_stateful_widget(list, area, &mut state);
}

fn render_room(f: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(0),
        ])
        .split(area);

    let volume = Gauge::default()
        .block(
            Block::default()
                .title(" Speaker Volume (+/-) ")
                .borders(Borders::ALL),
        )
        .gauge_style(Style::default().fg(Color::Cyan))
        .percent(u16::from(app.volume.value()));
    f.render_widget(volume, chunks[0]);

    let climate = Gauge::default()
        .block(
            Block::default()
                .title(" Climate Set Point ([/]) ")
                .borders(Borders::ALL),
        )
        .gauge_style(Style::default().fg(Color::Magenta))
        .percent(u16::from(app.climate.value()))
        .label(format!("{:.1} °C", app.climate.value_in(CLIMATE_RANGE)));
    f.render_widget(climate, chunks[1]);

    let alert = app.alert.value();
    let text = if alert.is_empty() {
        Paragraph::new("No alerts").style(Style::default().fg(Color::DarkGray))
    } else {
        Paragraph::new(alert).style(Style::default().fg(Color::Red).add_modifier(Modifier::BOLD))
    };
    let block = Block::default()
        .title(" Alerts ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red));
    f.render_widget(text.block(block).wrap(Wrap { trim: true }), chunks[2]);
}

fn render_status(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .title(" Status ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Gray));

    let text = Paragraph::new(app.status_message.clone())
        .block(block)
        .wrap(Wrap { trim: true });

    f.render_widget(text, area);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Optional config path; without one the panel runs offline
    let config = match std::env::args().nth(1) {
        Some(path) => PanelConfig::from_path(path)?,
        None => PanelConfig::default(),
    };
    let panel = Panel::connect(config).await?;
    let mut app = App::new(panel)?;

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Main loop
    let res = run_app(&mut terminal, &mut app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {}", err);
    }

    Ok(())
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
) -> Result<(), Box<dyn std::error::Error>> {
    loop {
        app.poll_connection();

        // Draw UI
        terminal.draw(|f| ui(f, app))?;

        // Handle input events (non-blocking)
        if event::poll(std::time::Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') => return Ok(()),
                        KeyCode::Char('j') | KeyCode::Down => app.select_next(),
                        KeyCode::Char('k') | KeyCode::Up => app.select_previous(),
                        KeyCode::Char(' ') | KeyCode::Enter => app.toggle_selected(),
                        KeyCode::Char('a') => app.toggle_all(),
                        KeyCode::Char('+') | KeyCode::Char('=') => app.adjust_volume(5),
                        KeyCode::Char('-') | KeyCode::Char('_') => app.adjust_volume(-5),
                        KeyCode::Char(']') => app.adjust_climate(0.5),
                        KeyCode::Char('[') => app.adjust_climate(-0.5),
                        _ => {}
                    }
                }
            }
        }
    }
}
