/*!
 * bluetui Interface
 * Device list, details and status panels
 */

use bluetui_core::Device;
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Frame,
};

use crate::app::{App, Mode, StatusLevel};

// Conservative color palette
const BLUE: Color = Color::Rgb(100, 149, 237);
const GRAY: Color = Color::Rgb(128, 128, 128);
const WHITE: Color = Color::Rgb(255, 255, 255);
const GREEN: Color = Color::Rgb(34, 139, 34);
const RED: Color = Color::Rgb(220, 20, 60);

const SHORT_HELP: &[(&str, &str)] = &[
    ("s", "scan"),
    ("p", "pair"),
    ("t", "trust"),
    ("c", "connect"),
    ("x", "disconnect"),
    ("?", "help"),
    ("q", "quit"),
];

const FULL_HELP: &[(&str, &str)] = &[
    ("↑/k", "up"),
    ("↓/j", "down"),
    ("g/Home", "first"),
    ("G/End", "last"),
    ("←/h/PgUp", "prev page"),
    ("→/l/PgDn", "next page"),
    ("/", "filter"),
    ("Esc", "clear filter"),
];

pub fn render_ui(f: &mut Frame, app: &App) {
    let help_height = if app.show_help { 2 } else { 1 };
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),           // Adapter header
            Constraint::Min(5),              // Devices and details
            Constraint::Length(1),           // Status line
            Constraint::Length(help_height), // Key help
        ])
        .split(f.area());

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(45), // Device list
            Constraint::Percentage(55), // Details
        ])
        .split(rows[1]);

    render_header(f, rows[0], app);
    render_device_panel(f, columns[0], app);
    render_details_panel(f, columns[1], app);
    render_status(f, rows[2], app);
    render_help(f, rows[3], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let mut spans = vec![Span::styled(
        " bluetui ",
        Style::default().fg(WHITE).bg(BLUE).add_modifier(Modifier::BOLD),
    )];

    match &app.adapter {
        Some(adapter) => {
            spans.push(Span::raw(" "));
            spans.push(Span::styled(&adapter.name, Style::default().fg(WHITE)));
            spans.push(Span::styled(format!(" ({})", adapter.address), Style::default().fg(GRAY)));
            spans.push(if adapter.powered {
                Span::styled(" ● powered", Style::default().fg(GREEN))
            } else {
                Span::styled(" ○ off", Style::default().fg(RED))
            });
        }
        None => spans.push(Span::styled(
            format!(" {}", app.session().path()),
            Style::default().fg(GRAY),
        )),
    }

    if let Some(at) = app.last_scan {
        spans.push(Span::styled(
            format!("  last scan {}", at.format("%H:%M:%S")),
            Style::default().fg(GRAY),
        ));
    }

    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_device_panel(f: &mut Frame, area: Rect, app: &App) {
    let filtering = app.mode == Mode::Filter || !app.filter.value().is_empty();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(if filtering {
            vec![Constraint::Length(3), Constraint::Min(3)]
        } else {
            vec![Constraint::Length(0), Constraint::Min(3)]
        })
        .split(area);

    if filtering {
        render_filter(f, chunks[0], app);
    }

    let visible = app.visible();
    let items: Vec<ListItem> = visible
        .iter()
        .enumerate()
        .map(|(i, device)| device_item(device, i == app.selected))
        .collect();

    let border_style = if app.mode == Mode::Browse {
        Style::default().fg(BLUE)
    } else {
        Style::default().fg(GRAY)
    };

    let title = format!("Bluetooth Devices ({}/{})", visible.len(), app.devices.len());
    if items.is_empty() {
        let paragraph = Paragraph::new("No devices. Press s to scan.")
            .style(Style::default().fg(GRAY))
            .block(Block::default().borders(Borders::ALL).title(title).border_style(border_style))
            .alignment(Alignment::Center);
        f.render_widget(paragraph, chunks[1]);
        return;
    }

    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .title(title)
            .border_style(border_style),
    );

    f.render_widget(list, chunks[1]);
}

fn device_item(device: &Device, selected: bool) -> ListItem<'_> {
    let prefix = if selected { "▶ " } else { "  " };
    let (indicator, color) = if device.is_connected() {
        ("●", GREEN)
    } else if device.is_paired() {
        ("◐", BLUE)
    } else {
        ("○", GRAY)
    };

    let content = Line::from(vec![
        Span::raw(prefix),
        Span::styled(indicator, Style::default().fg(color)),
        Span::raw(" "),
        Span::styled(device.name(), Style::default().fg(WHITE)),
        Span::styled(format!("  {}", device.address()), Style::default().fg(GRAY)),
    ]);

    if selected {
        ListItem::new(content).style(Style::default().bg(BLUE).fg(WHITE))
    } else {
        ListItem::new(content)
    }
}

fn render_filter(f: &mut Frame, area: Rect, app: &App) {
    let active = app.mode == Mode::Filter;
    let width = area.width.saturating_sub(2) as usize;
    let scroll = app.filter.visual_scroll(width);

    let input = Paragraph::new(app.filter.value())
        .scroll((0, scroll as u16))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Filter")
                .border_style(Style::default().fg(if active { BLUE } else { GRAY })),
        );
    f.render_widget(input, area);

    if active {
        let cursor = app.filter.visual_cursor().saturating_sub(scroll) as u16;
        f.set_cursor_position((area.x + 1 + cursor, area.y + 1));
    }
}

fn render_details_panel(f: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Device")
        .border_style(Style::default().fg(GRAY));

    let Some(device) = app.selected_device() else {
        let paragraph = Paragraph::new("No device selected")
            .block(block)
            .alignment(Alignment::Center);
        f.render_widget(paragraph, area);
        return;
    };

    let paragraph = Paragraph::new(device_details(device))
        .block(block)
        .alignment(Alignment::Left);
    f.render_widget(paragraph, area);
}

fn device_details(device: &Device) -> Vec<Line<'_>> {
    vec![
        Line::from(vec![Span::styled(
            device.name(),
            Style::default().fg(WHITE).add_modifier(Modifier::BOLD),
        )]),
        Line::from(""),
        field("Address: ", device.address().to_string()),
        field("Path: ", device.path().to_string()),
        Line::from(""),
        flag("Paired: ", device.is_paired()),
        flag("Trusted: ", device.is_trusted()),
        flag("Connected: ", device.is_connected()),
        Line::from(""),
        Line::from("[p] Pair  [t] Trust"),
        Line::from("[c] Connect  [x] Disconnect"),
    ]
}

fn field(label: &'static str, value: String) -> Line<'static> {
    Line::from(vec![
        Span::styled(label, Style::default().fg(GRAY)),
        Span::styled(value, Style::default().fg(WHITE)),
    ])
}

fn flag(label: &'static str, set: bool) -> Line<'static> {
    let (text, color) = if set { ("yes", GREEN) } else { ("no", GRAY) };
    Line::from(vec![
        Span::styled(label, Style::default().fg(GRAY)),
        Span::styled(text, Style::default().fg(color)),
    ])
}

fn render_status(f: &mut Frame, area: Rect, app: &App) {
    let color = match app.status.level {
        StatusLevel::Info => WHITE,
        StatusLevel::Busy => BLUE,
        StatusLevel::Error => RED,
    };
    let status = Paragraph::new(format!(" {}", app.status.message)).style(Style::default().fg(color));
    f.render_widget(status, area);
}

fn render_help(f: &mut Frame, area: Rect, app: &App) {
    let mut lines = vec![help_line(SHORT_HELP)];
    if app.show_help {
        lines.push(help_line(FULL_HELP));
    }
    f.render_widget(Paragraph::new(lines), area);
}

fn help_line(bindings: &[(&'static str, &'static str)]) -> Line<'static> {
    let mut spans = vec![Span::raw(" ")];
    for (i, (key, desc)) in bindings.iter().enumerate() {
        if i > 0 {
            spans.push(Span::styled(" • ", Style::default().fg(GRAY)));
        }
        spans.push(Span::styled(*key, Style::default().fg(WHITE)));
        spans.push(Span::styled(format!(" {}", desc), Style::default().fg(GRAY)));
    }
    Line::from(spans)
}
