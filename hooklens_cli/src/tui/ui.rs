//! TUI rendering functions

use super::app::TuiApp;
use crate::session::SessionPhase;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState, Wrap},
    Frame,
};

/// Draw the TUI
pub fn draw(frame: &mut Frame, app: &TuiApp) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(7), // Session header
            Constraint::Min(5),    // Request table + detail
            Constraint::Length(1), // Footer
        ])
        .split(frame.area());

    draw_header(frame, app, chunks[0]);
    draw_body(frame, app, chunks[1]);
    draw_footer(frame, chunks[2]);
}

/// Draw the session header: phase, port, tunnel and public URL
fn draw_header(frame: &mut Frame, app: &TuiApp, area: Rect) {
    let phase_color = match app.state.phase {
        SessionPhase::Running => Color::Green,
        SessionPhase::Starting | SessionPhase::Stopping => Color::Yellow,
        SessionPhase::Stopped => Color::Red,
    };

    let tunnel_str = if app.state.tunnel_enabled { "on" } else { "off" };
    let public_url = if app.state.public_url.is_empty() {
        "-"
    } else {
        app.state.public_url.as_str()
    };

    let mut lines = vec![
        Line::from(vec![
            Span::styled("Session     ", Style::default().fg(Color::DarkGray)),
            Span::styled(
                app.state.phase.as_str(),
                Style::default().fg(phase_color).add_modifier(Modifier::BOLD),
            ),
        ]),
        Line::from(vec![
            Span::styled("Port        ", Style::default().fg(Color::DarkGray)),
            Span::styled(app.state.port.to_string(), Style::default().fg(Color::White)),
        ]),
        Line::from(vec![
            Span::styled("Tunnel      ", Style::default().fg(Color::DarkGray)),
            Span::styled(tunnel_str, Style::default().fg(Color::White)),
        ]),
        Line::from(vec![
            Span::styled("Public URL  ", Style::default().fg(Color::DarkGray)),
            Span::styled(
                truncate_str(public_url, (area.width as usize).saturating_sub(16)),
                Style::default().fg(Color::Green),
            ),
        ]),
    ];

    if let Some(ref message) = app.message {
        lines.push(Line::from(Span::styled(
            message.clone(),
            Style::default().fg(Color::Red),
        )));
    }

    let paragraph = Paragraph::new(lines).block(
        Block::default()
            .title(" hooklens ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray)),
    );
    frame.render_widget(paragraph, area);
}

fn draw_body(frame: &mut Frame, app: &TuiApp, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(area);

    draw_requests(frame, app, chunks[0]);
    draw_detail(frame, app, chunks[1]);
}

/// Draw the newest-first request table
fn draw_requests(frame: &mut Frame, app: &TuiApp, area: Rect) {
    let path_width = (area.width as usize).saturating_sub(9 + 7 + 6).max(10);

    let header = Row::new(vec!["Time", "Method", "Path"])
        .style(Style::default().fg(Color::DarkGray).add_modifier(Modifier::BOLD));

    let rows: Vec<Row> = app
        .records
        .iter()
        .map(|r| {
            Row::new(vec![
                Cell::from(r.timestamp.format("%H:%M:%S").to_string()),
                Cell::from(format!("{:>6}", truncate_str(&r.method, 6)))
                    .style(method_style(&r.method)),
                Cell::from(truncate_str(&r.url, path_width)),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(9),
            Constraint::Length(7),
            Constraint::Min(10),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .title(format!(" Requests ({}) ", app.records.len()))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray)),
    )
    .row_highlight_style(Style::default().bg(Color::Rgb(40, 40, 60)));

    let mut state = TableState::default();
    if !app.records.is_empty() {
        state.select(Some(app.selected_index));
    }

    frame.render_stateful_widget(table, area, &mut state);
}

/// Draw the detail pane for the record under the cursor
fn draw_detail(frame: &mut Frame, app: &TuiApp, area: Rect) {
    let block = Block::default()
        .title(" Detail ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));

    let Some(record) = app.selected.as_ref() else {
        let placeholder = Paragraph::new(Span::styled(
            "No request selected",
            Style::default().fg(Color::DarkGray),
        ))
        .block(block);
        frame.render_widget(placeholder, area);
        return;
    };

    let mut lines = vec![
        Line::from(vec![
            Span::styled(
                record.method.clone(),
                method_style(&record.method).add_modifier(Modifier::BOLD),
            ),
            Span::raw(" "),
            Span::styled(record.url.clone(), Style::default().fg(Color::White)),
        ]),
        Line::from(Span::styled(
            record.timestamp.to_rfc3339(),
            Style::default().fg(Color::DarkGray),
        )),
        Line::default(),
    ];

    if !record.query_params.is_empty() {
        lines.push(section_title("Query"));
        let mut params: Vec<_> = record.query_params.iter().collect();
        params.sort();
        for (name, value) in params {
            lines.push(Line::from(format!("  {}: {}", name, value)));
        }
        lines.push(Line::default());
    }

    lines.push(section_title("Headers"));
    if record.headers.is_empty() {
        lines.push(Line::from(Span::styled(
            "  (none)",
            Style::default().fg(Color::DarkGray),
        )));
    }
    let mut headers: Vec<_> = record.headers.iter().collect();
    headers.sort();
    for (name, value) in headers {
        lines.push(Line::from(format!("  {}: {}", name, value)));
    }

    if !record.body.is_empty() {
        lines.push(Line::default());
        lines.push(section_title("Body"));
        for body_line in record.body.lines() {
            lines.push(Line::from(body_line.to_string()));
        }
    }

    let paragraph = Paragraph::new(lines).wrap(Wrap { trim: false }).block(block);
    frame.render_widget(paragraph, area);
}

/// Draw the footer with key hints
fn draw_footer(frame: &mut Frame, area: Rect) {
    let footer = Line::from(vec![
        key_span("s"),
        Span::raw(" start/stop  "),
        key_span("t"),
        Span::raw(" tunnel  "),
        key_span("c"),
        Span::raw(" clear  "),
        key_span("j/k"),
        Span::raw(" select  "),
        key_span("o"),
        Span::raw(" open url  "),
        key_span("+/-"),
        Span::raw(" port  "),
        key_span("q"),
        Span::raw(" quit"),
    ]);

    frame.render_widget(
        Paragraph::new(footer).style(Style::default().fg(Color::DarkGray)),
        area,
    );
}

fn key_span(key: &str) -> Span<'_> {
    Span::styled(
        key,
        Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
    )
}

fn section_title(title: &str) -> Line<'_> {
    Line::from(Span::styled(
        title,
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
    ))
}

/// Get style for HTTP method
fn method_style(method: &str) -> Style {
    match method {
        "GET" => Style::default().fg(Color::Green),
        "POST" => Style::default().fg(Color::Yellow),
        "PUT" => Style::default().fg(Color::Blue),
        "PATCH" => Style::default().fg(Color::Magenta),
        "DELETE" => Style::default().fg(Color::Red),
        "HEAD" => Style::default().fg(Color::Cyan),
        _ => Style::default().fg(Color::White),
    }
}

/// Truncate any string to max length
fn truncate_str(s: &str, max_len: usize) -> String {
    if s.len() > max_len && max_len > 3 {
        format!("{}...", &s[..max_len - 3])
    } else if s.len() > max_len {
        s[..max_len].to_string()
    } else {
        s.to_string()
    }
}
