//! Frame rendering for the detail view and its optional sidebar.

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};
use unicode_width::UnicodeWidthStr;

use super::detail::EntryDetailScreen;
use super::markdown::render_markdown;
use super::sidebar::Sidebar;

/// Braille spinner shown while mobilization is in flight.
const SPINNER: [char; 10] = ['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];

/// Render one frame. `sidebar` is drawn only in two-column layout.
pub fn render(
    f: &mut Frame,
    screen: &mut EntryDetailScreen,
    sidebar: &mut Sidebar,
    two_column: bool,
) {
    let area = f.area();
    // Layout can produce zero-sized rects during extreme resizes.
    if area.width < 3 || area.height < 4 {
        return;
    }

    let detail_area = if two_column {
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(32), Constraint::Percentage(68)])
            .split(area);
        sidebar.render(f, columns[0]);
        columns[1]
    } else {
        area
    };

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(1),
            Constraint::Length(1),
        ])
        .split(detail_area);

    render_action_row(f, screen, rows[0]);
    render_body(f, screen, rows[1]);
    render_status(f, screen, rows[2]);
}

/// The toolbar line: back affordance, feed title, action hints.
fn render_action_row(f: &mut Frame, screen: &EntryDetailScreen, area: Rect) {
    if area.width < 1 {
        return;
    }
    let actions = screen.actions();
    let mut spans: Vec<Span<'_>> = Vec::new();

    if actions.show_back {
        spans.push(Span::styled("← ", Style::default().fg(Color::Gray)));
    }
    if let Some(title) = &actions.title {
        spans.push(Span::styled(
            title.to_string(),
            Style::default().add_modifier(Modifier::BOLD),
        ));
        spans.push(Span::raw("  "));
    }
    for item in &actions.items {
        spans.push(Span::styled(
            format!("[{}] ", item.key),
            Style::default().fg(Color::Yellow),
        ));
        spans.push(Span::styled(
            format!("{}  ", item.label),
            Style::default().fg(Color::Gray),
        ));
    }

    let paragraph =
        Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
    f.render_widget(paragraph, area);
}

fn render_body(f: &mut Frame, screen: &mut EntryDetailScreen, area: Rect) {
    if area.width < 3 || area.height < 3 {
        return;
    }
    screen.visible_lines = area.height.saturating_sub(2) as usize;
    screen.viewport_width = area.width.saturating_sub(2) as usize;

    let Some(snapshot) = screen.entry() else {
        let placeholder = Paragraph::new("No entry selected")
            .block(Block::default().borders(Borders::ALL).title("Entry"));
        f.render_widget(placeholder, area);
        return;
    };
    let showing_full =
        screen.prefer_full_text() && snapshot.entry.mobilized_content.is_some();

    let mut lines: Vec<Line<'static>> = vec![
        Line::from(Span::styled(
            snapshot.entry.title.to_string(),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(
            format!(
                "{} • {}",
                snapshot.feed_title,
                format_published(snapshot.entry.published)
            ),
            Style::default().fg(Color::DarkGray),
        )),
        Line::from(""),
    ];

    match screen.body_text() {
        Some(body) => lines.extend(render_markdown(body)),
        None => lines.push(Line::from(Span::styled(
            "This entry has no content.",
            Style::default().fg(Color::DarkGray),
        ))),
    }

    // Clamp before rendering so a resize never paints one frame with an
    // out-of-range offset.
    let total = wrapped_line_total(&lines, screen.viewport_width.max(1));
    screen.clamp_scroll(total);

    let mode = if showing_full { "full text" } else { "original" };
    let paragraph = Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("Entry ({})", mode)),
        )
        .wrap(Wrap { trim: false })
        .scroll((screen.scroll_offset.min(u16::MAX as usize) as u16, 0));
    f.render_widget(paragraph, area);
}

fn render_status(f: &mut Frame, screen: &EntryDetailScreen, area: Rect) {
    if area.width < 1 {
        return;
    }
    let text: String = if let Some(msg) = screen.status() {
        msg.to_string()
    } else if screen.is_refreshing() {
        format!(
            "{} Fetching full text...",
            SPINNER[screen.spinner_frame % SPINNER.len()]
        )
    } else {
        "[←/→]prev/next [t]full text [f]star [o]open [s]share [u]unread [j/k]scroll [q]uit"
            .to_string()
    };

    let paragraph =
        Paragraph::new(text).style(Style::default().bg(Color::DarkGray).fg(Color::White));
    f.render_widget(paragraph, area);
}

/// How many display lines the content occupies after wrapping.
fn wrapped_line_total(lines: &[Line<'_>], width: usize) -> usize {
    lines.iter().map(|l| wrapped_line_count(l, width)).sum()
}

fn wrapped_line_count(line: &Line<'_>, width: usize) -> usize {
    let width = width.max(1);
    let line_width: usize = line.spans.iter().map(|s| s.content.width()).sum();
    if line_width == 0 {
        1 // Blank lines still occupy a row.
    } else {
        line_width.div_ceil(width)
    }
}

/// Relative timestamp for the header line.
fn format_published(published: Option<i64>) -> String {
    let Some(published) = published else {
        return "undated".to_string();
    };
    let now = chrono::Utc::now().timestamp();
    let delta = now.saturating_sub(published);
    match delta {
        d if d < 0 => "in the future".to_string(),
        d if d < 60 => "just now".to_string(),
        d if d < 3600 => format!("{}m ago", d / 60),
        d if d < 86_400 => format!("{}h ago", d / 3600),
        d if d < 30 * 86_400 => format!("{}d ago", d / 86_400),
        _ => chrono::DateTime::from_timestamp(published, 0)
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "undated".to_string()),
    }
}
