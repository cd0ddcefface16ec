//! Markdown-to-ratatui rendering for entry bodies.
//!
//! Both content sources are markdown-ish text: feed descriptions are stored
//! pre-converted by the fetcher, and the mobilization gateway returns
//! markdown. The walk below covers the constructs that actually occur in
//! article text; anything unrecognized falls through as plain text.

use pulldown_cmark::{Event, Parser, Tag, TagEnd};
use ratatui::{
    style::{Color, Modifier, Style},
    text::{Line, Span},
};

/// Convert markdown to styled lines. Returns owned lines so the caller can
/// cache them across frames.
pub fn render_markdown(md: &str) -> Vec<Line<'static>> {
    let parser = Parser::new(md);
    let mut lines: Vec<Line<'static>> = Vec::with_capacity(md.lines().count());
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut in_code_block = false;
    let mut in_heading = false;
    let mut emphasis_depth = 0u32;
    let mut strong_depth = 0u32;

    let flush = |spans: &mut Vec<Span<'static>>, lines: &mut Vec<Line<'static>>| {
        if !spans.is_empty() {
            lines.push(Line::from(std::mem::take(spans)));
        }
    };

    for event in parser {
        match event {
            Event::Start(Tag::Heading { .. }) => in_heading = true,
            Event::End(TagEnd::Heading(_)) => {
                flush(&mut spans, &mut lines);
                lines.push(Line::from(""));
                in_heading = false;
            }
            Event::End(TagEnd::Paragraph) => {
                flush(&mut spans, &mut lines);
                lines.push(Line::from(""));
            }
            Event::Start(Tag::CodeBlock(_)) => in_code_block = true,
            Event::End(TagEnd::CodeBlock) => {
                in_code_block = false;
                lines.push(Line::from(""));
            }
            Event::Start(Tag::Item) => {
                flush(&mut spans, &mut lines);
                spans.push(Span::raw("  - "));
            }
            Event::End(TagEnd::Item) => flush(&mut spans, &mut lines),
            Event::Start(Tag::Emphasis) => emphasis_depth += 1,
            Event::End(TagEnd::Emphasis) => emphasis_depth = emphasis_depth.saturating_sub(1),
            Event::Start(Tag::Strong) => strong_depth += 1,
            Event::End(TagEnd::Strong) => strong_depth = strong_depth.saturating_sub(1),
            Event::Start(Tag::Image { dest_url, .. }) => {
                spans.push(Span::styled(
                    format!("[image: {}]", dest_url),
                    Style::default().fg(Color::Blue),
                ));
            }
            Event::Text(text) => {
                let style = if in_code_block {
                    Style::default().fg(Color::Yellow)
                } else if in_heading {
                    Style::default().add_modifier(Modifier::BOLD).fg(Color::Cyan)
                } else if strong_depth > 0 {
                    Style::default().add_modifier(Modifier::BOLD)
                } else if emphasis_depth > 0 {
                    Style::default().add_modifier(Modifier::ITALIC)
                } else {
                    Style::default()
                };
                spans.push(Span::styled(text.into_string(), style));
            }
            Event::Code(code) => {
                spans.push(Span::styled(
                    format!("`{}`", code),
                    Style::default().fg(Color::Yellow),
                ));
            }
            Event::SoftBreak => spans.push(Span::raw(" ")),
            Event::HardBreak => flush(&mut spans, &mut lines),
            _ => {}
        }
    }

    flush(&mut spans, &mut lines);
    lines
}
