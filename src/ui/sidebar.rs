//! Entry-title list shown beside the detail pane in two-column layout.
//!
//! Read-only from the user's point of view: selection follows the detail
//! screen (via the navigator), it is not an input surface of its own.

use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, List, ListItem, ListState},
    Frame,
};

pub struct Sidebar {
    /// (entry id, title) in browsing-sequence order.
    items: Vec<(String, String)>,
    state: ListState,
}

impl Sidebar {
    pub fn new(items: Vec<(String, String)>) -> Self {
        Self {
            items,
            state: ListState::default(),
        }
    }

    /// Move the highlight to the given entry id, if it is in the list.
    pub fn select_id(&mut self, entry_id: &str) {
        let position = self.items.iter().position(|(id, _)| id == entry_id);
        self.state.select(position);
    }

    pub fn render(&mut self, f: &mut Frame, area: Rect) {
        if area.width < 3 || area.height < 3 {
            return;
        }
        let items: Vec<ListItem> = self
            .items
            .iter()
            .map(|(_, title)| ListItem::new(title.as_str()))
            .collect();

        let list = List::new(items)
            .block(Block::default().borders(Borders::ALL).title("Entries"))
            .highlight_style(
                Style::default()
                    .bg(Color::DarkGray)
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol("> ");

        f.render_stateful_widget(list, area, &mut self.state);
    }
}
