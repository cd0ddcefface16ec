//! The detail screen's action row, the toolbar-menu equivalent.
//!
//! Rebuilt from the loaded snapshot whenever state that feeds a label
//! changes (favorite flag, full-text availability, display mode, layout).

use std::sync::Arc;

use crate::storage::EntryWithFeed;

/// What an action row item does when activated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    ToggleFavorite,
    OpenInBrowser,
    Share,
    ToggleFullText,
    MarkUnread,
}

#[derive(Debug, Clone)]
pub struct ActionItem {
    pub kind: ActionKind,
    pub key: char,
    pub label: &'static str,
}

/// The rendered action row: feed title, optional back affordance, items.
#[derive(Debug, Clone)]
pub struct ActionRow {
    pub title: Option<Arc<str>>,
    pub show_back: bool,
    pub items: Vec<ActionItem>,
}

impl ActionRow {
    /// Row shown before any snapshot is loaded: nothing.
    pub fn empty() -> Self {
        Self {
            title: None,
            show_back: false,
            items: Vec::new(),
        }
    }
}

/// Build the action row for the current snapshot.
///
/// No snapshot yet → empty row. The back affordance only appears in
/// single-column layout, where the detail view is the whole screen.
pub fn build(entry: Option<&EntryWithFeed>, prefer_full_text: bool, two_column: bool) -> ActionRow {
    let Some(entry) = entry else {
        return ActionRow::empty();
    };

    let favorite_label = if entry.entry.favorite { "Unstar" } else { "Star" };
    // Offer "Full text" until mobilized content is both present and shown.
    let fulltext_label = if entry.entry.mobilized_content.is_none() || !prefer_full_text {
        "Full text"
    } else {
        "Original text"
    };

    ActionRow {
        title: Some(Arc::clone(&entry.feed_title)),
        show_back: !two_column,
        items: vec![
            ActionItem {
                kind: ActionKind::ToggleFavorite,
                key: 'f',
                label: favorite_label,
            },
            ActionItem {
                kind: ActionKind::OpenInBrowser,
                key: 'o',
                label: "Browser",
            },
            ActionItem {
                kind: ActionKind::Share,
                key: 's',
                label: "Share",
            },
            ActionItem {
                kind: ActionKind::ToggleFullText,
                key: 't',
                label: fulltext_label,
            },
            ActionItem {
                kind: ActionKind::MarkUnread,
                key: 'u',
                label: "Mark unread",
            },
        ],
    }
}
