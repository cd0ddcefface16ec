//! Keyboard dispatch for the detail view.

use crossterm::event::{KeyCode, KeyModifiers};

use super::detail::EntryDetailScreen;
use super::loop_runner::Action;

/// Lines per Ctrl+d / Ctrl+u page jump.
const PAGE_JUMP: usize = 10;

/// Map one key press onto a screen operation.
pub fn handle_input(
    screen: &mut EntryDetailScreen,
    code: KeyCode,
    modifiers: KeyModifiers,
) -> Action {
    // Paging first: plain d/u mean something else.
    if modifiers.contains(KeyModifiers::CONTROL) {
        match code {
            KeyCode::Char('d') => {
                screen.scroll_down(PAGE_JUMP);
                return Action::Continue;
            }
            KeyCode::Char('u') => {
                screen.scroll_up(PAGE_JUMP);
                return Action::Continue;
            }
            KeyCode::Char('c') => return Action::Quit,
            _ => return Action::Continue,
        }
    }

    match code {
        KeyCode::Char('q') => Action::Quit,
        KeyCode::Esc | KeyCode::Backspace => Action::Back,

        // Arrow keys carry list direction: ← goes to the previous entry,
        // which is the swipe-right gesture, and vice versa.
        KeyCode::Left | KeyCode::Char('h') => {
            screen.swipe_right();
            Action::Continue
        }
        KeyCode::Right | KeyCode::Char('l') => {
            screen.swipe_left();
            Action::Continue
        }

        KeyCode::Char('f') => {
            screen.toggle_favorite();
            Action::Continue
        }
        KeyCode::Char('o') => {
            screen.open_in_browser();
            Action::Continue
        }
        KeyCode::Char('s') => {
            screen.share();
            Action::Continue
        }
        // 't' is the action-row toggle, 'r' the refresh gesture; both take
        // the same path.
        KeyCode::Char('t') | KeyCode::Char('r') => {
            screen.switch_full_text_mode();
            Action::Continue
        }
        KeyCode::Char('u') => {
            screen.mark_as_unread();
            Action::Continue
        }

        KeyCode::Char('j') | KeyCode::Down => {
            screen.scroll_down(1);
            Action::Continue
        }
        KeyCode::Char('k') | KeyCode::Up => {
            screen.scroll_up(1);
            Action::Continue
        }

        _ => Action::Continue,
    }
}
