//! Main event loop for the TUI.
//!
//! Multiplexes terminal input, screen events from background tasks, host
//! signals from the navigator, and a periodic tick. All screen state is
//! owned here, on this task.

use anyhow::Result;
use crossterm::{
    event::Event,
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures::StreamExt;
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io::{self, Stdout};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

use super::detail::{EntryDetailScreen, HostLayout, ScreenEvent};
use super::host::{HostSignal, WidthLayout};
use super::input::handle_input;
use super::render::render;
use super::sidebar::Sidebar;

/// Result of handling a key press.
pub enum Action {
    Continue,
    /// Leave the detail flow; a no-op while the sidebar is visible.
    Back,
    Quit,
}

/// Run the event loop until the user leaves.
///
/// Installs a panic hook that restores the terminal before unwinding, so a
/// panic never leaves the shell in raw mode.
pub async fn run(
    mut screen: EntryDetailScreen,
    mut sidebar: Sidebar,
    layout: Arc<WidthLayout>,
    mut screen_rx: mpsc::UnboundedReceiver<ScreenEvent>,
    mut host_rx: mpsc::UnboundedReceiver<HostSignal>,
) -> Result<()> {
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        original_hook(panic_info);
    }));

    let mut terminal = setup_terminal()?;
    let mut event_stream = crossterm::event::EventStream::new();
    let mut tick_interval = tokio::time::interval(Duration::from_millis(250));
    let mut needs_redraw = true;

    #[cfg(unix)]
    let mut sigterm = signal(SignalKind::terminate())?;
    #[cfg(unix)]
    let mut sigint = signal(SignalKind::interrupt())?;

    loop {
        if needs_redraw {
            terminal.draw(|f| {
                // Keep the layout seam in sync with the frame actually drawn.
                layout.set_width(f.area().width);
                let two_column = layout.is_two_column();
                render(f, &mut screen, &mut sidebar, two_column);
            })?;
            needs_redraw = false;
        }

        if screen.clear_expired_status() {
            needs_redraw = true;
        }

        // Drain queued screen events before waiting, so a burst of
        // background results is applied in one pass.
        while let Ok(event) = screen_rx.try_recv() {
            needs_redraw = true;
            screen.handle_event(event);
        }

        #[cfg(unix)]
        let sigterm_fut = sigterm.recv();
        #[cfg(not(unix))]
        let sigterm_fut = std::future::pending::<Option<()>>();

        #[cfg(unix)]
        let sigint_fut = sigint.recv();
        #[cfg(not(unix))]
        let sigint_fut = std::future::pending::<Option<()>>();

        tokio::select! {
            biased;

            _ = sigterm_fut => {
                tracing::info!("received SIGTERM, shutting down");
                break;
            }

            _ = sigint_fut => {
                tracing::info!("received SIGINT, shutting down");
                break;
            }

            maybe_event = event_stream.next() => {
                match maybe_event {
                    Some(Ok(Event::Key(key))) => {
                        needs_redraw = true;
                        match handle_input(&mut screen, key.code, key.modifiers) {
                            Action::Quit => break,
                            Action::Back => {
                                // The back affordance only exists in
                                // single-column layout.
                                if !layout.is_two_column() {
                                    break;
                                }
                            }
                            Action::Continue => {}
                        }
                    }
                    Some(Ok(Event::Resize(_, _))) => {
                        needs_redraw = true;
                    }
                    _ => {}
                }
            }

            Some(event) = screen_rx.recv() => {
                needs_redraw = true;
                screen.handle_event(event);
            }

            Some(signal) = host_rx.recv() => {
                needs_redraw = true;
                match signal {
                    HostSignal::Selected(entry_id) => sidebar.select_id(&entry_id),
                    HostSignal::Back => {
                        if !layout.is_two_column() {
                            break;
                        }
                    }
                }
            }

            _ = tick_interval.tick() => {
                if screen.is_refreshing() {
                    screen.spinner_frame = screen.spinner_frame.wrapping_add(1);
                    needs_redraw = true;
                }
            }
        }
    }

    restore_terminal(terminal)?;
    Ok(())
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

fn restore_terminal(mut terminal: Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}
