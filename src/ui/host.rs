//! Concrete collaborators wired into the screen by `main`.
//!
//! Each adapter is thin: the screen talks to the traits in
//! [`super::detail`], these map them onto the storage layer, the
//! mobilization service, the terminal, and the OS.

use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use crate::mobilize::{MobilizeQueue, ServiceHandle};
use crate::storage::{Database, Entry, EntryWithFeed, ScreenState};
use crate::util::net::probe_online;

use super::detail::{
    Connectivity, EntryStore, HostLayout, HostNavigator, MobilizeLauncher, MobilizeTracker,
    Platform, Preferences,
};

/// Host-side requests raised by the screen through its navigator.
#[derive(Debug, PartialEq, Eq)]
pub enum HostSignal {
    /// The detail selection moved (swipe); the sidebar follows.
    Selected(String),
    /// Leave the detail flow.
    Back,
}

// ============================================================================
// Storage-backed Adapters
// ============================================================================

pub struct DbEntryStore {
    pub db: Database,
}

#[async_trait]
impl EntryStore for DbEntryStore {
    async fn find_by_id_with_feed(&self, entry_id: &str) -> Result<Option<EntryWithFeed>> {
        self.db.find_by_id_with_feed(entry_id).await
    }

    async fn mark_as_read(&self, entry_ids: &[String]) -> Result<()> {
        self.db.mark_entries_read(entry_ids).await?;
        Ok(())
    }

    async fn mark_as_unread(&self, entry_ids: &[String]) -> Result<()> {
        self.db.mark_entries_unread(entry_ids).await?;
        Ok(())
    }

    async fn update_entry(&self, entry: &Entry) -> Result<()> {
        self.db.update_entry_flags(entry).await
    }
}

pub struct QueueTracker {
    pub queue: MobilizeQueue,
}

#[async_trait]
impl MobilizeTracker for QueueTracker {
    fn observe_pending_count(&self, entry_id: &str) -> watch::Receiver<i64> {
        self.queue.observe_pending_count(entry_id)
    }

    async fn enqueue(&self, entry_ids: &[String]) -> Result<()> {
        self.queue.enqueue(entry_ids).await
    }
}

pub struct ServiceLauncher {
    pub handle: ServiceHandle,
}

impl MobilizeLauncher for ServiceLauncher {
    fn start_mobilization(&self) {
        self.handle.start();
    }
}

/// Preference storage plus the worker's live refresh flag.
pub struct DbPreferences {
    pub db: Database,
    pub refresh_running: Arc<AtomicBool>,
}

#[async_trait]
impl Preferences for DbPreferences {
    fn is_refresh_running(&self) -> bool {
        self.refresh_running.load(Ordering::SeqCst)
    }

    async fn save_screen_state(&self, entry_id: &str, entry_ids: &[String]) -> Result<()> {
        self.db
            .save_screen_state(&ScreenState {
                entry_id: entry_id.to_string(),
                entry_ids: entry_ids.to_vec(),
            })
            .await
    }
}

// ============================================================================
// Host Navigation and Layout
// ============================================================================

pub struct ChannelNavigator {
    pub signals: mpsc::UnboundedSender<HostSignal>,
}

impl HostNavigator for ChannelNavigator {
    fn notify_selected(&self, entry_id: &str) {
        let _ = self.signals.send(HostSignal::Selected(entry_id.to_string()));
    }

    fn request_back(&self) {
        let _ = self.signals.send(HostSignal::Back);
    }
}

/// Two-column when the terminal is at least `min_width` columns wide.
/// The render pass keeps `width` current, so layout answers reflect the
/// frame being drawn.
pub struct WidthLayout {
    width: AtomicU16,
    min_width: u16,
}

impl WidthLayout {
    pub fn new(min_width: u16) -> Self {
        Self {
            width: AtomicU16::new(0),
            min_width,
        }
    }

    pub fn set_width(&self, width: u16) {
        self.width.store(width, Ordering::Relaxed);
    }
}

impl HostLayout for WidthLayout {
    fn is_two_column(&self) -> bool {
        self.width.load(Ordering::Relaxed) >= self.min_width
    }
}

// ============================================================================
// Connectivity and OS Handoff
// ============================================================================

pub struct ProbeConnectivity {
    pub probes: Vec<String>,
    pub timeout: Duration,
}

impl Connectivity for ProbeConnectivity {
    fn is_online(&self) -> bool {
        probe_online(&self.probes, self.timeout)
    }
}

pub struct SystemPlatform;

impl Platform for SystemPlatform {
    fn open_in_browser(&self, link: &str) -> Result<()> {
        let parsed = url::Url::parse(link)?;
        if !matches!(parsed.scheme(), "http" | "https") {
            anyhow::bail!("refusing to open non-http link: {}", parsed.scheme());
        }
        open::that_detached(parsed.as_str())?;
        Ok(())
    }

    fn share(&self, title: &str, link: &str) -> Result<()> {
        open::that_detached(compose_share_url(title, link))?;
        Ok(())
    }
}

/// The closest thing a desktop has to a share sheet: a mailto URL carrying
/// the title as subject and the link as body, handed to the OS handler.
fn compose_share_url(title: &str, link: &str) -> String {
    let subject: String = url::form_urlencoded::byte_serialize(title.as_bytes()).collect();
    let body: String = url::form_urlencoded::byte_serialize(link.as_bytes()).collect();
    format!("mailto:?subject={}&body={}", subject, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_switches_at_threshold() {
        let layout = WidthLayout::new(110);
        assert!(!layout.is_two_column());

        layout.set_width(109);
        assert!(!layout.is_two_column());

        layout.set_width(110);
        assert!(layout.is_two_column());
    }

    #[tokio::test]
    async fn navigator_forwards_signals() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let navigator = ChannelNavigator { signals: tx };

        navigator.notify_selected("abc");
        navigator.request_back();

        assert_eq!(rx.recv().await, Some(HostSignal::Selected("abc".to_string())));
        assert_eq!(rx.recv().await, Some(HostSignal::Back));
    }

    #[test]
    fn share_url_escapes_payload() {
        let url = compose_share_url("Hello & goodbye", "https://example.com/a?b=c");
        assert!(url.starts_with("mailto:?subject="));
        assert!(url.contains("Hello+%26+goodbye"));
        assert!(url.contains("https%3A%2F%2Fexample.com%2Fa%3Fb%3Dc"));
    }

    #[test]
    fn browser_rejects_non_http_schemes() {
        let platform = SystemPlatform;
        assert!(platform.open_in_browser("javascript:alert(1)").is_err());
        assert!(platform.open_in_browser("not a url").is_err());
    }
}
