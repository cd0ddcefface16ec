//! The entry detail screen.
//!
//! Owns everything the user sees for a single entry: the loaded snapshot,
//! previous/next navigation over the browsing sequence, the full-text
//! display mode, the action row, and the loading indicator driven by the
//! live pending-mobilization count.
//!
//! All state here is owned by the event-loop task. Background work (loads,
//! flag writes, queueing) is spawned and reports back as [`ScreenEvent`]s;
//! spawned tasks never touch screen state directly.

use std::borrow::Cow;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::storage::{Entry, EntryWithFeed};

use super::actions::{self, ActionRow};

// ============================================================================
// Collaborator Seams
// ============================================================================

/// Entry persistence as the screen sees it.
#[async_trait]
pub trait EntryStore: Send + Sync {
    async fn find_by_id_with_feed(&self, entry_id: &str) -> Result<Option<EntryWithFeed>>;
    async fn mark_as_read(&self, entry_ids: &[String]) -> Result<()>;
    async fn mark_as_unread(&self, entry_ids: &[String]) -> Result<()>;
    async fn update_entry(&self, entry: &Entry) -> Result<()>;
}

/// Mobilization queue: observation of outstanding work plus enqueueing.
#[async_trait]
pub trait MobilizeTracker: Send + Sync {
    fn observe_pending_count(&self, entry_id: &str) -> watch::Receiver<i64>;
    async fn enqueue(&self, entry_ids: &[String]) -> Result<()>;
}

/// Starts (wakes) the background mobilization service.
pub trait MobilizeLauncher: Send + Sync {
    fn start_mobilization(&self);
}

/// Preference storage: the global refresh flag and the screen's restorable
/// state.
#[async_trait]
pub trait Preferences: Send + Sync {
    fn is_refresh_running(&self) -> bool;
    async fn save_screen_state(&self, entry_id: &str, entry_ids: &[String]) -> Result<()>;
}

/// Host-side navigation: selection reporting and back-navigation.
pub trait HostNavigator: Send + Sync {
    fn notify_selected(&self, entry_id: &str);
    fn request_back(&self);
}

/// Host presentation mode.
pub trait HostLayout: Send + Sync {
    fn is_two_column(&self) -> bool;
}

/// Network reachability probe.
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;
}

/// OS handoff for links: external browser and the share surface.
pub trait Platform: Send + Sync {
    fn open_in_browser(&self, url: &str) -> Result<()>;
    fn share(&self, title: &str, url: &str) -> Result<()>;
}

/// Everything the screen is constructed over. All trait objects so tests
/// substitute fakes.
#[derive(Clone)]
pub struct ScreenDeps {
    pub store: Arc<dyn EntryStore>,
    pub tracker: Arc<dyn MobilizeTracker>,
    pub launcher: Arc<dyn MobilizeLauncher>,
    pub prefs: Arc<dyn Preferences>,
    pub navigator: Arc<dyn HostNavigator>,
    pub layout: Arc<dyn HostLayout>,
    pub connectivity: Arc<dyn Connectivity>,
    pub platform: Arc<dyn Platform>,
}

// ============================================================================
// Screen Events
// ============================================================================

/// Results marshaled back from background tasks onto the event loop.
#[derive(Debug)]
pub enum ScreenEvent {
    /// A `set_entry` load finished. `generation` is compared against the
    /// screen's current load generation so a superseded load cannot clobber
    /// a newer one; `entry` is `None` when the id no longer exists.
    Loaded {
        entry_id: String,
        generation: u64,
        entry: Option<EntryWithFeed>,
    },
    /// The pending-mobilization count for `entry_id` changed (or was first
    /// delivered). Stale ids from a superseded subscription are ignored by
    /// the handler.
    PendingCount { entry_id: String, count: i64 },
    /// Snapshot reload after mobilization finished; replaces the snapshot
    /// without resetting display-mode state.
    Refreshed {
        entry_id: String,
        entry: EntryWithFeed,
    },
}

// ============================================================================
// Neighbor Derivation
// ============================================================================

/// Immediate neighbors of `current` within `ids`.
///
/// First element has no previous, last has no next; an id absent from the
/// sequence has neither.
fn neighbors(ids: &[String], current: &str) -> (Option<String>, Option<String>) {
    match ids.iter().position(|id| id == current) {
        None => (None, None),
        Some(idx) => {
            let previous = if idx == 0 { None } else { ids.get(idx - 1).cloned() };
            let next = ids.get(idx + 1).cloned();
            (previous, next)
        }
    }
}

/// How long a status toast stays visible.
const STATUS_TTL_SECS: u64 = 3;

// ============================================================================
// Screen
// ============================================================================

pub struct EntryDetailScreen {
    deps: ScreenDeps,
    events: mpsc::UnboundedSender<ScreenEvent>,

    entry_id: String,
    entry_ids: Vec<String>,
    previous_id: Option<String>,
    next_id: Option<String>,

    /// Loaded snapshot; `None` until the first load completes.
    entry: Option<EntryWithFeed>,
    is_mobilizing: bool,
    prefer_full_text: bool,
    /// Loading indicator (the pull-to-refresh spinner equivalent).
    refreshing: bool,

    /// Generation token for entry loads; results tagged with an older value
    /// are dropped, making "last set_entry wins" explicit.
    load_generation: u64,
    load_handle: Option<JoinHandle<()>>,
    /// Forwarding task for the pending-count subscription. Aborted on every
    /// rebind so two subscriptions for different ids are never live at once.
    count_handle: Option<JoinHandle<()>>,

    actions: ActionRow,
    status_message: Option<(Cow<'static, str>, Instant)>,

    // Rendering state, written by the render pass.
    pub scroll_offset: usize,
    pub visible_lines: usize,
    pub viewport_width: usize,
    pub spinner_frame: usize,
}

impl EntryDetailScreen {
    pub fn new(deps: ScreenDeps, events: mpsc::UnboundedSender<ScreenEvent>) -> Self {
        Self {
            deps,
            events,
            entry_id: String::new(),
            entry_ids: Vec::new(),
            previous_id: None,
            next_id: None,
            entry: None,
            is_mobilizing: false,
            prefer_full_text: true,
            refreshing: false,
            load_generation: 0,
            load_handle: None,
            count_handle: None,
            actions: ActionRow::empty(),
            status_message: None,
            scroll_offset: 0,
            visible_lines: 0,
            viewport_width: 0,
            spinner_frame: 0,
        }
    }

    /// Entry point when the screen first appears. `entry_id` must be a
    /// non-empty identifier; `entry_ids` is the browsing sequence, which may
    /// or may not contain it.
    pub fn initialize(&mut self, entry_id: String, entry_ids: Vec<String>) {
        debug_assert!(!entry_id.is_empty(), "initialize requires a non-empty entry id");
        self.set_entry(entry_id, entry_ids);
    }

    /// Retarget the screen to a different entry.
    ///
    /// Recomputes neighbors, persists the restorable state, and spawns the
    /// snapshot load. The load also marks the entry read, fire-and-forget,
    /// whether or not the snapshot fetch finds anything.
    pub fn set_entry(&mut self, entry_id: String, entry_ids: Vec<String>) {
        self.entry_id = entry_id.clone();
        let (previous, next) = neighbors(&entry_ids, &entry_id);
        self.previous_id = previous;
        self.next_id = next;
        self.entry_ids = entry_ids;

        let prefs = Arc::clone(&self.deps.prefs);
        let state_id = entry_id.clone();
        let state_ids = self.entry_ids.clone();
        tokio::spawn(async move {
            if let Err(e) = prefs.save_screen_state(&state_id, &state_ids).await {
                tracing::warn!(error = %e, "failed to persist screen state");
            }
        });

        if let Some(handle) = self.load_handle.take() {
            handle.abort();
        }
        self.load_generation = self.load_generation.wrapping_add(1);
        let generation = self.load_generation;

        let store = Arc::clone(&self.deps.store);
        let events = self.events.clone();
        self.load_handle = Some(tokio::spawn(async move {
            let entry = match store.find_by_id_with_feed(&entry_id).await {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(entry_id = %entry_id, error = %e, "entry load failed");
                    None
                }
            };
            let _ = events.send(ScreenEvent::Loaded {
                entry_id: entry_id.clone(),
                generation,
                entry,
            });
            if let Err(e) = store.mark_as_read(&[entry_id.clone()]).await {
                tracing::warn!(entry_id = %entry_id, error = %e, "mark-as-read failed");
            }
        }));
    }

    /// Apply a background-task result. Runs on the event-loop task.
    pub fn handle_event(&mut self, event: ScreenEvent) {
        match event {
            ScreenEvent::Loaded {
                generation, entry, ..
            } => self.on_loaded(generation, entry),
            ScreenEvent::PendingCount { entry_id, count } => {
                self.on_pending_count(&entry_id, count)
            }
            ScreenEvent::Refreshed { entry_id, entry } => self.on_refreshed(&entry_id, entry),
        }
    }

    fn on_loaded(&mut self, generation: u64, entry: Option<EntryWithFeed>) {
        if generation != self.load_generation {
            tracing::trace!(generation, current = self.load_generation, "dropping stale load");
            return;
        }
        // Deleted entry: keep whatever is on screen.
        let Some(entry) = entry else {
            tracing::debug!(entry_id = %self.entry_id, "entry not found, keeping previous content");
            return;
        };
        self.entry = Some(entry);
        self.prefer_full_text = true;
        self.is_mobilizing = false;
        self.scroll_offset = 0;
        self.resubscribe_pending_count();
        self.rebuild_actions();
    }

    /// (Re)bind the pending-count subscription for the current entry,
    /// dropping any subscription for a previously shown one.
    fn resubscribe_pending_count(&mut self) {
        if let Some(handle) = self.count_handle.take() {
            handle.abort();
        }
        self.refreshing = false;

        let mut rx = self.deps.tracker.observe_pending_count(&self.entry_id);
        let events = self.events.clone();
        let entry_id = self.entry_id.clone();
        self.count_handle = Some(tokio::spawn(async move {
            loop {
                let count = *rx.borrow_and_update();
                if events
                    .send(ScreenEvent::PendingCount {
                        entry_id: entry_id.clone(),
                        count,
                    })
                    .is_err()
                {
                    break;
                }
                if rx.changed().await.is_err() {
                    break;
                }
            }
        }));
    }

    fn on_pending_count(&mut self, entry_id: &str, count: i64) {
        // A superseded subscription is aborted on rebind, but an already
        // queued event can still arrive; drop anything not about the
        // current entry.
        if entry_id != self.entry_id {
            tracing::trace!(stale = %entry_id, current = %self.entry_id, "ignoring stale count");
            return;
        }

        if count > 0 {
            self.is_mobilizing = true;
            self.refreshing = true;

            // A queued task with no active service run would spin forever;
            // start the service when nothing reports running.
            if !self.deps.prefs.is_refresh_running() {
                self.deps.launcher.start_mobilization();
            }
        } else {
            if self.is_mobilizing {
                // Mobilized content may just have been written; reload the
                // snapshot outside the load-generation path so display-mode
                // state survives.
                let store = Arc::clone(&self.deps.store);
                let events = self.events.clone();
                let entry_id = self.entry_id.clone();
                tokio::spawn(async move {
                    match store.find_by_id_with_feed(&entry_id).await {
                        Ok(Some(entry)) => {
                            let _ = events.send(ScreenEvent::Refreshed { entry_id, entry });
                        }
                        Ok(None) => {}
                        Err(e) => {
                            tracing::warn!(entry_id = %entry_id, error = %e, "post-mobilization reload failed");
                        }
                    }
                });
            }
            self.is_mobilizing = false;
            self.refreshing = false;
        }
    }

    fn on_refreshed(&mut self, entry_id: &str, entry: EntryWithFeed) {
        if entry_id != self.entry_id {
            return;
        }
        self.entry = Some(entry);
        self.rebuild_actions();
    }

    fn rebuild_actions(&mut self) {
        self.actions = actions::build(
            self.entry.as_ref(),
            self.prefer_full_text,
            self.deps.layout.is_two_column(),
        );
    }

    // ========================================================================
    // User Actions
    // ========================================================================

    /// Flip the favorite flag, forcing the entry read so favoriting never
    /// leaves it looking unread. The action row updates immediately; the
    /// write is fire-and-forget.
    pub fn toggle_favorite(&mut self) {
        let Some(snapshot) = self.entry.as_mut() else { return };
        snapshot.entry.favorite = !snapshot.entry.favorite;
        snapshot.entry.read = true;
        let entry = snapshot.entry.clone();
        self.rebuild_actions();

        let store = Arc::clone(&self.deps.store);
        tokio::spawn(async move {
            if let Err(e) = store.update_entry(&entry).await {
                // Optimistic row update stands; the failed write is logged only.
                tracing::warn!(entry_id = %entry.id, error = %e, "favorite persist failed");
            }
        });
    }

    /// Hand the entry link to the external browser. Absent link or handler
    /// failure surfaces as a generic toast.
    pub fn open_in_browser(&mut self) {
        let Some(snapshot) = &self.entry else { return };
        let result = match snapshot.entry.link.as_deref() {
            Some(link) => self.deps.platform.open_in_browser(link),
            None => Err(anyhow::anyhow!("entry has no link")),
        };
        if let Err(e) = result {
            tracing::warn!(entry_id = %self.entry_id, error = %e, "open in browser failed");
            self.set_status("Couldn't open the link");
        }
    }

    /// Share the entry's title and link as plain text.
    pub fn share(&mut self) {
        let Some(snapshot) = &self.entry else { return };
        let result = match snapshot.entry.link.as_deref() {
            Some(link) => self.deps.platform.share(&snapshot.entry.title, link),
            None => Err(anyhow::anyhow!("entry has no link")),
        };
        if let Err(e) = result {
            tracing::warn!(entry_id = %self.entry_id, error = %e, "share failed");
            self.set_status("Couldn't share the entry");
        }
    }

    /// Toggle between full-text and original content, fetching full text
    /// first when none exists yet. Reached from the action row and from the
    /// refresh gesture alike.
    pub fn switch_full_text_mode(&mut self) {
        let Some(snapshot) = &self.entry else { return };
        let has_full_text = snapshot.entry.mobilized_content.is_some();

        if !has_full_text || !self.prefer_full_text {
            if !has_full_text {
                if self.deps.connectivity.is_online() {
                    let tracker = Arc::clone(&self.deps.tracker);
                    let launcher = Arc::clone(&self.deps.launcher);
                    let entry_id = self.entry_id.clone();
                    tokio::spawn(async move {
                        if let Err(e) = tracker.enqueue(&[entry_id.clone()]).await {
                            tracing::warn!(entry_id = %entry_id, error = %e, "failed to queue full-text fetch");
                            return;
                        }
                        launcher.start_mobilization();
                    });
                } else {
                    // Display mode is deliberately untouched on this branch.
                    self.refreshing = false;
                    self.set_status("No network connection");
                }
            } else {
                self.refreshing = false;
                self.prefer_full_text = true;
                self.scroll_offset = 0;
                self.rebuild_actions();
            }
        } else {
            // Back to the original text; the indicator reflects whatever
            // mobilization is still in flight.
            self.refreshing = self.is_mobilizing;
            self.prefer_full_text = false;
            self.scroll_offset = 0;
            self.rebuild_actions();
        }
    }

    /// Mark the current entry unread; in single-column layout an unread
    /// entry no longer belongs in the detail flow, so also navigate back.
    pub fn mark_as_unread(&mut self) {
        if self.entry_id.is_empty() {
            return;
        }
        let store = Arc::clone(&self.deps.store);
        let entry_id = self.entry_id.clone();
        tokio::spawn(async move {
            if let Err(e) = store.mark_as_unread(&[entry_id.clone()]).await {
                tracing::warn!(entry_id = %entry_id, error = %e, "mark-as-unread failed");
            }
        });

        if !self.deps.layout.is_two_column() {
            self.deps.navigator.request_back();
        }
    }

    /// Swipe left: advance to the next entry when one exists. The gesture is
    /// always reported handled.
    pub fn swipe_left(&mut self) -> bool {
        if let Some(next) = self.next_id.clone() {
            let ids = self.entry_ids.clone();
            self.set_entry(next.clone(), ids);
            self.deps.navigator.notify_selected(&next);
        }
        true
    }

    /// Swipe right: go back to the previous entry when one exists.
    pub fn swipe_right(&mut self) -> bool {
        if let Some(previous) = self.previous_id.clone() {
            let ids = self.entry_ids.clone();
            self.set_entry(previous.clone(), ids);
            self.deps.navigator.notify_selected(&previous);
        }
        true
    }

    // ========================================================================
    // Status Toasts
    // ========================================================================

    pub fn set_status(&mut self, msg: impl Into<Cow<'static, str>>) {
        self.status_message = Some((msg.into(), Instant::now()));
    }

    /// Drop an expired status message; returns true when one was cleared.
    pub fn clear_expired_status(&mut self) -> bool {
        if let Some((_, since)) = &self.status_message {
            if since.elapsed().as_secs() >= STATUS_TTL_SECS {
                self.status_message = None;
                return true;
            }
        }
        false
    }

    // ========================================================================
    // Render Accessors
    // ========================================================================

    pub fn current_id(&self) -> &str {
        &self.entry_id
    }

    pub fn previous_id(&self) -> Option<&str> {
        self.previous_id.as_deref()
    }

    pub fn next_id(&self) -> Option<&str> {
        self.next_id.as_deref()
    }

    pub fn entry(&self) -> Option<&EntryWithFeed> {
        self.entry.as_ref()
    }

    pub fn actions(&self) -> &ActionRow {
        &self.actions
    }

    pub fn prefer_full_text(&self) -> bool {
        self.prefer_full_text
    }

    pub fn is_mobilizing(&self) -> bool {
        self.is_mobilizing
    }

    pub fn is_refreshing(&self) -> bool {
        self.refreshing
    }

    pub fn status(&self) -> Option<&str> {
        self.status_message.as_ref().map(|(msg, _)| msg.as_ref())
    }

    /// The body the current display mode shows: mobilized text when
    /// preferred and present, the feed-provided description otherwise.
    pub fn body_text(&self) -> Option<&str> {
        let snapshot = self.entry.as_ref()?;
        if self.prefer_full_text {
            snapshot
                .entry
                .mobilized_content
                .as_deref()
                .or(snapshot.entry.description.as_deref())
        } else {
            snapshot.entry.description.as_deref()
        }
    }

    pub fn scroll_up(&mut self, lines: usize) {
        self.scroll_offset = self.scroll_offset.saturating_sub(lines);
    }

    pub fn scroll_down(&mut self, lines: usize) {
        self.scroll_offset = self.scroll_offset.saturating_add(lines);
    }

    /// Clamp the scroll offset so the viewport never runs past the content.
    pub fn clamp_scroll(&mut self, content_lines: usize) {
        let max_scroll = content_lines.saturating_sub(self.visible_lines);
        self.scroll_offset = self.scroll_offset.min(max_scroll);
    }
}

/// Abort in-flight tasks so nothing outlives the screen.
impl Drop for EntryDetailScreen {
    fn drop(&mut self) {
        if let Some(handle) = self.load_handle.take() {
            handle.abort();
        }
        if let Some(handle) = self.count_handle.take() {
            handle.abort();
        }
    }
}
