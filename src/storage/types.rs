use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Storage errors with user-facing messages where the condition is actionable.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Another instance of the application has locked the database.
    #[error("Another instance of lectern appears to be running. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed.
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error.
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl StorageError {
    /// Classify a sqlx error, mapping SQLite lock conditions to `InstanceLocked`.
    ///
    /// SQLITE_BUSY (5), SQLITE_LOCKED (6) and SQLITE_CANTOPEN (14) all show
    /// up as message text rather than stable codes across sqlx versions.
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let msg = err.to_string().to_lowercase();
        if msg.contains("database is locked")
            || msg.contains("database table is locked")
            || msg.contains("sqlite_busy")
            || msg.contains("sqlite_locked")
            || msg.contains("unable to open database file")
        {
            return StorageError::InstanceLocked;
        }
        StorageError::Other(err)
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// One article row as stored.
///
/// Entry ids are feed-scoped strings assigned by the fetcher that populates
/// the database, so they survive refetches; the detail screen treats them as
/// opaque non-empty identifiers.
///
/// `title`, `link`, `description` and `mobilized_content` use `Arc<str>` so
/// snapshots can be cloned into background tasks without copying the text.
#[derive(Debug, Clone)]
pub struct Entry {
    pub id: String,
    pub feed_id: i64,
    pub title: Arc<str>,
    pub link: Option<Arc<str>>,
    /// Feed-provided content or summary ("original" text).
    pub description: Option<Arc<str>>,
    /// Full text extracted by the mobilization service, when it has run.
    pub mobilized_content: Option<Arc<str>>,
    pub read: bool,
    pub favorite: bool,
    pub published: Option<i64>,
    pub fetched_at: i64,
}

/// Read-only join of an entry and its owning feed's display title.
#[derive(Debug, Clone)]
pub struct EntryWithFeed {
    pub entry: Entry,
    pub feed_title: Arc<str>,
}

/// One queued mobilization task.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MobilizeTask {
    pub id: i64,
    pub entry_id: String,
    pub created_at: i64,
    pub attempts: i64,
}

// ============================================================================
// Row Types
// ============================================================================

/// Internal row for entry queries; converts to `Entry` with Arc wrapping.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct EntryRow {
    pub id: String,
    pub feed_id: i64,
    pub title: String,
    pub link: Option<String>,
    pub description: Option<String>,
    pub mobilized_content: Option<String>,
    pub read: bool,
    pub favorite: bool,
    pub published: Option<i64>,
    pub fetched_at: i64,
}

impl EntryRow {
    pub(crate) fn into_entry(self) -> Entry {
        Entry {
            id: self.id,
            feed_id: self.feed_id,
            title: Arc::from(self.title),
            link: self.link.map(Arc::from),
            description: self.description.map(Arc::from),
            mobilized_content: self.mobilized_content.map(Arc::from),
            read: self.read,
            favorite: self.favorite,
            published: self.published,
            fetched_at: self.fetched_at,
        }
    }
}

/// Entry row joined with the feed title, for the detail view.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct EntryFeedRow {
    #[sqlx(flatten)]
    pub entry: EntryRow,
    pub feed_title: String,
}

impl EntryFeedRow {
    pub(crate) fn into_entry_with_feed(self) -> EntryWithFeed {
        EntryWithFeed {
            entry: self.entry.into_entry(),
            feed_title: Arc::from(self.feed_title),
        }
    }
}
