use anyhow::Result;
use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::{Entry, EntryFeedRow, EntryRow};
use crate::storage::EntryWithFeed;

/// Hard cap on the id-sequence query (OOM protection for huge databases).
const MAX_SEQUENCE_IDS: i64 = 10_000;

/// Fields the external fetcher supplies when writing an entry.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub id: String,
    pub feed_id: i64,
    pub title: String,
    pub link: Option<String>,
    pub description: Option<String>,
    pub published: Option<i64>,
}

impl Database {
    // ========================================================================
    // Entry Queries
    // ========================================================================

    /// Fetch one entry joined with its feed's display title.
    ///
    /// Returns `None` when the entry does not exist (e.g. deleted while the
    /// detail view was open); callers treat that as a silent no-op.
    pub async fn find_by_id_with_feed(&self, entry_id: &str) -> Result<Option<EntryWithFeed>> {
        let row = sqlx::query_as::<_, EntryFeedRow>(
            r#"
            SELECT e.id, e.feed_id, e.title, e.link, e.description,
                   e.mobilized_content, e.read, e.favorite, e.published,
                   e.fetched_at, f.title AS feed_title
            FROM entries e
            JOIN feeds f ON f.id = e.feed_id
            WHERE e.id = ?
        "#,
        )
        .bind(entry_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(EntryFeedRow::into_entry_with_feed))
    }

    /// All entry ids, newest first. Seeds the browsing sequence when no
    /// session state is available.
    pub async fn all_ids_newest_first(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT id FROM entries
            ORDER BY published DESC, fetched_at DESC
            LIMIT ?
        "#,
        )
        .bind(MAX_SEQUENCE_IDS)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Titles for the sidebar list, in the given sequence order.
    pub async fn titles_for_ids(&self, ids: &[String]) -> Result<Vec<(String, String)>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut builder: QueryBuilder<sqlx::Sqlite> =
            QueryBuilder::new("SELECT id, title FROM entries WHERE id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");

        let rows: Vec<(String, String)> = builder.build_query_as().fetch_all(&self.pool).await?;
        // Re-order to the sequence order; ids missing from the table are skipped.
        let by_id: std::collections::HashMap<String, String> = rows.into_iter().collect();
        Ok(ids
            .iter()
            .filter_map(|id| by_id.get(id).map(|t| (id.clone(), t.clone())))
            .collect())
    }

    // ========================================================================
    // Entry Mutations
    // ========================================================================

    /// Mark entries as read (idempotent), returns how many rows changed.
    ///
    /// The `read = 0` guard keeps repeated calls from rewriting rows.
    pub async fn mark_entries_read(&self, entry_ids: &[String]) -> Result<u64> {
        self.set_read_flag(entry_ids, true).await
    }

    /// Mark entries as unread (idempotent), returns how many rows changed.
    pub async fn mark_entries_unread(&self, entry_ids: &[String]) -> Result<u64> {
        self.set_read_flag(entry_ids, false).await
    }

    async fn set_read_flag(&self, entry_ids: &[String], read: bool) -> Result<u64> {
        if entry_ids.is_empty() {
            return Ok(0);
        }
        let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new("UPDATE entries SET read = ");
        builder.push_bind(read);
        builder.push(" WHERE read = ");
        builder.push_bind(!read);
        builder.push(" AND id IN (");
        let mut separated = builder.separated(", ");
        for id in entry_ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Persist the mutable flags of an entry (favorite, read).
    ///
    /// The text columns belong to the fetcher and the mobilizer; the detail
    /// screen only ever flips flags, so this deliberately writes nothing else.
    pub async fn update_entry_flags(&self, entry: &Entry) -> Result<()> {
        sqlx::query("UPDATE entries SET favorite = ?, read = ? WHERE id = ?")
            .bind(entry.favorite)
            .bind(entry.read)
            .bind(&entry.id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Store mobilized full text for an entry. Called by the mobilization
    /// worker after a successful extraction.
    pub async fn set_mobilized_content(&self, entry_id: &str, content: &str) -> Result<()> {
        sqlx::query("UPDATE entries SET mobilized_content = ? WHERE id = ?")
            .bind(content)
            .bind(entry_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ========================================================================
    // Fetcher-facing Writes
    // ========================================================================

    /// Insert a feed if its URL is new, returning the feed id either way.
    pub async fn insert_feed(&self, title: &str, url: &str) -> Result<i64> {
        sqlx::query("INSERT OR IGNORE INTO feeds (title, url) VALUES (?, ?)")
            .bind(title)
            .bind(url)
            .execute(&self.pool)
            .await?;
        let (id,): (i64,) = sqlx::query_as("SELECT id FROM feeds WHERE url = ?")
            .bind(url)
            .fetch_one(&self.pool)
            .await?;
        Ok(id)
    }

    /// Upsert an entry, preserving user state (read, favorite, mobilized
    /// content) when the row already exists; metadata is refreshed.
    pub async fn upsert_entry(&self, entry: &NewEntry) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO entries (id, feed_id, title, link, description, published, fetched_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                link = excluded.link,
                description = excluded.description,
                published = excluded.published
        "#,
        )
        .bind(&entry.id)
        .bind(entry.feed_id)
        .bind(&entry.title)
        .bind(&entry.link)
        .bind(&entry.description)
        .bind(entry.published)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Internal row fetch without the feed join (used by tests and the worker).
    pub async fn find_entry(&self, entry_id: &str) -> Result<Option<Entry>> {
        let row = sqlx::query_as::<_, EntryRow>(
            r#"
            SELECT id, feed_id, title, link, description, mobilized_content,
                   read, favorite, published, fetched_at
            FROM entries
            WHERE id = ?
        "#,
        )
        .bind(entry_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(EntryRow::into_entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    fn test_entry(id: &str, feed_id: i64, title: &str) -> NewEntry {
        NewEntry {
            id: id.to_string(),
            feed_id,
            title: title.to_string(),
            link: Some(format!("https://example.com/{}", id)),
            description: Some("Feed-provided summary".to_string()),
            published: Some(1704067200),
        }
    }

    async fn seeded(db: &Database, ids: &[&str]) -> i64 {
        let feed_id = db.insert_feed("Test Feed", "https://feed.example.com/rss").await.unwrap();
        for id in ids {
            db.upsert_entry(&test_entry(id, feed_id, &format!("Entry {}", id)))
                .await
                .unwrap();
        }
        feed_id
    }

    #[tokio::test]
    async fn find_by_id_joins_feed_title() {
        let db = test_db().await;
        seeded(&db, &["a"]).await;

        let found = db.find_by_id_with_feed("a").await.unwrap().unwrap();
        assert_eq!(&*found.feed_title, "Test Feed");
        assert_eq!(&*found.entry.title, "Entry a");
        assert!(!found.entry.read);
        assert!(found.entry.mobilized_content.is_none());
    }

    #[tokio::test]
    async fn find_by_id_missing_is_none() {
        let db = test_db().await;
        seeded(&db, &["a"]).await;
        assert!(db.find_by_id_with_feed("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn mark_read_is_idempotent() {
        let db = test_db().await;
        seeded(&db, &["a", "b"]).await;

        let changed = db
            .mark_entries_read(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(changed, 2);

        let changed = db
            .mark_entries_read(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(changed, 0);

        assert!(db.find_entry("a").await.unwrap().unwrap().read);
    }

    #[tokio::test]
    async fn mark_unread_reverses_read() {
        let db = test_db().await;
        seeded(&db, &["a"]).await;

        db.mark_entries_read(&["a".to_string()]).await.unwrap();
        let changed = db.mark_entries_unread(&["a".to_string()]).await.unwrap();
        assert_eq!(changed, 1);
        assert!(!db.find_entry("a").await.unwrap().unwrap().read);
    }

    #[tokio::test]
    async fn mark_read_empty_slice_is_noop() {
        let db = test_db().await;
        assert_eq!(db.mark_entries_read(&[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn update_entry_flags_persists_favorite_and_read() {
        let db = test_db().await;
        seeded(&db, &["a"]).await;

        let mut entry = db.find_entry("a").await.unwrap().unwrap();
        entry.favorite = true;
        entry.read = true;
        db.update_entry_flags(&entry).await.unwrap();

        let reloaded = db.find_entry("a").await.unwrap().unwrap();
        assert!(reloaded.favorite);
        assert!(reloaded.read);
    }

    #[tokio::test]
    async fn upsert_preserves_user_state() {
        let db = test_db().await;
        let feed_id = seeded(&db, &["a"]).await;

        let mut entry = db.find_entry("a").await.unwrap().unwrap();
        entry.favorite = true;
        entry.read = true;
        db.update_entry_flags(&entry).await.unwrap();
        db.set_mobilized_content("a", "# Full text").await.unwrap();

        let mut refreshed = test_entry("a", feed_id, "Entry a (updated)");
        refreshed.description = Some("New summary".to_string());
        db.upsert_entry(&refreshed).await.unwrap();

        let reloaded = db.find_entry("a").await.unwrap().unwrap();
        assert_eq!(&*reloaded.title, "Entry a (updated)");
        assert_eq!(reloaded.description.as_deref(), Some("New summary"));
        assert!(reloaded.read, "read flag should survive refetch");
        assert!(reloaded.favorite, "favorite flag should survive refetch");
        assert_eq!(
            reloaded.mobilized_content.as_deref(),
            Some("# Full text"),
            "mobilized content should survive refetch"
        );
    }

    #[tokio::test]
    async fn all_ids_are_newest_first() {
        let db = test_db().await;
        let feed_id = db.insert_feed("Feed", "https://f.example.com/rss").await.unwrap();
        for (id, published) in [("old", 100), ("new", 300), ("mid", 200)] {
            let mut e = test_entry(id, feed_id, id);
            e.published = Some(published);
            db.upsert_entry(&e).await.unwrap();
        }

        let ids = db.all_ids_newest_first().await.unwrap();
        assert_eq!(ids, vec!["new".to_string(), "mid".to_string(), "old".to_string()]);
    }

    #[tokio::test]
    async fn titles_follow_sequence_order() {
        let db = test_db().await;
        seeded(&db, &["a", "b", "c"]).await;

        let seq = vec!["c".to_string(), "a".to_string(), "ghost".to_string()];
        let titles = db.titles_for_ids(&seq).await.unwrap();
        assert_eq!(
            titles,
            vec![
                ("c".to_string(), "Entry c".to_string()),
                ("a".to_string(), "Entry a".to_string()),
            ]
        );
    }
}
