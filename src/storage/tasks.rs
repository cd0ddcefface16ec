use anyhow::Result;
use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::MobilizeTask;

/// Upper bound on tasks pulled per drain cycle.
const DRAIN_BATCH: i64 = 20;

impl Database {
    // ========================================================================
    // Mobilization Queue
    // ========================================================================

    /// Queue entries for mobilization, returns how many were newly queued.
    ///
    /// `INSERT OR IGNORE` against the UNIQUE entry_id column makes this
    /// idempotent: an entry already queued stays a single outstanding task.
    /// An id with no matching entry row fails the FK constraint and errors.
    pub async fn enqueue_mobilize_tasks(&self, entry_ids: &[String]) -> Result<u64> {
        if entry_ids.is_empty() {
            return Ok(0);
        }
        let now = chrono::Utc::now().timestamp();
        let mut builder: QueryBuilder<sqlx::Sqlite> =
            QueryBuilder::new("INSERT OR IGNORE INTO mobilize_tasks (entry_id, created_at) ");
        builder.push_values(entry_ids, |mut b, id| {
            b.push_bind(id).push_bind(now);
        });
        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Number of outstanding mobilization tasks for one entry (0 or 1 under
    /// the UNIQUE constraint, but observers only care about zero vs nonzero).
    pub async fn pending_mobilize_count(&self, entry_id: &str) -> Result<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM mobilize_tasks WHERE entry_id = ?")
                .bind(entry_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    /// Oldest outstanding tasks, bounded for one drain cycle.
    pub async fn next_mobilize_tasks(&self) -> Result<Vec<MobilizeTask>> {
        let tasks = sqlx::query_as::<_, MobilizeTask>(
            r#"
            SELECT id, entry_id, created_at, attempts
            FROM mobilize_tasks
            ORDER BY created_at ASC, id ASC
            LIMIT ?
        "#,
        )
        .bind(DRAIN_BATCH)
        .fetch_all(&self.pool)
        .await?;
        Ok(tasks)
    }

    /// Record a failed attempt, returns the new attempt count.
    pub async fn record_mobilize_attempt(&self, task_id: i64) -> Result<i64> {
        let (attempts,): (i64,) = sqlx::query_as(
            "UPDATE mobilize_tasks SET attempts = attempts + 1 WHERE id = ? RETURNING attempts",
        )
        .bind(task_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(attempts)
    }

    /// Remove a task from the queue (completed or given up).
    pub async fn delete_mobilize_task(&self, task_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM mobilize_tasks WHERE id = ?")
            .bind(task_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
