use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{watch, Notify};

use crate::storage::Database;

use super::extract::fetch_full_text;

/// Attempts per task before the queue gives up on an entry.
const MAX_ATTEMPTS: i64 = 3;

/// Politeness delay between gateway requests within one drain.
const INTER_REQUEST_DELAY: Duration = Duration::from_millis(100);

// ============================================================================
// Pending-count Observation
// ============================================================================

/// The mobilization task queue: DB-backed tasks plus per-entry live
/// pending-count publication over `tokio::sync::watch`.
///
/// Observers receive the current count immediately and every change after;
/// the queue publishes after each mutation it performs. Channels are created
/// lazily per entry id and live for the process lifetime (bounded by the
/// number of distinct entries a session touches).
#[derive(Clone)]
pub struct MobilizeQueue {
    db: Database,
    counts: Arc<Mutex<HashMap<String, watch::Sender<i64>>>>,
}

impl MobilizeQueue {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            counts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Subscribe to the pending-task count for one entry.
    ///
    /// The receiver starts at the last published value (0 for a fresh
    /// channel); a refresh of the true DB count is published asynchronously
    /// so late subscribers converge without blocking the caller.
    pub fn observe_pending_count(&self, entry_id: &str) -> watch::Receiver<i64> {
        let rx = self.sender_for(entry_id).subscribe();
        let this = self.clone();
        let entry_id = entry_id.to_string();
        tokio::spawn(async move {
            this.publish(&entry_id).await;
        });
        rx
    }

    /// Queue entries for mobilization and publish their new counts.
    pub async fn enqueue(&self, entry_ids: &[String]) -> anyhow::Result<()> {
        let queued = self.db.enqueue_mobilize_tasks(entry_ids).await?;
        tracing::debug!(requested = entry_ids.len(), queued, "queued mobilization tasks");
        for id in entry_ids {
            self.publish(id).await;
        }
        Ok(())
    }

    fn sender_for(&self, entry_id: &str) -> watch::Sender<i64> {
        let mut counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        counts
            .entry(entry_id.to_string())
            .or_insert_with(|| watch::channel(0).0)
            .clone()
    }

    /// Re-read the DB count for an entry and publish it to observers.
    async fn publish(&self, entry_id: &str) {
        match self.db.pending_mobilize_count(entry_id).await {
            Ok(count) => {
                // send_replace delivers even when no receiver is currently
                // subscribed, so late observers see the latest value.
                self.sender_for(entry_id).send_replace(count);
            }
            Err(e) => {
                tracing::warn!(entry_id = %entry_id, error = %e, "failed to read pending count");
            }
        }
    }
}

// ============================================================================
// Background Service
// ============================================================================

/// Wakes the mobilization worker. Cheap to clone and hand to the UI.
#[derive(Clone)]
pub struct ServiceHandle {
    wake: Arc<Notify>,
}

impl ServiceHandle {
    pub fn start(&self) {
        self.wake.notify_one();
    }
}

/// Background worker that drains the mobilization queue.
///
/// Woken through its `ServiceHandle`; one drain processes queue batches
/// until no further task can make progress. The shared `refresh_running`
/// flag is observable by the UI while a drain is active.
pub struct Mobilizer {
    db: Database,
    queue: MobilizeQueue,
    client: reqwest::Client,
    gateway: String,
    wake: Arc<Notify>,
    refresh_running: Arc<AtomicBool>,
}

impl Mobilizer {
    pub fn new(
        db: Database,
        queue: MobilizeQueue,
        client: reqwest::Client,
        gateway: String,
    ) -> Self {
        Self {
            db,
            queue,
            client,
            gateway,
            wake: Arc::new(Notify::new()),
            refresh_running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn handle(&self) -> ServiceHandle {
        ServiceHandle {
            wake: Arc::clone(&self.wake),
        }
    }

    /// Shared flag, true while a drain is in progress.
    pub fn refresh_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.refresh_running)
    }

    /// Worker loop: wait for a wake-up, then drain. Runs until the process
    /// exits; the loop holds no state that needs graceful shutdown.
    pub async fn run(self) {
        loop {
            self.wake.notified().await;
            self.drain().await;
        }
    }

    /// Drain the queue until a pass makes no progress.
    ///
    /// Tasks that fail retryably stay queued for the next wake-up rather
    /// than being retried in a tight loop here; a pass that deletes nothing
    /// therefore terminates the drain.
    pub async fn drain(&self) {
        self.refresh_running.store(true, Ordering::SeqCst);
        loop {
            let tasks = match self.db.next_mobilize_tasks().await {
                Ok(tasks) if !tasks.is_empty() => tasks,
                Ok(_) => break,
                Err(e) => {
                    tracing::error!(error = %e, "failed to read mobilization queue");
                    break;
                }
            };

            let mut completed = 0usize;
            for task in &tasks {
                if self.process(task).await {
                    completed += 1;
                }
                tokio::time::sleep(INTER_REQUEST_DELAY).await;
            }
            tracing::info!(batch = tasks.len(), completed, "mobilization drain pass");

            if completed == 0 {
                break;
            }
        }
        self.refresh_running.store(false, Ordering::SeqCst);
    }

    /// Process one task. Returns true when the task left the queue.
    async fn process(&self, task: &crate::storage::MobilizeTask) -> bool {
        let link = match self.db.find_entry(&task.entry_id).await {
            Ok(Some(entry)) => entry.link,
            Ok(None) => {
                // Entry deleted out from under the queue.
                self.finish(task, "entry vanished").await;
                return true;
            }
            Err(e) => {
                tracing::error!(entry_id = %task.entry_id, error = %e, "entry lookup failed");
                return false;
            }
        };

        let Some(link) = link else {
            self.finish(task, "entry has no link").await;
            return true;
        };

        match fetch_full_text(&self.client, &link, &self.gateway).await {
            Ok(content) => {
                if let Err(e) = self.db.set_mobilized_content(&task.entry_id, &content).await {
                    tracing::error!(entry_id = %task.entry_id, error = %e, "failed to store full text");
                    return false;
                }
                self.finish(task, "mobilized").await;
                true
            }
            Err(e) if e.is_retryable() => {
                let attempts = match self.db.record_mobilize_attempt(task.id).await {
                    Ok(n) => n,
                    Err(db_err) => {
                        tracing::error!(entry_id = %task.entry_id, error = %db_err, "failed to record attempt");
                        return false;
                    }
                };
                if attempts >= MAX_ATTEMPTS {
                    tracing::warn!(entry_id = %task.entry_id, attempts, error = %e, "giving up on mobilization");
                    self.finish(task, "attempts exhausted").await;
                    true
                } else {
                    tracing::debug!(entry_id = %task.entry_id, attempts, error = %e, "mobilization failed, will retry");
                    false
                }
            }
            Err(e) => {
                tracing::warn!(entry_id = %task.entry_id, error = %e, "mobilization failed permanently");
                self.finish(task, "permanent failure").await;
                true
            }
        }
    }

    async fn finish(&self, task: &crate::storage::MobilizeTask, reason: &str) {
        tracing::debug!(entry_id = %task.entry_id, reason, "removing mobilization task");
        if let Err(e) = self.db.delete_mobilize_task(task.id).await {
            tracing::error!(entry_id = %task.entry_id, error = %e, "failed to delete task");
            return;
        }
        self.queue.publish(&task.entry_id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::NewEntry;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn test_db(link: Option<&str>) -> Database {
        let db = Database::open(":memory:").await.unwrap();
        let feed_id = db.insert_feed("Feed", "https://f.example.com/rss").await.unwrap();
        db.upsert_entry(&NewEntry {
            id: "a".to_string(),
            feed_id,
            title: "Entry a".to_string(),
            link: link.map(str::to_string),
            description: Some("summary".to_string()),
            published: None,
        })
        .await
        .unwrap();
        db
    }

    #[tokio::test]
    async fn enqueue_publishes_count_to_observer() {
        let db = test_db(Some("https://example.com/a")).await;
        let queue = MobilizeQueue::new(db);

        let mut rx = queue.observe_pending_count("a");
        assert_eq!(*rx.borrow(), 0);

        queue.enqueue(&["a".to_string()]).await.unwrap();
        // The subscription's own async count refresh races the enqueue
        // publish; wait for the value rather than the first change.
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|count| *count == 1))
            .await
            .expect("count should reach 1")
            .unwrap();
    }

    #[tokio::test]
    async fn drain_mobilizes_and_clears_task() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("# Extracted"))
            .mount(&mock_server)
            .await;

        let db = test_db(Some("https://example.com/a")).await;
        let queue = MobilizeQueue::new(db.clone());
        let mobilizer = Mobilizer::new(
            db.clone(),
            queue.clone(),
            reqwest::Client::new(),
            mock_server.uri(),
        );

        queue.enqueue(&["a".to_string()]).await.unwrap();
        mobilizer.drain().await;

        let entry = db.find_entry("a").await.unwrap().unwrap();
        assert_eq!(entry.mobilized_content.as_deref(), Some("# Extracted"));
        assert_eq!(db.pending_mobilize_count("a").await.unwrap(), 0);
        assert!(!mobilizer.refresh_flag().load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn drain_drops_linkless_entry_task() {
        let db = test_db(None).await;
        let queue = MobilizeQueue::new(db.clone());
        let mobilizer = Mobilizer::new(
            db.clone(),
            queue.clone(),
            reqwest::Client::new(),
            "https://r.jina.ai".to_string(),
        );

        queue.enqueue(&["a".to_string()]).await.unwrap();
        mobilizer.drain().await;

        assert_eq!(db.pending_mobilize_count("a").await.unwrap(), 0);
        assert!(db.find_entry("a").await.unwrap().unwrap().mobilized_content.is_none());
    }

    #[tokio::test]
    async fn permanent_failure_removes_task_without_content() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let db = test_db(Some("https://example.com/a")).await;
        let queue = MobilizeQueue::new(db.clone());
        let mobilizer = Mobilizer::new(
            db.clone(),
            queue.clone(),
            reqwest::Client::new(),
            mock_server.uri(),
        );

        queue.enqueue(&["a".to_string()]).await.unwrap();
        mobilizer.drain().await;

        assert_eq!(db.pending_mobilize_count("a").await.unwrap(), 0);
        assert!(db.find_entry("a").await.unwrap().unwrap().mobilized_content.is_none());
    }

    #[tokio::test]
    async fn retryable_failure_keeps_task_until_attempts_exhausted() {
        let mock_server = MockServer::start().await;
        // Server errors are retryable: the task must survive early failures
        // and leave the queue once the attempt budget runs out.
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let db = test_db(Some("https://example.com/a")).await;
        let queue = MobilizeQueue::new(db.clone());
        let mobilizer = Mobilizer::new(
            db.clone(),
            queue.clone(),
            reqwest::Client::new(),
            mock_server.uri(),
        );

        queue.enqueue(&["a".to_string()]).await.unwrap();

        mobilizer.drain().await;
        assert_eq!(
            db.pending_mobilize_count("a").await.unwrap(),
            1,
            "task should survive a failed drain"
        );

        // Simulate a prior failed drain, then let the next one exhaust the budget.
        let tasks = db.next_mobilize_tasks().await.unwrap();
        db.record_mobilize_attempt(tasks[0].id).await.unwrap();
        mobilizer.drain().await;

        assert_eq!(db.pending_mobilize_count("a").await.unwrap(), 0);
        assert!(db.find_entry("a").await.unwrap().unwrap().mobilized_content.is_none());
    }
}
