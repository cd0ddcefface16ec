//! End-to-end tests of the mobilization pipeline: queue → worker → stored
//! full text → published pending counts. Each test runs against its own
//! in-memory database and a local mock gateway.

use std::time::Duration;

use lectern::mobilize::{Mobilizer, MobilizeQueue};
use lectern::storage::{Database, NewEntry};
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn seeded_db() -> Database {
    let db = Database::open(":memory:").await.unwrap();
    let feed_id = db
        .insert_feed("Example Feed", "https://feed.example.com/rss")
        .await
        .unwrap();
    for id in ["a", "b"] {
        db.upsert_entry(&NewEntry {
            id: id.to_string(),
            feed_id,
            title: format!("Entry {}", id),
            link: Some(format!("https://example.com/{}", id)),
            description: Some("summary".to_string()),
            published: Some(1704067200),
        })
        .await
        .unwrap();
    }
    db
}

#[tokio::test]
async fn wake_drives_queue_to_empty_and_stores_content() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("# Readable text"))
        .mount(&mock_server)
        .await;

    let db = seeded_db().await;
    let queue = MobilizeQueue::new(db.clone());
    let mobilizer = Mobilizer::new(
        db.clone(),
        queue.clone(),
        reqwest::Client::new(),
        mock_server.uri(),
    );
    let handle = mobilizer.handle();
    tokio::spawn(mobilizer.run());

    let mut rx = queue.observe_pending_count("a");
    queue
        .enqueue(&["a".to_string(), "b".to_string()])
        .await
        .unwrap();

    // The detail screen's exact sequence: enqueue, then wake the service.
    handle.start();

    // Poll the database until both tasks are gone, then confirm the
    // observer saw the final zero.
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let a = db.pending_mobilize_count("a").await.unwrap();
            let b = db.pending_mobilize_count("b").await.unwrap();
            if a == 0 && b == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("queue should drain");

    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|count| *count == 0))
        .await
        .expect("observer should see the final zero")
        .unwrap();

    for id in ["a", "b"] {
        let entry = db.find_entry(id).await.unwrap().unwrap();
        assert_eq!(entry.mobilized_content.as_deref(), Some("# Readable text"));
    }
}

#[tokio::test]
async fn observer_subscribing_after_enqueue_converges_to_real_count() {
    let db = seeded_db().await;
    let queue = MobilizeQueue::new(db.clone());

    queue.enqueue(&["a".to_string()]).await.unwrap();

    // Fresh observer starts at the channel default and is refreshed from
    // the database shortly after.
    let mut rx = queue.observe_pending_count("a");
    tokio::time::timeout(Duration::from_secs(5), async {
        while *rx.borrow_and_update() != 1 {
            rx.changed().await.unwrap();
        }
    })
    .await
    .expect("late observer should converge to the stored count");
}

#[tokio::test]
async fn double_enqueue_stays_single_task() {
    let db = seeded_db().await;
    let queue = MobilizeQueue::new(db.clone());

    queue.enqueue(&["a".to_string()]).await.unwrap();
    queue.enqueue(&["a".to_string()]).await.unwrap();

    assert_eq!(db.pending_mobilize_count("a").await.unwrap(), 1);
}
