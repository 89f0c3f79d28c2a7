// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Writer and publisher against the SQLite store.

use std::sync::Arc;
use std::time::Duration;

use courier_core::{
    Clock, CourierError, OutboxStatus, OutboxStore, OutgoingMessage, RetryPolicy,
};
use courier_outbox::{OutboxPublisher, OutboxWriter, PublisherSettings};
use courier_storage::{Database, SqliteStore};
use courier_test_utils::{ManualClock, MockSink, Outcome};
use tempfile::tempdir;

async fn open(dir: &tempfile::TempDir) -> SqliteStore {
    let path = dir.path().join("outbox.db");
    let db = Database::open(path.to_str().unwrap()).await.unwrap();
    db.connection()
        .call(|conn| {
            conn.execute_batch("CREATE TABLE orders (id TEXT PRIMARY KEY, total INTEGER NOT NULL);")
        })
        .await
        .unwrap();
    SqliteStore::new(db)
}

fn settings() -> PublisherSettings {
    PublisherSettings {
        batch_size: 10,
        dispatch_timeout: Duration::from_secs(5),
        stale_after: Duration::from_secs(60),
        retry: RetryPolicy {
            max_retries: 3,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        },
    }
}

async fn order_count(store: &SqliteStore) -> i64 {
    store
        .database()
        .connection()
        .call(|conn| conn.query_row("SELECT COUNT(*) FROM orders", [], |row| row.get(0)))
        .await
        .unwrap()
}

#[tokio::test]
async fn business_write_and_event_commit_together() {
    let dir = tempdir().unwrap();
    let store = open(&dir).await;
    let clock = ManualClock::fixed();
    let writer = OutboxWriter::new(Arc::new(clock.clone()));

    let w = writer.clone();
    let id = store
        .unit_of_work(move |session| {
            session
                .transaction()
                .execute("INSERT INTO orders (id, total) VALUES ('o-1', 42)", [])
                .map_err(CourierError::storage)?;
            w.append(
                session,
                OutgoingMessage::new("OrderCreated", r#"{"id":"o-1"}"#, "orders.events")
                    .with_correlation_id("corr-1"),
            )
        })
        .await
        .unwrap();

    assert_eq!(order_count(&store).await, 1);
    let record = OutboxStore::get(&store, id).await.unwrap().unwrap();
    assert_eq!(record.status, OutboxStatus::Pending);
    assert_eq!(record.created_at, clock.now());

    let sink = Arc::new(MockSink::new());
    let publisher = OutboxPublisher::new(
        Arc::new(store.clone()),
        sink.clone(),
        Arc::new(clock.clone()),
        settings(),
    );
    assert_eq!(publisher.run_once().await.unwrap().published, 1);
    assert_eq!(sink.sent_ids(), vec![id]);
    let record = OutboxStore::get(&store, id).await.unwrap().unwrap();
    assert_eq!(record.status, OutboxStatus::Published);
    store.close().await.unwrap();
}

#[tokio::test]
async fn failed_business_write_discards_the_event() {
    let dir = tempdir().unwrap();
    let store = open(&dir).await;
    let writer = OutboxWriter::new(Arc::new(ManualClock::fixed()));

    let w = writer.clone();
    let result = store
        .unit_of_work(move |session| {
            w.append(session, OutgoingMessage::new("OrderCreated", "{}", "orders.events"))?;
            // Violates NOT NULL on total.
            session
                .transaction()
                .execute("INSERT INTO orders (id) VALUES ('o-2')", [])
                .map_err(CourierError::storage)?;
            Ok(())
        })
        .await;
    assert!(matches!(result, Err(CourierError::Storage { .. })));

    assert_eq!(order_count(&store).await, 0);
    let counts = OutboxStore::count_by_status(&store).await.unwrap();
    assert!(counts.iter().all(|(_, n)| *n == 0));
    store.close().await.unwrap();
}

#[tokio::test]
async fn sqlite_retry_cycle_ends_published() {
    let dir = tempdir().unwrap();
    let store = open(&dir).await;
    let clock = ManualClock::fixed();
    let writer = OutboxWriter::new(Arc::new(clock.clone()));
    let id = store
        .unit_of_work(move |session| writer.append(session, OutgoingMessage::new("T", "{}", "d")))
        .await
        .unwrap();

    let sink = Arc::new(MockSink::new());
    sink.push(Outcome::Transient("first".into()));
    sink.push(Outcome::Transient("second".into()));
    let publisher = OutboxPublisher::new(
        Arc::new(store.clone()),
        sink.clone(),
        Arc::new(clock.clone()),
        settings(),
    );

    for _ in 0..3 {
        publisher.run_once().await.unwrap();
        clock.advance(Duration::from_millis(10));
    }
    let record = OutboxStore::get(&store, id).await.unwrap().unwrap();
    assert_eq!(record.status, OutboxStatus::Published);
    assert_eq!(record.retry_count, 2);
    assert!(record.error_message.unwrap().contains("second"));
    store.close().await.unwrap();
}
