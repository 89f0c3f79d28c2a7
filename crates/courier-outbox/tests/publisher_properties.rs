// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery properties of the publisher under arbitrary sink behavior.

use std::sync::Arc;
use std::time::Duration;

use courier_core::{OutboxStatus, OutboxStore, OutgoingMessage, RetryPolicy};
use courier_outbox::{OutboxPublisher, OutboxWriter, PublisherSettings};
use courier_test_utils::{ManualClock, MemoryStore, MockSink, Outcome};
use proptest::prelude::*;

fn outcome() -> impl Strategy<Value = Outcome> {
    prop_oneof![
        3 => Just(Outcome::Succeed),
        3 => Just(Outcome::Transient("flaky".to_string())),
        1 => Just(Outcome::Permanent("poison".to_string())),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Every record ends published or discarded, is never retried past the
    /// limit, and was handed to the sink at least once if published.
    #[test]
    fn retries_are_bounded_and_published_records_were_sent(
        script in proptest::collection::vec(outcome(), 0..40),
        max_retries in 1u32..5,
        records in 1usize..6,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();

        runtime.block_on(async {
            let store = MemoryStore::new();
            let sink = Arc::new(MockSink::new());
            for step in &script {
                sink.push(step.clone());
            }
            let clock = ManualClock::fixed();
            let writer = OutboxWriter::new(Arc::new(clock.clone()));
            let publisher = OutboxPublisher::new(
                Arc::new(store.clone()),
                sink.clone(),
                Arc::new(clock.clone()),
                PublisherSettings {
                    batch_size: 3,
                    dispatch_timeout: Duration::from_secs(1),
                    stale_after: Duration::from_secs(60),
                    retry: RetryPolicy {
                        max_retries,
                        initial_backoff: Duration::ZERO,
                        max_backoff: Duration::ZERO,
                    },
                },
            );

            for n in 0..records {
                let writer = writer.clone();
                let message = OutgoingMessage::new("T", format!("{{\"n\":{n}}}"), "d");
                store
                    .unit_of_work(move |session| writer.append(session, message))
                    .await
                    .unwrap();
                clock.advance(Duration::from_millis(1));
            }

            // Enough passes for every record to exhaust its retries.
            for _ in 0..(records * (max_retries as usize + 2)) {
                publisher.run_once().await.unwrap();
                clock.advance(Duration::from_millis(1));
            }

            let sent = sink.sent_ids();
            for record in store.outbox_records() {
                prop_assert!(record.retry_count <= max_retries);
                prop_assert!(
                    matches!(record.status, OutboxStatus::Published | OutboxStatus::Discarded),
                    "record left in {:?}", record.status
                );
                if record.status == OutboxStatus::Published {
                    prop_assert!(sent.contains(&record.id));
                    prop_assert!(record.published_at.is_some());
                }
                let attempts = sent.iter().filter(|id| **id == record.id).count();
                prop_assert!(attempts <= max_retries as usize);
            }
            let counts = OutboxStore::count_by_status(&store).await.unwrap();
            let total: u64 = counts.iter().map(|(_, n)| n).sum();
            prop_assert_eq!(total, records as u64);
            Ok(())
        })?;
    }
}
