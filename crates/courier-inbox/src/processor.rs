// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbox processor: runs registered actions for deferred, failed and
//! abandoned inbox records.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courier_config::model::InboxConfig;
use courier_core::{
    Clock, CourierError, DeliveryError, Failure, InboxChange, InboxRecord, InboxStatus,
    InboxStore, Observed, PeriodicTask, RetryPolicy,
};
use tracing::{debug, info, warn};

use crate::guard::NO_HANDLER;
use crate::registry::HandlerRegistry;

/// Reason stored on records discarded after exhausting their retries.
pub const MAX_RETRIES_EXCEEDED: &str = "max retries exceeded";

/// Failure recorded when a `Processing` record outlived `stale_after`.
pub const ABANDONED_IN_FLIGHT: &str = "abandoned in flight";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessorSettings {
    pub batch_size: usize,
    pub handler_timeout: Duration,
    pub stale_after: Duration,
    pub retry: RetryPolicy,
}

impl ProcessorSettings {
    pub fn from_config(config: &InboxConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            handler_timeout: config.handler_timeout(),
            stale_after: config.stale_after(),
            retry: config.retry_policy(),
        }
    }
}

/// Counts from one processor pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessReport {
    pub processed: usize,
    pub failed: usize,
    pub discarded: usize,
    pub reclaimed: usize,
    pub skipped: usize,
}

impl ProcessReport {
    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }
}

enum Attempt {
    Processed,
    Failed,
    Discarded,
    Skipped,
}

pub struct InboxProcessor {
    store: Arc<dyn InboxStore>,
    registry: HandlerRegistry,
    clock: Arc<dyn Clock>,
    settings: ProcessorSettings,
}

impl InboxProcessor {
    pub fn new(
        store: Arc<dyn InboxStore>,
        registry: HandlerRegistry,
        clock: Arc<dyn Clock>,
        settings: ProcessorSettings,
    ) -> Self {
        Self {
            store,
            registry,
            clock,
            settings,
        }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Run one processor pass. Only store errors abort it.
    pub async fn run_once(&self) -> Result<ProcessReport, CourierError> {
        let now = self.clock.now();
        let mut report = ProcessReport {
            reclaimed: self.reclaim_abandoned(now).await?,
            ..ProcessReport::default()
        };
        report.discarded = self.discard_exhausted(now).await?;

        for record in self.select_batch(now).await? {
            match self.process(record).await? {
                Attempt::Processed => report.processed += 1,
                Attempt::Failed => report.failed += 1,
                Attempt::Discarded => report.discarded += 1,
                Attempt::Skipped => report.skipped += 1,
            }
        }

        if !report.is_idle() {
            debug!(
                processed = report.processed,
                failed = report.failed,
                discarded = report.discarded,
                reclaimed = report.reclaimed,
                skipped = report.skipped,
                "inbox pass complete"
            );
        }
        Ok(report)
    }

    /// A stale `Processing` record counts as a failed attempt.
    async fn reclaim_abandoned(&self, now: DateTime<Utc>) -> Result<usize, CourierError> {
        let cutoff = chrono::Duration::from_std(self.settings.stale_after)
            .ok()
            .and_then(|age| now.checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let mut reclaimed = 0;
        for record in self.store.query_stale(cutoff, self.settings.batch_size).await? {
            let change = InboxChange::Failed {
                at: now,
                failure: Failure::new(ABANDONED_IN_FLIGHT),
                retry_at: self.settings.retry.retry_at(record.retry_count + 1, now),
            };
            if self.store.update_status(&record.id, record.observed(), change).await? {
                warn!(
                    message_id = %record.id,
                    retry_count = record.retry_count + 1,
                    "reclaiming abandoned inbox record"
                );
                reclaimed += 1;
            }
        }
        Ok(reclaimed)
    }

    async fn discard_exhausted(&self, now: DateTime<Utc>) -> Result<usize, CourierError> {
        let exhausted = self
            .store
            .query_exhausted(self.settings.retry.max_retries, self.settings.batch_size)
            .await?;

        let mut discarded = 0;
        for record in exhausted {
            let change = InboxChange::Discarded {
                at: now,
                reason: MAX_RETRIES_EXCEEDED.to_string(),
            };
            if self.store.update_status(&record.id, record.observed(), change).await? {
                warn!(
                    message_id = %record.id,
                    message_type = %record.message_type,
                    retry_count = record.retry_count,
                    "inbox record discarded: max retries exceeded"
                );
                discarded += 1;
            }
        }
        Ok(discarded)
    }

    /// Oldest `batch_size` of the `Pending` records and due retries together.
    async fn select_batch(&self, now: DateTime<Utc>) -> Result<Vec<InboxRecord>, CourierError> {
        let limit = self.settings.batch_size;
        let retry = self.settings.retry;
        let mut batch = self
            .store
            .query_by_status(&[InboxStatus::Pending], limit)
            .await?;
        batch.extend(self.store.query_retryable(now, retry.max_retries, limit).await?);
        batch.sort_by(|a, b| (a.received_at, &a.id).cmp(&(b.received_at, &b.id)));
        batch.truncate(limit);
        Ok(batch)
    }

    async fn process(&self, record: InboxRecord) -> Result<Attempt, CourierError> {
        let started = self.clock.now();
        let claim = InboxChange::Processing { at: started };
        if !self.store.update_status(&record.id, record.observed(), claim).await? {
            debug!(message_id = %record.id, "inbox record claimed elsewhere, skipping");
            return Ok(Attempt::Skipped);
        }
        let in_flight = Observed {
            status: InboxStatus::Processing,
            last_attempt_at: Some(started),
        };

        let Some(action) = self.registry.resolve(&record.message_type) else {
            warn!(
                message_id = %record.id,
                message_type = %record.message_type,
                "no inbox action registered, discarding"
            );
            let change = InboxChange::Discarded {
                at: self.clock.now(),
                reason: NO_HANDLER.to_string(),
            };
            return self.finish(&record, in_flight, change, Attempt::Discarded).await;
        };

        let message = record.message();
        let timeout = self.settings.handler_timeout;
        let outcome = match tokio::time::timeout(timeout, action.invoke(&message)).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout { duration: timeout }),
        };

        let finished = self.clock.now();
        let (change, attempt) = match outcome {
            Ok(()) => (InboxChange::Processed { at: finished }, Attempt::Processed),
            Err(e) if e.is_permanent() => {
                warn!(
                    message_id = %record.id,
                    message_type = %record.message_type,
                    error = %e,
                    "inbox record rejected permanently, discarding"
                );
                let change = InboxChange::Discarded {
                    at: finished,
                    reason: e.to_string(),
                };
                (change, Attempt::Discarded)
            }
            Err(e) => {
                warn!(
                    message_id = %record.id,
                    message_type = %record.message_type,
                    retry_count = record.retry_count + 1,
                    error = %e,
                    "inbox action failed"
                );
                let change = InboxChange::Failed {
                    at: finished,
                    failure: Failure::from_error(&e),
                    retry_at: self.settings.retry.retry_at(record.retry_count + 1, finished),
                };
                (change, Attempt::Failed)
            }
        };
        self.finish(&record, in_flight, change, attempt).await
    }

    /// Record the outcome of an attempt claimed at `in_flight`.
    async fn finish(
        &self,
        record: &InboxRecord,
        in_flight: Observed<InboxStatus>,
        change: InboxChange,
        attempt: Attempt,
    ) -> Result<Attempt, CourierError> {
        if !self.store.update_status(&record.id, in_flight, change).await? {
            warn!(
                message_id = %record.id,
                "inbox record changed during processing, outcome not recorded"
            );
            return Ok(Attempt::Skipped);
        }
        if matches!(attempt, Attempt::Processed) {
            info!(
                message_id = %record.id,
                message_type = %record.message_type,
                "inbox record processed"
            );
        }
        Ok(attempt)
    }
}

#[async_trait]
impl PeriodicTask for InboxProcessor {
    fn name(&self) -> &str {
        "inbox-processor"
    }

    async fn tick(&self) -> Result<(), CourierError> {
        self.run_once().await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::{InboundMessage, MessageId};
    use courier_test_utils::{ManualClock, MemoryStore, MockAction, Outcome};

    use crate::InboxGuard;

    fn settings(max_retries: u32) -> ProcessorSettings {
        ProcessorSettings {
            batch_size: 10,
            handler_timeout: Duration::from_secs(5),
            stale_after: Duration::from_secs(60),
            retry: RetryPolicy {
                max_retries,
                initial_backoff: Duration::ZERO,
                max_backoff: Duration::ZERO,
            },
        }
    }

    struct Fixture {
        store: MemoryStore,
        clock: ManualClock,
        guard: InboxGuard,
        action: Arc<MockAction>,
        processor: InboxProcessor,
    }

    fn fixture(action: MockAction, settings: ProcessorSettings) -> Fixture {
        let store = MemoryStore::new();
        let clock = ManualClock::fixed();
        let action = Arc::new(action);
        let mut registry = HandlerRegistry::new();
        registry.register("PaymentReceived", action.clone());
        let processor = InboxProcessor::new(
            Arc::new(store.clone()),
            registry,
            Arc::new(clock.clone()),
            settings,
        );
        let guard = InboxGuard::new(Arc::new(store.clone()), Arc::new(clock.clone()));
        Fixture {
            store,
            clock,
            guard,
            action,
            processor,
        }
    }

    impl Fixture {
        async fn record(&self, id: &str) -> InboxRecord {
            InboxStore::get(&self.store, &MessageId::from(id))
                .await
                .unwrap()
                .unwrap()
        }
    }

    fn payment(id: &str) -> InboundMessage {
        InboundMessage::new(id, "PaymentReceived", r#"{"amount":10}"#)
    }

    #[tokio::test]
    async fn deferred_message_is_processed() {
        let f = fixture(MockAction::new(), settings(3));
        f.guard.try_admit_deferred(payment("m-1")).await.unwrap();

        assert_eq!(f.processor.run_once().await.unwrap().processed, 1);
        let r = f.record("m-1").await;
        assert_eq!(r.status, InboxStatus::Processed);
        assert_eq!(r.processed_at, Some(f.clock.now()));
        assert_eq!(f.action.invocations()[0].payload, r#"{"amount":10}"#);
    }

    #[tokio::test]
    async fn failed_message_is_retried_then_discarded() {
        let f = fixture(MockAction::always(Outcome::Transient("down".into())), settings(2));
        f.guard.try_admit(payment("m-1")).await.unwrap();
        f.guard
            .mark_failed(&"m-1".into(), &DeliveryError::transient("down"))
            .await
            .unwrap();

        assert_eq!(f.processor.run_once().await.unwrap().failed, 1);
        assert_eq!(f.record("m-1").await.retry_count, 2);

        let report = f.processor.run_once().await.unwrap();
        assert_eq!(report.discarded, 1);
        let r = f.record("m-1").await;
        assert_eq!(r.status, InboxStatus::Discarded);
        assert_eq!(r.error_message.as_deref(), Some(MAX_RETRIES_EXCEEDED));
        assert_eq!(f.action.invocation_count(), 1);
    }

    #[tokio::test]
    async fn unknown_type_is_discarded() {
        let f = fixture(MockAction::new(), settings(3));
        f.guard
            .try_admit_deferred(InboundMessage::new("m-9", "Mystery", "{}"))
            .await
            .unwrap();

        assert_eq!(f.processor.run_once().await.unwrap().discarded, 1);
        let r = f.record("m-9").await;
        assert_eq!(r.status, InboxStatus::Discarded);
        assert_eq!(r.error_message.as_deref(), Some(NO_HANDLER));
        assert_eq!(f.action.invocation_count(), 0);
    }

    #[tokio::test]
    async fn permanent_failure_discards() {
        let f = fixture(MockAction::always(Outcome::Permanent("bad payload".into())), settings(3));
        f.guard.try_admit_deferred(payment("m-1")).await.unwrap();

        assert_eq!(f.processor.run_once().await.unwrap().discarded, 1);
        assert!(f.record("m-1").await.error_message.unwrap().contains("bad payload"));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_action_times_out() {
        let action = MockAction::new();
        action.push(Outcome::Stall(Duration::from_secs(30)));
        let f = fixture(action, settings(3));
        f.guard.try_admit_deferred(payment("m-1")).await.unwrap();

        assert_eq!(f.processor.run_once().await.unwrap().failed, 1);
        let r = f.record("m-1").await;
        assert_eq!(r.status, InboxStatus::Failed);
        assert!(r.error_message.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn abandoned_processing_record_is_reclaimed() {
        let f = fixture(MockAction::new(), settings(3));
        // Admitted for inline handling, then the caller crashed.
        f.guard.try_admit(payment("m-1")).await.unwrap();

        assert!(f.processor.run_once().await.unwrap().is_idle());
        f.clock.advance(Duration::from_secs(60));
        let report = f.processor.run_once().await.unwrap();
        assert_eq!(report.reclaimed, 1);
        assert_eq!(report.processed, 1);
        let r = f.record("m-1").await;
        assert_eq!(r.status, InboxStatus::Processed);
        assert_eq!(r.retry_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn message_that_keeps_killing_the_worker_is_discarded() {
        let f = fixture(MockAction::always(Outcome::Stall(Duration::from_secs(3600))), settings(2));
        f.guard.try_admit_deferred(payment("m-1")).await.unwrap();

        for _ in 0..6 {
            let _ = tokio::time::timeout(Duration::from_secs(1), f.processor.run_once()).await;
            f.clock.advance(Duration::from_secs(61));
        }

        let r = f.record("m-1").await;
        assert_eq!(r.status, InboxStatus::Discarded);
        assert_eq!(r.retry_count, 2);
        assert_eq!(f.action.invocation_count(), 2);
    }

    #[tokio::test]
    async fn due_retry_is_not_starved_by_new_arrivals() {
        let mut s = settings(3);
        s.batch_size = 1;
        let action = MockAction::new();
        action.push(Outcome::Transient("ledger locked".into()));
        let f = fixture(action, s);
        f.guard.try_admit_deferred(payment("first")).await.unwrap();
        assert_eq!(f.processor.run_once().await.unwrap().failed, 1);

        for id in ["second", "third"] {
            f.clock.advance(Duration::from_millis(1));
            f.guard.try_admit_deferred(payment(id)).await.unwrap();
        }
        assert_eq!(f.processor.run_once().await.unwrap().processed, 1);
        assert_eq!(f.record("first").await.status, InboxStatus::Processed);
        assert_eq!(f.record("second").await.status, InboxStatus::Pending);
    }

    #[tokio::test]
    async fn batch_is_oldest_first() {
        let mut s = settings(3);
        s.batch_size = 2;
        let f = fixture(MockAction::new(), s);
        for id in ["c", "a", "b"] {
            f.guard.try_admit_deferred(payment(id)).await.unwrap();
            f.clock.advance(Duration::from_millis(1));
        }

        f.processor.run_once().await.unwrap();
        let order: Vec<_> = f
            .action
            .invocations()
            .into_iter()
            .map(|m| m.id.to_string())
            .collect();
        assert_eq!(order, ["c", "a"]);
    }

    #[tokio::test]
    async fn store_errors_abort_the_pass() {
        let f = fixture(MockAction::new(), settings(3));
        f.guard.try_admit_deferred(payment("m-1")).await.unwrap();
        f.store.set_unavailable(true);
        assert!(matches!(
            f.processor.run_once().await,
            Err(CourierError::Storage { .. })
        ));
        assert_eq!(f.action.invocation_count(), 0);
    }

    #[tracing_test::traced_test]
    #[tokio::test]
    async fn reclaim_is_logged() {
        let f = fixture(MockAction::new(), settings(3));
        f.guard.try_admit(payment("m-7")).await.unwrap();
        f.clock.advance(Duration::from_secs(120));
        f.processor.run_once().await.unwrap();
        assert!(logs_contain("reclaiming abandoned inbox record"));
        assert!(logs_contain("m-7"));
    }
}
