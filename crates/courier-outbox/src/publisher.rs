// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbox publisher: one pass moves ready records to the dispatch sink.
//!
//! A pass first marks `Publishing` records abandoned by a crashed worker as
//! failed attempts, then discards `Failed` records that used up their
//! retries. It then merges ready records (`Pending` and due `Scheduled`)
//! with due retries and dispatches the oldest `batch_size` of them. Every
//! claim and outcome is an optimistic transition, so several publishers may
//! share a store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courier_config::model::OutboxConfig;
use courier_core::{
    Clock, CourierError, DeliveryError, DispatchSink, Failure, Observed, OutboxChange,
    OutboxRecord, OutboxStatus, OutboxStore, PeriodicTask, RetryPolicy,
};
use tracing::{debug, info, warn};

/// Reason stored on records discarded after exhausting their retries.
pub const MAX_RETRIES_EXCEEDED: &str = "max retries exceeded";

/// Failure recorded when an in-flight attempt outlived `stale_after`.
pub const ABANDONED_IN_FLIGHT: &str = "abandoned in flight";

/// Tuning for one publisher, normally taken from `[outbox]` configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublisherSettings {
    pub batch_size: usize,
    pub dispatch_timeout: Duration,
    pub stale_after: Duration,
    pub retry: RetryPolicy,
}

impl PublisherSettings {
    pub fn from_config(config: &OutboxConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            dispatch_timeout: config.dispatch_timeout(),
            stale_after: config.stale_after(),
            retry: config.retry_policy(),
        }
    }
}

/// Counts from one publisher pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub published: usize,
    pub failed: usize,
    pub discarded: usize,
    /// Abandoned attempts charged as failures.
    pub reclaimed: usize,
    /// Records another worker claimed or changed first.
    pub skipped: usize,
}

impl PublishReport {
    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }
}

enum Attempt {
    Published,
    Failed,
    Discarded,
    Skipped,
}

/// Publishes outbox records to a [`DispatchSink`].
pub struct OutboxPublisher {
    store: Arc<dyn OutboxStore>,
    sink: Arc<dyn DispatchSink>,
    clock: Arc<dyn Clock>,
    settings: PublisherSettings,
}

impl OutboxPublisher {
    pub fn new(
        store: Arc<dyn OutboxStore>,
        sink: Arc<dyn DispatchSink>,
        clock: Arc<dyn Clock>,
        settings: PublisherSettings,
    ) -> Self {
        Self {
            store,
            sink,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &PublisherSettings {
        &self.settings
    }

    /// Run one publisher pass.
    ///
    /// Per-record dispatch failures are written to the record and never
    /// abort the pass; only store errors do.
    pub async fn run_once(&self) -> Result<PublishReport, CourierError> {
        let now = self.clock.now();
        let mut report = PublishReport {
            reclaimed: self.reclaim_abandoned(now).await?,
            ..PublishReport::default()
        };
        report.discarded = self.discard_exhausted(now).await?;

        for record in self.select_batch(now).await? {
            match self.publish(record).await? {
                Attempt::Published => report.published += 1,
                Attempt::Failed => report.failed += 1,
                Attempt::Discarded => report.discarded += 1,
                Attempt::Skipped => report.skipped += 1,
            }
        }

        if !report.is_idle() {
            debug!(
                published = report.published,
                failed = report.failed,
                discarded = report.discarded,
                reclaimed = report.reclaimed,
                skipped = report.skipped,
                "outbox pass complete"
            );
        }
        Ok(report)
    }

    /// Charge stale `Publishing` records with a failed attempt.
    async fn reclaim_abandoned(&self, now: DateTime<Utc>) -> Result<usize, CourierError> {
        let cutoff = stale_cutoff(now, self.settings.stale_after);
        let stale = self.store.query_stale(cutoff, self.settings.batch_size).await?;

        let mut reclaimed = 0;
        for record in stale {
            let change = OutboxChange::Failed {
                at: now,
                failure: Failure::new(ABANDONED_IN_FLIGHT),
                retry_at: self.settings.retry.retry_at(record.retry_count + 1, now),
            };
            if self.store.update_status(record.id, record.observed(), change).await? {
                warn!(
                    record_id = %record.id,
                    last_attempt_at = ?record.last_attempt_at,
                    retry_count = record.retry_count + 1,
                    "reclaiming abandoned outbox record"
                );
                reclaimed += 1;
            }
        }
        Ok(reclaimed)
    }

    /// Move `Failed` records with no retries left to `Discarded`.
    async fn discard_exhausted(&self, now: DateTime<Utc>) -> Result<usize, CourierError> {
        let exhausted = self
            .store
            .query_exhausted(self.settings.retry.max_retries, self.settings.batch_size)
            .await?;

        let mut discarded = 0;
        for record in exhausted {
            let change = OutboxChange::Discarded {
                at: now,
                reason: MAX_RETRIES_EXCEEDED.to_string(),
            };
            if self.store.update_status(record.id, record.observed(), change).await? {
                warn!(
                    record_id = %record.id,
                    message_type = %record.message_type,
                    retry_count = record.retry_count,
                    last_error = record.error_message.as_deref().unwrap_or(""),
                    "outbox record discarded: max retries exceeded"
                );
                discarded += 1;
            }
        }
        Ok(discarded)
    }

    /// The oldest `batch_size` records among ready ones and due retries.
    async fn select_batch(&self, now: DateTime<Utc>) -> Result<Vec<OutboxRecord>, CourierError> {
        let limit = self.settings.batch_size;
        let mut batch = self.store.query_scheduled_ready(now, limit).await?;
        batch.extend(
            self.store
                .query_retryable(now, self.settings.retry.max_retries, limit)
                .await?,
        );
        batch.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        batch.truncate(limit);
        Ok(batch)
    }

    async fn publish(&self, record: OutboxRecord) -> Result<Attempt, CourierError> {
        let started = self.clock.now();
        let claim = OutboxChange::Publishing { at: started };
        if !self.store.update_status(record.id, record.observed(), claim).await? {
            debug!(record_id = %record.id, "outbox record claimed elsewhere, skipping");
            return Ok(Attempt::Skipped);
        }
        let in_flight = Observed {
            status: OutboxStatus::Publishing,
            last_attempt_at: Some(started),
        };

        let envelope = record.envelope();
        let timeout = self.settings.dispatch_timeout;
        let outcome = match tokio::time::timeout(timeout, self.sink.send(&envelope)).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout { duration: timeout }),
        };

        let finished = self.clock.now();
        let (change, attempt) = match outcome {
            Ok(()) => (OutboxChange::Published { at: finished }, Attempt::Published),
            Err(e) if e.is_permanent() => {
                warn!(
                    record_id = %record.id,
                    destination = %record.destination,
                    error = %e,
                    "outbox record rejected permanently, discarding"
                );
                let change = OutboxChange::Discarded {
                    at: finished,
                    reason: e.to_string(),
                };
                (change, Attempt::Discarded)
            }
            Err(e) => {
                warn!(
                    record_id = %record.id,
                    destination = %record.destination,
                    retry_count = record.retry_count + 1,
                    error = %e,
                    "outbox dispatch failed"
                );
                let change = OutboxChange::Failed {
                    at: finished,
                    failure: Failure::from_error(&e),
                    retry_at: self.settings.retry.retry_at(record.retry_count + 1, finished),
                };
                (change, Attempt::Failed)
            }
        };

        if !self.store.update_status(record.id, in_flight, change).await? {
            warn!(
                record_id = %record.id,
                "outbox record changed during dispatch, outcome not recorded"
            );
            return Ok(Attempt::Skipped);
        }
        if matches!(attempt, Attempt::Published) {
            info!(
                record_id = %record.id,
                message_type = %record.message_type,
                destination = %record.destination,
                "outbox record published"
            );
        }
        Ok(attempt)
    }
}

/// Attempts started at or before this instant count as abandoned.
fn stale_cutoff(now: DateTime<Utc>, stale_after: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(stale_after)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[async_trait]
impl PeriodicTask for OutboxPublisher {
    fn name(&self) -> &str {
        "outbox-publisher"
    }

    async fn tick(&self) -> Result<(), CourierError> {
        self.run_once().await.map(|_| ())
    }
}
