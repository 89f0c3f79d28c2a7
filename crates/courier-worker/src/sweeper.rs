// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retention sweeper: deletes finished records once they age out.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courier_config::model::RetentionConfig;
use courier_core::{
    Clock, CourierError, InboxStatus, InboxStore, OutboxStatus, OutboxStore, PeriodicTask,
};
use tracing::{debug, info};

/// Retention windows, measured from a record's terminal timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepSettings {
    pub outbox_retention: Duration,
    /// Also the deduplication horizon for redelivered inbox messages.
    pub inbox_retention: Duration,
}

impl SweepSettings {
    pub fn from_config(config: &RetentionConfig) -> Self {
        Self {
            outbox_retention: config.outbox_retention(),
            inbox_retention: config.inbox_retention(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub outbox_deleted: u64,
    pub inbox_deleted: u64,
}

/// Deletes `Published`/`Discarded` outbox records and `Processed`/`Discarded`
/// inbox records older than their retention window.
pub struct RetentionSweeper {
    outbox: Arc<dyn OutboxStore>,
    inbox: Arc<dyn InboxStore>,
    clock: Arc<dyn Clock>,
    settings: SweepSettings,
}

impl RetentionSweeper {
    pub fn new(
        outbox: Arc<dyn OutboxStore>,
        inbox: Arc<dyn InboxStore>,
        clock: Arc<dyn Clock>,
        settings: SweepSettings,
    ) -> Self {
        Self {
            outbox,
            inbox,
            clock,
            settings,
        }
    }

    pub async fn purge(&self, now: DateTime<Utc>) -> Result<SweepReport, CourierError> {
        let outbox_deleted = self
            .outbox
            .delete_older_than(
                cutoff(now, self.settings.outbox_retention),
                &[OutboxStatus::Published, OutboxStatus::Discarded],
            )
            .await?;
        let inbox_deleted = self
            .inbox
            .delete_older_than(
                cutoff(now, self.settings.inbox_retention),
                &[InboxStatus::Processed, InboxStatus::Discarded],
            )
            .await?;

        let report = SweepReport {
            outbox_deleted,
            inbox_deleted,
        };
        if report == SweepReport::default() {
            debug!("retention sweep found nothing to delete");
        } else {
            info!(outbox_deleted, inbox_deleted, "retention sweep complete");
        }
        Ok(report)
    }
}

fn cutoff(now: DateTime<Utc>, retention: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(retention)
        .ok()
        .and_then(|r| now.checked_sub_signed(r))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[async_trait]
impl PeriodicTask for RetentionSweeper {
    fn name(&self) -> &str {
        "retention-sweeper"
    }

    async fn tick(&self) -> Result<(), CourierError> {
        self.purge(self.clock.now()).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::{
        InboundMessage, InboxChange, InboxRecord, OutboxChange, OutboxRecord, OutgoingMessage,
    };
    use courier_test_utils::{ManualClock, MemoryStore};

    const DAY: Duration = Duration::from_secs(24 * 3600);

    fn sweeper(store: &MemoryStore, clock: &ManualClock) -> RetentionSweeper {
        RetentionSweeper::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(clock.clone()),
            SweepSettings {
                outbox_retention: 7 * DAY,
                inbox_retention: 7 * DAY,
            },
        )
    }

    async fn published_at(store: &MemoryStore, at: DateTime<Utc>) -> OutboxRecord {
        let record = OutboxRecord::new(OutgoingMessage::new("T", "{}", "d"), at, None);
        OutboxStore::insert(store, &record).await.unwrap();
        let claimed = OutboxChange::Publishing { at };
        OutboxStore::update_status(store, record.id, record.observed(), claimed)
            .await
            .unwrap();
        let observed = courier_core::Observed {
            status: OutboxStatus::Publishing,
            last_attempt_at: Some(at),
        };
        OutboxStore::update_status(store, record.id, observed, OutboxChange::Published { at })
            .await
            .unwrap();
        record
    }

    #[tokio::test]
    async fn deletes_only_records_past_retention() {
        let store = MemoryStore::new();
        let clock = ManualClock::fixed();
        let now = clock.now();

        let old = published_at(&store, now - chrono::Duration::days(8)).await;
        let recent = published_at(&store, now - chrono::Duration::days(6)).await;

        let report = sweeper(&store, &clock).purge(now).await.unwrap();
        assert_eq!(report.outbox_deleted, 1);
        assert!(OutboxStore::get(&store, old.id).await.unwrap().is_none());
        assert!(OutboxStore::get(&store, recent.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn unfinished_records_are_never_deleted() {
        let store = MemoryStore::new();
        let clock = ManualClock::fixed();
        let long_ago = clock.now() - chrono::Duration::days(30);

        let pending = OutboxRecord::new(OutgoingMessage::new("T", "{}", "d"), long_ago, None);
        OutboxStore::insert(&store, &pending).await.unwrap();
        let admitted = InboxRecord::received(
            InboundMessage::new("m-1", "T", "{}"),
            InboxStatus::Processing,
            long_ago,
        );
        InboxStore::insert_if_absent(&store, &admitted).await.unwrap();

        let report = sweeper(&store, &clock).tick().await;
        assert!(report.is_ok());
        assert_eq!(store.outbox_records().len(), 1);
        assert_eq!(store.inbox_records().len(), 1);
    }

    #[tokio::test]
    async fn inbox_uses_its_own_window() {
        let store = MemoryStore::new();
        let clock = ManualClock::fixed();
        let now = clock.now();
        let received = now - chrono::Duration::days(3);

        let record = InboxRecord::received(
            InboundMessage::new("m-1", "T", "{}"),
            InboxStatus::Processing,
            received,
        );
        InboxStore::insert_if_absent(&store, &record).await.unwrap();
        InboxStore::update_status(
            &store,
            &record.id,
            record.observed(),
            InboxChange::Processed { at: received },
        )
        .await
        .unwrap();

        let sweeper = RetentionSweeper::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(clock.clone()),
            SweepSettings {
                outbox_retention: 30 * DAY,
                inbox_retention: 2 * DAY,
            },
        );
        let report = sweeper.purge(now).await.unwrap();
        assert_eq!(
            report,
            SweepReport {
                outbox_deleted: 0,
                inbox_deleted: 1
            }
        );
    }
}
