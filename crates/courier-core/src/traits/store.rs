// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message record store traits.
//!
//! Stores are only touched through the writer, guard and workers. Every
//! status change goes through `update_status`, which is conditioned on the
//! observed state so that concurrent workers resolve races without locks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::CourierError;
use crate::state::{InboxChange, Observed, OutboxChange};
use crate::types::{InboxRecord, InboxStatus, MessageId, OutboxRecord, OutboxStatus};

/// Unit of work an outbox record is staged into.
///
/// Implemented by a store's open transaction: the record becomes visible
/// only when the caller commits its own business write, and vanishes with
/// it on rollback. Implementations must not commit.
pub trait OutboxSession {
    fn stage(&mut self, record: &OutboxRecord) -> Result<(), CourierError>;
}

/// Durable collection of outbox records.
#[async_trait]
pub trait OutboxStore: Send + Sync + 'static {
    /// Insert a record outside any business transaction.
    ///
    /// Skips message validation and the caller's unit of work; business
    /// code stages records through `OutboxWriter` instead.
    #[doc(hidden)]
    async fn insert(&self, record: &OutboxRecord) -> Result<(), CourierError>;

    async fn get(&self, id: Uuid) -> Result<Option<OutboxRecord>, CourierError>;

    /// Records in any of `statuses`, oldest first (ties by id).
    async fn query_by_status(
        &self,
        statuses: &[OutboxStatus],
        limit: usize,
    ) -> Result<Vec<OutboxRecord>, CourierError>;

    /// `Pending` records plus `Scheduled` ones due at `now`, oldest first.
    async fn query_scheduled_ready(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<OutboxRecord>, CourierError>;

    /// `Failed` records with fewer than `max_retries` failures whose
    /// `next_attempt_at` has passed at `now`, oldest first.
    async fn query_retryable(
        &self,
        now: DateTime<Utc>,
        max_retries: u32,
        limit: usize,
    ) -> Result<Vec<OutboxRecord>, CourierError>;

    /// `Failed` records with at least `max_retries` failures, oldest first.
    async fn query_exhausted(
        &self,
        max_retries: u32,
        limit: usize,
    ) -> Result<Vec<OutboxRecord>, CourierError>;

    /// `Publishing` records whose attempt started at or before `cutoff`.
    async fn query_stale(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<OutboxRecord>, CourierError>;

    /// Apply `change` if the record still matches `observed`.
    ///
    /// Returns `false` when zero records matched (another worker won).
    async fn update_status(
        &self,
        id: Uuid,
        observed: Observed<OutboxStatus>,
        change: OutboxChange,
    ) -> Result<bool, CourierError>;

    /// Delete records in `statuses` whose terminal timestamp is before `cutoff`.
    async fn delete_older_than(
        &self,
        cutoff: DateTime<Utc>,
        statuses: &[OutboxStatus],
    ) -> Result<u64, CourierError>;

    async fn count_by_status(&self) -> Result<Vec<(OutboxStatus, u64)>, CourierError>;
}

/// Durable collection of inbox records keyed by producer message id.
#[async_trait]
pub trait InboxStore: Send + Sync + 'static {
    /// Insert unless a record with the same id exists; an existing record is
    /// never overwritten. Returns whether the record was inserted.
    async fn insert_if_absent(&self, record: &InboxRecord) -> Result<bool, CourierError>;

    async fn get(&self, id: &MessageId) -> Result<Option<InboxRecord>, CourierError>;

    async fn query_by_status(
        &self,
        statuses: &[InboxStatus],
        limit: usize,
    ) -> Result<Vec<InboxRecord>, CourierError>;

    async fn query_retryable(
        &self,
        now: DateTime<Utc>,
        max_retries: u32,
        limit: usize,
    ) -> Result<Vec<InboxRecord>, CourierError>;

    async fn query_exhausted(
        &self,
        max_retries: u32,
        limit: usize,
    ) -> Result<Vec<InboxRecord>, CourierError>;

    /// `Processing` records whose attempt started at or before `cutoff`.
    async fn query_stale(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<InboxRecord>, CourierError>;

    async fn update_status(
        &self,
        id: &MessageId,
        observed: Observed<InboxStatus>,
        change: InboxChange,
    ) -> Result<bool, CourierError>;

    async fn delete_older_than(
        &self,
        cutoff: DateTime<Utc>,
        statuses: &[InboxStatus],
    ) -> Result<u64, CourierError>;

    async fn count_by_status(&self) -> Result<Vec<(InboxStatus, u64)>, CourierError>;
}
