// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the outbox and inbox store traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use courier_config::model::StorageConfig;
use courier_core::{
    CourierError, InboxChange, InboxRecord, InboxStatus, InboxStore, MessageId, Observed,
    OutboxChange, OutboxRecord, OutboxStatus, OutboxStore,
};

use crate::database::{Database, SqliteSession};
use crate::queries;

/// SQLite-backed message record store.
///
/// Wraps a [`Database`] handle and delegates to the typed query modules.
/// Cloning shares the underlying connection.
#[derive(Clone)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Open the database described by `config`.
    pub async fn open(config: &StorageConfig) -> Result<Self, CourierError> {
        let db = Database::open_with_options(&config.database_path, config.wal_mode).await?;
        debug!(path = %config.database_path, "SQLite store initialized");
        Ok(Self::new(db))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// See [`Database::unit_of_work`].
    pub async fn unit_of_work<F, R>(&self, f: F) -> Result<R, CourierError>
    where
        F: FnOnce(&mut SqliteSession<'_>) -> Result<R, CourierError> + Send + 'static,
        R: Send + 'static,
    {
        self.db.unit_of_work(f).await
    }

    /// Checkpoint the WAL and close the connection.
    pub async fn close(self) -> Result<(), CourierError> {
        self.db.close().await
    }
}

#[async_trait]
impl OutboxStore for SqliteStore {
    async fn insert(&self, record: &OutboxRecord) -> Result<(), CourierError> {
        queries::outbox::insert(&self.db, record).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<OutboxRecord>, CourierError> {
        queries::outbox::get(&self.db, id).await
    }

    async fn query_by_status(
        &self,
        statuses: &[OutboxStatus],
        limit: usize,
    ) -> Result<Vec<OutboxRecord>, CourierError> {
        queries::outbox::query_by_status(&self.db, statuses, limit).await
    }

    async fn query_scheduled_ready(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<OutboxRecord>, CourierError> {
        queries::outbox::query_scheduled_ready(&self.db, now, limit).await
    }

    async fn query_retryable(
        &self,
        now: DateTime<Utc>,
        max_retries: u32,
        limit: usize,
    ) -> Result<Vec<OutboxRecord>, CourierError> {
        queries::outbox::query_retryable(&self.db, now, max_retries, limit).await
    }

    async fn query_exhausted(
        &self,
        max_retries: u32,
        limit: usize,
    ) -> Result<Vec<OutboxRecord>, CourierError> {
        queries::outbox::query_exhausted(&self.db, max_retries, limit).await
    }

    async fn query_stale(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<OutboxRecord>, CourierError> {
        queries::outbox::query_stale(&self.db, cutoff, limit).await
    }

    async fn update_status(
        &self,
        id: Uuid,
        observed: Observed<OutboxStatus>,
        change: OutboxChange,
    ) -> Result<bool, CourierError> {
        queries::outbox::update_status(&self.db, id, observed, change).await
    }

    async fn delete_older_than(
        &self,
        cutoff: DateTime<Utc>,
        statuses: &[OutboxStatus],
    ) -> Result<u64, CourierError> {
        queries::outbox::delete_older_than(&self.db, cutoff, statuses).await
    }

    async fn count_by_status(&self) -> Result<Vec<(OutboxStatus, u64)>, CourierError> {
        queries::outbox::count_by_status(&self.db).await
    }
}

#[async_trait]
impl InboxStore for SqliteStore {
    async fn insert_if_absent(&self, record: &InboxRecord) -> Result<bool, CourierError> {
        queries::inbox::insert_if_absent(&self.db, record).await
    }

    async fn get(&self, id: &MessageId) -> Result<Option<InboxRecord>, CourierError> {
        queries::inbox::get(&self.db, id).await
    }

    async fn query_by_status(
        &self,
        statuses: &[InboxStatus],
        limit: usize,
    ) -> Result<Vec<InboxRecord>, CourierError> {
        queries::inbox::query_by_status(&self.db, statuses, limit).await
    }

    async fn query_retryable(
        &self,
        now: DateTime<Utc>,
        max_retries: u32,
        limit: usize,
    ) -> Result<Vec<InboxRecord>, CourierError> {
        queries::inbox::query_retryable(&self.db, now, max_retries, limit).await
    }

    async fn query_exhausted(
        &self,
        max_retries: u32,
        limit: usize,
    ) -> Result<Vec<InboxRecord>, CourierError> {
        queries::inbox::query_exhausted(&self.db, max_retries, limit).await
    }

    async fn query_stale(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<InboxRecord>, CourierError> {
        queries::inbox::query_stale(&self.db, cutoff, limit).await
    }

    async fn update_status(
        &self,
        id: &MessageId,
        observed: Observed<InboxStatus>,
        change: InboxChange,
    ) -> Result<bool, CourierError> {
        queries::inbox::update_status(&self.db, id, observed, change).await
    }

    async fn delete_older_than(
        &self,
        cutoff: DateTime<Utc>,
        statuses: &[InboxStatus],
    ) -> Result<u64, CourierError> {
        queries::inbox::delete_older_than(&self.db, cutoff, statuses).await
    }

    async fn count_by_status(&self) -> Result<Vec<(InboxStatus, u64)>, CourierError> {
        queries::inbox::count_by_status(&self.db).await
    }
}
