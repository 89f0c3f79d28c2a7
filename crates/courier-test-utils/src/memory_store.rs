// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory implementation of the outbox and inbox store traits.
//!
//! Follows the same contract as the SQLite store: optimistic transitions
//! keyed on the observed status and attempt time, oldest-first queries, and
//! all-or-nothing commits of staged outbox records.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courier_core::{
    CourierError, InboxChange, InboxRecord, InboxStatus, InboxStore, MessageId, Observed,
    OutboxChange, OutboxRecord, OutboxSession, OutboxStatus, OutboxStore,
};
use strum::IntoEnumIterator;
use uuid::Uuid;

use crate::lock;

#[derive(Default)]
struct Tables {
    outbox: HashMap<Uuid, OutboxRecord>,
    inbox: HashMap<MessageId, InboxRecord>,
}

/// Shared in-memory store; clones see the same records.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every store call fail with a storage error until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), CourierError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(CourierError::storage(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "memory store unavailable",
            )))
        } else {
            Ok(())
        }
    }

    /// Run `f` against a fresh session and commit its staged records only
    /// when `f` succeeds.
    pub async fn unit_of_work<F, R>(&self, f: F) -> Result<R, CourierError>
    where
        F: FnOnce(&mut MemorySession) -> Result<R, CourierError>,
    {
        self.check_available()?;
        let mut session = MemorySession::default();
        let value = f(&mut session)?;

        let mut tables = lock(&self.tables);
        if let Some(clash) = session
            .staged
            .iter()
            .find(|r| tables.outbox.contains_key(&r.id))
        {
            return Err(CourierError::Internal(format!(
                "duplicate outbox id {}",
                clash.id
            )));
        }
        for record in session.staged {
            tables.outbox.insert(record.id, record);
        }
        Ok(value)
    }

    /// All outbox records, oldest first.
    pub fn outbox_records(&self) -> Vec<OutboxRecord> {
        let mut records: Vec<_> = lock(&self.tables).outbox.values().cloned().collect();
        records.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        records
    }

    /// All inbox records, oldest first.
    pub fn inbox_records(&self) -> Vec<InboxRecord> {
        let mut records: Vec<_> = lock(&self.tables).inbox.values().cloned().collect();
        records.sort_by(|a, b| (a.received_at, &a.id).cmp(&(b.received_at, &b.id)));
        records
    }
}

/// Unit of work for [`MemoryStore`]: records staged here become visible
/// together on commit, or not at all.
#[derive(Debug, Default)]
pub struct MemorySession {
    staged: Vec<OutboxRecord>,
}

impl MemorySession {
    pub fn staged(&self) -> &[OutboxRecord] {
        &self.staged
    }
}

impl OutboxSession for MemorySession {
    fn stage(&mut self, record: &OutboxRecord) -> Result<(), CourierError> {
        self.staged.push(record.clone());
        Ok(())
    }
}

fn take_sorted<T: Clone, K: Ord>(
    records: impl Iterator<Item = T>,
    key: impl Fn(&T) -> K,
    limit: usize,
) -> Vec<T> {
    let mut out: Vec<T> = records.collect();
    out.sort_by_key(|r| key(r));
    out.truncate(limit);
    out
}

#[async_trait]
impl OutboxStore for MemoryStore {
    async fn insert(&self, record: &OutboxRecord) -> Result<(), CourierError> {
        self.check_available()?;
        let mut tables = lock(&self.tables);
        if tables.outbox.contains_key(&record.id) {
            return Err(CourierError::Internal(format!(
                "duplicate outbox id {}",
                record.id
            )));
        }
        tables.outbox.insert(record.id, record.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<OutboxRecord>, CourierError> {
        self.check_available()?;
        Ok(lock(&self.tables).outbox.get(&id).cloned())
    }

    async fn query_by_status(
        &self,
        statuses: &[OutboxStatus],
        limit: usize,
    ) -> Result<Vec<OutboxRecord>, CourierError> {
        self.check_available()?;
        let tables = lock(&self.tables);
        Ok(take_sorted(
            tables
                .outbox
                .values()
                .filter(|r| statuses.contains(&r.status))
                .cloned(),
            |r| (r.created_at, r.id),
            limit,
        ))
    }

    async fn query_scheduled_ready(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<OutboxRecord>, CourierError> {
        self.check_available()?;
        let tables = lock(&self.tables);
        Ok(take_sorted(
            tables
                .outbox
                .values()
                .filter(|r| match r.status {
                    OutboxStatus::Pending => true,
                    OutboxStatus::Scheduled => r.scheduled_at.is_some_and(|at| at <= now),
                    _ => false,
                })
                .cloned(),
            |r| (r.created_at, r.id),
            limit,
        ))
    }

    async fn query_retryable(
        &self,
        now: DateTime<Utc>,
        max_retries: u32,
        limit: usize,
    ) -> Result<Vec<OutboxRecord>, CourierError> {
        self.check_available()?;
        let tables = lock(&self.tables);
        Ok(take_sorted(
            tables
                .outbox
                .values()
                .filter(|r| {
                    r.status == OutboxStatus::Failed
                        && r.retry_count < max_retries
                        && r.next_attempt_at.is_none_or(|at| at <= now)
                })
                .cloned(),
            |r| (r.created_at, r.id),
            limit,
        ))
    }

    async fn query_exhausted(
        &self,
        max_retries: u32,
        limit: usize,
    ) -> Result<Vec<OutboxRecord>, CourierError> {
        self.check_available()?;
        let tables = lock(&self.tables);
        Ok(take_sorted(
            tables
                .outbox
                .values()
                .filter(|r| r.status == OutboxStatus::Failed && r.retry_count >= max_retries)
                .cloned(),
            |r| (r.created_at, r.id),
            limit,
        ))
    }

    async fn query_stale(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<OutboxRecord>, CourierError> {
        self.check_available()?;
        let tables = lock(&self.tables);
        Ok(take_sorted(
            tables
                .outbox
                .values()
                .filter(|r| {
                    r.status == OutboxStatus::Publishing && r.last_attempt_at.is_none_or(|at| at <= cutoff)
                })
                .cloned(),
            |r| (r.created_at, r.id),
            limit,
        ))
    }

    async fn update_status(
        &self,
        id: Uuid,
        observed: Observed<OutboxStatus>,
        change: OutboxChange,
    ) -> Result<bool, CourierError> {
        change.check_from(observed.status)?;
        self.check_available()?;
        let mut tables = lock(&self.tables);
        match tables.outbox.get_mut(&id) {
            Some(record) if record.observed() == observed => {
                change.apply(record);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_older_than(
        &self,
        cutoff: DateTime<Utc>,
        statuses: &[OutboxStatus],
    ) -> Result<u64, CourierError> {
        self.check_available()?;
        let mut tables = lock(&self.tables);
        let before = tables.outbox.len();
        tables.outbox.retain(|_, r| {
            let finished = r.published_at.or(r.discarded_at).unwrap_or(r.created_at);
            !(statuses.contains(&r.status) && finished < cutoff)
        });
        Ok((before - tables.outbox.len()) as u64)
    }

    async fn count_by_status(&self) -> Result<Vec<(OutboxStatus, u64)>, CourierError> {
        self.check_available()?;
        let tables = lock(&self.tables);
        Ok(OutboxStatus::iter()
            .map(|status| {
                let n = tables.outbox.values().filter(|r| r.status == status).count();
                (status, n as u64)
            })
            .collect())
    }
}

#[async_trait]
impl InboxStore for MemoryStore {
    async fn insert_if_absent(&self, record: &InboxRecord) -> Result<bool, CourierError> {
        self.check_available()?;
        let mut tables = lock(&self.tables);
        if tables.inbox.contains_key(&record.id) {
            return Ok(false);
        }
        tables.inbox.insert(record.id.clone(), record.clone());
        Ok(true)
    }

    async fn get(&self, id: &MessageId) -> Result<Option<InboxRecord>, CourierError> {
        self.check_available()?;
        Ok(lock(&self.tables).inbox.get(id).cloned())
    }

    async fn query_by_status(
        &self,
        statuses: &[InboxStatus],
        limit: usize,
    ) -> Result<Vec<InboxRecord>, CourierError> {
        self.check_available()?;
        let tables = lock(&self.tables);
        Ok(take_sorted(
            tables
                .inbox
                .values()
                .filter(|r| statuses.contains(&r.status))
                .cloned(),
            |r| (r.received_at, r.id.clone()),
            limit,
        ))
    }

    async fn query_retryable(
        &self,
        now: DateTime<Utc>,
        max_retries: u32,
        limit: usize,
    ) -> Result<Vec<InboxRecord>, CourierError> {
        self.check_available()?;
        let tables = lock(&self.tables);
        Ok(take_sorted(
            tables
                .inbox
                .values()
                .filter(|r| {
                    r.status == InboxStatus::Failed
                        && r.retry_count < max_retries
                        && r.next_attempt_at.is_none_or(|at| at <= now)
                })
                .cloned(),
            |r| (r.received_at, r.id.clone()),
            limit,
        ))
    }

    async fn query_exhausted(
        &self,
        max_retries: u32,
        limit: usize,
    ) -> Result<Vec<InboxRecord>, CourierError> {
        self.check_available()?;
        let tables = lock(&self.tables);
        Ok(take_sorted(
            tables
                .inbox
                .values()
                .filter(|r| r.status == InboxStatus::Failed && r.retry_count >= max_retries)
                .cloned(),
            |r| (r.received_at, r.id.clone()),
            limit,
        ))
    }

    async fn query_stale(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<InboxRecord>, CourierError> {
        self.check_available()?;
        let tables = lock(&self.tables);
        Ok(take_sorted(
            tables
                .inbox
                .values()
                .filter(|r| {
                    r.status == InboxStatus::Processing && r.last_attempt_at.is_none_or(|at| at <= cutoff)
                })
                .cloned(),
            |r| (r.received_at, r.id.clone()),
            limit,
        ))
    }

    async fn update_status(
        &self,
        id: &MessageId,
        observed: Observed<InboxStatus>,
        change: InboxChange,
    ) -> Result<bool, CourierError> {
        change.check_from(observed.status)?;
        self.check_available()?;
        let mut tables = lock(&self.tables);
        match tables.inbox.get_mut(id) {
            Some(record) if record.observed() == observed => {
                change.apply(record);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_older_than(
        &self,
        cutoff: DateTime<Utc>,
        statuses: &[InboxStatus],
    ) -> Result<u64, CourierError> {
        self.check_available()?;
        let mut tables = lock(&self.tables);
        let before = tables.inbox.len();
        tables.inbox.retain(|_, r| {
            let finished = r.processed_at.or(r.discarded_at).unwrap_or(r.received_at);
            !(statuses.contains(&r.status) && finished < cutoff)
        });
        Ok((before - tables.inbox.len()) as u64)
    }

    async fn count_by_status(&self) -> Result<Vec<(InboxStatus, u64)>, CourierError> {
        self.check_available()?;
        let tables = lock(&self.tables);
        Ok(InboxStatus::iter()
            .map(|status| {
                let n = tables.inbox.values().filter(|r| r.status == status).count();
                (status, n as u64)
            })
            .collect())
    }
}
