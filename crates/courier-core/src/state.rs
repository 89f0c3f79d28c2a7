// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Record state machines.
//!
//! Outbox: `Pending|Scheduled -> Publishing -> Published`, with
//! `Publishing -> Failed -> Publishing` retries and `-> Discarded` once
//! retries are exhausted or the sink rejects the message permanently.
//! Inbox mirrors it with `Processing`/`Processed`.
//!
//! An attempt abandoned by a crashed worker is reclaimed as
//! `Publishing -> Failed` (or `Processing -> Failed`), so it is charged
//! against the retry budget like any other failure.

use chrono::{DateTime, Utc};

use crate::error::CourierError;
use crate::types::{Failure, InboxRecord, InboxStatus, OutboxRecord, OutboxStatus};

/// Snapshot of the fields an optimistic update is conditioned on.
///
/// An update applies only if the stored record still has this status and
/// this `last_attempt_at`; otherwise another worker got there first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observed<S> {
    pub status: S,
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl OutboxStatus {
    pub fn can_transition_to(self, next: OutboxStatus) -> bool {
        use OutboxStatus::*;
        matches!(
            (self, next),
            (Pending, Publishing)
                | (Scheduled, Publishing)
                | (Publishing, Published)
                | (Publishing, Failed)
                | (Publishing, Discarded)
                | (Failed, Publishing)
                | (Failed, Discarded)
        )
    }
}

impl InboxStatus {
    pub fn can_transition_to(self, next: InboxStatus) -> bool {
        use InboxStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Processed)
                | (Processing, Failed)
                | (Processing, Discarded)
                | (Failed, Processing)
                | (Failed, Discarded)
        )
    }
}

/// A single status change applied to an outbox record.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboxChange {
    /// An attempt is in flight.
    Publishing { at: DateTime<Utc> },
    Published { at: DateTime<Utc> },
    /// The attempt failed; bumps `retry_count`. The record is not retried
    /// before `retry_at`.
    Failed {
        at: DateTime<Utc>,
        failure: Failure,
        retry_at: DateTime<Utc>,
    },
    Discarded { at: DateTime<Utc>, reason: String },
}

impl OutboxChange {
    pub fn target(&self) -> OutboxStatus {
        match self {
            Self::Publishing { .. } => OutboxStatus::Publishing,
            Self::Published { .. } => OutboxStatus::Published,
            Self::Failed { .. } => OutboxStatus::Failed,
            Self::Discarded { .. } => OutboxStatus::Discarded,
        }
    }

    /// Reject the change if the state machine does not allow it from `from`.
    pub fn check_from(&self, from: OutboxStatus) -> Result<(), CourierError> {
        let to = self.target();
        if from.can_transition_to(to) {
            Ok(())
        } else {
            Err(CourierError::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            })
        }
    }

    /// Apply the change to an in-memory record.
    pub fn apply(&self, record: &mut OutboxRecord) {
        record.status = self.target();
        match self {
            Self::Publishing { at } => {
                record.last_attempt_at = Some(*at);
            }
            Self::Published { at } => {
                record.published_at = Some(*at);
            }
            Self::Failed {
                at,
                failure,
                retry_at,
            } => {
                record.last_attempt_at = Some(*at);
                record.next_attempt_at = Some(*retry_at);
                record.retry_count += 1;
                record.error_message = Some(failure.message.clone());
                record.error_detail = failure.detail.clone();
            }
            Self::Discarded { at, reason } => {
                record.discarded_at = Some(*at);
                record.error_message = Some(reason.clone());
            }
        }
    }
}

/// A single status change applied to an inbox record.
#[derive(Debug, Clone, PartialEq)]
pub enum InboxChange {
    Processing { at: DateTime<Utc> },
    Processed { at: DateTime<Utc> },
    Failed {
        at: DateTime<Utc>,
        failure: Failure,
        retry_at: DateTime<Utc>,
    },
    Discarded { at: DateTime<Utc>, reason: String },
}

impl InboxChange {
    pub fn target(&self) -> InboxStatus {
        match self {
            Self::Processing { .. } => InboxStatus::Processing,
            Self::Processed { .. } => InboxStatus::Processed,
            Self::Failed { .. } => InboxStatus::Failed,
            Self::Discarded { .. } => InboxStatus::Discarded,
        }
    }

    pub fn check_from(&self, from: InboxStatus) -> Result<(), CourierError> {
        let to = self.target();
        if from.can_transition_to(to) {
            Ok(())
        } else {
            Err(CourierError::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            })
        }
    }

    pub fn apply(&self, record: &mut InboxRecord) {
        record.status = self.target();
        match self {
            Self::Processing { at } => {
                record.last_attempt_at = Some(*at);
            }
            Self::Processed { at } => {
                record.processed_at = Some(*at);
            }
            Self::Failed {
                at,
                failure,
                retry_at,
            } => {
                record.last_attempt_at = Some(*at);
                record.next_attempt_at = Some(*retry_at);
                record.retry_count += 1;
                record.error_message = Some(failure.message.clone());
                record.error_detail = failure.detail.clone();
            }
            Self::Discarded { at, reason } => {
                record.discarded_at = Some(*at);
                record.error_message = Some(reason.clone());
            }
        }
    }
}
