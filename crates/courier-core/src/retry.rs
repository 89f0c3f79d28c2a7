// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retry bounds and backoff between attempts.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// How many times a record may fail and how long to wait between attempts.
///
/// Values come from configuration; nothing here has a default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Failed attempts allowed before a record is discarded.
    pub max_retries: u32,
    /// Delay after the first failure. Zero disables backoff.
    pub initial_backoff: Duration,
    /// Upper bound for the doubled delay.
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Whether a record with `retry_count` failures must be discarded.
    pub fn is_exhausted(&self, retry_count: u32) -> bool {
        retry_count >= self.max_retries
    }

    /// Delay before the next attempt of a record that failed `retry_count` times.
    pub fn backoff(&self, retry_count: u32) -> Duration {
        if retry_count == 0 || self.initial_backoff.is_zero() {
            return Duration::ZERO;
        }
        let shift = (retry_count - 1).min(31);
        let delay = self
            .initial_backoff
            .checked_mul(1u32 << shift)
            .unwrap_or(self.max_backoff);
        delay.min(self.max_backoff)
    }

    /// When a record that has now failed `failures` times may run again.
    pub fn retry_at(&self, failures: u32, failed_at: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::from_std(self.backoff(failures))
            .ok()
            .and_then(|wait| failed_at.checked_add_signed(wait))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}
