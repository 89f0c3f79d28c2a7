// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stages outbox records in the caller's unit of work.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use courier_core::{Clock, CourierError, OutboxRecord, OutboxSession, OutgoingMessage, SystemClock};
use tracing::debug;
use uuid::Uuid;

/// Records events as part of a business transaction.
///
/// The writer never commits and never dispatches: the record becomes durable
/// when the caller's session commits, and the publisher picks it up from
/// there. A rolled-back session leaves no record behind.
#[derive(Clone)]
pub struct OutboxWriter {
    clock: Arc<dyn Clock>,
}

impl OutboxWriter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Stage `message` for publishing on the next publisher pass.
    pub fn append<S>(&self, session: &mut S, message: OutgoingMessage) -> Result<Uuid, CourierError>
    where
        S: OutboxSession + ?Sized,
    {
        self.stage(session, message, None)
    }

    /// Stage `message` for publishing no earlier than `scheduled_at`.
    pub fn schedule<S>(
        &self,
        session: &mut S,
        message: OutgoingMessage,
        scheduled_at: DateTime<Utc>,
    ) -> Result<Uuid, CourierError>
    where
        S: OutboxSession + ?Sized,
    {
        self.stage(session, message, Some(scheduled_at))
    }

    fn stage<S>(
        &self,
        session: &mut S,
        message: OutgoingMessage,
        scheduled_at: Option<DateTime<Utc>>,
    ) -> Result<Uuid, CourierError>
    where
        S: OutboxSession + ?Sized,
    {
        message.validate()?;
        let record = OutboxRecord::new(message, self.clock.now(), scheduled_at);
        session.stage(&record)?;
        debug!(
            record_id = %record.id,
            message_type = %record.message_type,
            destination = %record.destination,
            status = %record.status,
            "outbox record staged"
        );
        Ok(record.id)
    }
}

impl Default for OutboxWriter {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}
