// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Idempotent admission of inbound messages.

use std::sync::Arc;
use std::time::Duration;

use courier_core::{
    AdmitOutcome, Clock, CourierError, DeliveryError, Failure, InboundMessage, InboxChange,
    InboxRecord, InboxStatus, InboxStore, MessageId, RetryPolicy, SystemClock,
};
use tracing::{debug, info, warn};

use crate::processor::ProcessorSettings;
use crate::registry::HandlerRegistry;

/// Reason stored on records whose message type has no registered action.
pub const NO_HANDLER: &str = "no handler registered";

/// Limit on an inline action run by [`InboxGuard::admit_and_handle`].
pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(30);

/// Deduplicates inbound messages by producer id.
///
/// A message id is admitted at most once for as long as its inbox record is
/// retained; every later delivery of the same id reports
/// [`AdmitOutcome::Duplicate`] and leaves the stored record untouched.
#[derive(Clone)]
pub struct InboxGuard {
    store: Arc<dyn InboxStore>,
    clock: Arc<dyn Clock>,
    handler_timeout: Duration,
    retry: Option<RetryPolicy>,
}

impl InboxGuard {
    /// Without a retry policy, failed records are retryable immediately.
    pub fn new(store: Arc<dyn InboxStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            handler_timeout: DEFAULT_HANDLER_TIMEOUT,
            retry: None,
        }
    }

    /// Use the processor's action timeout and backoff for inline handling.
    pub fn with_settings(mut self, settings: &ProcessorSettings) -> Self {
        self.handler_timeout = settings.handler_timeout;
        self.retry = Some(settings.retry);
        self
    }

    pub fn with_system_clock(store: Arc<dyn InboxStore>) -> Self {
        Self::new(store, Arc::new(SystemClock))
    }

    /// Admit `message` for immediate handling by the caller.
    ///
    /// On `Admitted` the record is `Processing`; the caller must follow up
    /// with [`mark_processed`](Self::mark_processed) or
    /// [`mark_failed`](Self::mark_failed).
    pub async fn try_admit(&self, message: InboundMessage) -> Result<AdmitOutcome, CourierError> {
        self.admit(message, InboxStatus::Processing).await
    }

    /// Admit `message` as `Pending`, leaving all handling to the processor.
    pub async fn try_admit_deferred(
        &self,
        message: InboundMessage,
    ) -> Result<AdmitOutcome, CourierError> {
        self.admit(message, InboxStatus::Pending).await
    }

    async fn admit(
        &self,
        message: InboundMessage,
        status: InboxStatus,
    ) -> Result<AdmitOutcome, CourierError> {
        message.validate()?;
        let record = InboxRecord::received(message, status, self.clock.now());
        if self.store.insert_if_absent(&record).await? {
            debug!(
                message_id = %record.id,
                message_type = %record.message_type,
                status = %record.status,
                "inbox message admitted"
            );
            Ok(AdmitOutcome::Admitted)
        } else {
            info!(
                message_id = %record.id,
                message_type = %record.message_type,
                "duplicate inbox message ignored"
            );
            Ok(AdmitOutcome::Duplicate)
        }
    }

    /// `Processing -> Processed`.
    pub async fn mark_processed(&self, id: &MessageId) -> Result<(), CourierError> {
        let at = self.clock.now();
        self.transition(id, |_| InboxChange::Processed { at }).await
    }

    /// `Processing -> Failed`; the processor retries the record later.
    pub async fn mark_failed(
        &self,
        id: &MessageId,
        error: &(dyn std::error::Error + 'static),
    ) -> Result<(), CourierError> {
        let at = self.clock.now();
        let failure = Failure::from_error(error);
        self.transition(id, |record| InboxChange::Failed {
            at,
            failure,
            retry_at: self
                .retry
                .map_or(at, |policy| policy.retry_at(record.retry_count + 1, at)),
        })
        .await
    }

    async fn transition(
        &self,
        id: &MessageId,
        change: impl FnOnce(&InboxRecord) -> InboxChange,
    ) -> Result<(), CourierError> {
        let record = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| CourierError::NotFound { id: id.to_string() })?;
        let change = change(&record);
        let target = change.target();
        if self.store.update_status(id, record.observed(), change).await? {
            debug!(message_id = %id, status = %target, "inbox record updated");
            Ok(())
        } else {
            // Another worker changed the record between our read and write.
            Err(CourierError::InvalidTransition {
                from: record.status.to_string(),
                to: target.to_string(),
            })
        }
    }

    /// Admit `message` and run its registered action once.
    ///
    /// Duplicates return without invoking anything. A transient action
    /// failure leaves the record `Failed` for the processor to retry; a
    /// permanent failure, or a type with no registered action, discards it.
    pub async fn admit_and_handle(
        &self,
        message: InboundMessage,
        registry: &HandlerRegistry,
    ) -> Result<AdmitOutcome, CourierError> {
        let outcome = self.try_admit(message.clone()).await?;
        if outcome == AdmitOutcome::Duplicate {
            return Ok(outcome);
        }

        let Some(action) = registry.resolve(&message.message_type) else {
            warn!(
                message_id = %message.id,
                message_type = %message.message_type,
                "no inbox action registered, discarding"
            );
            let change = InboxChange::Discarded {
                at: self.clock.now(),
                reason: NO_HANDLER.to_string(),
            };
            self.transition(&message.id, |_| change).await?;
            return Ok(outcome);
        };

        let timeout = self.handler_timeout;
        let result = match tokio::time::timeout(timeout, action.invoke(&message)).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout { duration: timeout }),
        };
        match result {
            Ok(()) => self.mark_processed(&message.id).await?,
            Err(e) if e.is_permanent() => {
                warn!(
                    message_id = %message.id,
                    error = %e,
                    "inbox action rejected message, discarding"
                );
                let change = InboxChange::Discarded {
                    at: self.clock.now(),
                    reason: e.to_string(),
                };
                self.transition(&message.id, |_| change).await?;
            }
            Err(e) => {
                warn!(message_id = %message.id, error = %e, "inbox action failed, will retry");
                self.mark_failed(&message.id, &e).await?;
            }
        }
        Ok(outcome)
    }
}
