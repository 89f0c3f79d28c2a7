// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Record and message types shared by the outbox and inbox.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use uuid::Uuid;

use crate::error::CourierError;

/// Producer-assigned message identifier, used as the inbox deduplication key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for MessageId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<Uuid> for MessageId {
    fn from(value: Uuid) -> Self {
        Self(value.to_string())
    }
}

/// Lifecycle status of an outbox record.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    Pending,
    Scheduled,
    Publishing,
    Published,
    Failed,
    Discarded,
}

impl OutboxStatus {
    /// Terminal statuses are never left again and are eligible for purging.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Published | Self::Discarded)
    }
}

/// Lifecycle status of an inbox record.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum InboxStatus {
    Pending,
    Processing,
    Processed,
    Failed,
    Discarded,
}

impl InboxStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Processed | Self::Discarded)
    }
}

/// Diagnostics captured from the most recent failed attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    /// Top-level error message.
    pub message: String,
    /// The error's source chain, one cause per line.
    pub detail: Option<String>,
}

impl Failure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            detail: None,
        }
    }

    /// Capture an error and its chain of sources.
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut causes = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            causes.push(format!("caused by: {cause}"));
            source = cause.source();
        }
        Self {
            message: err.to_string(),
            detail: if causes.is_empty() {
                None
            } else {
                Some(causes.join("\n"))
            },
        }
    }
}

/// A durable outbox record awaiting or past publication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxRecord {
    pub id: Uuid,
    pub message_type: String,
    pub payload: String,
    pub destination: String,
    pub correlation_id: Option<String>,
    pub status: OutboxStatus,
    pub created_at: DateTime<Utc>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Earliest time a `Failed` record may be retried.
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub error_message: Option<String>,
    pub error_detail: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub discarded_at: Option<DateTime<Utc>>,
}

impl OutboxRecord {
    /// Build a fresh record from an outgoing message.
    ///
    /// The record is `Scheduled` when `scheduled_at` is given, `Pending` otherwise.
    pub fn new(
        message: OutgoingMessage,
        created_at: DateTime<Utc>,
        scheduled_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            message_type: message.message_type,
            payload: message.payload,
            destination: message.destination,
            correlation_id: message.correlation_id,
            status: if scheduled_at.is_some() {
                OutboxStatus::Scheduled
            } else {
                OutboxStatus::Pending
            },
            created_at,
            scheduled_at,
            last_attempt_at: None,
            next_attempt_at: None,
            retry_count: 0,
            error_message: None,
            error_detail: None,
            published_at: None,
            discarded_at: None,
        }
    }

    /// The state an optimistic update must still find.
    pub fn observed(&self) -> crate::state::Observed<OutboxStatus> {
        crate::state::Observed {
            status: self.status,
            last_attempt_at: self.last_attempt_at,
        }
    }

    /// Whether a scheduled record may already be dispatched at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.scheduled_at {
            Some(at) => at <= now,
            None => true,
        }
    }

    /// Envelope handed to a dispatch sink.
    pub fn envelope(&self) -> Envelope {
        Envelope {
            id: self.id,
            destination: self.destination.clone(),
            message_type: self.message_type.clone(),
            payload: self.payload.clone(),
            correlation_id: self.correlation_id.clone(),
        }
    }
}

/// A durable inbox record keyed by the producer's message id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboxRecord {
    pub id: MessageId,
    pub message_type: String,
    pub payload: String,
    pub destination: Option<String>,
    pub correlation_id: Option<String>,
    pub status: InboxStatus,
    pub received_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Earliest time a `Failed` record may be retried.
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub error_message: Option<String>,
    pub error_detail: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub discarded_at: Option<DateTime<Utc>>,
}

impl InboxRecord {
    /// Build a record for a just-received message in the given initial status.
    pub fn received(message: InboundMessage, status: InboxStatus, now: DateTime<Utc>) -> Self {
        let last_attempt_at = (status == InboxStatus::Processing).then_some(now);
        Self {
            id: message.id,
            message_type: message.message_type,
            payload: message.payload,
            destination: message.destination,
            correlation_id: message.correlation_id,
            status,
            received_at: now,
            last_attempt_at,
            next_attempt_at: None,
            retry_count: 0,
            error_message: None,
            error_detail: None,
            processed_at: None,
            discarded_at: None,
        }
    }

    pub fn observed(&self) -> crate::state::Observed<InboxStatus> {
        crate::state::Observed {
            status: self.status,
            last_attempt_at: self.last_attempt_at,
        }
    }

    /// Rebuild the inbound message for redelivery to an action.
    pub fn message(&self) -> InboundMessage {
        InboundMessage {
            id: self.id.clone(),
            message_type: self.message_type.clone(),
            payload: self.payload.clone(),
            destination: self.destination.clone(),
            correlation_id: self.correlation_id.clone(),
        }
    }
}

/// An event the business code wants published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub message_type: String,
    pub payload: String,
    pub destination: String,
    pub correlation_id: Option<String>,
}

impl OutgoingMessage {
    pub fn new(
        message_type: impl Into<String>,
        payload: impl Into<String>,
        destination: impl Into<String>,
    ) -> Self {
        Self {
            message_type: message_type.into(),
            payload: payload.into(),
            destination: destination.into(),
            correlation_id: None,
        }
    }

    /// Serialize `payload` as JSON.
    pub fn json<T: Serialize>(
        message_type: impl Into<String>,
        payload: &T,
        destination: impl Into<String>,
    ) -> Result<Self, CourierError> {
        let payload = serde_json::to_string(payload)
            .map_err(|e| CourierError::validation("payload", e.to_string()))?;
        Ok(Self::new(message_type, payload, destination))
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Reject empty type, payload or destination.
    pub fn validate(&self) -> Result<(), CourierError> {
        if self.message_type.trim().is_empty() {
            return Err(CourierError::validation("message_type", "must not be empty"));
        }
        if self.payload.trim().is_empty() {
            return Err(CourierError::validation("payload", "must not be empty"));
        }
        if self.destination.trim().is_empty() {
            return Err(CourierError::validation("destination", "must not be empty"));
        }
        Ok(())
    }
}

/// A message received from the transport, before admission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: MessageId,
    pub message_type: String,
    pub payload: String,
    pub destination: Option<String>,
    pub correlation_id: Option<String>,
}

impl InboundMessage {
    pub fn new(
        id: impl Into<MessageId>,
        message_type: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            message_type: message_type.into(),
            payload: payload.into(),
            destination: None,
            correlation_id: None,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    pub fn validate(&self) -> Result<(), CourierError> {
        if self.id.0.trim().is_empty() {
            return Err(CourierError::validation("message_id", "must not be empty"));
        }
        if self.message_type.trim().is_empty() {
            return Err(CourierError::validation("message_type", "must not be empty"));
        }
        Ok(())
    }

    /// Deserialize the JSON payload.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.payload)
    }
}

/// What a dispatch sink receives for one outbox record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub id: Uuid,
    pub destination: String,
    pub message_type: String,
    pub payload: String,
    pub correlation_id: Option<String>,
}

/// Result of presenting an inbound message to the inbox guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmitOutcome {
    /// First delivery; the caller should run its handler.
    Admitted,
    /// The id was seen before; the handler must not run again.
    Duplicate,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn status_strings_round_trip() {
        for status in [OutboxStatus::Pending, OutboxStatus::Publishing, OutboxStatus::Discarded] {
            assert_eq!(OutboxStatus::from_str(&status.to_string()).unwrap(), status);
        }
        assert_eq!(InboxStatus::Processed.to_string(), "processed");
    }

    #[test]
    fn new_record_is_pending_or_scheduled() {
        let msg = OutgoingMessage::new("OrderCreated", "{}", "orders.events");
        let pending = OutboxRecord::new(msg.clone(), now(), None);
        assert_eq!(pending.status, OutboxStatus::Pending);
        assert!(pending.is_due(now()));

        let later = now() + chrono::Duration::hours(1);
        let scheduled = OutboxRecord::new(msg, now(), Some(later));
        assert_eq!(scheduled.status, OutboxStatus::Scheduled);
        assert!(!scheduled.is_due(now()));
        assert!(scheduled.is_due(later));
    }

    #[test]
    fn outgoing_message_rejects_blank_fields() {
        let err = OutgoingMessage::new(" ", "{}", "orders").validate().unwrap_err();
        assert!(matches!(err, CourierError::Validation { field: "message_type", .. }));

        let err = OutgoingMessage::new("T", "", "orders").validate().unwrap_err();
        assert!(matches!(err, CourierError::Validation { field: "payload", .. }));

        let err = OutgoingMessage::new("T", "{}", "").validate().unwrap_err();
        assert!(matches!(err, CourierError::Validation { field: "destination", .. }));

        assert!(OutgoingMessage::new("T", "{}", "orders").validate().is_ok());
    }

    #[test]
    fn json_payload_is_serialized() {
        #[derive(Serialize)]
        struct OrderCreated {
            order_id: u32,
        }
        let msg = OutgoingMessage::json("OrderCreated", &OrderCreated { order_id: 7 }, "orders")
            .unwrap()
            .with_correlation_id("corr-1");
        assert_eq!(msg.payload, r#"{"order_id":7}"#);
        assert_eq!(msg.correlation_id.as_deref(), Some("corr-1"));
    }

    #[test]
    fn failure_captures_source_chain() {
        let inner = std::io::Error::other("connection reset");
        let err = crate::error::DeliveryError::transient_from("send failed", inner);
        let failure = Failure::from_error(&err);
        assert_eq!(failure.message, "transient delivery failure: send failed");
        assert_eq!(failure.detail.as_deref(), Some("caused by: connection reset"));
    }

    #[test]
    fn admitted_inbox_record_starts_processing() {
        let msg = InboundMessage::new("msg-42", "PaymentReceived", "{}");
        let record = InboxRecord::received(msg, InboxStatus::Processing, now());
        assert_eq!(record.last_attempt_at, Some(now()));
        assert_eq!(record.retry_count, 0);

        let deferred = InboxRecord::received(record.message(), InboxStatus::Pending, now());
        assert_eq!(deferred.last_attempt_at, None);
    }
}
