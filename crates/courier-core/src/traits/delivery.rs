// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Caller-supplied collaborators: where outbox records go and what inbox
//! records trigger.

use async_trait::async_trait;

use crate::error::DeliveryError;
use crate::types::{Envelope, InboundMessage};

/// External destination for published outbox records (a broker, a webhook).
///
/// Delivery is at-least-once: the same envelope id may be sent more than
/// once, so receivers should deduplicate on it.
#[async_trait]
pub trait DispatchSink: Send + Sync + 'static {
    async fn send(&self, envelope: &Envelope) -> Result<(), DeliveryError>;
}

/// Business action run for an admitted inbox message.
#[async_trait]
pub trait InboxAction: Send + Sync + 'static {
    async fn invoke(&self, message: &InboundMessage) -> Result<(), DeliveryError>;
}
