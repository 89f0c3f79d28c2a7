// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for Courier, a transactional outbox / inbox for reliable
//! event delivery.
//!
//! This crate defines the message records and their state machines, the
//! error types, and the traits implemented by stores, sinks and inbox
//! actions. It contains no I/O.

pub mod clock;
pub mod error;
pub mod retry;
pub mod state;
pub mod traits;
pub mod types;

pub use clock::{Clock, SystemClock};
pub use error::{CourierError, DeliveryError};
pub use retry::RetryPolicy;
pub use state::{InboxChange, Observed, OutboxChange};
pub use types::{
    AdmitOutcome, Envelope, Failure, InboundMessage, InboxRecord, InboxStatus, MessageId,
    OutboxRecord, OutboxStatus, OutgoingMessage,
};

pub use traits::{
    DispatchSink, InboxAction, InboxStore, OutboxSession, OutboxStore, PeriodicTask,
};
