// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transactional outbox for Courier.
//!
//! [`OutboxWriter`] stages events inside the caller's unit of work so they
//! commit together with the business change. [`OutboxPublisher`] later moves
//! staged records to the dispatch sink, retrying failures with backoff and
//! discarding poison records.

pub mod publisher;
pub mod writer;

pub use publisher::{
    ABANDONED_IN_FLIGHT, MAX_RETRIES_EXCEEDED, OutboxPublisher, PublishReport, PublisherSettings,
};
pub use writer::OutboxWriter;
