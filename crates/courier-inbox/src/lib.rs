// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbox side of Courier.
//!
//! [`InboxGuard`] admits inbound messages exactly once per producer id, and
//! [`InboxProcessor`] drives deferred and failed records through the
//! actions registered in a [`HandlerRegistry`].

pub mod guard;
pub mod processor;
pub mod registry;

pub use guard::InboxGuard;
pub use processor::{ABANDONED_IN_FLIGHT, InboxProcessor, ProcessReport, ProcessorSettings};
pub use registry::HandlerRegistry;
