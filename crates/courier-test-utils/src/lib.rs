// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Courier.
//!
//! Provides an in-memory record store and scripted collaborators for fast,
//! deterministic tests without a database or network.
//!
//! # Components
//!
//! - [`MemoryStore`] - In-memory outbox and inbox store with a unit of work
//! - [`ManualClock`] - Clock that only moves when told to
//! - [`MockSink`] - Dispatch sink with scripted outcomes and captured envelopes
//! - [`MockAction`] - Inbox action with scripted outcomes and captured messages

pub mod clock;
pub mod memory_store;
pub mod mock_action;
pub mod mock_sink;
pub mod script;

pub use clock::ManualClock;
pub use memory_store::{MemorySession, MemoryStore};
pub use mock_action::MockAction;
pub use mock_sink::MockSink;
pub use script::Outcome;

/// Lock a std mutex, ignoring poisoning from a panicked test thread.
pub(crate) fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
