// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait seams between the delivery machinery and its collaborators.
//!
//! All async traits use `#[async_trait]` so they can be held as trait objects.

pub mod delivery;
pub mod store;
pub mod task;

pub use delivery::{DispatchSink, InboxAction};
pub use store::{InboxStore, OutboxSession, OutboxStore};
pub use task::PeriodicTask;
