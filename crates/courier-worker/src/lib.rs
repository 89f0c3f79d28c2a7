// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Background workers for Courier.
//!
//! [`spawn_periodic`] drives any [`PeriodicTask`](courier_core::PeriodicTask)
//! on a fixed interval until its [`CancellationToken`](tokio_util::sync::CancellationToken)
//! fires. The publisher, the inbox processor and the [`RetentionSweeper`] all
//! run this way.

pub mod runner;
pub mod shutdown;
pub mod sweeper;

pub use runner::spawn_periodic;
pub use shutdown::install_signal_handler;
pub use sweeper::{RetentionSweeper, SweepReport, SweepSettings};
