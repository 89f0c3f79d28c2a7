// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A unit of recurring work driven by the periodic runner.

use async_trait::async_trait;

use crate::error::CourierError;

/// One pass of a polling worker (publish, process, sweep).
///
/// A pass runs to completion once started; the runner only checks for
/// shutdown between passes.
#[async_trait]
pub trait PeriodicTask: Send + Sync + 'static {
    /// Name used in log fields.
    fn name(&self) -> &str;

    async fn tick(&self) -> Result<(), CourierError>;
}
