// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixed-interval loop around a [`PeriodicTask`].

use std::sync::Arc;
use std::time::Duration;

use courier_core::PeriodicTask;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

/// Run `task` every `interval` until `cancel` fires.
///
/// The first pass runs immediately. Cancellation is only observed between
/// passes: a pass that has started always finishes its batch. A failed pass
/// is logged and the loop carries on at the next tick.
pub fn spawn_periodic(
    task: Arc<dyn PeriodicTask>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let span = info_span!("worker", task = task.name());
    tokio::spawn(
        async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_ms = interval.as_millis() as u64, "worker started");

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        info!("worker shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        match task.tick().await {
                            Ok(()) => debug!("pass finished"),
                            Err(e) => warn!(error = %e, "pass failed (non-fatal)"),
                        }
                    }
                }
            }
        }
        .instrument(span),
    )
}
