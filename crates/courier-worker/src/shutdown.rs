// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turns SIGINT/SIGTERM into cancellation of the worker token.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Returns a token that is cancelled on the first SIGINT or SIGTERM.
///
/// Cancelling the token directly also stops the listener task.
pub fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let watched = token.clone();

    tokio::spawn(async move {
        tokio::select! {
            signal = next_signal() => {
                info!(signal, "shutdown signal received, stopping workers");
                watched.cancel();
            }
            () = watched.cancelled() => debug!("cancelled without a signal"),
        }
    });

    token
}

#[cfg(unix)]
async fn next_signal() -> &'static str {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate()).expect("SIGTERM handler must install");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => "SIGINT",
        _ = terminate.recv() => "SIGTERM",
    }
}

#[cfg(not(unix))]
async fn next_signal() -> &'static str {
    let _ = tokio::signal::ctrl_c().await;
    "ctrl-c"
}
