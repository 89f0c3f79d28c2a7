// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `courier serve`: run the background workers until a shutdown signal.

use std::sync::Arc;

use courier_config::model::CourierConfig;
use courier_core::{Clock, CourierError, SystemClock};
use courier_inbox::{HandlerRegistry, InboxProcessor, ProcessorSettings};
use courier_outbox::{OutboxPublisher, PublisherSettings};
use courier_storage::SqliteStore;
use courier_worker::{RetentionSweeper, SweepSettings, install_signal_handler, spawn_periodic};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::forward::WebhookAction;
use crate::sink::build_sink;

pub async fn run_serve(config: CourierConfig) -> Result<(), CourierError> {
    let store = SqliteStore::open(&config.storage).await?;
    let cancel = install_signal_handler();

    let workers = match spawn_workers(&config, &store, cancel.clone()) {
        Ok(workers) => workers,
        Err(e) => {
            cancel.cancel();
            store.close().await?;
            return Err(e);
        }
    };
    info!(
        database = %config.storage.database_path,
        workers = workers.len(),
        "courier started"
    );

    cancel.cancelled().await;
    for worker in workers {
        if let Err(e) = worker.await {
            warn!(error = %e, "worker task ended abnormally");
        }
    }
    store.close().await?;
    info!("courier stopped");
    Ok(())
}

/// Start every enabled worker on the shared store.
fn spawn_workers(
    config: &CourierConfig,
    store: &SqliteStore,
    cancel: CancellationToken,
) -> Result<Vec<JoinHandle<()>>, CourierError> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let mut workers = Vec::new();

    if config.outbox.enabled {
        let sink = build_sink(&config.sink, config.outbox.dispatch_timeout())?;
        let publisher = OutboxPublisher::new(
            Arc::new(store.clone()),
            sink,
            clock.clone(),
            PublisherSettings::from_config(&config.outbox),
        );
        workers.push(spawn_periodic(
            Arc::new(publisher),
            config.outbox.poll_interval(),
            cancel.clone(),
        ));
    } else {
        info!("outbox publisher disabled");
    }

    match (&config.inbox.forward_url, config.inbox.enabled) {
        (Some(url), true) => {
            let action = WebhookAction::new(url.clone(), config.inbox.handler_timeout())?;
            let registry = HandlerRegistry::new().with_fallback(Arc::new(action));
            let processor = InboxProcessor::new(
                Arc::new(store.clone()),
                registry,
                clock.clone(),
                ProcessorSettings::from_config(&config.inbox),
            );
            workers.push(spawn_periodic(
                Arc::new(processor),
                config.inbox.poll_interval(),
                cancel.clone(),
            ));
        }
        (None, true) => info!("inbox processor not started: inbox.forward_url is unset"),
        (_, false) => info!("inbox processor disabled"),
    }

    let sweeper = RetentionSweeper::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        clock,
        SweepSettings::from_config(&config.retention),
    );
    workers.push(spawn_periodic(
        Arc::new(sweeper),
        config.retention.sweep_interval(),
        cancel,
    ));

    Ok(workers)
}
