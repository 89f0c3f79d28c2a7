// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `courier status` and `courier purge`.

use std::sync::Arc;

use courier_config::model::CourierConfig;
use courier_core::{Clock, CourierError, InboxStore, OutboxStore, SystemClock};
use courier_storage::SqliteStore;
use courier_worker::{RetentionSweeper, SweepSettings};
use serde::Serialize;

/// Record counts for `--json` output.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub database: String,
    pub outbox: Vec<StatusCount>,
    pub inbox: Vec<StatusCount>,
}

#[derive(Debug, Serialize)]
pub struct StatusCount {
    pub status: String,
    pub count: u64,
}

/// Count records per status in the configured database.
pub async fn run_status(config: &CourierConfig, json: bool) -> Result<(), CourierError> {
    let store = SqliteStore::open(&config.storage).await?;
    let response = collect_status(&store, &config.storage.database_path).await;
    store.close().await?;
    let response = response?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&response).unwrap_or_else(|_| "{}".to_string())
        );
    } else {
        print!("{}", render_table(&response));
    }
    Ok(())
}

async fn collect_status(
    store: &SqliteStore,
    database: &str,
) -> Result<StatusResponse, CourierError> {
    let outbox = OutboxStore::count_by_status(store)
        .await?
        .into_iter()
        .map(|(status, count)| StatusCount {
            status: status.to_string(),
            count,
        })
        .collect();
    let inbox = InboxStore::count_by_status(store)
        .await?
        .into_iter()
        .map(|(status, count)| StatusCount {
            status: status.to_string(),
            count,
        })
        .collect();
    Ok(StatusResponse {
        database: database.to_string(),
        outbox,
        inbox,
    })
}

fn render_table(response: &StatusResponse) -> String {
    let mut out = String::new();
    out.push_str("\n  courier status\n");
    out.push_str(&format!("  {}\n", "-".repeat(35)));
    out.push_str(&format!("    Database: {}\n", response.database));
    for (title, counts) in [("Outbox", &response.outbox), ("Inbox", &response.inbox)] {
        out.push_str(&format!("\n    {title}\n"));
        for c in counts {
            out.push_str(&format!("      {:<12} {:>8}\n", c.status, c.count));
        }
    }
    out.push('\n');
    out
}

/// Run one retention sweep against the configured database.
pub async fn run_purge(config: &CourierConfig) -> Result<(), CourierError> {
    let store = SqliteStore::open(&config.storage).await?;
    let sweeper = RetentionSweeper::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(SystemClock),
        SweepSettings::from_config(&config.retention),
    );
    let report = sweeper.purge(SystemClock.now()).await;
    store.close().await?;
    let report = report?;
    println!(
        "courier purge: deleted {} outbox and {} inbox records",
        report.outbox_deleted, report.inbox_deleted
    );
    Ok(())
}
