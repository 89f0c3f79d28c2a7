// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Schema for the outbox and inbox tables, applied on every open.

use courier_core::CourierError;

refinery::embed_migrations!("migrations");

/// Bring the schema up to date. Already-applied versions are skipped.
pub fn run_migrations(conn: &mut rusqlite::Connection) -> Result<(), CourierError> {
    let applied = migrations::runner()
        .run(conn)
        .map_err(CourierError::storage)?
        .applied_migrations()
        .len();
    if applied > 0 {
        tracing::info!(applied, "database schema migrated");
    }
    Ok(())
}
