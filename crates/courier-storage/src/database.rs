// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All statements are serialized through tokio-rusqlite's single background
//! thread. Do NOT open additional write connections to the same file.

use std::path::Path;

use courier_core::{CourierError, OutboxRecord, OutboxSession};
use tracing::{debug, info};

use crate::migrations::run_migrations;
use crate::queries;

/// Map a tokio-rusqlite error into the storage variant of [`CourierError`].
pub fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> CourierError {
    CourierError::Storage {
        source: Box::new(e),
    }
}

/// Handle to the Courier SQLite database.
///
/// Cloning is cheap; clones share the same background connection thread.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (or create) the database at `path` in WAL mode and run pending
    /// migrations.
    pub async fn open(path: &str) -> Result<Self, CourierError> {
        Self::open_with_options(path, true).await
    }

    /// Open the database, choosing the journal mode explicitly.
    pub async fn open_with_options(path: &str, wal_mode: bool) -> Result<Self, CourierError> {
        if path != ":memory:" {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(CourierError::storage)?;
                }
            }
        }

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(CourierError::storage)?;

        let journal = if wal_mode { "WAL" } else { "DELETE" };
        conn.call(move |conn| {
            conn.execute_batch(&format!(
                "PRAGMA journal_mode = {journal};
                 PRAGMA synchronous = NORMAL;
                 PRAGMA busy_timeout = 5000;
                 PRAGMA foreign_keys = ON;"
            ))
        })
        .await
        .map_err(map_tr_err)?;

        conn.call(|conn| -> Result<Result<(), CourierError>, rusqlite::Error> {
            Ok(run_migrations(conn))
        })
        .await
        .map_err(map_tr_err)??;

        info!(path, wal_mode, "database opened");
        Ok(Self { conn })
    }

    /// The underlying tokio-rusqlite connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Run `f` inside one SQLite transaction.
    ///
    /// Business writes go through [`SqliteSession::transaction`]; outbox
    /// records are staged through the [`OutboxSession`] impl. The transaction
    /// commits only if `f` returns `Ok`; on `Err` every write made inside it,
    /// business and outbox alike, is rolled back.
    pub async fn unit_of_work<F, R>(&self, f: F) -> Result<R, CourierError>
    where
        F: FnOnce(&mut SqliteSession<'_>) -> Result<R, CourierError> + Send + 'static,
        R: Send + 'static,
    {
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let mut session = SqliteSession { tx };
                match f(&mut session) {
                    Ok(value) => {
                        session.tx.commit()?;
                        Ok(Ok(value))
                    }
                    Err(e) => {
                        session.tx.rollback()?;
                        Ok(Err(e))
                    }
                }
            })
            .await
            .map_err(map_tr_err)?
    }

    /// Checkpoint the WAL and close the connection.
    pub async fn close(self) -> Result<(), CourierError> {
        self.conn
            .call(|conn| conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);"))
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        self.conn.close().await.map_err(CourierError::storage)
    }
}

/// An open SQLite transaction shared by business writes and outbox staging.
pub struct SqliteSession<'conn> {
    tx: rusqlite::Transaction<'conn>,
}

impl<'conn> SqliteSession<'conn> {
    /// The transaction business writes must use to commit atomically with
    /// the staged outbox records.
    pub fn transaction(&self) -> &rusqlite::Transaction<'conn> {
        &self.tx
    }
}

impl OutboxSession for SqliteSession<'_> {
    fn stage(&mut self, record: &OutboxRecord) -> Result<(), CourierError> {
        queries::outbox::insert_row(&self.tx, record).map_err(CourierError::storage)
    }
}
