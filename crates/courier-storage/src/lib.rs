// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite message record store for Courier.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a single-writer
//! concurrency model via `tokio-rusqlite`, the outbox and inbox record
//! queries, and a unit-of-work session that lets business writes and outbox
//! records commit in one transaction.

pub mod adapter;
pub mod database;
pub mod migrations;
pub mod queries;
pub mod time;

pub use adapter::SqliteStore;
pub use database::{Database, SqliteSession};
