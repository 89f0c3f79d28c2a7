// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Timestamp encoding for TEXT columns.
//!
//! Timestamps are written fixed-width with microsecond precision so that
//! lexical comparison in SQL matches chronological order.

use chrono::{DateTime, NaiveDateTime, Utc};

const WRITE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";
const READ_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";

pub fn to_db_time(at: DateTime<Utc>) -> String {
    at.format(WRITE_FORMAT).to_string()
}

pub fn from_db_time(text: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(text, READ_FORMAT).map(|naive| naive.and_utc())
}
