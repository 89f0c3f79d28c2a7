// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbox record operations.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use courier_core::{CourierError, InboxChange, InboxRecord, InboxStatus, MessageId, Observed};
use rusqlite::types::Value;
use rusqlite::{Row, params, params_from_iter};
use strum::IntoEnumIterator;

use super::{
    limit_value, optional_text, optional_time_at, optional_time_value, parsed, placeholders,
    text, time_at, time_value,
};
use crate::database::{Database, map_tr_err};

const COLUMNS: &str = "id, message_type, payload, destination, correlation_id, status, \
     received_at, last_attempt_at, retry_count, error_message, error_detail, processed_at, \
     discarded_at, next_attempt_at";

fn map_row(row: &Row<'_>) -> rusqlite::Result<InboxRecord> {
    Ok(InboxRecord {
        id: MessageId(row.get(0)?),
        message_type: row.get(1)?,
        payload: row.get(2)?,
        destination: row.get(3)?,
        correlation_id: row.get(4)?,
        status: parsed(row, 5, InboxStatus::from_str)?,
        received_at: time_at(row, 6)?,
        last_attempt_at: optional_time_at(row, 7)?,
        retry_count: row.get(8)?,
        error_message: row.get(9)?,
        error_detail: row.get(10)?,
        processed_at: optional_time_at(row, 11)?,
        discarded_at: optional_time_at(row, 12)?,
        next_attempt_at: optional_time_at(row, 13)?,
    })
}

/// Insert the record unless one with the same id exists.
///
/// Returns `false` (and leaves the stored row untouched) on a duplicate id.
pub async fn insert_if_absent(db: &Database, record: &InboxRecord) -> Result<bool, CourierError> {
    let values = vec![
        text(record.id.as_str()),
        text(record.message_type.as_str()),
        text(record.payload.as_str()),
        optional_text(record.destination.as_deref()),
        optional_text(record.correlation_id.as_deref()),
        text(record.status.to_string()),
        time_value(record.received_at),
        optional_time_value(record.last_attempt_at),
        Value::Integer(i64::from(record.retry_count)),
        optional_text(record.error_message.as_deref()),
        optional_text(record.error_detail.as_deref()),
        optional_time_value(record.processed_at),
        optional_time_value(record.discarded_at),
        optional_time_value(record.next_attempt_at),
    ];
    let sql = format!(
        "INSERT INTO inbox_records ({COLUMNS}) VALUES ({})
         ON CONFLICT(id) DO NOTHING",
        placeholders(values.len())
    );
    let inserted = db
        .connection()
        .call(move |conn| conn.execute(&sql, params_from_iter(values)))
        .await
        .map_err(map_tr_err)?;
    Ok(inserted == 1)
}

/// Get an inbox record by message id.
pub async fn get(db: &Database, id: &MessageId) -> Result<Option<InboxRecord>, CourierError> {
    let id = id.as_str().to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {COLUMNS} FROM inbox_records WHERE id = ?1"))?;
            match stmt.query_row(params![id], map_row) {
                Ok(record) => Ok(Some(record)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Records in any of `statuses`, oldest first.
pub async fn query_by_status(
    db: &Database,
    statuses: &[InboxStatus],
    limit: usize,
) -> Result<Vec<InboxRecord>, CourierError> {
    if statuses.is_empty() || limit == 0 {
        return Ok(Vec::new());
    }
    let mut values: Vec<Value> = statuses.iter().map(|s| text(s.to_string())).collect();
    let sql = format!(
        "SELECT {COLUMNS} FROM inbox_records WHERE status IN ({})
         ORDER BY received_at ASC, id ASC LIMIT ?",
        placeholders(values.len())
    );
    values.push(limit_value(limit));
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values), map_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Rows of `inbox_records` matching `condition`, oldest first.
async fn select_where(
    db: &Database,
    condition: &'static str,
    mut values: Vec<Value>,
    limit: usize,
) -> Result<Vec<InboxRecord>, CourierError> {
    if limit == 0 {
        return Ok(Vec::new());
    }
    values.push(limit_value(limit));
    let sql = format!(
        "SELECT {COLUMNS} FROM inbox_records WHERE {condition}
         ORDER BY received_at ASC, id ASC LIMIT ?"
    );
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values), map_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// `Failed` records below `max_retries` whose retry time has passed.
pub async fn query_retryable(
    db: &Database,
    now: DateTime<Utc>,
    max_retries: u32,
    limit: usize,
) -> Result<Vec<InboxRecord>, CourierError> {
    let values = vec![
        text(InboxStatus::Failed.to_string()),
        Value::Integer(i64::from(max_retries)),
        time_value(now),
    ];
    select_where(
        db,
        "status = ? AND retry_count < ? AND (next_attempt_at IS NULL OR next_attempt_at <= ?)",
        values,
        limit,
    )
    .await
}

/// `Failed` records that used up `max_retries`.
pub async fn query_exhausted(
    db: &Database,
    max_retries: u32,
    limit: usize,
) -> Result<Vec<InboxRecord>, CourierError> {
    let values = vec![
        text(InboxStatus::Failed.to_string()),
        Value::Integer(i64::from(max_retries)),
    ];
    select_where(db, "status = ? AND retry_count >= ?", values, limit).await
}

/// `Processing` records whose attempt started at or before `cutoff`.
pub async fn query_stale(
    db: &Database,
    cutoff: DateTime<Utc>,
    limit: usize,
) -> Result<Vec<InboxRecord>, CourierError> {
    let values = vec![text(InboxStatus::Processing.to_string()), time_value(cutoff)];
    select_where(
        db,
        "status = ? AND (last_attempt_at IS NULL OR last_attempt_at <= ?)",
        values,
        limit,
    )
    .await
}

/// Apply `change` if the record still has the observed status and attempt time.
pub async fn update_status(
    db: &Database,
    id: &MessageId,
    observed: Observed<InboxStatus>,
    change: InboxChange,
) -> Result<bool, CourierError> {
    change.check_from(observed.status)?;

    let status = text(change.target().to_string());
    let (assignments, mut values) = match &change {
        InboxChange::Processing { at } => (
            "status = ?, last_attempt_at = ?",
            vec![status, time_value(*at)],
        ),
        InboxChange::Processed { at } => (
            "status = ?, processed_at = ?",
            vec![status, time_value(*at)],
        ),
        InboxChange::Failed {
            at,
            failure,
            retry_at,
        } => (
            "status = ?, last_attempt_at = ?, next_attempt_at = ?, \
             retry_count = retry_count + 1, error_message = ?, error_detail = ?",
            vec![
                status,
                time_value(*at),
                time_value(*retry_at),
                text(failure.message.as_str()),
                optional_text(failure.detail.as_deref()),
            ],
        ),
        InboxChange::Discarded { at, reason } => (
            "status = ?, discarded_at = ?, error_message = ?",
            vec![status, time_value(*at), text(reason.as_str())],
        ),
    };
    values.push(text(id.as_str()));
    values.push(text(observed.status.to_string()));
    values.push(optional_time_value(observed.last_attempt_at));

    let sql = format!(
        "UPDATE inbox_records SET {assignments}
         WHERE id = ? AND status = ? AND last_attempt_at IS ?"
    );
    let changed = db
        .connection()
        .call(move |conn| conn.execute(&sql, params_from_iter(values)))
        .await
        .map_err(map_tr_err)?;
    Ok(changed == 1)
}

/// Delete records in `statuses` whose terminal timestamp is before `cutoff`.
pub async fn delete_older_than(
    db: &Database,
    cutoff: DateTime<Utc>,
    statuses: &[InboxStatus],
) -> Result<u64, CourierError> {
    if statuses.is_empty() {
        return Ok(0);
    }
    let mut values: Vec<Value> = statuses.iter().map(|s| text(s.to_string())).collect();
    let sql = format!(
        "DELETE FROM inbox_records WHERE status IN ({})
         AND COALESCE(processed_at, discarded_at, received_at) < ?",
        placeholders(values.len())
    );
    values.push(time_value(cutoff));
    let deleted = db
        .connection()
        .call(move |conn| conn.execute(&sql, params_from_iter(values)))
        .await
        .map_err(map_tr_err)?;
    Ok(deleted as u64)
}

/// Record count for every status, zero counts included.
pub async fn count_by_status(db: &Database) -> Result<Vec<(InboxStatus, u64)>, CourierError> {
    let counted: Vec<(String, i64)> = db
        .connection()
        .call(|conn| {
            let mut stmt =
                conn.prepare("SELECT status, COUNT(*) FROM inbox_records GROUP BY status")?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)?;

    Ok(InboxStatus::iter()
        .map(|status| {
            let name = status.to_string();
            let count = counted
                .iter()
                .find(|(s, _)| *s == name)
                .map_or(0, |(_, n)| u64::try_from(*n).unwrap_or(0));
            (status, count)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::{Failure, InboundMessage};
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_772_000_000 + secs, 0).unwrap()
    }

    fn admitted(id: &str, at: i64) -> InboxRecord {
        InboxRecord::received(
            InboundMessage::new(id, "PaymentCaptured", r#"{"amount":10}"#),
            InboxStatus::Processing,
            t(at),
        )
    }

    #[tokio::test]
    async fn insert_if_absent_keeps_first_record() {
        let (db, _dir) = setup_db().await;
        let first = admitted("m-1", 0);
        assert!(insert_if_absent(&db, &first).await.unwrap());

        let mut second = admitted("m-1", 5);
        second.payload = r#"{"amount":99}"#.into();
        assert!(!insert_if_absent(&db, &second).await.unwrap());

        let stored = get(&db, &MessageId::from("m-1")).await.unwrap().unwrap();
        assert_eq!(stored, first);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn processed_transition_sets_timestamp() {
        let (db, _dir) = setup_db().await;
        let rec = admitted("m-2", 0);
        insert_if_absent(&db, &rec).await.unwrap();

        assert!(
            update_status(&db, &rec.id, rec.observed(), InboxChange::Processed { at: t(3) })
                .await
                .unwrap()
        );
        let stored = get(&db, &rec.id).await.unwrap().unwrap();
        assert_eq!(stored.status, InboxStatus::Processed);
        assert_eq!(stored.processed_at, Some(t(3)));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn failed_then_stale_snapshot_loses() {
        let (db, _dir) = setup_db().await;
        let rec = admitted("m-3", 0);
        insert_if_absent(&db, &rec).await.unwrap();

        let change = InboxChange::Failed {
            at: t(1),
            failure: Failure::new("handler crashed"),
            retry_at: t(31),
        };
        assert!(update_status(&db, &rec.id, rec.observed(), change).await.unwrap());
        assert!(
            !update_status(&db, &rec.id, rec.observed(), InboxChange::Processed { at: t(2) })
                .await
                .unwrap()
        );

        let stored = get(&db, &rec.id).await.unwrap().unwrap();
        assert_eq!(stored.retry_count, 1);
        assert_eq!(stored.status, InboxStatus::Failed);
        assert_eq!(stored.next_attempt_at, Some(t(31)));
        db.close().await.unwrap();
    }

    async fn failed(db: &Database, id: &str, received: i64, failures: u32, retry_at: i64) {
        let mut rec = admitted(id, received);
        rec.status = InboxStatus::Failed;
        rec.retry_count = failures;
        rec.next_attempt_at = Some(t(retry_at));
        insert_if_absent(db, &rec).await.unwrap();
    }

    fn ids(records: &[InboxRecord]) -> Vec<&str> {
        records.iter().map(|r| r.id.as_str()).collect()
    }

    #[tokio::test]
    async fn retry_queries_filter_in_sql_before_the_limit() {
        let (db, _dir) = setup_db().await;
        // The two oldest failures are still backing off.
        failed(&db, "waiting-1", 0, 1, 500).await;
        failed(&db, "waiting-2", 1, 1, 500).await;
        failed(&db, "due", 2, 1, 10).await;
        failed(&db, "spent", 3, 3, 10).await;

        let due = query_retryable(&db, t(100), 3, 1).await.unwrap();
        assert_eq!(ids(&due), ["due"]);
        let spent = query_exhausted(&db, 3, 1).await.unwrap();
        assert_eq!(ids(&spent), ["spent"]);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn stale_query_uses_the_attempt_start() {
        let (db, _dir) = setup_db().await;
        insert_if_absent(&db, &admitted("old", 0)).await.unwrap();
        insert_if_absent(&db, &admitted("new", 50)).await.unwrap();

        assert_eq!(ids(&query_stale(&db, t(10), 10).await.unwrap()), ["old"]);
        assert_eq!(query_stale(&db, t(50), 10).await.unwrap().len(), 2);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn query_and_purge_by_status() {
        let (db, _dir) = setup_db().await;
        let pending = InboxRecord::received(
            InboundMessage::new("m-4", "T", "{}"),
            InboxStatus::Pending,
            t(0),
        );
        let mut done = admitted("m-5", 0);
        done.status = InboxStatus::Processed;
        done.processed_at = Some(t(1));
        insert_if_absent(&db, &pending).await.unwrap();
        insert_if_absent(&db, &done).await.unwrap();

        let found = query_by_status(&db, &[InboxStatus::Pending, InboxStatus::Failed], 10)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, pending.id);

        let deleted = delete_older_than(&db, t(100), &[InboxStatus::Processed])
            .await
            .unwrap();
        assert_eq!(deleted, 1);

        let counts = count_by_status(&db).await.unwrap();
        assert!(counts.contains(&(InboxStatus::Pending, 1)));
        assert!(counts.contains(&(InboxStatus::Processed, 0)));
        db.close().await.unwrap();
    }
}
