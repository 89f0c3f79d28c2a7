// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbox record operations.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use courier_core::{CourierError, Observed, OutboxChange, OutboxRecord, OutboxStatus};
use rusqlite::types::Value;
use rusqlite::{Connection, Row, params, params_from_iter};
use strum::IntoEnumIterator;
use uuid::Uuid;

use super::{
    limit_value, optional_text, optional_time_at, optional_time_value, parsed, placeholders,
    text, time_at, time_value,
};
use crate::database::{Database, map_tr_err};

const COLUMNS: &str = "id, message_type, payload, destination, correlation_id, status, \
     created_at, scheduled_at, last_attempt_at, retry_count, error_message, error_detail, \
     published_at, discarded_at, next_attempt_at";

fn map_row(row: &Row<'_>) -> rusqlite::Result<OutboxRecord> {
    Ok(OutboxRecord {
        id: parsed(row, 0, Uuid::parse_str)?,
        message_type: row.get(1)?,
        payload: row.get(2)?,
        destination: row.get(3)?,
        correlation_id: row.get(4)?,
        status: parsed(row, 5, OutboxStatus::from_str)?,
        created_at: time_at(row, 6)?,
        scheduled_at: optional_time_at(row, 7)?,
        last_attempt_at: optional_time_at(row, 8)?,
        retry_count: row.get(9)?,
        error_message: row.get(10)?,
        error_detail: row.get(11)?,
        published_at: optional_time_at(row, 12)?,
        discarded_at: optional_time_at(row, 13)?,
        next_attempt_at: optional_time_at(row, 14)?,
    })
}

/// Insert a record on an open connection or transaction.
///
/// Used both by the store and by the unit-of-work session.
pub fn insert_row(conn: &Connection, record: &OutboxRecord) -> rusqlite::Result<()> {
    let values = vec![
        text(record.id.to_string()),
        text(record.message_type.as_str()),
        text(record.payload.as_str()),
        text(record.destination.as_str()),
        optional_text(record.correlation_id.as_deref()),
        text(record.status.to_string()),
        time_value(record.created_at),
        optional_time_value(record.scheduled_at),
        optional_time_value(record.last_attempt_at),
        Value::Integer(i64::from(record.retry_count)),
        optional_text(record.error_message.as_deref()),
        optional_text(record.error_detail.as_deref()),
        optional_time_value(record.published_at),
        optional_time_value(record.discarded_at),
        optional_time_value(record.next_attempt_at),
    ];
    conn.execute(
        &format!(
            "INSERT INTO outbox_records ({COLUMNS}) VALUES ({})",
            placeholders(values.len())
        ),
        params_from_iter(values),
    )?;
    Ok(())
}

/// Insert a new outbox record outside any caller transaction.
pub async fn insert(db: &Database, record: &OutboxRecord) -> Result<(), CourierError> {
    let record = record.clone();
    db.connection()
        .call(move |conn| insert_row(conn, &record))
        .await
        .map_err(map_tr_err)
}

/// Get an outbox record by id.
pub async fn get(db: &Database, id: Uuid) -> Result<Option<OutboxRecord>, CourierError> {
    db.connection()
        .call(move |conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {COLUMNS} FROM outbox_records WHERE id = ?1"))?;
            match stmt.query_row(params![id.to_string()], map_row) {
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
    statuses: &[OutboxStatus],
    limit: usize,
) -> Result<Vec<OutboxRecord>, CourierError> {
    if statuses.is_empty() || limit == 0 {
        return Ok(Vec::new());
    }
    let mut values: Vec<Value> = statuses.iter().map(|s| text(s.to_string())).collect();
    let sql = format!(
        "SELECT {COLUMNS} FROM outbox_records WHERE status IN ({})
         ORDER BY created_at ASC, id ASC LIMIT ?",
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

/// `Pending` records plus `Scheduled` records that are due at `now`, oldest first.
pub async fn query_scheduled_ready(
    db: &Database,
    now: DateTime<Utc>,
    limit: usize,
) -> Result<Vec<OutboxRecord>, CourierError> {
    if limit == 0 {
        return Ok(Vec::new());
    }
    let values = vec![
        text(OutboxStatus::Pending.to_string()),
        text(OutboxStatus::Scheduled.to_string()),
        time_value(now),
        limit_value(limit),
    ];
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM outbox_records
                 WHERE status = ? OR (status = ? AND scheduled_at <= ?)
                 ORDER BY created_at ASC, id ASC LIMIT ?"
            ))?;
            let rows = stmt.query_map(params_from_iter(values), map_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Rows of `outbox_records` matching `condition`, oldest first.
async fn select_where(
    db: &Database,
    condition: &'static str,
    mut values: Vec<Value>,
    limit: usize,
) -> Result<Vec<OutboxRecord>, CourierError> {
    if limit == 0 {
        return Ok(Vec::new());
    }
    values.push(limit_value(limit));
    let sql = format!(
        "SELECT {COLUMNS} FROM outbox_records WHERE {condition}
         ORDER BY created_at ASC, id ASC LIMIT ?"
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
) -> Result<Vec<OutboxRecord>, CourierError> {
    let values = vec![
        text(OutboxStatus::Failed.to_string()),
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
) -> Result<Vec<OutboxRecord>, CourierError> {
    let values = vec![
        text(OutboxStatus::Failed.to_string()),
        Value::Integer(i64::from(max_retries)),
    ];
    select_where(db, "status = ? AND retry_count >= ?", values, limit).await
}

/// `Publishing` records whose attempt started at or before `cutoff`.
pub async fn query_stale(
    db: &Database,
    cutoff: DateTime<Utc>,
    limit: usize,
) -> Result<Vec<OutboxRecord>, CourierError> {
    let values = vec![text(OutboxStatus::Publishing.to_string()), time_value(cutoff)];
    select_where(
        db,
        "status = ? AND (last_attempt_at IS NULL OR last_attempt_at <= ?)",
        values,
        limit,
    )
    .await
}

/// Apply `change` if the record still has the observed status and attempt time.
///
/// Returns `false` when no row matched: the record moved on or does not exist.
pub async fn update_status(
    db: &Database,
    id: Uuid,
    observed: Observed<OutboxStatus>,
    change: OutboxChange,
) -> Result<bool, CourierError> {
    change.check_from(observed.status)?;

    let status = text(change.target().to_string());
    let (assignments, mut values) = match &change {
        OutboxChange::Publishing { at } => (
            "status = ?, last_attempt_at = ?",
            vec![status, time_value(*at)],
        ),
        OutboxChange::Published { at } => (
            "status = ?, published_at = ?",
            vec![status, time_value(*at)],
        ),
        OutboxChange::Failed {
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
        OutboxChange::Discarded { at, reason } => (
            "status = ?, discarded_at = ?, error_message = ?",
            vec![status, time_value(*at), text(reason.as_str())],
        ),
    };
    values.push(text(id.to_string()));
    values.push(text(observed.status.to_string()));
    values.push(optional_time_value(observed.last_attempt_at));

    let sql = format!(
        "UPDATE outbox_records SET {assignments}
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
    statuses: &[OutboxStatus],
) -> Result<u64, CourierError> {
    if statuses.is_empty() {
        return Ok(0);
    }
    let mut values: Vec<Value> = statuses.iter().map(|s| text(s.to_string())).collect();
    let sql = format!(
        "DELETE FROM outbox_records WHERE status IN ({})
         AND COALESCE(published_at, discarded_at, created_at) < ?",
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
pub async fn count_by_status(db: &Database) -> Result<Vec<(OutboxStatus, u64)>, CourierError> {
    let counted: Vec<(String, i64)> = db
        .connection()
        .call(|conn| {
            let mut stmt =
                conn.prepare("SELECT status, COUNT(*) FROM outbox_records GROUP BY status")?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)?;

    Ok(OutboxStatus::iter()
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
    use chrono::Duration;
    use courier_core::{Failure, OutgoingMessage};
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

    fn record(created: i64) -> OutboxRecord {
        OutboxRecord::new(
            OutgoingMessage::new("OrderPlaced", r#"{"n":1}"#, "orders").with_correlation_id("c-1"),
            t(created),
            None,
        )
    }

    #[tokio::test]
    async fn insert_and_get_round_trip() {
        let (db, _dir) = setup_db().await;
        let rec = record(0);
        insert(&db, &rec).await.unwrap();

        let loaded = get(&db, rec.id).await.unwrap().unwrap();
        assert_eq!(loaded, rec);
        assert!(get(&db, Uuid::new_v4()).await.unwrap().is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_insert_is_a_storage_error() {
        let (db, _dir) = setup_db().await;
        let rec = record(0);
        insert(&db, &rec).await.unwrap();
        let err = insert(&db, &rec).await.unwrap_err();
        assert!(matches!(err, CourierError::Storage { .. }));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn scheduled_ready_respects_due_time_and_order() {
        let (db, _dir) = setup_db().await;
        let later = record(2);
        let earlier = record(1);
        let scheduled = OutboxRecord::new(
            OutgoingMessage::new("Reminder", "{}", "mail"),
            t(0),
            Some(t(100)),
        );
        for r in [&later, &earlier, &scheduled] {
            insert(&db, r).await.unwrap();
        }

        let ready = query_scheduled_ready(&db, t(50), 10).await.unwrap();
        let ids: Vec<Uuid> = ready.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![earlier.id, later.id]);

        let ready = query_scheduled_ready(&db, t(100), 10).await.unwrap();
        assert_eq!(ready.first().map(|r| r.id), Some(scheduled.id));
        assert_eq!(ready.len(), 3);

        let ready = query_scheduled_ready(&db, t(100), 1).await.unwrap();
        assert_eq!(ready.len(), 1);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn update_status_is_conditioned_on_observed_state() {
        let (db, _dir) = setup_db().await;
        let rec = record(0);
        insert(&db, &rec).await.unwrap();

        let won = update_status(&db, rec.id, rec.observed(), OutboxChange::Publishing {
            at: t(10),
        })
        .await
        .unwrap();
        assert!(won);

        // A second worker holding the stale snapshot loses.
        let lost = update_status(&db, rec.id, rec.observed(), OutboxChange::Publishing {
            at: t(11),
        })
        .await
        .unwrap();
        assert!(!lost);

        let current = get(&db, rec.id).await.unwrap().unwrap();
        assert_eq!(current.status, OutboxStatus::Publishing);
        assert_eq!(current.last_attempt_at, Some(t(10)));

        let failure = Failure {
            message: "broker down".into(),
            detail: Some("caused by: connection refused".into()),
        };
        assert!(
            update_status(&db, rec.id, current.observed(), OutboxChange::Failed {
                at: t(12),
                failure,
                retry_at: t(42),
            })
            .await
            .unwrap()
        );
        let failed = get(&db, rec.id).await.unwrap().unwrap();
        assert_eq!(failed.status, OutboxStatus::Failed);
        assert_eq!(failed.retry_count, 1);
        assert_eq!(failed.error_message.as_deref(), Some("broker down"));
        assert_eq!(failed.last_attempt_at, Some(t(12)));
        assert_eq!(failed.next_attempt_at, Some(t(42)));
        db.close().await.unwrap();
    }

    fn failed_record(created: i64, failures: u32, retry_at: i64) -> OutboxRecord {
        let mut rec = record(created);
        rec.status = OutboxStatus::Failed;
        rec.retry_count = failures;
        rec.last_attempt_at = Some(t(created));
        rec.next_attempt_at = Some(t(retry_at));
        rec
    }

    #[tokio::test]
    async fn due_retries_are_found_behind_backing_off_ones() {
        let (db, _dir) = setup_db().await;
        let waiting = [failed_record(0, 1, 500), failed_record(1, 2, 500)];
        let due = failed_record(2, 1, 20);
        let spent = failed_record(3, 3, 20);
        for r in waiting.iter().chain([&due, &spent]) {
            insert(&db, r).await.unwrap();
        }

        let found = query_retryable(&db, t(100), 3, 1).await.unwrap();
        assert_eq!(found.iter().map(|r| r.id).collect::<Vec<_>>(), vec![due.id]);
        let found = query_exhausted(&db, 3, 1).await.unwrap();
        assert_eq!(found.iter().map(|r| r.id).collect::<Vec<_>>(), vec![spent.id]);
        assert!(query_retryable(&db, t(19), 3, 10).await.unwrap().is_empty());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn stale_publishing_records_are_found_by_attempt_time() {
        let (db, _dir) = setup_db().await;
        let mut early = record(0);
        early.status = OutboxStatus::Publishing;
        early.last_attempt_at = Some(t(5));
        let mut late = record(1);
        late.status = OutboxStatus::Publishing;
        late.last_attempt_at = Some(t(90));
        for r in [&early, &late] {
            insert(&db, r).await.unwrap();
        }

        let stale = query_stale(&db, t(60), 10).await.unwrap();
        assert_eq!(stale.iter().map(|r| r.id).collect::<Vec<_>>(), vec![early.id]);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn illegal_transition_is_rejected_before_touching_the_row() {
        let (db, _dir) = setup_db().await;
        let rec = record(0);
        insert(&db, &rec).await.unwrap();

        let err = update_status(&db, rec.id, rec.observed(), OutboxChange::Published {
            at: t(1),
        })
        .await
        .unwrap_err();
        assert!(matches!(err, CourierError::InvalidTransition { .. }));
        assert_eq!(
            get(&db, rec.id).await.unwrap().unwrap().status,
            OutboxStatus::Pending
        );
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn delete_older_than_only_removes_old_terminal_records() {
        let (db, _dir) = setup_db().await;
        let mut old = record(0);
        old.status = OutboxStatus::Published;
        old.published_at = Some(t(10));
        let mut fresh = record(0);
        fresh.status = OutboxStatus::Published;
        fresh.published_at = Some(t(1000));
        let pending = record(0);
        for r in [&old, &fresh, &pending] {
            insert(&db, r).await.unwrap();
        }

        let cutoff = t(10) + Duration::seconds(100);
        let deleted = delete_older_than(&db, cutoff, &[
            OutboxStatus::Published,
            OutboxStatus::Discarded,
        ])
        .await
        .unwrap();
        assert_eq!(deleted, 1);
        assert!(get(&db, old.id).await.unwrap().is_none());
        assert!(get(&db, fresh.id).await.unwrap().is_some());
        assert!(get(&db, pending.id).await.unwrap().is_some());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn count_by_status_reports_every_status() {
        let (db, _dir) = setup_db().await;
        insert(&db, &record(0)).await.unwrap();
        insert(&db, &record(1)).await.unwrap();

        let counts = count_by_status(&db).await.unwrap();
        assert_eq!(counts.len(), 6);
        assert!(counts.contains(&(OutboxStatus::Pending, 2)));
        assert!(counts.contains(&(OutboxStatus::Published, 0)));
        db.close().await.unwrap();
    }
}
