use chrono::NaiveDate;
use rusqlite::{OptionalExtension, TransactionBehavior};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::{row_to_reading, Reading, ReadingOwner, READING_COLUMNS};

pub const DEFAULT_LIST_LIMIT: u32 = 30;
pub const MAX_LIST_LIMIT: u32 = 366;

/// Which dates a submission may target.
#[derive(Debug, Clone, Copy)]
pub struct DatePolicy {
    pub today: NaiveDate,
    /// When false only `today` is accepted.
    pub allow_backdated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteKind {
    Created,
    Updated,
}

#[derive(Debug, Serialize)]
pub struct SubmitOutcome {
    pub status: WriteKind,
    pub reading: Reading,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

pub fn validate_meter_value(value: Option<f64>) -> AppResult<f64> {
    match value {
        Some(v) if v.is_finite() && v > 0.0 => Ok(v),
        _ => Err(AppError::Validation(
            "Invalid meter reading provided.".to_string(),
        )),
    }
}

pub fn check_date(date: NaiveDate, policy: DatePolicy) -> AppResult<()> {
    if date > policy.today {
        return Err(AppError::InvalidDate(format!(
            "{date} is in the future"
        )));
    }
    if date < policy.today && !policy.allow_backdated {
        return Err(AppError::InvalidDate(format!(
            "Readings can only be submitted for today ({})",
            policy.today
        )));
    }
    Ok(())
}

/// Daily generation for a cumulative value given the closest earlier reading.
/// The first reading in a history has nothing to compare against and generates 0.
pub fn derive_generation(previous: Option<f64>, submitted: f64) -> AppResult<f64> {
    let Some(previous) = previous else {
        return Ok(0.0);
    };
    let delta = submitted - previous;
    if delta < 0.0 {
        return Err(AppError::NonMonotonicReading(format!(
            "today's reading ({submitted}) cannot be less than the previous reading ({previous})."
        )));
    }
    Ok(delta)
}

/// Store a cumulative meter value for `date`, deriving its daily generation.
///
/// An existing row for the same date is overwritten and its generation recomputed
/// against the current predecessor. Predecessor lookup, the successor guard and the
/// upsert run in one `IMMEDIATE` transaction so concurrent submissions serialize.
pub fn submit_reading(
    pool: &DbPool,
    owner: &ReadingOwner,
    date: NaiveDate,
    meter_value: Option<f64>,
    policy: DatePolicy,
) -> AppResult<SubmitOutcome> {
    let meter_reading = validate_meter_value(meter_value)?;
    check_date(date, policy)?;

    let mut conn = pool.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let previous: Option<f64> = tx
        .query_row(
            "SELECT meter_reading FROM readings
             WHERE user_id = ?1 AND date < ?2
             ORDER BY date DESC LIMIT 1",
            rusqlite::params![owner.as_str(), date],
            |row| row.get(0),
        )
        .optional()?;

    let daily_generation = derive_generation(previous, meter_reading).inspect_err(|_| {
        tracing::debug!(owner = owner.as_str(), %date, meter_reading, ?previous, "reading below predecessor rejected");
    })?;

    let next: Option<f64> = tx
        .query_row(
            "SELECT meter_reading FROM readings
             WHERE user_id = ?1 AND date > ?2
             ORDER BY date ASC LIMIT 1",
            rusqlite::params![owner.as_str(), date],
            |row| row.get(0),
        )
        .optional()?;

    if let Some(next) = next.filter(|next| meter_reading > *next) {
        tracing::debug!(owner = owner.as_str(), %date, meter_reading, next, "reading above successor rejected");
        return Err(AppError::NonMonotonicReading(format!(
            "reading ({meter_reading}) cannot exceed a later reading ({next})."
        )));
    }

    let existed: bool = tx.query_row(
        "SELECT EXISTS(SELECT 1 FROM readings WHERE user_id = ?1 AND date = ?2)",
        rusqlite::params![owner.as_str(), date],
        |row| row.get(0),
    )?;

    let id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();

    let reading = tx.query_row(
        &format!(
            "INSERT INTO readings (id, user_id, date, meter_reading, daily_generation, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
             ON CONFLICT (user_id, date) DO UPDATE SET
                 meter_reading = excluded.meter_reading,
                 daily_generation = excluded.daily_generation,
                 updated_at = excluded.updated_at
             RETURNING {READING_COLUMNS}"
        ),
        rusqlite::params![id, owner.as_str(), date, meter_reading, daily_generation, now],
        row_to_reading,
    )?;

    tx.commit()?;

    let status = if existed {
        WriteKind::Updated
    } else {
        WriteKind::Created
    };
    tracing::info!(
        owner = owner.as_str(),
        %date,
        meter_reading,
        daily_generation,
        ?status,
        "reading stored"
    );

    Ok(SubmitOutcome { status, reading })
}

/// The `limit` most recent readings, returned in `order`.
pub fn list_readings(
    pool: &DbPool,
    owner: &ReadingOwner,
    limit: u32,
    order: SortOrder,
) -> AppResult<Vec<Reading>> {
    let conn = pool.get()?;
    query_readings(&conn, owner, limit, order)
}

/// [`list_readings`] against an open connection or transaction.
pub fn query_readings(
    conn: &rusqlite::Connection,
    owner: &ReadingOwner,
    limit: u32,
    order: SortOrder,
) -> AppResult<Vec<Reading>> {
    let limit = limit.clamp(1, MAX_LIST_LIMIT);
    let mut stmt = conn.prepare(&format!(
        "SELECT {READING_COLUMNS} FROM readings
         WHERE user_id = ?1
         ORDER BY date DESC LIMIT ?2"
    ))?;
    let rows = stmt.query_map(rusqlite::params![owner.as_str(), limit], row_to_reading)?;
    let mut readings = rows.collect::<Result<Vec<_>, _>>()?;

    if order == SortOrder::Asc {
        readings.reverse();
    }
    Ok(readings)
}

pub fn delete_reading(pool: &DbPool, owner: &ReadingOwner, date: NaiveDate) -> AppResult<()> {
    let conn = pool.get()?;
    let affected = conn.execute(
        "DELETE FROM readings WHERE user_id = ?1 AND date = ?2",
        rusqlite::params![owner.as_str(), date],
    )?;

    if affected == 0 {
        return Err(AppError::NotFound("Reading not found.".into()));
    }

    tracing::info!(owner = owner.as_str(), %date, "reading deleted");
    Ok(())
}
