use chrono::{Duration, NaiveDate};
use rusqlite::OptionalExtension;
use serde::Serialize;

use crate::config::StatsConfig;
use crate::db::DbPool;
use crate::error::AppResult;
use crate::models::{Reading, ReadingOwner};
use crate::services::readings::{query_readings, SortOrder};

/// Length of the trailing window used for monthly figures, in days.
pub const MONTH_WINDOW_DAYS: i64 = 30;

/// Raw figures read from the store in one transaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsSnapshot {
    pub total_generation: f64,
    pub window_generation: f64,
    pub window_count: i64,
    /// `(date, daily_generation, meter_reading)` of the most recent reading.
    pub latest: Option<(NaiveDate, f64, f64)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub today_generation: f64,
    pub total_generation: f64,
    pub monthly_generation: f64,
    pub avg_generation: f64,
    pub efficiency: f64,
    pub total_savings: f64,
    pub monthly_savings: f64,
    pub current_meter_reading: f64,
    pub last_update: Option<NaiveDate>,
}

impl Stats {
    pub fn from_snapshot(snapshot: &StatsSnapshot, config: &StatsConfig) -> Self {
        let avg_generation = average(snapshot.window_generation, snapshot.window_count);
        let (last_update, today_generation, current_meter_reading) = match snapshot.latest {
            Some((date, generation, meter)) => (Some(date), generation, meter),
            None => (None, 0.0, 0.0),
        };

        Self {
            today_generation,
            total_generation: snapshot.total_generation,
            monthly_generation: snapshot.window_generation,
            avg_generation,
            efficiency: efficiency(avg_generation, config.optimal_generation),
            total_savings: snapshot.total_generation * config.rate_per_unit,
            monthly_savings: snapshot.window_generation * config.rate_per_unit,
            current_meter_reading,
            last_update,
        }
    }
}

fn average(sum: f64, count: i64) -> f64 {
    if count <= 0 {
        return 0.0;
    }
    sum / count as f64
}

/// Average yield as a percentage of the optimal daily yield, capped at 100 and
/// rounded to one decimal place.
pub fn efficiency(avg_generation: f64, optimal_generation: f64) -> f64 {
    if optimal_generation <= 0.0 {
        return 0.0;
    }
    let pct = (avg_generation / optimal_generation * 100.0).min(100.0);
    (pct * 10.0).round() / 10.0
}

/// Read the four aggregates inside one transaction so they describe the same state.
pub fn load_snapshot(
    pool: &DbPool,
    owner: &ReadingOwner,
    today: NaiveDate,
) -> AppResult<StatsSnapshot> {
    let mut conn = pool.get()?;
    let tx = conn.transaction()?;
    let snapshot = read_snapshot(&tx, owner, today)?;
    tx.commit()?;
    Ok(snapshot)
}

fn read_snapshot(
    conn: &rusqlite::Connection,
    owner: &ReadingOwner,
    today: NaiveDate,
) -> AppResult<StatsSnapshot> {
    let window_start = today - Duration::days(MONTH_WINDOW_DAYS);

    let total_generation: f64 = conn.query_row(
        "SELECT COALESCE(SUM(daily_generation), 0.0) FROM readings WHERE user_id = ?1",
        rusqlite::params![owner.as_str()],
        |row| row.get(0),
    )?;

    let (window_generation, window_count): (f64, i64) = conn.query_row(
        "SELECT COALESCE(SUM(daily_generation), 0.0), COUNT(*)
         FROM readings
         WHERE user_id = ?1 AND date >= ?2 AND date <= ?3",
        rusqlite::params![owner.as_str(), window_start, today],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    let latest = conn
        .query_row(
            "SELECT date, daily_generation, meter_reading
             FROM readings
             WHERE user_id = ?1
             ORDER BY date DESC LIMIT 1",
            rusqlite::params![owner.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;

    Ok(StatsSnapshot {
        total_generation,
        window_generation,
        window_count,
        latest,
    })
}

pub fn get_stats(
    pool: &DbPool,
    owner: &ReadingOwner,
    today: NaiveDate,
    config: &StatsConfig,
) -> AppResult<Stats> {
    let snapshot = load_snapshot(pool, owner, today)?;
    Ok(Stats::from_snapshot(&snapshot, config))
}

/// Recent readings and the stats computed from the same read transaction.
pub fn get_dashboard(
    pool: &DbPool,
    owner: &ReadingOwner,
    today: NaiveDate,
    limit: u32,
    config: &StatsConfig,
) -> AppResult<(Vec<Reading>, Stats)> {
    let mut conn = pool.get()?;
    let tx = conn.transaction()?;
    let readings = query_readings(&tx, owner, limit, SortOrder::Desc)?;
    let snapshot = read_snapshot(&tx, owner, today)?;
    tx.commit()?;
    Ok((readings, Stats::from_snapshot(&snapshot, config)))
}
