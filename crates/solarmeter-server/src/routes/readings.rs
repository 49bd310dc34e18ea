use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AppResult;
use crate::models::{Reading, ReadingOwner};
use crate::routes::{today, AppState};
use crate::services::readings::{
    self, DatePolicy, SortOrder, SubmitOutcome, WriteKind, DEFAULT_LIST_LIMIT,
};

/// Number of days plotted on the generation chart.
const CHART_DAYS: u32 = 30;

#[derive(Debug, Deserialize)]
pub struct SubmitReadingRequest {
    /// Number or numeric string; anything else is rejected as a validation error.
    #[serde(alias = "today_reading")]
    pub meter_reading: Option<Value>,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct SubmitReadingResponse {
    pub message: &'static str,
    #[serde(flatten)]
    pub outcome: SubmitOutcome,
}

#[derive(Debug, Deserialize)]
pub struct ListReadingsQuery {
    pub limit: Option<u32>,
    pub order: Option<SortOrder>,
}

#[derive(Debug, Serialize)]
pub struct ChartPoint {
    pub date: NaiveDate,
    pub meter_reading: f64,
    pub daily_generation: f64,
}

impl From<Reading> for ChartPoint {
    fn from(r: Reading) -> Self {
        Self {
            date: r.date,
            meter_reading: r.meter_reading,
            daily_generation: r.daily_generation,
        }
    }
}

/// Reads a meter value sent either as a JSON number or as a numeric string (form-style clients).
pub fn meter_value(raw: Option<&Value>) -> Option<f64> {
    match raw? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// POST /api/v1/readings
pub async fn submit(
    State(state): State<AppState>,
    Extension(owner): Extension<ReadingOwner>,
    Json(body): Json<SubmitReadingRequest>,
) -> AppResult<(StatusCode, Json<SubmitReadingResponse>)> {
    let today = today();
    let policy = DatePolicy {
        today,
        allow_backdated: state.config.allow_backdated_readings,
    };
    let date = body.date.unwrap_or(today);

    let meter_reading = meter_value(body.meter_reading.as_ref());

    let outcome = readings::submit_reading(&state.db, &owner, date, meter_reading, policy)?;

    let (status, message) = match outcome.status {
        WriteKind::Created => (StatusCode::CREATED, "Reading added successfully"),
        WriteKind::Updated => (StatusCode::OK, "Reading updated successfully"),
    };
    Ok((status, Json(SubmitReadingResponse { message, outcome })))
}

/// GET /api/v1/readings?limit=30&order=desc
pub async fn list(
    State(state): State<AppState>,
    Extension(owner): Extension<ReadingOwner>,
    Query(query): Query<ListReadingsQuery>,
) -> AppResult<Json<Vec<Reading>>> {
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    let order = query.order.unwrap_or_default();
    let readings = readings::list_readings(&state.db, &owner, limit, order)?;
    Ok(Json(readings))
}

/// GET /api/v1/readings/chart
pub async fn chart(
    State(state): State<AppState>,
    Extension(owner): Extension<ReadingOwner>,
) -> AppResult<Json<Vec<ChartPoint>>> {
    let readings = readings::list_readings(&state.db, &owner, CHART_DAYS, SortOrder::Asc)?;
    Ok(Json(readings.into_iter().map(ChartPoint::from).collect()))
}

/// DELETE /api/v1/readings/:date
pub async fn delete(
    State(state): State<AppState>,
    Extension(owner): Extension<ReadingOwner>,
    Path(date): Path<NaiveDate>,
) -> AppResult<StatusCode> {
    readings::delete_reading(&state.db, &owner, date)?;
    Ok(StatusCode::NO_CONTENT)
}
