use axum::{extract::State, Extension, Json};
use serde::Serialize;

use crate::error::AppResult;
use crate::models::{Reading, ReadingOwner};
use crate::routes::{today, AppState};
use crate::services::readings::DEFAULT_LIST_LIMIT;
use crate::services::stats::{self, Stats};

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub readings: Vec<Reading>,
    pub stats: Stats,
}

/// GET /api/v1/stats
pub async fn summary(
    State(state): State<AppState>,
    Extension(owner): Extension<ReadingOwner>,
) -> AppResult<Json<Stats>> {
    let stats = stats::get_stats(&state.db, &owner, today(), &state.config.stats)?;
    Ok(Json(stats))
}

/// GET /api/v1/dashboard
pub async fn dashboard(
    State(state): State<AppState>,
    Extension(owner): Extension<ReadingOwner>,
) -> AppResult<Json<DashboardResponse>> {
    let (readings, stats) = stats::get_dashboard(
        &state.db,
        &owner,
        today(),
        DEFAULT_LIST_LIMIT,
        &state.config.stats,
    )?;
    Ok(Json(DashboardResponse { readings, stats }))
}
