use axum::{extract::State, response::IntoResponse, routing::post, Json, Router};
use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

use crate::error::BookingError;
use crate::services::conflict::ConflictSubject;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/conflicts/check", post(check_conflict))
}

// POST /api/conflicts/check
#[derive(Debug, Deserialize, Validate)]
struct ConflictCheckRequest {
    subject: ConflictSubject,
    date: NaiveDate,
    time_start: NaiveTime,
    time_end: NaiveTime,
    #[validate(range(min = 1))]
    exclude_id: Option<i64>,
}

async fn check_conflict(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ConflictCheckRequest>,
) -> Result<impl IntoResponse, BookingError> {
    req.validate()?;
    let report = state
        .engine
        .conflicts()
        .has_conflict(req.subject, req.date, req.time_start, req.time_end, req.exclude_id)
        .await?;
    Ok(Json(report))
}
