use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use std::sync::Arc;

use crate::error::BookingError;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/members/{id}/ledger", get(ledger_summary))
}

// GET /api/members/{id}/ledger
async fn ledger_summary(
    State(state): State<Arc<AppState>>,
    Path(member_id): Path<i64>,
) -> Result<impl IntoResponse, BookingError> {
    if member_id <= 0 {
        return Err(BookingError::Validation("member_id должен быть > 0".to_string()));
    }
    let summary = state.cache.get_ledger_summary(member_id, state.engine.ledger()).await?;
    Ok(Json(summary))
}
