use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

use crate::error::BookingError;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/bookings", post(create_booking))
        .route("/bookings/cancel", patch(cancel_booking))
        .route("/schedules/{id}/bookings", get(schedule_roster))
}

/* ---------- BOOKINGS ---------- */

// POST /api/bookings
#[derive(Debug, Deserialize, Validate)]
struct CreateBookingRequest {
    #[validate(range(min = 1, message = "member_id должен быть > 0"))]
    member_id: i64,
    #[validate(range(min = 1, message = "schedule_id должен быть > 0"))]
    schedule_id: i64,
}

async fn create_booking(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateBookingRequest>,
) -> Result<impl IntoResponse, BookingError> {
    req.validate()?;
    let outcome = state.engine.request_booking(req.member_id, req.schedule_id).await?;
    let status = if outcome.reused { StatusCode::OK } else { StatusCode::CREATED };
    Ok((status, Json(outcome)))
}

// PATCH /api/bookings/cancel
#[derive(Debug, Deserialize, Validate)]
struct CancelBookingRequest {
    #[validate(range(min = 1, message = "member_id должен быть > 0"))]
    member_id: i64,
    #[validate(range(min = 1, message = "booking_id должен быть > 0"))]
    booking_id: i64,
}

async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CancelBookingRequest>,
) -> Result<impl IntoResponse, BookingError> {
    req.validate()?;
    let outcome = state.engine.cancel_booking(req.booking_id, req.member_id).await?;
    Ok(Json(outcome))
}

// GET /api/schedules/{id}/bookings
async fn schedule_roster(
    State(state): State<Arc<AppState>>,
    Path(schedule_id): Path<i64>,
) -> Result<impl IntoResponse, BookingError> {
    let roster = state.engine.roster(schedule_id).await?;
    Ok(Json(roster))
}
