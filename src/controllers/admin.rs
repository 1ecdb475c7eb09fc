use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use validator::Validate;

use crate::error::BookingError;
use crate::AppState;

// Все маршруты монтируются под /api/admin
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/bookings/cancel", patch(admin_cancel_booking))
        .route("/schedules/{id}/members", post(add_members))
        .route("/schedules/{id}/auto-cancel", post(run_auto_cancel))
        .route("/scheduler", get(scheduler_status))
        .route("/scheduler/refresh", post(refresh_scheduler))
        .route("/members/{id}/ledger/reconcile", post(reconcile_ledger))
}

// PATCH /api/admin/bookings/cancel
#[derive(Debug, Deserialize, Validate)]
struct AdminCancelRequest {
    #[validate(range(min = 1, message = "booking_id должен быть > 0"))]
    booking_id: i64,
}

async fn admin_cancel_booking(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AdminCancelRequest>,
) -> Result<impl IntoResponse, BookingError> {
    req.validate()?;
    let outcome = state.engine.admin_cancel_booking(req.booking_id).await?;
    Ok(Json(outcome))
}

// POST /api/admin/schedules/{id}/members
#[derive(Debug, Deserialize, Validate)]
struct AddMembersRequest {
    #[validate(length(min = 1, max = 200, message = "нужно от 1 до 200 участников"))]
    member_ids: Vec<i64>,
}

async fn add_members(
    State(state): State<Arc<AppState>>,
    Path(schedule_id): Path<i64>,
    Json(req): Json<AddMembersRequest>,
) -> Result<impl IntoResponse, BookingError> {
    req.validate()?;
    let outcome = state.engine.admin_add_members(schedule_id, &req.member_ids).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

// POST /api/admin/schedules/{id}/auto-cancel
async fn run_auto_cancel(
    State(state): State<Arc<AppState>>,
    Path(schedule_id): Path<i64>,
) -> Result<impl IntoResponse, BookingError> {
    let outcome = state.engine.auto_cancel_evaluation(schedule_id).await?;
    Ok(Json(outcome))
}

// GET /api/admin/scheduler
async fn scheduler_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.scheduler.status())
}

// POST /api/admin/scheduler/refresh
// Каталог вызывает после создания, изменения или удаления занятия
async fn refresh_scheduler(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, BookingError> {
    state.scheduler.refresh().await?;
    info!("Scheduler refresh requested by catalog");
    Ok(Json(state.scheduler.status()))
}

// POST /api/admin/members/{id}/ledger/reconcile
async fn reconcile_ledger(
    State(state): State<Arc<AppState>>,
    Path(member_id): Path<i64>,
) -> Result<impl IntoResponse, BookingError> {
    let summary = state.engine.reconcile_member(member_id).await?;
    state.cache.invalidate_ledger(member_id).await;
    Ok(Json(summary))
}
