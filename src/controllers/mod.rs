pub mod admin;
pub mod bookings;
pub mod conflicts;
pub mod members;

use axum::Router;
use std::sync::Arc;

pub fn routes() -> Router<Arc<crate::AppState>> {
    Router::new()
        .merge(bookings::routes())
        .merge(members::routes())
        .merge(conflicts::routes())
        .nest("/admin", admin::routes())
}
