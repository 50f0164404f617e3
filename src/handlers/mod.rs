pub mod admin;
pub mod health;
pub mod webhook;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/webhook", get(webhook::verify).post(webhook::receive))
        .route("/api/admin/status", get(admin::get_status))
        .route("/api/admin/bookings", get(admin::get_bookings))
        .route(
            "/api/admin/bookings/:customer_id",
            get(admin::get_customer_bookings),
        )
        .route("/api/admin/sweep", post(admin::run_sweep))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
