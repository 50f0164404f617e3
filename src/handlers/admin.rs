use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::errors::AppError;
use crate::models::{Booking, Reminder};
use crate::services::scheduler::SweepReport;
use crate::services::store::BookingScan;
use crate::state::AppState;

const ADMIN_SCAN_PAGE: usize = 500;

fn check_auth(headers: &HeaderMap, expected_token: &str) -> Result<(), AppError> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or("");
    if expected_token.is_empty() || token != expected_token {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

#[derive(Serialize)]
pub struct ReminderResponse {
    due_at: String,
    status: &'static str,
}

#[derive(Serialize)]
pub struct BookingResponse {
    customer_id: String,
    booking_id: String,
    name: Option<String>,
    service: Option<String>,
    category: Option<String>,
    raw_date: Option<String>,
    raw_time: Option<String>,
    contact: Option<String>,
    notes: Option<String>,
    appointment_utc: Option<String>,
    reminder_24h: Option<ReminderResponse>,
    reminder_1h: Option<ReminderResponse>,
    created_at: String,
}

fn reminder_response(reminder: Option<Reminder>) -> Option<ReminderResponse> {
    reminder.map(|r| ReminderResponse {
        due_at: r.due_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        status: r.status.as_str(),
    })
}

impl From<Booking> for BookingResponse {
    fn from(b: Booking) -> Self {
        Self {
            customer_id: b.customer_id,
            booking_id: b.booking_id,
            name: b.name,
            service: b.service,
            category: b.category,
            raw_date: b.raw_date,
            raw_time: b.raw_time,
            contact: b.contact,
            notes: b.notes,
            appointment_utc: b
                .appointment_utc
                .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true)),
            reminder_24h: reminder_response(b.reminder_24h),
            reminder_1h: reminder_response(b.reminder_1h),
            created_at: b.created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

// GET /api/admin/bookings
pub async fn get_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<BookingResponse>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let bookings = BookingScan::new(state.store.as_ref(), ADMIN_SCAN_PAGE)
        .collect()
        .await?;

    Ok(Json(bookings.into_iter().map(BookingResponse::from).collect()))
}

// GET /api/admin/bookings/:customer_id
pub async fn get_customer_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(customer_id): Path<String>,
) -> Result<Json<Vec<BookingResponse>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let bookings: Vec<BookingResponse> = BookingScan::new(state.store.as_ref(), ADMIN_SCAN_PAGE)
        .collect()
        .await?
        .into_iter()
        .filter(|b| b.customer_id == customer_id)
        .map(BookingResponse::from)
        .collect();

    if bookings.is_empty() {
        return Err(AppError::NotFound(format!("no bookings for {customer_id}")));
    }
    Ok(Json(bookings))
}

// POST /api/admin/sweep
pub async fn run_sweep(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<SweepReport>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    tracing::info!("manual reminder sweep requested");
    Ok(Json(state.scheduler.tick(Utc::now()).await))
}

#[derive(Serialize)]
pub struct StatusResponse {
    window_minutes: i64,
    sweep_interval_minutes: u64,
    utc_offset: String,
    last_sweep: Option<SweepReport>,
}

// GET /api/admin/status
pub async fn get_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<StatusResponse>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    Ok(Json(StatusResponse {
        window_minutes: state.scheduler.window().num_minutes(),
        sweep_interval_minutes: state.config.sweep_interval_minutes,
        utc_offset: state.utc_offset.to_string(),
        last_sweep: state.scheduler.last_report(),
    }))
}
