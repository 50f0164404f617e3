use chrono::{DateTime, FixedOffset, Utc};

use crate::models::{BookingFields, BookingKey, Extraction};
use crate::services::time::{self, TimeError};

/// A booking ready to be merged into the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBooking {
    pub key: BookingKey,
    pub fields: BookingFields,
    /// Why reminders were not scheduled, if they were not.
    pub unresolved: Option<TimeError>,
}

/// Builds the booking record for a completed intake.
///
/// When the date and time resolve, the appointment instant and both pending
/// reminders are filled in. Otherwise the booking is still produced, without
/// any reminder fields, so the scheduler ignores it until a later update
/// supplies a usable date.
pub fn build_booking(
    customer_id: &str,
    booking_id: Option<&str>,
    extraction: &Extraction,
    channel_route: &str,
    offset: FixedOffset,
    now: DateTime<Utc>,
) -> NewBooking {
    let booking_id = booking_id
        .filter(|id| !id.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let fields = BookingFields {
        name: non_empty(&extraction.name),
        service: non_empty(&extraction.service),
        category: non_empty(&extraction.category),
        raw_date: non_empty(&extraction.date),
        raw_time: non_empty(&extraction.time),
        contact: non_empty(&extraction.contact),
        notes: non_empty(&extraction.notes),
        channel_route: non_empty(channel_route),
        created_at: Some(now),
        ..Default::default()
    };

    let (fields, unresolved) =
        match time::normalize(&extraction.date, &extraction.time, offset, now) {
            Ok(appointment) => (fields.with_appointment(appointment), None),
            Err(e) => (fields, Some(e)),
        };

    NewBooking {
        key: BookingKey::new(customer_id, booking_id),
        fields,
        unresolved,
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}
