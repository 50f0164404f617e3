use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::errors::StoreError;
use crate::models::{
    Booking, BookingFields, BookingKey, Reminder, ReminderKind, ReminderStatus,
};
use crate::services::store::{BookingStore, ScanPage};

const BOOKING_COLUMNS: &str = "customer_id, booking_id, name, service, category, raw_date, raw_time, \
     contact, notes, appointment_utc, reminder_24h_at, reminder_24h_status, reminder_1h_at, \
     reminder_1h_status, channel_route, created_at";

/// SQLite-backed booking table with merge-update semantics.
#[derive(Clone)]
pub struct SqliteBookingStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBookingStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

#[async_trait]
impl BookingStore for SqliteBookingStore {
    async fn upsert_merge(&self, key: &BookingKey, fields: &BookingFields) -> Result<(), StoreError> {
        let created_at = fields.created_at.unwrap_or_else(Utc::now);
        let db = self.lock()?;
        db.execute(
            "INSERT INTO bookings (customer_id, booking_id, name, service, category, raw_date, raw_time,
                contact, notes, appointment_utc, reminder_24h_at, reminder_24h_status, reminder_1h_at,
                reminder_1h_status, channel_route, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
             ON CONFLICT(customer_id, booking_id) DO UPDATE SET
               name = COALESCE(excluded.name, bookings.name),
               service = COALESCE(excluded.service, bookings.service),
               category = COALESCE(excluded.category, bookings.category),
               raw_date = COALESCE(excluded.raw_date, bookings.raw_date),
               raw_time = COALESCE(excluded.raw_time, bookings.raw_time),
               contact = COALESCE(excluded.contact, bookings.contact),
               notes = COALESCE(excluded.notes, bookings.notes),
               appointment_utc = COALESCE(excluded.appointment_utc, bookings.appointment_utc),
               reminder_24h_at = COALESCE(excluded.reminder_24h_at, bookings.reminder_24h_at),
               reminder_24h_status = CASE WHEN bookings.reminder_24h_status = 'sent' THEN 'sent'
                 ELSE COALESCE(excluded.reminder_24h_status, bookings.reminder_24h_status) END,
               reminder_1h_at = COALESCE(excluded.reminder_1h_at, bookings.reminder_1h_at),
               reminder_1h_status = CASE WHEN bookings.reminder_1h_status = 'sent' THEN 'sent'
                 ELSE COALESCE(excluded.reminder_1h_status, bookings.reminder_1h_status) END,
               channel_route = COALESCE(excluded.channel_route, bookings.channel_route)",
            params![
                key.customer_id,
                key.booking_id,
                fields.name,
                fields.service,
                fields.category,
                fields.raw_date,
                fields.raw_time,
                fields.contact,
                fields.notes,
                fields.appointment_utc.map(format_ts),
                fields.reminder_24h.map(|r| format_ts(r.due_at)),
                fields.reminder_24h.map(|r| r.status.as_str()),
                fields.reminder_1h.map(|r| format_ts(r.due_at)),
                fields.reminder_1h.map(|r| r.status.as_str()),
                fields.channel_route,
                format_ts(created_at),
            ],
        )?;
        Ok(())
    }

    async fn scan_page(&self, after: Option<&BookingKey>, limit: usize) -> Result<ScanPage, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let db = self.lock()?;

        let rows = match after {
            Some(cursor) => {
                let mut stmt = db.prepare(&format!(
                    "SELECT {BOOKING_COLUMNS} FROM bookings
                     WHERE customer_id > ?1 OR (customer_id = ?1 AND booking_id > ?2)
                     ORDER BY customer_id, booking_id LIMIT ?3"
                ))?;
                let rows = stmt
                    .query_map(params![cursor.customer_id, cursor.booking_id, limit], read_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let mut stmt = db.prepare(&format!(
                    "SELECT {BOOKING_COLUMNS} FROM bookings ORDER BY customer_id, booking_id LIMIT ?1"
                ))?;
                let rows = stmt
                    .query_map(params![limit], read_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
        };
        drop(db);

        let next = if rows.len() as i64 == limit {
            rows.last().map(|r| r.key.clone())
        } else {
            None
        };

        let mut bookings = Vec::with_capacity(rows.len());
        for row in rows {
            match row.into_booking() {
                Ok(booking) => bookings.push(booking),
                Err(e) => tracing::warn!(error = %e, "skipping unreadable booking"),
            }
        }

        Ok(ScanPage { bookings, next })
    }

    async fn update_status(
        &self,
        key: &BookingKey,
        kind: ReminderKind,
        status: ReminderStatus,
    ) -> Result<bool, StoreError> {
        let (at_col, status_col) = reminder_columns(kind);
        let db = self.lock()?;
        let count = db.execute(
            &format!(
                "UPDATE bookings
                 SET {status_col} = CASE WHEN {status_col} = 'sent' THEN 'sent' ELSE ?1 END
                 WHERE customer_id = ?2 AND booking_id = ?3 AND {at_col} IS NOT NULL"
            ),
            params![status.as_str(), key.customer_id, key.booking_id],
        )?;
        Ok(count > 0)
    }

    async fn get(&self, key: &BookingKey) -> Result<Option<Booking>, StoreError> {
        let row = {
            let db = self.lock()?;
            db.query_row(
                &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE customer_id = ?1 AND booking_id = ?2"),
                params![key.customer_id, key.booking_id],
                read_row,
            )
            .optional()?
        };

        row.map(BookingRow::into_booking).transpose()
    }
}

fn reminder_columns(kind: ReminderKind) -> (&'static str, &'static str) {
    match kind {
        ReminderKind::DayBefore => ("reminder_24h_at", "reminder_24h_status"),
        ReminderKind::HourBefore => ("reminder_1h_at", "reminder_1h_status"),
    }
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Raw column values; conversion is separate so a bad record can be skipped
/// without losing the scan position.
struct BookingRow {
    key: BookingKey,
    name: Option<String>,
    service: Option<String>,
    category: Option<String>,
    raw_date: Option<String>,
    raw_time: Option<String>,
    contact: Option<String>,
    notes: Option<String>,
    appointment_utc: Option<String>,
    reminder_24h_at: Option<String>,
    reminder_24h_status: Option<String>,
    reminder_1h_at: Option<String>,
    reminder_1h_status: Option<String>,
    channel_route: Option<String>,
    created_at: String,
}

fn read_row(row: &rusqlite::Row) -> rusqlite::Result<BookingRow> {
    Ok(BookingRow {
        key: BookingKey::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?),
        name: row.get(2)?,
        service: row.get(3)?,
        category: row.get(4)?,
        raw_date: row.get(5)?,
        raw_time: row.get(6)?,
        contact: row.get(7)?,
        notes: row.get(8)?,
        appointment_utc: row.get(9)?,
        reminder_24h_at: row.get(10)?,
        reminder_24h_status: row.get(11)?,
        reminder_1h_at: row.get(12)?,
        reminder_1h_status: row.get(13)?,
        channel_route: row.get(14)?,
        created_at: row.get(15)?,
    })
}

impl BookingRow {
    fn into_booking(self) -> Result<Booking, StoreError> {
        let key = self.key;
        let corrupt = |reason: String| StoreError::Corrupt {
            key: key.clone(),
            reason,
        };

        let appointment_utc = self
            .appointment_utc
            .as_deref()
            .map(parse_ts)
            .transpose()
            .map_err(&corrupt)?;
        let reminder_24h = parse_reminder(self.reminder_24h_at, self.reminder_24h_status)
            .map_err(&corrupt)?;
        let reminder_1h =
            parse_reminder(self.reminder_1h_at, self.reminder_1h_status).map_err(&corrupt)?;
        let created_at = parse_ts(&self.created_at).map_err(&corrupt)?;

        Ok(Booking {
            customer_id: key.customer_id,
            booking_id: key.booking_id,
            name: self.name,
            service: self.service,
            category: self.category,
            raw_date: self.raw_date,
            raw_time: self.raw_time,
            contact: self.contact,
            notes: self.notes,
            appointment_utc,
            reminder_24h,
            reminder_1h,
            channel_route: self.channel_route,
            created_at,
        })
    }
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("bad timestamp {s:?}: {e}"))
}

fn parse_reminder(at: Option<String>, status: Option<String>) -> Result<Option<Reminder>, String> {
    match (at, status) {
        (None, None) => Ok(None),
        (Some(at), Some(status)) => {
            let due_at = parse_ts(&at)?;
            let status = ReminderStatus::parse(&status)
                .ok_or_else(|| format!("unknown reminder status {status:?}"))?;
            Ok(Some(Reminder { due_at, status }))
        }
        (Some(_), None) => Err("reminder time without status".to_string()),
        (None, Some(_)) => Err("reminder status without time".to_string()),
    }
}
