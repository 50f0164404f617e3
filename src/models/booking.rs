use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity of a booking: partition key (customer) plus row key (booking).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookingKey {
    pub customer_id: String,
    pub booking_id: String,
}

impl BookingKey {
    pub fn new(customer_id: impl Into<String>, booking_id: impl Into<String>) -> Self {
        Self {
            customer_id: customer_id.into(),
            booking_id: booking_id.into(),
        }
    }
}

impl std::fmt::Display for BookingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.customer_id, self.booking_id)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ReminderKind {
    #[serde(rename = "24h")]
    DayBefore,
    #[serde(rename = "1h")]
    HourBefore,
}

impl ReminderKind {
    pub const ALL: [ReminderKind; 2] = [ReminderKind::DayBefore, ReminderKind::HourBefore];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderKind::DayBefore => "24h",
            ReminderKind::HourBefore => "1h",
        }
    }

    /// How long before the appointment this reminder fires.
    pub fn lead_time(&self) -> chrono::Duration {
        match self {
            ReminderKind::DayBefore => chrono::Duration::hours(24),
            ReminderKind::HourBefore => chrono::Duration::hours(1),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReminderStatus {
    Pending,
    Sent,
}

impl ReminderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderStatus::Pending => "pending",
            ReminderStatus::Sent => "sent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ReminderStatus::Pending),
            "sent" => Some(ReminderStatus::Sent),
            _ => None,
        }
    }
}

/// A reminder's due instant together with its delivery state. Keeping them in
/// one value means a status never exists without its timestamp.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reminder {
    pub due_at: DateTime<Utc>,
    pub status: ReminderStatus,
}

impl Reminder {
    pub fn pending(due_at: DateTime<Utc>) -> Self {
        Self {
            due_at,
            status: ReminderStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub customer_id: String,
    pub booking_id: String,
    pub name: Option<String>,
    pub service: Option<String>,
    pub category: Option<String>,
    pub raw_date: Option<String>,
    pub raw_time: Option<String>,
    pub contact: Option<String>,
    pub notes: Option<String>,
    pub appointment_utc: Option<DateTime<Utc>>,
    pub reminder_24h: Option<Reminder>,
    pub reminder_1h: Option<Reminder>,
    pub channel_route: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    pub fn key(&self) -> BookingKey {
        BookingKey::new(&self.customer_id, &self.booking_id)
    }

    pub fn reminder(&self, kind: ReminderKind) -> Option<&Reminder> {
        match kind {
            ReminderKind::DayBefore => self.reminder_24h.as_ref(),
            ReminderKind::HourBefore => self.reminder_1h.as_ref(),
        }
    }
}

/// A merge patch for one booking. `None` means "leave the stored value alone".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookingFields {
    pub name: Option<String>,
    pub service: Option<String>,
    pub category: Option<String>,
    pub raw_date: Option<String>,
    pub raw_time: Option<String>,
    pub contact: Option<String>,
    pub notes: Option<String>,
    pub appointment_utc: Option<DateTime<Utc>>,
    pub reminder_24h: Option<Reminder>,
    pub reminder_1h: Option<Reminder>,
    pub channel_route: Option<String>,
    /// Only applied when the record is created.
    pub created_at: Option<DateTime<Utc>>,
}

impl BookingFields {
    /// Sets the appointment and both derived reminders as pending.
    pub fn with_appointment(mut self, appointment_utc: DateTime<Utc>) -> Self {
        self.appointment_utc = Some(appointment_utc);
        self.reminder_24h = Some(Reminder::pending(
            appointment_utc - ReminderKind::DayBefore.lead_time(),
        ));
        self.reminder_1h = Some(Reminder::pending(
            appointment_utc - ReminderKind::HourBefore.lead_time(),
        ));
        self
    }
}
