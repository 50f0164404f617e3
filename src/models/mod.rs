pub mod booking;
pub mod inbound;
pub mod intent;

pub use booking::{Booking, BookingFields, BookingKey, Reminder, ReminderKind, ReminderStatus};
pub use inbound::{InboundMessage, PayloadError, WebhookPayload};
pub use intent::{Extraction, Intent, RequiredField};
