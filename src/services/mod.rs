pub mod ai;
pub mod booking;
pub mod intake;
pub mod messaging;
pub mod reminders;
pub mod scheduler;
pub mod store;
pub mod time;
