use std::sync::Arc;

use chrono::FixedOffset;

use crate::config::AppConfig;
use crate::services::ai::LlmProvider;
use crate::services::messaging::MessagingProvider;
use crate::services::scheduler::ReminderScheduler;
use crate::services::store::BookingStore;

pub struct AppState {
    pub config: AppConfig,
    /// Parsed `LOCAL_UTC_OFFSET`.
    pub utc_offset: FixedOffset,
    pub store: Arc<dyn BookingStore>,
    pub llm: Box<dyn LlmProvider>,
    pub messaging: Arc<dyn MessagingProvider>,
    pub scheduler: Arc<ReminderScheduler>,
}
