use std::env;

use chrono::{Duration, FixedOffset};

use crate::services::time::parse_utc_offset;

/// Lookback windows beyond a day would resend long-stale reminders.
const MAX_REMINDER_WINDOW_MINUTES: i64 = 24 * 60;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub admin_token: String,
    pub verify_token: String,
    pub whatsapp_token: String,
    pub whatsapp_app_secret: String,
    pub graph_api_version: String,
    pub owner_whatsapp: String,
    pub owner_name: String,
    pub llm_provider: String,
    pub azure_openai_endpoint: String,
    pub azure_openai_api_key: String,
    pub azure_openai_deployment: String,
    pub azure_openai_api_version: String,
    pub ollama_url: String,
    pub ollama_model: String,
    pub local_utc_offset: String,
    pub reminder_window_minutes: i64,
    pub sweep_interval_minutes: u64,
    pub http_timeout_secs: u64,
    pub template_language: String,
    pub template_reminder_24h: String,
    pub template_reminder_1h: String,
    pub template_confirmation: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "bookingdesk.db".to_string()),
            admin_token: env::var("ADMIN_TOKEN").unwrap_or_else(|_| "changeme".to_string()),
            verify_token: env::var("VERIFY_TOKEN").unwrap_or_default(),
            whatsapp_token: env::var("WHATSAPP_TOKEN").unwrap_or_default(),
            whatsapp_app_secret: env::var("WHATSAPP_APP_SECRET").unwrap_or_default(),
            graph_api_version: env::var("GRAPH_API_VERSION").unwrap_or_else(|_| "v20.0".to_string()),
            owner_whatsapp: env::var("OWNER_WHATSAPP").unwrap_or_default(),
            owner_name: env::var("OWNER_NAME").unwrap_or_else(|_| "the consultant".to_string()),
            llm_provider: env::var("LLM_PROVIDER").unwrap_or_else(|_| "azure".to_string()),
            azure_openai_endpoint: env::var("AZURE_OPENAI_ENDPOINT").unwrap_or_default(),
            azure_openai_api_key: env::var("AZURE_OPENAI_API_KEY").unwrap_or_default(),
            azure_openai_deployment: env::var("AZURE_OPENAI_DEPLOYMENT")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            azure_openai_api_version: env::var("AZURE_OPENAI_API_VERSION")
                .unwrap_or_else(|_| "2024-08-01-preview".to_string()),
            ollama_url: env::var("OLLAMA_URL")
                .unwrap_or_else(|_| "http://localhost:11434".to_string()),
            ollama_model: env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3.2".to_string()),
            local_utc_offset: env::var("LOCAL_UTC_OFFSET").unwrap_or_else(|_| "-03:00".to_string()),
            reminder_window_minutes: env::var("REMINDER_WINDOW_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(7),
            sweep_interval_minutes: env::var("SWEEP_INTERVAL_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            http_timeout_secs: env::var("HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(15),
            template_language: env::var("TEMPLATE_LANGUAGE").unwrap_or_else(|_| "pt_BR".to_string()),
            template_reminder_24h: env::var("TEMPLATE_REMINDER_24H")
                .unwrap_or_else(|_| "reminder_24h".to_string()),
            template_reminder_1h: env::var("TEMPLATE_REMINDER_1H")
                .unwrap_or_else(|_| "reminder_1h".to_string()),
            template_confirmation: env::var("TEMPLATE_CONFIRMATION")
                .unwrap_or_else(|_| "booking_confirmation".to_string()),
        }
    }

    /// Checks the values the scheduler and normalizer depend on.
    pub fn validate(&self) -> anyhow::Result<()> {
        parse_utc_offset(&self.local_utc_offset)
            .map_err(|e| anyhow::anyhow!("LOCAL_UTC_OFFSET: {e}"))?;
        anyhow::ensure!(
            self.reminder_window_minutes > 0,
            "REMINDER_WINDOW_MINUTES must be positive"
        );
        anyhow::ensure!(
            self.reminder_window_minutes <= MAX_REMINDER_WINDOW_MINUTES,
            "REMINDER_WINDOW_MINUTES must be at most {MAX_REMINDER_WINDOW_MINUTES} (one day)"
        );
        anyhow::ensure!(self.sweep_interval_minutes > 0, "SWEEP_INTERVAL_MINUTES must be positive");
        anyhow::ensure!(
            self.sweep_interval_minutes as i64 <= self.reminder_window_minutes,
            "SWEEP_INTERVAL_MINUTES ({}) exceeds REMINDER_WINDOW_MINUTES ({}); reminders would fall between ticks",
            self.sweep_interval_minutes,
            self.reminder_window_minutes
        );
        Ok(())
    }

    pub fn utc_offset(&self) -> anyhow::Result<FixedOffset> {
        parse_utc_offset(&self.local_utc_offset)
            .map_err(|e| anyhow::anyhow!("LOCAL_UTC_OFFSET: {e}"))
    }

    pub fn reminder_window(&self) -> Duration {
        Duration::minutes(self.reminder_window_minutes)
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_minutes * 60)
    }

    pub fn http_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.http_timeout_secs)
    }
}
