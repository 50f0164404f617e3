use std::sync::{Arc, Mutex};

use tracing_subscriber::EnvFilter;

use bookingdesk::config::AppConfig;
use bookingdesk::db::{self, SqliteBookingStore};
use bookingdesk::handlers;
use bookingdesk::services::ai::azure::AzureOpenAiProvider;
use bookingdesk::services::ai::ollama::OllamaProvider;
use bookingdesk::services::ai::LlmProvider;
use bookingdesk::services::messaging::whatsapp::WhatsAppProvider;
use bookingdesk::services::messaging::MessagingProvider;
use bookingdesk::services::reminders::{ReminderTemplates, TemplateReminderSender};
use bookingdesk::services::scheduler::ReminderScheduler;
use bookingdesk::services::store::BookingStore;
use bookingdesk::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();
    config.validate()?;
    let utc_offset = config.utc_offset()?;

    let conn = db::init_db(&config.database_url)?;
    let store: Arc<dyn BookingStore> = Arc::new(SqliteBookingStore::new(Arc::new(Mutex::new(conn))));

    let llm: Box<dyn LlmProvider> = match config.llm_provider.as_str() {
        "ollama" => {
            tracing::info!("using Ollama LLM provider (url: {})", config.ollama_url);
            Box::new(OllamaProvider::new(
                config.ollama_url.clone(),
                config.ollama_model.clone(),
                config.http_timeout(),
            )?)
        }
        _ => {
            anyhow::ensure!(
                !config.azure_openai_endpoint.is_empty() && !config.azure_openai_api_key.is_empty(),
                "AZURE_OPENAI_ENDPOINT and AZURE_OPENAI_API_KEY must be set when LLM_PROVIDER=azure"
            );
            tracing::info!(
                "using Azure OpenAI provider (deployment: {})",
                config.azure_openai_deployment
            );
            Box::new(AzureOpenAiProvider::new(
                config.azure_openai_endpoint.clone(),
                config.azure_openai_api_key.clone(),
                config.azure_openai_deployment.clone(),
                config.azure_openai_api_version.clone(),
                config.http_timeout(),
            )?)
        }
    };

    if config.whatsapp_token.is_empty() {
        tracing::warn!("WHATSAPP_TOKEN not set, outbound messages will be rejected");
    }
    let messaging: Arc<dyn MessagingProvider> = Arc::new(WhatsAppProvider::new(
        config.whatsapp_token.clone(),
        &config.graph_api_version,
        config.http_timeout(),
    )?);

    let sender = TemplateReminderSender::new(
        Arc::clone(&messaging),
        ReminderTemplates {
            language: config.template_language.clone(),
            day_before: config.template_reminder_24h.clone(),
            hour_before: config.template_reminder_1h.clone(),
        },
    );
    let scheduler = Arc::new(ReminderScheduler::new(
        Arc::clone(&store),
        Arc::new(sender),
        config.reminder_window(),
    ));

    tokio::spawn(Arc::clone(&scheduler).run(config.sweep_interval()));

    let state = Arc::new(AppState {
        config: config.clone(),
        utc_offset,
        store,
        llm,
        messaging,
        scheduler,
    });

    let app = handlers::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
