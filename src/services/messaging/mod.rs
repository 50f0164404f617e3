pub mod whatsapp;

use async_trait::async_trait;

/// A pre-approved message template with positional body parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateMessage {
    pub name: String,
    pub language: String,
    pub parameters: Vec<String>,
}

/// Outbound messaging transport. `route` selects the business number the
/// message is sent from.
#[async_trait]
pub trait MessagingProvider: Send + Sync {
    async fn send_text(&self, route: &str, to: &str, body: &str) -> anyhow::Result<()>;

    async fn send_template(
        &self,
        route: &str,
        to: &str,
        template: &TemplateMessage,
    ) -> anyhow::Result<()>;
}
