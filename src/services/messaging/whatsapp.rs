use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::json;

use super::{MessagingProvider, TemplateMessage};

/// WhatsApp Cloud API client.
pub struct WhatsAppProvider {
    token: String,
    api_base: String,
    client: reqwest::Client,
}

impl WhatsAppProvider {
    pub fn new(token: String, api_version: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build WhatsApp HTTP client")?;

        Ok(Self {
            token,
            api_base: format!("https://graph.facebook.com/{api_version}"),
            client,
        })
    }

    async fn post(&self, route: &str, body: serde_json::Value) -> anyhow::Result<()> {
        let url = format!("{}/{route}/messages", self.api_base);

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .context("failed to call WhatsApp API")?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            anyhow::bail!("WhatsApp API error ({status}): {detail}");
        }
        Ok(())
    }
}

pub fn text_body(to: &str, body: &str) -> serde_json::Value {
    json!({
        "messaging_product": "whatsapp",
        "to": to,
        "text": { "body": body },
    })
}

pub fn template_body(to: &str, template: &TemplateMessage) -> serde_json::Value {
    let components = if template.parameters.is_empty() {
        json!([])
    } else {
        let parameters: Vec<_> = template
            .parameters
            .iter()
            .map(|p| json!({ "type": "text", "text": p }))
            .collect();
        json!([{ "type": "body", "parameters": parameters }])
    };

    json!({
        "messaging_product": "whatsapp",
        "to": to,
        "type": "template",
        "template": {
            "name": template.name,
            "language": { "code": template.language },
            "components": components,
        },
    })
}

#[async_trait]
impl MessagingProvider for WhatsAppProvider {
    async fn send_text(&self, route: &str, to: &str, body: &str) -> anyhow::Result<()> {
        self.post(route, text_body(to, body))
            .await
            .context("failed to send WhatsApp text")
    }

    async fn send_template(
        &self,
        route: &str,
        to: &str,
        template: &TemplateMessage,
    ) -> anyhow::Result<()> {
        self.post(route, template_body(to, template))
            .await
            .with_context(|| format!("failed to send WhatsApp template {}", template.name))
    }
}
