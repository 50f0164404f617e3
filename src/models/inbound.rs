use serde::Deserialize;

// WhatsApp Cloud API webhook body; only the parts the assistant reads.

#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub entry: Vec<WebhookEntry>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookEntry {
    #[serde(default)]
    pub changes: Vec<WebhookChange>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookChange {
    #[serde(default)]
    pub value: ChangeValue,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChangeValue {
    pub metadata: Option<ChangeMetadata>,
    #[serde(default)]
    pub messages: Vec<WebhookMessage>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeMetadata {
    pub phone_number_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookMessage {
    pub id: Option<String>,
    pub from: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    pub text: Option<TextBody>,
}

#[derive(Debug, Deserialize)]
pub struct TextBody {
    pub body: String,
}

/// One customer message, flattened out of the webhook envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub from: String,
    /// Business phone number id the message arrived on; replies go out through it.
    pub channel_route: String,
    pub message_id: Option<String>,
    /// `None` for media, stickers, locations and other non-text messages.
    pub text: Option<String>,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PayloadError {
    #[error("payload has no entry")]
    NoEntry,
    #[error("entry has no changes")]
    NoChange,
    #[error("change has no phone_number_id")]
    NoRoute,
}

impl WebhookPayload {
    /// The first message of the first change, if any. Status callbacks carry
    /// no messages and yield `Ok(None)`.
    pub fn first_message(self) -> Result<Option<InboundMessage>, PayloadError> {
        let entry = self.entry.into_iter().next().ok_or(PayloadError::NoEntry)?;
        let change = entry.changes.into_iter().next().ok_or(PayloadError::NoChange)?;
        let value = change.value;

        let Some(message) = value.messages.into_iter().next() else {
            return Ok(None);
        };

        let channel_route = value
            .metadata
            .and_then(|m| m.phone_number_id)
            .filter(|id| !id.is_empty())
            .ok_or(PayloadError::NoRoute)?;

        let text = match message.kind.as_str() {
            "text" => message.text.map(|t| t.body),
            _ => None,
        };

        Ok(Some(InboundMessage {
            from: message.from,
            channel_route,
            message_id: message.id,
            text,
        }))
    }
}
