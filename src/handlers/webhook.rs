use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::errors::AppError;
use crate::models::WebhookPayload;
use crate::services::intake;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// Subscription handshake: echo the challenge when the token matches.
pub async fn verify(State(state): State<Arc<AppState>>, Query(query): Query<VerifyQuery>) -> Response {
    let token_ok = !state.config.verify_token.is_empty()
        && query.verify_token.as_deref() == Some(state.config.verify_token.as_str());

    match (query.mode.as_deref(), query.challenge) {
        (Some("subscribe"), Some(challenge)) if token_ok && !challenge.is_empty() => {
            tracing::info!("webhook subscription verified");
            (StatusCode::OK, challenge).into_response()
        }
        _ => {
            tracing::warn!("webhook verification rejected");
            (StatusCode::FORBIDDEN, "Verification failed").into_response()
        }
    }
}

/// Checks an `X-Hub-Signature-256` header (`sha256=<hex>`) against the raw body.
fn validate_signature(app_secret: &str, header: &str, body: &[u8]) -> bool {
    let Some(signature) = header.strip_prefix("sha256=").and_then(decode_hex) else {
        return false;
    };

    let mut mac = match Hmac::<Sha256>::new_from_slice(app_secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return false,
    };
    mac.update(body);
    // Constant-time comparison
    mac.verify_slice(&signature).is_ok()
}

fn decode_hex(text: &str) -> Option<Vec<u8>> {
    if text.len() % 2 != 0 || !text.is_ascii() {
        return None;
    }
    (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&text[i..i + 2], 16).ok())
        .collect()
}

pub async fn receive(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    // Signature check is skipped when no app secret is configured (dev mode)
    if !state.config.whatsapp_app_secret.is_empty() {
        let signature = headers
            .get("x-hub-signature-256")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        if signature.is_empty() {
            tracing::warn!("missing X-Hub-Signature-256 header");
            return Err(AppError::Forbidden("missing signature".to_string()));
        }
        if !validate_signature(&state.config.whatsapp_app_secret, signature, &body) {
            tracing::warn!("invalid X-Hub-Signature-256");
            return Err(AppError::Forbidden("invalid signature".to_string()));
        }
    }

    let payload: WebhookPayload = serde_json::from_slice(&body).map_err(|e| {
        tracing::warn!(error = %e, "webhook body is not a valid payload");
        AppError::MalformedPayload(e.to_string())
    })?;

    let message = match payload.first_message() {
        Ok(Some(message)) => message,
        // Delivery and read receipts
        Ok(None) => return Ok(ack()),
        Err(e) => {
            tracing::warn!(error = %e, "webhook payload missing expected structure");
            return Err(AppError::MalformedPayload(e.to_string()));
        }
    };

    tracing::info!(from = %message.from, id = ?message.message_id, "incoming WhatsApp message");

    let outcome = intake::handle_message(&state, &message).await;
    tracing::debug!(?outcome, "message handled");

    Ok(ack())
}

fn ack() -> Response {
    (StatusCode::OK, "EVENT_RECEIVED").into_response()
}
