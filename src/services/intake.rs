use std::sync::Arc;

use chrono::Utc;

use crate::models::{BookingKey, Extraction, InboundMessage, Intent, RequiredField};
use crate::services::ai::extract::extract_booking;
use crate::services::booking::build_booking;
use crate::services::messaging::TemplateMessage;
use crate::state::AppState;

const NON_TEXT_REPLY: &str =
    "Hi! I'm the booking assistant. Could you send your message as text? 🙂";
const BOOKED_REPLY: &str = "✅ Booking registered! You will get automatic reminders before the appointment. Just message here if anything changes.";
const BOOKING_FAILED_REPLY: &str =
    "Sorry, I couldn't register your booking right now. Please try again in a moment.";
const INFO_REPLY: &str = "I can help you pick a service, or check availability for a specific date and time 🙂.";

/// What happened to one inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum IntakeOutcome {
    Booked {
        key: BookingKey,
        reminders_scheduled: bool,
    },
    BookingFailed,
    HandedOff,
    MissingFields(Vec<RequiredField>),
    Info,
    NonText,
}

/// Handles one customer message end to end. Never fails: every path ends in
/// an outcome the webhook can acknowledge.
pub async fn handle_message(state: &Arc<AppState>, msg: &InboundMessage) -> IntakeOutcome {
    let Some(text) = msg.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) else {
        reply(state, msg, NON_TEXT_REPLY).await;
        return IntakeOutcome::NonText;
    };

    let extraction = extract_booking(state.llm.as_ref(), &state.config.owner_name, text).await;
    let missing = extraction.missing_fields();

    tracing::info!(
        from = %msg.from,
        intent = ?extraction.intent,
        missing = missing.len(),
        "processing message"
    );

    match extraction.intent {
        Intent::Handoff => {
            let summary = owner_summary("🙋 Customer asked for a human", &msg.from, &extraction, "Human requested");
            notify_owner(state, &msg.channel_route, &summary).await;
            let text = format!(
                "Of course! I'm connecting you with {}. They have been notified and will talk to you here 💬.",
                state.config.owner_name
            );
            reply(state, msg, &text).await;
            IntakeOutcome::HandedOff
        }
        Intent::Schedule if missing.is_empty() => save_and_confirm(state, msg, &extraction).await,
        _ if !missing.is_empty() => {
            prompt_missing(state, msg, &missing).await;
            IntakeOutcome::MissingFields(missing)
        }
        _ => {
            reply(state, msg, INFO_REPLY).await;
            IntakeOutcome::Info
        }
    }
}

async fn save_and_confirm(state: &Arc<AppState>, msg: &InboundMessage, extraction: &Extraction) -> IntakeOutcome {
    let new = build_booking(
        &msg.from,
        msg.message_id.as_deref(),
        extraction,
        &msg.channel_route,
        state.utc_offset,
        Utc::now(),
    );

    if let Some(e) = &new.unresolved {
        tracing::warn!(
            error = %e,
            booking = %new.key,
            "appointment time unresolved, booking saved without reminders"
        );
    }

    if let Err(e) = state.store.upsert_merge(&new.key, &new.fields).await {
        tracing::error!(error = %e, booking = %new.key, "failed to save booking");
        reply(state, msg, BOOKING_FAILED_REPLY).await;
        return IntakeOutcome::BookingFailed;
    }

    reply(state, msg, BOOKED_REPLY).await;

    let template = TemplateMessage {
        name: state.config.template_confirmation.clone(),
        language: state.config.template_language.clone(),
        parameters: vec![
            extraction.name.clone(),
            extraction.service.clone(),
            extraction.date.clone(),
            extraction.time.clone(),
        ],
    };
    if let Err(e) = state
        .messaging
        .send_template(&msg.channel_route, &msg.from, &template)
        .await
    {
        tracing::error!(error = %e, booking = %new.key, "failed to send confirmation template");
    }

    let summary = owner_summary("🔔 New booking", &msg.from, extraction, "-");
    notify_owner(state, &msg.channel_route, &summary).await;

    IntakeOutcome::Booked {
        reminders_scheduled: new.unresolved.is_none(),
        key: new.key,
    }
}

async fn prompt_missing(state: &Arc<AppState>, msg: &InboundMessage, missing: &[RequiredField]) {
    let items = missing
        .iter()
        .map(|f| f.label())
        .collect::<Vec<_>>()
        .join(", ");
    reply(state, msg, &format!("✨ Great! To complete your booking, please tell me: {items}.")).await;
}

fn owner_summary(title: &str, from: &str, extraction: &Extraction, default_notes: &str) -> String {
    let or = |v: &str, fallback: &str| {
        if v.is_empty() {
            fallback.to_string()
        } else {
            v.to_string()
        }
    };

    format!(
        "{title}\nCustomer: {} ({from})\nService: {} ({})\nWhen: {} {}\nContact: {}\nNotes: {}",
        or(&extraction.name, "(no name)"),
        or(&extraction.service, "(no service)"),
        extraction.category,
        extraction.date,
        extraction.time,
        extraction.contact,
        or(&extraction.notes, default_notes),
    )
}

async fn reply(state: &Arc<AppState>, msg: &InboundMessage, text: &str) {
    if let Err(e) = state
        .messaging
        .send_text(&msg.channel_route, &msg.from, text)
        .await
    {
        tracing::error!(error = %e, to = %msg.from, "failed to send reply");
    }
}

async fn notify_owner(state: &Arc<AppState>, route: &str, message: &str) {
    if state.config.owner_whatsapp.is_empty() {
        tracing::warn!("OWNER_WHATSAPP not configured, skipping notification");
        return;
    }

    if let Err(e) = state
        .messaging
        .send_text(route, &state.config.owner_whatsapp, message)
        .await
    {
        tracing::error!(error = %e, "failed to notify owner");
    }
}
