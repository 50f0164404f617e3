use crate::models::Extraction;
use crate::services::ai::{LlmProvider, Message};

const SYSTEM_PROMPT: &str = r#"You are the booking assistant of a technology consultancy. Read the customer's WhatsApp message and decide whether it is a request to schedule an appointment.

Return ONLY valid JSON (no markdown, no explanation) with this exact structure:
{
  "intent": "schedule|info|handoff|unknown",
  "name": "customer's full name or empty",
  "service": "requested service or empty",
  "category": "one of the categories below or empty",
  "date": "date as written, like 20/08/2025 or 20/08, or empty",
  "time": "time as written, like 14:00 or 14h, or empty",
  "contact": "phone number or e-mail or empty",
  "notes": "anything else relevant or empty"
}

Categories: Web & Apps, AI Solutions, Cloud & DevOps, Telecom - Networks & Fiber, Documentation & Improvement, IT Consulting.

Intent rules:
- "schedule": the customer wants to book an appointment
- "info": the customer asks about services, prices or availability
- "handoff": the customer asks to talk to a human, an attendant or by phone
- "unknown": anything else

Keep dates in day/month order exactly as the customer wrote them. Never invent values; leave a field empty when the message does not contain it.
"#;

/// Extracts booking intent and fields from one customer message.
///
/// Provider failures are logged and reported as an unknown intent with empty
/// fields, so the conversation falls through to the generic reply.
pub async fn extract_booking(llm: &dyn LlmProvider, owner_name: &str, text: &str) -> Extraction {
    let system = format!("{SYSTEM_PROMPT}\nThe consultant's name is {owner_name}.");

    match llm.chat(&system, &[Message::user(text)]).await {
        Ok(response) => parse_extraction(&response),
        Err(e) => {
            tracing::error!(error = %e, "extraction call failed");
            Extraction::default()
        }
    }
}

fn parse_extraction(response: &str) -> Extraction {
    if let Ok(extraction) = serde_json::from_str::<Extraction>(response) {
        return extraction;
    }

    // Strip markdown code fences
    let cleaned = response
        .trim()
        .strip_prefix("```json")
        .or_else(|| response.trim().strip_prefix("```"))
        .unwrap_or(response.trim());
    let cleaned = cleaned.strip_suffix("```").unwrap_or(cleaned).trim();

    if let Ok(extraction) = serde_json::from_str::<Extraction>(cleaned) {
        return extraction;
    }

    if let (Some(start), Some(end)) = (cleaned.find('{'), cleaned.rfind('}')) {
        if start < end {
            if let Ok(extraction) = serde_json::from_str::<Extraction>(&cleaned[start..=end]) {
                return extraction;
            }
        }
    }

    tracing::warn!("failed to parse extraction response as JSON, treating as unknown");
    Extraction::default()
}
