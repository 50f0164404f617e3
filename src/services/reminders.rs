use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::NotifyError;
use crate::models::{Booking, ReminderKind};
use crate::services::messaging::{MessagingProvider, TemplateMessage};

/// Delivers one reminder for one booking. Success or failure is all the
/// scheduler needs to know.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, booking: &Booking, kind: ReminderKind) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone)]
pub struct ReminderTemplates {
    pub language: String,
    pub day_before: String,
    pub hour_before: String,
}

/// Sends reminders as WhatsApp templates to the booking's customer.
pub struct TemplateReminderSender {
    messaging: Arc<dyn MessagingProvider>,
    templates: ReminderTemplates,
}

impl TemplateReminderSender {
    pub fn new(messaging: Arc<dyn MessagingProvider>, templates: ReminderTemplates) -> Self {
        Self {
            messaging,
            templates,
        }
    }

    pub fn template_for(&self, booking: &Booking, kind: ReminderKind) -> TemplateMessage {
        let name = booking.name.clone().unwrap_or_default();
        let service = booking.service.clone().unwrap_or_default();

        let (template, parameters) = match kind {
            ReminderKind::DayBefore => (
                &self.templates.day_before,
                vec![name, service, booking.raw_time.clone().unwrap_or_default()],
            ),
            ReminderKind::HourBefore => (&self.templates.hour_before, vec![name, service]),
        };

        TemplateMessage {
            name: template.clone(),
            language: self.templates.language.clone(),
            parameters,
        }
    }
}

#[async_trait]
impl NotificationSender for TemplateReminderSender {
    async fn send(&self, booking: &Booking, kind: ReminderKind) -> Result<(), NotifyError> {
        let route = booking
            .channel_route
            .as_deref()
            .filter(|r| !r.is_empty())
            .ok_or_else(|| NotifyError::MissingRoute(booking.key()))?;

        let template = self.template_for(booking, kind);
        self.messaging
            .send_template(route, &booking.customer_id, &template)
            .await?;
        Ok(())
    }
}
