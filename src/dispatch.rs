//! Dispatch pipeline: template resolution, variable substitution, and
//! provider selection for validated queue messages.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::{
    error::NotificationResult,
    models::message::{BroadcastMessage, EmailMessage, PushMessage},
    providers::{BroadcastPayload, EmailPayload, ProviderRegistry, PushPayload},
    templates,
};

/// The text that actually went to the backend, after template resolution
/// and substitution. `subject` doubles as the push title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedContent {
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DispatchResult {
    pub success: bool,
    pub provider: String,
    pub sent_at: DateTime<Utc>,
    pub rendered: RenderedContent,
    pub response: serde_json::Value,
}

pub struct Dispatcher {
    registry: Arc<ProviderRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }

    /// Resolve content (template only where the message left gaps), render
    /// placeholders, and hand the payload to the active email backend.
    /// Provider failures propagate to the listener as transient errors.
    pub async fn dispatch_email(&self, message: &EmailMessage) -> NotificationResult<DispatchResult> {
        let (subject, body, template) = if message.subject.is_none() || message.body.is_none() {
            let resolved = templates::resolve_email(&message.notification_type, &message.variables);
            (
                message.subject.clone().unwrap_or(resolved.subject),
                message.body.clone().unwrap_or(resolved.body),
                message
                    .template
                    .clone()
                    .unwrap_or_else(|| resolved.variant.to_string()),
            )
        } else {
            (
                templates::render(message.subject.as_deref().unwrap_or_default(), &message.variables),
                templates::render(message.body.as_deref().unwrap_or_default(), &message.variables),
                message.template.clone().unwrap_or_default(),
            )
        };

        debug!(
            message_id = %message.message_id,
            notification_type = %message.notification_type,
            template = %template,
            "Dispatching email"
        );

        let payload = EmailPayload {
            message_id: message.message_id.clone(),
            to: message.to.clone(),
            subject,
            body,
            template: (!template.is_empty()).then_some(template),
            variables: message.variables.clone(),
        };

        let provider = self.registry.email().await;
        let receipt = provider.send(&payload).await?;

        info!(
            message_id = %message.message_id,
            provider = %receipt.provider,
            "Email dispatched"
        );

        Ok(DispatchResult {
            success: true,
            provider: receipt.provider.clone(),
            sent_at: receipt.sent_at,
            rendered: RenderedContent {
                subject: payload.subject,
                body: payload.body,
            },
            response: serde_json::to_value(&receipt).unwrap_or_default(),
        })
    }

    pub async fn dispatch_push(&self, message: &PushMessage) -> NotificationResult<DispatchResult> {
        let (title, body) = if message.title.is_none() || message.body.is_none() {
            let resolved = templates::resolve_push(&message.notification_type, &message.variables);
            (
                message.title.clone().unwrap_or(resolved.subject),
                message.body.clone().unwrap_or(resolved.body),
            )
        } else {
            (
                templates::render(message.title.as_deref().unwrap_or_default(), &message.variables),
                templates::render(message.body.as_deref().unwrap_or_default(), &message.variables),
            )
        };

        debug!(
            message_id = %message.message_id,
            notification_type = %message.notification_type,
            "Dispatching push notification"
        );

        let payload = PushPayload {
            message_id: message.message_id.clone(),
            user_id: message.user_id.clone(),
            fcm_token: message.fcm_token.clone(),
            title,
            body,
            data: message.data.clone(),
        };

        let provider = self.registry.push().await;
        let receipt = provider.send(&payload).await?;

        info!(
            message_id = %message.message_id,
            provider = %receipt.provider,
            "Push notification dispatched"
        );

        Ok(DispatchResult {
            success: true,
            provider: receipt.provider.clone(),
            sent_at: receipt.sent_at,
            rendered: RenderedContent {
                subject: payload.title,
                body: payload.body,
            },
            response: serde_json::to_value(&receipt).unwrap_or_default(),
        })
    }

    pub async fn dispatch_broadcast(
        &self,
        message: &BroadcastMessage,
    ) -> NotificationResult<DispatchResult> {
        debug!(
            message_id = %message.message_id,
            targets = message.notifications.len(),
            "Dispatching broadcast"
        );

        let payload = BroadcastPayload {
            message_id: message.message_id.clone(),
            title: message.title.clone(),
            body: message.body.clone(),
            data: message.data.clone(),
            targets: message.notifications.clone(),
        };

        let provider = self.registry.push().await;
        let receipt = provider.send_broadcast(&payload).await?;

        info!(
            message_id = %message.message_id,
            provider = %receipt.provider,
            sent = receipt.sent,
            failed = receipt.failed,
            "Broadcast dispatched"
        );

        Ok(DispatchResult {
            success: true,
            provider: receipt.provider.clone(),
            sent_at: receipt.sent_at,
            rendered: RenderedContent {
                subject: payload.title,
                body: payload.body,
            },
            response: serde_json::to_value(&receipt).unwrap_or_default(),
        })
    }
}
