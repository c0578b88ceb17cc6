use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::{
    clients::topology::EMAIL_QUEUE,
    dispatch::{DispatchResult, Dispatcher},
    error::{NotificationError, NotificationResult},
    listeners::DeliveryHandler,
    models::{
        message::{DeliveryInfo, EmailMessage},
        validation::validate_email_message,
    },
};

/// Handler for the `emails` queue: schema-check the payload, then hand it
/// to the dispatch pipeline.
pub struct EmailHandler {
    dispatcher: Arc<Dispatcher>,
}

impl EmailHandler {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl DeliveryHandler for EmailHandler {
    fn queue(&self) -> &'static str {
        EMAIL_QUEUE
    }

    async fn handle(
        &self,
        payload: serde_json::Value,
        info: &DeliveryInfo,
    ) -> NotificationResult<DispatchResult> {
        let message: EmailMessage = serde_json::from_value(payload)
            .map_err(|e| NotificationError::Validation(format!("invalid email message: {}", e)))?;

        validate_email_message(&message)?;

        info!(
            message_id = %message.message_id,
            to = %message.to,
            notification_type = %message.notification_type,
            routing_key = %info.routing_key,
            "Email message received"
        );

        self.dispatcher.dispatch_email(&message).await
    }
}
