use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::{
    clients::topology::PUSH_QUEUE,
    dispatch::{DispatchResult, Dispatcher},
    error::{NotificationError, NotificationResult},
    listeners::DeliveryHandler,
    models::{
        message::{BroadcastMessage, DeliveryInfo, PushMessage},
        validation::{validate_broadcast_message, validate_push_message},
    },
};

/// Handler for the `push-notifications` queue. The inbound `type` field
/// discriminates single notifications from broadcasts; each shape has its
/// own schema and validation.
pub struct PushHandler {
    dispatcher: Arc<Dispatcher>,
}

impl PushHandler {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl DeliveryHandler for PushHandler {
    fn queue(&self) -> &'static str {
        PUSH_QUEUE
    }

    async fn handle(
        &self,
        payload: serde_json::Value,
        info: &DeliveryInfo,
    ) -> NotificationResult<DispatchResult> {
        let is_broadcast = payload
            .get("type")
            .and_then(serde_json::Value::as_str)
            .is_some_and(|t| t == "broadcast");

        if is_broadcast {
            let message: BroadcastMessage = serde_json::from_value(payload).map_err(|e| {
                NotificationError::Validation(format!("invalid broadcast message: {}", e))
            })?;

            validate_broadcast_message(&message)?;

            info!(
                message_id = %message.message_id,
                targets = message.notifications.len(),
                routing_key = %info.routing_key,
                "Broadcast message received"
            );

            self.dispatcher.dispatch_broadcast(&message).await
        } else {
            let message: PushMessage = serde_json::from_value(payload).map_err(|e| {
                NotificationError::Validation(format!("invalid push message: {}", e))
            })?;

            validate_push_message(&message)?;

            info!(
                message_id = %message.message_id,
                notification_type = %message.notification_type,
                routing_key = %info.routing_key,
                "Push message received"
            );

            self.dispatcher.dispatch_push(&message).await
        }
    }
}
