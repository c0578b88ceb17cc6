use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

/// Message consumed from the `emails` queue.
///
/// Unknown fields are dropped on deserialization; a missing `messageId`
/// is backfilled by the listener before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailMessage {
    pub message_id: String,
    pub to: String,

    #[serde(rename = "type")]
    pub notification_type: String,

    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub template: Option<String>,

    #[serde(default)]
    pub variables: HashMap<String, serde_json::Value>,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Individual message consumed from the `push-notifications` queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
    pub message_id: String,

    #[serde(default)]
    pub user_id: Option<serde_json::Value>,
    #[serde(default)]
    pub fcm_token: Option<String>,

    #[serde(rename = "type")]
    pub notification_type: String,

    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,

    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub variables: HashMap<String, serde_json::Value>,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Broadcast variant on the push queue, selected by `type: "broadcast"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastMessage {
    pub message_id: String,

    pub title: String,
    pub body: String,

    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,

    pub notifications: Vec<BroadcastTarget>,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastTarget {
    #[serde(default)]
    pub user_id: Option<serde_json::Value>,
    #[serde(default)]
    pub fcm_token: Option<String>,
    #[serde(default)]
    pub custom_data: HashMap<String, serde_json::Value>,
}

/// Envelope metadata the listener builds from the raw broker delivery.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryInfo {
    pub queue: String,
    pub exchange: String,
    pub routing_key: String,
    pub message_id: String,
    pub timestamp: Option<u64>,
}
