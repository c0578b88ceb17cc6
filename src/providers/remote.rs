//! Remote delivery backends: forward the resolved payload to a
//! function-as-a-service endpoint and translate its answer into a receipt.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::{Value, json};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    clients::function::{AuthMode, FunctionEndpoint},
    config::Config,
    error::SendError,
    models::provider::{
        BackendKind, BroadcastEntryResult, BroadcastEntryStatus, BroadcastReceipt, HealthResult,
        ProviderDescriptor, ProviderKind, ProviderStats, SendReceipt,
    },
    providers::{BroadcastPayload, EmailPayload, EmailProvider, PushPayload, PushProvider},
};

const EMAIL_PROVIDER_NAME: &str = "remote-email-provider";
const PUSH_PROVIDER_NAME: &str = "remote-push-provider";

const EMAIL_SENDER_PATH: &str = "/api/email-sender";
const PUSH_SENDER_PATH: &str = "/api/PushFunction";

const PAYLOAD_SOURCE: &str = "notification-service";

fn stamp(mut payload: Value) -> Value {
    if let Some(map) = payload.as_object_mut() {
        map.insert("source".to_string(), json!(PAYLOAD_SOURCE));
        map.insert(
            "timestamp".to_string(),
            json!(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
    }
    payload
}

fn masked_token(token: &str) -> String {
    let prefix: String = token.chars().take(20).collect();
    format!("{}...", prefix)
}

pub struct RemoteEmailProvider {
    endpoint: FunctionEndpoint,
    stats: ProviderStats,
}

impl RemoteEmailProvider {
    pub fn new(config: &Config) -> Self {
        Self {
            endpoint: FunctionEndpoint::new(
                &config.email_function_base_url,
                EMAIL_SENDER_PATH,
                &config.email_function_api_key,
                AuthMode::parse(&config.function_auth_mode),
                config.function_timeout_ms,
            ),
            stats: ProviderStats::new(),
        }
    }
}

#[async_trait]
impl EmailProvider for RemoteEmailProvider {
    async fn send(&self, payload: &EmailPayload) -> Result<SendReceipt, SendError> {
        debug!(to = %payload.to, subject = %payload.subject, "Forwarding email to remote function");

        let body = stamp(json!({
            "to": payload.to,
            "subject": payload.subject,
            "body": payload.body,
            "template": payload.template,
            "variables": payload.variables,
        }));

        let response = match self.endpoint.post(&body).await {
            Ok(response) => response,
            Err(e) => {
                self.stats.record_error();
                return Err(e);
            }
        };

        self.stats.record_sent();

        info!(
            to = %payload.to,
            upstream_status = response.status,
            latency_ms = response.latency_ms,
            "Remote email accepted"
        );

        Ok(SendReceipt {
            message_id: remote_message_id(&response.body),
            provider: EMAIL_PROVIDER_NAME.to_string(),
            sent_at: Utc::now(),
            upstream_status: Some(response.status),
            latency_ms: Some(response.latency_ms),
            response: Some(response.body),
        })
    }

    async fn test_connection(&self) -> HealthResult {
        let probe = stamp(json!({
            "to": "healthcheck@example.com",
            "subject": "Connectivity probe",
            "body": "Connectivity probe",
            "probe": true,
        }));

        match self.endpoint.post(&probe).await {
            Ok(_) => HealthResult::connected(EMAIL_PROVIDER_NAME),
            Err(e) => HealthResult::unavailable(EMAIL_PROVIDER_NAME, e.to_string()),
        }
    }

    fn describe(&self) -> ProviderDescriptor {
        ProviderDescriptor {
            name: EMAIL_PROVIDER_NAME.to_string(),
            kind: ProviderKind::Email,
            backend: BackendKind::Remote,
            stats: self.stats.snapshot(),
        }
    }
}

pub struct RemotePushProvider {
    endpoint: FunctionEndpoint,
    stats: ProviderStats,
}

impl RemotePushProvider {
    pub fn new(config: &Config) -> Self {
        Self {
            endpoint: FunctionEndpoint::new(
                &config.push_function_base_url,
                PUSH_SENDER_PATH,
                &config.push_function_api_key,
                AuthMode::parse(&config.function_auth_mode),
                config.function_timeout_ms,
            ),
            stats: ProviderStats::new(),
        }
    }

    async fn send_single(&self, payload: &PushPayload) -> Result<SendReceipt, SendError> {
        if let Some(token) = &payload.fcm_token {
            debug!(
                fcm_token = %masked_token(token),
                title = %payload.title,
                "Forwarding push to remote function"
            );
        }

        let body = stamp(json!({
            "fcmToken": payload.fcm_token,
            "userId": payload.user_id,
            "title": payload.title,
            "body": payload.body,
            "data": payload.data,
        }));

        let response = match self.endpoint.post(&body).await {
            Ok(response) => response,
            Err(e) => {
                self.stats.record_error();
                return Err(e);
            }
        };

        self.stats.record_sent();

        Ok(SendReceipt {
            message_id: remote_message_id(&response.body),
            provider: PUSH_PROVIDER_NAME.to_string(),
            sent_at: Utc::now(),
            upstream_status: Some(response.status),
            latency_ms: Some(response.latency_ms),
            response: Some(response.body),
        })
    }
}

#[async_trait]
impl PushProvider for RemotePushProvider {
    async fn send(&self, payload: &PushPayload) -> Result<SendReceipt, SendError> {
        self.send_single(payload).await
    }

    /// The endpoint takes one notification per call, so a broadcast fans
    /// out into sequential sends and tallies per-entry outcomes.
    async fn send_broadcast(
        &self,
        payload: &BroadcastPayload,
    ) -> Result<BroadcastReceipt, SendError> {
        info!(
            title = %payload.title,
            targets = payload.targets.len(),
            "Forwarding broadcast to remote function"
        );

        let mut results = Vec::with_capacity(payload.targets.len());

        for target in &payload.targets {
            let mut data = payload.data.clone();
            data.extend(target.custom_data.clone());

            let single = PushPayload {
                message_id: payload.message_id.clone(),
                user_id: target.user_id.clone(),
                fcm_token: target.fcm_token.clone(),
                title: payload.title.clone(),
                body: payload.body.clone(),
                data,
            };

            match self.send_single(&single).await {
                Ok(receipt) => results.push(BroadcastEntryResult {
                    user_id: target.user_id.clone(),
                    status: BroadcastEntryStatus::Sent,
                    message_id: Some(receipt.message_id),
                    error: None,
                }),
                Err(e) => results.push(BroadcastEntryResult {
                    user_id: target.user_id.clone(),
                    status: BroadcastEntryStatus::Failed,
                    message_id: None,
                    error: Some(e.to_string()),
                }),
            }
        }

        self.stats.record_broadcast();

        let sent = results
            .iter()
            .filter(|r| r.status == BroadcastEntryStatus::Sent)
            .count();

        Ok(BroadcastReceipt {
            provider: PUSH_PROVIDER_NAME.to_string(),
            total: payload.targets.len(),
            sent,
            failed: payload.targets.len() - sent,
            results,
            sent_at: Utc::now(),
        })
    }

    async fn test_connection(&self) -> HealthResult {
        let probe = stamp(json!({
            "fcmToken": format!("probe_token_{}", Uuid::new_v4().simple()),
            "title": "Connectivity probe",
            "body": "Connectivity probe",
            "data": { "probe": true },
        }));

        match self.endpoint.post(&probe).await {
            Ok(_) => HealthResult::connected(PUSH_PROVIDER_NAME),
            Err(e) => HealthResult::unavailable(PUSH_PROVIDER_NAME, e.to_string()),
        }
    }

    fn describe(&self) -> ProviderDescriptor {
        ProviderDescriptor {
            name: PUSH_PROVIDER_NAME.to_string(),
            kind: ProviderKind::Push,
            backend: BackendKind::Remote,
            stats: self.stats.snapshot(),
        }
    }
}

fn remote_message_id(body: &Value) -> String {
    body.get("messageId")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("remote_{}", Uuid::new_v4()))
}
