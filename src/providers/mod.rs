//! Delivery backends behind a capability-typed interface.
//!
//! Exactly one implementation per kind is active at a time. The registry
//! holds each behind an `Arc` slot that a runtime switch replaces
//! wholesale; in-flight sends keep the `Arc` they cloned and finish
//! against the old instance.

pub mod local;
pub mod remote;

use std::{collections::HashMap, str::FromStr, sync::Arc};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;

use crate::{
    config::Config,
    error::{NotificationResult, SendError},
    models::{
        message::BroadcastTarget,
        provider::{BackendKind, BroadcastReceipt, HealthResult, ProviderDescriptor, SendReceipt},
    },
};

/// Fully resolved email, ready for a backend: templates already applied,
/// variables already substituted.
#[derive(Debug, Clone)]
pub struct EmailPayload {
    pub message_id: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub template: Option<String>,
    pub variables: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct PushPayload {
    pub message_id: String,
    pub user_id: Option<serde_json::Value>,
    pub fcm_token: Option<String>,
    pub title: String,
    pub body: String,
    pub data: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct BroadcastPayload {
    pub message_id: String,
    pub title: String,
    pub body: String,
    pub data: HashMap<String, serde_json::Value>,
    pub targets: Vec<BroadcastTarget>,
}

#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send(&self, payload: &EmailPayload) -> Result<SendReceipt, SendError>;

    async fn test_connection(&self) -> HealthResult;

    fn describe(&self) -> ProviderDescriptor;
}

#[async_trait]
pub trait PushProvider: Send + Sync {
    async fn send(&self, payload: &PushPayload) -> Result<SendReceipt, SendError>;

    async fn send_broadcast(&self, payload: &BroadcastPayload)
    -> Result<BroadcastReceipt, SendError>;

    async fn test_connection(&self) -> HealthResult;

    fn describe(&self) -> ProviderDescriptor;
}

/// One active backend per kind, constructed once at startup from
/// configuration and handed to the dispatcher by `Arc`.
pub struct ProviderRegistry {
    config: Config,
    email: RwLock<Arc<dyn EmailProvider>>,
    push: RwLock<Arc<dyn PushProvider>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ProviderRegistry {
    pub fn from_config(config: &Config) -> NotificationResult<Self> {
        let email_backend = BackendKind::from_str(&config.email_provider)?;
        let push_backend = BackendKind::from_str(&config.push_provider)?;

        let email = build_email_provider(config, email_backend);
        let push = build_push_provider(config, push_backend);

        info!(
            email_backend = ?email_backend,
            push_backend = ?push_backend,
            "Provider registry initialized"
        );

        Ok(Self {
            config: config.clone(),
            email: RwLock::new(email),
            push: RwLock::new(push),
        })
    }

    /// Registry over explicit backend instances. Used by tests that need
    /// deterministic simulator behavior; `switch_*` still builds from the
    /// supplied configuration.
    pub fn with_backends(
        config: &Config,
        email: Arc<dyn EmailProvider>,
        push: Arc<dyn PushProvider>,
    ) -> Self {
        Self {
            config: config.clone(),
            email: RwLock::new(email),
            push: RwLock::new(push),
        }
    }

    pub async fn email(&self) -> Arc<dyn EmailProvider> {
        self.email.read().await.clone()
    }

    pub async fn push(&self) -> Arc<dyn PushProvider> {
        self.push.read().await.clone()
    }

    /// Replace the active email backend. A single slot assignment: callers
    /// that already cloned the old `Arc` finish their sends against it.
    pub async fn switch_email(&self, backend_name: &str) -> NotificationResult<ProviderDescriptor> {
        let backend = BackendKind::from_str(backend_name)?;
        let provider = build_email_provider(&self.config, backend);
        let descriptor = provider.describe();

        *self.email.write().await = provider;

        info!(provider = %descriptor.name, "Email provider switched");
        Ok(descriptor)
    }

    pub async fn switch_push(&self, backend_name: &str) -> NotificationResult<ProviderDescriptor> {
        let backend = BackendKind::from_str(backend_name)?;
        let provider = build_push_provider(&self.config, backend);
        let descriptor = provider.describe();

        *self.push.write().await = provider;

        info!(provider = %descriptor.name, "Push provider switched");
        Ok(descriptor)
    }

    pub async fn email_descriptor(&self) -> ProviderDescriptor {
        self.email.read().await.describe()
    }

    pub async fn push_descriptor(&self) -> ProviderDescriptor {
        self.push.read().await.describe()
    }

    /// Probe both active backends; overall health follows the "at least
    /// one channel works" policy.
    pub async fn test_all(&self) -> (HealthResult, HealthResult, bool) {
        let email = self.email().await.test_connection().await;
        let push = self.push().await.test_connection().await;
        let overall = email.success || push.success;
        (email, push, overall)
    }
}

fn build_email_provider(config: &Config, backend: BackendKind) -> Arc<dyn EmailProvider> {
    match backend {
        BackendKind::Local => Arc::new(local::LocalEmailProvider::new()),
        BackendKind::Remote => Arc::new(remote::RemoteEmailProvider::new(config)),
    }
}

fn build_push_provider(config: &Config, backend: BackendKind) -> Arc<dyn PushProvider> {
    match backend {
        BackendKind::Local => Arc::new(local::LocalPushProvider::new()),
        BackendKind::Remote => Arc::new(remote::RemotePushProvider::new(config)),
    }
}
