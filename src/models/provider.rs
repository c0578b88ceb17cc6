use std::{
    str::FromStr,
    sync::atomic::{AtomicU64, Ordering},
};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::NotificationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Email,
    Push,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Local,
    Remote,
}

impl FromStr for BackendKind {
    type Err = NotificationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(BackendKind::Local),
            "remote" => Ok(BackendKind::Remote),
            other => Err(NotificationError::Configuration(format!(
                "unknown provider backend: {}",
                other
            ))),
        }
    }
}

/// Send/error counters a backend updates as it works. Snapshotted into the
/// descriptor; external code never mutates these directly.
#[derive(Debug)]
pub struct ProviderStats {
    sent: AtomicU64,
    errors: AtomicU64,
    broadcasts: AtomicU64,
    started_at: DateTime<Utc>,
}

impl ProviderStats {
    pub fn new() -> Self {
        Self {
            sent: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            broadcasts: AtomicU64::new(0),
            started_at: Utc::now(),
        }
    }

    pub fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_broadcast(&self) {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ProviderStatsSnapshot {
        ProviderStatsSnapshot {
            sent: self.sent.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            started_at: self.started_at,
        }
    }
}

impl Default for ProviderStats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatsSnapshot {
    pub sent: u64,
    pub errors: u64,
    pub broadcasts: u64,
    pub started_at: DateTime<Utc>,
}

/// Identity and counters of the currently active backend for one kind.
/// Replaced wholesale on a runtime switch.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderDescriptor {
    pub name: String,
    pub kind: ProviderKind,
    pub backend: BackendKind,
    pub stats: ProviderStatsSnapshot,
}

#[derive(Debug, Clone, Serialize)]
pub struct SendReceipt {
    pub message_id: String,
    pub provider: String,
    pub sent_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BroadcastReceipt {
    pub provider: String,
    pub total: usize,
    pub sent: usize,
    pub failed: usize,
    pub results: Vec<BroadcastEntryResult>,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BroadcastEntryResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<serde_json::Value>,
    pub status: BroadcastEntryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BroadcastEntryStatus {
    Sent,
    Failed,
}

/// Outcome of a backend connectivity probe.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResult {
    pub success: bool,
    pub provider: String,
    pub status: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthResult {
    pub fn connected(provider: &str) -> Self {
        Self {
            success: true,
            provider: provider.to_string(),
            status: "connected".to_string(),
            error: None,
        }
    }

    pub fn unavailable(provider: &str, error: String) -> Self {
        Self {
            success: false,
            provider: provider.to_string(),
            status: "unavailable".to_string(),
            error: Some(error),
        }
    }
}
