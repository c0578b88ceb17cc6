//! In-memory delivery simulators.
//!
//! These back the default configuration and the test suite: they sleep for
//! a bounded random interval and fail a small injected fraction of sends
//! so failure paths get exercised without external dependencies.

use std::ops::RangeInclusive;

use async_trait::async_trait;
use chrono::Utc;
use tokio::time::{Duration, sleep};
use tracing::debug;
use uuid::Uuid;

use crate::{
    error::SendError,
    models::provider::{
        BackendKind, BroadcastEntryResult, BroadcastEntryStatus, BroadcastReceipt, HealthResult,
        ProviderDescriptor, ProviderKind, ProviderStats, SendReceipt,
    },
    providers::{BroadcastPayload, EmailPayload, EmailProvider, PushPayload, PushProvider},
};

const EMAIL_PROVIDER_NAME: &str = "local-email-provider";
const PUSH_PROVIDER_NAME: &str = "local-push-provider";

const EMAIL_FAILURE_RATE: f64 = 0.02;
const PUSH_FAILURE_RATE: f64 = 0.03;

const EMAIL_LATENCY_MS: RangeInclusive<u64> = 100..=400;
const PUSH_LATENCY_MS: RangeInclusive<u64> = 50..=200;

async fn simulate_delivery(
    latency_ms: RangeInclusive<u64>,
    failure_rate: f64,
) -> Result<(), SendError> {
    let delay = rand::random_range(latency_ms);
    sleep(Duration::from_millis(delay)).await;

    if rand::random::<f64>() < failure_rate {
        return Err(SendError::Simulated(
            "injected local delivery failure".to_string(),
        ));
    }

    Ok(())
}

pub struct LocalEmailProvider {
    stats: ProviderStats,
    failure_rate: f64,
}

impl LocalEmailProvider {
    pub fn new() -> Self {
        Self::with_failure_rate(EMAIL_FAILURE_RATE)
    }

    /// Test hook: 0.0 disables the injected failures, 1.0 makes every
    /// send fail.
    pub fn with_failure_rate(failure_rate: f64) -> Self {
        Self {
            stats: ProviderStats::new(),
            failure_rate,
        }
    }
}

impl Default for LocalEmailProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmailProvider for LocalEmailProvider {
    async fn send(&self, payload: &EmailPayload) -> Result<SendReceipt, SendError> {
        debug!(
            to = %payload.to,
            subject = %payload.subject,
            template = payload.template.as_deref().unwrap_or("-"),
            "Simulating email delivery"
        );

        if let Err(e) = simulate_delivery(EMAIL_LATENCY_MS, self.failure_rate).await {
            self.stats.record_error();
            return Err(e);
        }

        self.stats.record_sent();

        Ok(SendReceipt {
            message_id: format!("local_{}", Uuid::new_v4()),
            provider: EMAIL_PROVIDER_NAME.to_string(),
            sent_at: Utc::now(),
            upstream_status: None,
            latency_ms: None,
            response: None,
        })
    }

    async fn test_connection(&self) -> HealthResult {
        match simulate_delivery(EMAIL_LATENCY_MS, self.failure_rate).await {
            Ok(()) => HealthResult::connected(EMAIL_PROVIDER_NAME),
            Err(e) => HealthResult::unavailable(EMAIL_PROVIDER_NAME, e.to_string()),
        }
    }

    fn describe(&self) -> ProviderDescriptor {
        ProviderDescriptor {
            name: EMAIL_PROVIDER_NAME.to_string(),
            kind: ProviderKind::Email,
            backend: BackendKind::Local,
            stats: self.stats.snapshot(),
        }
    }
}

pub struct LocalPushProvider {
    stats: ProviderStats,
    failure_rate: f64,
}

impl LocalPushProvider {
    pub fn new() -> Self {
        Self::with_failure_rate(PUSH_FAILURE_RATE)
    }

    pub fn with_failure_rate(failure_rate: f64) -> Self {
        Self {
            stats: ProviderStats::new(),
            failure_rate,
        }
    }
}

impl Default for LocalPushProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PushProvider for LocalPushProvider {
    async fn send(&self, payload: &PushPayload) -> Result<SendReceipt, SendError> {
        debug!(
            user_id = ?payload.user_id,
            title = %payload.title,
            "Simulating push delivery"
        );

        if let Err(e) = simulate_delivery(PUSH_LATENCY_MS, self.failure_rate).await {
            self.stats.record_error();
            return Err(e);
        }

        self.stats.record_sent();

        Ok(SendReceipt {
            message_id: format!("local_push_{}", Uuid::new_v4()),
            provider: PUSH_PROVIDER_NAME.to_string(),
            sent_at: Utc::now(),
            upstream_status: None,
            latency_ms: None,
            response: None,
        })
    }

    /// Entries are delivered independently; the receipt tallies per-entry
    /// outcomes instead of failing the whole batch on the first error.
    async fn send_broadcast(
        &self,
        payload: &BroadcastPayload,
    ) -> Result<BroadcastReceipt, SendError> {
        debug!(
            title = %payload.title,
            targets = payload.targets.len(),
            "Simulating broadcast delivery"
        );

        let mut results = Vec::with_capacity(payload.targets.len());

        for target in &payload.targets {
            match simulate_delivery(PUSH_LATENCY_MS, self.failure_rate).await {
                Ok(()) => {
                    self.stats.record_sent();
                    results.push(BroadcastEntryResult {
                        user_id: target.user_id.clone(),
                        status: BroadcastEntryStatus::Sent,
                        message_id: Some(format!("local_push_{}", Uuid::new_v4())),
                        error: None,
                    });
                }
                Err(e) => {
                    self.stats.record_error();
                    results.push(BroadcastEntryResult {
                        user_id: target.user_id.clone(),
                        status: BroadcastEntryStatus::Failed,
                        message_id: None,
                        error: Some(e.to_string()),
                    });
                }
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
        match simulate_delivery(PUSH_LATENCY_MS, self.failure_rate).await {
            Ok(()) => HealthResult::connected(PUSH_PROVIDER_NAME),
            Err(e) => HealthResult::unavailable(PUSH_PROVIDER_NAME, e.to_string()),
        }
    }

    fn describe(&self) -> ProviderDescriptor {
        ProviderDescriptor {
            name: PUSH_PROVIDER_NAME.to_string(),
            kind: ProviderKind::Push,
            backend: BackendKind::Local,
            stats: self.stats.snapshot(),
        }
    }
}
