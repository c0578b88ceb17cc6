use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    clients::broker::{BrokerClient, ConnectionState},
    listeners::{ListenerStatus, QueueListener},
    models::provider::ProviderDescriptor,
    providers::ProviderRegistry,
};

pub struct AppState {
    pub broker: Arc<BrokerClient>,
    pub registry: Arc<ProviderRegistry>,
    pub listeners: Vec<Arc<QueueListener>>,
}

#[derive(Serialize)]
struct BrokerStatus {
    connected: bool,
    state: ConnectionState,
}

#[derive(Serialize)]
struct ProvidersStatus {
    email: ProviderDescriptor,
    push: ProviderDescriptor,
}

#[derive(Serialize)]
struct StatusSnapshot {
    status: &'static str,
    broker: BrokerStatus,
    listeners: Vec<ListenerStatus>,
    providers: ProvidersStatus,
}

pub async fn run_api_server(
    state: Arc<AppState>,
    port: u16,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = Router::new()
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!(address = %addr, "Status server started");

    axum::serve(listener, app).await?;

    Ok(())
}

/// Read-only snapshot assembled from component getters; nothing here
/// probes external services on the request path.
async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let connected = state.broker.is_connected().await;

    let mut listeners = Vec::with_capacity(state.listeners.len());
    for listener in &state.listeners {
        listeners.push(listener.status().await);
    }

    let snapshot = StatusSnapshot {
        status: if connected { "healthy" } else { "unhealthy" },
        broker: BrokerStatus {
            connected,
            state: state.broker.state().await,
        },
        listeners,
        providers: ProvidersStatus {
            email: state.registry.email_descriptor().await,
            push: state.registry.push_descriptor().await,
        },
    };

    let status_code = if connected {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(snapshot))
}
