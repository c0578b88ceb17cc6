use std::sync::Arc;

use anyhow::{Context, Error, Result};
use notification_service::{
    api::{AppState, run_api_server},
    clients::{broker::BrokerClient, topology::BrokerTopology},
    config::Config,
    dispatch::Dispatcher,
    listeners::{QueueListener, email::EmailHandler, push::PushHandler},
    providers::ProviderRegistry,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::load()?;

    let broker = Arc::new(BrokerClient::new(&config));
    broker
        .connect()
        .await
        .context("broker connection failed, cannot start")?;

    // Topology declaration failures abort startup.
    broker
        .declare(&BrokerTopology::notification_defaults())
        .await
        .context("topology declaration failed")?;

    let registry = Arc::new(ProviderRegistry::from_config(&config)?);
    let dispatcher = Arc::new(Dispatcher::new(registry.clone()));

    let email_listener = Arc::new(QueueListener::new(
        broker.clone(),
        Arc::new(EmailHandler::new(dispatcher.clone())),
    ));
    let push_listener = Arc::new(QueueListener::new(
        broker.clone(),
        Arc::new(PushHandler::new(dispatcher.clone())),
    ));

    email_listener.start().await?;
    push_listener.start().await?;

    let state = Arc::new(AppState {
        broker: broker.clone(),
        registry,
        listeners: vec![email_listener.clone(), push_listener.clone()],
    });

    let server_port = config.server_port;
    tokio::spawn(async move {
        if let Err(e) = run_api_server(state, server_port).await {
            error!(error = %e, "Status server failed");
        }
    });

    info!("Notification service running");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    info!("Shutdown signal received");

    // Stop taking new deliveries, let in-flight handlers settle, then
    // close channel and connection in that order.
    email_listener.stop().await;
    push_listener.stop().await;
    broker.disconnect().await;

    info!("Shutdown complete");
    Ok(())
}
