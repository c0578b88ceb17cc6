//! Broker connection manager: owns the single connection and channel,
//! the reconnect loop, and the publish/consume primitives.

use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties, Consumer,
    options::{
        BasicAckOptions, BasicCancelOptions, BasicConsumeOptions, BasicPublishOptions,
        BasicQosOptions, BasicRejectOptions, ConfirmSelectOptions,
    },
    publisher_confirm::Confirmation,
    types::FieldTable,
};
use serde::Serialize;
use tokio::{
    sync::RwLock,
    time::{Duration, sleep},
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    clients::topology::BrokerTopology,
    config::Config,
    error::{NotificationError, NotificationResult},
};

/// Owned exclusively by the manager; everyone else only observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

struct Slot {
    connection: Connection,
    channel: Channel,
}

pub struct BrokerClient {
    uri: String,
    masked_uri: String,
    prefetch_count: u16,
    max_reconnect_attempts: u32,
    reconnect_delay: Duration,
    state: RwLock<ConnectionState>,
    slot: RwLock<Option<Slot>>,
    topology: RwLock<Option<BrokerTopology>>,
}

impl BrokerClient {
    pub fn new(config: &Config) -> Self {
        Self {
            uri: config.amqp_uri(),
            masked_uri: config.masked_amqp_uri(),
            prefetch_count: config.prefetch_count,
            max_reconnect_attempts: config.max_reconnect_attempts,
            reconnect_delay: Duration::from_millis(config.reconnect_delay_ms),
            state: RwLock::new(ConnectionState::Disconnected),
            slot: RwLock::new(None),
            topology: RwLock::new(None),
        }
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    pub async fn is_connected(&self) -> bool {
        self.state().await == ConnectionState::Connected
    }

    async fn set_state(&self, state: ConnectionState) {
        *self.state.write().await = state;
    }

    /// Open the connection and the single channel, set prefetch to one
    /// in-flight delivery per consumer, and enable publisher confirms.
    /// A failed first attempt falls into the bounded reconnect loop.
    pub async fn connect(&self) -> NotificationResult<()> {
        info!(uri = %self.masked_uri, "Connecting to broker");
        self.set_state(ConnectionState::Connecting).await;

        match self.open().await {
            Ok(slot) => {
                *self.slot.write().await = Some(slot);
                self.set_state(ConnectionState::Connected).await;
                info!("Broker connection established");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Initial broker connection failed");
                self.reconnect().await
            }
        }
    }

    async fn open(&self) -> NotificationResult<Slot> {
        let connection = Connection::connect(&self.uri, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;

        channel
            .basic_qos(self.prefetch_count, BasicQosOptions::default())
            .await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;

        Ok(Slot { connection, channel })
    }

    /// Bounded retry with a fixed delay between attempts. Exhausting the
    /// bound leaves the manager in `Failed`: nothing can be consumed or
    /// published any more, so the caller must treat it as fatal.
    pub async fn reconnect(&self) -> NotificationResult<()> {
        if self.state().await == ConnectionState::Failed {
            return Err(NotificationError::Connection(
                "broker connection is in failed state".to_string(),
            ));
        }

        self.set_state(ConnectionState::Reconnecting).await;
        *self.slot.write().await = None;

        for attempt in 1..=self.max_reconnect_attempts {
            info!(
                attempt,
                max_attempts = self.max_reconnect_attempts,
                delay_ms = self.reconnect_delay.as_millis() as u64,
                "Attempting broker reconnect"
            );

            sleep(self.reconnect_delay).await;

            match self.open().await {
                Ok(slot) => {
                    *self.slot.write().await = Some(slot);
                    self.set_state(ConnectionState::Connected).await;
                    info!(attempt, "Broker reconnected");

                    let topology = self.topology.read().await.clone();
                    if let Some(topology) = topology {
                        self.declare(&topology).await?;
                    }

                    return Ok(());
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Reconnect attempt failed");
                }
            }
        }

        self.set_state(ConnectionState::Failed).await;
        error!(
            max_attempts = self.max_reconnect_attempts,
            "Maximum reconnect attempts reached, giving up"
        );

        Err(NotificationError::Connection(format!(
            "gave up after {} reconnect attempts",
            self.max_reconnect_attempts
        )))
    }

    /// Current channel, or a fail-fast error while not connected. Nothing
    /// is queued client-side during reconnects.
    async fn channel(&self) -> NotificationResult<Channel> {
        let state = self.state().await;
        if state != ConnectionState::Connected {
            return Err(NotificationError::Connection(format!(
                "broker unavailable (state: {:?})",
                state
            )));
        }

        self.slot
            .read()
            .await
            .as_ref()
            .map(|slot| slot.channel.clone())
            .ok_or_else(|| NotificationError::Connection("broker channel not open".to_string()))
    }

    /// Declare the topology on the current channel and remember it so a
    /// successful reconnect re-declares the same shape.
    pub async fn declare(&self, topology: &BrokerTopology) -> NotificationResult<()> {
        let channel = self.channel().await?;
        topology.declare(&channel).await?;
        *self.topology.write().await = Some(topology.clone());
        Ok(())
    }

    /// Publish a persistent JSON message stamped with a message id and
    /// timestamp. Returns the broker's confirm verdict; `false` means the
    /// message is not durably queued and the caller must not assume
    /// delivery.
    pub async fn publish<T: Serialize>(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &T,
        message_id: Option<&str>,
    ) -> NotificationResult<bool> {
        let channel = self.channel().await?;
        let bytes = serde_json::to_vec(payload)?;

        let message_id = message_id
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let properties = BasicProperties::default()
            .with_delivery_mode(2)
            .with_message_id(message_id.clone().into())
            .with_timestamp(chrono::Utc::now().timestamp() as u64);

        let confirmation = channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                &bytes,
                properties,
            )
            .await?
            .await?;

        let accepted = matches!(confirmation, Confirmation::Ack(_));

        if accepted {
            debug!(
                exchange,
                routing_key,
                message_id = %message_id,
                "Message published"
            );
        } else {
            warn!(
                exchange,
                routing_key,
                message_id = %message_id,
                "Broker did not accept message"
            );
        }

        Ok(accepted)
    }

    pub async fn consume(&self, queue: &str, consumer_tag: &str) -> NotificationResult<Consumer> {
        let channel = self.channel().await?;

        let consumer = channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        info!(queue, consumer_tag, "Consumer attached");
        Ok(consumer)
    }

    pub async fn ack(&self, delivery_tag: u64) -> NotificationResult<()> {
        let channel = self.channel().await?;
        channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await?;
        Ok(())
    }

    pub async fn reject(&self, delivery_tag: u64, requeue: bool) -> NotificationResult<()> {
        let channel = self.channel().await?;
        channel
            .basic_reject(delivery_tag, BasicRejectOptions { requeue })
            .await?;
        Ok(())
    }

    pub async fn cancel_consumer(&self, consumer_tag: &str) -> NotificationResult<()> {
        let channel = self.channel().await?;
        channel
            .basic_cancel(consumer_tag, BasicCancelOptions::default())
            .await?;
        Ok(())
    }

    /// Close the channel, then the connection, in that order.
    pub async fn disconnect(&self) {
        if let Some(slot) = self.slot.write().await.take() {
            if let Err(e) = slot.channel.close(200, "shutting down").await {
                warn!(error = %e, "Error closing broker channel");
            }
            if let Err(e) = slot.connection.close(200, "shutting down").await {
                warn!(error = %e, "Error closing broker connection");
            }
        }

        self.set_state(ConnectionState::Disconnected).await;
        info!("Broker connection closed");
    }
}
