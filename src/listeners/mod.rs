//! Per-queue consumers: pull deliveries, validate, forward to the
//! dispatch pipeline, and ack or dead-letter based on the outcome.

pub mod dedup;
pub mod email;
pub mod push;

use std::{sync::Arc, time::Instant};

use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::{Consumer, message::Delivery};
use serde::Serialize;
use tokio::{
    sync::{Mutex, RwLock, watch},
    time::{Duration, sleep},
};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    clients::broker::BrokerClient, dispatch::DispatchResult, error::NotificationResult,
    listeners::dedup::DedupWindow, models::message::DeliveryInfo,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ListenerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Validates and dispatches one delivery. The ack/reject decision is made
/// by the listener from this result: `Ok` acks, any error rejects without
/// requeue so the broker dead-letters the message.
#[async_trait]
pub trait DeliveryHandler: Send + Sync {
    fn queue(&self) -> &'static str;

    async fn handle(
        &self,
        payload: serde_json::Value,
        info: &DeliveryInfo,
    ) -> NotificationResult<DispatchResult>;
}

#[derive(Debug, Clone, Serialize)]
pub struct ListenerStatus {
    pub queue: &'static str,
    pub state: ListenerState,
}

pub struct QueueListener {
    broker: Arc<BrokerClient>,
    handler: Arc<dyn DeliveryHandler>,
    consumer_tag: String,
    state: Arc<RwLock<ListenerState>>,
    shutdown: watch::Sender<bool>,
    dedup: Arc<Mutex<DedupWindow>>,
}

impl QueueListener {
    pub fn new(broker: Arc<BrokerClient>, handler: Arc<dyn DeliveryHandler>) -> Self {
        let consumer_tag = format!("{}-worker", handler.queue());
        let (shutdown, _) = watch::channel(false);

        Self {
            broker,
            handler,
            consumer_tag,
            state: Arc::new(RwLock::new(ListenerState::Stopped)),
            shutdown,
            dedup: Arc::new(Mutex::new(DedupWindow::default())),
        }
    }

    pub async fn state(&self) -> ListenerState {
        *self.state.read().await
    }

    pub async fn status(&self) -> ListenerStatus {
        ListenerStatus {
            queue: self.handler.queue(),
            state: self.state().await,
        }
    }

    /// Attach the consumer and spawn the processing loop. Starting an
    /// already-running listener is a warning, not an error.
    pub async fn start(&self) -> NotificationResult<()> {
        {
            let mut state = self.state.write().await;
            match *state {
                ListenerState::Stopped => *state = ListenerState::Starting,
                _ => {
                    warn!(queue = self.handler.queue(), "Listener already running");
                    return Ok(());
                }
            }
        }

        let _ = self.shutdown.send(false);

        let consumer = match self
            .broker
            .consume(self.handler.queue(), &self.consumer_tag)
            .await
        {
            Ok(consumer) => consumer,
            Err(e) => {
                *self.state.write().await = ListenerState::Stopped;
                return Err(e);
            }
        };

        *self.state.write().await = ListenerState::Running;
        info!(queue = self.handler.queue(), "Listener started");

        let broker = self.broker.clone();
        let handler = self.handler.clone();
        let state = self.state.clone();
        let dedup = self.dedup.clone();
        let consumer_tag = self.consumer_tag.clone();
        let shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(run_loop(
            broker,
            handler,
            consumer,
            consumer_tag,
            state,
            dedup,
            shutdown_rx,
        ));

        Ok(())
    }

    /// Stop accepting deliveries and wait for the in-flight handler to
    /// settle. Stopping a stopped listener is a warning, not an error.
    pub async fn stop(&self) {
        {
            let mut state = self.state.write().await;
            match *state {
                ListenerState::Running => *state = ListenerState::Stopping,
                _ => {
                    warn!(queue = self.handler.queue(), "Listener already stopped");
                    return;
                }
            }
        }

        let _ = self.shutdown.send(true);

        if let Err(e) = self.broker.cancel_consumer(&self.consumer_tag).await {
            warn!(
                queue = self.handler.queue(),
                error = %e,
                "Could not cancel consumer"
            );
        }

        for _ in 0..200 {
            if self.state().await == ListenerState::Stopped {
                info!(queue = self.handler.queue(), "Listener stopped");
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }

        warn!(
            queue = self.handler.queue(),
            "Listener did not settle in time, marking stopped"
        );
        *self.state.write().await = ListenerState::Stopped;
    }
}

async fn run_loop(
    broker: Arc<BrokerClient>,
    handler: Arc<dyn DeliveryHandler>,
    mut consumer: Consumer,
    consumer_tag: String,
    state: Arc<RwLock<ListenerState>>,
    dedup: Arc<Mutex<DedupWindow>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            delivery = consumer.next() => match delivery {
                Some(Ok(delivery)) => {
                    process_delivery(&broker, handler.as_ref(), &dedup, delivery).await;
                }
                Some(Err(e)) => {
                    warn!(queue = handler.queue(), error = %e, "Delivery error");
                }
                None => {
                    if *shutdown_rx.borrow() {
                        break;
                    }

                    warn!(
                        queue = handler.queue(),
                        "Consumer stream ended unexpectedly, reconnecting"
                    );

                    if broker.reconnect().await.is_err() {
                        error!(
                            queue = handler.queue(),
                            "Broker is gone and reconnection is exhausted, exiting"
                        );
                        std::process::exit(1);
                    }

                    match broker.consume(handler.queue(), &consumer_tag).await {
                        Ok(new_consumer) => consumer = new_consumer,
                        Err(e) => {
                            error!(
                                queue = handler.queue(),
                                error = %e,
                                "Could not re-attach consumer after reconnect, exiting"
                            );
                            std::process::exit(1);
                        }
                    }
                }
            }
        }
    }

    *state.write().await = ListenerState::Stopped;
}

async fn process_delivery(
    broker: &BrokerClient,
    handler: &dyn DeliveryHandler,
    dedup: &Mutex<DedupWindow>,
    delivery: Delivery,
) {
    let started = Instant::now();
    let queue = handler.queue();
    let delivery_tag = delivery.delivery_tag;

    let mut payload: serde_json::Value = match serde_json::from_slice(&delivery.data) {
        Ok(value) => value,
        Err(e) => {
            error!(queue, error = %e, "Malformed JSON payload, dead-lettering");
            reject(broker, queue, delivery_tag).await;
            return;
        }
    };

    let message_id = backfill_message_id(&mut payload);

    let info = DeliveryInfo {
        queue: queue.to_string(),
        exchange: delivery.exchange.to_string(),
        routing_key: delivery.routing_key.to_string(),
        message_id: message_id.clone(),
        timestamp: *delivery.properties.timestamp(),
    };

    // Best-effort duplicate suppression, not a correctness guarantee.
    if !dedup.lock().await.observe(&message_id) {
        info!(queue, message_id = %message_id, "Duplicate message skipped");
        if let Err(e) = broker.ack(delivery_tag).await {
            warn!(queue, message_id = %message_id, error = %e, "Could not ack duplicate");
        }
        return;
    }

    match handler.handle(payload, &info).await {
        Ok(result) => {
            if let Err(e) = broker.ack(delivery_tag).await {
                warn!(queue, message_id = %message_id, error = %e, "Could not ack delivery");
                return;
            }

            info!(
                queue,
                message_id = %message_id,
                provider = %result.provider,
                latency_ms = started.elapsed().as_millis() as u64,
                "Message processed"
            );
        }
        Err(e) => {
            error!(
                queue,
                message_id = %message_id,
                error = %e,
                permanent = e.is_permanent(),
                latency_ms = started.elapsed().as_millis() as u64,
                "Message processing failed, dead-lettering"
            );
            reject(broker, queue, delivery_tag).await;
        }
    }
}

async fn reject(broker: &BrokerClient, queue: &str, delivery_tag: u64) {
    if let Err(e) = broker.reject(delivery_tag, false).await {
        warn!(queue, error = %e, "Could not reject delivery");
    }
}

/// Deliveries without a usable `messageId` get a generated one before
/// validation, so every later log line can reference the message.
fn backfill_message_id(payload: &mut serde_json::Value) -> String {
    let existing = payload
        .get("messageId")
        .and_then(serde_json::Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string);

    match existing {
        Some(id) => id,
        None => {
            let id = format!("msg_{}", Uuid::new_v4());
            if let Some(map) = payload.as_object_mut() {
                map.insert("messageId".to_string(), serde_json::Value::String(id.clone()));
            }
            id
        }
    }
}
