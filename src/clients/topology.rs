//! Broker topology: exchanges, queues (with dead-letter arguments and
//! TTL), and bindings, declared idempotently at startup.

use lapin::{
    Channel, ExchangeKind,
    options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions},
    types::{AMQPValue, FieldTable},
};
use tracing::info;

use crate::error::{NotificationError, NotificationResult};

pub const NOTIFICATION_EXCHANGE: &str = "notification.exchange";
pub const DEAD_LETTER_EXCHANGE: &str = "notification.dlx";
pub const DEAD_LETTER_QUEUE: &str = "notification.dlq";
pub const EMAIL_QUEUE: &str = "emails";
pub const PUSH_QUEUE: &str = "push-notifications";

/// Queued messages expire into the DLX after one hour.
pub const MESSAGE_TTL_MS: i32 = 3_600_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeType {
    Topic,
    Direct,
}

impl From<ExchangeType> for ExchangeKind {
    fn from(kind: ExchangeType) -> Self {
        match kind {
            ExchangeType::Topic => ExchangeKind::Topic,
            ExchangeType::Direct => ExchangeKind::Direct,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExchangeSpec {
    pub name: String,
    pub kind: ExchangeType,
    pub durable: bool,
}

#[derive(Debug, Clone)]
pub struct Binding {
    pub exchange: String,
    pub routing_key: String,
}

#[derive(Debug, Clone)]
pub struct QueueSpec {
    pub name: String,
    pub durable: bool,
    pub dead_letter_exchange: Option<String>,
    pub message_ttl_ms: Option<i32>,
    pub bindings: Vec<Binding>,
}

impl QueueSpec {
    fn arguments(&self) -> FieldTable {
        let mut args = FieldTable::default();

        if let Some(dlx) = &self.dead_letter_exchange {
            args.insert(
                "x-dead-letter-exchange".into(),
                AMQPValue::LongString(dlx.as_str().into()),
            );
        }

        if let Some(ttl) = self.message_ttl_ms {
            args.insert("x-message-ttl".into(), AMQPValue::LongInt(ttl));
        }

        args
    }
}

#[derive(Debug, Clone)]
pub struct BrokerTopology {
    pub exchanges: Vec<ExchangeSpec>,
    pub dead_letter: ExchangeSpec,
    pub queues: Vec<QueueSpec>,
    pub dead_letter_queue: String,
}

impl BrokerTopology {
    /// The wire names existing producers publish against. Must not drift.
    pub fn notification_defaults() -> Self {
        let binding = |routing_key: &str| Binding {
            exchange: NOTIFICATION_EXCHANGE.to_string(),
            routing_key: routing_key.to_string(),
        };

        Self {
            exchanges: vec![ExchangeSpec {
                name: NOTIFICATION_EXCHANGE.to_string(),
                kind: ExchangeType::Topic,
                durable: true,
            }],
            dead_letter: ExchangeSpec {
                name: DEAD_LETTER_EXCHANGE.to_string(),
                kind: ExchangeType::Direct,
                durable: true,
            },
            queues: vec![
                QueueSpec {
                    name: EMAIL_QUEUE.to_string(),
                    durable: true,
                    dead_letter_exchange: Some(DEAD_LETTER_EXCHANGE.to_string()),
                    message_ttl_ms: Some(MESSAGE_TTL_MS),
                    bindings: vec![binding("email"), binding("email.*")],
                },
                QueueSpec {
                    name: PUSH_QUEUE.to_string(),
                    durable: true,
                    dead_letter_exchange: Some(DEAD_LETTER_EXCHANGE.to_string()),
                    message_ttl_ms: Some(MESSAGE_TTL_MS),
                    bindings: vec![binding("push"), binding("push.*")],
                },
            ],
            dead_letter_queue: DEAD_LETTER_QUEUE.to_string(),
        }
    }

    /// Every queue that names a DLX must match the topology's declared
    /// dead-letter exchange; an inconsistent topology must not start.
    pub fn validate(&self) -> NotificationResult<()> {
        for queue in &self.queues {
            if let Some(dlx) = &queue.dead_letter_exchange {
                if *dlx != self.dead_letter.name {
                    return Err(NotificationError::Configuration(format!(
                        "queue {} references undeclared dead-letter exchange {}",
                        queue.name, dlx
                    )));
                }
            }
        }
        Ok(())
    }

    /// Declare everything in dependency order: exchanges, the DLX, queues
    /// with their argument tables, bindings, then the catch-all DLQ.
    /// Declares are asserts, so repeating this on every boot is safe.
    pub async fn declare(&self, channel: &Channel) -> NotificationResult<()> {
        self.validate()?;

        for exchange in &self.exchanges {
            channel
                .exchange_declare(
                    &exchange.name,
                    exchange.kind.into(),
                    ExchangeDeclareOptions {
                        durable: exchange.durable,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await?;
            info!(exchange = %exchange.name, "Exchange declared");
        }

        channel
            .exchange_declare(
                &self.dead_letter.name,
                self.dead_letter.kind.into(),
                ExchangeDeclareOptions {
                    durable: self.dead_letter.durable,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        info!(exchange = %self.dead_letter.name, "Dead letter exchange declared");

        for queue in &self.queues {
            channel
                .queue_declare(
                    &queue.name,
                    QueueDeclareOptions {
                        durable: queue.durable,
                        ..Default::default()
                    },
                    queue.arguments(),
                )
                .await?;
            info!(queue = %queue.name, "Queue declared");

            for binding in &queue.bindings {
                channel
                    .queue_bind(
                        &queue.name,
                        &binding.exchange,
                        &binding.routing_key,
                        QueueBindOptions::default(),
                        FieldTable::default(),
                    )
                    .await?;
                info!(
                    queue = %queue.name,
                    exchange = %binding.exchange,
                    routing_key = %binding.routing_key,
                    "Binding declared"
                );
            }
        }

        channel
            .queue_declare(
                &self.dead_letter_queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        channel
            .queue_bind(
                &self.dead_letter_queue,
                &self.dead_letter.name,
                "#",
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;
        info!(queue = %self.dead_letter_queue, "Dead letter queue declared");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_topology_is_consistent() {
        let topology = BrokerTopology::notification_defaults();
        assert!(topology.validate().is_ok());
        assert_eq!(topology.queues.len(), 2);
        assert!(
            topology
                .queues
                .iter()
                .all(|q| q.message_ttl_ms == Some(MESSAGE_TTL_MS))
        );
    }

    #[test]
    fn mismatched_dlx_fails_validation() {
        let mut topology = BrokerTopology::notification_defaults();
        topology.queues[0].dead_letter_exchange = Some("other.dlx".to_string());

        let err = topology.validate().unwrap_err();
        assert!(matches!(err, NotificationError::Configuration(_)));
    }

    #[test]
    fn queue_arguments_carry_dlx_and_ttl() {
        use lapin::types::ShortString;

        let topology = BrokerTopology::notification_defaults();
        let args = topology.queues[0].arguments();
        let inner = args.inner();

        assert_eq!(
            inner.get(&ShortString::from("x-dead-letter-exchange")),
            Some(&AMQPValue::LongString(DEAD_LETTER_EXCHANGE.into()))
        );
        assert_eq!(
            inner.get(&ShortString::from("x-message-ttl")),
            Some(&AMQPValue::LongInt(MESSAGE_TTL_MS))
        );
    }
}
