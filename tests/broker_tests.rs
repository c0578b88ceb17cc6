use notification_service::{
    clients::broker::{BrokerClient, ConnectionState},
    error::NotificationError,
};
use serde_json::json;

use crate::common;

/// An unreachable broker exhausts the reconnect bound, lands in `Failed`,
/// and every later publish/consume call fails immediately instead of
/// hanging or queueing client-side.
#[tokio::test]
async fn reconnect_bound_leads_to_failed_state_and_fail_fast_calls() {
    let mut config = common::test_config();
    // Nothing listens on port 1; connection attempts are refused at once.
    config.rabbitmq_port = 1;
    config.max_reconnect_attempts = 2;
    config.reconnect_delay_ms = 10;

    let broker = BrokerClient::new(&config);

    let err = broker.connect().await.unwrap_err();
    assert!(matches!(err, NotificationError::Connection(_)));
    assert_eq!(broker.state().await, ConnectionState::Failed);
    assert!(!broker.is_connected().await);

    let publish_err = broker
        .publish("notification.exchange", "email", &json!({"type": "welcome"}), None)
        .await
        .unwrap_err();
    assert!(matches!(publish_err, NotificationError::Connection(_)));

    let consume_err = broker.consume("emails", "emails-worker").await.unwrap_err();
    assert!(matches!(consume_err, NotificationError::Connection(_)));

    // A further reconnect request from the failed state is refused too.
    let reconnect_err = broker.reconnect().await.unwrap_err();
    assert!(matches!(reconnect_err, NotificationError::Connection(_)));
}

#[tokio::test]
async fn calls_before_connect_fail_fast() {
    let config = common::test_config();
    let broker = BrokerClient::new(&config);

    assert_eq!(broker.state().await, ConnectionState::Disconnected);
    assert!(!broker.is_connected().await);

    let err = broker
        .publish("notification.exchange", "push", &json!({}), Some("m1"))
        .await
        .unwrap_err();
    assert!(matches!(err, NotificationError::Connection(_)));
}
