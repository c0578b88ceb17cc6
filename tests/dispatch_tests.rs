use std::sync::Arc;

use notification_service::{
    dispatch::Dispatcher,
    error::NotificationError,
    listeners::{DeliveryHandler, email::EmailHandler, push::PushHandler},
    models::message::DeliveryInfo,
    providers::{
        ProviderRegistry,
        local::{LocalEmailProvider, LocalPushProvider},
    },
};
use serde_json::json;

use crate::common;

fn delivery_info(queue: &str, message_id: &str) -> DeliveryInfo {
    DeliveryInfo {
        queue: queue.to_string(),
        exchange: "notification.exchange".to_string(),
        routing_key: queue.to_string(),
        message_id: message_id.to_string(),
        timestamp: None,
    }
}

/// The order_completed scenario: subject interpolates the order id, body
/// carries the customer name, and no known placeholder is left behind.
#[tokio::test]
async fn order_completed_email_interpolates_variables() {
    let config = common::test_config();
    let dispatcher = Dispatcher::new(common::reliable_registry(&config));

    let mut message = common::email_message("m1", "a@b.com", "order_completed");
    message.variables = common::variables(&[("orderId", json!(42)), ("customerName", json!("Ana"))]);

    let result = dispatcher.dispatch_email(&message).await.unwrap();

    assert!(result.success);
    assert_eq!(result.rendered.subject, "Pedido #42 entregue com sucesso!");
    assert!(result.rendered.body.contains("Ana"));
    assert!(!result.rendered.body.contains("{{customerName}}"));
    assert!(!result.rendered.subject.contains("{{orderId}}"));
}

/// Template resolution is pure: same message, same variables, same bytes.
#[tokio::test]
async fn repeated_dispatch_renders_identically() {
    let config = common::test_config();
    let dispatcher = Dispatcher::new(common::reliable_registry(&config));

    let mut message = common::email_message("m1", "a@b.com", "order_completed");
    message.variables = common::variables(&[("orderId", json!(42)), ("customerName", json!("Ana"))]);

    let first = dispatcher.dispatch_email(&message).await.unwrap();
    let second = dispatcher.dispatch_email(&message).await.unwrap();

    assert_eq!(first.rendered, second.rendered);
}

#[tokio::test]
async fn explicit_subject_still_gets_placeholders_rendered() {
    let config = common::test_config();
    let dispatcher = Dispatcher::new(common::reliable_registry(&config));

    let mut message = common::email_message("m3", "a@b.com", "order_created");
    message.subject = Some("Olá {{customerName}}".to_string());
    message.body = Some("Pedido {{orderId}}".to_string());
    message.variables = common::variables(&[("orderId", json!(7))]);

    let result = dispatcher.dispatch_email(&message).await.unwrap();

    // customerName falls back to the built-in default.
    assert_eq!(result.rendered.subject, "Olá Cliente");
    assert_eq!(result.rendered.body, "Pedido 7");
}

#[tokio::test]
async fn unknown_type_falls_back_to_welcome() {
    let config = common::test_config();
    let dispatcher = Dispatcher::new(common::reliable_registry(&config));

    let message = common::email_message("m4", "a@b.com", "totally_unknown_event");
    let result = dispatcher.dispatch_email(&message).await.unwrap();

    assert!(result.success);
    assert!(result.rendered.subject.contains("Bem-vindo"));
}

/// The broadcast scenario: two routable targets against the local
/// backend land as sent=2, failed=0.
#[tokio::test]
async fn broadcast_delivers_to_all_targets() {
    let config = common::test_config();
    let dispatcher = Dispatcher::new(common::reliable_registry(&config));

    let message = common::broadcast_message(
        "m2",
        vec![
            common::target_with_user("u1"),
            common::target_with_token("tok123"),
        ],
    );

    let result = dispatcher.dispatch_broadcast(&message).await.unwrap();

    assert!(result.success);
    assert_eq!(result.response["sent"], json!(2));
    assert_eq!(result.response["failed"], json!(0));
    assert_eq!(result.response["total"], json!(2));
}

#[tokio::test]
async fn provider_failure_propagates_as_transient_error() {
    let config = common::test_config();
    let registry = Arc::new(ProviderRegistry::with_backends(
        &config,
        Arc::new(LocalEmailProvider::with_failure_rate(1.0)),
        Arc::new(LocalPushProvider::with_failure_rate(1.0)),
    ));
    let dispatcher = Dispatcher::new(registry);

    let message = common::email_message("m5", "a@b.com", "welcome");
    let err = dispatcher.dispatch_email(&message).await.unwrap_err();

    assert!(matches!(err, NotificationError::Provider(_)));
    assert!(!err.is_permanent());
}

/// A schema-invalid message is rejected before the pipeline runs: the
/// provider counters stay untouched.
#[tokio::test]
async fn invalid_recipient_never_reaches_the_pipeline() {
    let config = common::test_config();
    let registry = common::reliable_registry(&config);
    let handler = EmailHandler::new(Arc::new(Dispatcher::new(registry.clone())));

    let payload = json!({
        "messageId": "bad1",
        "to": "not-an-email",
        "type": "welcome",
    });

    let err = handler
        .handle(payload, &delivery_info("emails", "bad1"))
        .await
        .unwrap_err();

    assert!(matches!(err, NotificationError::Validation(_)));
    assert!(err.is_permanent());
    assert_eq!(registry.email_descriptor().await.stats.sent, 0);
}

#[tokio::test]
async fn missing_required_field_is_a_validation_error() {
    let config = common::test_config();
    let registry = common::reliable_registry(&config);
    let handler = EmailHandler::new(Arc::new(Dispatcher::new(registry)));

    // No "to" at all.
    let payload = json!({"messageId": "bad2", "type": "welcome"});

    let err = handler
        .handle(payload, &delivery_info("emails", "bad2"))
        .await
        .unwrap_err();

    assert!(matches!(err, NotificationError::Validation(_)));
}

/// One entry without any routable identifier fails the whole broadcast;
/// no partial sends happen.
#[tokio::test]
async fn broadcast_with_invalid_entry_fails_entirely() {
    let config = common::test_config();
    let registry = common::reliable_registry(&config);
    let handler = PushHandler::new(Arc::new(Dispatcher::new(registry.clone())));

    let payload = json!({
        "messageId": "b1",
        "type": "broadcast",
        "title": "Sale",
        "body": "20% off",
        "notifications": [
            {"userId": "u1"},
            {},
        ],
    });

    let err = handler
        .handle(payload, &delivery_info("push-notifications", "b1"))
        .await
        .unwrap_err();

    assert!(matches!(err, NotificationError::Validation(_)));

    let stats = registry.push_descriptor().await.stats;
    assert_eq!(stats.sent, 0);
    assert_eq!(stats.broadcasts, 0);
}

#[tokio::test]
async fn individual_push_requires_a_recipient() {
    let config = common::test_config();
    let registry = common::reliable_registry(&config);
    let handler = PushHandler::new(Arc::new(Dispatcher::new(registry)));

    let payload = json!({
        "messageId": "p1",
        "type": "order_created",
        "title": "t",
        "body": "b",
    });

    let err = handler
        .handle(payload, &delivery_info("push-notifications", "p1"))
        .await
        .unwrap_err();

    assert!(matches!(err, NotificationError::Validation(_)));
}

#[tokio::test]
async fn push_dispatch_resolves_templates() {
    let config = common::test_config();
    let registry = common::reliable_registry(&config);
    let handler = PushHandler::new(Arc::new(Dispatcher::new(registry.clone())));

    let payload = json!({
        "messageId": "p2",
        "type": "order_created",
        "userId": "u1",
        "variables": {"orderId": 11},
    });

    let result = handler
        .handle(payload, &delivery_info("push-notifications", "p2"))
        .await
        .unwrap();

    assert!(result.success);
    assert!(result.rendered.body.contains("#11"));
    assert_eq!(registry.push_descriptor().await.stats.sent, 1);
}
