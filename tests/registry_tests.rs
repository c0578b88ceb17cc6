use std::{collections::HashMap, sync::Arc};

use notification_service::{
    error::NotificationError,
    models::provider::BackendKind,
    providers::{ProviderRegistry, PushPayload},
};
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

use crate::common;

#[tokio::test]
async fn from_config_rejects_unknown_backend() {
    let mut config = common::test_config();
    config.email_provider = "carrier-pigeon".to_string();

    let err = ProviderRegistry::from_config(&config).unwrap_err();
    assert!(matches!(err, NotificationError::Configuration(_)));
}

#[tokio::test]
async fn switch_rejects_unknown_backend() {
    let config = common::test_config();
    let registry = common::reliable_registry(&config);

    let err = registry.switch_email("smoke-signals").await.unwrap_err();
    assert!(matches!(err, NotificationError::Configuration(_)));

    // The active provider is untouched by the failed switch.
    assert_eq!(registry.email_descriptor().await.backend, BackendKind::Local);
}

#[tokio::test]
async fn switch_replaces_descriptor_wholesale() {
    let config = common::test_config();
    let registry = common::reliable_registry(&config);

    let before = registry.push_descriptor().await;
    assert_eq!(before.backend, BackendKind::Local);

    let after = registry.switch_push("remote").await.unwrap();
    assert_eq!(after.backend, BackendKind::Remote);
    assert_eq!(after.stats.sent, 0);

    assert_eq!(registry.push_descriptor().await.backend, BackendKind::Remote);
}

/// Fifty concurrent sends race a backend switch. Every send must complete
/// against exactly one consistent instance: either the old local
/// simulator or the fully constructed remote forwarder, never anything in
/// between.
#[tokio::test]
async fn concurrent_switch_and_sends_stay_consistent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/PushFunction"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"messageId": "remote-1"})))
        .mount(&server)
        .await;

    let mut config = common::test_config();
    config.push_function_base_url = server.uri();

    let registry = common::reliable_registry(&config);

    let mut tasks = Vec::new();
    for i in 0..50 {
        let registry = registry.clone();
        tasks.push(tokio::spawn(async move {
            let payload = PushPayload {
                message_id: format!("race-{}", i),
                user_id: Some(json!("u1")),
                fcm_token: None,
                title: "t".to_string(),
                body: "b".to_string(),
                data: HashMap::new(),
            };

            let provider = registry.push().await;
            provider.send(&payload).await
        }));
    }

    let switcher = {
        let registry = registry.clone();
        tokio::spawn(async move { registry.switch_push("remote").await })
    };

    switcher.await.unwrap().unwrap();

    for task in tasks {
        let receipt = task.await.unwrap().unwrap();
        assert!(
            receipt.provider == "local-push-provider" || receipt.provider == "remote-push-provider",
            "send observed inconsistent provider {}",
            receipt.provider
        );
    }

    assert_eq!(registry.push_descriptor().await.backend, BackendKind::Remote);
}
