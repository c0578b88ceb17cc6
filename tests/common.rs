use std::{collections::HashMap, sync::Arc};

use notification_service::{
    config::Config,
    models::message::{BroadcastMessage, BroadcastTarget, EmailMessage, Priority},
    providers::{
        ProviderRegistry,
        local::{LocalEmailProvider, LocalPushProvider},
    },
};
use serde_json::Value;

pub fn test_config() -> Config {
    Config {
        rabbitmq_host: "localhost".to_string(),
        rabbitmq_port: 5672,
        rabbitmq_username: "guest".to_string(),
        rabbitmq_password: "guest".to_string(),
        rabbitmq_vhost: "/".to_string(),
        max_reconnect_attempts: 2,
        reconnect_delay_ms: 10,
        prefetch_count: 1,
        email_provider: "local".to_string(),
        push_provider: "local".to_string(),
        email_function_base_url: "http://localhost:7071".to_string(),
        email_function_api_key: String::new(),
        push_function_base_url: "http://localhost:7072".to_string(),
        push_function_api_key: String::new(),
        function_auth_mode: "query".to_string(),
        function_timeout_ms: 5_000,
        server_port: 0,
    }
}

/// Registry over local simulators with failure injection disabled, so
/// tests only observe deliberate failures.
pub fn reliable_registry(config: &Config) -> Arc<ProviderRegistry> {
    Arc::new(ProviderRegistry::with_backends(
        config,
        Arc::new(LocalEmailProvider::with_failure_rate(0.0)),
        Arc::new(LocalPushProvider::with_failure_rate(0.0)),
    ))
}

pub fn variables(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

pub fn email_message(message_id: &str, to: &str, notification_type: &str) -> EmailMessage {
    EmailMessage {
        message_id: message_id.to_string(),
        to: to.to_string(),
        notification_type: notification_type.to_string(),
        subject: None,
        body: None,
        template: None,
        variables: HashMap::new(),
        priority: Priority::Normal,
        timestamp: None,
    }
}

pub fn broadcast_message(message_id: &str, targets: Vec<BroadcastTarget>) -> BroadcastMessage {
    BroadcastMessage {
        message_id: message_id.to_string(),
        title: "Sale".to_string(),
        body: "20% off".to_string(),
        data: HashMap::new(),
        notifications: targets,
        priority: Priority::Normal,
        timestamp: None,
    }
}

pub fn target_with_user(user_id: &str) -> BroadcastTarget {
    BroadcastTarget {
        user_id: Some(Value::String(user_id.to_string())),
        fcm_token: None,
        custom_data: HashMap::new(),
    }
}

pub fn target_with_token(token: &str) -> BroadcastTarget {
    BroadcastTarget {
        user_id: None,
        fcm_token: Some(token.to_string()),
        custom_data: HashMap::new(),
    }
}
