use crate::{
    error::{NotificationError, NotificationResult},
    models::message::{BroadcastMessage, EmailMessage, PushMessage},
};

/// Syntactic address check: one `@`, non-empty local part, dotted domain,
/// no whitespace. Deliverability is the provider's problem.
pub fn validate_email_address(address: &str) -> NotificationResult<()> {
    let valid = match address.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !address.chars().any(char::is_whitespace)
                && !domain.contains('@')
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(NotificationError::Validation(format!(
            "invalid email address: {}",
            address
        )))
    }
}

pub fn validate_device_token(token: &str) -> NotificationResult<()> {
    if token.is_empty() {
        return Err(NotificationError::Validation(
            "device token cannot be empty".to_string(),
        ));
    }

    if token.len() < 20 {
        return Err(NotificationError::Validation(
            "device token too short (minimum 20 characters)".to_string(),
        ));
    }

    if token.len() > 200 {
        return Err(NotificationError::Validation(
            "device token too long (maximum 200 characters)".to_string(),
        ));
    }

    let valid_chars = token
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == ':' || c == '.');

    if !valid_chars {
        return Err(NotificationError::Validation(
            "device token contains invalid characters".to_string(),
        ));
    }

    Ok(())
}

pub fn validate_email_message(message: &EmailMessage) -> NotificationResult<()> {
    if message.notification_type.is_empty() {
        return Err(NotificationError::Validation(
            "type is required".to_string(),
        ));
    }

    validate_email_address(&message.to)
}

pub fn validate_push_message(message: &PushMessage) -> NotificationResult<()> {
    if message.notification_type.is_empty() {
        return Err(NotificationError::Validation(
            "type is required".to_string(),
        ));
    }

    if message.fcm_token.is_none() && message.user_id.is_none() {
        return Err(NotificationError::Validation(
            "fcmToken or userId is required for individual notifications".to_string(),
        ));
    }

    if let Some(token) = &message.fcm_token {
        validate_device_token(token)?;
    }

    Ok(())
}

/// All-or-nothing: one bad entry fails the whole broadcast, nothing is
/// partially sent. Entries only need a routable identifier; token format
/// is the backend's concern for broadcasts.
pub fn validate_broadcast_message(message: &BroadcastMessage) -> NotificationResult<()> {
    if message.notifications.is_empty() {
        return Err(NotificationError::Validation(
            "broadcast requires at least one notification entry".to_string(),
        ));
    }

    for (index, entry) in message.notifications.iter().enumerate() {
        if entry.fcm_token.is_none() && entry.user_id.is_none() {
            return Err(NotificationError::Validation(format!(
                "notification {}: fcmToken or userId is required",
                index
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_addresses() {
        assert!(validate_email_address("a@b.com").is_ok());
        assert!(validate_email_address("ana.souza+tag@mail.example.org").is_ok());
    }

    #[test]
    fn rejects_malformed_addresses() {
        for bad in ["", "no-at-sign", "@nolocal.com", "user@", "user@nodot", "a b@c.com"] {
            assert!(validate_email_address(bad).is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn rejects_short_and_dirty_tokens() {
        assert!(validate_device_token("short").is_err());
        assert!(validate_device_token(&"x".repeat(201)).is_err());
        assert!(validate_device_token("token with spaces and length ok").is_err());
        assert!(validate_device_token("fcm_token:AAAA-BBBB.1234567890").is_ok());
    }
}
