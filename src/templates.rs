//! Built-in notification templates and `{{key}}` substitution.
//!
//! Resolution is pure: the same notification type and variables always
//! produce byte-identical text. Unknown placeholders are left verbatim
//! rather than failing the message.

use std::collections::HashMap;

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTemplate {
    pub subject: String,
    pub body: String,
    pub variant: &'static str,
}

/// Role hint carried in `variables` that selects driver-facing wording.
const RECIPIENT_ROLE_KEY: &str = "recipientType";
const DRIVER_ROLE: &str = "DRIVER";

fn is_driver(variables: &HashMap<String, Value>) -> bool {
    variables
        .get(RECIPIENT_ROLE_KEY)
        .and_then(Value::as_str)
        .is_some_and(|role| role == DRIVER_ROLE)
}

/// Template catalog for the email channel, keyed by normalized
/// notification type. Unknown types fall back to `welcome`.
pub fn resolve_email(notification_type: &str, variables: &HashMap<String, Value>) -> ResolvedTemplate {
    let (subject, body, variant) = match notification_type.to_ascii_lowercase().as_str() {
        "order_completed" => {
            if is_driver(variables) {
                (
                    "Entrega concluída - Pedido #{{orderId}}",
                    DRIVER_ORDER_COMPLETED_BODY,
                    "driver-order-completed",
                )
            } else {
                (
                    "Pedido #{{orderId}} entregue com sucesso!",
                    CUSTOMER_ORDER_COMPLETED_BODY,
                    "order-completed",
                )
            }
        }
        "order_created" => (
            "Pedido #{{orderId}} criado com sucesso!",
            ORDER_CREATED_BODY,
            "order-created",
        ),
        "promotional" => ("{{title}}", "{{content}}", "promotional-campaign"),
        "evaluation_reminder" | "order_evaluation" => (
            "Avalie sua entrega - Pedido #{{orderId}}",
            EVALUATION_REMINDER_BODY,
            "evaluation-reminder",
        ),
        _ => (
            "Bem-vindo ao nosso serviço de delivery!",
            "Seja bem-vindo! Estamos prontos para suas entregas.",
            "welcome",
        ),
    };

    ResolvedTemplate {
        subject: render(subject, variables),
        body: render(body, variables),
        variant,
    }
}

/// Push templates use the same catalog keys with shorter wording; the
/// resolved `subject` doubles as the notification title.
pub fn resolve_push(notification_type: &str, variables: &HashMap<String, Value>) -> ResolvedTemplate {
    let (title, body, variant) = match notification_type.to_ascii_lowercase().as_str() {
        "order_completed" => {
            if is_driver(variables) {
                (
                    "Entrega concluída!",
                    "Você concluiu a entrega do pedido #{{orderId}}.",
                    "driver-order-completed",
                )
            } else {
                (
                    "Pedido entregue!",
                    "Seu pedido #{{orderId}} foi entregue com sucesso.",
                    "order-completed",
                )
            }
        }
        "order_created" => (
            "Pedido criado com sucesso!",
            "Seu pedido #{{orderId}} foi criado. Estamos procurando um transportador.",
            "order-created",
        ),
        "promotional" => ("{{title}}", "{{content}}", "promotional-campaign"),
        "evaluation_reminder" | "order_evaluation" => (
            "Avalie sua entrega!",
            "Seu pedido #{{orderId}} foi finalizado. Que tal avaliar o transportador?",
            "evaluation-reminder",
        ),
        _ => (
            "Bem-vindo!",
            "Seja bem-vindo! Estamos prontos para suas entregas.",
            "welcome",
        ),
    };

    ResolvedTemplate {
        subject: render(title, variables),
        body: render(body, variables),
        variant,
    }
}

/// Replace `{{key}}` placeholders from `variables`, falling back to the
/// built-in defaults for well-known keys. Placeholders with no value stay
/// verbatim; this never fails.
pub fn render(template: &str, variables: &HashMap<String, Value>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        match after.find("}}") {
            Some(end) if end > 0 && is_placeholder_key(&after[..end]) => {
                let key = &after[..end];
                match lookup(key, variables) {
                    Some(value) => out.push_str(&value),
                    None => {
                        out.push_str("{{");
                        out.push_str(key);
                        out.push_str("}}");
                    }
                }
                rest = &after[end + 2..];
            }
            _ => {
                // Not a well-formed placeholder; emit the braces and move on.
                out.push_str("{{");
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

fn is_placeholder_key(key: &str) -> bool {
    key.chars().all(|c| c.is_alphanumeric() || c == '_')
}

fn lookup(key: &str, variables: &HashMap<String, Value>) -> Option<String> {
    if let Some(value) = variables.get(key) {
        return Some(stringify(value));
    }

    match key {
        "customerName" => Some("Cliente".to_string()),
        "orderDescription" => Some("Sua entrega".to_string()),
        "deliveryAddress" => Some("Endereço não informado".to_string()),
        _ => None,
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

const CUSTOMER_ORDER_COMPLETED_BODY: &str = "\
Olá {{customerName}}!

Temos uma ótima notícia para você!

Seu pedido #{{orderId}} foi entregue com sucesso!

Detalhes da entrega:
- Descrição: {{orderDescription}}
- Endereço de entrega: {{deliveryAddress}}
- Data/hora da entrega: {{completedAt}}

Sua entrega foi confirmada e já está disponível no endereço informado.

Obrigado por confiar em nosso serviço de delivery!

---
Equipe de Entregas";

const DRIVER_ORDER_COMPLETED_BODY: &str = "\
Olá {{customerName}}!

Entrega finalizada com sucesso!

Você concluiu a entrega do pedido #{{orderId}}.

Detalhes da entrega:
- Descrição: {{orderDescription}}
- Retirada: {{originAddress}}
- Entrega: {{deliveryAddress}}
- Finalizada em: {{completedAt}}

A entrega foi confirmada e será computada em seus ganhos.

Parabéns pelo excelente trabalho!

---
Equipe de Entregas";

const ORDER_CREATED_BODY: &str = "\
Olá {{customerName}}!

Seu pedido foi criado com sucesso!

Pedido #{{orderId}} está sendo processado e em breve será atribuído a um entregador.

Detalhes do pedido:
- Descrição: {{orderDescription}}
- Endereço de entrega: {{deliveryAddress}}
- Criado em: {{createdAt}}

Você receberá atualizações sobre o status do seu pedido por email e push notifications.

Obrigado por escolher nosso serviço!

---
Equipe de Entregas";

const EVALUATION_REMINDER_BODY: &str = "\
Olá {{customerName}}!

Seu pedido #{{orderId}} foi finalizado. Que tal avaliar o transportador?

Sua avaliação ajuda a manter a qualidade das entregas.

---
Equipe de Entregas";

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn substitutes_known_variables() {
        let variables = vars(&[("orderId", json!(42)), ("customerName", json!("Ana"))]);
        let resolved = resolve_email("order_completed", &variables);

        assert_eq!(resolved.subject, "Pedido #42 entregue com sucesso!");
        assert!(resolved.body.contains("Olá Ana!"));
        assert!(!resolved.body.contains("{{customerName}}"));
    }

    #[test]
    fn falls_back_to_builtin_defaults() {
        let resolved = resolve_email("order_created", &HashMap::new());
        assert!(resolved.body.contains("Olá Cliente!"));
        assert!(resolved.body.contains("Sua entrega"));
    }

    #[test]
    fn unknown_placeholders_stay_verbatim() {
        let rendered = render("pedido {{orderId}} em {{completedAt}}", &HashMap::new());
        assert_eq!(rendered, "pedido {{orderId}} em {{completedAt}}");
    }

    #[test]
    fn malformed_braces_pass_through() {
        let rendered = render("a {{ b }} c {{unclosed", &HashMap::new());
        assert_eq!(rendered, "a {{ b }} c {{unclosed");
    }

    #[test]
    fn unknown_type_falls_back_to_welcome() {
        let resolved = resolve_email("mystery_event", &HashMap::new());
        assert_eq!(resolved.variant, "welcome");
    }

    #[test]
    fn upper_case_event_names_normalize() {
        let variables = vars(&[("orderId", json!(7))]);
        let resolved = resolve_email("ORDER_COMPLETED", &variables);
        assert_eq!(resolved.variant, "order-completed");
        assert!(resolved.subject.contains('7'));
    }

    #[test]
    fn driver_hint_selects_driver_variant() {
        let variables = vars(&[("recipientType", json!("DRIVER")), ("orderId", json!(9))]);
        let resolved = resolve_email("order_completed", &variables);
        assert_eq!(resolved.variant, "driver-order-completed");
        assert_eq!(resolved.subject, "Entrega concluída - Pedido #9");
    }

    #[test]
    fn rendering_is_pure() {
        let variables = vars(&[("orderId", json!(42)), ("customerName", json!("Ana"))]);
        let first = resolve_email("order_completed", &variables);
        let second = resolve_email("order_completed", &variables);
        assert_eq!(first, second);
    }
}
