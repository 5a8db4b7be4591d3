use serde_json::Value;

/// Masks credential-like fields in a JSON payload before it is logged.
pub fn sanitize_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sanitized = serde_json::Map::new();
            for (key, val) in map {
                let sanitized_val = if is_sensitive_field(key) {
                    mask_value(val)
                } else {
                    sanitize_json(val)
                };
                sanitized.insert(key.clone(), sanitized_val);
            }
            Value::Object(sanitized)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sanitize_json).collect()),
        _ => value.clone(),
    }
}

fn is_sensitive_field(key: &str) -> bool {
    matches!(
        key.to_lowercase().as_str(),
        "password"
            | "token"
            | "payment_token"
            | "signature_key"
            | "server_key"
            | "secret"
            | "api_key"
            | "authorization"
            | "phone"
    )
}

fn mask_value(value: &Value) -> Value {
    match value {
        Value::String(s) if s.chars().count() > 8 => {
            let chars: Vec<char> = s.chars().collect();
            let visible: String = chars[..4].iter().collect();
            let end: String = chars[chars.len() - 4..].iter().collect();
            Value::String(format!("{}****{}", visible, end))
        }
        _ => Value::String("****".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sanitize_login_body() {
        let input = json!({
            "email": "keeper@example.com",
            "password": "hunter2"
        });

        let sanitized = sanitize_json(&input);

        assert_eq!(sanitized["password"], "****");
        assert_eq!(sanitized["email"], "keeper@example.com");
    }

    #[test]
    fn test_sanitize_nested_callback_fields() {
        let input = json!({
            "order_id": "ORDER_1_3_abcdef01",
            "details": {
                "signature_key": "0123456789abcdef0123456789abcdef",
                "gross_amount": "8880.00"
            },
            "items": [{"token": "short"}]
        });

        let sanitized = sanitize_json(&input);

        assert_eq!(sanitized["details"]["signature_key"], "0123****cdef");
        assert_eq!(sanitized["details"]["gross_amount"], "8880.00");
        assert_eq!(sanitized["items"][0]["token"], "****");
        assert_eq!(sanitized["order_id"], "ORDER_1_3_abcdef01");
    }
}
