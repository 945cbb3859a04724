use serde_json::Value;

pub const REDACTED: &str = "******";

const SENSITIVE_KEYS: &[&str] = &[
    "token",
    "password",
    "secret",
    "api_key",
    "apikey",
    "credentials",
    "client_secret",
    "authorization",
    "oauth",
    "api_token",
    "private_key",
];

fn is_sensitive(key: &str) -> bool {
    let lower = key.to_lowercase();
    SENSITIVE_KEYS.iter().any(|k| lower.contains(k))
}

/// 对 JSON 文本中的敏感字段打码；非 JSON 原样返回
pub fn redact(input: &str) -> String {
    if input.is_empty() {
        return String::new();
    }
    match serde_json::from_str::<Value>(input) {
        Ok(value) => redact_value(&value).to_string(),
        Err(_) => input.to_string(),
    }
}

pub fn redact_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    let v = if is_sensitive(k) {
                        Value::String(REDACTED.to_string())
                    } else {
                        redact_value(v)
                    };
                    (k.clone(), v)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_value).collect()),
        other => other.clone(),
    }
}

/// 把回传的打码值换回已存储的原值
///
/// 控制台拿到的是打码后的凭据，保存时原样回传；遇到 `******` 时沿用 `stored`
/// 中同一路径的值。任一方不是 JSON 时以 `incoming` 为准。
pub fn merge_redacted(incoming: &str, stored: &str) -> String {
    if !incoming.contains(REDACTED) {
        return incoming.to_string();
    }
    let (Ok(incoming_value), Ok(stored_value)) = (
        serde_json::from_str::<Value>(incoming),
        serde_json::from_str::<Value>(stored),
    ) else {
        return incoming.to_string();
    };
    merge_value(incoming_value, &stored_value).to_string()
}

fn merge_value(incoming: Value, stored: &Value) -> Value {
    match (incoming, stored) {
        (Value::String(s), original) if s == REDACTED => match original {
            Value::Null => Value::String(s),
            other => other.clone(),
        },
        (Value::Object(map), Value::Object(stored_map)) => Value::Object(
            map.into_iter()
                .map(|(k, v)| {
                    let original = stored_map.get(&k).unwrap_or(&Value::Null);
                    let merged = merge_value(v, original);
                    (k, merged)
                })
                .collect(),
        ),
        (Value::Array(items), Value::Array(stored_items)) => Value::Array(
            items
                .into_iter()
                .enumerate()
                .map(|(i, v)| merge_value(v, stored_items.get(i).unwrap_or(&Value::Null)))
                .collect(),
        ),
        (other, _) => other,
    }
}
