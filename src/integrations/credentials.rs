//! 集成凭据（JSON 对象）的宽松读取

use serde_json::{Map, Value};

use crate::errors::{EngineError, Result};

/// 解密后的凭据；值统一按字符串读取
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Credentials(Map<String, Value>);

impl Credentials {
    /// 严格解析：非 JSON 对象时报错
    pub fn parse(raw: &str) -> Result<Self> {
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => Ok(Self(map)),
            Ok(_) => Err(EngineError::validation(
                "credentials must be a JSON object",
            )),
            Err(e) => Err(EngineError::serialization(e.to_string())),
        }
    }

    /// 解析失败时当作空凭据
    pub fn lenient(raw: &str) -> Self {
        Self::parse(raw).unwrap_or_default()
    }

    /// 取字符串值；数字和布尔转成文本，缺失为空串
    pub fn get(&self, key: &str) -> String {
        match self.0.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }

    /// 非空时返回值，否则返回默认
    pub fn get_or(&self, key: &str, fallback: &str) -> String {
        let value = self.get(key);
        if value.is_empty() {
            fallback.to_string()
        } else {
            value
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_get() {
        let creds = Credentials::parse(r#"{"token":"abc","port":5985,"empty":null}"#).unwrap();
        assert_eq!(creds.get("token"), "abc");
        assert_eq!(creds.get("port"), "5985");
        assert_eq!(creds.get("empty"), "");
        assert_eq!(creds.get("missing"), "");
        assert_eq!(creds.get_or("header_name", "X-API-Key"), "X-API-Key");
    }

    #[test]
    fn test_invalid_credentials() {
        assert!(Credentials::parse("not json").is_err());
        assert!(Credentials::parse("[1,2]").is_err());
        assert_eq!(Credentials::lenient("garbage"), Credentials::default());
    }
}
