//! Slack incoming webhook

use serde::Serialize;

use crate::errors::{EngineError, Result};

const BOT_NAME: &str = "RemediationBot";
const BOT_ICON: &str = ":robot_face:";

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct SlackPayload {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub username: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub icon_emoji: String,
}

#[derive(Clone)]
pub struct SlackClient {
    webhook_url: String,
    client: reqwest::Client,
}

impl SlackClient {
    pub fn new(client: reqwest::Client, webhook_url: &str) -> Self {
        Self {
            webhook_url: webhook_url.to_string(),
            client,
        }
    }

    pub async fn send_notification(&self, message: &str) -> Result<()> {
        let payload = SlackPayload {
            text: message.to_string(),
            username: BOT_NAME.to_string(),
            icon_emoji: BOT_ICON.to_string(),
            ..Default::default()
        };

        let resp = self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| EngineError::integration(format!("slack request failed: {}", e)))?;

        if resp.status() != reqwest::StatusCode::OK {
            return Err(EngineError::integration(format!(
                "Slack error: {}",
                resp.status()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_omits_empty_fields() {
        let payload = SlackPayload {
            text: "hi".into(),
            ..Default::default()
        };
        assert_eq!(serde_json::to_string(&payload).unwrap(), r#"{"text":"hi"}"#);
    }
}
