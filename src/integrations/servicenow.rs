//! ServiceNow 事件单

use serde::{Deserialize, Serialize};

use crate::errors::{EngineError, Result};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct IncidentRequest {
    pub short_description: String,
    pub description: String,
    pub urgency: String,
    pub impact: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct IncidentRecord {
    pub number: String,
    pub sys_id: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct IncidentResponse {
    pub result: IncidentRecord,
}

#[derive(Clone)]
pub struct ServiceNowClient {
    base_url: String,
    username: String,
    password: String,
    client: reqwest::Client,
}

impl ServiceNowClient {
    pub fn new(client: reqwest::Client, base_url: &str, username: &str, password: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
            client,
        }
    }

    /// 创建最高紧急度 / 影响度的事件单
    pub async fn create_incident(
        &self,
        short_description: &str,
        description: &str,
    ) -> Result<IncidentResponse> {
        let payload = IncidentRequest {
            short_description: short_description.to_string(),
            description: description.to_string(),
            urgency: "1".to_string(),
            impact: "1".to_string(),
        };

        let resp = self
            .client
            .post(format!("{}/api/now/table/incident", self.base_url))
            .basic_auth(&self.username, Some(&self.password))
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| EngineError::integration(format!("servicenow request failed: {}", e)))?;

        let status = resp.status();
        if status != reqwest::StatusCode::OK && status != reqwest::StatusCode::CREATED {
            return Err(EngineError::integration(format!(
                "ServiceNow error: {}",
                status
            )));
        }

        resp.json().await.map_err(|e| {
            EngineError::integration(format!("invalid servicenow response: {}", e))
        })
    }
}
