//! AuthMind 问题查询 API 客户端

use std::time::Duration;

use chrono::{Months, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::errors::{EngineError, Result};

const ISSUE_PAGE_SIZE: &str = "100";
const DETAIL_PAGE_SIZE: &str = "1000";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Issue {
    pub issue_time: String,
    pub issue_id: String,
    pub issue_type: String,
    pub playbook_name: String,
    pub issue_keys: Map<String, Value>,
    pub message: String,
    pub risk: String,
    pub flow_count: i64,
    pub incident_count: i64,
    pub incidents_url: String,
    pub issue_details_api: String,
    pub severity: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IssueDetails {
    pub success: bool,
    pub results: Vec<DetailItem>,
    pub metadata: Map<String, Value>,
}

impl IssueDetails {
    /// 首条结果的描述
    pub fn summary(&self) -> &str {
        self.results.first().map(|r| r.message.as_str()).unwrap_or("")
    }

    /// 首条结果的风险等级
    pub fn risk_score(&self) -> &str {
        self.results.first().map(|r| r.risk.as_str()).unwrap_or("")
    }

    /// 详情拉取失败时放进上下文的占位内容
    pub fn unavailable() -> Self {
        Self {
            success: false,
            results: vec![DetailItem {
                message: "Details unavailable (API Error)".to_string(),
                risk: "Unknown".to_string(),
                ..Default::default()
            }],
            metadata: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DetailItem {
    pub first_seen: String,
    pub last_seen: String,
    pub risk: String,
    pub message: String,
    pub issue_type: String,
    pub issue_keys: Map<String, Value>,
    pub incidents_url: String,
    pub total_flow_count: i64,
    pub total_incident_count: i64,
    pub incidents: Vec<Incident>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Incident {
    pub asset_hostname: String,
    pub asset_name: String,
    pub asset_port: i64,
    pub asset_protocol: String,
    pub asset_type: String,
    pub first_seen: String,
    pub flow_count: i64,
    pub identity_hostname: String,
    pub identity_name: String,
    pub identity_type: String,
    pub incident_id: i64,
    pub incident_risk: String,
    pub incident_url: String,
    pub incident_highlights: String,
    pub last_seen: String,
    pub playbook_name: String,
    pub site_code: String,
    pub status: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct IssueList {
    results: Vec<Issue>,
}

/// AuthMind SDK
#[derive(Clone)]
pub struct AuthMindClient {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl AuthMindClient {
    pub fn new(client: reqwest::Client, base_url: &str, token: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            client,
        }
    }

    /// 使用独立的 HTTP 客户端
    pub fn with_timeout(base_url: &str, token: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::new(client, base_url, token))
    }

    /// 拉取 issue_id 大于游标的问题（两个月内，升序，最多 100 条）
    pub async fn get_issues(&self, issue_type: &str, since_id: &str) -> Result<Vec<Issue>> {
        let since_time = Utc::now()
            .checked_sub_months(Months::new(2))
            .unwrap_or_else(Utc::now)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();

        let mut params: Vec<(&str, &str)> = Vec::with_capacity(7);
        if !issue_type.is_empty() && issue_type != "All" {
            params.push(("issue_type", issue_type));
        }
        params.extend([
            ("issue_id_gt", since_id),
            ("issue_time_gt", since_time.as_str()),
            ("sort_order", "ASC"),
            ("sort_by", "issue_id"),
            ("from", "0"),
            ("size", ISSUE_PAGE_SIZE),
        ]);

        debug!("AuthMind getIssues type={:?} since={}", issue_type, since_id);
        let resp = self
            .client
            .get(format!("{}/getIssues", self.base_url))
            .query(&params)
            .bearer_auth(&self.token)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(|e| EngineError::integration(format!("authmind request failed: {}", e)))?;

        if resp.status() != reqwest::StatusCode::OK {
            return Err(EngineError::integration(format!(
                "authmind api error {}",
                resp.status().as_u16()
            )));
        }

        let list: IssueList = resp
            .json()
            .await
            .map_err(|e| EngineError::integration(format!("invalid authmind response: {}", e)))?;
        Ok(list.results)
    }

    pub async fn get_issue_details(&self, issue_id: &str) -> Result<IssueDetails> {
        let params = [
            ("issue_id", issue_id),
            ("sort_order", "ASC"),
            ("sort_by", "incident_id"),
            ("from", "0"),
            ("size", DETAIL_PAGE_SIZE),
        ];
        let resp = self
            .client
            .get(format!("{}/getIssueDetails", self.base_url))
            .query(&params)
            .bearer_auth(&self.token)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(|e| EngineError::integration(format!("authmind request failed: {}", e)))?;

        if resp.status() != reqwest::StatusCode::OK {
            return Err(EngineError::integration(format!(
                "authmind api error {}",
                resp.status().as_u16()
            )));
        }

        resp.json()
            .await
            .map_err(|e| EngineError::integration(format!("invalid authmind response: {}", e)))
    }
}
