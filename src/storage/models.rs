//! 对外暴露的数据模型
//!
//! JSON 形状与管理控制台保持一致，请求体与响应体共用同一组结构。

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// 全局视图使用的租户 ID
pub const GLOBAL_TENANT_ID: i32 = 0;
/// 默认租户，也是 bootstrap 的模板来源
pub const DEFAULT_TENANT_ID: i32 = 1;

/// 查询作用域：单租户或全部租户
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantScope {
    All,
    Tenant(i32),
}

impl TenantScope {
    pub fn tenant_id(&self) -> Option<i32> {
        match self {
            TenantScope::All => None,
            TenantScope::Tenant(id) => Some(*id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display, EnumString)]
pub enum Severity {
    Low = 1,
    Medium = 2,
    High = 3,
    Critical = 4,
}

impl Severity {
    /// 未知字符串按 Low 处理
    pub fn score_of(value: &str) -> i64 {
        value
            .parse::<Severity>()
            .map(|s| s as i64)
            .unwrap_or(Severity::Low as i64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    Admin,
    Integrator,
    ActionBuilder,
    WorkflowEditor,
    Viewer,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Tenant {
    pub id: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub name: String,
    pub description: String,
    pub api_key: Option<String>,
}

/// 嵌入到列表响应中的租户摘要，不含 api_key
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TenantRef {
    pub id: i32,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct User {
    pub id: i32,
    pub created_at: DateTime<Utc>,
    pub email: String,
    pub name: String,
    pub role: String,
    pub provider: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuditLogEntry {
    pub id: i32,
    pub timestamp: DateTime<Utc>,
    pub user_id: i32,
    pub tenant_id: i32,
    pub action: String,
    pub resource: String,
    pub target_id: String,
    pub details: String,
    pub ip: String,
}

/// 外部厂商 API 连接
///
/// `credentials` 在内存中始终是明文 JSON，落库前加密。
/// OAuth 令牌缓存不对外序列化。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Integration {
    pub id: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub tenant_id: i32,
    pub name: String,
    #[serde(rename = "type")]
    pub integration_type: String,
    pub base_url: String,
    pub auth_type: String,
    pub credentials: String,
    pub enabled: bool,
    pub polling_interval: i32,
    pub rate_limit: f64,
    pub token_endpoint: String,
    #[serde(skip)]
    pub oauth_token: String,
    #[serde(skip)]
    pub oauth_expires_at: Option<DateTime<Utc>>,
    pub last_rotated_at: Option<DateTime<Utc>>,
    pub rotation_interval_days: i32,
    pub consecutive_failures: i32,
    pub is_available: bool,
    /// 仅列表接口填充
    #[serde(skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<TenantRef>,
}

impl Default for Integration {
    fn default() -> Self {
        Self {
            id: 0,
            created_at: DateTime::default(),
            updated_at: DateTime::default(),
            tenant_id: 0,
            name: String::new(),
            integration_type: String::new(),
            base_url: String::new(),
            auth_type: String::new(),
            credentials: String::new(),
            enabled: false,
            polling_interval: 0,
            rate_limit: 0.0,
            token_endpoint: String::new(),
            oauth_token: String::new(),
            oauth_expires_at: None,
            last_rotated_at: None,
            rotation_interval_days: 0,
            consecutive_failures: 0,
            is_available: true,
            tenant: None,
        }
    }
}

impl Integration {
    pub fn is_poller(&self) -> bool {
        self.name.contains("AuthMind")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ActionDefinition {
    pub id: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub tenant_id: i32,
    pub name: String,
    pub vendor: String,
    pub integration_id: i32,
    pub method: String,
    pub path_template: String,
    pub body_template: String,
    pub success_field: String,
    pub retry_count: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Workflow {
    pub id: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub tenant_id: i32,
    pub name: String,
    pub description: String,
    pub enabled: bool,
    pub trigger_type: String,
    pub min_severity: String,
    pub pollers: Vec<Integration>,
    pub steps: Vec<WorkflowStep>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkflowStep {
    pub id: i32,
    pub workflow_id: i32,
    pub order: i32,
    pub action_definition_id: i32,
    #[serde(skip_deserializing)]
    pub definition: Option<ActionDefinition>,
    pub parameter_mapping: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Job {
    pub id: i32,
    pub created_at: DateTime<Utc>,
    pub tenant_id: i32,
    pub workflow_id: i32,
    pub workflow: Option<Workflow>,
    pub status: String,
    pub authmind_issue_id: String,
    pub trigger_context: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct JobLog {
    pub id: i32,
    pub job_id: i32,
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SystemSetting {
    pub id: i32,
    pub key: String,
    pub value: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MessageTemplate {
    pub id: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub tenant_id: i32,
    pub issue_type: String,
    pub language: String,
    pub title: String,
    pub message: String,
    pub footer: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RemediationRecommendation {
    pub id: i32,
    pub issue_type: String,
    pub title: String,
    pub description: String,
    pub steps: String,
    pub reference_url: String,
}

/// 分页结果
#[derive(Debug, Clone, Serialize)]
pub struct JobPage {
    pub data: Vec<Job>,
    pub total: u64,
    pub page: u64,
    #[serde(rename = "pageSize")]
    pub page_size: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DashboardStats {
    pub total_jobs: u64,
    pub success_jobs: u64,
    pub failed_jobs: u64,
    pub running_jobs: u64,
    pub active_workflows: u64,
    pub workflow_breakdown: BTreeMap<String, i64>,
    pub processed_events: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TenantJobCount {
    pub tenant_id: i32,
    pub tenant_name: String,
    pub job_count: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AggregateStats {
    pub total_jobs: u64,
    pub success_jobs: u64,
    pub failed_jobs: u64,
    pub running_jobs: u64,
    pub total_tenants: u64,
    pub active_workflows: u64,
    pub tenant_breakdown: Vec<TenantJobCount>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_scores() {
        assert_eq!(Severity::score_of("Critical"), 4);
        assert_eq!(Severity::score_of("High"), 3);
        assert_eq!(Severity::score_of("Medium"), 2);
        assert_eq!(Severity::score_of("Low"), 1);
        assert_eq!(Severity::score_of("whatever"), 1);
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(JobStatus::Running.to_string(), "running");
        assert_eq!("failed".parse::<JobStatus>().unwrap(), JobStatus::Failed);
        assert_eq!(LogLevel::Warn.to_string(), "WARN");
        assert_eq!(Role::WorkflowEditor.to_string(), "workflow_editor");
    }

    #[test]
    fn test_integration_hides_oauth_cache() {
        let integ = Integration {
            name: "Okta".into(),
            integration_type: "REST".into(),
            oauth_token: "cached".into(),
            ..Default::default()
        };
        let value = serde_json::to_value(&integ).unwrap();
        assert_eq!(value["type"], "REST");
        assert!(value.get("oauth_token").is_none());
        assert!(value.get("oauth_expires_at").is_none());
    }

    #[test]
    fn test_integration_input_defaults_available() {
        let integ: Integration = serde_json::from_str(r#"{"name":"Slack"}"#).unwrap();
        assert!(integ.is_available);
        assert_eq!(integ.consecutive_failures, 0);
    }

    #[test]
    fn test_step_json_uses_order() {
        let step: WorkflowStep =
            serde_json::from_str(r#"{"order":2,"action_definition_id":7}"#).unwrap();
        assert_eq!(step.order, 2);
        let value = serde_json::to_value(&step).unwrap();
        assert_eq!(value["order"], 2);
        assert!(value["definition"].is_null());
    }
}
