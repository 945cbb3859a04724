//! 触发上下文与步骤上下文的构造

use chrono::Utc;
use serde_json::{Map, Value, json};

use crate::integrations::{Issue, IssueDetails};
use crate::storage::{Job, MessageTemplate, Severity, Workflow};

pub const UNKNOWN_USER: &str = "Unknown";
pub const RERUN_FALLBACK_EMAIL: &str = "rerun-task@example.com";
/// 匹配所有问题类型的工作流名
pub const MATCH_ALL_WORKFLOW: &str = "All";

const USER_EMAIL_KEYS: [&str; 4] = ["identity_name", "user_email", "username", "email"];

/// issue_keys 中第一个非空的身份字段
pub fn user_email(issue_keys: &Map<String, Value>) -> String {
    USER_EMAIL_KEYS
        .iter()
        .find_map(|key| match issue_keys.get(*key) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            _ => None,
        })
        .unwrap_or_else(|| UNKNOWN_USER.to_string())
}

/// 工作流是否处理该问题：名称匹配（或 All）且严重度不低于门槛
pub fn workflow_matches(workflow: &Workflow, issue: &Issue) -> bool {
    if workflow.name != issue.issue_type && workflow.name != MATCH_ALL_WORKFLOW {
        return false;
    }
    i64::from(issue.severity) >= Severity::score_of(&workflow.min_severity)
}

/// 详情序列化后附带 Summary / RiskScore 便于模板直接取用
pub fn details_value(details: &IssueDetails) -> Value {
    let mut value = serde_json::to_value(details).unwrap_or_else(|_| json!({}));
    if let Value::Object(map) = &mut value {
        map.insert("Summary".into(), Value::String(details.summary().to_string()));
        map.insert(
            "RiskScore".into(),
            Value::String(details.risk_score().to_string()),
        );
    }
    value
}

pub fn trigger_context(tenant_id: i32, issue: &Issue, details: &IssueDetails) -> Value {
    json!({
        "TenantID": tenant_id,
        "IssueID": issue.issue_id,
        "UserEmail": user_email(&issue.issue_keys),
        "Timestamp": Utc::now().to_rfc3339(),
        "Severity": issue.severity,
        "Risk": issue.risk,
        "PlaybookName": issue.playbook_name,
        "IssueMessage": issue.message,
        "FlowCount": issue.flow_count,
        "IncidentCount": issue.incident_count,
        "IncidentsURL": issue.incidents_url,
        "Details": details_value(details),
        "IssueType": issue.issue_type,
        "IssueKeys": issue.issue_keys,
        "FirstSeen": issue.issue_time,
    })
}

/// 触发上下文 + 消息模板 + 步骤参数映射；后者覆盖前者
pub fn step_context(
    trigger: &Value,
    template: Option<&MessageTemplate>,
    parameter_mapping: &str,
) -> Value {
    let mut map = match trigger {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };

    let (title, message, footer) = template
        .map(|t| (t.title.as_str(), t.message.as_str(), t.footer.as_str()))
        .unwrap_or_default();
    map.insert("Title".into(), Value::String(title.to_string()));
    map.insert("Message".into(), Value::String(message.to_string()));
    map.insert("Footer".into(), Value::String(footer.to_string()));

    if let Ok(Value::Object(params)) = serde_json::from_str::<Value>(parameter_mapping) {
        map.extend(params);
    }
    Value::Object(map)
}

/// 重跑时从作业保存的触发上下文恢复
pub fn rerun_context(job: &Job) -> Value {
    let mut map = match serde_json::from_str::<Value>(&job.trigger_context) {
        Ok(Value::Object(map)) => map,
        _ => {
            let mut map = Map::new();
            map.insert(
                "IssueID".into(),
                Value::String(job.authmind_issue_id.clone()),
            );
            map.insert(
                "UserEmail".into(),
                Value::String(RERUN_FALLBACK_EMAIL.to_string()),
            );
            map
        }
    };
    map.insert("Timestamp".into(), Value::String(Utc::now().to_rfc3339()));
    map.insert("ManualRerun".into(), Value::Bool(true));
    map.insert("TenantID".into(), json!(job.tenant_id));
    Value::Object(map)
}

pub fn issue_id_of(context: &Value) -> String {
    match context.get("IssueID") {
        Some(Value::String(s)) => s.clone(),
        None | Some(Value::Null) => String::new(),
        Some(other) => other.to_string(),
    }
}

pub fn tenant_id_of(context: &Value) -> Option<i32> {
    context
        .get("TenantID")
        .and_then(Value::as_i64)
        .and_then(|id| i32::try_from(id).ok())
}

pub fn is_manual_rerun(context: &Value) -> bool {
    context.get("ManualRerun") == Some(&Value::Bool(true))
}

pub fn str_field<'a>(context: &'a Value, key: &str) -> Option<&'a str> {
    context
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(issue_type: &str, severity: i32) -> Issue {
        Issue {
            issue_id: "42".into(),
            issue_type: issue_type.into(),
            severity,
            ..Default::default()
        }
    }

    fn workflow(name: &str, min: &str) -> Workflow {
        Workflow {
            name: name.into(),
            min_severity: min.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_user_email_lookup_order() {
        let keys: Map<String, Value> =
            serde_json::from_value(json!({"email": "e@x", "username": "", "user_email": "u@x"}))
                .unwrap();
        assert_eq!(user_email(&keys), "u@x");
        assert_eq!(user_email(&Map::new()), UNKNOWN_USER);
        let keys: Map<String, Value> = serde_json::from_value(json!({"identity_name": 5})).unwrap();
        assert_eq!(user_email(&keys), UNKNOWN_USER);
    }

    #[test]
    fn test_workflow_matching() {
        assert!(workflow_matches(&workflow("Weak Password", "Low"), &issue("Weak Password", 1)));
        assert!(workflow_matches(&workflow("All", "High"), &issue("Anything", 3)));
        assert!(!workflow_matches(&workflow("All", "Critical"), &issue("Anything", 3)));
        assert!(!workflow_matches(&workflow("Other", "Low"), &issue("Weak Password", 4)));
        assert!(workflow_matches(&workflow("All", "bogus"), &issue("x", 1)));
    }

    #[test]
    fn test_trigger_context_shape() {
        let mut i = issue("Compromised User", 4);
        i.issue_keys = serde_json::from_value(json!({"identity_name": "alice"})).unwrap();
        let ctx = trigger_context(7, &i, &IssueDetails::unavailable());
        assert_eq!(ctx["TenantID"], 7);
        assert_eq!(ctx["UserEmail"], "alice");
        assert_eq!(ctx["Details"]["Summary"], "Details unavailable (API Error)");
        assert_eq!(ctx["Details"]["RiskScore"], "Unknown");
        assert_eq!(ctx["Details"]["results"][0]["risk"], "Unknown");
        assert_eq!(issue_id_of(&ctx), "42");
        assert_eq!(tenant_id_of(&ctx), Some(7));
    }

    #[test]
    fn test_step_context_merges_in_order() {
        let trigger = json!({"UserEmail": "a", "Channel": "old"});
        let template = MessageTemplate {
            title: "T".into(),
            ..Default::default()
        };
        let ctx = step_context(&trigger, Some(&template), r##"{"Channel": "#sec"}"##);
        assert_eq!(ctx["Title"], "T");
        assert_eq!(ctx["Message"], "");
        assert_eq!(ctx["Channel"], "#sec");

        let ctx = step_context(&trigger, None, "not json");
        assert_eq!(ctx["Channel"], "old");
        assert_eq!(ctx["Footer"], "");
    }

    #[test]
    fn test_rerun_context() {
        let job = Job {
            tenant_id: 2,
            authmind_issue_id: "99".into(),
            trigger_context: "garbage".into(),
            ..Default::default()
        };
        let ctx = rerun_context(&job);
        assert_eq!(ctx["IssueID"], "99");
        assert_eq!(ctx["UserEmail"], RERUN_FALLBACK_EMAIL);
        assert!(is_manual_rerun(&ctx));
        assert_eq!(tenant_id_of(&ctx), Some(2));

        let job = Job {
            tenant_id: 2,
            trigger_context: r#"{"IssueID": "5", "UserEmail": "x@y", "TenantID": 9}"#.into(),
            ..Default::default()
        };
        let ctx = rerun_context(&job);
        assert_eq!(ctx["UserEmail"], "x@y");
        assert_eq!(tenant_id_of(&ctx), Some(2));
    }
}
