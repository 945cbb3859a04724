//! Workflow engine tests
//!
//! The issue source and the vendor API are wiremock servers. The engine
//! runs in sync mode so a schedule tick completes the whole poll inline.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use remediation_engine::engine::{
    ActionExecutor, Engine, EngineSettings, ExecutionOutcome, ExecutorSettings,
    HttpActionExecutor,
};
use remediation_engine::security::CredentialCipher;
use remediation_engine::storage::backend::poll_cursor_key;
use remediation_engine::storage::seeds::ensure_default_tenant;
use remediation_engine::storage::{
    ActionDefinition, Integration, Storage, SystemSetting, TenantScope, Workflow, WorkflowStep,
};

async fn setup() -> (TempDir, Arc<Storage>) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let db_url = format!(
        "sqlite://{}?mode=rwc",
        dir.path().join("engine_test.db").display()
    );
    let cipher = CredentialCipher::from_config_key("12345678901234567890123456789012").unwrap();
    let storage = Arc::new(Storage::open(&db_url, cipher).await.unwrap());
    ensure_default_tenant(&storage).await.unwrap();
    (dir, storage)
}

fn sync_settings() -> EngineSettings {
    EngineSettings {
        sync_mode: true,
        ..Default::default()
    }
}

fn http_executor(storage: &Arc<Storage>) -> Arc<dyn ActionExecutor> {
    let settings = ExecutorSettings {
        retry_base_delay: Duration::from_millis(5),
        ..Default::default()
    };
    Arc::new(HttpActionExecutor::new(storage.clone(), settings).unwrap())
}

struct Fixture {
    poller: Integration,
    workflow: Workflow,
}

/// 轮询器 + 厂商集成 + 一个或多个步骤的工作流
async fn fixture(
    storage: &Storage,
    authmind_url: &str,
    vendor_url: &str,
    step_count: usize,
) -> Fixture {
    let poller = storage
        .create_integration(&Integration {
            tenant_id: 1,
            name: "AuthMind Poller".into(),
            integration_type: "REST".into(),
            base_url: authmind_url.into(),
            auth_type: "bearer".into(),
            credentials: r#"{"token":"am-token"}"#.into(),
            enabled: true,
            polling_interval: 60,
            ..Default::default()
        })
        .await
        .unwrap();
    let vendor = storage
        .create_integration(&Integration {
            tenant_id: 1,
            name: "Directory".into(),
            integration_type: "REST".into(),
            base_url: vendor_url.into(),
            enabled: true,
            ..Default::default()
        })
        .await
        .unwrap();

    let mut steps = Vec::new();
    for idx in 0..step_count {
        let action = storage
            .create_action(&ActionDefinition {
                tenant_id: 1,
                name: format!("Step Action {}", idx + 1),
                integration_id: vendor.id,
                method: "POST".into(),
                path_template: "/users/{{ .UserEmail }}/disable".into(),
                retry_count: 1,
                ..Default::default()
            })
            .await
            .unwrap();
        steps.push(WorkflowStep {
            order: idx as i32 + 1,
            action_definition_id: action.id,
            ..Default::default()
        });
    }

    let workflow = storage
        .create_workflow(
            1,
            &Workflow {
                name: "Compromised User".into(),
                enabled: true,
                min_severity: "High".into(),
                pollers: vec![Integration {
                    id: poller.id,
                    ..Default::default()
                }],
                steps,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    Fixture { poller, workflow }
}

async fn mount_authmind(server: &MockServer, issues: Value) {
    Mock::given(method("GET"))
        .and(path("/getIssues"))
        .and(query_param("issue_id_gt", "0"))
        .and(query_param("sort_by", "issue_id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": issues })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/getIssueDetails"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "results": [{"message": "Login from Tor exit node", "risk": "High"}]
        })))
        .mount(server)
        .await;
}

// =============================================================================
// Polling
// =============================================================================

#[tokio::test]
async fn test_schedule_tick_runs_matching_workflow() {
    let (_dir, storage) = setup().await;
    let authmind = MockServer::start().await;
    let vendor = MockServer::start().await;
    mount_authmind(
        &authmind,
        json!([
            {"issue_id": "101", "issue_type": "Compromised User", "severity": 4,
             "issue_keys": {"identity_name": "bob"}},
            {"issue_id": "102", "issue_type": "Compromised User", "severity": 1,
             "issue_keys": {"identity_name": "carol"}},
            {"issue_id": "103", "issue_type": "Weak Password", "severity": 4}
        ]),
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/users/bob/disable"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"disabled": true})))
        .expect(1)
        .mount(&vendor)
        .await;

    let fx = fixture(&storage, &authmind.uri(), &vendor.uri(), 1).await;
    let engine = Engine::new(storage.clone(), http_executor(&storage), sync_settings()).unwrap();
    engine.schedule_tick().await;

    let page = storage.list_jobs(TenantScope::Tenant(1), 1, 10).await.unwrap();
    assert_eq!(page.total, 1);
    let job = &page.data[0];
    assert_eq!(job.authmind_issue_id, "101");
    assert_eq!(job.workflow_id, fx.workflow.id);
    assert_eq!(job.status, "completed");

    let context: Value = serde_json::from_str(&job.trigger_context).unwrap();
    assert_eq!(context["UserEmail"], "bob");
    assert_eq!(context["Details"]["Summary"], "Login from Tor exit node");

    let logs = storage.job_logs(job.id).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert!(logs[0].message.contains("completed successfully (Status: 200)"));
    assert!(logs[0].message.contains("\"disabled\": true"));

    // 游标推进到最后一个问题，三个问题都记为已处理
    let cursor = storage
        .get_state(&poll_cursor_key(1, fx.poller.id))
        .await
        .unwrap();
    assert_eq!(cursor.as_deref(), Some("103"));
    assert_eq!(
        storage
            .count_processed_events(TenantScope::Tenant(1))
            .await
            .unwrap(),
        3
    );
}

#[tokio::test]
async fn test_poll_interval_gates_repeat_ticks() {
    let (_dir, storage) = setup().await;
    let authmind = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/getIssues"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
        .expect(1)
        .mount(&authmind)
        .await;

    fixture(&storage, &authmind.uri(), "http://127.0.0.1:9", 1).await;
    let engine = Engine::new(storage.clone(), http_executor(&storage), sync_settings()).unwrap();
    engine.schedule_tick().await;
    engine.schedule_tick().await;
}

#[tokio::test]
async fn test_authmind_errors_leave_cursor_untouched() {
    let (_dir, storage) = setup().await;
    let authmind = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/getIssues"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&authmind)
        .await;

    let fx = fixture(&storage, &authmind.uri(), "http://127.0.0.1:9", 1).await;
    let engine = Engine::new(storage.clone(), http_executor(&storage), sync_settings()).unwrap();
    engine.schedule_tick().await;

    let cursor = storage
        .get_state(&poll_cursor_key(1, fx.poller.id))
        .await
        .unwrap();
    assert_eq!(cursor.as_deref(), Some("0"));
    assert_eq!(
        storage.list_jobs(TenantScope::All, 1, 10).await.unwrap().total,
        0
    );
}

// =============================================================================
// Workflow execution
// =============================================================================

/// 按顺序返回预设结果并记录调用
struct ScriptedExecutor {
    outcomes: Mutex<Vec<ExecutionOutcome>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    fn new(outcomes: Vec<ExecutionOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes),
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ActionExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        _integration: &Integration,
        definition: &ActionDefinition,
        _context: &Value,
    ) -> ExecutionOutcome {
        self.calls.lock().push(definition.name.clone());
        let mut outcomes = self.outcomes.lock();
        if outcomes.is_empty() {
            ExecutionOutcome::success(200, String::new())
        } else {
            outcomes.remove(0)
        }
    }
}

fn issue_context(issue_id: &str) -> Value {
    json!({
        "TenantID": 1,
        "IssueID": issue_id,
        "UserEmail": "dave",
        "IssueType": "Compromised User",
        "Timestamp": Utc::now().to_rfc3339(),
    })
}

#[tokio::test]
async fn test_failed_step_stops_workflow() {
    let (_dir, storage) = setup().await;
    let fx = fixture(&storage, "http://127.0.0.1:9", "http://127.0.0.1:9", 3).await;
    let executor = Arc::new(ScriptedExecutor::new(vec![
        ExecutionOutcome::success(200, "ok".into()),
        ExecutionOutcome::failure(500, "boom".into(), "all 2 attempts failed. Last error: HTTP 500: boom"),
    ]));
    let engine = Engine::new(storage.clone(), executor.clone(), sync_settings()).unwrap();

    let job_id = assert_ok!(engine.run_workflow(&fx.workflow, issue_context("201")).await)
        .expect("job created");

    assert_eq!(
        *executor.calls.lock(),
        vec!["Step Action 1".to_string(), "Step Action 2".to_string()]
    );
    let job = storage
        .get_job(TenantScope::Tenant(1), job_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.status, "failed");

    let logs = storage.job_logs(job_id).await.unwrap();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[1].level, "ERROR");
    assert!(logs[1].message.starts_with("Step 2 (Step Action 2) failed (Status: 500)"));
}

#[tokio::test]
async fn test_duplicate_trigger_is_skipped() {
    let (_dir, storage) = setup().await;
    let fx = fixture(&storage, "http://127.0.0.1:9", "http://127.0.0.1:9", 1).await;
    let executor = Arc::new(ScriptedExecutor::new(Vec::new()));
    let engine = Engine::new(storage.clone(), executor.clone(), sync_settings()).unwrap();

    let first = assert_ok!(engine.run_workflow(&fx.workflow, issue_context("301")).await);
    assert!(first.is_some());
    let second = assert_ok!(engine.run_workflow(&fx.workflow, issue_context("301")).await);
    assert!(second.is_none());
    assert_eq!(executor.calls.lock().len(), 1);
}

#[tokio::test]
async fn test_disabled_integration_step_is_skipped() {
    let (_dir, storage) = setup().await;
    let fx = fixture(&storage, "http://127.0.0.1:9", "http://127.0.0.1:9", 1).await;
    let step_action = fx.workflow.steps[0].definition.clone().unwrap();
    let mut vendor = storage
        .get_integration(1, step_action.integration_id)
        .await
        .unwrap()
        .unwrap();
    vendor.enabled = false;
    storage.update_integration(1, &vendor).await.unwrap();

    let executor = Arc::new(ScriptedExecutor::new(Vec::new()));
    let engine = Engine::new(storage.clone(), executor.clone(), sync_settings()).unwrap();
    let job_id = assert_ok!(engine.run_workflow(&fx.workflow, issue_context("401")).await).unwrap();

    assert!(executor.calls.lock().is_empty());
    let job = storage.get_job(TenantScope::All, job_id).await.unwrap().unwrap();
    assert_eq!(job.status, "completed");
    let logs = storage.job_logs(job_id).await.unwrap();
    assert_eq!(logs[0].level, "WARN");
}

#[tokio::test]
async fn test_rerun_creates_suffixed_job() {
    let (_dir, storage) = setup().await;
    let fx = fixture(&storage, "http://127.0.0.1:9", "http://127.0.0.1:9", 1).await;
    let executor = Arc::new(ScriptedExecutor::new(Vec::new()));
    let engine = Arc::new(Engine::new(storage.clone(), executor.clone(), sync_settings()).unwrap());

    let job_id = engine
        .run_workflow(&fx.workflow, issue_context("501"))
        .await
        .unwrap()
        .unwrap();
    assert_ok!(engine.rerun_job(job_id, TenantScope::Tenant(1)).await);

    let page = storage.list_jobs(TenantScope::Tenant(1), 1, 10).await.unwrap();
    assert_eq!(page.total, 2);
    assert!(
        page.data
            .iter()
            .any(|j| j.authmind_issue_id.starts_with("501-rerun-"))
    );
    assert_eq!(executor.calls.lock().len(), 2);

    // 其他租户看不到该作业
    assert_err!(engine.rerun_job(job_id, TenantScope::Tenant(99)).await);
}

// =============================================================================
// Lifecycle & maintenance
// =============================================================================

#[tokio::test]
async fn test_start_and_shutdown() {
    let (_dir, storage) = setup().await;
    let settings = EngineSettings {
        worker_count: 2,
        schedule_interval: Duration::from_millis(50),
        ..Default::default()
    };
    let engine = Arc::new(Engine::new(storage.clone(), http_executor(&storage), settings).unwrap());

    let handle = assert_ok!(engine.start().await);
    assert!(engine.start().await.is_err(), "second start must fail");
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(handle.shutdown(Duration::from_secs(5)).await);
}

#[tokio::test]
async fn test_rotation_check_audits_due_integrations() {
    let (_dir, storage) = setup().await;
    let integ = storage
        .create_integration(&Integration {
            tenant_id: 1,
            name: "Stale Secret".into(),
            integration_type: "REST".into(),
            rotation_interval_days: 30,
            last_rotated_at: Some(Utc::now() - chrono::Duration::days(45)),
            ..Default::default()
        })
        .await
        .unwrap();
    let engine = Engine::new(storage.clone(), http_executor(&storage), sync_settings()).unwrap();

    let due = assert_ok!(engine.check_rotation().await);
    assert_eq!(due, vec![integ.id]);
    let audit = storage.recent_audit_logs().await.unwrap();
    assert!(audit.iter().any(|a| a.action == "ROTATION_DUE" && a.target_id == integ.id.to_string()));
}

#[tokio::test]
async fn test_retention_keeps_recent_jobs() {
    let (_dir, storage) = setup().await;
    let fx = fixture(&storage, "http://127.0.0.1:9", "http://127.0.0.1:9", 1).await;
    storage
        .find_or_create_setting(&SystemSetting {
            key: "data_retention_days".into(),
            value: "30".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    let engine = Engine::new(
        storage.clone(),
        Arc::new(ScriptedExecutor::new(Vec::new())),
        sync_settings(),
    )
    .unwrap();
    engine
        .run_workflow(&fx.workflow, issue_context("601"))
        .await
        .unwrap();

    assert_eq!(assert_ok!(engine.run_retention().await), 0);
    assert_eq!(
        storage.list_jobs(TenantScope::All, 1, 10).await.unwrap().total,
        1
    );
}

#[tokio::test]
async fn test_retention_with_out_of_range_days_is_skipped() {
    let (_dir, storage) = setup().await;
    let fx = fixture(&storage, "http://127.0.0.1:9", "http://127.0.0.1:9", 1).await;
    storage
        .find_or_create_setting(&SystemSetting {
            key: "data_retention_days".into(),
            value: "10000000000000000".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    let engine = Engine::new(
        storage.clone(),
        Arc::new(ScriptedExecutor::new(Vec::new())),
        sync_settings(),
    )
    .unwrap();
    engine
        .run_workflow(&fx.workflow, issue_context("602"))
        .await
        .unwrap();

    assert_eq!(assert_ok!(engine.run_retention().await), 0);
    assert_eq!(
        storage.list_jobs(TenantScope::All, 1, 10).await.unwrap().total,
        1
    );

    // 维护任务随后仍可正常运行
    engine.run_maintenance().await;
}
