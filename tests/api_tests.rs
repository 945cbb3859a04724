//! REST API integration tests
//!
//! Exercises `/api` routes end to end: authentication, role checks,
//! tenant resolution, credential redaction and audit logging.

use std::sync::Arc;

use actix_web::http::StatusCode;
use actix_web::test::{self, TestRequest};
use actix_web::{App, web};
use serde_json::{Value, json};
use tempfile::TempDir;

use remediation_engine::api::{AppState, api_routes};
use remediation_engine::config::StaticConfig;
use remediation_engine::security::CredentialCipher;
use remediation_engine::storage::seeds::ensure_default_tenant;
use remediation_engine::storage::{Storage, SystemSetting, TenantScope, User};

const ADMIN_KEY: &str = "test-admin-key";

// =============================================================================
// Test Setup
// =============================================================================

async fn test_state(admin_key: &str) -> (TempDir, web::Data<AppState>) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let db_url = format!(
        "sqlite://{}?mode=rwc",
        dir.path().join("api_test.db").display()
    );
    let cipher = CredentialCipher::from_config_key("12345678901234567890123456789012").unwrap();
    let storage = Arc::new(Storage::open(&db_url, cipher).await.unwrap());
    ensure_default_tenant(&storage).await.unwrap();

    let mut config = StaticConfig::default();
    config.security.admin_api_key = admin_key.to_string();
    config.security.jwt_secret = "api-test-jwt-secret".to_string();
    config.tenancy.multi_tenant = true;

    let state = web::Data::new(AppState::new(storage, None, &config));
    (dir, state)
}

/// Create a test app with the full `/api` scope
macro_rules! api_app {
    ($state:expr) => {{
        test::init_service(App::new().app_data($state.clone()).service(api_routes())).await
    }};
}

fn token_for(state: &AppState, role: &str) -> String {
    let user = User {
        id: 42,
        email: format!("{}@example.com", role),
        role: role.to_string(),
        ..Default::default()
    };
    format!("Bearer {}", state.jwt.issue(&user).unwrap())
}

// =============================================================================
// Authentication
// =============================================================================

#[actix_rt::test]
async fn test_missing_credentials_rejected() {
    let (_dir, state) = test_state(ADMIN_KEY).await;
    let app = api_app!(state);

    let req = TestRequest::get().uri("/api/integrations").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({"error": "unauthorized"}));

    let req = TestRequest::get()
        .uri("/api/integrations")
        .insert_header(("X-API-Key", "wrong"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_rt::test]
async fn test_login_issues_usable_token() {
    let (_dir, state) = test_state(ADMIN_KEY).await;
    let app = api_app!(state);

    let req = TestRequest::post()
        .uri("/api/auth/login")
        .set_json(json!({"email": "ops@example.com", "password": "x"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["user"]["email"], "ops@example.com");
    let token = body["token"].as_str().unwrap().to_string();

    let req = TestRequest::get()
        .uri("/api/auth/me")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let me: Value = test::read_body_json(resp).await;
    assert_eq!(me["email"], "ops@example.com");

    let logs = state.storage.recent_audit_logs().await.unwrap();
    assert!(logs.iter().any(|l| l.action == "LOGIN"));
}

#[actix_rt::test]
async fn test_login_rejects_blank_email() {
    let (_dir, state) = test_state(ADMIN_KEY).await;
    let app = api_app!(state);

    let req = TestRequest::post()
        .uri("/api/auth/login")
        .set_json(json!({"email": "  "}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "invalid input");
}

#[actix_rt::test]
async fn test_dev_mode_without_admin_key() {
    let (_dir, state) = test_state("").await;
    let app = api_app!(state);

    let req = TestRequest::get().uri("/api/workflows").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    // 匿名请求没有角色，写接口仍被拒绝
    let req = TestRequest::post()
        .uri("/api/workflows")
        .set_json(json!({"name": "Anonymous"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "access denied: no role assigned");
}

#[actix_rt::test]
async fn test_unknown_api_route_is_json_404() {
    let (_dir, state) = test_state(ADMIN_KEY).await;
    let app = api_app!(state);

    let req = TestRequest::get()
        .uri("/api/nope")
        .insert_header(("X-API-Key", ADMIN_KEY))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].is_string());
}

// =============================================================================
// Role checks
// =============================================================================

#[actix_rt::test]
async fn test_role_restrictions() {
    let (_dir, state) = test_state(ADMIN_KEY).await;
    let app = api_app!(state);
    let builder = token_for(&state, "action_builder");

    let req = TestRequest::post()
        .uri("/api/integrations")
        .insert_header(("Authorization", builder.clone()))
        .set_json(json!({"name": "Okta", "type": "REST"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "access denied: insufficient permissions");

    let req = TestRequest::post()
        .uri("/api/actions")
        .insert_header(("Authorization", builder.clone()))
        .set_json(json!({"name": "Suspend User", "method": "POST", "path_template": "/suspend"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let req = TestRequest::get()
        .uri("/api/admin/tenants")
        .insert_header(("Authorization", builder))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

// =============================================================================
// Integrations & tenancy
// =============================================================================

#[actix_rt::test]
async fn test_create_integration_redacts_and_adds_poller() {
    let (_dir, state) = test_state(ADMIN_KEY).await;
    let app = api_app!(state);

    let req = TestRequest::post()
        .uri("/api/integrations")
        .insert_header(("X-API-Key", ADMIN_KEY))
        .insert_header(("X-Tenant-ID", "1"))
        .set_json(json!({
            "name": "Okta",
            "type": "REST",
            "base_url": "https://okta.example.com",
            "auth_type": "apikey",
            "credentials": "{\"api_key\":\"super-secret\"}",
            "enabled": true,
            "consecutive_failures": 9
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created: Value = test::read_body_json(resp).await;
    assert!(!created["credentials"].as_str().unwrap().contains("super-secret"));
    assert_eq!(created["consecutive_failures"], 0);
    assert_eq!(created["tenant_id"], 1);

    let req = TestRequest::get()
        .uri("/api/integrations")
        .insert_header(("X-API-Key", ADMIN_KEY))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let list: Vec<Value> = test::read_body_json(resp).await;
    assert_eq!(list.len(), 2);
    assert!(list.iter().any(|i| i["name"].as_str().unwrap().contains("AuthMind")));
    assert!(list.iter().all(|i| i["tenant"]["id"] == 1));
    assert!(list.iter().all(|i| i["tenant"].get("api_key").is_none()));

    // 存储里保留原始凭据
    let stored = state
        .storage
        .list_integrations(TenantScope::Tenant(1))
        .await
        .unwrap();
    assert!(stored.iter().any(|i| i.credentials.contains("super-secret")));
}

#[actix_rt::test]
async fn test_import_is_all_or_nothing() {
    let (_dir, state) = test_state(ADMIN_KEY).await;
    let app = api_app!(state);

    let okta = json!({
        "name": "Okta",
        "type": "REST",
        "base_url": "https://okta.example.com",
        "auth_type": "bearer",
        "credentials": "{\"token\":\"t\"}",
        "enabled": true
    });
    let req = TestRequest::post()
        .uri("/api/import")
        .insert_header(("X-API-Key", ADMIN_KEY))
        .insert_header(("X-Tenant-ID", "1"))
        .set_json(json!({
            "integrations": [okta.clone(), okta.clone()],
            "actions": [{"name": "Suspend Okta User", "method": "POST"}]
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(
        state
            .storage
            .list_integrations(TenantScope::Tenant(1))
            .await
            .unwrap()
            .is_empty()
    );
    assert!(
        state
            .storage
            .list_actions(TenantScope::Tenant(1))
            .await
            .unwrap()
            .is_empty()
    );

    let req = TestRequest::post()
        .uri("/api/import")
        .insert_header(("X-API-Key", ADMIN_KEY))
        .insert_header(("X-Tenant-ID", "1"))
        .set_json(json!({
            "integrations": [okta],
            "actions": [{"name": "Suspend Okta User", "method": "POST"}]
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "success");
    assert_eq!(
        state
            .storage
            .list_integrations(TenantScope::Tenant(1))
            .await
            .unwrap()
            .len(),
        1
    );

    let logs = state.storage.recent_audit_logs().await.unwrap();
    assert_eq!(logs.iter().filter(|l| l.action == "IMPORT").count(), 1);
}

#[actix_rt::test]
async fn test_global_view_rejects_writes() {
    let (_dir, state) = test_state(ADMIN_KEY).await;
    let app = api_app!(state);

    let req = TestRequest::post()
        .uri("/api/workflows")
        .insert_header(("X-API-Key", ADMIN_KEY))
        .insert_header(("X-Tenant-ID", "0"))
        .set_json(json!({"name": "Everywhere"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "a specific tenant is required for this operation");

    let req = TestRequest::get()
        .uri("/api/workflows")
        .insert_header(("X-API-Key", ADMIN_KEY))
        .insert_header(("X-Tenant-ID", "0"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_rt::test]
async fn test_tenant_admin_lifecycle() {
    let (_dir, state) = test_state(ADMIN_KEY).await;
    let app = api_app!(state);

    let req = TestRequest::post()
        .uri("/api/admin/tenants")
        .insert_header(("X-API-Key", ADMIN_KEY))
        .set_json(json!({"name": "Globex", "api_key": "  "}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let tenant: Value = test::read_body_json(resp).await;
    let id = tenant["id"].as_i64().unwrap();
    assert!(tenant["api_key"].is_null());

    let req = TestRequest::get()
        .uri("/api/admin/tenants")
        .insert_header(("X-API-Key", ADMIN_KEY))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let tenants: Vec<Value> = test::read_body_json(resp).await;
    assert_eq!(tenants.len(), 2);

    let req = TestRequest::delete()
        .uri(&format!("/api/admin/tenants/{}", id))
        .insert_header(("X-API-Key", ADMIN_KEY))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "tenant deleted successfully");

    let req = TestRequest::get()
        .uri("/api/admin/stats")
        .insert_header(("X-API-Key", ADMIN_KEY))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

// =============================================================================
// Jobs & settings
// =============================================================================

#[actix_rt::test]
async fn test_rerun_without_engine() {
    let (_dir, state) = test_state(ADMIN_KEY).await;
    let app = api_app!(state);

    let req = TestRequest::post()
        .uri("/api/jobs/1/rerun")
        .insert_header(("X-API-Key", ADMIN_KEY))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "engine not initialized");
}

#[actix_rt::test]
async fn test_jobs_paging_and_missing_logs() {
    let (_dir, state) = test_state(ADMIN_KEY).await;
    let app = api_app!(state);

    let req = TestRequest::get()
        .uri("/api/jobs?page=abc&pageSize=500")
        .insert_header(("X-API-Key", ADMIN_KEY))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let page: Value = test::read_body_json(resp).await;
    assert_eq!(page["page"], 1);
    assert_eq!(page["pageSize"], 100);
    assert_eq!(page["total"], 0);

    let req = TestRequest::get()
        .uri("/api/jobs?page=9223372036854775807&pageSize=100")
        .insert_header(("X-API-Key", ADMIN_KEY))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let page: Value = test::read_body_json(resp).await;
    assert_eq!(page["page"], i64::MAX);
    assert_eq!(page["data"], json!([]));

    let req = TestRequest::get()
        .uri("/api/jobs/77/logs")
        .insert_header(("X-API-Key", ADMIN_KEY))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_rt::test]
async fn test_settings_update_is_audited() {
    let (_dir, state) = test_state(ADMIN_KEY).await;
    state
        .storage
        .find_or_create_setting(&SystemSetting {
            key: "data_retention_days".into(),
            value: "90".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    let app = api_app!(state);

    let req = TestRequest::put()
        .uri("/api/settings")
        .insert_header(("X-API-Key", ADMIN_KEY))
        .set_json(json!({"key": "missing_key", "value": "1"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let req = TestRequest::put()
        .uri("/api/settings")
        .insert_header(("X-API-Key", ADMIN_KEY))
        .set_json(json!({"key": "data_retention_days", "value": "30"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let setting = state
        .storage
        .get_setting("data_retention_days")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(setting.value, "30");

    let req = TestRequest::get()
        .uri("/api/audit/logs")
        .insert_header(("X-API-Key", ADMIN_KEY))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let logs: Vec<Value> = test::read_body_json(resp).await;
    assert!(logs.iter().any(|l| l["action"] == "UPDATE_SETTING"));
}
