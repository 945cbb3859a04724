//! HTTP action executor tests
//!
//! Vendor APIs are simulated with wiremock; integrations live in a
//! temporary SQLite database so circuit-breaker updates are persisted.

use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde_json::{Value, json};
use tempfile::TempDir;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use remediation_engine::engine::{ActionExecutor, ExecutorSettings, HttpActionExecutor};
use remediation_engine::security::CredentialCipher;
use remediation_engine::storage::seeds::ensure_default_tenant;
use remediation_engine::storage::{ActionDefinition, Integration, Storage};

async fn setup() -> (TempDir, Arc<Storage>) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let db_url = format!(
        "sqlite://{}?mode=rwc",
        dir.path().join("executor_test.db").display()
    );
    let cipher = CredentialCipher::from_config_key("12345678901234567890123456789012").unwrap();
    let storage = Arc::new(Storage::open(&db_url, cipher).await.unwrap());
    ensure_default_tenant(&storage).await.unwrap();
    (dir, storage)
}

fn fast_settings(threshold: i32) -> ExecutorSettings {
    ExecutorSettings {
        http_timeout: Duration::from_secs(5),
        retry_base_delay: Duration::from_millis(5),
        circuit_breaker_threshold: threshold,
        debug: false,
    }
}

async fn vendor(storage: &Storage, base_url: &str, auth_type: &str, creds: &str) -> Integration {
    storage
        .create_integration(&Integration {
            tenant_id: 1,
            name: "Vendor".into(),
            integration_type: "REST".into(),
            base_url: base_url.into(),
            auth_type: auth_type.into(),
            credentials: creds.into(),
            enabled: true,
            ..Default::default()
        })
        .await
        .unwrap()
}

fn disable_user(retry_count: i32) -> ActionDefinition {
    ActionDefinition {
        tenant_id: 1,
        name: "Disable User".into(),
        method: "POST".into(),
        path_template: "/users/{{ .UserEmail }}/disable".into(),
        body_template: r#"{"reason": "{{ jsonescape .IssueType }}"}"#.into(),
        retry_count,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_execute_renders_and_authenticates() {
    let (_dir, storage) = setup().await;
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/users/bob/disable"))
        .and(header("authorization", "Bearer t0k3n"))
        .and(body_json(json!({"reason": "Compromised \"User\""})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let integ = vendor(&storage, &server.uri(), "bearer", r#"{"token":"t0k3n"}"#).await;
    let executor = HttpActionExecutor::new(storage.clone(), fast_settings(5)).unwrap();
    let outcome = executor
        .execute(
            &integ,
            &disable_user(1),
            &json!({"UserEmail": "bob", "IssueType": "Compromised \"User\""}),
        )
        .await;

    assert!(outcome.is_success(), "{:?}", outcome.error);
    assert_eq!(outcome.status, 200);
    assert!(outcome.body.contains("ok"));
}

#[tokio::test]
async fn test_execute_retries_server_errors() {
    let (_dir, storage) = setup().await;
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("done"))
        .expect(1)
        .mount(&server)
        .await;

    let integ = vendor(&storage, &server.uri(), "none", "{}").await;
    let executor = HttpActionExecutor::new(storage.clone(), fast_settings(5)).unwrap();
    let outcome = executor
        .execute(&integ, &disable_user(3), &json!({"UserEmail": "bob"}))
        .await;

    assert!(outcome.is_success());
    assert_eq!(outcome.body, "done");
    let stored = storage.get_integration(1, integ.id).await.unwrap().unwrap();
    assert_eq!(stored.consecutive_failures, 0);
}

#[tokio::test]
async fn test_auth_errors_abort_retries() {
    let (_dir, storage) = setup().await;
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
        .expect(1)
        .mount(&server)
        .await;

    let integ = vendor(&storage, &server.uri(), "bearer", r#"{"token":"wrong"}"#).await;
    let executor = HttpActionExecutor::new(storage.clone(), fast_settings(5)).unwrap();
    let outcome = executor
        .execute(&integ, &disable_user(3), &json!({"UserEmail": "bob"}))
        .await;

    assert!(!outcome.is_success());
    assert_eq!(outcome.status, 401);
    assert_eq!(outcome.body, "bad token");
    assert!(outcome.error.unwrap().contains("HTTP 401"));
}

#[tokio::test]
async fn test_circuit_breaker_blocks_after_threshold() {
    let (_dir, storage) = setup().await;
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(4)
        .mount(&server)
        .await;

    let integ = vendor(&storage, &server.uri(), "none", "{}").await;
    let executor = HttpActionExecutor::new(storage.clone(), fast_settings(2)).unwrap();
    let action = disable_user(1);
    let ctx = json!({"UserEmail": "bob"});

    for _ in 0..2 {
        let outcome = executor.execute(&integ, &action, &ctx).await;
        assert!(outcome.error.unwrap().starts_with("all 2 attempts failed"));
    }

    let tripped = storage.get_integration(1, integ.id).await.unwrap().unwrap();
    assert!(!tripped.is_available);

    // 熔断后不再发请求
    let blocked = executor.execute(&tripped, &action, &ctx).await;
    assert_eq!(blocked.status, 0);
    assert!(blocked.error.unwrap().contains("circuit breaker"));
}

#[tokio::test]
async fn test_template_errors_do_not_count_as_failures() {
    let (_dir, storage) = setup().await;
    let integ = vendor(&storage, "http://127.0.0.1:9", "none", "{}").await;
    let executor = HttpActionExecutor::new(storage.clone(), fast_settings(1)).unwrap();
    let mut action = disable_user(1);
    action.path_template = "{{ .UserEmail ".into();

    let outcome = executor.execute(&integ, &action, &json!({})).await;
    assert!(outcome.error.unwrap().starts_with("failed to render path"));

    let stored = storage.get_integration(1, integ.id).await.unwrap().unwrap();
    assert_eq!(stored.consecutive_failures, 0);
    assert!(stored.is_available);
}

#[tokio::test]
async fn test_oauth2_token_is_fetched_and_cached() {
    let (_dir, storage) = setup().await;
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "fresh", "expires_in": 3600})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/users/bob/disable"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let mut input = Integration {
        tenant_id: 1,
        name: "OAuth Vendor".into(),
        integration_type: "REST".into(),
        base_url: server.uri(),
        auth_type: "oauth2".into(),
        credentials: r#"{"client_id":"id","client_secret":"secret"}"#.into(),
        enabled: true,
        ..Default::default()
    };
    input.token_endpoint = format!("{}/oauth/token", server.uri());
    let integ = storage.create_integration(&input).await.unwrap();

    let executor = HttpActionExecutor::new(storage.clone(), fast_settings(5)).unwrap();
    let outcome = executor
        .execute(&integ, &disable_user(1), &json!({"UserEmail": "bob"}))
        .await;
    assert!(outcome.is_success(), "{:?}", outcome.error);
    assert_eq!(outcome.status, 204);

    let stored = storage.get_integration(1, integ.id).await.unwrap().unwrap();
    assert_eq!(stored.oauth_token, "fresh");
    assert!(stored.oauth_expires_at.is_some());
}

#[tokio::test]
async fn test_oauth2_token_endpoint_rejection_fails_action() {
    let (_dir, storage) = setup().await;
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid_client"))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/users/bob/disable"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut input = Integration {
        tenant_id: 1,
        name: "OAuth Vendor".into(),
        integration_type: "REST".into(),
        base_url: server.uri(),
        auth_type: "oauth2".into(),
        credentials: r#"{"client_id":"id","client_secret":"wrong"}"#.into(),
        enabled: true,
        ..Default::default()
    };
    input.token_endpoint = format!("{}/oauth/token", server.uri());
    let integ = storage.create_integration(&input).await.unwrap();

    let executor = HttpActionExecutor::new(storage.clone(), fast_settings(5)).unwrap();
    let outcome = executor
        .execute(&integ, &disable_user(1), &json!({"UserEmail": "bob"}))
        .await;

    assert!(!outcome.is_success());
    let error = outcome.error.unwrap();
    assert!(error.starts_with("all 2 attempts failed"), "{}", error);
    assert!(error.contains("auth server returned 401: invalid_client"), "{}", error);

    let stored = storage.get_integration(1, integ.id).await.unwrap().unwrap();
    assert!(stored.oauth_token.is_empty());
    assert_eq!(stored.consecutive_failures, 1);
}

#[tokio::test]
async fn test_ssf_action_posts_signed_set() {
    let (_dir, storage) = setup().await;
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ssf/events"))
        .and(header("content-type", "application/secevent+jwt"))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let credentials = json!({
        "private_key": include_str!("fixtures/ssf_rsa_pkcs8.pem"),
        "key_id": "key-1",
        "issuer": "https://remediation.example.com",
    });
    let integ = storage
        .create_integration(&Integration {
            tenant_id: 1,
            name: "SSF Receiver".into(),
            integration_type: "SSF".into(),
            base_url: server.uri(),
            auth_type: "none".into(),
            credentials: credentials.to_string(),
            enabled: true,
            ..Default::default()
        })
        .await
        .unwrap();
    let action = ActionDefinition {
        tenant_id: 1,
        name: "Signal Compromise".into(),
        path_template: "/ssf/events".into(),
        body_template: r#"{"subject": {"format": "email", "email": "{{ .UserEmail }}"}, "events": {"{{ ssf_event_type .IssueType }}": {}}}"#.into(),
        retry_count: 1,
        ..Default::default()
    };

    let executor = HttpActionExecutor::new(storage.clone(), fast_settings(5)).unwrap();
    let outcome = executor
        .execute(
            &integ,
            &action,
            &json!({"UserEmail": "alice@corp.example", "IssueType": "Compromised User"}),
        )
        .await;
    assert!(outcome.is_success(), "{:?}", outcome.error);
    assert_eq!(outcome.status, 202);

    let requests = server.received_requests().await.unwrap();
    let token = String::from_utf8(requests[0].body.clone()).unwrap();
    let header = decode_header(&token).unwrap();
    assert_eq!(header.typ.as_deref(), Some("secevent+jwt"));
    assert_eq!(header.kid.as_deref(), Some("key-1"));

    let mut validation = Validation::new(Algorithm::RS256);
    validation.required_spec_claims.clear();
    validation.validate_exp = false;
    let claims = decode::<Value>(
        &token,
        &DecodingKey::from_rsa_pem(include_bytes!("fixtures/ssf_rsa_public.pem")).unwrap(),
        &validation,
    )
    .unwrap()
    .claims;
    assert_eq!(claims["iss"], "https://remediation.example.com");
    assert_eq!(claims["subject"]["email"], "alice@corp.example");
    assert!(
        claims["events"]
            .as_object()
            .unwrap()
            .keys()
            .any(|k| k.ends_with("account-compromised"))
    );
}

#[tokio::test]
async fn test_rate_limit_throttles_calls() {
    let (_dir, storage) = setup().await;
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(3)
        .mount(&server)
        .await;

    let mut input = Integration {
        tenant_id: 1,
        name: "Throttled".into(),
        integration_type: "REST".into(),
        base_url: server.uri(),
        auth_type: "none".into(),
        credentials: "{}".into(),
        enabled: true,
        ..Default::default()
    };
    input.rate_limit = 5.0;
    let integ = storage.create_integration(&input).await.unwrap();

    let executor = HttpActionExecutor::new(storage.clone(), fast_settings(5)).unwrap();
    let action = disable_user(1);
    let ctx = json!({"UserEmail": "bob"});

    // 5 req/s 且突发为 1：三次调用至少间隔两个 200ms 周期
    let start = Instant::now();
    for _ in 0..3 {
        assert!(executor.execute(&integ, &action, &ctx).await.is_success());
    }
    assert!(start.elapsed() >= Duration::from_millis(350));
}
