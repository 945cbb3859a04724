//! SSF 推送：渲染 SET 内容、签名后以 application/secevent+jwt 发送

use serde_json::Value;
use tracing::info;

use super::PreparedRequest;
use crate::engine::template;
use crate::errors::{EngineError, Result};
use crate::integrations::ssf::SET_CONTENT_TYPE;
use crate::integrations::{Credentials, SsfPayload, SsfSigner};
use crate::security::redact;
use crate::storage::{ActionDefinition, Integration};

pub(crate) fn prepare(
    integ: &Integration,
    definition: &ActionDefinition,
    context: &Value,
    debug: bool,
) -> Result<PreparedRequest> {
    let rendered = template::render(&definition.body_template, context).map_err(|e| {
        EngineError::template(format!("failed to render ssf payload: {}", e.message()))
    })?;
    let payload: SsfPayload = serde_json::from_str(&rendered).map_err(|e| {
        EngineError::serialization(format!("failed to unmarshal ssf payload: {}", e))
    })?;

    let creds = Credentials::parse(&integ.credentials).map_err(|e| {
        EngineError::validation(format!(
            "failed to parse integration credentials: {}",
            e.message()
        ))
    })?;
    let issuer = creds.get_or("issuer", &integ.name);
    let token = SsfSigner::new(issuer)
        .sign(&payload, &creds.get("private_key"), &creds.get("key_id"))
        .map_err(|e| EngineError::crypto(format!("signing failed: {}", e.message())))?;

    if debug {
        info!(
            "Generated SET for {}: {}",
            integ.name,
            redact(&rendered)
        );
    }

    let mut url = integ.base_url.clone();
    if !definition.path_template.is_empty() {
        let path = template::render(&definition.path_template, context).map_err(|e| {
            EngineError::template(format!("failed to render path: {}", e.message()))
        })?;
        url.push_str(&path);
    }

    Ok(PreparedRequest {
        method: super::parse_method(&definition.method, reqwest::Method::POST)?,
        url,
        body: token,
        content_type: SET_CONTENT_TYPE,
        accept: Some("application/json"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PKCS8: &str = include_str!("../../../tests/fixtures/ssf_rsa_pkcs8.pem");

    fn ssf_integration(credentials: String) -> Integration {
        Integration {
            name: "Okta SSF".into(),
            integration_type: "SSF".into(),
            base_url: "https://receiver.example.com".into(),
            credentials,
            ..Default::default()
        }
    }

    fn definition() -> ActionDefinition {
        ActionDefinition {
            method: "POST".into(),
            path_template: "/streams/{{.TenantID}}".into(),
            body_template: r#"{"subject": {"format": "email", "email": "{{.UserEmail}}"}, "events": {"{{ ssf_event_type .IssueType }}": {}}}"#.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_prepare_signs_and_targets_stream() {
        let creds = json!({"private_key": PKCS8, "key_id": "k1"}).to_string();
        let req = prepare(
            &ssf_integration(creds),
            &definition(),
            &json!({"TenantID": 3, "UserEmail": "a@b.c", "IssueType": "Lack of MFA"}),
            false,
        )
        .unwrap();
        assert_eq!(req.url, "https://receiver.example.com/streams/3");
        assert_eq!(req.content_type, SET_CONTENT_TYPE);
        assert_eq!(req.accept, Some("application/json"));
        assert_eq!(req.body.split('.').count(), 3);
    }

    #[test]
    fn test_prepare_failures() {
        let ctx = json!({"UserEmail": "a@b.c"});

        let err = prepare(&ssf_integration("{}".into()), &ActionDefinition {
            body_template: "not json".into(),
            ..definition()
        }, &ctx, false)
        .unwrap_err();
        assert!(err.message().starts_with("failed to unmarshal ssf payload"));

        let err = prepare(&ssf_integration("oops".into()), &definition(), &ctx, false).unwrap_err();
        assert!(err.message().starts_with("failed to parse integration credentials"));

        let err = prepare(&ssf_integration("{}".into()), &definition(), &ctx, false).unwrap_err();
        assert_eq!(err.message(), "signing failed: failed to parse private key PEM");
    }
}
