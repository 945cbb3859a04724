//! 普通 REST 动作：base_url + 渲染后的路径，JSON 请求体

use serde_json::Value;

use super::PreparedRequest;
use crate::engine::template;
use crate::errors::{EngineError, Result};
use crate::storage::{ActionDefinition, Integration};

pub(crate) fn prepare(
    integ: &Integration,
    definition: &ActionDefinition,
    context: &Value,
) -> Result<PreparedRequest> {
    let path = template::render(&definition.path_template, context)
        .map_err(|e| EngineError::template(format!("failed to render path: {}", e.message())))?;
    let body = template::render(&definition.body_template, context)
        .map_err(|e| EngineError::template(format!("failed to render body: {}", e.message())))?;

    Ok(PreparedRequest {
        method: super::parse_method(&definition.method, reqwest::Method::GET)?,
        url: format!("{}{}", integ.base_url, path),
        body,
        content_type: "application/json",
        accept: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn definition(path: &str, body: &str) -> ActionDefinition {
        ActionDefinition {
            method: "post".into(),
            path_template: path.into(),
            body_template: body.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_prepare_renders_path_and_body() {
        let integ = Integration {
            base_url: "https://api.example.com".into(),
            ..Default::default()
        };
        let req = prepare(
            &integ,
            &definition("/users/{{.UserEmail}}/disable", r#"{"reason": "{{.IssueType}}"}"#),
            &json!({"UserEmail": "bob", "IssueType": "Weak Password"}),
        )
        .unwrap();
        assert_eq!(req.method, reqwest::Method::POST);
        assert_eq!(req.url, "https://api.example.com/users/bob/disable");
        assert_eq!(req.body, r#"{"reason": "Weak Password"}"#);
    }

    #[test]
    fn test_render_errors_are_labelled() {
        let integ = Integration::default();
        let err = prepare(&integ, &definition("{{ .A ", ""), &json!({})).unwrap_err();
        assert!(matches!(err, EngineError::Template(_)));
        assert!(err.message().starts_with("failed to render path: "));

        let err = prepare(&integ, &definition("", "{{ nope }}"), &json!({})).unwrap_err();
        assert!(err.message().starts_with("failed to render body: "));
    }
}
