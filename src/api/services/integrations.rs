//! 集成管理与配置导入
//!
//! 对外返回的凭据一律打码；更新时回传的打码值由存储层与原值合并。

use actix_web::{HttpRequest, HttpResponse, web};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use super::helpers::{api_result, audit, created_result, error_from_engine, require_tenant};
use crate::api::AppState;
use crate::api::middleware::Identity;
use crate::api::tenancy::TenantContext;
use crate::errors::Result;
use crate::security::redact;
use crate::storage::{ActionDefinition, AuditRecord, Integration};

fn redacted(mut integ: Integration) -> Integration {
    integ.credentials = redact(&integ.credentials);
    integ
}

pub async fn list_integrations(state: web::Data<AppState>, ctx: TenantContext) -> HttpResponse {
    let result = state
        .storage
        .list_integrations(ctx.scope())
        .await
        .map(|list| list.into_iter().map(redacted).collect::<Vec<_>>());
    api_result(result)
}

pub async fn create_integration(
    req: HttpRequest,
    state: web::Data<AppState>,
    ctx: TenantContext,
    identity: Identity,
    body: web::Json<Integration>,
) -> HttpResponse {
    let result: Result<Integration> = async {
        let tenant_id = require_tenant(&ctx)?;
        let mut input = body.into_inner();
        input.id = 0;
        input.tenant_id = tenant_id;
        input.consecutive_failures = 0;
        input.is_available = true;

        let created = state.storage.create_integration(&input).await?;
        if let Err(e) = state.storage.ensure_default_poller(tenant_id).await {
            warn!("Failed to add default poller for tenant {}: {}", tenant_id, e);
        }

        audit(
            &state,
            &req,
            &identity,
            AuditRecord::new("CREATE", "integration")
                .tenant(tenant_id)
                .target(created.id)
                .details(json!({ "name": created.name, "type": created.integration_type })),
        )
        .await;
        Ok(redacted(created))
    }
    .await;
    created_result(result)
}

pub async fn update_integration(
    req: HttpRequest,
    state: web::Data<AppState>,
    ctx: TenantContext,
    identity: Identity,
    body: web::Json<Integration>,
) -> HttpResponse {
    let result: Result<Integration> = async {
        let tenant_id = require_tenant(&ctx)?;
        let updated = state.storage.update_integration(tenant_id, &body).await?;
        audit(
            &state,
            &req,
            &identity,
            AuditRecord::new("UPDATE", "integration")
                .tenant(tenant_id)
                .target(updated.id)
                .details(json!({ "name": updated.name, "enabled": updated.enabled })),
        )
        .await;
        Ok(redacted(updated))
    }
    .await;
    api_result(result)
}

/// 手动复位熔断
pub async fn reset_integration(
    req: HttpRequest,
    state: web::Data<AppState>,
    ctx: TenantContext,
    identity: Identity,
    path: web::Path<i32>,
) -> HttpResponse {
    let id = path.into_inner();
    let result: Result<Integration> = async {
        let tenant_id = require_tenant(&ctx)?;
        let integ = state.storage.reset_circuit(tenant_id, id).await?;
        audit(
            &state,
            &req,
            &identity,
            AuditRecord::new("RESET_CIRCUIT", "integration")
                .tenant(tenant_id)
                .target(id)
                .details(json!({ "name": integ.name })),
        )
        .await;
        Ok(redacted(integ))
    }
    .await;
    api_result(result)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ImportRequest {
    pub integrations: Vec<Integration>,
    pub actions: Vec<ActionDefinition>,
}

/// 事务导入，任一失败整体回滚
pub async fn import_configuration(
    req: HttpRequest,
    state: web::Data<AppState>,
    ctx: TenantContext,
    identity: Identity,
    body: web::Json<ImportRequest>,
) -> HttpResponse {
    let tenant_id = match require_tenant(&ctx) {
        Ok(id) => id,
        Err(e) => return error_from_engine(&e),
    };
    if let Err(e) = state
        .storage
        .import_configuration(tenant_id, &body.integrations, &body.actions)
        .await
    {
        return error_from_engine(&e);
    }

    audit(
        &state,
        &req,
        &identity,
        AuditRecord::new("IMPORT", "configuration")
            .tenant(tenant_id)
            .details(json!({
                "integrations": body.integrations.len(),
                "actions": body.actions.len(),
            })),
    )
    .await;
    HttpResponse::Ok().json(json!({
        "status": "success",
        "message": "Imported configuration successfully",
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::REDACTED;

    #[test]
    fn test_redacted_hides_secrets() {
        let integ = Integration {
            credentials: r#"{"token":"abc","username":"svc"}"#.into(),
            ..Default::default()
        };
        let out = redacted(integ);
        assert!(out.credentials.contains(REDACTED));
        assert!(!out.credentials.contains("abc"));
    }

    #[test]
    fn test_import_request_defaults() {
        let req: ImportRequest = serde_json::from_str(r#"{"actions":[]}"#).unwrap();
        assert!(req.integrations.is_empty());
    }
}
