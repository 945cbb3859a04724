//! 租户管理（仅 admin）

use actix_web::{HttpRequest, HttpResponse, web};
use serde_json::json;
use tracing::{info, warn};

use super::helpers::{api_result, audit, created_result, error_from_engine};
use crate::api::AppState;
use crate::api::middleware::Identity;
use crate::errors::Result;
use crate::storage::{AuditRecord, DEFAULT_TENANT_ID, Tenant};

/// 空字符串的 api_key 视为未设置，避免撞唯一索引
fn normalize_api_key(mut tenant: Tenant) -> Tenant {
    if tenant.api_key.as_deref().is_some_and(|k| k.trim().is_empty()) {
        tenant.api_key = None;
    }
    tenant
}

pub async fn list_tenants(state: web::Data<AppState>) -> HttpResponse {
    api_result(state.storage.list_tenants().await)
}

pub async fn create_tenant(
    req: HttpRequest,
    state: web::Data<AppState>,
    identity: Identity,
    body: web::Json<Tenant>,
) -> HttpResponse {
    let input = normalize_api_key(body.into_inner());
    let result: Result<Tenant> = async {
        let created = state.storage.create_tenant(&input).await?;
        audit(
            &state,
            &req,
            &identity,
            AuditRecord::new("CREATE", "tenant")
                .tenant(created.id)
                .target(created.id)
                .details(json!({ "name": created.name })),
        )
        .await;

        if created.id != DEFAULT_TENANT_ID {
            let storage = state.storage.clone();
            let tenant_id = created.id;
            tokio::spawn(async move {
                match storage.bootstrap_tenant(tenant_id).await {
                    Ok(report) => info!(
                        "Tenant {} auto-bootstrapped: {} integrations, {} actions, {} workflows",
                        tenant_id, report.integrations, report.actions, report.workflows
                    ),
                    Err(e) => warn!("Auto-bootstrap failed for tenant {}: {}", tenant_id, e),
                }
            });
        }
        Ok(created)
    }
    .await;
    created_result(result)
}

pub async fn update_tenant(
    req: HttpRequest,
    state: web::Data<AppState>,
    identity: Identity,
    path: web::Path<i32>,
    body: web::Json<Tenant>,
) -> HttpResponse {
    let id = path.into_inner();
    let input = normalize_api_key(body.into_inner());
    let result: Result<Tenant> = async {
        let updated = state.storage.update_tenant(id, &input).await?;
        audit(
            &state,
            &req,
            &identity,
            AuditRecord::new("UPDATE", "tenant")
                .tenant(id)
                .target(id)
                .details(json!({ "name": updated.name })),
        )
        .await;
        Ok(updated)
    }
    .await;
    api_result(result)
}

pub async fn delete_tenant(
    req: HttpRequest,
    state: web::Data<AppState>,
    identity: Identity,
    path: web::Path<i32>,
) -> HttpResponse {
    let id = path.into_inner();
    if let Err(e) = state.storage.delete_tenant(id).await {
        return error_from_engine(&e);
    }
    audit(
        &state,
        &req,
        &identity,
        AuditRecord::new("DELETE", "tenant").tenant(id).target(id),
    )
    .await;
    HttpResponse::Ok().json(json!({ "message": "tenant deleted successfully" }))
}

/// 从默认租户克隆集成、动作与工作流
pub async fn bootstrap_tenant(
    req: HttpRequest,
    state: web::Data<AppState>,
    identity: Identity,
    path: web::Path<i32>,
) -> HttpResponse {
    let id = path.into_inner();
    let report = match state.storage.bootstrap_tenant(id).await {
        Ok(report) => report,
        Err(e) => return error_from_engine(&e),
    };
    audit(
        &state,
        &req,
        &identity,
        AuditRecord::new("BOOTSTRAP", "tenant")
            .tenant(id)
            .target(id)
            .details(json!({
                "integrations": report.integrations,
                "actions": report.actions,
                "workflows": report.workflows,
            })),
    )
    .await;
    HttpResponse::Ok().json(json!({
        "status": "success",
        "message": "Tenant bootstrapped from templates (Integrations, Actions, Workflows)",
    }))
}

pub async fn aggregate_stats(state: web::Data<AppState>) -> HttpResponse {
    api_result(state.storage.aggregate_stats().await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_api_key_becomes_none() {
        let tenant = normalize_api_key(Tenant {
            api_key: Some("  ".into()),
            ..Default::default()
        });
        assert_eq!(tenant.api_key, None);

        let tenant = normalize_api_key(Tenant {
            api_key: Some("k-1".into()),
            ..Default::default()
        });
        assert_eq!(tenant.api_key.as_deref(), Some("k-1"));
    }
}
