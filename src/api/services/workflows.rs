//! 工作流编辑
//!
//! 更新在一个事务内完成，轮询器关联和步骤整体替换。

use actix_web::{HttpResponse, web};
use serde_json::json;

use super::helpers::{api_result, created_result, error_from_engine, require_tenant};
use crate::api::AppState;
use crate::api::tenancy::TenantContext;
use crate::errors::Result;
use crate::storage::Workflow;

pub async fn list_workflows(state: web::Data<AppState>, ctx: TenantContext) -> HttpResponse {
    api_result(state.storage.list_workflows(ctx.scope()).await)
}

pub async fn create_workflow(
    state: web::Data<AppState>,
    ctx: TenantContext,
    body: web::Json<Workflow>,
) -> HttpResponse {
    let result: Result<Workflow> = async {
        let tenant_id = require_tenant(&ctx)?;
        state.storage.create_workflow(tenant_id, &body).await
    }
    .await;
    created_result(result)
}

pub async fn update_workflow(
    state: web::Data<AppState>,
    ctx: TenantContext,
    body: web::Json<Workflow>,
) -> HttpResponse {
    let result: Result<Workflow> = async {
        let tenant_id = require_tenant(&ctx)?;
        state.storage.update_workflow(tenant_id, &body).await
    }
    .await;
    api_result(result)
}

/// 软删除
pub async fn delete_workflow(
    state: web::Data<AppState>,
    ctx: TenantContext,
    path: web::Path<i32>,
) -> HttpResponse {
    let result: Result<()> = async {
        let tenant_id = require_tenant(&ctx)?;
        state.storage.delete_workflow(tenant_id, path.into_inner()).await
    }
    .await;
    match result {
        Ok(()) => HttpResponse::Ok().json(json!({ "message": "workflow archived successfully" })),
        Err(e) => error_from_engine(&e),
    }
}
