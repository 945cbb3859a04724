use actix_web::{HttpResponse, web};

use super::helpers::{api_result, created_result, require_tenant};
use crate::api::AppState;
use crate::api::tenancy::TenantContext;
use crate::errors::Result;
use crate::storage::ActionDefinition;

pub async fn list_actions(state: web::Data<AppState>, ctx: TenantContext) -> HttpResponse {
    api_result(state.storage.list_actions(ctx.scope()).await)
}

pub async fn create_action(
    state: web::Data<AppState>,
    ctx: TenantContext,
    body: web::Json<ActionDefinition>,
) -> HttpResponse {
    let result: Result<ActionDefinition> = async {
        let mut input = body.into_inner();
        input.id = 0;
        input.tenant_id = require_tenant(&ctx)?;
        state.storage.create_action(&input).await
    }
    .await;
    created_result(result)
}

pub async fn update_action(
    state: web::Data<AppState>,
    ctx: TenantContext,
    body: web::Json<ActionDefinition>,
) -> HttpResponse {
    let result: Result<ActionDefinition> = async {
        let tenant_id = require_tenant(&ctx)?;
        state.storage.update_action(tenant_id, &body).await
    }
    .await;
    api_result(result)
}
