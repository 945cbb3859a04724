use actix_web::{HttpRequest, HttpResponse, web};
use serde_json::json;

use super::helpers::{api_result, audit, error_from_engine};
use crate::api::AppState;
use crate::api::middleware::Identity;
use crate::storage::{AuditRecord, GLOBAL_TENANT_ID, SystemSetting};

pub async fn list_settings(state: web::Data<AppState>) -> HttpResponse {
    api_result(state.storage.list_settings().await)
}

/// 只更新 value
pub async fn update_setting(
    req: HttpRequest,
    state: web::Data<AppState>,
    identity: Identity,
    body: web::Json<SystemSetting>,
) -> HttpResponse {
    let input = body.into_inner();
    if let Err(e) = state
        .storage
        .update_setting_value(&input.key, &input.value)
        .await
    {
        return error_from_engine(&e);
    }

    audit(
        &state,
        &req,
        &identity,
        AuditRecord::new("UPDATE_SETTING", "setting")
            .tenant(GLOBAL_TENANT_ID)
            .target(&input.key)
            .details(json!({ "value": input.value })),
    )
    .await;
    HttpResponse::Ok().json(input)
}
