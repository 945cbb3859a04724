//! API 帮助函数

use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse, error::InternalError, web};
use serde::Serialize;
use serde_json::json;
use tracing::{error, warn};

use crate::api::AppState;
use crate::api::middleware::Identity;
use crate::api::tenancy::TenantContext;
use crate::errors::{EngineError, Result};
use crate::storage::{AuditRecord, GLOBAL_TENANT_ID};

/// `{"error": msg}`
pub fn error_response(status: StatusCode, message: &str) -> HttpResponse {
    HttpResponse::build(status).json(json!({ "error": message }))
}

/// 按错误类型映射状态码；5xx 记日志
pub fn error_from_engine(err: &EngineError) -> HttpResponse {
    let status = err.http_status();
    if status.is_server_error() {
        error!("API request failed: {}", err.format_simple());
    }
    error_response(status, err.message())
}

pub fn api_result<T: Serialize>(result: Result<T>) -> HttpResponse {
    match result {
        Ok(data) => HttpResponse::Ok().json(data),
        Err(e) => error_from_engine(&e),
    }
}

pub fn created_result<T: Serialize>(result: Result<T>) -> HttpResponse {
    match result {
        Ok(data) => HttpResponse::Created().json(data),
        Err(e) => error_from_engine(&e),
    }
}

/// 写操作需要落到具体租户，全局视图下拒绝
pub fn require_tenant(ctx: &TenantContext) -> Result<i32> {
    if ctx.id == GLOBAL_TENANT_ID {
        return Err(EngineError::validation(
            "a specific tenant is required for this operation",
        ));
    }
    Ok(ctx.id)
}

pub fn client_ip(req: &HttpRequest) -> String {
    req.connection_info()
        .realip_remote_addr()
        .unwrap_or_default()
        .to_string()
}

/// 写审计日志；失败不影响请求本身
pub async fn audit(state: &AppState, req: &HttpRequest, identity: &Identity, record: AuditRecord) {
    let action = record.action.clone();
    let record = record.user(identity.user_id).ip(client_ip(req));
    if let Err(e) = state.storage.record_audit(record).await {
        warn!("Failed to write audit log for {}: {}", action, e);
    }
}

/// 请求体解析失败时同样返回 `{"error": msg}`
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(1024 * 1024)
        .error_handler(|err, _req| {
            let response = error_response(StatusCode::BAD_REQUEST, &err.to_string());
            InternalError::from_response(err, response).into()
        })
}

pub fn path_config() -> web::PathConfig {
    web::PathConfig::default().error_handler(|err, _req| {
        let response = error_response(StatusCode::BAD_REQUEST, "invalid id");
        InternalError::from_response(err, response).into()
    })
}

pub async fn api_not_found() -> HttpResponse {
    error_response(StatusCode::NOT_FOUND, "API route not found")
}
