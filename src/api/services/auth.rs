//! 登录与当前用户

use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse, web};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use super::helpers::{audit, error_from_engine, error_response};
use crate::api::AppState;
use crate::api::middleware::Identity;
use crate::storage::{AuditRecord, GLOBAL_TENANT_ID, User};

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    /// 本地登录暂不校验密码
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

pub async fn login(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<LoginRequest>,
) -> HttpResponse {
    let email = body.email.trim();
    if email.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "invalid input");
    }

    let user = match state.storage.find_or_create_local_user(email).await {
        Ok(user) => user,
        Err(e) => return error_from_engine(&e),
    };

    let token = match state.jwt.issue(&user) {
        Ok(token) => token,
        Err(e) => {
            error!("Failed to sign token for {}: {}", user.email, e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to generate token");
        }
    };

    let identity = Identity {
        user_id: user.id,
        role: Some(user.role.clone()),
    };
    audit(
        &state,
        &req,
        &identity,
        AuditRecord::new("LOGIN", "USER")
            .tenant(GLOBAL_TENANT_ID)
            .target(user.id)
            .details(json!("User logged in via local provider")),
    )
    .await;
    info!("User {} logged in", user.email);

    HttpResponse::Ok().json(LoginResponse { token, user })
}

pub async fn me(state: web::Data<AppState>, identity: Identity) -> HttpResponse {
    match state.storage.get_user(identity.user_id).await {
        Ok(Some(user)) => HttpResponse::Ok().json(user),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "user not found"),
        Err(e) => error_from_engine(&e),
    }
}

pub async fn audit_logs(state: web::Data<AppState>) -> HttpResponse {
    super::helpers::api_result(state.storage.recent_audit_logs().await)
}
