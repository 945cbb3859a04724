use actix_service::{Service, Transform};
use actix_web::{
    Error, FromRequest, HttpMessage, HttpRequest, HttpResponse,
    body::EitherBody,
    dev::{Payload, ServiceRequest, ServiceResponse},
    http::{Method, header::HeaderMap},
    web,
};
use futures_util::future::{LocalBoxFuture, Ready, ready};
use serde_json::json;
use std::rc::Rc;
use subtle::ConstantTimeEq;
use tracing::{debug, info, trace};

use crate::api::AppState;
use crate::api::jwt::JwtService;
use crate::storage::Role;

/// 无需认证的登录路径
pub const LOGIN_PATH: &str = "/api/auth/login";
pub const API_KEY_HEADER: &str = "X-API-Key";

/// 已认证的调用方，写入 request extensions
///
/// 开发模式（未配置管理员密钥）下匿名请求没有 Identity，提取结果为默认值。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub user_id: i32,
    pub role: Option<String>,
}

impl Identity {
    fn admin() -> Self {
        Self {
            user_id: 0,
            role: Some(Role::Admin.to_string()),
        }
    }
}

impl FromRequest for Identity {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(Ok(req.extensions().get::<Identity>().cloned().unwrap_or_default()))
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum AuthOutcome {
    Authenticated(Identity),
    /// 开发模式放行
    Anonymous,
    Rejected,
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
}

/// 依次尝试：Bearer 管理员密钥、Bearer JWT、X-API-Key、开发模式
pub fn authenticate(headers: &HeaderMap, admin_key: &str, jwt: &JwtService) -> AuthOutcome {
    if let Some(token) = bearer_token(headers) {
        if !admin_key.is_empty() && constant_time_compare(token, admin_key) {
            trace!("Authenticated via admin key bearer");
            return AuthOutcome::Authenticated(Identity::admin());
        }
        match jwt.validate(token) {
            Ok(claims) => {
                trace!("Authenticated via JWT for user {}", claims.user_id);
                return AuthOutcome::Authenticated(Identity {
                    user_id: claims.user_id,
                    role: Some(claims.role),
                });
            }
            Err(e) => debug!("Bearer token validation failed: {}", e),
        }
    }

    if !admin_key.is_empty()
        && let Some(key) = headers.get(API_KEY_HEADER).and_then(|h| h.to_str().ok())
        && constant_time_compare(key, admin_key)
    {
        trace!("Authenticated via X-API-Key");
        return AuthOutcome::Authenticated(Identity::admin());
    }

    if admin_key.is_empty() {
        return AuthOutcome::Anonymous;
    }
    AuthOutcome::Rejected
}

/// `/api` 认证中间件
#[derive(Clone, Default)]
pub struct ApiAuth;

impl<S, B> Transform<S, ServiceRequest> for ApiAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = ApiAuthMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(ApiAuthMiddleware {
            service: Rc::new(service),
        }))
    }
}

pub struct ApiAuthMiddleware<S> {
    service: Rc<S>,
}

impl<S, B> ApiAuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    fn handle_options_request(req: ServiceRequest) -> ServiceResponse<EitherBody<B>> {
        req.into_response(HttpResponse::NoContent().finish().map_into_right_body())
    }

    fn handle_unauthorized(req: ServiceRequest) -> ServiceResponse<EitherBody<B>> {
        info!("API authentication failed for {}", req.path());
        req.into_response(
            HttpResponse::Unauthorized()
                .json(json!({ "error": "unauthorized" }))
                .map_into_right_body(),
        )
    }
}

impl<S, B> Service<ServiceRequest> for ApiAuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &self,
        ctx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let srv = self.service.clone();

        Box::pin(async move {
            if req.method() == Method::OPTIONS {
                return Ok(Self::handle_options_request(req));
            }

            if req.path() == LOGIN_PATH {
                trace!("Login endpoint accessed - bypassing authentication");
                return Ok(srv.call(req).await?.map_into_left_body());
            }

            let Some(state) = req.app_data::<web::Data<AppState>>().cloned() else {
                return Ok(Self::handle_unauthorized(req));
            };

            match authenticate(req.headers(), &state.admin_api_key, &state.jwt) {
                AuthOutcome::Authenticated(identity) => {
                    req.extensions_mut().insert(identity);
                    Ok(srv.call(req).await?.map_into_left_body())
                }
                AuthOutcome::Anonymous => Ok(srv.call(req).await?.map_into_left_body()),
                AuthOutcome::Rejected => Ok(Self::handle_unauthorized(req)),
            }
        })
    }
}
