//! 基于角色的访问控制
//!
//! admin 总是放行；其余角色必须在路由允许的列表中。

use actix_service::{Service, Transform};
use actix_web::{
    Error, HttpMessage, HttpResponse,
    body::EitherBody,
    dev::{ServiceRequest, ServiceResponse},
};
use futures_util::future::{LocalBoxFuture, Ready, ready};
use serde_json::json;
use std::rc::Rc;
use tracing::info;

use super::auth::Identity;
use crate::storage::Role;

pub const NO_ROLE_MESSAGE: &str = "access denied: no role assigned";
pub const INSUFFICIENT_MESSAGE: &str = "access denied: insufficient permissions";

pub fn check_role(role: Option<&str>, allowed: &[Role]) -> Result<(), &'static str> {
    let Some(role) = role else {
        return Err(NO_ROLE_MESSAGE);
    };
    if role == Role::Admin.to_string() || allowed.iter().any(|r| r.to_string() == role) {
        Ok(())
    } else {
        Err(INSUFFICIENT_MESSAGE)
    }
}

#[derive(Clone, Copy)]
pub struct RequireRole {
    allowed: &'static [Role],
}

impl RequireRole {
    pub const fn any_of(allowed: &'static [Role]) -> Self {
        Self { allowed }
    }

    pub const fn admin() -> Self {
        Self { allowed: &[] }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RequireRole
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = RequireRoleMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequireRoleMiddleware {
            service: Rc::new(service),
            allowed: self.allowed,
        }))
    }
}

pub struct RequireRoleMiddleware<S> {
    service: Rc<S>,
    allowed: &'static [Role],
}

impl<S, B> Service<ServiceRequest> for RequireRoleMiddleware<S>
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
        let role = req
            .extensions()
            .get::<Identity>()
            .and_then(|identity| identity.role.clone());
        let decision = check_role(role.as_deref(), self.allowed);

        Box::pin(async move {
            match decision {
                Ok(()) => Ok(srv.call(req).await?.map_into_left_body()),
                Err(message) => {
                    info!("RBAC rejected {} {}: {}", req.method(), req.path(), message);
                    Ok(req.into_response(
                        HttpResponse::Forbidden()
                            .json(json!({ "error": message }))
                            .map_into_right_body(),
                    ))
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_always_allowed() {
        assert!(check_role(Some("admin"), &[]).is_ok());
        assert!(check_role(Some("admin"), &[Role::Integrator]).is_ok());
    }

    #[test]
    fn test_role_must_be_listed() {
        let allowed = [Role::ActionBuilder, Role::Integrator];
        assert!(check_role(Some("integrator"), &allowed).is_ok());
        assert_eq!(
            check_role(Some("viewer"), &allowed),
            Err(INSUFFICIENT_MESSAGE)
        );
    }

    #[test]
    fn test_missing_role() {
        assert_eq!(check_role(None, &[Role::Viewer]), Err(NO_ROLE_MESSAGE));
    }
}
