//! 请求租户解析
//!
//! 单租户模式固定为默认租户；多租户模式读取 `X-Tenant-ID`，
//! 其中 0 表示列表接口的全局视图。

use actix_web::{FromRequest, HttpRequest, dev::Payload, web};
use futures_util::future::{Ready, ready};

use super::AppState;
use crate::storage::{DEFAULT_TENANT_ID, GLOBAL_TENANT_ID, TenantScope};

pub const TENANT_HEADER: &str = "X-Tenant-ID";

/// 从请求头解析租户；缺失或非数字时回落到默认租户
pub fn resolve_tenant_id(req: &HttpRequest, multi_tenant: bool) -> i32 {
    if !multi_tenant {
        return DEFAULT_TENANT_ID;
    }
    req.headers()
        .get(TENANT_HEADER)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse::<i32>().ok())
        .unwrap_or(DEFAULT_TENANT_ID)
}

/// 当前请求的租户上下文
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantContext {
    pub id: i32,
    pub multi_tenant: bool,
}

impl TenantContext {
    /// 列表查询作用域
    pub fn scope(&self) -> TenantScope {
        if self.multi_tenant && self.id == GLOBAL_TENANT_ID {
            TenantScope::All
        } else {
            TenantScope::Tenant(self.id)
        }
    }
}

impl FromRequest for TenantContext {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let multi_tenant = req
            .app_data::<web::Data<AppState>>()
            .map(|state| state.multi_tenant)
            .unwrap_or(false);
        ready(Ok(TenantContext {
            id: resolve_tenant_id(req, multi_tenant),
            multi_tenant,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn test_single_tenant_ignores_header() {
        let req = TestRequest::default()
            .insert_header((TENANT_HEADER, "5"))
            .to_http_request();
        assert_eq!(resolve_tenant_id(&req, false), DEFAULT_TENANT_ID);
    }

    #[test]
    fn test_multi_tenant_reads_header() {
        let req = TestRequest::default()
            .insert_header((TENANT_HEADER, "5"))
            .to_http_request();
        assert_eq!(resolve_tenant_id(&req, true), 5);

        let req = TestRequest::default()
            .insert_header((TENANT_HEADER, "abc"))
            .to_http_request();
        assert_eq!(resolve_tenant_id(&req, true), DEFAULT_TENANT_ID);

        let req = TestRequest::default().to_http_request();
        assert_eq!(resolve_tenant_id(&req, true), DEFAULT_TENANT_ID);
    }

    #[test]
    fn test_global_scope_only_in_multi_tenant() {
        let global = TenantContext {
            id: GLOBAL_TENANT_ID,
            multi_tenant: true,
        };
        assert_eq!(global.scope(), TenantScope::All);

        let single = TenantContext {
            id: GLOBAL_TENANT_ID,
            multi_tenant: false,
        };
        assert_eq!(single.scope(), TenantScope::Tenant(GLOBAL_TENANT_ID));
    }
}
