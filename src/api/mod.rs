//! 控制台 REST API
//!
//! 所有路由挂在 `/api` 下，响应为裸 JSON，错误统一为 `{"error": msg}`。

pub mod jwt;
pub mod middleware;
pub mod services;
pub mod tenancy;

use std::sync::Arc;

use crate::config::StaticConfig;
use crate::engine::Engine;
use crate::storage::Storage;

use jwt::JwtService;

/// 各 handler 共享的状态
pub struct AppState {
    pub storage: Arc<Storage>,
    /// 引擎未启用时为 None，重跑接口返回 500
    pub engine: Option<Arc<Engine>>,
    pub jwt: JwtService,
    pub admin_api_key: String,
    pub multi_tenant: bool,
}

impl AppState {
    pub fn new(storage: Arc<Storage>, engine: Option<Arc<Engine>>, config: &StaticConfig) -> Self {
        Self {
            storage,
            engine,
            jwt: JwtService::from_config(&config.security),
            admin_api_key: config.security.admin_api_key.clone(),
            multi_tenant: config.tenancy.multi_tenant,
        }
    }
}

pub use services::routes::api_routes;
