//! API 路由配置
//!
//! 读接口对所有已认证调用方开放；写接口按角色限制，admin 总是放行。

use actix_web::web;

use super::actions::{create_action, list_actions, update_action};
use super::auth::{audit_logs, login, me};
use super::helpers::{api_not_found, json_config, path_config};
use super::integrations::{
    create_integration, import_configuration, list_integrations, reset_integration,
    update_integration,
};
use super::jobs::{dashboard_stats, job_logs, list_jobs, rerun_job};
use super::settings::{list_settings, update_setting};
use super::tenants::{
    aggregate_stats, bootstrap_tenant, create_tenant, delete_tenant, list_tenants, update_tenant,
};
use super::workflows::{create_workflow, delete_workflow, list_workflows, update_workflow};
use crate::api::middleware::{ApiAuth, RequireRole};
use crate::storage::Role;

const INTEGRATOR: RequireRole = RequireRole::any_of(&[Role::Integrator]);
const ACTION_BUILDER: RequireRole = RequireRole::any_of(&[Role::ActionBuilder]);
const IMPORTER: RequireRole = RequireRole::any_of(&[Role::ActionBuilder, Role::Integrator]);
const WORKFLOW_EDITOR: RequireRole = RequireRole::any_of(&[Role::WorkflowEditor]);
const ADMIN: RequireRole = RequireRole::admin();

/// 集成路由 `/integrations`
pub fn integration_routes() -> actix_web::Scope {
    web::scope("/integrations")
        .route("", web::get().to(list_integrations))
        .route("", web::post().to(create_integration).wrap(INTEGRATOR))
        .route("", web::put().to(update_integration).wrap(INTEGRATOR))
        .route("/{id}/reset", web::put().to(reset_integration).wrap(INTEGRATOR))
}

/// 动作模板路由 `/actions`
pub fn action_routes() -> actix_web::Scope {
    web::scope("/actions")
        .route("", web::get().to(list_actions))
        .route("", web::post().to(create_action).wrap(ACTION_BUILDER))
        .route("", web::put().to(update_action).wrap(ACTION_BUILDER))
}

/// 工作流路由 `/workflows`
pub fn workflow_routes() -> actix_web::Scope {
    web::scope("/workflows")
        .route("", web::get().to(list_workflows))
        .route("", web::post().to(create_workflow).wrap(WORKFLOW_EDITOR))
        .route("", web::put().to(update_workflow).wrap(WORKFLOW_EDITOR))
        .route("/{id}", web::delete().to(delete_workflow).wrap(WORKFLOW_EDITOR))
}

/// 作业路由 `/jobs`
pub fn job_routes() -> actix_web::Scope {
    web::scope("/jobs")
        .route("", web::get().to(list_jobs))
        .route("/{id}/rerun", web::post().to(rerun_job).wrap(WORKFLOW_EDITOR))
        .route("/{id}/logs", web::get().to(job_logs))
}

/// 全局管理路由 `/admin`
///
/// - GET/POST /admin/tenants
/// - PUT/DELETE /admin/tenants/{id}
/// - POST /admin/tenants/{id}/bootstrap
/// - GET /admin/stats
pub fn admin_routes() -> actix_web::Scope<
    impl actix_web::dev::ServiceFactory<
        actix_web::dev::ServiceRequest,
        Config = (),
        Response = actix_web::dev::ServiceResponse<actix_web::body::EitherBody<actix_web::body::BoxBody>>,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    web::scope("/admin")
        .wrap(ADMIN)
        .route("/tenants", web::get().to(list_tenants))
        .route("/tenants", web::post().to(create_tenant))
        .route("/tenants/{id}", web::put().to(update_tenant))
        .route("/tenants/{id}", web::delete().to(delete_tenant))
        .route("/tenants/{id}/bootstrap", web::post().to(bootstrap_tenant))
        .route("/stats", web::get().to(aggregate_stats))
}

/// `/api` 根路由
pub fn api_routes() -> actix_web::Scope<
    impl actix_web::dev::ServiceFactory<
        actix_web::dev::ServiceRequest,
        Config = (),
        Response = actix_web::dev::ServiceResponse<actix_web::body::EitherBody<actix_web::body::BoxBody>>,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    web::scope("/api")
        .wrap(ApiAuth)
        .app_data(json_config())
        .app_data(path_config())
        .route("/auth/login", web::post().to(login))
        .route("/auth/me", web::get().to(me))
        .route("/audit/logs", web::get().to(audit_logs).wrap(ADMIN))
        .service(integration_routes())
        .service(action_routes())
        .route("/import", web::post().to(import_configuration).wrap(IMPORTER))
        .service(workflow_routes())
        .service(job_routes())
        .route("/stats", web::get().to(dashboard_stats))
        .route("/settings", web::get().to(list_settings))
        .route("/settings", web::put().to(update_setting).wrap(ADMIN))
        .service(admin_routes())
        .default_service(web::to(api_not_found))
}
