//! 作业历史、日志与手动重跑

use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse, web};
use serde::Deserialize;
use serde_json::json;

use super::helpers::{api_result, audit, error_from_engine, error_response};
use crate::api::AppState;
use crate::api::middleware::Identity;
use crate::api::tenancy::TenantContext;
use crate::errors::{EngineError, Result};
use crate::storage::backend::normalize_page;
use crate::storage::{AuditRecord, JobLog};

/// 非数字参数按缺省处理
#[derive(Debug, Default, Deserialize)]
pub struct JobsQuery {
    pub page: Option<String>,
    #[serde(rename = "pageSize")]
    pub page_size: Option<String>,
}

impl JobsQuery {
    pub fn normalized(&self) -> (u64, u64) {
        let parse = |v: &Option<String>| v.as_deref().and_then(|s| s.trim().parse::<i64>().ok());
        normalize_page(parse(&self.page), parse(&self.page_size))
    }
}

pub async fn list_jobs(
    state: web::Data<AppState>,
    ctx: TenantContext,
    query: web::Query<JobsQuery>,
) -> HttpResponse {
    let (page, size) = query.normalized();
    api_result(state.storage.list_jobs(ctx.scope(), page, size).await)
}

pub async fn job_logs(
    state: web::Data<AppState>,
    ctx: TenantContext,
    path: web::Path<i32>,
) -> HttpResponse {
    let id = path.into_inner();
    let result: Result<Vec<JobLog>> = async {
        state
            .storage
            .get_job(ctx.scope(), id)
            .await?
            .ok_or_else(|| EngineError::not_found("job not found"))?;
        state.storage.job_logs(id).await
    }
    .await;
    api_result(result)
}

pub async fn rerun_job(
    req: HttpRequest,
    state: web::Data<AppState>,
    ctx: TenantContext,
    identity: Identity,
    path: web::Path<i32>,
) -> HttpResponse {
    let id = path.into_inner();
    let Some(engine) = state.engine.clone() else {
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "engine not initialized");
    };
    if let Err(e) = engine.rerun_job(id, ctx.scope()).await {
        return error_from_engine(&e);
    }

    audit(
        &state,
        &req,
        &identity,
        AuditRecord::new("RERUN", "job").tenant(ctx.id).target(id),
    )
    .await;
    HttpResponse::Ok().json(json!({ "status": "rerun triggered" }))
}

pub async fn dashboard_stats(state: web::Data<AppState>, ctx: TenantContext) -> HttpResponse {
    api_result(state.storage.dashboard_stats(ctx.scope()).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_normalization() {
        let query = JobsQuery {
            page: Some("abc".into()),
            page_size: Some("500".into()),
        };
        assert_eq!(query.normalized(), (1, 100));

        let query = JobsQuery {
            page: Some("3".into()),
            page_size: None,
        };
        assert_eq!(query.normalized(), (3, 10));
    }
}
