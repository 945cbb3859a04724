//! 作业与作业日志

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, sea_query::Expr,
};
use tracing::{info, warn};

use super::converters::{model_to_job, model_to_job_log, model_to_workflow};
use super::{Storage, is_unique_violation, retry};
use crate::errors::{EngineError, Result};
use crate::storage::models::{Job, JobLog, JobPage, JobStatus, LogLevel, TenantScope};

use migration::entities::{job, job_log, workflow};

pub const DEFAULT_PAGE_SIZE: u64 = 10;
pub const MAX_PAGE_SIZE: u64 = 100;

/// 规范化分页参数：page 从 1 开始，page_size 落在 [1, 100]
pub fn normalize_page(page: Option<i64>, page_size: Option<i64>) -> (u64, u64) {
    let page = page.filter(|p| *p >= 1).unwrap_or(1) as u64;
    let size = page_size
        .filter(|s| *s >= 1)
        .map(|s| (s as u64).min(MAX_PAGE_SIZE))
        .unwrap_or(DEFAULT_PAGE_SIZE);
    (page, size)
}

/// 新作业
#[derive(Debug, Clone)]
pub struct NewJob {
    pub tenant_id: i32,
    pub workflow_id: i32,
    pub authmind_issue_id: String,
    pub status: JobStatus,
    pub trigger_context: String,
}

impl Storage {
    pub async fn job_exists(&self, tenant_id: i32, workflow_id: i32, issue_id: &str) -> Result<bool> {
        let count = job::Entity::find()
            .filter(job::Column::TenantId.eq(tenant_id))
            .filter(job::Column::WorkflowId.eq(workflow_id))
            .filter(job::Column::AuthmindIssueId.eq(issue_id))
            .count(&self.db)
            .await?;
        Ok(count > 0)
    }

    /// (workflow_id, authmind_issue_id) 冲突时返回 Conflict
    pub async fn create_job(&self, input: &NewJob) -> Result<Job> {
        let db = &self.db;
        let model = retry::with_retry(
            &format!("create_job({})", input.authmind_issue_id),
            self.retry_config,
            || {
                let active = job::ActiveModel {
                    created_at: Set(Utc::now()),
                    tenant_id: Set(input.tenant_id),
                    workflow_id: Set(input.workflow_id),
                    status: Set(input.status.to_string()),
                    authmind_issue_id: Set(input.authmind_issue_id.clone()),
                    trigger_context: Set(input.trigger_context.clone()),
                    ..Default::default()
                };
                async move { active.insert(db).await }
            },
        )
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                EngineError::conflict(format!(
                    "job for workflow {} and issue {} already exists",
                    input.workflow_id, input.authmind_issue_id
                ))
            } else {
                EngineError::database_operation(format!("创建作业失败: {}", e))
            }
        })?;
        Ok(model_to_job(model))
    }

    pub async fn set_job_status(&self, job_id: i32, status: JobStatus) -> Result<()> {
        let db = &self.db;
        retry::with_retry(
            &format!("set_job_status({})", job_id),
            self.retry_config,
            || async {
                job::Entity::update_many()
                    .col_expr(job::Column::Status, Expr::value(status.to_string()))
                    .filter(job::Column::Id.eq(job_id))
                    .exec(db)
                    .await
            },
        )
        .await
        .map_err(|e| EngineError::database_operation(format!("更新作业状态失败: {}", e)))?;
        Ok(())
    }

    /// 上次进程退出时仍在运行的作业标记为失败
    pub async fn fail_stale_running_jobs(&self) -> Result<u64> {
        let result = job::Entity::update_many()
            .col_expr(job::Column::Status, Expr::value(JobStatus::Failed.to_string()))
            .filter(job::Column::Status.eq(JobStatus::Running.to_string()))
            .exec(&self.db)
            .await?;
        if result.rows_affected > 0 {
            info!("Marked {} stale jobs as failed", result.rows_affected);
        }
        Ok(result.rows_affected)
    }

    pub async fn get_job(&self, scope: TenantScope, id: i32) -> Result<Option<Job>> {
        let mut query = job::Entity::find_by_id(id);
        if let Some(tenant_id) = scope.tenant_id() {
            query = query.filter(job::Column::TenantId.eq(tenant_id));
        }
        Ok(query.one(&self.db).await?.map(model_to_job))
    }

    /// 分页列出作业，新的在前；附带工作流基本信息
    pub async fn list_jobs(&self, scope: TenantScope, page: u64, page_size: u64) -> Result<JobPage> {
        let mut query = job::Entity::find();
        if let Some(tenant_id) = scope.tenant_id() {
            query = query.filter(job::Column::TenantId.eq(tenant_id));
        }
        let total = query.clone().count(&self.db).await?;
        // 超大页码不能溢出，后端 OFFSET 按有符号 64 位处理
        let offset = (page - 1).saturating_mul(page_size).min(i64::MAX as u64);
        let models = query
            .order_by_desc(job::Column::CreatedAt)
            .order_by_desc(job::Column::Id)
            .offset(offset)
            .limit(page_size)
            .all(&self.db)
            .await
            .map_err(|e| EngineError::database_operation(format!("查询作业失败: {}", e)))?;

        let workflow_ids: Vec<i32> = models.iter().map(|m| m.workflow_id).collect();
        let workflows: HashMap<i32, workflow::Model> = if workflow_ids.is_empty() {
            HashMap::new()
        } else {
            // 已归档的工作流也要显示在历史记录里
            workflow::Entity::find()
                .filter(workflow::Column::Id.is_in(workflow_ids))
                .all(&self.db)
                .await?
                .into_iter()
                .map(|m| (m.id, m))
                .collect()
        };

        let data = models
            .into_iter()
            .map(|m| {
                let wf = workflows.get(&m.workflow_id).cloned().map(model_to_workflow);
                let mut job = model_to_job(m);
                job.workflow = wf;
                job
            })
            .collect();

        Ok(JobPage {
            data,
            total,
            page,
            page_size,
        })
    }

    pub async fn append_job_log(&self, job_id: i32, level: LogLevel, message: &str) -> Result<()> {
        let db = &self.db;
        let result = retry::with_retry(
            &format!("append_job_log({})", job_id),
            self.retry_config,
            || {
                let active = job_log::ActiveModel {
                    job_id: Set(job_id),
                    timestamp: Set(Utc::now()),
                    level: Set(level.to_string()),
                    message: Set(message.to_string()),
                    ..Default::default()
                };
                async move { active.insert(db).await }
            },
        )
        .await;
        if let Err(e) = result {
            warn!("Failed to persist log for job {}: {}", job_id, e);
            return Err(EngineError::database_operation(format!(
                "写入作业日志失败: {}",
                e
            )));
        }
        Ok(())
    }

    pub async fn job_logs(&self, job_id: i32) -> Result<Vec<JobLog>> {
        let models = job_log::Entity::find()
            .filter(job_log::Column::JobId.eq(job_id))
            .order_by_asc(job_log::Column::Timestamp)
            .order_by_asc(job_log::Column::Id)
            .all(&self.db)
            .await?;
        Ok(models.into_iter().map(model_to_job_log).collect())
    }

    /// 删除截止时间之前的作业及其日志，返回删除的作业数
    pub async fn purge_jobs_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let old_ids: Vec<i32> = job::Entity::find()
            .select_only()
            .column(job::Column::Id)
            .filter(job::Column::CreatedAt.lt(cutoff))
            .into_tuple::<i32>()
            .all(&self.db)
            .await?;
        if old_ids.is_empty() {
            return Ok(0);
        }
        for chunk in old_ids.chunks(500) {
            job_log::Entity::delete_many()
                .filter(job_log::Column::JobId.is_in(chunk.to_vec()))
                .exec(&self.db)
                .await?;
        }
        let result = job::Entity::delete_many()
            .filter(job::Column::CreatedAt.lt(cutoff))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }

    /// 回收 SQLite 文件空间；其他后端无操作
    pub async fn vacuum(&self) -> Result<()> {
        if self.backend_name != "sqlite" {
            return Ok(());
        }
        self.db
            .execute_unprepared("VACUUM")
            .await
            .map_err(|e| EngineError::database_operation(format!("VACUUM 失败: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_page() {
        assert_eq!(normalize_page(None, None), (1, 10));
        assert_eq!(normalize_page(Some(0), Some(0)), (1, 10));
        assert_eq!(normalize_page(Some(3), Some(25)), (3, 25));
        assert_eq!(normalize_page(Some(2), Some(1000)), (2, 100));
        assert_eq!(normalize_page(Some(-4), Some(-1)), (1, 10));
    }
}
