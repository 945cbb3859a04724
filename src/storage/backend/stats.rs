//! 仪表盘统计

use std::collections::{BTreeMap, HashMap};

use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QuerySelect};

use super::Storage;
use crate::errors::Result;
use crate::storage::models::{AggregateStats, DashboardStats, JobStatus, TenantJobCount, TenantScope};

use migration::entities::{job, workflow};

impl Storage {
    async fn count_jobs(&self, scope: TenantScope, status: Option<JobStatus>) -> Result<u64> {
        let mut query = job::Entity::find();
        if let Some(tenant_id) = scope.tenant_id() {
            query = query.filter(job::Column::TenantId.eq(tenant_id));
        }
        if let Some(status) = status {
            query = query.filter(job::Column::Status.eq(status.to_string()));
        }
        Ok(query.count(&self.db).await?)
    }

    /// 按工作流名称汇总作业数
    async fn workflow_breakdown(&self, scope: TenantScope) -> Result<BTreeMap<String, i64>> {
        let mut query = job::Entity::find()
            .select_only()
            .column(job::Column::WorkflowId)
            .column_as(job::Column::Id.count(), "job_count")
            .group_by(job::Column::WorkflowId);
        if let Some(tenant_id) = scope.tenant_id() {
            query = query.filter(job::Column::TenantId.eq(tenant_id));
        }
        let counts: Vec<(i32, i64)> = query.into_tuple().all(&self.db).await?;
        if counts.is_empty() {
            return Ok(BTreeMap::new());
        }

        let ids: Vec<i32> = counts.iter().map(|(id, _)| *id).collect();
        let names: HashMap<i32, String> = workflow::Entity::find()
            .filter(workflow::Column::Id.is_in(ids))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|m| (m.id, m.name))
            .collect();

        let mut breakdown = BTreeMap::new();
        for (workflow_id, count) in counts {
            // 工作流行被物理删除时只剩作业
            let name = names
                .get(&workflow_id)
                .cloned()
                .unwrap_or_else(|| format!("workflow #{}", workflow_id));
            *breakdown.entry(name).or_insert(0) += count;
        }
        Ok(breakdown)
    }

    pub async fn dashboard_stats(&self, scope: TenantScope) -> Result<DashboardStats> {
        Ok(DashboardStats {
            total_jobs: self.count_jobs(scope, None).await?,
            success_jobs: self.count_jobs(scope, Some(JobStatus::Completed)).await?,
            failed_jobs: self.count_jobs(scope, Some(JobStatus::Failed)).await?,
            running_jobs: self.count_jobs(scope, Some(JobStatus::Running)).await?,
            active_workflows: self.count_active_workflows(scope).await?,
            workflow_breakdown: self.workflow_breakdown(scope).await?,
            processed_events: self.count_processed_events(scope).await?,
        })
    }

    /// 跨租户汇总
    pub async fn aggregate_stats(&self) -> Result<AggregateStats> {
        let scope = TenantScope::All;
        let per_tenant: HashMap<i32, i64> = job::Entity::find()
            .select_only()
            .column(job::Column::TenantId)
            .column_as(job::Column::Id.count(), "job_count")
            .group_by(job::Column::TenantId)
            .into_tuple::<(i32, i64)>()
            .all(&self.db)
            .await?
            .into_iter()
            .collect();

        let tenants = self.list_tenants().await?;
        let tenant_breakdown = tenants
            .iter()
            .map(|t| TenantJobCount {
                tenant_id: t.id,
                tenant_name: t.name.clone(),
                job_count: per_tenant.get(&t.id).copied().unwrap_or(0),
            })
            .collect();

        Ok(AggregateStats {
            total_jobs: self.count_jobs(scope, None).await?,
            success_jobs: self.count_jobs(scope, Some(JobStatus::Completed)).await?,
            failed_jobs: self.count_jobs(scope, Some(JobStatus::Failed)).await?,
            running_jobs: self.count_jobs(scope, Some(JobStatus::Running)).await?,
            total_tenants: tenants.len() as u64,
            active_workflows: self.count_active_workflows(scope).await?,
            tenant_breakdown,
        })
    }
}
