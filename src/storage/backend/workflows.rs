//! 工作流及其 pollers / steps
//!
//! 工作流的基本信息、关联的轮询器和步骤总是一起读写；
//! 创建和更新在同一事务内完成。

use std::collections::HashMap;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseTransaction,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use tracing::{info, warn};

use super::Storage;
use super::converters::{
    model_to_action, model_to_integration, model_to_step, model_to_workflow, step_to_active_model,
};
use crate::errors::{EngineError, Result};
use crate::storage::models::{Severity, TenantScope, Workflow, WorkflowStep};

use migration::entities::{action_definition, integration, workflow, workflow_poller, workflow_step};

fn normalized_severity(value: &str) -> String {
    if value.parse::<Severity>().is_ok() {
        value.to_string()
    } else {
        Severity::Low.to_string()
    }
}

impl Storage {
    /// 补全 pollers 与 steps（steps 按 order 升序，附带动作定义）
    async fn hydrate_workflows<C: ConnectionTrait>(
        &self,
        conn: &C,
        models: Vec<workflow::Model>,
    ) -> Result<Vec<Workflow>> {
        if models.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i32> = models.iter().map(|m| m.id).collect();

        let links = workflow_poller::Entity::find()
            .filter(workflow_poller::Column::WorkflowId.is_in(ids.clone()))
            .all(conn)
            .await?;
        let poller_ids: Vec<i32> = links.iter().map(|l| l.integration_id).collect();
        let pollers: HashMap<i32, integration::Model> = if poller_ids.is_empty() {
            HashMap::new()
        } else {
            integration::Entity::find()
                .filter(integration::Column::Id.is_in(poller_ids))
                .filter(integration::Column::DeletedAt.is_null())
                .all(conn)
                .await?
                .into_iter()
                .map(|m| (m.id, m))
                .collect()
        };

        let steps = workflow_step::Entity::find()
            .filter(workflow_step::Column::WorkflowId.is_in(ids))
            .order_by_asc(workflow_step::Column::StepOrder)
            .order_by_asc(workflow_step::Column::Id)
            .all(conn)
            .await?;
        let action_ids: Vec<i32> = steps.iter().map(|s| s.action_definition_id).collect();
        let actions: HashMap<i32, action_definition::Model> = if action_ids.is_empty() {
            HashMap::new()
        } else {
            action_definition::Entity::find()
                .filter(action_definition::Column::Id.is_in(action_ids))
                .all(conn)
                .await?
                .into_iter()
                .map(|m| (m.id, m))
                .collect()
        };

        let mut result: Vec<Workflow> = models.into_iter().map(model_to_workflow).collect();
        let index: HashMap<i32, usize> = result
            .iter()
            .enumerate()
            .map(|(i, wf)| (wf.id, i))
            .collect();

        for link in links {
            if let (Some(&i), Some(model)) =
                (index.get(&link.workflow_id), pollers.get(&link.integration_id))
            {
                // 嵌在工作流里的 poller 不带凭据
                result[i]
                    .pollers
                    .push(model_to_integration(model.clone(), String::new()));
            }
        }
        for step in steps {
            if let Some(&i) = index.get(&step.workflow_id) {
                let definition = actions
                    .get(&step.action_definition_id)
                    .cloned()
                    .map(model_to_action);
                result[i].steps.push(model_to_step(step, definition));
            }
        }
        for wf in &mut result {
            wf.pollers.sort_by_key(|p| p.id);
        }
        Ok(result)
    }

    pub async fn list_workflows(&self, scope: TenantScope) -> Result<Vec<Workflow>> {
        let mut query = workflow::Entity::find()
            .filter(workflow::Column::DeletedAt.is_null())
            .order_by_asc(workflow::Column::Id);
        if let Some(tenant_id) = scope.tenant_id() {
            query = query.filter(workflow::Column::TenantId.eq(tenant_id));
        }
        let models = query
            .all(&self.db)
            .await
            .map_err(|e| EngineError::database_operation(format!("查询工作流失败: {}", e)))?;
        self.hydrate_workflows(&self.db, models).await
    }

    /// `tenant_id` 为 None 时不限租户
    pub async fn get_workflow(&self, tenant_id: Option<i32>, id: i32) -> Result<Option<Workflow>> {
        let mut query = workflow::Entity::find_by_id(id).filter(workflow::Column::DeletedAt.is_null());
        if let Some(tenant_id) = tenant_id {
            query = query.filter(workflow::Column::TenantId.eq(tenant_id));
        }
        let Some(model) = query.one(&self.db).await? else {
            return Ok(None);
        };
        Ok(self.hydrate_workflows(&self.db, vec![model]).await?.pop())
    }

    pub async fn find_workflow_by_name(
        &self,
        tenant_id: i32,
        name: &str,
    ) -> Result<Option<Workflow>> {
        let model = workflow::Entity::find()
            .filter(workflow::Column::TenantId.eq(tenant_id))
            .filter(workflow::Column::Name.eq(name))
            .filter(workflow::Column::DeletedAt.is_null())
            .one(&self.db)
            .await?;
        match model {
            Some(m) => Ok(self.hydrate_workflows(&self.db, vec![m]).await?.pop()),
            None => Ok(None),
        }
    }

    /// 某个轮询器关联的已启用工作流
    pub async fn workflows_for_poller(
        &self,
        tenant_id: i32,
        poller_id: i32,
    ) -> Result<Vec<Workflow>> {
        let workflow_ids: Vec<i32> = workflow_poller::Entity::find()
            .filter(workflow_poller::Column::IntegrationId.eq(poller_id))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|l| l.workflow_id)
            .collect();
        if workflow_ids.is_empty() {
            return Ok(Vec::new());
        }
        let models = workflow::Entity::find()
            .filter(workflow::Column::Id.is_in(workflow_ids))
            .filter(workflow::Column::TenantId.eq(tenant_id))
            .filter(workflow::Column::Enabled.eq(true))
            .filter(workflow::Column::DeletedAt.is_null())
            .order_by_asc(workflow::Column::Id)
            .all(&self.db)
            .await?;
        self.hydrate_workflows(&self.db, models).await
    }

    pub async fn create_workflow(&self, tenant_id: i32, input: &Workflow) -> Result<Workflow> {
        if input.name.trim().is_empty() {
            return Err(EngineError::validation("workflow name is required"));
        }
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| EngineError::database_operation(format!("开始事务失败: {}", e)))?;

        let result = self.create_workflow_in_txn(&txn, tenant_id, input).await;
        let id = match result {
            Ok(id) => id,
            Err(e) => {
                if let Err(rollback_err) = txn.rollback().await {
                    warn!("Workflow create rollback failed: {}", rollback_err);
                }
                return Err(e);
            }
        };
        txn.commit()
            .await
            .map_err(|e| EngineError::database_operation(format!("提交事务失败: {}", e)))?;

        info!("Workflow created: {} ({})", input.name, id);
        self.get_workflow(Some(tenant_id), id)
            .await?
            .ok_or_else(|| EngineError::not_found("workflow not found"))
    }

    async fn create_workflow_in_txn(
        &self,
        txn: &DatabaseTransaction,
        tenant_id: i32,
        input: &Workflow,
    ) -> Result<i32> {
        let now = Utc::now();
        let model = workflow::ActiveModel {
            created_at: Set(now),
            updated_at: Set(now),
            deleted_at: Set(None),
            tenant_id: Set(tenant_id),
            name: Set(input.name.clone()),
            description: Set(input.description.clone()),
            enabled: Set(input.enabled),
            trigger_type: Set(input.trigger_type.clone()),
            min_severity: Set(normalized_severity(&input.min_severity)),
            ..Default::default()
        }
        .insert(txn)
        .await
        .map_err(|e| EngineError::database_operation(format!("创建工作流失败: {}", e)))?;

        self.replace_pollers(txn, tenant_id, model.id, input).await?;
        self.replace_steps(txn, model.id, &input.steps).await?;
        Ok(model.id)
    }

    /// 更新基本信息，并整体替换 pollers 与 steps
    pub async fn update_workflow(&self, tenant_id: i32, input: &Workflow) -> Result<Workflow> {
        let existing = workflow::Entity::find_by_id(input.id)
            .filter(workflow::Column::TenantId.eq(tenant_id))
            .filter(workflow::Column::DeletedAt.is_null())
            .one(&self.db)
            .await?
            .ok_or_else(|| EngineError::not_found("workflow not found"))?;

        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| EngineError::database_operation(format!("开始事务失败: {}", e)))?;

        if let Err(e) = self.update_workflow_in_txn(&txn, existing, input).await {
            if let Err(rollback_err) = txn.rollback().await {
                warn!("Workflow update rollback failed: {}", rollback_err);
            }
            return Err(e);
        }
        txn.commit()
            .await
            .map_err(|e| EngineError::database_operation(format!("提交事务失败: {}", e)))?;

        self.get_workflow(Some(tenant_id), input.id)
            .await?
            .ok_or_else(|| EngineError::not_found("workflow not found"))
    }

    async fn update_workflow_in_txn(
        &self,
        txn: &DatabaseTransaction,
        existing: workflow::Model,
        input: &Workflow,
    ) -> Result<()> {
        let tenant_id = existing.tenant_id;
        let id = existing.id;
        let mut active: workflow::ActiveModel = existing.into();
        active.name = Set(input.name.clone());
        active.description = Set(input.description.clone());
        active.enabled = Set(input.enabled);
        active.trigger_type = Set(input.trigger_type.clone());
        active.min_severity = Set(normalized_severity(&input.min_severity));
        active.updated_at = Set(Utc::now());
        active
            .update(txn)
            .await
            .map_err(|e| EngineError::database_operation(format!("更新工作流失败: {}", e)))?;

        self.replace_pollers(txn, tenant_id, id, input).await?;
        self.replace_steps(txn, id, &input.steps).await
    }

    /// 只接受同一租户下存在的集成
    async fn replace_pollers(
        &self,
        txn: &DatabaseTransaction,
        tenant_id: i32,
        workflow_id: i32,
        input: &Workflow,
    ) -> Result<()> {
        workflow_poller::Entity::delete_many()
            .filter(workflow_poller::Column::WorkflowId.eq(workflow_id))
            .exec(txn)
            .await?;

        let requested: Vec<i32> = input.pollers.iter().map(|p| p.id).collect();
        if requested.is_empty() {
            return Ok(());
        }
        let mut valid: Vec<i32> = integration::Entity::find()
            .filter(integration::Column::Id.is_in(requested))
            .filter(integration::Column::TenantId.eq(tenant_id))
            .filter(integration::Column::DeletedAt.is_null())
            .all(txn)
            .await?
            .into_iter()
            .map(|m| m.id)
            .collect();
        valid.sort_unstable();
        valid.dedup();
        if valid.is_empty() {
            return Ok(());
        }

        let links = valid.into_iter().map(|integration_id| workflow_poller::ActiveModel {
            workflow_id: Set(workflow_id),
            integration_id: Set(integration_id),
        });
        workflow_poller::Entity::insert_many(links)
            .exec_without_returning(txn)
            .await
            .map_err(|e| EngineError::database_operation(format!("关联轮询器失败: {}", e)))?;
        Ok(())
    }

    async fn replace_steps(
        &self,
        txn: &DatabaseTransaction,
        workflow_id: i32,
        steps: &[WorkflowStep],
    ) -> Result<()> {
        workflow_step::Entity::delete_many()
            .filter(workflow_step::Column::WorkflowId.eq(workflow_id))
            .exec(txn)
            .await?;
        if steps.is_empty() {
            return Ok(());
        }
        let rows = steps.iter().map(|s| step_to_active_model(s, workflow_id));
        workflow_step::Entity::insert_many(rows)
            .exec_without_returning(txn)
            .await
            .map_err(|e| EngineError::database_operation(format!("写入工作流步骤失败: {}", e)))?;
        Ok(())
    }

    /// 软删除
    pub async fn delete_workflow(&self, tenant_id: i32, id: i32) -> Result<()> {
        let existing = workflow::Entity::find_by_id(id)
            .filter(workflow::Column::TenantId.eq(tenant_id))
            .filter(workflow::Column::DeletedAt.is_null())
            .one(&self.db)
            .await?
            .ok_or_else(|| EngineError::not_found("workflow not found"))?;
        let mut active: workflow::ActiveModel = existing.into();
        active.deleted_at = Set(Some(Utc::now()));
        active.update(&self.db).await?;
        info!("Workflow {} archived", id);
        Ok(())
    }

    pub async fn count_steps(&self, workflow_id: i32) -> Result<u64> {
        Ok(workflow_step::Entity::find()
            .filter(workflow_step::Column::WorkflowId.eq(workflow_id))
            .count(&self.db)
            .await?)
    }

    pub async fn add_step(&self, workflow_id: i32, step: &WorkflowStep) -> Result<()> {
        step_to_active_model(step, workflow_id)
            .insert(&self.db)
            .await
            .map_err(|e| EngineError::database_operation(format!("写入工作流步骤失败: {}", e)))?;
        Ok(())
    }

    pub async fn count_active_workflows(&self, scope: TenantScope) -> Result<u64> {
        let mut query = workflow::Entity::find()
            .filter(workflow::Column::Enabled.eq(true))
            .filter(workflow::Column::DeletedAt.is_null());
        if let Some(tenant_id) = scope.tenant_id() {
            query = query.filter(workflow::Column::TenantId.eq(tenant_id));
        }
        Ok(query.count(&self.db).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_severity() {
        assert_eq!(normalized_severity("High"), "High");
        assert_eq!(normalized_severity(""), "Low");
        assert_eq!(normalized_severity("urgent"), "Low");
    }
}
