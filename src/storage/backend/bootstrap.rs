//! 从默认租户克隆配置到新租户
//!
//! 集成与工作流克隆后均为禁用状态，动作与步骤中的 ID 重新映射到新租户。
//! 新租户已有同名资源时复用，不重复创建。

use std::collections::HashMap;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::{NotSet, Set}, ColumnTrait, DatabaseTransaction, EntityTrait,
    QueryFilter, QueryOrder, TransactionTrait,
};
use tracing::{info, warn};

use super::Storage;
use super::integrations::POLLER_MARKER;
use crate::errors::{EngineError, Result};
use crate::storage::models::DEFAULT_TENANT_ID;

use migration::entities::{action_definition, integration, workflow, workflow_poller, workflow_step};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BootstrapReport {
    pub integrations: usize,
    pub actions: usize,
    pub workflows: usize,
}

impl Storage {
    pub async fn bootstrap_tenant(&self, tenant_id: i32) -> Result<BootstrapReport> {
        if tenant_id <= 0 {
            return Err(EngineError::validation("invalid tenant id"));
        }
        if tenant_id == DEFAULT_TENANT_ID {
            return Err(EngineError::validation(
                "the default tenant is the bootstrap source",
            ));
        }
        if self.get_tenant(tenant_id).await?.is_none() {
            return Err(EngineError::not_found("tenant not found"));
        }

        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| EngineError::database_operation(format!("开始事务失败: {}", e)))?;

        let report = match self.bootstrap_in_txn(&txn, tenant_id).await {
            Ok(report) => report,
            Err(e) => {
                if let Err(rollback_err) = txn.rollback().await {
                    warn!("Bootstrap rollback failed: {}", rollback_err);
                }
                return Err(e);
            }
        };
        txn.commit()
            .await
            .map_err(|e| EngineError::database_operation(format!("提交事务失败: {}", e)))?;

        info!(
            "Tenant {} bootstrapped: {} integrations, {} actions, {} workflows",
            tenant_id, report.integrations, report.actions, report.workflows
        );
        Ok(report)
    }

    async fn bootstrap_in_txn(
        &self,
        txn: &DatabaseTransaction,
        tenant_id: i32,
    ) -> Result<BootstrapReport> {
        let mut report = BootstrapReport::default();
        let now = Utc::now();

        // 1. 集成
        let seeds = integration::Entity::find()
            .filter(integration::Column::TenantId.eq(DEFAULT_TENANT_ID))
            .filter(integration::Column::DeletedAt.is_null())
            .order_by_asc(integration::Column::Id)
            .all(txn)
            .await
            .map_err(|e| EngineError::database_operation(format!("读取模板集成失败: {}", e)))?;

        let mut integration_map: HashMap<i32, i32> = HashMap::new();
        for seed in seeds {
            let existing = integration::Entity::find()
                .filter(integration::Column::TenantId.eq(tenant_id))
                .filter(integration::Column::Name.eq(seed.name.as_str()))
                .filter(integration::Column::DeletedAt.is_null())
                .one(txn)
                .await?;
            if let Some(existing) = existing {
                integration_map.insert(seed.id, existing.id);
                continue;
            }
            let seed_id = seed.id;
            let name = seed.name.clone();
            let mut active: integration::ActiveModel = seed.into();
            active.id = NotSet;
            active.tenant_id = Set(tenant_id);
            active.enabled = Set(false);
            active.created_at = Set(now);
            active.updated_at = Set(now);
            active.oauth_token = Set(String::new());
            active.oauth_expires_at = Set(None);
            active.consecutive_failures = Set(0);
            active.is_available = Set(true);
            let created = active.insert(txn).await.map_err(|e| {
                EngineError::database_operation(format!("failed to clone integration {}: {}", name, e))
            })?;
            integration_map.insert(seed_id, created.id);
            report.integrations += 1;
        }

        // 2. 动作
        let actions = action_definition::Entity::find()
            .filter(action_definition::Column::TenantId.eq(DEFAULT_TENANT_ID))
            .order_by_asc(action_definition::Column::Id)
            .all(txn)
            .await
            .map_err(|e| EngineError::database_operation(format!("读取模板动作失败: {}", e)))?;

        let mut action_map: HashMap<i32, i32> = HashMap::new();
        let mut action_names: HashMap<i32, String> = HashMap::new();
        for seed in actions {
            action_names.insert(seed.id, seed.name.clone());
            let existing = action_definition::Entity::find()
                .filter(action_definition::Column::TenantId.eq(tenant_id))
                .filter(action_definition::Column::Name.eq(seed.name.as_str()))
                .one(txn)
                .await?;
            if let Some(existing) = existing {
                action_map.insert(seed.id, existing.id);
                continue;
            }

            let integration_id = match integration_map.get(&seed.integration_id) {
                Some(id) => *id,
                // 按厂商名回退查找
                None => integration::Entity::find()
                    .filter(integration::Column::TenantId.eq(tenant_id))
                    .filter(integration::Column::Name.eq(seed.vendor.as_str()))
                    .filter(integration::Column::DeletedAt.is_null())
                    .one(txn)
                    .await?
                    .map(|m| m.id)
                    .unwrap_or(seed.integration_id),
            };

            let seed_id = seed.id;
            let name = seed.name.clone();
            let mut active: action_definition::ActiveModel = seed.into();
            active.id = NotSet;
            active.tenant_id = Set(tenant_id);
            active.integration_id = Set(integration_id);
            active.created_at = Set(now);
            active.updated_at = Set(now);
            let created = active.insert(txn).await.map_err(|e| {
                EngineError::database_operation(format!("failed to clone action {}: {}", name, e))
            })?;
            action_map.insert(seed_id, created.id);
            report.actions += 1;
        }

        // 3. 工作流与步骤
        let workflows = workflow::Entity::find()
            .filter(workflow::Column::TenantId.eq(DEFAULT_TENANT_ID))
            .filter(workflow::Column::DeletedAt.is_null())
            .order_by_asc(workflow::Column::Id)
            .all(txn)
            .await
            .map_err(|e| EngineError::database_operation(format!("读取模板工作流失败: {}", e)))?;

        let new_pollers: Vec<i32> = integration::Entity::find()
            .filter(integration::Column::TenantId.eq(tenant_id))
            .filter(integration::Column::Name.contains(POLLER_MARKER))
            .filter(integration::Column::DeletedAt.is_null())
            .all(txn)
            .await?
            .into_iter()
            .map(|m| m.id)
            .collect();

        for seed in workflows {
            let exists = workflow::Entity::find()
                .filter(workflow::Column::TenantId.eq(tenant_id))
                .filter(workflow::Column::Name.eq(seed.name.as_str()))
                .filter(workflow::Column::DeletedAt.is_null())
                .one(txn)
                .await?
                .is_some();
            if exists {
                continue;
            }

            let seed_id = seed.id;
            let name = seed.name.clone();
            let mut active: workflow::ActiveModel = seed.into();
            active.id = NotSet;
            active.tenant_id = Set(tenant_id);
            active.enabled = Set(false);
            active.created_at = Set(now);
            active.updated_at = Set(now);
            let created = active.insert(txn).await.map_err(|e| {
                EngineError::database_operation(format!("failed to clone workflow {}: {}", name, e))
            })?;

            if !new_pollers.is_empty() {
                let links = new_pollers.iter().map(|integration_id| workflow_poller::ActiveModel {
                    workflow_id: Set(created.id),
                    integration_id: Set(*integration_id),
                });
                workflow_poller::Entity::insert_many(links)
                    .exec_without_returning(txn)
                    .await?;
            }

            let steps = workflow_step::Entity::find()
                .filter(workflow_step::Column::WorkflowId.eq(seed_id))
                .order_by_asc(workflow_step::Column::StepOrder)
                .all(txn)
                .await?;
            for step in steps {
                let action_id = match action_map.get(&step.action_definition_id) {
                    Some(id) => *id,
                    // 按动作名回退查找
                    None => match action_names.get(&step.action_definition_id) {
                        Some(action_name) => action_definition::Entity::find()
                            .filter(action_definition::Column::TenantId.eq(tenant_id))
                            .filter(action_definition::Column::Name.eq(action_name.as_str()))
                            .one(txn)
                            .await?
                            .map(|m| m.id)
                            .unwrap_or(step.action_definition_id),
                        None => step.action_definition_id,
                    },
                };
                workflow_step::ActiveModel {
                    id: NotSet,
                    workflow_id: Set(created.id),
                    step_order: Set(step.step_order),
                    action_definition_id: Set(action_id),
                    parameter_mapping: Set(step.parameter_mapping.clone()),
                }
                .insert(txn)
                .await
                .map_err(|e| {
                    EngineError::database_operation(format!("failed to clone workflow step: {}", e))
                })?;
            }
            report.workflows += 1;
        }

        Ok(report)
    }
}
