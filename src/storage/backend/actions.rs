use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use tracing::info;

use super::converters::{action_to_active_model, model_to_action};
use super::{Storage, retry};
use crate::errors::{EngineError, Result};
use crate::storage::models::{ActionDefinition, TenantScope};

use migration::entities::action_definition;

impl Storage {
    pub async fn list_actions(&self, scope: TenantScope) -> Result<Vec<ActionDefinition>> {
        let mut query = action_definition::Entity::find().order_by_asc(action_definition::Column::Id);
        if let Some(tenant_id) = scope.tenant_id() {
            query = query.filter(action_definition::Column::TenantId.eq(tenant_id));
        }
        let models = query
            .all(&self.db)
            .await
            .map_err(|e| EngineError::database_operation(format!("查询动作模板失败: {}", e)))?;
        Ok(models.into_iter().map(model_to_action).collect())
    }

    /// 租户内按 ID 查找
    pub async fn get_action(&self, tenant_id: i32, id: i32) -> Result<Option<ActionDefinition>> {
        let model = action_definition::Entity::find_by_id(id)
            .filter(action_definition::Column::TenantId.eq(tenant_id))
            .one(&self.db)
            .await?;
        Ok(model.map(model_to_action))
    }

    pub async fn find_action_by_name(
        &self,
        tenant_id: i32,
        name: &str,
    ) -> Result<Option<ActionDefinition>> {
        let model = action_definition::Entity::find()
            .filter(action_definition::Column::TenantId.eq(tenant_id))
            .filter(action_definition::Column::Name.eq(name))
            .one(&self.db)
            .await?;
        Ok(model.map(model_to_action))
    }

    pub async fn create_action(&self, input: &ActionDefinition) -> Result<ActionDefinition> {
        if input.name.trim().is_empty() {
            return Err(EngineError::validation("action name is required"));
        }
        let now = Utc::now();
        let db = &self.db;
        let model = retry::with_retry(
            &format!("create_action({})", input.name),
            self.retry_config,
            || {
                let active = action_to_active_model(input, now, true);
                async move { active.insert(db).await }
            },
        )
        .await
        .map_err(|e| EngineError::database_operation(format!("创建动作模板失败: {}", e)))?;

        info!("Action definition created: {} ({})", model.name, model.id);
        Ok(model_to_action(model))
    }

    /// 按请求体中的 id 更新，限定在当前租户内
    pub async fn update_action(
        &self,
        tenant_id: i32,
        input: &ActionDefinition,
    ) -> Result<ActionDefinition> {
        if self.get_action(tenant_id, input.id).await?.is_none() {
            return Err(EngineError::not_found("action definition not found"));
        }
        let mut scoped = input.clone();
        scoped.tenant_id = tenant_id;
        let model = action_to_active_model(&scoped, Utc::now(), false)
            .update(&self.db)
            .await
            .map_err(|e| EngineError::database_operation(format!("更新动作模板失败: {}", e)))?;
        Ok(model_to_action(model))
    }
}
