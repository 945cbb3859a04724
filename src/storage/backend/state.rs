//! 轮询游标与已处理事件

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter,
    sea_query::OnConflict,
};

use super::{Storage, retry};
use crate::errors::{EngineError, Result};
use crate::storage::models::TenantScope;

use migration::entities::{processed_event, state_store};

/// 轮询游标的 key
pub fn poll_cursor_key(tenant_id: i32, integration_id: i32) -> String {
    format!("last_id_t{}_i{}", tenant_id, integration_id)
}

impl Storage {
    pub async fn get_state(&self, key: &str) -> Result<Option<String>> {
        let model = state_store::Entity::find_by_id(key.to_string())
            .one(&self.db)
            .await?;
        Ok(model.map(|m| m.value))
    }

    /// upsert
    pub async fn set_state(&self, key: &str, value: &str) -> Result<()> {
        let db = &self.db;
        retry::with_retry(&format!("set_state({})", key), self.retry_config, || {
            let active = state_store::ActiveModel {
                key: Set(key.to_string()),
                value: Set(value.to_string()),
            };
            async move {
                state_store::Entity::insert(active)
                    .on_conflict(
                        OnConflict::column(state_store::Column::Key)
                            .update_column(state_store::Column::Value)
                            .to_owned(),
                    )
                    .exec_without_returning(db)
                    .await
            }
        })
        .await
        .map_err(|e| EngineError::database_operation(format!("保存状态失败: {}", e)))?;
        Ok(())
    }

    pub async fn record_processed_event(&self, tenant_id: i32, issue_id: &str) -> Result<()> {
        processed_event::ActiveModel {
            created_at: Set(Utc::now()),
            tenant_id: Set(tenant_id),
            authmind_issue_id: Set(issue_id.to_string()),
            ..Default::default()
        }
        .insert(&self.db)
        .await
        .map_err(|e| EngineError::database_operation(format!("记录已处理事件失败: {}", e)))?;
        Ok(())
    }

    pub async fn count_processed_events(&self, scope: TenantScope) -> Result<u64> {
        let mut query = processed_event::Entity::find();
        if let Some(tenant_id) = scope.tenant_id() {
            query = query.filter(processed_event::Column::TenantId.eq(tenant_id));
        }
        Ok(query.count(&self.db).await?)
    }
}
