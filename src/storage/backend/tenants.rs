//! 租户读写，api_key 加密存储

use std::collections::HashMap;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder,
};
use tracing::info;

use super::converters::model_to_tenant;
use super::{Storage, is_unique_violation, retry};
use crate::errors::{EngineError, Result};
use crate::storage::models::{Tenant, TenantRef};

use migration::entities::tenant;

/// 空字符串视为未设置
fn normalize_api_key(api_key: &Option<String>) -> Option<String> {
    api_key
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
}

impl Storage {
    fn tenant_from_model(&self, model: tenant::Model) -> Tenant {
        let api_key = model
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .map(|k| self.decrypt_secret(k, &format!("api_key of tenant {}", model.id)));
        model_to_tenant(model, api_key)
    }

    fn encrypted_api_key(&self, api_key: &Option<String>) -> Result<Option<String>> {
        normalize_api_key(api_key)
            .map(|k| self.encrypt_secret(&k))
            .transpose()
    }

    pub async fn list_tenants(&self) -> Result<Vec<Tenant>> {
        let models = tenant::Entity::find()
            .filter(tenant::Column::DeletedAt.is_null())
            .order_by_asc(tenant::Column::Id)
            .all(&self.db)
            .await
            .map_err(|e| EngineError::database_operation(format!("查询租户失败: {}", e)))?;
        Ok(models
            .into_iter()
            .map(|m| self.tenant_from_model(m))
            .collect())
    }

    /// 按 ID 批量取租户摘要，已删除的租户不返回
    pub async fn tenant_refs(&self, ids: Vec<i32>) -> Result<HashMap<i32, TenantRef>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let models = tenant::Entity::find()
            .filter(tenant::Column::Id.is_in(ids))
            .filter(tenant::Column::DeletedAt.is_null())
            .all(&self.db)
            .await?;
        Ok(models
            .into_iter()
            .map(|m| {
                let tref = TenantRef {
                    id: m.id,
                    name: m.name,
                    description: m.description,
                };
                (tref.id, tref)
            })
            .collect())
    }

    pub async fn get_tenant(&self, id: i32) -> Result<Option<Tenant>> {
        let model = tenant::Entity::find_by_id(id)
            .filter(tenant::Column::DeletedAt.is_null())
            .one(&self.db)
            .await?;
        Ok(model.map(|m| self.tenant_from_model(m)))
    }

    pub async fn find_tenant_by_name(&self, name: &str) -> Result<Option<Tenant>> {
        let model = tenant::Entity::find()
            .filter(tenant::Column::Name.eq(name))
            .filter(tenant::Column::DeletedAt.is_null())
            .one(&self.db)
            .await?;
        Ok(model.map(|m| self.tenant_from_model(m)))
    }

    pub async fn create_tenant(&self, input: &Tenant) -> Result<Tenant> {
        if input.name.trim().is_empty() {
            return Err(EngineError::validation("tenant name is required"));
        }
        let now = Utc::now();
        let api_key = self.encrypted_api_key(&input.api_key)?;
        let db = &self.db;

        let model = retry::with_retry(
            &format!("create_tenant({})", input.name),
            self.retry_config,
            || {
                let active = tenant::ActiveModel {
                    created_at: Set(now),
                    updated_at: Set(now),
                    deleted_at: Set(None),
                    name: Set(input.name.clone()),
                    description: Set(input.description.clone()),
                    api_key: Set(api_key.clone()),
                    ..Default::default()
                };
                async move { active.insert(db).await }
            },
        )
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                EngineError::conflict(format!("tenant {} already exists", input.name))
            } else {
                EngineError::database_operation(format!("创建租户失败: {}", e))
            }
        })?;

        info!("Tenant created: {} ({})", model.name, model.id);
        Ok(self.tenant_from_model(model))
    }

    pub async fn update_tenant(&self, id: i32, input: &Tenant) -> Result<Tenant> {
        let existing = tenant::Entity::find_by_id(id)
            .filter(tenant::Column::DeletedAt.is_null())
            .one(&self.db)
            .await?
            .ok_or_else(|| EngineError::not_found("tenant not found"))?;

        let mut active: tenant::ActiveModel = existing.into();
        active.name = Set(input.name.clone());
        active.description = Set(input.description.clone());
        active.api_key = Set(self.encrypted_api_key(&input.api_key)?);
        active.updated_at = Set(Utc::now());

        let model = active.update(&self.db).await.map_err(|e| {
            if is_unique_violation(&e) {
                EngineError::conflict(format!("tenant {} already exists", input.name))
            } else {
                EngineError::database_operation(format!("更新租户失败: {}", e))
            }
        })?;
        Ok(self.tenant_from_model(model))
    }

    /// 软删除
    pub async fn delete_tenant(&self, id: i32) -> Result<()> {
        let existing = tenant::Entity::find_by_id(id)
            .filter(tenant::Column::DeletedAt.is_null())
            .one(&self.db)
            .await?
            .ok_or_else(|| EngineError::not_found("tenant not found"))?;

        let mut active: tenant::ActiveModel = existing.into();
        active.deleted_at = Set(Some(Utc::now()));
        active.update(&self.db).await?;
        info!("Tenant {} archived", id);
        Ok(())
    }

    /// 按名称查找，不存在则创建
    pub async fn find_or_create_tenant(&self, input: &Tenant) -> Result<Tenant> {
        if let Some(existing) = self.find_tenant_by_name(&input.name).await? {
            return Ok(existing);
        }
        self.create_tenant(input).await
    }

    pub async fn count_tenants(&self) -> Result<u64> {
        Ok(tenant::Entity::find()
            .filter(tenant::Column::DeletedAt.is_null())
            .count(&self.db)
            .await?)
    }
}
