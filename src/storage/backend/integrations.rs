//! 集成读写、熔断状态与 OAuth 令牌缓存

use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseTransaction, EntityTrait, ExprTrait,
    PaginatorTrait, QueryFilter, QueryOrder, TransactionTrait, sea_query::Expr,
};
use serde_json::Value;
use tracing::{info, warn};

use super::converters::{action_to_active_model, integration_to_active_model, model_to_integration};
use super::{Storage, is_unique_violation, retry};
use crate::errors::{EngineError, Result};
use crate::security::merge_redacted;
use crate::storage::models::{ActionDefinition, Integration, TenantScope};

use migration::entities::integration;

pub const DEFAULT_POLLER_NAME: &str = "AuthMind Poller";
pub(crate) const POLLER_MARKER: &str = "AuthMind";

/// 熔断计数更新后的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitUpdate {
    pub consecutive_failures: i32,
    /// 本次更新是否刚刚触发熔断
    pub tripped: bool,
}

/// 新租户默认的 AuthMind 轮询器（禁用状态，等待填写真实地址与令牌）
pub fn default_poller(tenant_id: i32) -> Integration {
    Integration {
        tenant_id,
        name: DEFAULT_POLLER_NAME.to_string(),
        integration_type: "REST".to_string(),
        base_url: "https://<tenant-id>.authmind.com/amapi/v1".to_string(),
        auth_type: "bearer".to_string(),
        credentials: r#"{"token": "placeholder"}"#.to_string(),
        polling_interval: 60,
        enabled: false,
        ..Default::default()
    }
}

/// 两份凭据是否不同；都是 JSON 时按值比较，忽略格式差异
fn credentials_changed(a: &str, b: &str) -> bool {
    match (
        serde_json::from_str::<Value>(a),
        serde_json::from_str::<Value>(b),
    ) {
        (Ok(x), Ok(y)) => x != y,
        _ => a != b,
    }
}

impl Storage {
    fn integration_from_model(&self, model: integration::Model) -> Integration {
        let credentials = if model.credentials.is_empty() {
            String::new()
        } else {
            self.decrypt_secret(
                &model.credentials,
                &format!("credentials of integration {}", model.id),
            )
        };
        model_to_integration(model, credentials)
    }

    async fn find_integration_model(
        &self,
        tenant_id: Option<i32>,
        id: i32,
    ) -> Result<Option<integration::Model>> {
        let mut query = integration::Entity::find_by_id(id)
            .filter(integration::Column::DeletedAt.is_null());
        if let Some(tenant_id) = tenant_id {
            query = query.filter(integration::Column::TenantId.eq(tenant_id));
        }
        Ok(query.one(&self.db).await?)
    }

    pub async fn list_integrations(&self, scope: TenantScope) -> Result<Vec<Integration>> {
        let mut query = integration::Entity::find()
            .filter(integration::Column::DeletedAt.is_null())
            .order_by_asc(integration::Column::Id);
        if let Some(tenant_id) = scope.tenant_id() {
            query = query.filter(integration::Column::TenantId.eq(tenant_id));
        }
        let models = query
            .all(&self.db)
            .await
            .map_err(|e| EngineError::database_operation(format!("查询集成失败: {}", e)))?;

        let tenant_ids: Vec<i32> = models.iter().map(|m| m.tenant_id).collect();
        let tenants = self.tenant_refs(tenant_ids).await?;
        Ok(models
            .into_iter()
            .map(|m| {
                let mut integ = self.integration_from_model(m);
                integ.tenant = tenants.get(&integ.tenant_id).cloned();
                integ
            })
            .collect())
    }

    /// 租户内按 ID 查找
    pub async fn get_integration(&self, tenant_id: i32, id: i32) -> Result<Option<Integration>> {
        let model = self.find_integration_model(Some(tenant_id), id).await?;
        Ok(model.map(|m| self.integration_from_model(m)))
    }

    /// 不限租户（熔断与令牌刷新按 ID 操作）
    pub async fn get_integration_any(&self, id: i32) -> Result<Option<Integration>> {
        let model = self.find_integration_model(None, id).await?;
        Ok(model.map(|m| self.integration_from_model(m)))
    }

    pub async fn find_integration_by_name(
        &self,
        tenant_id: i32,
        name: &str,
    ) -> Result<Option<Integration>> {
        let model = integration::Entity::find()
            .filter(integration::Column::TenantId.eq(tenant_id))
            .filter(integration::Column::Name.eq(name))
            .filter(integration::Column::DeletedAt.is_null())
            .one(&self.db)
            .await?;
        Ok(model.map(|m| self.integration_from_model(m)))
    }

    pub async fn create_integration(&self, input: &Integration) -> Result<Integration> {
        if input.name.trim().is_empty() {
            return Err(EngineError::validation("integration name is required"));
        }
        let encrypted = self.encrypt_secret(&input.credentials)?;
        let now = Utc::now();
        let db = &self.db;

        let model = retry::with_retry(
            &format!("create_integration({})", input.name),
            self.retry_config,
            || {
                let active = integration_to_active_model(input, encrypted.clone(), now);
                async move { active.insert(db).await }
            },
        )
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                EngineError::conflict(format!("integration {} already exists", input.name))
            } else {
                EngineError::database_operation(format!("创建集成失败: {}", e))
            }
        })?;

        info!(
            "Integration created: {} (tenant {}, id {})",
            model.name, model.tenant_id, model.id
        );
        Ok(self.integration_from_model(model))
    }

    /// 租户还没有任何 AuthMind 轮询器时补一个默认的
    pub async fn ensure_default_poller(&self, tenant_id: i32) -> Result<Option<Integration>> {
        let pollers = integration::Entity::find()
            .filter(integration::Column::TenantId.eq(tenant_id))
            .filter(integration::Column::DeletedAt.is_null())
            .filter(integration::Column::Name.contains(POLLER_MARKER))
            .count(&self.db)
            .await?;
        if pollers > 0 {
            return Ok(None);
        }
        let created = self.create_integration(&default_poller(tenant_id)).await?;
        info!("Default AuthMind poller added for tenant {}", tenant_id);
        Ok(Some(created))
    }

    /// 更新集成配置
    ///
    /// 熔断字段不受请求影响；回传的打码凭据会与已存储值合并，
    /// 凭据实际变化时记录轮换时间并清空 OAuth 令牌缓存。
    pub async fn update_integration(
        &self,
        tenant_id: i32,
        input: &Integration,
    ) -> Result<Integration> {
        let existing = self
            .find_integration_model(Some(tenant_id), input.id)
            .await?
            .ok_or_else(|| EngineError::not_found("integration not found"))?;

        let stored_plain = self.decrypt_secret(
            &existing.credentials,
            &format!("credentials of integration {}", existing.id),
        );
        let merged = merge_redacted(&input.credentials, &stored_plain);
        let rotated = credentials_changed(&merged, &stored_plain);
        let now = Utc::now();

        let mut active: integration::ActiveModel = existing.into();
        active.name = Set(input.name.clone());
        active.integration_type = Set(input.integration_type.clone());
        active.base_url = Set(input.base_url.clone());
        active.auth_type = Set(input.auth_type.clone());
        active.enabled = Set(input.enabled);
        active.polling_interval = Set(input.polling_interval);
        active.rate_limit = Set(input.rate_limit);
        active.token_endpoint = Set(input.token_endpoint.clone());
        active.rotation_interval_days = Set(input.rotation_interval_days);
        active.updated_at = Set(now);
        if rotated {
            active.credentials = Set(self.encrypt_secret(&merged)?);
            active.last_rotated_at = Set(Some(now));
            active.oauth_token = Set(String::new());
            active.oauth_expires_at = Set(None);
        }

        let model = active.update(&self.db).await.map_err(|e| {
            if is_unique_violation(&e) {
                EngineError::conflict(format!("integration {} already exists", input.name))
            } else {
                EngineError::database_operation(format!("更新集成失败: {}", e))
            }
        })?;

        if rotated {
            info!("Credentials rotated for integration {}", model.id);
        }
        Ok(self.integration_from_model(model))
    }

    /// 手动复位熔断
    pub async fn reset_circuit(&self, tenant_id: i32, id: i32) -> Result<Integration> {
        let existing = self
            .find_integration_model(Some(tenant_id), id)
            .await?
            .ok_or_else(|| EngineError::not_found("integration not found"))?;
        let mut active: integration::ActiveModel = existing.into();
        active.consecutive_failures = Set(0);
        active.is_available = Set(true);
        active.updated_at = Set(Utc::now());
        let model = active.update(&self.db).await?;
        info!("Circuit breaker reset for integration {}", id);
        Ok(self.integration_from_model(model))
    }

    /// 失败计数 +1，达到阈值时标记为不可用
    pub async fn record_integration_failure(
        &self,
        id: i32,
        threshold: i32,
    ) -> Result<CircuitUpdate> {
        let db = &self.db;
        retry::with_retry(
            &format!("record_integration_failure({})", id),
            self.retry_config,
            || async {
                integration::Entity::update_many()
                    .col_expr(
                        integration::Column::ConsecutiveFailures,
                        Expr::col(integration::Column::ConsecutiveFailures).add(1),
                    )
                    .filter(integration::Column::Id.eq(id))
                    .exec(db)
                    .await
            },
        )
        .await?;

        let updated = integration::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("integration {} not found", id)))?;

        let mut tripped = false;
        if updated.consecutive_failures >= threshold && updated.is_available {
            warn!(
                "Circuit breaker tripped: integration {} disabled after {} failures",
                updated.name, updated.consecutive_failures
            );
            integration::Entity::update_many()
                .col_expr(integration::Column::IsAvailable, Expr::value(false))
                .filter(integration::Column::Id.eq(id))
                .exec(&self.db)
                .await?;
            tripped = true;
        }

        Ok(CircuitUpdate {
            consecutive_failures: updated.consecutive_failures,
            tripped,
        })
    }

    /// 成功后清零失败计数
    pub async fn record_integration_success(&self, integ: &Integration) -> Result<()> {
        if integ.consecutive_failures == 0 && integ.is_available {
            return Ok(());
        }
        integration::Entity::update_many()
            .col_expr(integration::Column::ConsecutiveFailures, Expr::value(0))
            .col_expr(integration::Column::IsAvailable, Expr::value(true))
            .filter(integration::Column::Id.eq(integ.id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    pub async fn save_oauth_token(
        &self,
        id: i32,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        integration::Entity::update_many()
            .col_expr(integration::Column::OauthToken, Expr::value(token))
            .col_expr(integration::Column::OauthExpiresAt, Expr::value(expires_at))
            .filter(integration::Column::Id.eq(id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    /// 租户下启用的 AuthMind 轮询器
    pub async fn list_enabled_pollers(&self, tenant_id: i32) -> Result<Vec<Integration>> {
        let models = integration::Entity::find()
            .filter(integration::Column::TenantId.eq(tenant_id))
            .filter(integration::Column::Enabled.eq(true))
            .filter(integration::Column::DeletedAt.is_null())
            .filter(integration::Column::Name.contains(POLLER_MARKER))
            .order_by_asc(integration::Column::Id)
            .all(&self.db)
            .await?;
        Ok(models
            .into_iter()
            .map(|m| self.integration_from_model(m))
            .collect())
    }

    /// 超过轮换周期仍未轮换凭据的集成
    pub async fn integrations_due_for_rotation(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Integration>> {
        let models = integration::Entity::find()
            .filter(integration::Column::DeletedAt.is_null())
            .filter(integration::Column::RotationIntervalDays.gt(0))
            .all(&self.db)
            .await?;
        Ok(models
            .into_iter()
            .filter(|m| {
                let since = m.last_rotated_at.unwrap_or(m.created_at);
                now - since >= Duration::days(m.rotation_interval_days as i64)
            })
            .map(|m| self.integration_from_model(m))
            .collect())
    }

    /// 事务内批量导入集成与动作，任一失败整体回滚
    pub async fn import_configuration(
        &self,
        tenant_id: i32,
        integrations: &[Integration],
        actions: &[ActionDefinition],
    ) -> Result<()> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| EngineError::database_operation(format!("开始事务失败: {}", e)))?;

        if let Err(e) = self
            .import_in_txn(&txn, tenant_id, integrations, actions)
            .await
        {
            if let Err(rollback_err) = txn.rollback().await {
                warn!("Import rollback failed: {}", rollback_err);
            }
            return Err(e);
        }

        txn.commit()
            .await
            .map_err(|e| EngineError::database_operation(format!("提交事务失败: {}", e)))?;
        info!(
            "Imported {} integrations and {} actions for tenant {}",
            integrations.len(),
            actions.len(),
            tenant_id
        );
        Ok(())
    }

    async fn import_in_txn(
        &self,
        txn: &DatabaseTransaction,
        tenant_id: i32,
        integrations: &[Integration],
        actions: &[ActionDefinition],
    ) -> Result<()> {
        let now = Utc::now();
        for item in integrations {
            let mut item = item.clone();
            item.tenant_id = tenant_id;
            let encrypted = self.encrypt_secret(&item.credentials)?;
            integration_to_active_model(&item, encrypted, now)
                .insert(txn)
                .await
                .map_err(|e| {
                    EngineError::database_operation(format!(
                        "failed to create integration {}: {}",
                        item.name, e
                    ))
                })?;
        }
        for item in actions {
            let mut item = item.clone();
            item.tenant_id = tenant_id;
            action_to_active_model(&item, now, true)
                .insert(txn)
                .await
                .map_err(|e| {
                    EngineError::database_operation(format!(
                        "failed to create action {}: {}",
                        item.name, e
                    ))
                })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_poller_shape() {
        let poller = default_poller(4);
        assert_eq!(poller.tenant_id, 4);
        assert_eq!(poller.name, DEFAULT_POLLER_NAME);
        assert_eq!(poller.auth_type, "bearer");
        assert!(!poller.enabled);
        assert!(poller.is_poller());
        assert_eq!(poller.polling_interval, 60);
    }

    #[test]
    fn test_credentials_changed_ignores_formatting() {
        assert!(!credentials_changed(r#"{"a": 1, "b": 2}"#, r#"{"b":2,"a":1}"#));
        assert!(credentials_changed(r#"{"a":1}"#, r#"{"a":2}"#));
        assert!(credentials_changed("plain", "other"));
        assert!(!credentials_changed("", ""));
    }
}
