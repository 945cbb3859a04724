use chrono::Utc;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, EntityTrait, QueryOrder, QuerySelect};
use serde_json::Value;

use super::Storage;
use super::converters::model_to_audit;
use crate::errors::Result;
use crate::storage::models::AuditLogEntry;

use migration::entities::audit_log;

/// 审计日志最多返回条数
pub const AUDIT_PAGE_LIMIT: u64 = 100;

/// 一条待写入的审计记录
#[derive(Debug, Clone, Default)]
pub struct AuditRecord {
    pub user_id: i32,
    pub tenant_id: i32,
    pub action: String,
    pub resource: String,
    pub target_id: String,
    pub details: Value,
    pub ip: String,
}

impl AuditRecord {
    pub fn new(action: &str, resource: &str) -> Self {
        Self {
            action: action.to_string(),
            resource: resource.to_string(),
            details: Value::Null,
            ..Default::default()
        }
    }

    pub fn user(mut self, user_id: i32) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn tenant(mut self, tenant_id: i32) -> Self {
        self.tenant_id = tenant_id;
        self
    }

    pub fn target(mut self, target_id: impl ToString) -> Self {
        self.target_id = target_id.to_string();
        self
    }

    pub fn details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    pub fn ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = ip.into();
        self
    }
}

impl Storage {
    pub async fn record_audit(&self, record: AuditRecord) -> Result<()> {
        let active = audit_log::ActiveModel {
            timestamp: Set(Utc::now()),
            user_id: Set(record.user_id),
            tenant_id: Set(record.tenant_id),
            action: Set(record.action),
            resource: Set(record.resource),
            target_id: Set(record.target_id),
            details: Set(record.details.to_string()),
            ip: Set(record.ip),
            ..Default::default()
        };
        active.insert(&self.db).await?;
        Ok(())
    }

    /// 最近的审计记录，新的在前
    pub async fn recent_audit_logs(&self) -> Result<Vec<AuditLogEntry>> {
        let models = audit_log::Entity::find()
            .order_by_desc(audit_log::Column::Timestamp)
            .order_by_desc(audit_log::Column::Id)
            .limit(AUDIT_PAGE_LIMIT)
            .all(&self.db)
            .await?;
        Ok(models.into_iter().map(model_to_audit).collect())
    }
}
