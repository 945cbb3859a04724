//! 系统设置、消息模板与处置建议

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, QueryOrder,
    sea_query::Expr,
};

use super::Storage;
use super::converters::{model_to_setting, model_to_template};
use crate::errors::{EngineError, Result};
use crate::storage::models::{MessageTemplate, RemediationRecommendation, SystemSetting};

use migration::entities::{message_template, remediation_recommendation, system_setting};

pub const DEFAULT_LANGUAGE: &str = "en";

impl Storage {
    pub async fn list_settings(&self) -> Result<Vec<SystemSetting>> {
        let models = system_setting::Entity::find()
            .order_by_asc(system_setting::Column::Id)
            .all(&self.db)
            .await?;
        Ok(models.into_iter().map(model_to_setting).collect())
    }

    pub async fn get_setting(&self, key: &str) -> Result<Option<SystemSetting>> {
        let model = system_setting::Entity::find()
            .filter(system_setting::Column::Key.eq(key))
            .one(&self.db)
            .await?;
        Ok(model.map(model_to_setting))
    }

    /// 只更新 value；key 不存在时返回 NotFound
    pub async fn update_setting_value(&self, key: &str, value: &str) -> Result<()> {
        let result = system_setting::Entity::update_many()
            .col_expr(system_setting::Column::Value, Expr::value(value))
            .filter(system_setting::Column::Key.eq(key))
            .exec(&self.db)
            .await
            .map_err(|e| EngineError::database_operation(format!("更新设置失败: {}", e)))?;
        if result.rows_affected == 0 {
            return Err(EngineError::not_found(format!("setting {} not found", key)));
        }
        Ok(())
    }

    /// 按 key 查找，不存在则创建
    pub async fn find_or_create_setting(&self, input: &SystemSetting) -> Result<SystemSetting> {
        if let Some(existing) = self.get_setting(&input.key).await? {
            return Ok(existing);
        }
        let model = system_setting::ActiveModel {
            key: Set(input.key.clone()),
            value: Set(input.value.clone()),
            description: Set(input.description.clone()),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;
        Ok(model_to_setting(model))
    }

    /// 查找消息模板
    ///
    /// 依次尝试指定语言、默认语言；同一语言下优先使用本租户的模板。
    pub async fn find_message_template(
        &self,
        tenant_id: i32,
        issue_type: &str,
        language: &str,
    ) -> Result<Option<MessageTemplate>> {
        let mut languages = vec![language];
        if language != DEFAULT_LANGUAGE {
            languages.push(DEFAULT_LANGUAGE);
        }
        for lang in languages {
            let candidates = message_template::Entity::find()
                .filter(message_template::Column::IssueType.eq(issue_type))
                .filter(message_template::Column::Language.eq(lang))
                .order_by_asc(message_template::Column::Id)
                .all(&self.db)
                .await?;
            let chosen = candidates
                .iter()
                .find(|t| t.tenant_id == tenant_id)
                .or_else(|| candidates.first())
                .cloned();
            if let Some(model) = chosen {
                return Ok(Some(model_to_template(model)));
            }
        }
        Ok(None)
    }

    /// 按 (tenant_id, issue_type, language) 查找，不存在则创建
    pub async fn find_or_create_template(&self, input: &MessageTemplate) -> Result<MessageTemplate> {
        let language = if input.language.is_empty() {
            DEFAULT_LANGUAGE.to_string()
        } else {
            input.language.clone()
        };
        let existing = message_template::Entity::find()
            .filter(message_template::Column::TenantId.eq(input.tenant_id))
            .filter(message_template::Column::IssueType.eq(input.issue_type.as_str()))
            .filter(message_template::Column::Language.eq(language.as_str()))
            .one(&self.db)
            .await?;
        if let Some(model) = existing {
            return Ok(model_to_template(model));
        }
        let now = Utc::now();
        let model = message_template::ActiveModel {
            created_at: Set(now),
            updated_at: Set(now),
            tenant_id: Set(input.tenant_id),
            issue_type: Set(input.issue_type.clone()),
            language: Set(language),
            title: Set(input.title.clone()),
            message: Set(input.message.clone()),
            footer: Set(input.footer.clone()),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;
        Ok(model_to_template(model))
    }

    pub async fn get_recommendation(
        &self,
        issue_type: &str,
    ) -> Result<Option<RemediationRecommendation>> {
        let model = remediation_recommendation::Entity::find()
            .filter(remediation_recommendation::Column::IssueType.eq(issue_type))
            .one(&self.db)
            .await?;
        Ok(model.map(|m| RemediationRecommendation {
            id: m.id,
            issue_type: m.issue_type,
            title: m.title,
            description: m.description,
            steps: m.steps,
            reference_url: m.reference_url,
        }))
    }

    pub async fn find_or_create_recommendation(
        &self,
        input: &RemediationRecommendation,
    ) -> Result<()> {
        if self.get_recommendation(&input.issue_type).await?.is_some() {
            return Ok(());
        }
        let now = Utc::now();
        remediation_recommendation::ActiveModel {
            created_at: Set(now),
            updated_at: Set(now),
            issue_type: Set(input.issue_type.clone()),
            title: Set(input.title.clone()),
            description: Set(input.description.clone()),
            steps: Set(input.steps.clone()),
            reference_url: Set(input.reference_url.clone()),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;
        Ok(())
    }
}
