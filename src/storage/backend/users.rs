use chrono::Utc;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use tracing::info;

use super::converters::model_to_user;
use super::{Storage, is_unique_violation};
use crate::errors::{EngineError, Result};
use crate::storage::models::{Role, User};

use migration::entities::user;

impl Storage {
    pub async fn get_user(&self, id: i32) -> Result<Option<User>> {
        let model = user::Entity::find_by_id(id).one(&self.db).await?;
        Ok(model.map(model_to_user))
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let model = user::Entity::find()
            .filter(user::Column::Email.eq(email))
            .one(&self.db)
            .await?;
        Ok(model.map(model_to_user))
    }

    pub async fn create_user(&self, input: &User) -> Result<User> {
        let active = user::ActiveModel {
            created_at: Set(Utc::now()),
            email: Set(input.email.clone()),
            name: Set(input.name.clone()),
            role: Set(input.role.clone()),
            provider: Set(input.provider.clone()),
            ..Default::default()
        };
        let model = active.insert(&self.db).await.map_err(|e| {
            if is_unique_violation(&e) {
                EngineError::conflict(format!("user {} already exists", input.email))
            } else {
                EngineError::database_operation(format!("创建用户失败: {}", e))
            }
        })?;
        Ok(model_to_user(model))
    }

    /// 本地登录：按邮箱查找，不存在则以 admin 身份创建
    pub async fn find_or_create_local_user(&self, email: &str) -> Result<User> {
        if let Some(existing) = self.find_user_by_email(email).await? {
            return Ok(existing);
        }
        let created = self
            .create_user(&User {
                email: email.to_string(),
                name: "Initial User".to_string(),
                role: Role::Admin.to_string(),
                provider: "local".to_string(),
                ..Default::default()
            })
            .await;

        match created {
            Ok(user) => {
                info!("Local user created on first login: {}", user.email);
                Ok(user)
            }
            // 并发登录时另一方已创建
            Err(EngineError::Conflict(_)) => self
                .find_user_by_email(email)
                .await?
                .ok_or_else(|| EngineError::not_found("user not found")),
            Err(e) => Err(e),
        }
    }

    pub async fn count_admins(&self) -> Result<u64> {
        Ok(user::Entity::find()
            .filter(user::Column::Role.eq(Role::Admin.to_string()))
            .count(&self.db)
            .await?)
    }
}
