//! 旧版明文或未带前缀的密文迁移到 `enc:v1:` 格式

use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter};
use tracing::{info, warn};

use super::Storage;
use crate::errors::{EngineError, Result};
use crate::security::CredentialCipher;

use migration::entities::{integration, tenant};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LegacyMigrationReport {
    pub integrations: usize,
    pub tenants: usize,
}

fn needs_migration(value: &str) -> bool {
    !value.is_empty() && !CredentialCipher::is_encrypted(value)
}

impl Storage {
    pub async fn migrate_legacy_secrets(&self) -> Result<LegacyMigrationReport> {
        let mut report = LegacyMigrationReport::default();

        let integrations = integration::Entity::find()
            .filter(integration::Column::DeletedAt.is_null())
            .all(&self.db)
            .await?;
        for model in integrations {
            if !needs_migration(&model.credentials) {
                continue;
            }
            let id = model.id;
            let encrypted = self.cipher.reencrypt_legacy(&model.credentials)?;
            let mut active: integration::ActiveModel = model.into();
            active.credentials = Set(encrypted);
            active.update(&self.db).await.map_err(|e| {
                EngineError::database_operation(format!("迁移集成 {} 凭据失败: {}", id, e))
            })?;
            report.integrations += 1;
        }

        let tenants = tenant::Entity::find()
            .filter(tenant::Column::DeletedAt.is_null())
            .all(&self.db)
            .await?;
        for model in tenants {
            let Some(api_key) = model.api_key.clone() else {
                continue;
            };
            if !needs_migration(&api_key) {
                continue;
            }
            let id = model.id;
            let encrypted = self.cipher.reencrypt_legacy(&api_key)?;
            let mut active: tenant::ActiveModel = model.into();
            active.api_key = Set(Some(encrypted));
            if let Err(e) = active.update(&self.db).await {
                warn!("Failed to migrate api key of tenant {}: {}", id, e);
                continue;
            }
            report.tenants += 1;
        }

        if report.integrations > 0 || report.tenants > 0 {
            info!(
                "Legacy secrets migrated: {} integrations, {} tenants",
                report.integrations, report.tenants
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_migration() {
        assert!(!needs_migration(""));
        assert!(needs_migration("{\"token\":\"abc\"}"));
        assert!(!needs_migration("enc:v1:AAAA"));
    }
}
