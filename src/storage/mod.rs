use std::sync::Arc;

use crate::errors::Result;
use crate::security::CredentialCipher;

pub mod backend;
pub mod models;
pub mod seeds;

pub use backend::{AuditRecord, NewJob, Storage};
pub use models::*;

pub struct StorageFactory;

impl StorageFactory {
    /// 按全局配置打开存储：推断数据库类型、加载加密密钥、运行迁移
    pub async fn create() -> Result<Arc<Storage>> {
        let config = crate::config::get_config();
        let database_url = &config.database.database_url;

        let cipher = CredentialCipher::from_config_key(&config.security.encryption_key)?;

        // 从 URL 自动推断数据库类型
        let backend_type = backend::infer_backend_from_url(database_url)?;

        let storage = Storage::new(database_url, &backend_type, cipher).await?;
        Ok(Arc::new(storage))
    }
}
