//! SeaORM storage backend
//!
//! This module provides database storage using SeaORM,
//! supporting SQLite, MySQL/MariaDB, and PostgreSQL.

mod actions;
mod audit;
mod bootstrap;
mod connection;
pub mod converters;
mod integrations;
mod jobs;
mod legacy;
pub mod retry;
mod settings;
mod state;
mod stats;
mod tenants;
mod users;
mod workflows;

use sea_orm::{DatabaseConnection, DbBackend, DbErr, SqlErr};
use tracing::warn;

use crate::errors::{EngineError, Result};
use crate::security::CredentialCipher;

pub use audit::{AUDIT_PAGE_LIMIT, AuditRecord};
pub use bootstrap::BootstrapReport;
pub use connection::{connect_generic, connect_sqlite, run_migrations};
pub use integrations::{CircuitUpdate, DEFAULT_POLLER_NAME, default_poller};
pub use jobs::{NewJob, normalize_page};
pub use legacy::LegacyMigrationReport;
pub use settings::DEFAULT_LANGUAGE;
pub use state::poll_cursor_key;

/// 从数据库 URL 推断数据库类型
pub fn infer_backend_from_url(database_url: &str) -> Result<String> {
    if database_url.starts_with("sqlite://")
        || database_url.ends_with(".db")
        || database_url.ends_with(".sqlite")
        || database_url == ":memory:"
    {
        Ok("sqlite".to_string())
    } else if database_url.starts_with("mysql://") || database_url.starts_with("mariadb://") {
        Ok("mysql".to_string())
    } else if database_url.starts_with("postgres://") || database_url.starts_with("postgresql://") {
        Ok("postgres".to_string())
    } else {
        Err(EngineError::database_config(format!(
            "无法从 URL 推断数据库类型: {}. 支持的 URL 格式: sqlite://, mysql://, mariadb://, postgres://",
            database_url
        )))
    }
}

/// 唯一约束冲突
pub(crate) fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

/// SeaORM-based storage backend
#[derive(Clone)]
pub struct Storage {
    db: DatabaseConnection,
    backend_name: String,
    /// 重试配置
    retry_config: retry::RetryConfig,
    /// 凭据与租户 API Key 的加解密
    cipher: CredentialCipher,
}

impl Storage {
    pub async fn new(
        database_url: &str,
        backend_name: &str,
        cipher: CredentialCipher,
    ) -> Result<Self> {
        if database_url.is_empty() {
            return Err(EngineError::database_config(
                "database_url 未设置".to_string(),
            ));
        }

        // 读取重试配置，未初始化全局配置时使用默认值
        let retry_config = crate::config::try_get_config()
            .map(|config| retry::RetryConfig::from(&config.database))
            .unwrap_or_default();

        // 根据不同数据库类型配置连接选项
        let db = if backend_name == "sqlite" {
            connect_sqlite(database_url).await?
        } else {
            connect_generic(database_url, backend_name).await?
        };

        let storage = Storage {
            db,
            backend_name: backend_name.to_string(),
            retry_config,
            cipher,
        };

        // 运行迁移
        run_migrations(&storage.db).await?;

        warn!(
            "{} Storage initialized.",
            storage.backend_name.to_uppercase()
        );
        Ok(storage)
    }

    /// 按 URL 推断类型后打开
    pub async fn open(database_url: &str, cipher: CredentialCipher) -> Result<Self> {
        let backend_name = infer_backend_from_url(database_url)?;
        Self::new(database_url, &backend_name, cipher).await
    }

    /// 获取数据库连接
    pub fn get_db(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn backend_name(&self) -> &str {
        &self.backend_name
    }

    pub fn cipher(&self) -> &CredentialCipher {
        &self.cipher
    }

    pub(crate) fn is_sqlite(&self) -> bool {
        self.db.get_database_backend() == DbBackend::Sqlite
    }

    pub(crate) fn encrypt_secret(&self, plain: &str) -> Result<String> {
        if plain.is_empty() {
            return Ok(String::new());
        }
        self.cipher.encrypt(plain)
    }

    /// 解密失败时记录日志并返回空串，避免单条坏数据拖垮整个列表
    pub(crate) fn decrypt_secret(&self, stored: &str, what: &str) -> String {
        match self.cipher.decrypt(stored) {
            Ok(plain) => plain,
            Err(e) => {
                warn!("Failed to decrypt {}: {}", what, e);
                String::new()
            }
        }
    }
}
