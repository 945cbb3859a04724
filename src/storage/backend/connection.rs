use std::path::Path;

use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use tracing::info;

use crate::errors::{EngineError, Result};
use migration::{Migrator, MigratorTrait};

/// sqlite://path?query 中的文件路径
fn sqlite_file_path(database_url: &str) -> Option<&str> {
    let rest = database_url.strip_prefix("sqlite://").unwrap_or(database_url);
    let path = rest.split('?').next().unwrap_or(rest);
    if path.is_empty() || path == ":memory:" {
        None
    } else {
        Some(path)
    }
}

/// 连接 SQLite 数据库（带自动创建和性能优化）
pub async fn connect_sqlite(database_url: &str) -> Result<DatabaseConnection> {
    use sea_orm::SqlxSqliteConnector;
    use sea_orm::sqlx::SqlitePool;
    use sea_orm::sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteSynchronous};
    use std::str::FromStr;

    // 数据库目录不存在时先创建
    if let Some(parent) = sqlite_file_path(database_url)
        .map(Path::new)
        .and_then(Path::parent)
        .filter(|p| !p.as_os_str().is_empty())
    {
        std::fs::create_dir_all(parent).map_err(|e| {
            EngineError::file_operation(format!(
                "无法创建数据库目录 {}: {}",
                parent.display(),
                e
            ))
        })?;
    }

    let url = if database_url.starts_with("sqlite://") || database_url == ":memory:" {
        database_url.to_string()
    } else {
        format!("sqlite://{}", database_url)
    };

    let opt = SqliteConnectOptions::from_str(&url)
        .map_err(|e| EngineError::database_config(format!("SQLite URL 解析失败: {}", e)))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(5))
        .foreign_keys(false)
        .pragma("cache_size", "-16000")
        .pragma("temp_store", "memory");

    // 使用 sqlx 的连接池
    let pool = SqlitePool::connect_with(opt).await.map_err(|e| {
        EngineError::database_connection(format!("无法连接到 SQLite 数据库: {}", e))
    })?;

    // 转换为 Sea-ORM 的 DatabaseConnection
    Ok(SqlxSqliteConnector::from_sqlx_sqlite_pool(pool))
}

/// 连接通用数据库（MySQL/PostgreSQL）
pub async fn connect_generic(database_url: &str, backend_name: &str) -> Result<DatabaseConnection> {
    let (pool_size, timeout) = crate::config::try_get_config()
        .map(|c| (c.database.pool_size, c.database.timeout))
        .unwrap_or((10, 30));

    let mut opt = ConnectOptions::new(database_url.to_owned());
    opt.max_connections(pool_size)
        .min_connections(pool_size.min(5))
        .connect_timeout(std::time::Duration::from_secs(timeout))
        .acquire_timeout(std::time::Duration::from_secs(timeout))
        .idle_timeout(std::time::Duration::from_secs(300)) // 5分钟空闲超时
        .max_lifetime(std::time::Duration::from_secs(3600)) // 1小时最大生命周期
        .sqlx_logging(false);

    Database::connect(opt).await.map_err(|e| {
        EngineError::database_connection(format!(
            "无法连接到 {} 数据库: {}",
            backend_name.to_uppercase(),
            e
        ))
    })
}

/// 运行数据库迁移
pub async fn run_migrations(db: &DatabaseConnection) -> Result<()> {
    Migrator::up(db, None)
        .await
        .map_err(|e| EngineError::database_operation(format!("迁移失败: {}", e)))?;

    info!("Database migrations completed");
    Ok(())
}
