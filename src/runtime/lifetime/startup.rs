use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{StaticConfig, get_config};
use crate::engine::{Engine, EngineHandle};
use crate::storage::seeds::{
    ensure_default_tenant, seed_default_admin, seed_default_workflow_steps, sync_seeds,
};
use crate::storage::{Storage, StorageFactory};

pub struct StartupContext {
    pub storage: Arc<Storage>,
    pub engine: Option<Arc<Engine>>,
    pub engine_handle: Option<EngineHandle>,
}

/// 安装 rustls 的 ring 提供者；已安装时忽略
pub fn install_crypto_provider() {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        debug!("rustls crypto provider already installed");
    }
}

/// 凭据迁移与种子同步，`serve` 与 `migrate` 共用
pub async fn run_data_tasks(storage: &Storage, config: &StaticConfig) -> Result<()> {
    let report = storage
        .migrate_legacy_secrets()
        .await
        .context("Failed to migrate legacy credentials")?;
    if report.integrations > 0 || report.tenants > 0 {
        info!(
            "Encrypted legacy secrets: {} integrations, {} tenants",
            report.integrations, report.tenants
        );
    }

    if config.seeds.enabled {
        let dir = Path::new(&config.seeds.directory);
        if dir.is_dir() {
            sync_seeds(storage, dir)
                .await
                .context("Failed to sync seed data")?;
        } else {
            warn!("Seed directory {} not found, skipping", dir.display());
        }
    }

    ensure_default_tenant(storage)
        .await
        .context("Failed to ensure default tenant")?;
    seed_default_admin(storage)
        .await
        .context("Failed to seed default admin")?;
    seed_default_workflow_steps(storage)
        .await
        .context("Failed to seed default workflow steps")?;
    Ok(())
}

/// 打开存储并完成数据初始化
pub async fn prepare_storage() -> Result<Arc<Storage>> {
    install_crypto_provider();

    let config = get_config();
    let storage = StorageFactory::create()
        .await
        .context("Failed to create storage backend")?;
    info!("Using storage backend: {}", storage.backend_name());

    run_data_tasks(&storage, &config).await?;
    Ok(storage)
}

/// 准备服务器启动的上下文：存储、数据任务与引擎
pub async fn prepare_server_startup() -> Result<StartupContext> {
    let start_time = std::time::Instant::now();
    let config = get_config();

    let storage = prepare_storage().await?;

    let (engine, engine_handle) = if config.engine.enabled {
        let engine = Arc::new(
            Engine::from_config(storage.clone(), &config.engine)
                .context("Failed to build workflow engine")?,
        );
        let handle = engine
            .start()
            .await
            .context("Failed to start workflow engine")?;
        (Some(engine), Some(handle))
    } else {
        warn!("Workflow engine disabled by configuration");
        (None, None)
    };

    info!(
        "Startup preparation finished in {:.2?} ({} mode)",
        start_time.elapsed(),
        if config.tenancy.multi_tenant {
            "multi-tenant"
        } else {
            "single-tenant"
        }
    );

    Ok(StartupContext {
        storage,
        engine,
        engine_handle,
    })
}
