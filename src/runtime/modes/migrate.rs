use anyhow::Result;
use tracing::info;

use crate::runtime::lifetime::startup::prepare_storage;

/// 运行迁移、旧凭据加密与种子同步后退出
pub async fn run_migrate() -> Result<()> {
    let storage = prepare_storage().await?;
    let tenants = storage.count_tenants().await?;
    info!("Migration finished, {} tenants present", tenants);
    Ok(())
}
