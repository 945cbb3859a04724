use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};

use crate::engine::EngineHandle;

/// 等待引擎退出的最长时间（秒）
pub const SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// 等待 Ctrl+C
pub async fn listen_for_shutdown() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received, stopping..."),
        Err(e) => warn!(
            "Failed to listen for Ctrl+C: {}. Proceeding with shutdown anyway.",
            e
        ),
    }
}

/// 通知引擎停止并在超时内等待
pub async fn perform_shutdown(engine: Option<EngineHandle>) {
    let Some(handle) = engine else {
        return;
    };
    if !handle
        .shutdown(Duration::from_secs(SHUTDOWN_TIMEOUT_SECS))
        .await
    {
        warn!(
            "Engine shutdown timed out after {} seconds, exiting anyway",
            SHUTDOWN_TIMEOUT_SECS
        );
    }
}
