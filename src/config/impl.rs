use std::sync::{Arc, OnceLock};

use arc_swap::ArcSwap;

use super::StaticConfig;

static CONFIG: OnceLock<ArcSwap<StaticConfig>> = OnceLock::new();

/// Get the global configuration instance
///
/// Returns an Arc pointer to the configuration, which is cheap to clone
/// and doesn't hold any locks.
pub fn get_config() -> Arc<StaticConfig> {
    CONFIG
        .get()
        .expect("Config not initialized. Call init_config() first.")
        .load_full()
}

/// Like `get_config`, but `None` before initialization.
pub fn try_get_config() -> Option<Arc<StaticConfig>> {
    CONFIG.get().map(|c| c.load_full())
}

/// Initialize the global configuration
///
/// Loads configuration from "config.toml" in the current directory,
/// then environment variables. Missing file means in-memory defaults.
pub fn init_config() {
    CONFIG.get_or_init(|| ArcSwap::from_pointee(StaticConfig::load()));
}

/// Initialize with an explicit configuration, replacing any previous one.
pub fn init_config_with(config: StaticConfig) {
    match CONFIG.get() {
        Some(existing) => existing.store(Arc::new(config)),
        None => {
            if let Err(rejected) = CONFIG.set(ArcSwap::from_pointee(config)) {
                // 并发初始化时，直接覆盖
                if let Some(existing) = CONFIG.get() {
                    existing.store(rejected.load_full());
                }
            }
        }
    }
}
