use serde::{Deserialize, Serialize};

/// 静态配置（从 TOML 加载，启动时使用）
///
/// 包含：
/// - server: 监听地址、端口、CORS 来源
/// - database: 数据库连接与重试
/// - logging: 日志配置
/// - security: JWT / 管理员密钥 / 凭证加密密钥
/// - engine: 工作流引擎调度参数
/// - tenancy: 多租户开关
/// - seeds: 种子数据目录
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StaticConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub tenancy: TenancyConfig,
    #[serde(default)]
    pub seeds: SeedsConfig,
}

impl StaticConfig {
    /// 从 TOML 文件和环境变量加载配置
    ///
    /// 优先级：旧版 ENV > RE__ ENV > config.toml > 默认值
    /// 示例：RE__SERVER__PORT=9999
    pub fn load() -> Self {
        Self::load_from("config.toml")
    }

    pub fn load_from(path: &str) -> Self {
        use config::{Config, Environment, File};

        let builder = Config::builder()
            // 1. 从 TOML 文件加载（可选）
            .add_source(File::with_name(path).required(false))
            // 2. 从环境变量覆盖，前缀 RE，分隔符 __
            .add_source(
                Environment::with_prefix("RE")
                    .separator("__")
                    .try_parsing(true),
            );

        let mut config = match builder.build() {
            Ok(settings) => match settings.try_deserialize::<StaticConfig>() {
                Ok(config) => {
                    if std::path::Path::new(path).exists() {
                        eprintln!("[INFO] Configuration loaded from: {}", path);
                    }
                    config
                }
                Err(e) => {
                    eprintln!("[ERROR] Failed to deserialize config: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!("[ERROR] Failed to build config: {}", e);
                Self::default()
            }
        };

        config.apply_legacy_env(|key| std::env::var(key).ok());
        config
    }

    /// 兼容旧部署使用的环境变量（PORT、JWT_SECRET 等）
    pub fn apply_legacy_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(port) = get("PORT") {
            match port.trim().parse::<u16>() {
                Ok(p) => self.server.port = p,
                Err(_) => eprintln!("[WARN] Ignoring invalid PORT value: {}", port),
            }
        }
        if let Some(origin) = get("ALLOWED_ORIGIN") {
            self.server.allowed_origin = origin;
        }
        if let Some(secret) = get("JWT_SECRET") {
            self.security.jwt_secret = secret;
        }
        if let Some(key) = get("ADMIN_API_KEY") {
            self.security.admin_api_key = key;
        }
        if let Some(key) = get("ENCRYPTION_KEY") {
            self.security.encryption_key = key;
        }
        if let Some(debug) = get("DEBUG") {
            self.engine.debug = debug.eq_ignore_ascii_case("true");
        }
        if let Some(multi) = get("MULTI_TENANT") {
            self.tenancy.multi_tenant = multi.eq_ignore_ascii_case("true");
        }
        if let Some(path) = get("DB_PATH") {
            self.database.database_url = format!("sqlite://{}?mode=rwc", path);
        }
    }

    /// 生成示例 TOML 配置文件
    pub fn generate_sample_config() -> String {
        let sample_config = Self::default();
        toml::to_string_pretty(&sample_config)
            .unwrap_or_else(|e| format!("Error generating sample config: {}", e))
    }

    /// 保存配置到 TOML 文件
    pub fn save_to_file<P: AsRef<std::path::Path>>(
        &self,
        path: P,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;

        if let Some(parent) = path.as_ref().parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        Ok(())
    }
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_host")]
    pub host: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
    #[serde(default = "default_cpu_count")]
    pub cpu_count: usize,
    #[serde(default = "default_allowed_origin")]
    pub allowed_origin: String,
}

/// 数据库连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_database_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_database_timeout")]
    pub timeout: u64,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default = "default_max_backups")]
    pub max_backups: u32,
    #[serde(default = "default_enable_rotation")]
    pub enable_rotation: bool,
}

/// 安全配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub jwt_secret: String,
    /// 为空时进入开发模式（不校验身份）
    #[serde(default)]
    pub admin_api_key: String,
    /// 32 字节原文，或 32 字节的 base64
    #[serde(default)]
    pub encryption_key: String,
    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: i64,
}

/// 工作流引擎配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// 打印（脱敏后的）请求载荷
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_schedule_interval_secs")]
    pub schedule_interval_secs: u64,
    #[serde(default = "default_maintenance_interval_secs")]
    pub maintenance_interval_secs: u64,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
    #[serde(default = "default_engine_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_circuit_breaker_threshold")]
    pub circuit_breaker_threshold: i32,
}

/// 租户模式配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TenancyConfig {
    #[serde(default)]
    pub multi_tenant: bool,
}

/// 种子数据配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_seeds_directory")]
    pub directory: String,
}

// ============================================================
// Default value functions for static config
// ============================================================

fn default_true() -> bool {
    true
}

fn default_server_host() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    8080
}

fn default_cpu_count() -> usize {
    num_cpus::get()
}

fn default_allowed_origin() -> String {
    "http://localhost:5173".to_string()
}

fn default_database_url() -> String {
    "sqlite://data/remediation.db".to_string()
}

fn default_database_pool_size() -> u32 {
    10
}

fn default_database_timeout() -> u64 {
    30
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    100
}

fn default_retry_max_delay_ms() -> u64 {
    2000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_max_backups() -> u32 {
    5
}

fn default_enable_rotation() -> bool {
    true
}

fn default_token_ttl_hours() -> i64 {
    24
}

fn default_worker_count() -> usize {
    20
}

fn default_queue_capacity() -> usize {
    1000
}

fn default_schedule_interval_secs() -> u64 {
    10
}

fn default_maintenance_interval_secs() -> u64 {
    86400
}

fn default_http_timeout_secs() -> u64 {
    15
}

fn default_poll_timeout_secs() -> u64 {
    30
}

fn default_engine_retry_base_delay_ms() -> u64 {
    1000
}

fn default_circuit_breaker_threshold() -> i32 {
    5
}

fn default_seeds_directory() -> String {
    "data/seeds".to_string()
}

// ============================================================
// Default implementations
// ============================================================

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
            cpu_count: default_cpu_count(),
            allowed_origin: default_allowed_origin(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            pool_size: default_database_pool_size(),
            timeout: default_database_timeout(),
            retry_count: default_retry_count(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
            max_backups: default_max_backups(),
            enable_rotation: default_enable_rotation(),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            admin_api_key: String::new(),
            encryption_key: String::new(),
            token_ttl_hours: default_token_ttl_hours(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debug: false,
            worker_count: default_worker_count(),
            queue_capacity: default_queue_capacity(),
            schedule_interval_secs: default_schedule_interval_secs(),
            maintenance_interval_secs: default_maintenance_interval_secs(),
            http_timeout_secs: default_http_timeout_secs(),
            poll_timeout_secs: default_poll_timeout_secs(),
            retry_base_delay_ms: default_engine_retry_base_delay_ms(),
            circuit_breaker_threshold: default_circuit_breaker_threshold(),
        }
    }
}

impl Default for SeedsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: default_seeds_directory(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = StaticConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.allowed_origin, "http://localhost:5173");
        assert_eq!(config.engine.worker_count, 20);
        assert_eq!(config.engine.circuit_breaker_threshold, 5);
        assert_eq!(config.security.token_ttl_hours, 24);
        assert!(!config.tenancy.multi_tenant);
    }

    #[test]
    fn test_legacy_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("PORT", "9090"),
            ("ALLOWED_ORIGIN", "https://console.example.com"),
            ("ADMIN_API_KEY", "admin-key"),
            ("DEBUG", "true"),
            ("MULTI_TENANT", "TRUE"),
            ("DB_PATH", "/tmp/re.db"),
        ]
        .into_iter()
        .collect();

        let mut config = StaticConfig::default();
        config.apply_legacy_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.allowed_origin, "https://console.example.com");
        assert_eq!(config.security.admin_api_key, "admin-key");
        assert!(config.engine.debug);
        assert!(config.tenancy.multi_tenant);
        assert_eq!(config.database.database_url, "sqlite:///tmp/re.db?mode=rwc");
    }

    #[test]
    fn test_invalid_port_is_ignored() {
        let mut config = StaticConfig::default();
        config.apply_legacy_env(|k| (k == "PORT").then(|| "not-a-port".to_string()));
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_sample_config_roundtrip() {
        let sample = StaticConfig::generate_sample_config();
        assert!(sample.contains("[engine]"));
        let parsed: StaticConfig = toml::from_str(&sample).unwrap();
        assert_eq!(parsed.engine.queue_capacity, 1000);
    }
}
