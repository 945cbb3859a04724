//! 数据库写入重试
//!
//! 锁冲突、死锁、连接中断等瞬时错误按指数退避重试，其余错误直接返回。

use std::future::Future;
use std::time::Duration;

use sea_orm::DbErr;
use sea_orm::error::RuntimeErr;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::DatabaseConfig;

/// 各数据库的瞬时错误码：MySQL 死锁/锁超时，PostgreSQL 序列化失败/死锁，SQLite BUSY/LOCKED
const TRANSIENT_CODES: &[&str] = &["1213", "1205", "40001", "40P01", "5", "6"];

const TRANSIENT_MESSAGES: &[&str] = &[
    "deadlock",
    "lock wait timeout",
    "database is locked",
    "database table is locked",
    "serialization failure",
    "connection reset",
    "broken pipe",
];

/// 判断数据库错误是否值得重试
pub fn is_transient(err: &DbErr) -> bool {
    match err {
        DbErr::ConnectionAcquire(_) | DbErr::Conn(_) => true,
        DbErr::Exec(runtime) | DbErr::Query(runtime) => is_transient_runtime(runtime),
        _ => false,
    }
}

fn is_transient_runtime(err: &RuntimeErr) -> bool {
    match err {
        RuntimeErr::SqlxError(sqlx_err) => {
            use std::ops::Deref;
            let code = sqlx_err
                .deref()
                .as_database_error()
                .and_then(|db_err| db_err.code().map(|c| c.to_string()));
            if let Some(code) = code {
                return TRANSIENT_CODES.contains(&code.as_str());
            }
            message_is_transient(&sqlx_err.to_string())
        }
        RuntimeErr::Internal(msg) => message_is_transient(msg),
        #[allow(unreachable_patterns)]
        _ => false,
    }
}

fn message_is_transient(msg: &str) -> bool {
    let lower = msg.to_lowercase();
    TRANSIENT_MESSAGES.iter().any(|m| lower.contains(m))
}

/// 重试配置
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 100,
            max_delay_ms: 2000,
        }
    }
}

impl From<&DatabaseConfig> for RetryConfig {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            max_retries: config.retry_count,
            base_delay_ms: config.retry_base_delay_ms,
            max_delay_ms: config.retry_max_delay_ms,
        }
    }
}

impl RetryConfig {
    /// 第 attempt 次重试前的等待时间（毫秒），带 0-25% 抖动
    pub fn delay_for(&self, attempt: u32) -> u64 {
        use rand::RngExt;
        let exp = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
        let capped = exp.min(self.max_delay_ms);
        let jitter = rand::rng().random_range(0..=capped / 4);
        capped.saturating_add(jitter)
    }
}

/// 执行数据库操作，瞬时错误自动重试
pub async fn with_retry<T, F, Fut>(
    operation_name: &str,
    config: RetryConfig,
    mut operation: F,
) -> Result<T, DbErr>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DbErr>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!("'{}' succeeded after {} retries", operation_name, attempt);
                }
                return Ok(value);
            }
            Err(e) if attempt < config.max_retries && is_transient(&e) => {
                attempt += 1;
                let delay = config.delay_for(attempt);
                warn!(
                    "'{}' hit a transient error (attempt {}/{}): {}; retrying in {} ms",
                    operation_name,
                    attempt,
                    config.max_retries + 1,
                    e,
                    delay
                );
                sleep(Duration::from_millis(delay)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryConfig {
        RetryConfig {
            max_retries: 2,
            base_delay_ms: 5,
            max_delay_ms: 20,
        }
    }

    #[test]
    fn test_transient_classification() {
        assert!(is_transient(&DbErr::ConnectionAcquire(
            sea_orm::error::ConnAcquireErr::Timeout
        )));
        assert!(is_transient(&DbErr::Exec(RuntimeErr::Internal(
            "Deadlock found when trying to get lock".into()
        ))));
        assert!(is_transient(&DbErr::Query(RuntimeErr::Internal(
            "database is locked".into()
        ))));
        assert!(!is_transient(&DbErr::RecordNotFound("x".into())));
        assert!(!is_transient(&DbErr::Custom("syntax error".into())));
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let config = RetryConfig::default();
        assert!((100..=125).contains(&config.delay_for(1)));
        assert!((400..=500).contains(&config.delay_for(3)));
        assert!((2000..=2500).contains(&config.delay_for(12)));
    }

    #[tokio::test]
    async fn test_recovers_after_transient_errors() {
        let calls = AtomicU32::new(0);
        let result = with_retry("flaky", fast(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(DbErr::Conn(RuntimeErr::Internal("connection reset".into())))
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry("always-locked", fast(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(DbErr::Exec(RuntimeErr::Internal("database is locked".into()))) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry("bad", fast(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(DbErr::RecordNotFound("gone".into())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
