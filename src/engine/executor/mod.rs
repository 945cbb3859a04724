//! 动作执行器
//!
//! 把动作定义渲染成 HTTP 请求并发送到集成，负责：
//! - 按集成限流
//! - 指数退避重试（401/403 立即放弃）
//! - 熔断计数：连续失败达到阈值后把集成标记为不可用

mod auth;
mod rate_limit;
mod rest;
mod ssf;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::errors::{EngineError, Result};
use crate::security::redact;
use crate::storage::{ActionDefinition, Integration, Storage};

pub use auth::oauth_token_stale;
pub use rate_limit::RateLimiters;

const DEFAULT_RETRIES: i32 = 3;
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// 一次动作执行的结果；`error` 为空表示成功
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionOutcome {
    pub body: String,
    pub status: u16,
    pub error: Option<String>,
}

impl ExecutionOutcome {
    pub fn success(status: u16, body: String) -> Self {
        Self {
            body,
            status,
            error: None,
        }
    }

    pub fn failure(status: u16, body: String, error: impl Into<String>) -> Self {
        Self {
            body,
            status,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// 执行器接口，测试中可替换为脚本化实现
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(
        &self,
        integration: &Integration,
        definition: &ActionDefinition,
        context: &Value,
    ) -> ExecutionOutcome;
}

#[derive(Debug, Clone, Copy)]
pub struct ExecutorSettings {
    pub http_timeout: Duration,
    pub retry_base_delay: Duration,
    pub circuit_breaker_threshold: i32,
    pub debug: bool,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for ExecutorSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            http_timeout: Duration::from_secs(config.http_timeout_secs),
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
            circuit_breaker_threshold: config.circuit_breaker_threshold,
            debug: config.debug,
        }
    }
}

impl ExecutorSettings {
    /// 第 attempt 次重试前的等待：base * 2^(attempt-1)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.retry_base_delay
            .checked_mul(factor)
            .map_or(MAX_BACKOFF, |d| d.min(MAX_BACKOFF))
    }
}

/// 渲染完成、可重复发送的请求
#[derive(Debug, Clone)]
pub(crate) struct PreparedRequest {
    pub method: reqwest::Method,
    pub url: String,
    pub body: String,
    pub content_type: &'static str,
    pub accept: Option<&'static str>,
}

/// 单次发送失败
struct AttemptFailure {
    status: u16,
    body: String,
    message: String,
}

pub(crate) fn parse_method(method: &str, fallback: reqwest::Method) -> Result<reqwest::Method> {
    let method = method.trim();
    if method.is_empty() {
        return Ok(fallback);
    }
    reqwest::Method::from_bytes(method.to_uppercase().as_bytes())
        .map_err(|_| EngineError::validation(format!("invalid HTTP method: {}", method)))
}

/// 基于 reqwest 的执行器
pub struct HttpActionExecutor {
    client: reqwest::Client,
    storage: Arc<Storage>,
    limiters: RateLimiters,
    settings: ExecutorSettings,
}

impl HttpActionExecutor {
    pub fn new(storage: Arc<Storage>, settings: ExecutorSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.http_timeout)
            .build()?;
        Ok(Self {
            client,
            storage,
            limiters: RateLimiters::new(),
            settings,
        })
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    fn prepare(
        &self,
        integ: &Integration,
        definition: &ActionDefinition,
        context: &Value,
    ) -> Result<PreparedRequest> {
        let request = match integ.integration_type.to_uppercase().as_str() {
            "WINRM" => return Err(EngineError::execution("WinRM transport is not supported")),
            "SSF" => ssf::prepare(integ, definition, context, self.settings.debug)?,
            _ => rest::prepare(integ, definition, context)?,
        };
        if self.settings.debug {
            info!(
                "Request Payload ({} {}):\n{}",
                request.method,
                request.url,
                redact(&request.body)
            );
        }
        Ok(request)
    }

    async fn send(
        &self,
        integ: &mut Integration,
        request: &PreparedRequest,
    ) -> std::result::Result<(u16, String), AttemptFailure> {
        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .header(reqwest::header::CONTENT_TYPE, request.content_type)
            .body(request.body.clone());
        if let Some(accept) = request.accept {
            builder = builder.header(reqwest::header::ACCEPT, accept);
        }

        let builder = self
            .apply_auth(builder, integ)
            .await
            .map_err(|e| AttemptFailure {
                status: 0,
                body: String::new(),
                message: e.message().to_string(),
            })?;

        let resp = builder.send().await.map_err(|e| AttemptFailure {
            status: 0,
            body: String::new(),
            message: e.to_string(),
        })?;

        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        if status >= 400 {
            return Err(AttemptFailure {
                status,
                message: format!("HTTP {}: {}", status, body),
                body,
            });
        }
        Ok((status, body))
    }

    async fn on_success(&self, integ: &Integration) {
        if let Err(e) = self.storage.record_integration_success(integ).await {
            warn!("Failed to reset circuit for {}: {}", integ.name, e);
        }
    }

    async fn on_failure(&self, integ: &Integration) {
        match self
            .storage
            .record_integration_failure(integ.id, self.settings.circuit_breaker_threshold)
            .await
        {
            Ok(update) if update.tripped => warn!(
                "[CircuitBreaker] TRIP! Integration {} disabled after {} failures.",
                integ.name, update.consecutive_failures
            ),
            Ok(update) => debug!(
                "Integration {} consecutive failures: {}",
                integ.name, update.consecutive_failures
            ),
            Err(e) => warn!("Failed to record failure for {}: {}", integ.name, e),
        }
    }
}

#[async_trait]
impl ActionExecutor for HttpActionExecutor {
    async fn execute(
        &self,
        integration: &Integration,
        definition: &ActionDefinition,
        context: &Value,
    ) -> ExecutionOutcome {
        if !integration.is_available {
            return ExecutionOutcome::failure(
                0,
                String::new(),
                format!(
                    "integration {} is currently unavailable (circuit breaker tripped)",
                    integration.name
                ),
            );
        }

        let request = match self.prepare(integration, definition, context) {
            Ok(request) => request,
            Err(e) => return ExecutionOutcome::failure(0, String::new(), e.message()),
        };

        if integration.rate_limit > 0.0 {
            if self.settings.debug {
                info!(
                    "Throttling enabled for {} ({:.1} req/sec).",
                    integration.name, integration.rate_limit
                );
            }
            self.limiters
                .acquire(integration.id, integration.rate_limit)
                .await;
        }

        let retries = if definition.retry_count <= 0 {
            DEFAULT_RETRIES
        } else {
            definition.retry_count
        };
        let retries = retries.unsigned_abs();

        let mut integ = integration.clone();
        let mut last = AttemptFailure {
            status: 0,
            body: String::new(),
            message: String::new(),
        };

        for attempt in 0..=retries {
            if attempt > 0 {
                let backoff = self.settings.backoff(attempt);
                if self.settings.debug {
                    info!(
                        "Retrying action {} (attempt {}/{}) after {:?}...",
                        definition.name, attempt, retries, backoff
                    );
                }
                tokio::time::sleep(backoff).await;
            }

            match self.send(&mut integ, &request).await {
                Ok((status, body)) => {
                    self.on_success(&integ).await;
                    return ExecutionOutcome::success(status, body);
                }
                Err(failure) => {
                    let auth_error = matches!(failure.status, 401 | 403);
                    last = failure;
                    if auth_error {
                        if self.settings.debug {
                            info!(
                                "Aborting retries for {} due to HTTP {} (Auth Error)",
                                definition.name, last.status
                            );
                        }
                        break;
                    }
                }
            }
        }

        self.on_failure(&integ).await;
        ExecutionOutcome::failure(
            last.status,
            last.body,
            format!(
                "all {} attempts failed. Last error: {}",
                retries + 1,
                last.message
            ),
        )
    }
}
