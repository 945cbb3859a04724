//! 工作流引擎
//!
//! - 调度：按租户找到启用的 AuthMind 轮询器及其关联工作流，按轮询间隔入队
//! - 工作者：从有界队列取任务，拉取新问题并运行匹配的工作流
//! - 维护：数据保留清理与凭据轮换检查

pub mod context;
pub mod executor;
pub mod maintenance;
pub mod poller;
pub mod runner;
pub mod scheduler;
pub mod template;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, interval_at, timeout};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::errors::{EngineError, Result};
use crate::storage::{Integration, Storage, Workflow};

pub use executor::{
    ActionExecutor, ExecutionOutcome, ExecutorSettings, HttpActionExecutor,
};

/// 一个轮询器的一次轮询
#[derive(Debug, Clone)]
pub struct PollingTask {
    pub tenant_id: i32,
    pub poller: Integration,
    pub workflows: Vec<Workflow>,
}

#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub worker_count: usize,
    pub queue_capacity: usize,
    pub schedule_interval: Duration,
    pub maintenance_interval: Duration,
    pub poll_timeout: Duration,
    /// 调度时直接在当前任务内轮询、重跑也同步执行（测试用）
    pub sync_mode: bool,
}

impl From<&EngineConfig> for EngineSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            worker_count: config.worker_count.max(1),
            queue_capacity: config.queue_capacity.max(1),
            schedule_interval: Duration::from_secs(config.schedule_interval_secs.max(1)),
            maintenance_interval: Duration::from_secs(config.maintenance_interval_secs.max(1)),
            poll_timeout: Duration::from_secs(config.poll_timeout_secs),
            sync_mode: false,
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

pub struct Engine {
    storage: Arc<Storage>,
    executor: Arc<dyn ActionExecutor>,
    settings: EngineSettings,
    /// AuthMind 轮询用的 HTTP 客户端
    http: reqwest::Client,
    task_tx: mpsc::Sender<PollingTask>,
    task_rx: Mutex<Option<mpsc::Receiver<PollingTask>>>,
    /// (tenant_id, poller_id) -> 上次入队时间
    last_run: Mutex<HashMap<(i32, i32), Instant>>,
}

impl Engine {
    pub fn new(
        storage: Arc<Storage>,
        executor: Arc<dyn ActionExecutor>,
        settings: EngineSettings,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.poll_timeout)
            .build()?;
        let (task_tx, task_rx) = mpsc::channel(settings.queue_capacity.max(1));
        Ok(Self {
            storage,
            executor,
            settings,
            http,
            task_tx,
            task_rx: Mutex::new(Some(task_rx)),
            last_run: Mutex::new(HashMap::new()),
        })
    }

    /// 按引擎配置创建，使用 HTTP 执行器
    pub fn from_config(storage: Arc<Storage>, config: &EngineConfig) -> Result<Self> {
        let executor = HttpActionExecutor::new(storage.clone(), ExecutorSettings::from(config))?;
        Self::new(storage, Arc::new(executor), EngineSettings::from(config))
    }

    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// 启动工作者、调度与维护循环
    pub async fn start(self: &Arc<Self>) -> Result<EngineHandle> {
        info!(
            "Starting workflow engine with {} workers...",
            self.settings.worker_count
        );

        match self.storage.fail_stale_running_jobs().await {
            Ok(0) => {}
            Ok(n) => info!("Marked {} stale jobs as failed.", n),
            Err(e) => warn!("Failed to clean up stale jobs: {}", e),
        }

        let rx = self
            .task_rx
            .lock()
            .take()
            .ok_or_else(|| EngineError::execution("engine already started"))?;
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::with_capacity(self.settings.worker_count + 2);

        for id in 0..self.settings.worker_count {
            let engine = self.clone();
            let rx = rx.clone();
            let mut shutdown = shutdown_rx.clone();
            tasks.push(tokio::spawn(async move {
                loop {
                    let task = tokio::select! {
                        _ = shutdown.changed() => break,
                        task = async { rx.lock().await.recv().await } => task,
                    };
                    match task {
                        Some(task) => engine.poll(task).await,
                        None => break,
                    }
                }
                debug!("Worker {} stopped", id);
            }));
        }

        let engine = self.clone();
        let mut shutdown = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            let mut ticker = interval(engine.settings.schedule_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = ticker.tick() => engine.schedule_tick().await,
                }
            }
            debug!("Scheduler stopped");
        }));

        let engine = self.clone();
        let mut shutdown = shutdown_rx;
        tasks.push(tokio::spawn(async move {
            let period = engine.settings.maintenance_interval;
            let mut ticker = interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = ticker.tick() => engine.run_maintenance().await,
                }
            }
            debug!("Maintenance loop stopped");
        }));

        Ok(EngineHandle { shutdown_tx, tasks })
    }
}

/// 运行中的引擎；丢弃前调用 `shutdown`
pub struct EngineHandle {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl EngineHandle {
    /// 通知所有循环退出并等待；超时返回 false
    pub async fn shutdown(self, wait: Duration) -> bool {
        let _ = self.shutdown_tx.send(true);
        match timeout(wait, join_all(self.tasks)).await {
            Ok(_) => {
                info!("Workflow engine stopped");
                true
            }
            Err(_) => {
                warn!("Workflow engine did not stop within {:?}", wait);
                false
            }
        }
    }
}
