//! 轮询调度

use std::time::{Duration, Instant};

use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use super::{Engine, PollingTask};
use crate::errors::Result;
use crate::storage::Integration;

const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

/// 轮询器的有效间隔；<= 0 时取 60 秒
pub fn poll_interval(poller: &Integration) -> Duration {
    match u64::try_from(poller.polling_interval) {
        Ok(secs) if secs > 0 => Duration::from_secs(secs),
        _ => Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
    }
}

impl Engine {
    /// 一次调度：遍历所有租户
    pub async fn schedule_tick(&self) {
        let tenants = match self.storage.list_tenants().await {
            Ok(tenants) => tenants,
            Err(e) => {
                warn!("Failed to fetch tenants: {}", e);
                return;
            }
        };
        for tenant in tenants {
            if let Err(e) = self.schedule_for_tenant(tenant.id).await {
                warn!("Scheduling failed for tenant {}: {}", tenant.id, e);
            }
        }
    }

    async fn schedule_for_tenant(&self, tenant_id: i32) -> Result<()> {
        let pollers = self.storage.list_enabled_pollers(tenant_id).await?;
        for poller in pollers {
            let workflows = match self.storage.workflows_for_poller(tenant_id, poller.id).await {
                Ok(workflows) => workflows,
                Err(e) => {
                    warn!("Failed to load workflows for poller {}: {}", poller.id, e);
                    continue;
                }
            };
            if workflows.is_empty() {
                continue;
            }
            if !self.claim_poll_slot(tenant_id, &poller) {
                continue;
            }
            self.dispatch(PollingTask {
                tenant_id,
                poller,
                workflows,
            })
            .await;
        }
        Ok(())
    }

    /// 距上次入队已超过轮询间隔时占位并返回 true
    fn claim_poll_slot(&self, tenant_id: i32, poller: &Integration) -> bool {
        let interval = poll_interval(poller);
        let mut last_run = self.last_run.lock();
        let key = (tenant_id, poller.id);
        match last_run.get(&key) {
            Some(at) if at.elapsed() < interval => false,
            _ => {
                last_run.insert(key, Instant::now());
                true
            }
        }
    }

    async fn dispatch(&self, task: PollingTask) {
        if self.settings.sync_mode {
            self.poll(task).await;
            return;
        }
        match self.task_tx.try_send(task) {
            Ok(()) => {}
            Err(TrySendError::Full(task)) => warn!(
                "Task queue full, skipping poll for Tenant {} Poller {}",
                task.tenant_id, task.poller.id
            ),
            Err(TrySendError::Closed(task)) => debug!(
                "Task queue closed, dropping poll for Tenant {} Poller {}",
                task.tenant_id, task.poller.id
            ),
        }
    }
}
