//! 定期维护：数据保留与凭据轮换提醒

use chrono::{TimeDelta, Utc};
use serde_json::json;
use tracing::{info, warn};

use super::Engine;
use crate::errors::Result;
use crate::storage::AuditRecord;

/// 作业保留天数的设置项；<= 0 表示永久保留
pub const RETENTION_SETTING_KEY: &str = "data_retention_days";

impl Engine {
    pub async fn run_maintenance(&self) {
        if let Err(e) = self.run_retention().await {
            warn!("[Retention] Cleanup failed: {}", e);
        }
        if let Err(e) = self.check_rotation().await {
            warn!("[Rotation] Check failed: {}", e);
        }
    }

    /// 删除保留期之前的作业和日志，返回删除的作业数
    pub async fn run_retention(&self) -> Result<u64> {
        let Some(setting) = self.storage.get_setting(RETENTION_SETTING_KEY).await? else {
            return Ok(0);
        };
        let days = match setting.value.trim().parse::<i64>() {
            Ok(days) if days > 0 => days,
            _ => return Ok(0),
        };

        let Some(cutoff) = TimeDelta::try_days(days).and_then(|d| Utc::now().checked_sub_signed(d))
        else {
            warn!(
                "[Retention] {} = {} is out of range, skipping cleanup",
                RETENTION_SETTING_KEY, days
            );
            return Ok(0);
        };
        info!(
            "[Retention] Running cleanup for data older than {} days (Cutoff: {})...",
            days, cutoff
        );
        let removed = self.storage.purge_jobs_before(cutoff).await?;
        info!("[Retention] Cleanup complete. Removed {} job records.", removed);

        if let Err(e) = self.storage.vacuum().await {
            warn!("[Retention] VACUUM failed: {}", e);
        }
        Ok(removed)
    }

    /// 记录到期未轮换凭据的集成，返回其 ID
    pub async fn check_rotation(&self) -> Result<Vec<i32>> {
        let due = self
            .storage
            .integrations_due_for_rotation(Utc::now())
            .await?;
        let mut ids = Vec::with_capacity(due.len());
        for integ in due {
            warn!(
                "[Rotation] Credentials for integration {} (tenant {}) are due for rotation",
                integ.name, integ.tenant_id
            );
            let record = AuditRecord::new("ROTATION_DUE", "integration")
                .tenant(integ.tenant_id)
                .target(integ.id)
                .details(json!({
                    "name": integ.name,
                    "rotation_interval_days": integ.rotation_interval_days,
                    "last_rotated_at": integ.last_rotated_at,
                }));
            if let Err(e) = self.storage.record_audit(record).await {
                warn!("Failed to audit rotation for {}: {}", integ.name, e);
            }
            ids.push(integ.id);
        }
        Ok(ids)
    }
}
