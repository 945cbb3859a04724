//! 启动时的数据初始化：默认管理员、默认租户与 `data/seeds/*.json` 同步
//!
//! 所有写入都是 find-or-create，重复执行不会产生重复数据。

use std::path::Path;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use super::Storage;
use super::models::{
    ActionDefinition, DEFAULT_TENANT_ID, GLOBAL_TENANT_ID, Integration, MessageTemplate,
    RemediationRecommendation, Role, SystemSetting, Tenant, User, Workflow, WorkflowStep,
};
use crate::errors::{EngineError, Result};

pub const DEFAULT_ADMIN_EMAIL: &str = "admin@authmind.com";
pub const DEFAULT_TENANT_NAME: &str = "Default";

/// 默认工作流的步骤（按动作名引用）
const ALL_WORKFLOW_STEPS: &[&str] = &["Disable AD User", "Suspend Okta User", "Notify Security Slack"];
const COMPROMISED_USER_STEPS: &[&str] = &[
    "Disable AD User",
    "Suspend Okta User",
    "Revoke Okta Sessions",
    "Force AD Password Change",
    "Notify Security Slack",
];

#[derive(Debug, Deserialize)]
struct ActionSeed {
    #[serde(flatten)]
    action: ActionDefinition,
    #[serde(default)]
    integration_name: String,
}

/// 读取种子文件；文件不存在时返回 None
fn load_seed_file<T: DeserializeOwned>(dir: &Path, filename: &str) -> Result<Option<Vec<T>>> {
    let path = dir.join(filename);
    let data = match std::fs::read_to_string(&path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(EngineError::file_operation(format!(
                "读取种子文件 {} 失败: {}",
                path.display(),
                e
            )));
        }
    };
    let items = serde_json::from_str(&data).map_err(|e| {
        EngineError::serialization(format!("解析种子文件 {} 失败: {}", filename, e))
    })?;
    Ok(Some(items))
}

/// 种子里的 tenant_id 缺省为默认租户
fn seed_tenant(tenant_id: i32) -> i32 {
    if tenant_id == GLOBAL_TENANT_ID {
        DEFAULT_TENANT_ID
    } else {
        tenant_id
    }
}

/// 没有任何管理员时创建默认管理员
pub async fn seed_default_admin(storage: &Storage) -> Result<bool> {
    if storage.count_admins().await? > 0 {
        return Ok(false);
    }
    let admin = User {
        email: DEFAULT_ADMIN_EMAIL.to_string(),
        name: "Default Administrator".to_string(),
        role: Role::Admin.to_string(),
        provider: "local".to_string(),
        ..Default::default()
    };
    match storage.create_user(&admin).await {
        Ok(_) => {
            info!("Default admin account created: {}", DEFAULT_ADMIN_EMAIL);
            Ok(true)
        }
        Err(e) => {
            warn!("Failed to seed default admin: {}", e);
            Ok(false)
        }
    }
}

/// 租户表为空时创建默认租户，保证调度器至少有一个租户可遍历
pub async fn ensure_default_tenant(storage: &Storage) -> Result<()> {
    if storage.count_tenants().await? > 0 {
        return Ok(());
    }
    let tenant = storage
        .create_tenant(&Tenant {
            name: DEFAULT_TENANT_NAME.to_string(),
            description: "Default tenant".to_string(),
            ..Default::default()
        })
        .await?;
    info!("Default tenant created (id {})", tenant.id);
    Ok(())
}

/// 从种子目录同步数据
///
/// 单个文件解析失败只记录日志，不影响其余文件。
pub async fn sync_seeds(storage: &Storage, dir: &Path) -> Result<()> {
    info!("Syncing seed data from {}", dir.display());

    match load_seed_file::<Tenant>(dir, "tenants.json") {
        Ok(Some(tenants)) => {
            for tenant in &tenants {
                storage.find_or_create_tenant(tenant).await?;
            }
            debug!("Synced {} tenants", tenants.len());
        }
        Ok(None) => {}
        Err(e) => warn!("Skipping tenants seed: {}", e),
    }

    match load_seed_file::<Integration>(dir, "integrations.json") {
        Ok(Some(integrations)) => {
            for seed in integrations {
                let tenant_id = seed_tenant(seed.tenant_id);
                if storage.find_integration_by_name(tenant_id, &seed.name).await?.is_some() {
                    continue;
                }
                let mut integ = seed;
                integ.tenant_id = tenant_id;
                storage.create_integration(&integ).await?;
            }
            debug!("Synced integrations");
        }
        Ok(None) => {}
        Err(e) => warn!("Skipping integrations seed: {}", e),
    }

    match load_seed_file::<ActionSeed>(dir, "actions.json") {
        Ok(Some(actions)) => {
            for seed in actions {
                let mut action = seed.action;
                action.tenant_id = seed_tenant(action.tenant_id);
                if storage
                    .find_action_by_name(action.tenant_id, &action.name)
                    .await?
                    .is_some()
                {
                    continue;
                }
                if action.integration_id == 0 && !seed.integration_name.is_empty() {
                    match storage
                        .find_integration_by_name(action.tenant_id, &seed.integration_name)
                        .await?
                    {
                        Some(integ) => action.integration_id = integ.id,
                        None => warn!(
                            "Seed action {} references unknown integration {}",
                            action.name, seed.integration_name
                        ),
                    }
                }
                storage.create_action(&action).await?;
            }
            debug!("Synced action definitions");
        }
        Ok(None) => {}
        Err(e) => warn!("Skipping actions seed: {}", e),
    }

    match load_seed_file::<Workflow>(dir, "workflows.json") {
        Ok(Some(workflows)) => {
            for seed in workflows {
                let tenant_id = seed_tenant(seed.tenant_id);
                if storage.find_workflow_by_name(tenant_id, &seed.name).await?.is_some() {
                    continue;
                }
                storage.create_workflow(tenant_id, &seed).await?;
            }
            debug!("Synced workflows");
        }
        Ok(None) => {}
        Err(e) => warn!("Skipping workflows seed: {}", e),
    }

    match load_seed_file::<SystemSetting>(dir, "settings.json") {
        Ok(Some(settings)) => {
            for setting in &settings {
                storage.find_or_create_setting(setting).await?;
            }
            debug!("Synced {} system settings", settings.len());
        }
        Ok(None) => {}
        Err(e) => warn!("Skipping settings seed: {}", e),
    }

    match load_seed_file::<MessageTemplate>(dir, "templates.json") {
        Ok(Some(templates)) => {
            for template in &templates {
                storage.find_or_create_template(template).await?;
            }
            debug!("Synced {} message templates", templates.len());
        }
        Ok(None) => {}
        Err(e) => warn!("Skipping templates seed: {}", e),
    }

    match load_seed_file::<RemediationRecommendation>(dir, "recommendations.json") {
        Ok(Some(recommendations)) => {
            for rec in &recommendations {
                storage.find_or_create_recommendation(rec).await?;
            }
            debug!("Synced {} remediation recommendations", recommendations.len());
        }
        Ok(None) => {}
        Err(e) => warn!("Skipping recommendations seed: {}", e),
    }

    seed_default_workflow_steps(storage).await?;

    info!("Seed data sync complete");
    Ok(())
}

/// 默认租户的 "All" 与 "Compromised User" 工作流没有步骤时补上默认步骤
///
/// 找不到的动作直接跳过。
pub async fn seed_default_workflow_steps(storage: &Storage) -> Result<()> {
    for (workflow_name, action_names) in [
        ("All", ALL_WORKFLOW_STEPS),
        ("Compromised User", COMPROMISED_USER_STEPS),
    ] {
        let Some(workflow) = storage
            .find_workflow_by_name(DEFAULT_TENANT_ID, workflow_name)
            .await?
        else {
            continue;
        };
        if storage.count_steps(workflow.id).await? > 0 {
            continue;
        }
        for (idx, action_name) in action_names.iter().enumerate() {
            let Some(action) = storage
                .find_action_by_name(DEFAULT_TENANT_ID, action_name)
                .await?
            else {
                continue;
            };
            let step = WorkflowStep {
                order: idx as i32 + 1,
                action_definition_id: action.id,
                ..Default::default()
            };
            storage.add_step(workflow.id, &step).await?;
        }
        info!("Default steps seeded for workflow {}", workflow_name);
    }
    Ok(())
}
