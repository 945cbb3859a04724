//! 工作流执行与重跑

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};

use super::Engine;
use super::context::{
    is_manual_rerun, issue_id_of, rerun_context, step_context, str_field, tenant_id_of,
};
use crate::errors::{EngineError, Result};
use crate::storage::backend::DEFAULT_LANGUAGE;
use crate::storage::{JobStatus, LogLevel, MessageTemplate, NewJob, TenantScope, Workflow};

/// 响应体能解析为 JSON 时缩进输出
pub fn format_response(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| serde_json::to_string_pretty(&v).ok())
        .unwrap_or_else(|| body.to_string())
}

impl Engine {
    /// 针对一次触发运行工作流，返回作业 ID；重复触发被跳过时返回 None
    pub async fn run_workflow(&self, workflow: &Workflow, context: Value) -> Result<Option<i32>> {
        let tenant_id = tenant_id_of(&context).unwrap_or(workflow.tenant_id);
        let issue_id = issue_id_of(&context);
        let manual = is_manual_rerun(&context);

        if !manual
            && self
                .storage
                .job_exists(tenant_id, workflow.id, &issue_id)
                .await?
        {
            info!(
                "Job skipped: Duplicate execution for Tenant {}, WF {}, Issue {}",
                tenant_id, workflow.id, issue_id
            );
            return Ok(None);
        }

        let mut new_job = NewJob {
            tenant_id,
            workflow_id: workflow.id,
            authmind_issue_id: issue_id.clone(),
            status: JobStatus::Running,
            trigger_context: context.to_string(),
        };
        let job = match self.storage.create_job(&new_job).await {
            Ok(job) => job,
            Err(EngineError::Conflict(_)) if manual => {
                new_job.authmind_issue_id =
                    format!("{}-rerun-{}", issue_id, Utc::now().timestamp());
                self.storage.create_job(&new_job).await?
            }
            Err(EngineError::Conflict(_)) => {
                info!(
                    "Job skipped: concurrent execution for WF {}, Issue {}",
                    workflow.id, issue_id
                );
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        info!(
            "[Tenant:{}][Workflow:{}] Executing Workflow for {} (Issue:{})",
            tenant_id,
            workflow.name,
            str_field(&context, "UserEmail").unwrap_or("-"),
            issue_id
        );

        let template = self.message_template(tenant_id, workflow, &context).await;
        let succeeded = self
            .run_steps(job.id, tenant_id, workflow, &context, template.as_ref())
            .await;

        let status = if succeeded {
            JobStatus::Completed
        } else {
            JobStatus::Failed
        };
        self.storage.set_job_status(job.id, status).await?;
        Ok(Some(job.id))
    }

    async fn message_template(
        &self,
        tenant_id: i32,
        workflow: &Workflow,
        context: &Value,
    ) -> Option<MessageTemplate> {
        let issue_type = str_field(context, "IssueType").unwrap_or(&workflow.name);
        let language = str_field(context, "Language").unwrap_or(DEFAULT_LANGUAGE);
        match self
            .storage
            .find_message_template(tenant_id, issue_type, language)
            .await
        {
            Ok(template) => template,
            Err(e) => {
                warn!("Failed to load message template for {}: {}", issue_type, e);
                None
            }
        }
    }

    /// 依次执行步骤；遇到失败即停止，返回是否全部成功
    async fn run_steps(
        &self,
        job_id: i32,
        tenant_id: i32,
        workflow: &Workflow,
        context: &Value,
        template: Option<&MessageTemplate>,
    ) -> bool {
        let mut steps: Vec<_> = workflow.steps.iter().collect();
        steps.sort_by_key(|s| s.order);

        for step in steps {
            let definition = match self
                .storage
                .get_action(tenant_id, step.action_definition_id)
                .await
            {
                Ok(Some(definition)) => definition,
                other => {
                    let reason = lookup_failure(other.err());
                    self.log_job(
                        job_id,
                        LogLevel::Error,
                        &format!(
                            "Failed to find action definition {} for tenant {}: {}",
                            step.action_definition_id, tenant_id, reason
                        ),
                    )
                    .await;
                    return false;
                }
            };

            let integration = match self
                .storage
                .get_integration(tenant_id, definition.integration_id)
                .await
            {
                Ok(Some(integration)) => integration,
                other => {
                    let reason = lookup_failure(other.err());
                    self.log_job(
                        job_id,
                        LogLevel::Error,
                        &format!(
                            "Failed to find integration {} for tenant {}: {}",
                            definition.integration_id, tenant_id, reason
                        ),
                    )
                    .await;
                    return false;
                }
            };

            if !integration.enabled {
                self.log_job(
                    job_id,
                    LogLevel::Warn,
                    &format!("Integration {} is disabled, skipping step", integration.name),
                )
                .await;
                continue;
            }

            let step_ctx = step_context(context, template, &step.parameter_mapping);
            let outcome = self
                .executor
                .execute(&integration, &definition, &step_ctx)
                .await;

            match outcome.error {
                Some(err) => {
                    self.log_job(
                        job_id,
                        LogLevel::Error,
                        &format!(
                            "Step {} ({}) failed (Status: {}): {}",
                            step.order, definition.name, outcome.status, err
                        ),
                    )
                    .await;
                    return false;
                }
                None => {
                    let mut message = format!(
                        "Step {} ({}) completed successfully (Status: {})",
                        step.order, definition.name, outcome.status
                    );
                    if !outcome.body.is_empty() {
                        message.push_str("\nResponse: ");
                        message.push_str(&format_response(&outcome.body));
                    }
                    self.log_job(job_id, LogLevel::Info, &message).await;
                }
            }
        }
        true
    }

    async fn log_job(&self, job_id: i32, level: LogLevel, message: &str) {
        if let Err(e) = self.storage.append_job_log(job_id, level, message).await {
            warn!("Failed to write log for job {}: {}", job_id, e);
        }
    }

    /// 重跑作业：同步校验，异步执行
    pub async fn rerun_job(self: &Arc<Self>, job_id: i32, scope: TenantScope) -> Result<()> {
        let job = self
            .storage
            .get_job(scope, job_id)
            .await?
            .ok_or_else(|| EngineError::not_found("job not found"))?;
        let workflow = self
            .storage
            .get_workflow(Some(job.tenant_id), job.workflow_id)
            .await?
            .ok_or_else(|| EngineError::not_found("workflow not found"))?;
        let context = rerun_context(&job);

        info!("Rerunning job {} (workflow {})", job.id, workflow.name);
        if self.settings.sync_mode {
            self.run_workflow(&workflow, context).await?;
            return Ok(());
        }

        let engine = self.clone();
        tokio::spawn(async move {
            if let Err(e) = engine.run_workflow(&workflow, context).await {
                warn!("Rerun of job {} failed: {}", job_id, e);
            }
        });
        Ok(())
    }
}

fn lookup_failure(err: Option<EngineError>) -> String {
    match err {
        Some(e) => e.message().to_string(),
        None => "record not found".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_response() {
        assert_eq!(format_response(r#"{"ok":true}"#), "{\n  \"ok\": true\n}");
        assert_eq!(format_response("plain text"), "plain text");
    }
}
