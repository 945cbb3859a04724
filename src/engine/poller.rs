//! AuthMind 拉取：游标推进、工作流匹配与触发

use tracing::{info, warn};

use super::context::{MATCH_ALL_WORKFLOW, trigger_context, workflow_matches};
use super::{Engine, PollingTask};
use crate::errors::Result;
use crate::integrations::{AuthMindClient, Credentials, IssueDetails};
use crate::storage::backend::poll_cursor_key;
use crate::storage::{Severity, Workflow};

/// 游标不存在时的起点
const INITIAL_CURSOR: &str = "0";

impl Engine {
    /// 执行一次轮询任务，错误只记录日志
    pub async fn poll(&self, task: PollingTask) {
        if let Err(e) = self.poll_issues(&task).await {
            warn!(
                "Failed to fetch issues for Tenant {}: {}",
                task.tenant_id, e
            );
        }
    }

    async fn poll_issues(&self, task: &PollingTask) -> Result<()> {
        let tenant_id = task.tenant_id;
        let creds = Credentials::lenient(&task.poller.credentials);
        let client = AuthMindClient::new(self.http.clone(), &task.poller.base_url, &creds.get("token"));

        let cursor_key = poll_cursor_key(tenant_id, task.poller.id);
        let cursor = match self.storage.get_state(&cursor_key).await? {
            Some(value) => value,
            None => {
                self.storage.set_state(&cursor_key, INITIAL_CURSOR).await?;
                INITIAL_CURSOR.to_string()
            }
        };

        let issues = client.get_issues("", &cursor).await?;
        if !issues.is_empty() {
            info!(
                "Tenant {}: Fetched {} new issues from AuthMind (LastID: {})",
                tenant_id,
                issues.len(),
                cursor
            );
        }

        for issue in issues {
            info!(
                "Tenant {}: Processing Issue {} (Type: {}, Severity: {})",
                tenant_id, issue.issue_id, issue.issue_type, issue.severity
            );
            if let Err(e) = self
                .storage
                .record_processed_event(tenant_id, &issue.issue_id)
                .await
            {
                warn!("Failed to record processed event {}: {}", issue.issue_id, e);
            }

            let matching: Vec<&Workflow> = task
                .workflows
                .iter()
                .filter(|wf| {
                    let matched = workflow_matches(wf, &issue);
                    if !matched && (wf.name == issue.issue_type || wf.name == MATCH_ALL_WORKFLOW) {
                        info!(
                            "Skipping WF '{}' - Severity too low (Issue: {} < WF: {})",
                            wf.name,
                            issue.severity,
                            Severity::score_of(&wf.min_severity)
                        );
                    }
                    matched
                })
                .collect();

            if matching.is_empty() {
                info!(
                    "Tenant {}: No matching workflows found for Issue {}",
                    tenant_id, issue.issue_id
                );
            } else {
                let details = match client.get_issue_details(&issue.issue_id).await {
                    Ok(details) => details,
                    Err(e) => {
                        warn!(
                            "Failed to fetch details for issue {}: {}",
                            issue.issue_id, e
                        );
                        IssueDetails::unavailable()
                    }
                };
                let context = trigger_context(tenant_id, &issue, &details);
                for workflow in matching {
                    info!(
                        "Tenant {}: Queuing execution for WF '{}' on Issue {}",
                        tenant_id, workflow.name, issue.issue_id
                    );
                    if let Err(e) = self.run_workflow(workflow, context.clone()).await {
                        warn!(
                            "Workflow '{}' failed to start for Issue {}: {}",
                            workflow.name, issue.issue_id, e
                        );
                    }
                }
            }

            self.storage.set_state(&cursor_key, &issue.issue_id).await?;
        }
        Ok(())
    }
}
