//! Model <-> 对外结构转换
//!
//! 加解密不在这里做，调用方负责传入明文/密文。

use chrono::{DateTime, Utc};
use sea_orm::ActiveValue::{NotSet, Set};

use crate::storage::models::{
    ActionDefinition, AuditLogEntry, Integration, Job, JobLog, MessageTemplate, SystemSetting,
    Tenant, User, Workflow, WorkflowStep,
};
use migration::entities::{
    action_definition, audit_log, integration, job, job_log, message_template, system_setting,
    tenant, user, workflow, workflow_step,
};

pub fn model_to_tenant(model: tenant::Model, api_key: Option<String>) -> Tenant {
    Tenant {
        id: model.id,
        created_at: model.created_at,
        updated_at: model.updated_at,
        name: model.name,
        description: model.description,
        api_key,
    }
}

pub fn model_to_user(model: user::Model) -> User {
    User {
        id: model.id,
        created_at: model.created_at,
        email: model.email,
        name: model.name,
        role: model.role,
        provider: model.provider,
    }
}

pub fn model_to_audit(model: audit_log::Model) -> AuditLogEntry {
    AuditLogEntry {
        id: model.id,
        timestamp: model.timestamp,
        user_id: model.user_id,
        tenant_id: model.tenant_id,
        action: model.action,
        resource: model.resource,
        target_id: model.target_id,
        details: model.details,
        ip: model.ip,
    }
}

/// `credentials` 为已解密的明文
pub fn model_to_integration(model: integration::Model, credentials: String) -> Integration {
    Integration {
        id: model.id,
        created_at: model.created_at,
        updated_at: model.updated_at,
        tenant_id: model.tenant_id,
        name: model.name,
        integration_type: model.integration_type,
        base_url: model.base_url,
        auth_type: model.auth_type,
        credentials,
        enabled: model.enabled,
        polling_interval: model.polling_interval,
        rate_limit: model.rate_limit,
        token_endpoint: model.token_endpoint,
        oauth_token: model.oauth_token,
        oauth_expires_at: model.oauth_expires_at,
        last_rotated_at: model.last_rotated_at,
        rotation_interval_days: model.rotation_interval_days,
        consecutive_failures: model.consecutive_failures,
        is_available: model.is_available,
        tenant: None,
    }
}

/// 新建用的 ActiveModel；`encrypted_credentials` 为密文
pub fn integration_to_active_model(
    integ: &Integration,
    encrypted_credentials: String,
    now: DateTime<Utc>,
) -> integration::ActiveModel {
    integration::ActiveModel {
        id: NotSet,
        created_at: Set(now),
        updated_at: Set(now),
        deleted_at: Set(None),
        tenant_id: Set(integ.tenant_id),
        name: Set(integ.name.clone()),
        integration_type: Set(integ.integration_type.clone()),
        base_url: Set(integ.base_url.clone()),
        auth_type: Set(integ.auth_type.clone()),
        credentials: Set(encrypted_credentials),
        enabled: Set(integ.enabled),
        polling_interval: Set(integ.polling_interval),
        rate_limit: Set(integ.rate_limit),
        token_endpoint: Set(integ.token_endpoint.clone()),
        oauth_token: Set(String::new()),
        oauth_expires_at: Set(None),
        last_rotated_at: Set(integ.last_rotated_at),
        rotation_interval_days: Set(integ.rotation_interval_days),
        consecutive_failures: Set(0),
        is_available: Set(true),
    }
}

pub fn model_to_action(model: action_definition::Model) -> ActionDefinition {
    ActionDefinition {
        id: model.id,
        created_at: model.created_at,
        updated_at: model.updated_at,
        tenant_id: model.tenant_id,
        name: model.name,
        vendor: model.vendor,
        integration_id: model.integration_id,
        method: model.method,
        path_template: model.path_template,
        body_template: model.body_template,
        success_field: model.success_field,
        retry_count: model.retry_count,
    }
}

pub fn action_to_active_model(
    action: &ActionDefinition,
    now: DateTime<Utc>,
    is_new: bool,
) -> action_definition::ActiveModel {
    let method = if action.method.is_empty() {
        "POST".to_string()
    } else {
        action.method.to_uppercase()
    };
    action_definition::ActiveModel {
        id: if is_new { NotSet } else { Set(action.id) },
        created_at: if is_new { Set(now) } else { NotSet },
        updated_at: Set(now),
        tenant_id: Set(action.tenant_id),
        name: Set(action.name.clone()),
        vendor: Set(action.vendor.clone()),
        integration_id: Set(action.integration_id),
        method: Set(method),
        path_template: Set(action.path_template.clone()),
        body_template: Set(action.body_template.clone()),
        success_field: Set(action.success_field.clone()),
        retry_count: Set(action.retry_count),
    }
}

/// 不含 pollers/steps 的工作流
pub fn model_to_workflow(model: workflow::Model) -> Workflow {
    Workflow {
        id: model.id,
        created_at: model.created_at,
        updated_at: model.updated_at,
        tenant_id: model.tenant_id,
        name: model.name,
        description: model.description,
        enabled: model.enabled,
        trigger_type: model.trigger_type,
        min_severity: model.min_severity,
        pollers: Vec::new(),
        steps: Vec::new(),
    }
}

pub fn model_to_step(
    model: workflow_step::Model,
    definition: Option<ActionDefinition>,
) -> WorkflowStep {
    WorkflowStep {
        id: model.id,
        workflow_id: model.workflow_id,
        order: model.step_order,
        action_definition_id: model.action_definition_id,
        definition,
        parameter_mapping: model.parameter_mapping,
    }
}

pub fn step_to_active_model(step: &WorkflowStep, workflow_id: i32) -> workflow_step::ActiveModel {
    workflow_step::ActiveModel {
        id: NotSet,
        workflow_id: Set(workflow_id),
        step_order: Set(step.order),
        action_definition_id: Set(step.action_definition_id),
        parameter_mapping: Set(step.parameter_mapping.clone()),
    }
}

pub fn model_to_job(model: job::Model) -> Job {
    Job {
        id: model.id,
        created_at: model.created_at,
        tenant_id: model.tenant_id,
        workflow_id: model.workflow_id,
        workflow: None,
        status: model.status,
        authmind_issue_id: model.authmind_issue_id,
        trigger_context: model.trigger_context,
    }
}

pub fn model_to_job_log(model: job_log::Model) -> JobLog {
    JobLog {
        id: model.id,
        job_id: model.job_id,
        timestamp: model.timestamp,
        level: model.level,
        message: model.message,
    }
}

pub fn model_to_setting(model: system_setting::Model) -> SystemSetting {
    SystemSetting {
        id: model.id,
        key: model.key,
        value: model.value,
        description: model.description,
    }
}

pub fn model_to_template(model: message_template::Model) -> MessageTemplate {
    MessageTemplate {
        id: model.id,
        created_at: model.created_at,
        updated_at: model.updated_at,
        tenant_id: model.tenant_id,
        issue_type: model.issue_type,
        language: model.language,
        title: model.title,
        message: model.message,
        footer: model.footer,
    }
}
