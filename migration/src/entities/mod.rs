pub mod action_definition;
pub mod audit_log;
pub mod integration;
pub mod job;
pub mod job_log;
pub mod message_template;
pub mod processed_event;
pub mod remediation_recommendation;
pub mod state_store;
pub mod system_setting;
pub mod tenant;
pub mod user;
pub mod workflow;
pub mod workflow_poller;
pub mod workflow_step;

pub use action_definition::Entity as ActionDefinitionEntity;
pub use audit_log::Entity as AuditLogEntity;
pub use integration::Entity as IntegrationEntity;
pub use job::Entity as JobEntity;
pub use job_log::Entity as JobLogEntity;
pub use message_template::Entity as MessageTemplateEntity;
pub use processed_event::Entity as ProcessedEventEntity;
pub use remediation_recommendation::Entity as RemediationRecommendationEntity;
pub use state_store::Entity as StateStoreEntity;
pub use system_setting::Entity as SystemSettingEntity;
pub use tenant::Entity as TenantEntity;
pub use user::Entity as UserEntity;
pub use workflow::Entity as WorkflowEntity;
pub use workflow_poller::Entity as WorkflowPollerEntity;
pub use workflow_step::Entity as WorkflowStepEntity;
