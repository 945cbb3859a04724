use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 创建 workflows 表
        manager
            .create_table(
                Table::create()
                    .table(Workflow::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Workflow::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Workflow::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Workflow::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Workflow::DeletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Workflow::TenantId).integer().not_null())
                    .col(ColumnDef::new(Workflow::Name).string().not_null())
                    .col(
                        ColumnDef::new(Workflow::Description)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(Workflow::Enabled)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Workflow::TriggerType)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(Workflow::MinSeverity)
                            .string()
                            .not_null()
                            .default("Low"),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_workflows_tenant")
                    .table(Workflow::Table)
                    .col(Workflow::TenantId)
                    .col(Workflow::Name)
                    .to_owned(),
            )
            .await?;

        // workflow <-> poller 多对多关联表
        manager
            .create_table(
                Table::create()
                    .table(WorkflowPoller::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(WorkflowPoller::WorkflowId)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WorkflowPoller::IntegrationId)
                            .integer()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(WorkflowPoller::WorkflowId)
                            .col(WorkflowPoller::IntegrationId),
                    )
                    .to_owned(),
            )
            .await?;

        // 创建 workflow_steps 表
        manager
            .create_table(
                Table::create()
                    .table(WorkflowStep::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(WorkflowStep::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(WorkflowStep::WorkflowId).integer().not_null())
                    .col(
                        ColumnDef::new(WorkflowStep::StepOrder)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(WorkflowStep::ActionDefinitionId)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WorkflowStep::ParameterMapping)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_workflow_steps_workflow")
                    .table(WorkflowStep::Table)
                    .col(WorkflowStep::WorkflowId)
                    .col(WorkflowStep::StepOrder)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(WorkflowStep::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(WorkflowPoller::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Workflow::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Workflow {
    #[sea_orm(iden = "workflows")]
    Table,
    Id,
    CreatedAt,
    UpdatedAt,
    DeletedAt,
    TenantId,
    Name,
    Description,
    Enabled,
    TriggerType,
    MinSeverity,
}

#[derive(DeriveIden)]
enum WorkflowPoller {
    #[sea_orm(iden = "workflow_pollers")]
    Table,
    WorkflowId,
    IntegrationId,
}

#[derive(DeriveIden)]
enum WorkflowStep {
    #[sea_orm(iden = "workflow_steps")]
    Table,
    Id,
    WorkflowId,
    StepOrder,
    ActionDefinitionId,
    ParameterMapping,
}
