use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 创建 jobs 表
        manager
            .create_table(
                Table::create()
                    .table(Job::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Job::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Job::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Job::TenantId).integer().not_null())
                    .col(ColumnDef::new(Job::WorkflowId).integer().not_null())
                    .col(ColumnDef::new(Job::Status).string().not_null())
                    .col(ColumnDef::new(Job::AuthmindIssueId).string().not_null())
                    .col(
                        ColumnDef::new(Job::TriggerContext)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .to_owned(),
            )
            .await?;

        // 同一 workflow 对同一 issue 只执行一次
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_jobs_workflow_issue")
                    .table(Job::Table)
                    .col(Job::WorkflowId)
                    .col(Job::AuthmindIssueId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_jobs_tenant_created")
                    .table(Job::Table)
                    .col(Job::TenantId)
                    .col(Job::CreatedAt)
                    .to_owned(),
            )
            .await?;

        // 创建 job_logs 表
        manager
            .create_table(
                Table::create()
                    .table(JobLog::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(JobLog::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(JobLog::JobId).integer().not_null())
                    .col(
                        ColumnDef::new(JobLog::Timestamp)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(JobLog::Level).string().not_null())
                    .col(ColumnDef::new(JobLog::Message).text().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_job_logs_job")
                    .table(JobLog::Table)
                    .col(JobLog::JobId)
                    .to_owned(),
            )
            .await?;

        // 创建 processed_events 表
        manager
            .create_table(
                Table::create()
                    .table(ProcessedEvent::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProcessedEvent::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ProcessedEvent::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProcessedEvent::TenantId)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProcessedEvent::AuthmindIssueId)
                            .string()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_processed_events_tenant")
                    .table(ProcessedEvent::Table)
                    .col(ProcessedEvent::TenantId)
                    .to_owned(),
            )
            .await?;

        // 创建 state_store 表
        manager
            .create_table(
                Table::create()
                    .table(StateStore::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(StateStore::Key)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(StateStore::Value).text().not_null())
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(StateStore::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(ProcessedEvent::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(JobLog::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Job::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Job {
    #[sea_orm(iden = "jobs")]
    Table,
    Id,
    CreatedAt,
    TenantId,
    WorkflowId,
    Status,
    AuthmindIssueId,
    TriggerContext,
}

#[derive(DeriveIden)]
enum JobLog {
    #[sea_orm(iden = "job_logs")]
    Table,
    Id,
    JobId,
    Timestamp,
    Level,
    Message,
}

#[derive(DeriveIden)]
enum ProcessedEvent {
    #[sea_orm(iden = "processed_events")]
    Table,
    Id,
    CreatedAt,
    TenantId,
    AuthmindIssueId,
}

#[derive(DeriveIden)]
enum StateStore {
    #[sea_orm(iden = "state_store")]
    Table,
    Key,
    Value,
}
