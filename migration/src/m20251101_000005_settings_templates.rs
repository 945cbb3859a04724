use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 创建 system_settings 表
        manager
            .create_table(
                Table::create()
                    .table(SystemSetting::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SystemSetting::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SystemSetting::Key).string().not_null())
                    .col(ColumnDef::new(SystemSetting::Value).text().not_null())
                    .col(
                        ColumnDef::new(SystemSetting::Description)
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
                    .name("idx_system_settings_key")
                    .table(SystemSetting::Table)
                    .col(SystemSetting::Key)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // 创建 message_templates 表
        manager
            .create_table(
                Table::create()
                    .table(MessageTemplate::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MessageTemplate::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(MessageTemplate::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MessageTemplate::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MessageTemplate::TenantId)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MessageTemplate::IssueType)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MessageTemplate::Language)
                            .string()
                            .not_null()
                            .default("en"),
                    )
                    .col(
                        ColumnDef::new(MessageTemplate::Title)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(MessageTemplate::Message)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(MessageTemplate::Footer)
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
                    .name("idx_message_templates_tenant_issue_lang")
                    .table(MessageTemplate::Table)
                    .col(MessageTemplate::TenantId)
                    .col(MessageTemplate::IssueType)
                    .col(MessageTemplate::Language)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // 创建 remediation_recommendations 表
        manager
            .create_table(
                Table::create()
                    .table(RemediationRecommendation::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RemediationRecommendation::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(RemediationRecommendation::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RemediationRecommendation::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RemediationRecommendation::IssueType)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RemediationRecommendation::Title)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(RemediationRecommendation::Description)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(RemediationRecommendation::Steps)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(RemediationRecommendation::ReferenceUrl)
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
                    .name("idx_remediation_recommendations_issue_type")
                    .table(RemediationRecommendation::Table)
                    .col(RemediationRecommendation::IssueType)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(RemediationRecommendation::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(MessageTemplate::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(SystemSetting::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum SystemSetting {
    #[sea_orm(iden = "system_settings")]
    Table,
    Id,
    Key,
    Value,
    Description,
}

#[derive(DeriveIden)]
enum MessageTemplate {
    #[sea_orm(iden = "message_templates")]
    Table,
    Id,
    CreatedAt,
    UpdatedAt,
    TenantId,
    IssueType,
    Language,
    Title,
    Message,
    Footer,
}

#[derive(DeriveIden)]
enum RemediationRecommendation {
    #[sea_orm(iden = "remediation_recommendations")]
    Table,
    Id,
    CreatedAt,
    UpdatedAt,
    IssueType,
    Title,
    Description,
    Steps,
    ReferenceUrl,
}
