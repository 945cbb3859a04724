use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 创建 integrations 表
        manager
            .create_table(
                Table::create()
                    .table(Integration::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Integration::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Integration::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Integration::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Integration::DeletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Integration::TenantId).integer().not_null())
                    .col(ColumnDef::new(Integration::Name).string().not_null())
                    .col(
                        ColumnDef::new(Integration::Type)
                            .string()
                            .not_null()
                            .default("REST"),
                    )
                    .col(
                        ColumnDef::new(Integration::BaseUrl)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(Integration::AuthType)
                            .string()
                            .not_null()
                            .default("none"),
                    )
                    .col(
                        ColumnDef::new(Integration::Credentials)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(Integration::Enabled)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Integration::PollingInterval)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Integration::RateLimit)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(Integration::TokenEndpoint)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(Integration::OauthToken)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(Integration::OauthExpiresAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Integration::LastRotatedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Integration::RotationIntervalDays)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Integration::ConsecutiveFailures)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Integration::IsAvailable)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .to_owned(),
            )
            .await?;

        // (tenant_id, name) 唯一
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_integrations_tenant_name")
                    .table(Integration::Table)
                    .col(Integration::TenantId)
                    .col(Integration::Name)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // 创建 action_definitions 表
        manager
            .create_table(
                Table::create()
                    .table(ActionDefinition::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ActionDefinition::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ActionDefinition::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ActionDefinition::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ActionDefinition::TenantId)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ActionDefinition::Name).string().not_null())
                    .col(
                        ColumnDef::new(ActionDefinition::Vendor)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(ActionDefinition::IntegrationId)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ActionDefinition::Method)
                            .string()
                            .not_null()
                            .default("POST"),
                    )
                    .col(
                        ColumnDef::new(ActionDefinition::PathTemplate)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(ActionDefinition::BodyTemplate)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(ActionDefinition::SuccessField)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(ActionDefinition::RetryCount)
                            .integer()
                            .not_null()
                            .default(3),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_action_definitions_tenant")
                    .table(ActionDefinition::Table)
                    .col(ActionDefinition::TenantId)
                    .col(ActionDefinition::Name)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ActionDefinition::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Integration::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Integration {
    #[sea_orm(iden = "integrations")]
    Table,
    Id,
    CreatedAt,
    UpdatedAt,
    DeletedAt,
    TenantId,
    Name,
    Type,
    BaseUrl,
    AuthType,
    Credentials,
    Enabled,
    PollingInterval,
    RateLimit,
    TokenEndpoint,
    OauthToken,
    OauthExpiresAt,
    LastRotatedAt,
    RotationIntervalDays,
    ConsecutiveFailures,
    IsAvailable,
}

#[derive(DeriveIden)]
enum ActionDefinition {
    #[sea_orm(iden = "action_definitions")]
    Table,
    Id,
    CreatedAt,
    UpdatedAt,
    TenantId,
    Name,
    Vendor,
    IntegrationId,
    Method,
    PathTemplate,
    BodyTemplate,
    SuccessField,
    RetryCount,
}
