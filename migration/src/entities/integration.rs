use sea_orm::entity::prelude::*;

// rate_limit 是 f64，只能派生 PartialEq
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "integrations")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
    pub deleted_at: Option<DateTimeUtc>,
    pub tenant_id: i32,
    pub name: String,
    #[sea_orm(column_name = "type")]
    pub integration_type: String,
    #[sea_orm(column_type = "Text")]
    pub base_url: String,
    pub auth_type: String,
    /// JSON 文本，加密存储
    #[sea_orm(column_type = "Text")]
    pub credentials: String,
    pub enabled: bool,
    pub polling_interval: i32,
    #[sea_orm(column_type = "Double")]
    pub rate_limit: f64,
    #[sea_orm(column_type = "Text")]
    pub token_endpoint: String,
    #[sea_orm(column_type = "Text")]
    pub oauth_token: String,
    pub oauth_expires_at: Option<DateTimeUtc>,
    pub last_rotated_at: Option<DateTimeUtc>,
    pub rotation_interval_days: i32,
    pub consecutive_failures: i32,
    pub is_available: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
