use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "action_definitions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
    pub tenant_id: i32,
    pub name: String,
    pub vendor: String,
    pub integration_id: i32,
    pub method: String,
    #[sea_orm(column_type = "Text")]
    pub path_template: String,
    #[sea_orm(column_type = "Text")]
    pub body_template: String,
    pub success_field: String,
    pub retry_count: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
