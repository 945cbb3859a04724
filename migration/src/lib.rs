pub use sea_orm_migration::prelude::*;

pub mod entities;
mod m20251101_000001_tenants_users;
mod m20251101_000002_integrations;
mod m20251101_000003_workflows;
mod m20251101_000004_jobs;
mod m20251101_000005_settings_templates;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20251101_000001_tenants_users::Migration),
            Box::new(m20251101_000002_integrations::Migration),
            Box::new(m20251101_000003_workflows::Migration),
            Box::new(m20251101_000004_jobs::Migration),
            Box::new(m20251101_000005_settings_templates::Migration),
        ]
    }
}
