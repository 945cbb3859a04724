pub mod actions;
pub mod auth;
pub mod helpers;
pub mod integrations;
pub mod jobs;
pub mod routes;
pub mod settings;
pub mod tenants;
pub mod workflows;
