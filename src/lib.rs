//! Remediation Engine - multi-tenant security remediation service
//!
//! Polls an identity-analytics platform for issues, matches them to
//! workflows and runs templated actions against third-party vendor APIs
//! with retries, rate limiting and per-integration circuit breaking.
//!
//! # Architecture
//! - `storage`: Persistence (sea-orm) for tenants, integrations, actions, workflows and jobs
//! - `security`: Credential encryption and role model
//! - `engine`: Template rendering, action execution and workflow orchestration
//! - `integrations`: Issue-source client and vendor helpers (OAuth, SSF)
//! - `api`: HTTP services and middleware
//! - `config`: Configuration management
//! - `runtime`: Application lifecycle and execution modes
//! - `system`: Logging

pub mod api;
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod integrations;
pub mod runtime;
pub mod security;
pub mod storage;
pub mod system;
