//! Mode routing
//!
//! - `serve`: HTTP server plus workflow engine
//! - `migrate`: data tasks only
//! - `config generate`: sample configuration

pub mod migrate;
pub mod server;

pub use migrate::run_migrate;
pub use server::run_server;
