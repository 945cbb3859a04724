pub mod auth;
pub mod rbac;
pub mod request_id;

pub use auth::{ApiAuth, Identity};
pub use rbac::RequireRole;
pub use request_id::RequestIdMiddleware;
