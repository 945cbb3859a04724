//! 外部厂商 API 客户端

pub mod authmind;
pub mod credentials;
pub mod servicenow;
pub mod slack;
pub mod ssf;

pub use authmind::{AuthMindClient, DetailItem, Incident, Issue, IssueDetails};
pub use credentials::Credentials;
pub use servicenow::{IncidentResponse, ServiceNowClient};
pub use slack::SlackClient;
pub use ssf::{SsfPayload, SsfSigner};
