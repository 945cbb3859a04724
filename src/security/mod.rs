//! 凭证加密与日志脱敏

pub mod crypto;
pub mod redact;

pub use crypto::{CredentialCipher, ENCRYPTED_PREFIX};
pub use redact::{REDACTED, merge_redacted, redact, redact_value};
