use base64::Engine;
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::RngExt;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::SecurityConfig;
use crate::storage::User;

/// 控制台会话令牌
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    pub user_id: i32,
    pub email: String,
    pub role: String,
    pub exp: i64,
}

/// HS256 令牌签发与校验
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl_hours: i64,
}

/// 32 字节随机值，Base64 编码
fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

impl JwtService {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl_hours,
        }
    }

    pub fn from_config(security: &SecurityConfig) -> Self {
        // 未配置时使用随机密钥，重启后旧令牌全部失效
        let secret = if security.jwt_secret.is_empty() {
            warn!("JWT secret not configured, generating a random one for this process");
            generate_secret()
        } else {
            security.jwt_secret.clone()
        };
        Self::new(&secret, security.token_ttl_hours.max(1))
    }

    pub fn issue(&self, user: &User) -> Result<String, jsonwebtoken::errors::Error> {
        let claims = Claims {
            user_id: user.id,
            email: user.email.clone(),
            role: user.role.clone(),
            exp: (Utc::now() + Duration::hours(self.ttl_hours)).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
    }

    pub fn validate(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let validation = Validation::new(Algorithm::HS256);
        Ok(decode::<Claims>(token, &self.decoding_key, &validation)?.claims)
    }
}
