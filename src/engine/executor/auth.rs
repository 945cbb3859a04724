//! 请求鉴权与 OAuth2 client_credentials 令牌刷新

use chrono::{Duration, Utc};
use reqwest::RequestBuilder;
use serde::Deserialize;
use tracing::{info, warn};

use super::HttpActionExecutor;
use crate::errors::{EngineError, Result};
use crate::integrations::Credentials;
use crate::storage::Integration;

const DEFAULT_API_KEY_HEADER: &str = "X-API-Key";
/// 距离过期不足该时长即刷新
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// 缓存的令牌是否需要刷新
pub fn oauth_token_stale(integ: &Integration) -> bool {
    match integ.oauth_expires_at {
        _ if integ.oauth_token.is_empty() => true,
        None => true,
        Some(expires_at) => Utc::now() + Duration::seconds(TOKEN_REFRESH_MARGIN_SECS) > expires_at,
    }
}

impl HttpActionExecutor {
    /// 按 auth_type 给请求加上凭据；oauth2 会在需要时刷新并写回 `integ`
    pub(crate) async fn apply_auth(
        &self,
        builder: RequestBuilder,
        integ: &mut Integration,
    ) -> Result<RequestBuilder> {
        let creds = Credentials::lenient(&integ.credentials);
        let builder = match integ.auth_type.as_str() {
            "basic" => builder.basic_auth(creds.get("username"), Some(creds.get("password"))),
            "bearer" => builder.bearer_auth(creds.get("token")),
            "apikey" => builder.header(
                creds.get_or("header_name", DEFAULT_API_KEY_HEADER),
                creds.get("api_key"),
            ),
            "oauth2" => {
                if oauth_token_stale(integ) {
                    self.refresh_oauth2_token(integ, &creds)
                        .await
                        .map_err(|e| {
                            EngineError::integration(format!(
                                "oauth2 refresh failed: {}",
                                e.message()
                            ))
                        })?;
                }
                builder.bearer_auth(&integ.oauth_token)
            }
            _ => builder,
        };
        Ok(builder)
    }

    async fn refresh_oauth2_token(&self, integ: &mut Integration, creds: &Credentials) -> Result<()> {
        if self.settings.debug {
            info!("Refreshing OAuth2 token for {}", integ.name);
        }

        let client_id = creds.get("client_id");
        let client_secret = creds.get("client_secret");
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", client_id.as_str()),
            ("client_secret", client_secret.as_str()),
        ];

        let resp = self
            .client
            .post(&integ.token_endpoint)
            .form(&form)
            .send()
            .await?;

        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            return Err(EngineError::integration(format!(
                "auth server returned {}: {}",
                status.as_u16(),
                body
            )));
        }

        let data: TokenResponse = resp.json().await?;
        let now = Utc::now();
        let expires_at = Duration::try_seconds(data.expires_in)
            .and_then(|d| now.checked_add_signed(d))
            .unwrap_or(now);

        if let Err(e) = self
            .storage
            .save_oauth_token(integ.id, &data.access_token, expires_at)
            .await
        {
            warn!("Failed to persist OAuth2 token for {}: {}", integ.name, e);
        }

        integ.oauth_token = data.access_token;
        integ.oauth_expires_at = Some(expires_at);
        Ok(())
    }
}
