//! AAD client-credentials token acquisition for the management API.

use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::AccountConfig;
use crate::error::{ReplicateError, Result};

/// Tokens are refreshed once they get within this margin of expiry.
const REFRESH_MARGIN: Duration = Duration::from_secs(5 * 60);

/// Caching token provider for one service principal.
pub struct TokenProvider {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    scope: String,
    cached: Mutex<Option<CachedToken>>,
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

impl TokenProvider {
    /// Build a provider for the given account's service principal.
    pub fn new(http: reqwest::Client, account: &AccountConfig) -> Self {
        Self {
            http,
            token_url: token_endpoint(&account.tenant_id),
            client_id: account.client_id.clone(),
            client_secret: account.client_secret.clone(),
            scope: format!("{}/.default", account.arm_endpoint.trim_end_matches('/')),
            cached: Mutex::new(None),
        }
    }

    /// Return a valid bearer token, fetching or refreshing as needed.
    pub async fn token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;

        if let Some(entry) = cached.as_ref() {
            if entry.expires_at.saturating_duration_since(Instant::now()) > REFRESH_MARGIN {
                return Ok(entry.token.clone());
            }
        }

        debug!("requesting AAD token for {}", self.scope);
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("scope", self.scope.as_str()),
            ])
            .timeout(Duration::from_secs(30))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let mut body = response.text().await.unwrap_or_default();
            body.truncate(512);
            return Err(ReplicateError::Auth(format!(
                "token request failed ({}): {}",
                status, body
            )));
        }

        let token: TokenResponse = response.json().await?;
        let entry = CachedToken {
            token: token.access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        };
        *cached = Some(entry);

        Ok(token.access_token)
    }
}

fn token_endpoint(tenant_id: &str) -> String {
    format!(
        "https://login.microsoftonline.com/{}/oauth2/v2.0/token",
        tenant_id
    )
}
