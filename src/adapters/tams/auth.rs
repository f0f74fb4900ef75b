//! Bearer tokens for the TAMS API.

use crate::ports::tams::TamsError;
use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// Tokens are refreshed this long before the server says they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub enum Credentials {
    Anonymous,
    Static(String),
    /// OAuth2 client-credentials grant.
    ClientCredentials {
        token_url: String,
        client_id: String,
        client_secret: String,
        scopes: Vec<String>,
    },
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

pub struct TokenProvider {
    client: Client,
    credentials: Credentials,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    pub fn new(client: Client, credentials: Credentials) -> Self {
        Self {
            client,
            credentials,
            cached: Mutex::new(None),
        }
    }

    /// Current bearer token, requesting a new one when the cached token is
    /// missing or about to expire.
    pub async fn bearer(&self) -> Result<Option<String>, TamsError> {
        let (token_url, client_id, client_secret, scopes) = match &self.credentials {
            Credentials::Anonymous => return Ok(None),
            Credentials::Static(token) => return Ok(Some(token.clone())),
            Credentials::ClientCredentials {
                token_url,
                client_id,
                client_secret,
                scopes,
            } => (token_url, client_id, client_secret, scopes),
        };

        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.refresh_at > Instant::now()) {
            return Ok(Some(token.value.clone()));
        }

        let scope = scopes.join(" ");
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", client_id.as_str()),
            ("client_secret", client_secret.as_str()),
            ("scope", scope.as_str()),
        ];
        let response = self
            .client
            .post(token_url)
            .form(&form)
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(|err| TamsError::Auth(err.to_string()))?;
        if !response.status().is_success() {
            return Err(TamsError::Auth(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|err| TamsError::Auth(err.to_string()))?;
        debug!(expires_in = token.expires_in, "obtained access token");

        let value = token.access_token.clone();
        *cached = Some(CachedToken {
            refresh_at: refresh_at(Instant::now(), token.expires_in),
            value: token.access_token,
        });
        Ok(Some(value))
    }
}

fn refresh_at(now: Instant, expires_in: u64) -> Instant {
    now + Duration::from_secs(expires_in).saturating_sub(EXPIRY_MARGIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_margin() {
        let now = Instant::now();
        assert_eq!(refresh_at(now, 3600), now + Duration::from_secs(3570));
        assert_eq!(refresh_at(now, 10), now);
    }

    #[tokio::test]
    async fn test_static_and_anonymous_tokens() {
        let provider = TokenProvider::new(Client::new(), Credentials::Static("abc".into()));
        assert_eq!(provider.bearer().await.unwrap().as_deref(), Some("abc"));

        let provider = TokenProvider::new(Client::new(), Credentials::Anonymous);
        assert_eq!(provider.bearer().await.unwrap(), None);
    }
}
