//! OAuth access-token management for the wallet provider.
//!
//! The wallet API authenticates every call with a bearer token obtained
//! through the client-credentials grant. Tokens are cached in-process and
//! refreshed one minute before the provider-reported expiry.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::ports::ProcessorError;

/// Refresh this many seconds before the reported expiry.
const EXPIRY_SAFETY_MARGIN_SECS: i64 = 60;

/// Token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Lifetime in seconds from issuance.
    expires_in: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    /// Unix seconds.
    expires_at: i64,
}

impl CachedToken {
    fn is_fresh(&self, now: i64) -> bool {
        now < self.expires_at - EXPIRY_SAFETY_MARGIN_SECS
    }
}

/// Client-credentials token source with in-process caching.
pub(crate) struct TokenSource {
    client_id: String,
    client_secret: SecretString,
    token_url: String,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenSource {
    pub fn new(client_id: String, client_secret: SecretString, api_base_url: &str) -> Self {
        Self {
            client_id,
            client_secret,
            token_url: format!("{}/v1/oauth2/token", api_base_url),
            cached: Mutex::new(None),
        }
    }

    /// Current bearer token, fetching a fresh one when the cache is stale.
    ///
    /// Concurrent callers serialize on the cache lock, so at most one
    /// token request is in flight at a time.
    pub async fn bearer_token(&self, client: &reqwest::Client) -> Result<String, ProcessorError> {
        let now = chrono::Utc::now().timestamp();
        let mut guard = self.cached.lock().await;

        if let Some(token) = guard.as_ref() {
            if token.is_fresh(now) {
                return Ok(token.access_token.clone());
            }
        }

        let credentials = format!("{}:{}", self.client_id, self.client_secret.expose_secret());
        let authorization = format!("Basic {}", BASE64.encode(credentials.as_bytes()));

        let response = client
            .post(&self.token_url)
            .header(reqwest::header::AUTHORIZATION, authorization)
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| ProcessorError::transient(format!("token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error response".to_string());
            return Err(classify_token_error(status, body));
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            ProcessorError::validation(format!("token response failed to parse: {}", e))
        })?;

        tracing::debug!(expires_in = token.expires_in, "fetched wallet access token");

        let access = token.access_token.clone();
        *guard = Some(CachedToken {
            access_token: token.access_token,
            expires_at: now + token.expires_in,
        });
        Ok(access)
    }

    /// Drop the cached token, forcing a refresh on next use.
    ///
    /// Called when the API rejects a token that the cache still considered
    /// fresh (revocation, provider-side expiry drift).
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}

fn classify_token_error(status: reqwest::StatusCode, body: String) -> ProcessorError {
    let message = format!("wallet token endpoint returned {}: {}", status, body);
    match status.as_u16() {
        401 | 403 => ProcessorError::authentication(message),
        429 => ProcessorError::transient(message),
        code if code >= 500 => ProcessorError::transient(message),
        _ => ProcessorError::validation(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cached_token_fresh_inside_margin() {
        let token = CachedToken {
            access_token: "abc".to_string(),
            expires_at: 10_000,
        };

        assert!(token.is_fresh(10_000 - EXPIRY_SAFETY_MARGIN_SECS - 1));
        assert!(!token.is_fresh(10_000 - EXPIRY_SAFETY_MARGIN_SECS));
        assert!(!token.is_fresh(10_000));
        assert!(!token.is_fresh(20_000));
    }

    #[test]
    fn token_response_parses_provider_shape() {
        let json = r#"{
            "scope": "https://api.example-wallet.com/v1/payments/.*",
            "access_token": "A21AAFs...",
            "token_type": "Bearer",
            "app_id": "APP-80W28",
            "expires_in": 32400,
            "nonce": "2024-01-15T10:30:00Zxyz"
        }"#;

        let token: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(token.access_token, "A21AAFs...");
        assert_eq!(token.expires_in, 32400);
    }

    #[test]
    fn token_error_classification() {
        use crate::ports::ProcessorErrorKind;
        use reqwest::StatusCode;

        assert_eq!(
            classify_token_error(StatusCode::UNAUTHORIZED, "{}".to_string()).kind,
            ProcessorErrorKind::Authentication
        );
        assert_eq!(
            classify_token_error(StatusCode::SERVICE_UNAVAILABLE, "{}".to_string()).kind,
            ProcessorErrorKind::Transient
        );
        assert_eq!(
            classify_token_error(StatusCode::BAD_REQUEST, "{}".to_string()).kind,
            ProcessorErrorKind::Validation
        );
    }

    #[tokio::test]
    async fn invalidate_clears_cache() {
        let source = TokenSource::new(
            "client".to_string(),
            SecretString::new("secret".to_string()),
            "https://api.sandbox.example-wallet.com",
        );

        *source.cached.lock().await = Some(CachedToken {
            access_token: "stale".to_string(),
            expires_at: i64::MAX,
        });

        source.invalidate().await;
        assert!(source.cached.lock().await.is_none());
    }
}
