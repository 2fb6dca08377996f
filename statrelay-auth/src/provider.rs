use crate::http::transport_detail;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::StatusCode;
use serde::Deserialize;
use statrelay_core::error::DEFAULT_AUTH_FAILURE;
use statrelay_core::{AccessToken, AuthError, Credential};
use std::sync::Arc;
use tracing::debug;

/// Source of bearer tokens for the statistics upstream.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn acquire_token(&self) -> Result<AccessToken, AuthError>;

    /// Called when the statistics endpoint refused `rejected`. Providers that
    /// keep tokens must stop handing it out.
    fn invalidate(&self, _rejected: &AccessToken) {}
}

#[async_trait]
impl<T: TokenProvider + ?Sized> TokenProvider for Arc<T> {
    async fn acquire_token(&self) -> Result<AccessToken, AuthError> {
        (**self).acquire_token().await
    }

    fn invalidate(&self, rejected: &AccessToken) {
        (**self).invalidate(rejected)
    }
}

/// Success body of the identity endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Error body of the identity endpoint (RFC 6749 §5.2).
#[derive(Debug, Default, Deserialize)]
struct TokenErrorResponse {
    error: Option<String>,
    error_description: Option<String>,
}

/// Performs one `client_credentials` exchange per call.
pub struct ClientCredentialsProvider {
    http: reqwest::Client,
    token_url: String,
    credential: Credential,
}

impl ClientCredentialsProvider {
    pub fn new(http: reqwest::Client, token_url: impl Into<String>, credential: Credential) -> Self {
        Self {
            http,
            token_url: token_url.into(),
            credential,
        }
    }
}

#[async_trait]
impl TokenProvider for ClientCredentialsProvider {
    async fn acquire_token(&self) -> Result<AccessToken, AuthError> {
        let issued_at = Utc::now();

        let resp = self
            .http
            .post(&self.token_url)
            .form(&self.credential.grant_form())
            .send()
            .await
            .map_err(|e| AuthError::Network(transport_detail(&e)))?;

        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .map_err(|e| AuthError::Network(transport_detail(&e)))?;

        if !status.is_success() {
            return Err(rejection(status, &body));
        }

        let parsed: TokenResponse = serde_json::from_slice(&body)
            .map_err(|e| AuthError::Protocol(format!("token response is not JSON: {e}")))?;
        let value = parsed
            .access_token
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| AuthError::Protocol("token response lacks access_token".into()))?;

        debug!(
            client_id = %self.credential.client_id(),
            expires_in = ?parsed.expires_in,
            "Access token acquired"
        );
        Ok(AccessToken::issued(value, issued_at, parsed.expires_in))
    }
}

/// Classify a non-2xx identity response.
fn rejection(status: StatusCode, body: &[u8]) -> AuthError {
    let parsed: TokenErrorResponse = serde_json::from_slice(body).unwrap_or_default();
    let description = parsed
        .error_description
        .filter(|d| !d.is_empty())
        .or(parsed.error.filter(|e| !e.is_empty()))
        .unwrap_or_else(|| DEFAULT_AUTH_FAILURE.to_string());

    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            AuthError::Unauthorized {
                status: status.as_u16(),
                description,
            }
        }
        _ => AuthError::Upstream {
            status: status.as_u16(),
            description,
        },
    }
}
