use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::de::IgnoredAny;
use statrelay_auth::http::transport_detail;
use statrelay_core::{AccessToken, ForwardError};
use tracing::debug;

/// How much of a failed upstream body is kept for the server log.
const ERROR_DETAIL_LIMIT: usize = 256;

/// Client for the upstream statistics endpoint.
#[derive(Clone)]
pub struct StatisticsClient {
    http: reqwest::Client,
    url: String,
}

impl StatisticsClient {
    pub fn new(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// POST the caller's payload unchanged with the bearer token attached.
    ///
    /// Returns the upstream bytes untouched once they are known to be JSON.
    pub async fn forward(&self, token: &AccessToken, payload: Bytes) -> Result<Bytes, ForwardError> {
        let authorization = token
            .bearer_header()
            .map_err(|_| ForwardError::InvalidToken)?;

        let resp = self
            .http
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, authorization)
            .body(payload)
            .send()
            .await
            .map_err(|e| ForwardError::Network(transport_detail(&e)))?;

        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .map_err(|e| ForwardError::Network(transport_detail(&e)))?;

        if !status.is_success() {
            return Err(ForwardError::UpstreamError {
                status: status.as_u16(),
                detail: detail(&body),
            });
        }

        serde_json::from_slice::<IgnoredAny>(&body)
            .map_err(|e| ForwardError::UpstreamNonJson(e.to_string()))?;

        debug!(status = status.as_u16(), bytes = body.len(), "Statistics response received");
        Ok(body)
    }
}

fn detail(body: &[u8]) -> String {
    let cut = body.len().min(ERROR_DETAIL_LIMIT);
    String::from_utf8_lossy(&body[..cut]).into_owned()
}
