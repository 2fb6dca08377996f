use crate::forward::StatisticsClient;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use http::StatusCode;
use http::header::{CONTENT_TYPE, HeaderValue};
use statrelay_auth::TokenProvider;
use statrelay_core::{ForwardError, RelayError};
use statrelay_observability::MetricsCollector;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};

/// Status and body returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

impl RelayResponse {
    pub fn success(body: Bytes) -> Self {
        Self {
            status: StatusCode::OK,
            body,
        }
    }

    /// The generic envelope. The error's detail is not part of it.
    pub fn failure(err: &RelayError) -> Self {
        Self {
            status: StatusCode::from_u16(err.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            body: Bytes::from(err.to_json_body()),
        }
    }
}

impl IntoResponse for RelayResponse {
    fn into_response(self) -> Response {
        (
            self.status,
            [(CONTENT_TYPE, HeaderValue::from_static("application/json"))],
            self.body,
        )
            .into_response()
    }
}

/// Token acquisition followed by one forward to the statistics endpoint.
pub struct StatisticsRelay {
    tokens: Arc<dyn TokenProvider>,
    upstream: StatisticsClient,
    metrics: Arc<MetricsCollector>,
}

impl StatisticsRelay {
    pub fn new(
        tokens: Arc<dyn TokenProvider>,
        upstream: StatisticsClient,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            tokens,
            upstream,
            metrics,
        }
    }

    /// Relay one fully buffered caller payload.
    ///
    /// Never fails: every error is logged here and collapsed into the
    /// generic 500 envelope.
    pub async fn handle_statistics_request(&self, raw_body: Bytes) -> RelayResponse {
        let started = Instant::now();
        let _in_flight = self.metrics.start_request();

        let (outcome, response) = match self.relay(raw_body).await {
            Ok(body) => ("success", RelayResponse::success(body)),
            Err(err) => {
                log_failure(&err);
                (err.kind(), RelayResponse::failure(&err))
            }
        };

        self.metrics.record_request(
            outcome,
            response.status.as_u16(),
            started.elapsed().as_secs_f64(),
        );
        response
    }

    /// Answer for a request that failed before relaying began (e.g. body read).
    pub fn reject(&self, err: RelayError) -> RelayResponse {
        log_failure(&err);
        let response = RelayResponse::failure(&err);
        self.metrics
            .record_request(err.kind(), response.status.as_u16(), 0.0);
        response
    }

    async fn relay(&self, raw_body: Bytes) -> Result<Bytes, RelayError> {
        let token = self.tokens.acquire_token().await;
        self.metrics.record_token_acquisition(token.is_ok());
        let token = token?;

        debug!(bytes = raw_body.len(), url = %self.upstream.url(), "Forwarding statistics query");
        match self.upstream.forward(&token, raw_body).await {
            Ok(body) => Ok(body),
            Err(err) => {
                if token_rejected(&err) {
                    self.tokens.invalidate(&token);
                }
                Err(err.into())
            }
        }
    }
}

/// The statistics endpoint refused the bearer token itself.
fn token_rejected(err: &ForwardError) -> bool {
    matches!(err, ForwardError::UpstreamError { status: 401 | 403, .. })
}

fn log_failure(err: &RelayError) {
    error!(kind = err.kind(), error = %err, "Error fetching statistics");
}
