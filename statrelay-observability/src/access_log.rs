use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Structured access log entry.
///
/// Carries nothing from request or response bodies and no header values.
#[derive(Debug, Serialize, Deserialize)]
pub struct AccessLogEntry {
    pub timestamp: String,
    pub request_id: String,
    pub client_ip: Option<String>,
    pub method: String,
    pub uri: String,
    pub response_status: u16,
    pub latency_ms: f64,
}

impl AccessLogEntry {
    pub fn new(
        request_id: impl Into<String>,
        client_ip: Option<String>,
        method: impl Into<String>,
        uri: impl Into<String>,
        response_status: u16,
        latency_ms: f64,
    ) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            request_id: request_id.into(),
            client_ip,
            method: method.into(),
            uri: uri.into(),
            response_status,
            latency_ms,
        }
    }

    pub fn emit(&self) {
        info!(
            target: "statrelay::access",
            timestamp = %self.timestamp,
            request_id = %self.request_id,
            client_ip = self.client_ip.as_deref().unwrap_or("-"),
            method = %self.method,
            uri = %self.uri,
            status = self.response_status,
            latency_ms = self.latency_ms,
            "{} {} {}",
            self.method,
            self.uri,
            self.response_status
        );
    }
}
