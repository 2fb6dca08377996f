use statrelay_core::config::UpstreamConfig;

/// Shared outbound client for the identity and statistics endpoints.
///
/// `reqwest::Client` pools connections internally; clone it freely.
pub fn build_client(upstream: &UpstreamConfig) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(upstream.connect_timeout())
        .timeout(upstream.request_timeout())
        .user_agent(concat!("statrelay/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Log-safe description of a transport failure.
///
/// Request bodies are never part of a `reqwest::Error`, so the form-encoded
/// secret cannot surface here.
pub fn transport_detail(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("timed out: {err}")
    } else if err.is_connect() {
        format!("connect failed: {err}")
    } else if err.is_body() || err.is_decode() {
        format!("body read failed: {err}")
    } else {
        err.to_string()
    }
}
