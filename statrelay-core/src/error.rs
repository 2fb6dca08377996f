use thiserror::Error;

/// The only error body a caller ever sees.
pub const GENERIC_ERROR_BODY: &[u8] = br#"{"error":"Failed to fetch statistics"}"#;

/// Fallback description when the identity endpoint gives none.
pub const DEFAULT_AUTH_FAILURE: &str = "Failed to fetch token";

/// Failures raised by a token provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("identity endpoint unreachable: {0}")]
    Network(String),

    #[error("identity endpoint rejected credentials ({status}): {description}")]
    Unauthorized { status: u16, description: String },

    #[error("identity endpoint returned {status}: {description}")]
    Upstream { status: u16, description: String },

    #[error("malformed identity response: {0}")]
    Protocol(String),
}

/// Failures raised while forwarding to the statistics endpoint.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ForwardError {
    #[error("statistics endpoint unreachable: {0}")]
    Network(String),

    #[error("statistics endpoint returned non-JSON body: {0}")]
    UpstreamNonJson(String),

    #[error("statistics endpoint returned {status}: {detail}")]
    UpstreamError { status: u16, detail: String },

    #[error("access token cannot be used as a header value")]
    InvalidToken,
}

/// Unified error type for statrelay.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Token acquisition failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Forward failed: {0}")]
    Forward(#[from] ForwardError),

    #[error("Request body error: {0}")]
    Body(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Missing credential: {0}")]
    MissingCredential(&'static str),
}

impl RelayError {
    /// Map to HTTP status code. Every request-path failure is a 500.
    pub fn status_code(&self) -> u16 {
        500
    }

    /// JSON error body. Always the generic envelope; detail stays in the logs.
    pub fn to_json_body(&self) -> Vec<u8> {
        GENERIC_ERROR_BODY.to_vec()
    }

    /// Short label for metrics and access logs.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::Auth(_) => "auth_error",
            RelayError::Forward(_) => "forward_error",
            RelayError::Body(_) => "body_error",
            RelayError::Config(_) | RelayError::MissingCredential(_) => "config_error",
        }
    }
}

impl From<figment::Error> for RelayError {
    fn from(err: figment::Error) -> Self {
        RelayError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_relay_error_collapses_to_generic_500() {
        let errors = vec![
            RelayError::Auth(AuthError::Unauthorized {
                status: 401,
                description: "invalid_client".into(),
            }),
            RelayError::Forward(ForwardError::UpstreamNonJson("expected value".into())),
            RelayError::Body("length limit exceeded".into()),
        ];
        for err in errors {
            assert_eq!(err.status_code(), 500);
            assert_eq!(err.to_json_body(), GENERIC_ERROR_BODY);
        }
    }

    #[test]
    fn generic_body_is_valid_json() {
        let v: serde_json::Value = serde_json::from_slice(GENERIC_ERROR_BODY).unwrap();
        assert_eq!(v, serde_json::json!({"error": "Failed to fetch statistics"}));
    }

    #[test]
    fn auth_error_display_carries_description() {
        let err = AuthError::Unauthorized {
            status: 401,
            description: "invalid_client".into(),
        };
        assert!(err.to_string().contains("invalid_client"));
        assert!(err.to_string().contains("401"));
    }

    #[test]
    fn upstream_error_display_carries_body_detail() {
        let err = RelayError::from(ForwardError::UpstreamError {
            status: 400,
            detail: r#"{"error":{"message":"bad evalscript"}}"#.into(),
        });
        let msg = err.to_string();
        assert!(msg.contains("400"));
        assert!(msg.contains("bad evalscript"));
    }

    #[test]
    fn kinds_are_stable_labels() {
        assert_eq!(RelayError::from(AuthError::Network("x".into())).kind(), "auth_error");
        assert_eq!(
            RelayError::from(ForwardError::InvalidToken).kind(),
            "forward_error"
        );
        assert_eq!(RelayError::MissingCredential("CLIENT_ID").kind(), "config_error");
    }
}
