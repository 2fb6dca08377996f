use crate::credential::{REDACTED, SecretString};
use chrono::{DateTime, Duration, Utc};
use http::HeaderValue;
use std::fmt;

/// Short-lived bearer token issued by the identity endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    value: SecretString,
    expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn new(value: impl Into<SecretString>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    /// Token whose lifetime is `expires_in` seconds from `issued_at`.
    ///
    /// A lifetime that is non-positive or past chrono's range yields a token
    /// without expiry.
    pub fn issued(
        value: impl Into<SecretString>,
        issued_at: DateTime<Utc>,
        expires_in: Option<i64>,
    ) -> Self {
        let expires_at = expires_in
            .filter(|secs| *secs > 0)
            .and_then(Duration::try_seconds)
            .and_then(|lifetime| issued_at.checked_add_signed(lifetime));
        Self::new(value, expires_at)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// True while `now + skew` is still before the expiry.
    /// A token without a known expiry is never considered fresh.
    pub fn is_fresh(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        match self.expires_at {
            Some(exp) => now.checked_add_signed(skew).is_some_and(|edge| edge < exp),
            None => false,
        }
    }

    /// `Authorization` header value, flagged sensitive so it is never printed by `http`.
    pub fn bearer_header(&self) -> Result<HeaderValue, http::header::InvalidHeaderValue> {
        let mut value = HeaderValue::try_from(format!("Bearer {}", self.value.expose()))?;
        value.set_sensitive(true);
        Ok(value)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &REDACTED)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
