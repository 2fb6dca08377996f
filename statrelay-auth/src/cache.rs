use crate::provider::TokenProvider;
use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use statrelay_core::{AccessToken, AuthError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, trace};

/// Reuses a token until it is within `skew` of expiring.
///
/// Readers load the current token lock-free. A miss takes the refresh mutex,
/// so concurrent misses wait for one exchange instead of each running their own.
/// Tokens without a reported lifetime are never stored, and once the provider
/// has been seen issuing one the mutex is bypassed so callers fetch in parallel.
/// Failures are never stored.
pub struct CachedTokenProvider<P> {
    inner: P,
    current: ArcSwapOption<AccessToken>,
    refresh: Mutex<()>,
    skew: Duration,
    lifetime_unknown: AtomicBool,
}

impl<P: TokenProvider> CachedTokenProvider<P> {
    pub fn new(inner: P, skew: Duration) -> Self {
        Self {
            inner,
            current: ArcSwapOption::empty(),
            refresh: Mutex::new(()),
            skew,
            lifetime_unknown: AtomicBool::new(false),
        }
    }

    fn fresh(&self) -> Option<AccessToken> {
        let now = Utc::now();
        let current = self.current.load();
        (*current)
            .as_deref()
            .filter(|token| token.is_fresh(now, self.skew))
            .cloned()
    }

    async fn fetch_and_store(&self) -> Result<AccessToken, AuthError> {
        let token = self.inner.acquire_token().await?;
        match token.expires_at() {
            Some(expires_at) => {
                debug!(%expires_at, "Caching access token");
                self.current.store(Some(Arc::new(token.clone())));
            }
            None => {
                self.lifetime_unknown.store(true, Ordering::Relaxed);
                self.current.store(None);
            }
        }
        Ok(token)
    }
}

#[async_trait]
impl<P: TokenProvider> TokenProvider for CachedTokenProvider<P> {
    async fn acquire_token(&self) -> Result<AccessToken, AuthError> {
        if let Some(token) = self.fresh() {
            trace!("Access token cache hit");
            return Ok(token);
        }

        if self.lifetime_unknown.load(Ordering::Relaxed) {
            return self.fetch_and_store().await;
        }

        let _refresh = self.refresh.lock().await;
        if let Some(token) = self.fresh() {
            trace!("Access token refreshed by a concurrent caller");
            return Ok(token);
        }
        self.fetch_and_store().await
    }

    /// Drop the cached token if it is the rejected one. A token stored by a
    /// concurrent refresh in the meantime is kept.
    fn invalidate(&self, rejected: &AccessToken) {
        let current = self.current.load();
        if (*current).as_deref() == Some(rejected) {
            debug!("Dropping rejected access token");
            self.current.store(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration as StdDuration;

    /// Counts exchanges; issues `tok-N` tokens with the configured lifetime.
    struct FakeProvider {
        calls: AtomicUsize,
        expires_in: Option<i64>,
        delay: StdDuration,
        fail: AtomicBool,
    }

    impl FakeProvider {
        fn new(expires_in: Option<i64>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                expires_in,
                delay: StdDuration::ZERO,
                fail: AtomicBool::new(false),
            }
        }

        fn with_delay(mut self, delay: StdDuration) -> Self {
            self.delay = delay;
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenProvider for FakeProvider {
        async fn acquire_token(&self) -> Result<AccessToken, AuthError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(AuthError::Unauthorized {
                    status: 401,
                    description: "invalid_client".into(),
                });
            }
            Ok(AccessToken::issued(format!("tok-{n}"), Utc::now(), self.expires_in))
        }
    }

    fn bearer(token: &AccessToken) -> String {
        token.bearer_header().unwrap().to_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn fresh_token_is_reused() {
        let fake = Arc::new(FakeProvider::new(Some(3600)));
        let cache = CachedTokenProvider::new(Arc::clone(&fake), Duration::seconds(60));

        let a = cache.acquire_token().await.unwrap();
        let b = cache.acquire_token().await.unwrap();
        assert_eq!(bearer(&a), bearer(&b));
        assert_eq!(fake.calls(), 1);
    }

    #[tokio::test]
    async fn token_inside_skew_window_is_refreshed() {
        // Lifetime shorter than the skew: stale the moment it arrives.
        let fake = Arc::new(FakeProvider::new(Some(30)));
        let cache = CachedTokenProvider::new(Arc::clone(&fake), Duration::seconds(60));

        let a = cache.acquire_token().await.unwrap();
        let b = cache.acquire_token().await.unwrap();
        assert_ne!(bearer(&a), bearer(&b));
        assert_eq!(fake.calls(), 2);
    }

    #[tokio::test]
    async fn token_without_lifetime_is_never_cached() {
        let fake = Arc::new(FakeProvider::new(None));
        let cache = CachedTokenProvider::new(Arc::clone(&fake), Duration::seconds(60));

        cache.acquire_token().await.unwrap();
        cache.acquire_token().await.unwrap();
        cache.acquire_token().await.unwrap();
        assert_eq!(fake.calls(), 3);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let fake = Arc::new(FakeProvider::new(Some(3600)));
        fake.fail.store(true, Ordering::SeqCst);
        let cache = CachedTokenProvider::new(Arc::clone(&fake), Duration::seconds(60));

        assert!(cache.acquire_token().await.is_err());
        fake.fail.store(false, Ordering::SeqCst);
        assert!(cache.acquire_token().await.is_ok());
        assert_eq!(fake.calls(), 2);
    }

    #[tokio::test]
    async fn invalidating_the_cached_token_forces_new_exchange() {
        let fake = Arc::new(FakeProvider::new(Some(3600)));
        let cache = CachedTokenProvider::new(Arc::clone(&fake), Duration::seconds(60));

        let first = cache.acquire_token().await.unwrap();
        cache.invalidate(&first);
        let second = cache.acquire_token().await.unwrap();
        assert_eq!(fake.calls(), 2);
        assert_eq!(bearer(&second), "Bearer tok-2");
    }

    #[tokio::test]
    async fn invalidating_a_superseded_token_keeps_the_current_one() {
        let fake = Arc::new(FakeProvider::new(Some(3600)));
        let cache = CachedTokenProvider::new(Arc::clone(&fake), Duration::seconds(60));

        let first = cache.acquire_token().await.unwrap();
        cache.invalidate(&first);
        cache.acquire_token().await.unwrap();
        // A late rejection of the first token must not evict the second.
        cache.invalidate(&first);
        cache.acquire_token().await.unwrap();
        assert_eq!(fake.calls(), 2);
    }

    #[tokio::test]
    async fn concurrent_misses_share_one_exchange() {
        let fake = Arc::new(
            FakeProvider::new(Some(3600)).with_delay(StdDuration::from_millis(50)),
        );
        let cache = Arc::new(CachedTokenProvider::new(
            Arc::clone(&fake),
            Duration::seconds(60),
        ));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.acquire_token().await })
            })
            .collect();

        let mut values = Vec::new();
        for h in handles {
            values.push(bearer(&h.await.unwrap().unwrap()));
        }
        assert_eq!(fake.calls(), 1);
        assert!(values.iter().all(|v| v == "Bearer tok-1"));
    }
}
