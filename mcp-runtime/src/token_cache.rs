//! Per-client OAuth access token cache.
//!
//! Tokens are keyed by client id and obtained through the client-credentials
//! grant. Expired entries are swept lazily on every lookup; there is no
//! background timer. The map lock is only held for the synchronous sweep,
//! lookup and insert, never across the token exchange, so two concurrent
//! first requests for the same client may both exchange. The later insert
//! replaces the earlier one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use petfinder_core::Credentials;
use petfinder_core::error::UpstreamError;
use serde::Deserialize;
use url::Url;

use crate::error::GatewayError;
use crate::upstream::parse_response_body;

/// Lower bound for the refresh safety margin, in seconds.
pub const MIN_SAFETY_MARGIN_SECS: i64 = 60;

/// Source of the current unix time in seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedToken {
    pub access_token: String,
    /// Unix seconds.
    pub expires_at: i64,
}

impl CachedToken {
    fn is_usable(&self, now: i64, safety_margin: i64) -> bool {
        now < self.expires_at.saturating_sub(safety_margin)
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

pub struct TokenCache {
    http: reqwest::Client,
    token_url: Url,
    safety_margin_secs: i64,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, CachedToken>>,
}

impl TokenCache {
    pub fn new(
        http: reqwest::Client,
        token_url: Url,
        safety_margin_secs: i64,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            http,
            token_url,
            safety_margin_secs: safety_margin_secs.max(MIN_SAFETY_MARGIN_SECS),
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Return a usable access token for `credentials`, exchanging if needed.
    pub async fn get_token(&self, credentials: &Credentials) -> Result<String, GatewayError> {
        if !credentials.is_complete() {
            return Err(GatewayError::CredentialsMissing);
        }

        let fingerprint = credentials.fingerprint();
        if let Some(token) = self.lookup(&credentials.client_id, self.clock.now()) {
            tracing::debug!(event = "token_cache_hit", client = %fingerprint);
            return Ok(token);
        }

        tracing::info!(event = "token_exchange_started", client = %fingerprint);
        let fresh = self.exchange(credentials).await?;
        let expires_at = self.clock.now().saturating_add(fresh.expires_in);
        self.lock().insert(
            credentials.client_id.clone(),
            CachedToken {
                access_token: fresh.access_token.clone(),
                expires_at,
            },
        );
        tracing::info!(
            event = "token_exchange_succeeded",
            client = %fingerprint,
            expires_in = fresh.expires_in,
        );
        Ok(fresh.access_token)
    }

    /// Number of cached entries, including ones not yet swept.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cached entry for a client id, if any.
    pub fn peek(&self, client_id: &str) -> Option<CachedToken> {
        self.lock().get(client_id).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CachedToken>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lookup(&self, client_id: &str, now: i64) -> Option<String> {
        let mut entries = self.lock();
        // Sweep on access: drop every entry that has fully expired.
        let before = entries.len();
        entries.retain(|_, token| token.expires_at > now);
        let evicted = before - entries.len();
        if evicted > 0 {
            tracing::debug!(event = "token_cache_swept", evicted, remaining = entries.len());
        }

        entries
            .get(client_id)
            .filter(|token| token.is_usable(now, self.safety_margin_secs))
            .map(|token| token.access_token.clone())
    }

    async fn exchange(&self, credentials: &Credentials) -> Result<TokenResponse, GatewayError> {
        let response = self
            .http
            .post(self.token_url.clone())
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            tracing::warn!(
                event = "token_exchange_rejected",
                client = %credentials.fingerprint(),
                status = status.as_u16(),
            );
            return Err(GatewayError::UpstreamAuth(UpstreamError::new(
                status.as_u16(),
                status.canonical_reason().unwrap_or_default(),
                parse_response_body(&bytes),
            )));
        }

        let malformed = |reason: String| {
            tracing::warn!(
                event = "token_exchange_malformed",
                client = %credentials.fingerprint(),
                error = %reason,
            );
            GatewayError::UpstreamAuth(UpstreamError::new(
                status.as_u16(),
                "Malformed token response",
                parse_response_body(&bytes),
            ))
        };

        let token = serde_json::from_slice::<TokenResponse>(&bytes)
            .map_err(|err| malformed(err.to_string()))?;
        if token.expires_in <= 0 {
            return Err(malformed(format!("expires_in {} is not positive", token.expires_in)));
        }
        Ok(token)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicI64, Ordering};

    use mockito::{Matcher, Server};
    use serde_json::json;

    use super::*;

    /// Clock whose time only moves when a test advances it.
    #[derive(Debug, Default)]
    pub(crate) struct ManualClock(AtomicI64);

    impl ManualClock {
        pub(crate) fn starting_at(now: i64) -> Arc<Self> {
            Arc::new(Self(AtomicI64::new(now)))
        }

        pub(crate) fn advance(&self, secs: i64) {
            self.0.fetch_add(secs, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> i64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn cache_for(server: &Server, clock: Arc<ManualClock>) -> TokenCache {
        let token_url = Url::parse(&format!("{}/oauth2/token", server.url())).unwrap();
        TokenCache::new(reqwest::Client::new(), token_url, 60, clock)
    }

    fn token_body(token: &str, expires_in: i64) -> String {
        json!({
            "token_type": "Bearer",
            "expires_in": expires_in,
            "access_token": token
        })
        .to_string()
    }

    #[tokio::test]
    async fn second_call_within_validity_reuses_cached_token() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth2/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "client_credentials".into()),
                Matcher::UrlEncoded("client_id".into(), "client-a".into()),
                Matcher::UrlEncoded("client_secret".into(), "secret-a".into()),
            ]))
            .with_status(200)
            .with_body(token_body("token-1", 3600))
            .expect(1)
            .create_async()
            .await;

        let clock = ManualClock::starting_at(1_000);
        let cache = cache_for(&server, clock.clone());
        let creds = Credentials::new("client-a", "secret-a");

        let first = cache.get_token(&creds).await.unwrap();
        clock.advance(600);
        let second = cache.get_token(&creds).await.unwrap();

        assert_eq!(first, "token-1");
        assert_eq!(second, first);
        assert_eq!(
            cache.peek("client-a"),
            Some(CachedToken {
                access_token: "token-1".to_string(),
                expires_at: 4_600,
            })
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn token_inside_safety_margin_is_refreshed_and_replaced() {
        let mut server = Server::new_async().await;
        let first_mock = server
            .mock("POST", "/oauth2/token")
            .with_status(200)
            .with_body(token_body("token-1", 3600))
            .expect(1)
            .create_async()
            .await;

        let clock = ManualClock::starting_at(0);
        let cache = cache_for(&server, clock.clone());
        let creds = Credentials::new("client-a", "secret-a");
        assert_eq!(cache.get_token(&creds).await.unwrap(), "token-1");
        first_mock.assert_async().await;
        first_mock.remove_async().await;

        let second_mock = server
            .mock("POST", "/oauth2/token")
            .with_status(200)
            .with_body(token_body("token-2", 3600))
            .expect(1)
            .create_async()
            .await;

        // 3600 - 60 margin: the entry stops being usable at t = 3540.
        clock.advance(3_540);
        assert_eq!(cache.get_token(&creds).await.unwrap(), "token-2");
        assert_eq!(cache.peek("client-a").unwrap().expires_at, 3_540 + 3_600);
        assert_eq!(cache.len(), 1);
        second_mock.assert_async().await;
    }

    #[tokio::test]
    async fn lookup_sweeps_expired_entries_for_other_clients() {
        let mut server = Server::new_async().await;
        let short = server
            .mock("POST", "/oauth2/token")
            .match_body(Matcher::UrlEncoded("client_id".into(), "one-off".into()))
            .with_status(200)
            .with_body(token_body("short-lived", 100))
            .create_async()
            .await;
        let long = server
            .mock("POST", "/oauth2/token")
            .match_body(Matcher::UrlEncoded("client_id".into(), "regular".into()))
            .with_status(200)
            .with_body(token_body("long-lived", 3600))
            .create_async()
            .await;

        let clock = ManualClock::starting_at(0);
        let cache = cache_for(&server, clock.clone());
        cache
            .get_token(&Credentials::new("one-off", "s"))
            .await
            .unwrap();
        cache
            .get_token(&Credentials::new("regular", "s"))
            .await
            .unwrap();
        assert_eq!(cache.len(), 2);

        clock.advance(100);
        cache
            .get_token(&Credentials::new("regular", "s"))
            .await
            .unwrap();

        assert_eq!(cache.len(), 1);
        assert!(cache.peek("one-off").is_none());
        short.assert_async().await;
        long.assert_async().await;
    }

    #[tokio::test]
    async fn missing_credentials_fail_before_any_network_call() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth2/token")
            .expect(0)
            .create_async()
            .await;

        let cache = cache_for(&server, ManualClock::starting_at(0));
        let err = cache
            .get_token(&Credentials::new("client-a", ""))
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::CredentialsMissing));
        assert!(cache.is_empty());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rejected_exchange_carries_status_and_body() {
        let mut server = Server::new_async().await;
        let _token = server
            .mock("POST", "/oauth2/token")
            .with_status(401)
            .with_header("content-type", "application/problem+json")
            .with_body(
                json!({
                    "type": "https://www.petfinder.com/developers/v2/docs/errors/ERR-401/",
                    "status": 401,
                    "title": "Unauthorized",
                    "detail": "Access token invalid or expired"
                })
                .to_string(),
            )
            .create_async()
            .await;

        let cache = cache_for(&server, ManualClock::starting_at(0));
        let err = cache
            .get_token(&Credentials::new("client-a", "wrong"))
            .await
            .unwrap_err();

        let GatewayError::UpstreamAuth(upstream) = err else {
            panic!("expected UpstreamAuth, got {err:?}");
        };
        assert_eq!(upstream.status, 401);
        assert_eq!(upstream.status_text, "Unauthorized");
        assert_eq!(upstream.body["title"], "Unauthorized");
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn non_positive_lifetime_is_malformed() {
        let mut server = Server::new_async().await;
        let _token = server
            .mock("POST", "/oauth2/token")
            .with_status(200)
            .with_body(token_body("token-1", 0))
            .create_async()
            .await;

        let cache = cache_for(&server, ManualClock::starting_at(0));
        let err = cache
            .get_token(&Credentials::new("client-a", "secret-a"))
            .await
            .unwrap_err();

        let GatewayError::UpstreamAuth(upstream) = err else {
            panic!("expected UpstreamAuth, got {err:?}");
        };
        assert_eq!(upstream.status_text, "Malformed token response");
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn huge_lifetime_saturates_instead_of_overflowing() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth2/token")
            .with_status(200)
            .with_body(token_body("forever", i64::MAX))
            .expect(1)
            .create_async()
            .await;

        let clock = ManualClock::starting_at(1_000);
        let cache = cache_for(&server, clock.clone());
        let creds = Credentials::new("client-a", "secret-a");

        assert_eq!(cache.get_token(&creds).await.unwrap(), "forever");
        assert_eq!(cache.peek("client-a").unwrap().expires_at, i64::MAX);
        clock.advance(1_000_000);
        assert_eq!(cache.get_token(&creds).await.unwrap(), "forever");
        mock.assert_async().await;
    }

    #[test]
    fn safety_margin_is_clamped_to_minimum() {
        let cache = TokenCache::new(
            reqwest::Client::new(),
            Url::parse("http://127.0.0.1:9/oauth2/token").unwrap(),
            5,
            ManualClock::starting_at(0),
        );
        assert_eq!(cache.safety_margin_secs, MIN_SAFETY_MARGIN_SECS);
    }
}
