//! Bearer token cache for the client-credentials grant.
//!
//! # Design
//! One `TokenStore` holds at most one credential. Check-and-refresh runs
//! under a single mutex, so concurrent callers queue behind an in-flight
//! refresh and then read the credential it stored instead of issuing their
//! own token request.

use std::sync::Arc;

use base64::prelude::{Engine as _, BASE64_STANDARD};
use chrono::{DateTime, TimeDelta, Utc};
use mockable::{Clock, DefaultClock};
use parking_lot::Mutex;
use serde::Deserialize;
use url::Url;

use crate::error::{Error, Result};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, Transport};

/// Fraction of the server-declared lifetime a token is trusted for.
const EXPIRY_FACTOR: f64 = 0.9;

#[derive(Debug, Clone)]
struct Credential {
    value: String,
    expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct TokenGrant {
    access_token: String,
    expires_in: i64,
}

pub struct TokenStore {
    token_url: Url,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock + Send + Sync>,
    credential: Mutex<Option<Credential>>,
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("token_url", &self.token_url.as_str())
            .field("cached", &self.credential.lock().is_some())
            .finish_non_exhaustive()
    }
}

impl TokenStore {
    /// Fails with `Error::Configuration` when `token_url` is not a valid URL.
    pub fn new(
        token_url: &str,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Result<Self> {
        let token_url = Url::parse(token_url)
            .map_err(|e| Error::Configuration(format!("invalid token endpoint {token_url:?}: {e}")))?;
        Ok(Self {
            token_url,
            transport,
            clock,
            credential: Mutex::new(None),
        })
    }

    /// A store reading the system clock.
    pub fn with_system_clock(token_url: &str, transport: Arc<dyn Transport>) -> Result<Self> {
        Self::new(token_url, transport, Arc::new(DefaultClock))
    }

    /// Return the cached token, refreshing it first if it is missing or
    /// expired.
    pub fn fetch(&self, client_id: &str, client_secret: &str) -> Result<String> {
        let mut credential = self.credential.lock();

        if let Some(cached) = credential.as_ref() {
            if self.clock.utc() < cached.expires_at {
                return Ok(cached.value.clone());
            }
        }

        tracing::debug!(url = %self.token_url, "requesting access token");
        let request = self.build_token_request(client_id, client_secret);
        let response = self.transport.send(&request).map_err(|e| {
            tracing::warn!(error = %e, "token endpoint unreachable");
            Error::Authentication {
                status: None,
                message: e.to_string(),
            }
        })?;
        let grant = parse_token_response(response)?;

        let expires_at = self
            .clock
            .utc()
            .checked_add_signed(expiry_margin(grant.expires_in))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        tracing::debug!(%expires_at, "access token refreshed");
        *credential = Some(Credential {
            value: grant.access_token.clone(),
            expires_at,
        });
        Ok(grant.access_token)
    }

    /// Drop the cached token so the next `fetch` requests a new one.
    pub fn invalidate(&self) {
        *self.credential.lock() = None;
    }

    pub fn build_token_request(&self, client_id: &str, client_secret: &str) -> HttpRequest {
        let basic = BASE64_STANDARD.encode(format!("{client_id}:{client_secret}"));
        let mut request = HttpRequest::new(HttpMethod::Post, self.token_url.as_str());
        request.set_header("authorization", format!("Basic {basic}"));
        request
    }
}

fn parse_token_response(response: HttpResponse) -> Result<TokenGrant> {
    if response.status != 200 {
        tracing::warn!(status = response.status, "token request rejected");
        return Err(Error::Authentication {
            status: Some(response.status),
            message: format!("expected status code 200 but got {}", response.status),
        });
    }
    serde_json::from_str(&response.body).map_err(|e| Error::Decode(e.to_string()))
}

/// Lifetime the cache trusts a token for: 90% of `expires_in`, in whole
/// seconds.
fn expiry_margin(expires_in: i64) -> TimeDelta {
    let secs = (expires_in.max(0) as f64 * EXPIRY_FACTOR) as i64;
    TimeDelta::try_seconds(secs).unwrap_or(TimeDelta::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ManualClock, ScriptedTransport};

    const TOKEN_URL: &str = "http://oauth.local/oauth2/token";
    const GRANT: &str = r#"{"access_token":"dummy-access-token","expires_in":3600}"#;

    fn store(transport: &Arc<ScriptedTransport>, clock: &Arc<ManualClock>) -> TokenStore {
        TokenStore::new(TOKEN_URL, transport.clone(), clock.clone()).unwrap()
    }

    #[test]
    fn returns_cached_token() {
        let transport = Arc::new(ScriptedTransport::always(200, GRANT));
        let clock = Arc::new(ManualClock::default());
        let ts = store(&transport, &clock);

        assert_eq!(ts.fetch("id", "secret").unwrap(), "dummy-access-token");
        assert_eq!(ts.fetch("id", "secret").unwrap(), "dummy-access-token");
        assert_eq!(transport.calls(), 1);
    }

    #[test]
    fn refreshes_after_expiry() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .push_response(200, GRANT)
            .push_response(200, r#"{"access_token":"second","expires_in":3600}"#);
        let clock = Arc::new(ManualClock::default());
        let ts = store(&transport, &clock);

        assert_eq!(ts.fetch("id", "secret").unwrap(), "dummy-access-token");
        clock.advance_secs(3600);
        assert_eq!(ts.fetch("id", "secret").unwrap(), "second");
        assert_eq!(transport.calls(), 2);
    }

    #[test]
    fn expiry_margin_is_ten_percent() {
        let transport = Arc::new(ScriptedTransport::always(200, GRANT));
        let clock = Arc::new(ManualClock::default());
        let ts = store(&transport, &clock);

        ts.fetch("id", "secret").unwrap();
        clock.advance_secs(3239);
        ts.fetch("id", "secret").unwrap();
        assert_eq!(transport.calls(), 1);
        clock.advance_secs(1);
        ts.fetch("id", "secret").unwrap();
        assert_eq!(transport.calls(), 2);
    }

    #[test]
    fn sends_basic_auth_without_body() {
        let transport = Arc::new(ScriptedTransport::always(200, GRANT));
        let clock = Arc::new(ManualClock::default());
        let ts = store(&transport, &clock);
        ts.fetch("client", "s3cret").unwrap();

        let requests = transport.requests();
        let req = &requests[0];
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.url, TOKEN_URL);
        assert!(req.body.is_none());
        // base64("client:s3cret")
        assert_eq!(req.header("Authorization"), Some("Basic Y2xpZW50OnMzY3JldA=="));
    }

    #[test]
    fn rejected_grant_is_not_cached() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .push_response(401, r#"{"error":"invalid_client"}"#)
            .push_response(200, GRANT);
        let clock = Arc::new(ManualClock::default());
        let ts = store(&transport, &clock);

        let err = ts.fetch("id", "wrong").unwrap_err();
        assert!(matches!(err, Error::Authentication { status: Some(401), .. }));
        assert_eq!(ts.fetch("id", "secret").unwrap(), "dummy-access-token");
        assert_eq!(transport.calls(), 2);
    }

    #[test]
    fn unreachable_endpoint_is_an_authentication_error() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_error("connection refused");
        let clock = Arc::new(ManualClock::default());
        let ts = store(&transport, &clock);

        let err = ts.fetch("id", "secret").unwrap_err();
        assert!(matches!(err, Error::Authentication { status: None, .. }));
    }

    #[test]
    fn malformed_grant_is_a_decode_error() {
        let transport = Arc::new(ScriptedTransport::always(200, "not json"));
        let clock = Arc::new(ManualClock::default());
        let ts = store(&transport, &clock);
        assert!(matches!(ts.fetch("id", "secret"), Err(Error::Decode(_))));
    }

    #[test]
    fn invalidate_forces_refresh() {
        let transport = Arc::new(ScriptedTransport::always(200, GRANT));
        let clock = Arc::new(ManualClock::default());
        let ts = store(&transport, &clock);
        ts.fetch("id", "secret").unwrap();
        ts.invalidate();
        ts.fetch("id", "secret").unwrap();
        assert_eq!(transport.calls(), 2);
    }

    #[test]
    fn malformed_endpoint_fails_construction() {
        let transport: Arc<dyn Transport> = Arc::new(ScriptedTransport::new());
        let err = TokenStore::with_system_clock("::not a url::", transport).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn concurrent_fetches_share_one_refresh() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::time::Duration;

        struct SlowGrant {
            calls: AtomicUsize,
        }

        impl Transport for SlowGrant {
            fn send(
                &self,
                _request: &HttpRequest,
            ) -> std::result::Result<HttpResponse, crate::http::TransportError> {
                let n = self.calls.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(50));
                Ok(HttpResponse::new(
                    200,
                    format!(r#"{{"access_token":"token-{n}","expires_in":3600}}"#),
                ))
            }
        }

        let transport = Arc::new(SlowGrant {
            calls: AtomicUsize::new(0),
        });
        let clock = Arc::new(ManualClock::default());
        let ts = TokenStore::new(TOKEN_URL, transport.clone(), clock).unwrap();

        let tokens: Vec<String> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..16)
                .map(|_| s.spawn(|| ts.fetch("id", "secret").unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        assert!(tokens.iter().all(|t| t == "token-0"));
    }
}
