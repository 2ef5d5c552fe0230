//! Catalog credentials and the process-wide credential cache.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use reqwest::StatusCode;
use reqwest::header::{HeaderValue, InvalidHeaderValue};
use serde::Deserialize;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::error::LocatorError;
use crate::transport::{CatalogRequest, HttpExecutor};

/// A bearer token issued by the catalog.
///
/// Credentials are never mutated; a refresh replaces the whole value.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
    expires_at: Option<Instant>,
}

impl Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl Credential {
    /// A credential valid for `ttl` from now, or indefinitely.
    pub fn new(token: impl Into<String>, ttl: Option<Duration>) -> Self {
        Self {
            token: token.into(),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|expires_at| Instant::now() >= expires_at)
    }

    /// Value of the `Authorization` header carrying this credential.
    pub fn bearer_header(&self) -> Result<HeaderValue, InvalidHeaderValue> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", self.token))?;
        value.set_sensitive(true);
        Ok(value)
    }
}

/// The single external call that produces a credential.
pub trait Authenticator: Send + Sync {
    /// Obtain a fresh credential, or `None` if the catalog refused or could
    /// not be reached.
    fn authenticate(&self) -> Option<Credential>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthenticationResponse {
    json_web_token: String,
    #[serde(default)]
    expires_in_milliseconds: Option<u64>,
}

/// Exchanges a license key for a bearer token via `POST {base}/api/authenticate`.
pub struct LicenseKeyAuthenticator {
    executor: Arc<dyn HttpExecutor>,
    url: Url,
    license_key: String,
}

impl Debug for LicenseKeyAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LicenseKeyAuthenticator")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl LicenseKeyAuthenticator {
    pub fn new(
        base_url: &Url,
        license_key: impl Into<String>,
        executor: Arc<dyn HttpExecutor>,
    ) -> Result<Self, LocatorError> {
        let mut base = base_url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let url = base
            .join("api/authenticate")
            .map_err(LocatorError::InvalidUrl)?;
        Ok(Self {
            executor,
            url,
            license_key: license_key.into(),
        })
    }
}

impl Authenticator for LicenseKeyAuthenticator {
    #[instrument(skip_all, fields(url = %self.url))]
    fn authenticate(&self) -> Option<Credential> {
        let Ok(mut authorization) =
            HeaderValue::from_str(&format!("license-key {}", self.license_key))
        else {
            warn!("license key cannot be sent as a header value");
            return None;
        };
        authorization.set_sensitive(true);

        let request = CatalogRequest::post(self.url.clone()).with_authorization(authorization);
        let response = match self.executor.execute(&request) {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "authentication request failed");
                return None;
            },
        };

        if response.status != StatusCode::OK {
            warn!(status = %response.status, "catalog rejected authentication");
            return None;
        }

        match serde_json::from_slice::<AuthenticationResponse>(&response.body) {
            Ok(parsed) => {
                debug!(
                    expires_in_ms = parsed.expires_in_milliseconds,
                    "obtained catalog credential"
                );
                Some(Credential::new(
                    parsed.json_web_token,
                    parsed.expires_in_milliseconds.map(Duration::from_millis),
                ))
            },
            Err(err) => {
                warn!(error = %err, "failed to parse authentication response");
                None
            },
        }
    }
}

struct StampedCredential {
    generation: u64,
    credential: Arc<Credential>,
}

/// Holds the one current credential for a client session.
///
/// Reads are lock-free once a credential is cached. Creating a credential
/// takes a lock and re-checks, so concurrent callers that all find the cache
/// empty collapse into a single authentication.
///
/// Every invalidation bumps a generation counter, and a cached credential is
/// only served while its generation is current. An authentication that was
/// already running when an invalidation happened therefore cannot resurrect
/// an obsolete token.
pub struct AuthorizationCache {
    authenticator: Box<dyn Authenticator>,
    current: ArcSwapOption<StampedCredential>,
    generation: AtomicU64,
    refresh_lock: Mutex<()>,
}

impl Debug for AuthorizationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationCache")
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .field("cached", &self.current.load().is_some())
            .finish_non_exhaustive()
    }
}

impl AuthorizationCache {
    pub fn new(authenticator: impl Authenticator + 'static) -> Self {
        Self {
            authenticator: Box::new(authenticator),
            current: ArcSwapOption::empty(),
            generation: AtomicU64::new(0),
            refresh_lock: Mutex::new(()),
        }
    }

    /// The current credential, authenticating first if there is none.
    pub fn get_or_create(&self) -> Option<Arc<Credential>> {
        if let Some(credential) = self.current_credential() {
            return Some(credential);
        }
        self.create()
    }

    /// Drop the current credential and authenticate again, unless another
    /// caller already did so after this invalidation.
    pub fn invalidate_and_create(&self) -> Option<Arc<Credential>> {
        self.invalidate();
        self.create()
    }

    /// Drop the current credential without authenticating.
    pub fn invalidate(&self) {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.current.store(None);
        debug!(generation, "invalidated catalog credential");
    }

    fn current_credential(&self) -> Option<Arc<Credential>> {
        let guard = self.current.load();
        let stamped = guard.as_deref()?;
        if stamped.generation != self.generation.load(Ordering::Acquire) {
            return None;
        }
        if stamped.credential.is_expired() {
            return None;
        }
        Some(Arc::clone(&stamped.credential))
    }

    fn create(&self) -> Option<Arc<Credential>> {
        let _guard = self
            .refresh_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        // Another caller may have authenticated while we waited for the lock.
        if let Some(credential) = self.current_credential() {
            return Some(credential);
        }

        let generation = self.generation.load(Ordering::Acquire);
        debug!(generation, "authenticating with catalog");
        let Some(credential) = self.authenticator.authenticate() else {
            warn!("catalog authentication produced no credential");
            return None;
        };

        let credential = Arc::new(credential);
        self.current.store(Some(Arc::new(StampedCredential {
            generation,
            credential: Arc::clone(&credential),
        })));
        Some(credential)
    }
}
