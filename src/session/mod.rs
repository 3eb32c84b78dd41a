//! Authenticated, throttled session with the telemetry API
//!
//! A [`SessionDialog`] owns the HTTP entry point, the login/logout resource
//! paths and the credentials. It walks one state machine per scoped use:
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Disconnecting -> Disconnected
//!                     |
//!                     +-- login failed --> Disconnected
//! ```
//!
//! Every outgoing call, login and logout included, is admitted through the
//! session's [`RateLimiter`] first. Non-success statuses are hard errors and
//! are never retried here.
//!
//! Lifecycle futures may be dropped at any await point (timeouts, lost
//! `select!` branches): an interrupted `open` or `close` falls back to
//! `Disconnected`, and an interrupted scope discards its token and logs out
//! from a background task.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use reqwest::header::COOKIE;
use reqwest::{Client, Method};
use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub mod rate_limit;
pub mod response;

pub use rate_limit::RateLimiter;
pub use response::ApiResponse;

use crate::batch::LeafFetcher;
use crate::config::{ClientConfig, Credentials};
use crate::error::{ClientError, ClientResult};
use crate::metrics;

/// Observable lifecycle phase of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No token held; initial and terminal phase
    Disconnected,
    /// Login in flight
    Connecting,
    /// Token held; requests allowed
    Connected,
    /// Logout in flight
    Disconnecting,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionPhase::Disconnected => "disconnected",
            SessionPhase::Connecting => "connecting",
            SessionPhase::Connected => "connected",
            SessionPhase::Disconnecting => "disconnecting",
        };
        f.write_str(s)
    }
}

/// Authentication token issued at login (the session cookies)
#[derive(Clone)]
struct AuthToken(String);

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(<redacted>)")
    }
}

#[derive(Debug)]
enum SessionState {
    Disconnected,
    Connecting,
    Connected(AuthToken),
    Disconnecting,
}

impl SessionState {
    fn phase(&self) -> SessionPhase {
        match self {
            SessionState::Disconnected => SessionPhase::Disconnected,
            SessionState::Connecting => SessionPhase::Connecting,
            SessionState::Connected(_) => SessionPhase::Connected,
            SessionState::Disconnecting => SessionPhase::Disconnecting,
        }
    }
}

/// Throttled HTTP entry point
///
/// Owned and cloneable so a logout can outlive a dropped scope.
#[derive(Clone)]
struct Transport {
    http: Client,
    base_url: String,
    limiter: RateLimiter,
}

impl Transport {
    /// Throttled HTTP call; any non-success status is an error
    async fn send(
        &self,
        method: Method,
        resource: &str,
        token: Option<&AuthToken>,
        form: Option<&Credentials>,
    ) -> ClientResult<reqwest::Response> {
        let url = format!("{}/{}", self.base_url, resource.trim_start_matches('/'));
        let label = resource.split('?').next().unwrap_or(resource);

        self.limiter.admit().await;
        debug!(%method, resource = label, "Request sent at {}", url);

        let mut request = self.http.request(method, &url);
        if let Some(token) = token {
            request = request.header(COOKIE, token.0.as_str());
        }
        if let Some(credentials) = form {
            request = request.form(credentials.fields());
        }

        let started = Instant::now();
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                metrics::record_request(label, "network_error", started.elapsed());
                return Err(ClientError::Network(e));
            }
        };

        let status = response.status();
        if !status.is_success() {
            metrics::record_request(label, "http_error", started.elapsed());
            warn!(resource = label, status = status.as_u16(), "Request rejected");
            return Err(ClientError::from_status(status));
        }

        metrics::record_request(label, "success", started.elapsed());
        Ok(response)
    }
}

/// Puts a transitional phase back to `Disconnected` if its future is dropped
struct PhaseGuard<'a> {
    state: &'a Mutex<SessionState>,
    armed: bool,
}

impl<'a> PhaseGuard<'a> {
    fn new(state: &'a Mutex<SessionState>) -> Self {
        Self { state, armed: true }
    }

    /// Leave the transition in `next`
    fn settle(mut self, next: SessionState) {
        *self.state.lock() = next;
        self.armed = false;
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            *self.state.lock() = SessionState::Disconnected;
        }
    }
}

/// Releases the session if a scope is dropped before it reaches `close`
struct ScopeGuard<'a> {
    session: &'a SessionDialog,
    armed: bool,
}

impl ScopeGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.session.abandon();
        }
    }
}

/// Scoped, authenticated dialog with the API
pub struct SessionDialog {
    transport: Transport,
    login_path: String,
    logout_path: String,
    credentials: Credentials,
    state: Mutex<SessionState>,
    now: DateTime<Utc>,
}

impl SessionDialog {
    /// Create a disconnected session from configuration
    ///
    /// Builds a dedicated HTTP client with the configured connect and request
    /// timeouts. "Now" is pinned here for the lifetime of the session.
    ///
    /// # Errors
    /// Returns `ClientError::Config` if the configuration is invalid or the
    /// HTTP client cannot be built
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {e}")))?;
        Self::with_http_client(config, http)
    }

    /// Create a disconnected session on top of an existing HTTP client
    pub fn with_http_client(config: &ClientConfig, http: Client) -> ClientResult<Self> {
        config.validate()?;
        let now = config
            .now
            .map(|now| now.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        debug!(base_url = %config.base_url, %now, "New session dialog");

        Ok(Self {
            transport: Transport {
                http,
                base_url: config.base_url.trim_end_matches('/').to_string(),
                limiter: RateLimiter::new(config.max_requests_per_second),
            },
            login_path: config.login_path.clone(),
            logout_path: config.logout_path.clone(),
            credentials: config.credentials.clone(),
            state: Mutex::new(SessionState::Disconnected),
            now,
        })
    }

    /// Anchor used for every relative time window of this session
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Entry point all resource paths are resolved against
    pub fn base_url(&self) -> &str {
        &self.transport.base_url
    }

    /// The session's throttle
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.transport.limiter
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> SessionPhase {
        self.state.lock().phase()
    }

    /// Log in and store the authentication token
    ///
    /// Dropping the returned future mid-login leaves the session
    /// disconnected.
    ///
    /// # Errors
    /// - `ClientError::InvalidState` if the session is not disconnected
    /// - `ClientError::SessionOpen` wrapping the transport, status or empty
    ///   token failure; the session is left disconnected without a token
    pub async fn open(&self) -> ClientResult<()> {
        let guard = {
            let mut state = self.state.lock();
            let phase = state.phase();
            if phase != SessionPhase::Disconnected {
                return Err(ClientError::InvalidState {
                    operation: "open",
                    phase,
                });
            }
            *state = SessionState::Connecting;
            PhaseGuard::new(&self.state)
        };

        match self.login().await {
            Ok(token) => {
                guard.settle(SessionState::Connected(token));
                metrics::record_session_event("open");
                info!(base_url = %self.transport.base_url, "Successfully connected to API");
                Ok(())
            }
            Err(e) => {
                guard.settle(SessionState::Disconnected);
                metrics::record_session_event("open_failed");
                warn!(error = %e, "Failed to establish session");
                Err(ClientError::SessionOpen(Box::new(e)))
            }
        }
    }

    async fn login(&self) -> ClientResult<AuthToken> {
        let response = self
            .transport
            .send(Method::POST, &self.login_path, None, Some(&self.credentials))
            .await?;

        let token = response
            .cookies()
            .map(|c| format!("{}={}", c.name(), c.value()))
            .collect::<Vec<_>>()
            .join("; ");

        if token.is_empty() {
            return Err(ClientError::EmptyToken);
        }
        Ok(AuthToken(token))
    }

    /// Perform an authenticated request against `base_url/resource`
    ///
    /// `resource` may carry an encoded query string.
    ///
    /// # Errors
    /// - `ClientError::InvalidState` if the session is not connected
    /// - `ClientError::Connection` on any non-success status
    /// - `ClientError::Network` on transport failure
    pub async fn request(&self, method: Method, resource: &str) -> ClientResult<ApiResponse> {
        let token = match &*self.state.lock() {
            SessionState::Connected(token) => token.clone(),
            other => {
                return Err(ClientError::InvalidState {
                    operation: "request",
                    phase: other.phase(),
                })
            }
        };

        let response = self
            .transport
            .send(method, resource, Some(&token), None)
            .await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;

        Ok(ApiResponse::new(resource, status, body))
    }

    /// Log out and discard the token
    ///
    /// The token is discarded even when the logout call fails or the returned
    /// future is dropped before the logout completes.
    ///
    /// # Errors
    /// Returns `ClientError::SessionClose` wrapping the cause, including the
    /// case of a session that was never opened
    pub async fn close(&self) -> ClientResult<()> {
        let (token, guard) = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut *state, SessionState::Disconnecting) {
                SessionState::Connected(token) => (token, PhaseGuard::new(&self.state)),
                other => {
                    let phase = other.phase();
                    *state = other;
                    return Err(ClientError::SessionClose(Box::new(
                        ClientError::InvalidState {
                            operation: "close",
                            phase,
                        },
                    )));
                }
            }
        };

        let logout = self
            .transport
            .send(Method::GET, &self.logout_path, Some(&token), None)
            .await;
        drop(token);
        guard.settle(SessionState::Disconnected);

        match logout {
            Ok(_) => {
                metrics::record_session_event("close");
                info!("Successfully disconnected from API");
                Ok(())
            }
            Err(e) => {
                metrics::record_session_event("close_failed");
                Err(ClientError::SessionClose(Box::new(e)))
            }
        }
    }

    /// Run `body` inside an open session
    ///
    /// Opens the session, awaits `body`, then closes the session on every
    /// exit path. When both `body` and the logout fail, the body's error is
    /// returned and the logout failure is logged.
    ///
    /// If the returned future is dropped while the body runs, the token is
    /// discarded at once and the logout is spawned onto the current runtime.
    pub async fn scoped<T, F>(&self, body: F) -> ClientResult<T>
    where
        F: Future<Output = ClientResult<T>>,
    {
        self.open().await?;
        let scope = ScopeGuard {
            session: self,
            armed: true,
        };
        let outcome = body.await;
        scope.disarm();
        let closed = self.close().await;

        match (outcome, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(close_err)) => Err(close_err),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(close_err)) => {
                warn!(error = %close_err, "Failed to close session after error in scope");
                Err(e)
            }
        }
    }

    /// Discard the token of a dropped scope and log out in the background
    fn abandon(&self) {
        let token = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut *state, SessionState::Disconnected) {
                SessionState::Connected(token) => token,
                other => {
                    *state = other;
                    return;
                }
            }
        };
        metrics::record_session_event("abandoned");

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("Session scope dropped outside a runtime, token discarded without logout");
            return;
        };

        warn!("Session scope dropped while connected, logging out in the background");
        let transport = self.transport.clone();
        let logout_path = self.logout_path.clone();
        runtime.spawn(async move {
            match transport
                .send(Method::GET, &logout_path, Some(&token), None)
                .await
            {
                Ok(_) => metrics::record_session_event("close"),
                Err(e) => {
                    metrics::record_session_event("close_failed");
                    warn!(error = %e, "Background logout failed");
                }
            }
        });
    }
}

#[async_trait]
impl LeafFetcher for SessionDialog {
    async fn fetch(&self, resource_path: &str) -> ClientResult<ApiResponse> {
        self.request(Method::GET, resource_path).await
    }
}
