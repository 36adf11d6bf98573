//! Data model shared across the integration runtime.
//!
//! These are the cross-boundary contracts a provider connector satisfies:
//! credentials, auth outcomes, connection probes, sync results, webhook
//! payloads, and capability descriptors.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::ProviderId;

/// State of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Circuit is closed, operations are processed normally.
    #[default]
    Closed,
    /// Circuit is open, operations are rejected without running.
    Open,
    /// Circuit is half-open, a single probe operation is allowed.
    HalfOpen,
}

impl CircuitState {
    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }

    /// Whether operations may run in this state.
    #[must_use]
    pub fn allows_operations(&self) -> bool {
        matches!(self, CircuitState::Closed | CircuitState::HalfOpen)
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CircuitState {
    type Err = ParseCircuitStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "closed" => Ok(CircuitState::Closed),
            "open" => Ok(CircuitState::Open),
            "half_open" => Ok(CircuitState::HalfOpen),
            _ => Err(ParseCircuitStateError(s.to_string())),
        }
    }
}

/// Error parsing a circuit state from string.
#[derive(Debug, Clone)]
pub struct ParseCircuitStateError(String);

impl fmt::Display for ParseCircuitStateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid circuit state '{}', expected one of: closed, open, half_open",
            self.0
        )
    }
}

impl std::error::Error for ParseCircuitStateError {}

/// An access/refresh token pair owned by one (user, provider) pair.
///
/// Created by `authenticate`, rotated by `refresh_token`, destroyed on
/// `revoke_access`. Held in plaintext only inside the vault boundary and
/// as a connector-local variable for the duration of a call.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credential {
    /// The access token presented to the provider.
    pub access_token: String,
    /// Refresh token, when the provider issues one.
    pub refresh_token: Option<String>,
    /// Expiry of the access token, when the provider reports one.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    /// Create a credential holding only an access token.
    #[must_use]
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
        }
    }

    /// Attach a refresh token.
    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Attach an expiry timestamp.
    #[must_use]
    pub fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Whether the access token is expired at the given instant.
    ///
    /// Credentials without a known expiry never report expired.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Outcome of `authenticate` or `refresh_token`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthResult {
    /// Whether authentication succeeded.
    pub success: bool,
    /// Access token on success.
    pub access_token: Option<String>,
    /// Refresh token, when the provider issues one.
    pub refresh_token: Option<String>,
    /// Access token expiry, when the provider reports one.
    pub expires_at: Option<DateTime<Utc>>,
    /// Granted scope string, when the provider reports one.
    pub scope: Option<String>,
    /// Provider-side failure description on soft failure.
    pub error: Option<String>,
}

impl AuthResult {
    /// Successful authentication carrying the issued credential.
    #[must_use]
    pub fn authenticated(credential: &Credential) -> Self {
        Self {
            success: true,
            access_token: Some(credential.access_token.clone()),
            refresh_token: credential.refresh_token.clone(),
            expires_at: credential.expires_at,
            scope: None,
            error: None,
        }
    }

    /// Attach the granted scope string.
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Provider-side denial with a description.
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            access_token: None,
            refresh_token: None,
            expires_at: None,
            scope: None,
            error: Some(error.into()),
        }
    }

    /// Extract the credential from a successful result.
    #[must_use]
    pub fn credential(&self) -> Option<Credential> {
        self.access_token.as_ref().map(|token| Credential {
            access_token: token.clone(),
            refresh_token: self.refresh_token.clone(),
            expires_at: self.expires_at,
        })
    }
}

impl fmt::Debug for AuthResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthResult")
            .field("success", &self.success)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .field("error", &self.error)
            .finish()
    }
}

/// Classification of a failed connection probe.
///
/// Callers react differently per class: re-authenticate, back off, or
/// surface the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionFailure {
    /// Credentials are missing, invalid, or expired.
    Unauthenticated,
    /// The provider is throttling this principal.
    RateLimited,
    /// Anything else.
    Unknown,
}

impl ConnectionFailure {
    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionFailure::Unauthenticated => "unauthenticated",
            ConnectionFailure::RateLimited => "rate_limited",
            ConnectionFailure::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ConnectionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Provider-reported rate limit headroom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitInfo {
    /// Total requests allowed in the current window.
    pub limit: u32,
    /// Requests remaining in the current window.
    pub remaining: u32,
    /// When the window resets.
    pub reset_time: DateTime<Utc>,
}

/// Result of a connection probe. Recomputed on demand, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionStatus {
    /// Whether the probe succeeded.
    pub is_connected: bool,
    /// When the probe ran.
    pub last_checked: DateTime<Utc>,
    /// Failure description, when the probe failed.
    pub error: Option<String>,
    /// Typed failure classification, when the probe failed.
    pub failure: Option<ConnectionFailure>,
    /// Rate limit headroom, when the provider reported it.
    pub rate_limit_info: Option<RateLimitInfo>,
}

impl ConnectionStatus {
    /// A successful probe at the given instant.
    #[must_use]
    pub fn connected(last_checked: DateTime<Utc>) -> Self {
        Self {
            is_connected: true,
            last_checked,
            error: None,
            failure: None,
            rate_limit_info: None,
        }
    }

    /// A failed probe with its classification and description.
    #[must_use]
    pub fn failed(
        last_checked: DateTime<Utc>,
        failure: ConnectionFailure,
        error: impl Into<String>,
    ) -> Self {
        Self {
            is_connected: false,
            last_checked,
            error: Some(error.into()),
            failure: Some(failure),
            rate_limit_info: None,
        }
    }

    /// Attach provider-reported rate limit headroom.
    #[must_use]
    pub fn with_rate_limit_info(mut self, info: RateLimitInfo) -> Self {
        self.rate_limit_info = Some(info);
        self
    }
}

/// Per-pass parameters for `sync`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Incremental cursor: records modified at or before this instant are
    /// skipped, making repeated passes idempotent.
    ///
    /// This is last-modified cursoring, not a change log: writes landing
    /// exactly at the cursor boundary during a pass can be missed or
    /// double-counted. Accepted limitation.
    pub last_sync_time: Option<DateTime<Utc>>,
}

impl SyncOptions {
    /// Options for a full (non-incremental) pass.
    #[must_use]
    pub fn full() -> Self {
        Self::default()
    }

    /// Options for an incremental pass from the given cursor.
    #[must_use]
    pub fn since(last_sync_time: DateTime<Utc>) -> Self {
        Self {
            last_sync_time: Some(last_sync_time),
        }
    }
}

/// Metadata attached to every sync result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncMetadata {
    /// When the pass finished.
    pub synced_at: DateTime<Utc>,
    /// Provider the pass ran against.
    pub provider: ProviderId,
}

/// Aggregated outcome of one sync pass across all resource streams.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResult {
    /// False only when every stream failed at stream level; per-item
    /// failures never flip this.
    pub success: bool,
    /// Records handled by the pass, including records whose per-item
    /// processing failed (those failures land in `errors`).
    pub items_processed: u64,
    /// Records skipped by the incremental cursor.
    pub items_skipped: u64,
    /// Stream-level and per-item error descriptions.
    pub errors: Vec<String>,
    /// Pass metadata.
    pub metadata: SyncMetadata,
}

impl SyncResult {
    /// Whether the pass collected any errors (stream-level or per-item).
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// A static capability advertised by a connector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    /// Capability name (`sync_contacts`, `webhooks`).
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Whether the capability is enabled for this instance.
    pub enabled: bool,
    /// OAuth scopes the capability requires.
    pub required_scopes: Vec<String>,
}

impl Capability {
    /// Create an enabled capability with no required scopes.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            enabled: true,
            required_scopes: Vec::new(),
        }
    }

    /// Set the required OAuth scopes.
    #[must_use]
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Mark the capability disabled for this instance.
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// An inbound webhook delivery. Transient; never persisted beyond the
/// handler invocation.
#[derive(Debug, Clone)]
pub struct WebhookPayload {
    /// Ingest-assigned id for log correlation.
    pub delivery_id: Uuid,
    /// Request headers, lowercased names.
    pub headers: HashMap<String, String>,
    /// Query parameters.
    pub query: HashMap<String, String>,
    /// Raw request body. Signatures are computed over these exact bytes.
    pub body: String,
    /// Event type, when the body carried one.
    pub event: Option<String>,
    /// Parsed body payload, when the body was JSON.
    pub data: Option<serde_json::Value>,
    /// When the delivery was received.
    pub timestamp: DateTime<Utc>,
}

impl WebhookPayload {
    /// Create a payload for a just-received delivery.
    #[must_use]
    pub fn new(
        headers: HashMap<String, String>,
        query: HashMap<String, String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            delivery_id: Uuid::new_v4(),
            headers,
            query,
            body: body.into(),
            event: None,
            data: None,
            timestamp: Utc::now(),
        }
    }

    /// Set the parsed event type.
    #[must_use]
    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    /// Set the parsed body payload.
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Look up a header by name, case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}
