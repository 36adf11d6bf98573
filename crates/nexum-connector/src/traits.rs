//! The contract every provider connector implements.

use async_trait::async_trait;

use crate::error::ConnectorResult;
use crate::ids::ProviderId;
use crate::types::{
    AuthResult, Capability, ConnectionStatus, SyncOptions, SyncResult, WebhookPayload,
};

/// A bidirectional integration with one external provider, bound to one
/// user's configuration and credentials.
///
/// Implementations hold plaintext credentials only as call-local values;
/// durable storage goes through the vault.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Provider this connector talks to.
    fn provider(&self) -> &ProviderId;

    /// Display name for this connector instance.
    fn display_name(&self) -> &str;

    /// Perform initial authentication against the provider and store the
    /// issued credential in the vault.
    ///
    /// Missing required configuration surfaces as a descriptive
    /// `MissingConfig` error, not a panic.
    async fn authenticate(&self) -> ConnectorResult<AuthResult>;

    /// Exchange the stored refresh token for a fresh credential and store
    /// the replacement in the vault.
    async fn refresh_token(&self) -> ConnectorResult<AuthResult>;

    /// Revoke access at the provider and delete the stored credential.
    ///
    /// Best effort: never fails, returns `false` when revocation could not
    /// be completed.
    async fn revoke_access(&self) -> bool;

    /// Probe provider reachability and credential validity.
    ///
    /// Returns a status snapshot rather than an error for ordinary
    /// failures; only infrastructure problems surface as `Err`.
    async fn test_connection(&self) -> ConnectorResult<ConnectionStatus>;

    /// Run one sync pass across the connector's resource streams.
    ///
    /// Always returns a result object, partial failures included; `Err`
    /// is reserved for passes that could not start at all.
    async fn sync(&self, options: &SyncOptions) -> ConnectorResult<SyncResult>;

    /// Process one verified webhook delivery.
    ///
    /// Called only after signature verification; must finish any cache
    /// invalidation before returning.
    async fn handle_webhook(&self, payload: &WebhookPayload) -> ConnectorResult<()>;

    /// Verify a presented signature against the configured secret.
    ///
    /// Pure: computed over the raw body bytes exactly as received, compared
    /// in constant time, no side effects.
    fn validate_webhook_signature(&self, payload: &WebhookPayload, signature: &str) -> bool;

    /// Capabilities this connector instance advertises.
    fn capabilities(&self) -> Vec<Capability>;

    /// Whether a named capability is advertised and enabled.
    fn supports(&self, capability_name: &str) -> bool {
        self.capabilities()
            .iter()
            .any(|c| c.name == capability_name && c.enabled)
    }
}
