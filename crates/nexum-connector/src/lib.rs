//! # Connector Runtime
//!
//! Core abstractions for integrating nexum with external SaaS providers.
//!
//! This crate defines the contract a provider connector implements and the
//! runtime pieces every connector shares: typed identifiers, the resilience
//! governor, per-instance result caching, and instance configuration.
//!
//! ## Architecture
//!
//! - [`Connector`] - The contract all provider connectors implement
//! - [`ResilienceGovernor`] - Rate limiting and circuit breaking per
//!   (provider, operation) key
//! - [`ResultCache`] - Event-invalidated cache of expensive lookups
//! - [`ConnectorConfig`] - Per-instance configuration with declared
//!   field requirements
//!
//! ## Example
//!
//! ```ignore
//! use nexum_connector::prelude::*;
//!
//! let governor = ResilienceGovernor::with_defaults();
//! let key = GovernorKey::new(
//!     "acme".parse()?,
//!     OperationKey::for_sync("contacts")?,
//! );
//!
//! // Every provider call goes through the governor.
//! let page = governor
//!     .execute(&key, RatePolicy::FailFast, || connector_fetch_page())
//!     .await?;
//! ```
//!
//! ## Crate Organization
//!
//! - [`ids`] - Type-safe identifiers (`ProviderId`, `OperationKey`)
//! - [`types`] - Cross-boundary data model (credentials, results, payloads)
//! - [`error`] - Error types with transient/permanent classification
//! - [`traits`] - The [`Connector`] contract
//! - [`config`] - Per-instance configuration
//! - [`resilience`] - Governor, clock injection, retry helper
//! - [`cache`] - Per-instance result cache

pub mod cache;
pub mod config;
pub mod error;
pub mod ids;
pub mod resilience;
pub mod traits;
pub mod types;

/// Prelude module for convenient imports.
///
/// ```
/// use nexum_connector::prelude::*;
/// ```
pub mod prelude {
    // IDs
    pub use crate::ids::{OperationKey, ProviderId};

    // Types and enums
    pub use crate::types::{
        AuthResult, Capability, CircuitState, ConnectionFailure, ConnectionStatus, Credential,
        RateLimitInfo, SyncMetadata, SyncOptions, SyncResult, WebhookPayload,
    };

    // Error handling
    pub use crate::error::{ConnectorError, ConnectorResult};

    // Traits
    pub use crate::traits::Connector;

    // Configuration
    pub use crate::config::ConnectorConfig;

    // Resilience
    pub use crate::resilience::{
        Clock, GovernorConfig, GovernorKey, GovernorStatus, ManualClock, RatePolicy,
        ResilienceGovernor, RetryConfig, RetryExecutor, SystemClock,
    };

    // Cache
    pub use crate::cache::{CacheStats, ResultCache};
}

// Re-export async_trait for connector implementors
pub use async_trait::async_trait;

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_prelude_imports() {
        // Verify the prelude types are accessible
        let provider: ProviderId = "acme".parse().unwrap();
        let operation = OperationKey::for_sync("contacts").unwrap();
        let _key = GovernorKey::new(provider, operation);
        let _config = GovernorConfig::default();
        let _policy = RatePolicy::FailFast;
        let _state = CircuitState::Closed;
        let _options = SyncOptions::full();
        let _credential = Credential::new("token");
    }
}
