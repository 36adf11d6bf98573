//! Error types for connector operations.

use thiserror::Error;

use crate::ids::OperationKey;

/// Errors that can occur during connector operations.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Failed to establish a connection to the provider.
    #[error("connection failed: {message}")]
    ConnectionFailed {
        /// Description of the failure.
        message: String,
        /// Underlying error, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The provider did not respond in time.
    #[error("connection timed out after {timeout_secs}s")]
    ConnectionTimeout {
        /// Timeout that elapsed.
        timeout_secs: u64,
    },

    /// The provider is reachable but refusing service.
    #[error("target system unavailable: {message}")]
    TargetUnavailable {
        /// Description of the condition.
        message: String,
    },

    /// A network-level failure between the runtime and the provider.
    #[error("network error: {message}")]
    NetworkError {
        /// Description of the failure.
        message: String,
        /// Underlying error, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The provider rejected the presented credentials.
    #[error("authentication failed: {message}")]
    AuthenticationFailed {
        /// Description of the rejection.
        message: String,
    },

    /// The stored credential is expired and could not be refreshed.
    #[error("credentials expired and refresh was not possible")]
    CredentialsExpired,

    /// Required configuration fields are absent.
    #[error("missing required configuration for provider '{provider}': {}", fields.join(", "))]
    MissingConfig {
        /// Provider the configuration belongs to.
        provider: String,
        /// Names of the absent fields.
        fields: Vec<&'static str>,
    },

    /// Configuration is present but invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration {
        /// Description of the problem.
        message: String,
    },

    /// The operation was rejected by the rate limiter.
    #[error("rate limit exceeded for operation '{operation}', retry after {retry_after_secs}s")]
    RateLimited {
        /// Operation that was throttled.
        operation: OperationKey,
        /// Seconds until capacity is expected back.
        retry_after_secs: u64,
    },

    /// The operation was rejected because its circuit is open.
    #[error("circuit open for operation '{operation}', retry after {retry_after_secs}s")]
    CircuitOpen {
        /// Operation whose circuit is open.
        operation: OperationKey,
        /// Seconds until the next probe is allowed.
        retry_after_secs: u64,
    },

    /// Failed to serialize or deserialize provider data.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the failure.
        message: String,
    },

    /// An internal runtime error.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the failure.
        message: String,
        /// Underlying error, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ConnectorError {
    /// Create a connection failure error.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection failure error with an underlying source.
    pub fn connection_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::ConnectionFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a timeout error.
    pub fn timeout(timeout_secs: u64) -> Self {
        Self::ConnectionTimeout { timeout_secs }
    }

    /// Create a target-unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::TargetUnavailable {
            message: message.into(),
        }
    }

    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
            source: None,
        }
    }

    /// Create an authentication failure error.
    pub fn auth(message: impl Into<String>) -> Self {
        Self::AuthenticationFailed {
            message: message.into(),
        }
    }

    /// Create a missing-configuration error.
    pub fn missing_config(provider: impl Into<String>, fields: Vec<&'static str>) -> Self {
        Self::MissingConfig {
            provider: provider.into(),
            fields,
        }
    }

    /// Create an invalid-configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
        }
    }

    /// Create a rate-limited rejection.
    pub fn rate_limited(operation: OperationKey, retry_after_secs: u64) -> Self {
        Self::RateLimited {
            operation,
            retry_after_secs,
        }
    }

    /// Create a circuit-open rejection.
    pub fn circuit_open(operation: OperationKey, retry_after_secs: u64) -> Self {
        Self::CircuitOpen {
            operation,
            retry_after_secs,
        }
    }

    /// Create a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Create an internal error with an underlying source.
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Whether this error is transient and the operation may be retried.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. }
                | Self::ConnectionTimeout { .. }
                | Self::TargetUnavailable { .. }
                | Self::NetworkError { .. }
                | Self::RateLimited { .. }
                | Self::CircuitOpen { .. }
        )
    }

    /// Whether this error is permanent and retrying will not help.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }

    /// Stable machine-readable code for this error.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ConnectionFailed { .. } => "CONNECTION_FAILED",
            Self::ConnectionTimeout { .. } => "CONNECTION_TIMEOUT",
            Self::TargetUnavailable { .. } => "TARGET_UNAVAILABLE",
            Self::NetworkError { .. } => "NETWORK_ERROR",
            Self::AuthenticationFailed { .. } => "AUTHENTICATION_FAILED",
            Self::CredentialsExpired => "CREDENTIALS_EXPIRED",
            Self::MissingConfig { .. } => "MISSING_CONFIG",
            Self::InvalidConfiguration { .. } => "INVALID_CONFIGURATION",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::CircuitOpen { .. } => "CIRCUIT_OPEN",
            Self::Serialization { .. } => "SERIALIZATION_ERROR",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Seconds the caller should wait before retrying, when the error
    /// carries that hint.
    #[must_use]
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimited {
                retry_after_secs, ..
            }
            | Self::CircuitOpen {
                retry_after_secs, ..
            } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ConnectorError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

/// Result type for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;
