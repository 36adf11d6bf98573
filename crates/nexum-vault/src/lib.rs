//! Credential vault boundary for the nexum integration runtime.
//!
//! Every provider credential (access token, refresh token, secondary
//! secrets) crosses exactly one boundary: the [`TokenVault`] trait.
//! Connectors never hold plaintext credentials beyond the duration of a
//! single call; everything at rest is ciphertext owned by the vault.
//!
//! The crate ships [`InMemoryTokenVault`], an AES-256-GCM implementation
//! with per-key-id derived keys, suitable for single-process deployments
//! and tests. Hosts with external secret managers implement [`TokenVault`]
//! against their own backend instead.
//!
//! # Usage
//!
//! ```rust,ignore
//! use nexum_vault::{key_id, InMemoryTokenVault, TokenCipher, TokenVault};
//!
//! let vault = InMemoryTokenVault::new(TokenCipher::new(master_key));
//! vault.encrypt_token(&access_token, &key_id::primary(user_id)).await?;
//! let token = vault.decrypt_token(&key_id::primary(user_id)).await?;
//! ```

pub mod crypto;
pub mod memory;

use async_trait::async_trait;

// Re-exports
pub use crypto::TokenCipher;
pub use memory::InMemoryTokenVault;

// ── VaultError ───────────────────────────────────────────────────────────

/// Errors returned by vault operations.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// No token is stored under the given key id.
    #[error("token not found: '{key_id}'")]
    NotFound { key_id: String },

    /// Encrypting a token failed.
    #[error("token encryption failed: {detail}")]
    Encryption { detail: String },

    /// Decrypting a stored token failed (wrong key, corrupt ciphertext).
    #[error("token decryption failed: {detail}")]
    Decryption { detail: String },

    /// The vault backend itself is unavailable.
    #[error("vault backend unavailable: {detail}")]
    Unavailable { detail: String },
}

impl VaultError {
    /// Create a not-found error for the given key id.
    pub fn not_found(key_id: impl Into<String>) -> Self {
        VaultError::NotFound {
            key_id: key_id.into(),
        }
    }

    /// Create an encryption error.
    pub fn encryption(detail: impl Into<String>) -> Self {
        VaultError::Encryption {
            detail: detail.into(),
        }
    }

    /// Create a decryption error.
    pub fn decryption(detail: impl Into<String>) -> Self {
        VaultError::Decryption {
            detail: detail.into(),
        }
    }
}

/// Result type for vault operations.
pub type VaultResult<T> = Result<T, VaultError>;

// ── TokenVault trait ─────────────────────────────────────────────────────

/// Storage boundary for per-user, per-provider credentials.
///
/// Implementations encrypt on write and decrypt on read; plaintext exists
/// only inside these two calls. Key ids follow the [`key_id`] convention.
#[async_trait]
pub trait TokenVault: Send + Sync {
    /// Encrypt and store a secret under the given key id, replacing any
    /// previous value.
    async fn encrypt_token(&self, secret: &str, key_id: &str) -> VaultResult<()>;

    /// Decrypt and return the secret stored under the given key id.
    ///
    /// Returns [`VaultError::NotFound`] when nothing is stored there.
    async fn decrypt_token(&self, key_id: &str) -> VaultResult<String>;

    /// Remove the secret stored under the given key id.
    ///
    /// Deleting an absent key id is not an error; disconnect flows call
    /// this without checking for prior state.
    async fn delete_token(&self, key_id: &str) -> VaultResult<()>;
}

// ── Key id convention ────────────────────────────────────────────────────

/// Key id naming convention shared by every connector.
///
/// The primary token for a user is stored under the bare user id; secondary
/// credentials append a fixed suffix. Connectors depend on these exact
/// strings, so the convention is part of the vault contract.
pub mod key_id {
    /// Key id for the primary access token: `{user_id}`.
    #[must_use]
    pub fn primary(user_id: &str) -> String {
        user_id.to_string()
    }

    /// Key id for a secondary secret: `{user_id}_secret`.
    #[must_use]
    pub fn secret(user_id: &str) -> String {
        format!("{user_id}_secret")
    }

    /// Key id for a stored password: `{user_id}_password`.
    #[must_use]
    pub fn password(user_id: &str) -> String {
        format!("{user_id}_password")
    }

    /// Key id for a refresh token: `{user_id}_refresh`.
    #[must_use]
    pub fn refresh(user_id: &str) -> String {
        format!("{user_id}_refresh")
    }
}
