//! In-process vault backed by an encrypted map.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::crypto::TokenCipher;
use crate::{TokenVault, VaultError, VaultResult};

/// [`TokenVault`] implementation holding ciphertext in process memory.
///
/// Suitable for single-process deployments and tests. Values are stored
/// encrypted; the plaintext round-trips only through [`TokenCipher`].
pub struct InMemoryTokenVault {
    cipher: TokenCipher,
    entries: RwLock<HashMap<String, String>>,
}

impl InMemoryTokenVault {
    /// Create an empty vault using the given cipher.
    #[must_use]
    pub fn new(cipher: TokenCipher) -> Self {
        Self {
            cipher,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Create an empty vault with a freshly generated master key.
    ///
    /// The key lives only as long as the vault; intended for tests and
    /// ephemeral sessions.
    #[must_use]
    pub fn ephemeral() -> Self {
        Self::new(TokenCipher::new(TokenCipher::generate_master_key()))
    }

    /// Number of stored tokens.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the vault holds no tokens.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl TokenVault for InMemoryTokenVault {
    async fn encrypt_token(&self, secret: &str, key_id: &str) -> VaultResult<()> {
        let ciphertext = self.cipher.encrypt_string(key_id, secret)?;
        let mut entries = self.entries.write().await;
        entries.insert(key_id.to_string(), ciphertext);
        debug!(key_id = %key_id, "stored encrypted token");
        Ok(())
    }

    async fn decrypt_token(&self, key_id: &str) -> VaultResult<String> {
        let entries = self.entries.read().await;
        let ciphertext = entries
            .get(key_id)
            .ok_or_else(|| VaultError::not_found(key_id))?;
        self.cipher.decrypt_string(key_id, ciphertext)
    }

    async fn delete_token(&self, key_id: &str) -> VaultResult<()> {
        let mut entries = self.entries.write().await;
        if entries.remove(key_id).is_some() {
            debug!(key_id = %key_id, "deleted token");
        }
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryTokenVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryTokenVault")
            .field("cipher", &self.cipher)
            .finish_non_exhaustive()
    }
}
