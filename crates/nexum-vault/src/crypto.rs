//! Token encryption for vault storage.
//!
//! AES-256-GCM with HKDF per-key-id derivation: two key ids never share a
//! cipher key, so `{user}` and `{user}_refresh` ciphertexts are isolated
//! even though they come from the same master key.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hkdf::Hkdf;
use sha2::Sha256;

use crate::{VaultError, VaultResult};

/// Length of an AES-256 key in bytes.
const KEY_LENGTH: usize = 32;

/// Length of a GCM nonce in bytes.
const NONCE_LENGTH: usize = 12;

/// Length of a GCM authentication tag in bytes.
const TAG_LENGTH: usize = 16;

/// Context string for HKDF key derivation.
const HKDF_INFO: &[u8] = b"nexum-vault-token-v1";

/// Encrypts and decrypts tokens for storage at rest.
///
/// Output format is `base64(nonce || ciphertext || tag)`.
#[derive(Clone)]
pub struct TokenCipher {
    /// Master key from which per-key-id keys are derived.
    master_key: [u8; KEY_LENGTH],
}

impl TokenCipher {
    /// Create a cipher from a 32-byte master key.
    #[must_use]
    pub fn new(master_key: [u8; KEY_LENGTH]) -> Self {
        Self { master_key }
    }

    /// Create a cipher from a hex-encoded master key.
    pub fn from_hex(hex_key: &str) -> VaultResult<Self> {
        let bytes = hex::decode(hex_key)
            .map_err(|e| VaultError::encryption(format!("invalid hex key: {e}")))?;
        Self::from_bytes(&bytes)
    }

    /// Create a cipher from a base64-encoded master key.
    pub fn from_base64(base64_key: &str) -> VaultResult<Self> {
        let bytes = BASE64
            .decode(base64_key)
            .map_err(|e| VaultError::encryption(format!("invalid base64 key: {e}")))?;
        Self::from_bytes(&bytes)
    }

    fn from_bytes(bytes: &[u8]) -> VaultResult<Self> {
        if bytes.len() != KEY_LENGTH {
            return Err(VaultError::encryption(format!(
                "key must be {} bytes, got {}",
                KEY_LENGTH,
                bytes.len()
            )));
        }
        let mut key = [0u8; KEY_LENGTH];
        key.copy_from_slice(bytes);
        Ok(Self::new(key))
    }

    /// Generate a random master key from the OS CSPRNG.
    #[must_use]
    pub fn generate_master_key() -> [u8; KEY_LENGTH] {
        use rand::rngs::OsRng;
        use rand::RngCore;

        let mut key = [0u8; KEY_LENGTH];
        OsRng.fill_bytes(&mut key);
        key
    }

    /// Derive the cipher key for one key id using HKDF-SHA256.
    ///
    /// # Panics
    ///
    /// Panics if HKDF expansion fails, which cannot happen for a 32-byte
    /// output (HKDF-SHA256 expands up to 255 * 32 bytes).
    fn derive_key(&self, key_id: &str) -> [u8; KEY_LENGTH] {
        let hkdf = Hkdf::<Sha256>::new(Some(key_id.as_bytes()), &self.master_key);
        let mut derived = [0u8; KEY_LENGTH];
        hkdf.expand(HKDF_INFO, &mut derived)
            .expect("HKDF-SHA256 supports 32-byte output");
        derived
    }

    /// Encrypt a plaintext token for the given key id.
    ///
    /// Returns `base64(nonce || ciphertext || tag)`.
    pub fn encrypt_string(&self, key_id: &str, plaintext: &str) -> VaultResult<String> {
        let key = self.derive_key(key_id);
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| VaultError::encryption(format!("failed to create cipher: {e}")))?;

        use rand::rngs::OsRng;
        use rand::RngCore;
        let mut nonce_bytes = [0u8; NONCE_LENGTH];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| VaultError::encryption(e.to_string()))?;

        let mut out = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);

        Ok(BASE64.encode(&out))
    }

    /// Decrypt a stored token for the given key id.
    pub fn decrypt_string(&self, key_id: &str, encoded: &str) -> VaultResult<String> {
        let encrypted = BASE64
            .decode(encoded)
            .map_err(|e| VaultError::decryption(format!("base64 decode failed: {e}")))?;

        // Ciphertext of an empty plaintext is still tag-sized.
        if encrypted.len() < NONCE_LENGTH + TAG_LENGTH {
            return Err(VaultError::decryption(
                "encrypted data is too short".to_string(),
            ));
        }

        let key = self.derive_key(key_id);
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| VaultError::decryption(format!("failed to create cipher: {e}")))?;

        let nonce = Nonce::from_slice(&encrypted[..NONCE_LENGTH]);
        let plaintext = cipher
            .decrypt(nonce, &encrypted[NONCE_LENGTH..])
            .map_err(|e| VaultError::decryption(e.to_string()))?;

        String::from_utf8(plaintext).map_err(|e| VaultError::decryption(e.to_string()))
    }
}

impl std::fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCipher")
            .field("master_key", &"[REDACTED]")
            .finish()
    }
}
