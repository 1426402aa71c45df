//! AES-256-GCM encryption primitives for at-rest secrets.
//!
//! [`EncryptionService`] wraps a 32-byte key; every encryption draws a
//! fresh random 12-byte nonce, so identical plaintexts never produce
//! identical ciphertext. [`EncryptedData`] is the serializable container
//! written to disk by the token store.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from the encryption primitives.
///
/// Deliberately coarse: failure text never includes key or plaintext
/// material, and AEAD failures are not distinguished from malformed
/// payloads so callers can map everything to a single corruption class.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// The supplied key is not usable for AES-256-GCM.
    #[error("encryption key must be exactly 32 bytes")]
    InvalidKey,

    /// Encryption failed.
    #[error("encryption failed")]
    EncryptionFailed,

    /// Decryption, integrity verification, or payload decoding failed.
    #[error("payload cannot be decrypted")]
    DecryptionFailed,
}

/// Serializable encrypted payload container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedData {
    /// Random 12-byte nonce drawn for this payload.
    pub nonce: Vec<u8>,
    /// AEAD ciphertext (includes the authentication tag).
    pub ciphertext: Vec<u8>,
    /// Algorithm marker, always `AES-256-GCM`.
    pub algorithm: String,
}

const ALGORITHM: &str = "AES-256-GCM";

/// AES-256-GCM encryption service.
pub struct EncryptionService {
    key: Vec<u8>,
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for EncryptionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionService").field("key", &"[REDACTED]").finish()
    }
}

impl EncryptionService {
    /// Create a new encryption service from a raw 32-byte key.
    ///
    /// # Errors
    /// Returns [`CryptoError::InvalidKey`] for any other key length.
    pub fn new(key: Vec<u8>) -> Result<Self, CryptoError> {
        if key.len() != 32 {
            return Err(CryptoError::InvalidKey);
        }

        let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| CryptoError::InvalidKey)?;
        Ok(Self { key, cipher })
    }

    /// Generate a random 32-byte symmetric key.
    #[must_use]
    pub fn generate_key() -> Vec<u8> {
        let mut key = vec![0u8; 32];
        OsRng.fill_bytes(&mut key);
        key
    }

    /// Encrypt bytes into an [`EncryptedData`] payload with a fresh nonce.
    ///
    /// # Errors
    /// Returns [`CryptoError::EncryptionFailed`] if the AEAD operation
    /// fails.
    pub fn encrypt(&self, data: &[u8]) -> Result<EncryptedData, CryptoError> {
        let nonce_bytes = Self::generate_nonce();
        let ciphertext = self
            .cipher
            .encrypt(&Nonce::from(nonce_bytes), data)
            .map_err(|_| CryptoError::EncryptionFailed)?;

        Ok(EncryptedData {
            nonce: nonce_bytes.to_vec(),
            ciphertext,
            algorithm: ALGORITHM.to_string(),
        })
    }

    /// Decrypt an [`EncryptedData`] payload back into raw bytes.
    ///
    /// # Errors
    /// Returns [`CryptoError::DecryptionFailed`] for an unknown algorithm
    /// marker, a malformed nonce, or an AEAD integrity failure.
    pub fn decrypt(&self, encrypted: &EncryptedData) -> Result<Vec<u8>, CryptoError> {
        if encrypted.algorithm != ALGORITHM {
            return Err(CryptoError::DecryptionFailed);
        }

        let nonce_array: [u8; 12] = encrypted
            .nonce
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::DecryptionFailed)?;

        self.cipher
            .decrypt(&Nonce::from(nonce_array), encrypted.ciphertext.as_ref())
            .map_err(|_| CryptoError::DecryptionFailed)
    }

    /// Encrypt bytes and encode the payload as a base64 string.
    ///
    /// # Errors
    /// Returns [`CryptoError::EncryptionFailed`] if encryption or payload
    /// serialization fails.
    pub fn encrypt_to_string(&self, data: &[u8]) -> Result<String, CryptoError> {
        let encrypted = self.encrypt(data)?;
        let serialized = serde_json::to_vec(&encrypted).map_err(|_| CryptoError::EncryptionFailed)?;
        Ok(BASE64.encode(serialized))
    }

    /// Decode a base64 string and decrypt the contained payload.
    ///
    /// # Errors
    /// Returns [`CryptoError::DecryptionFailed`] for bad base64, a
    /// malformed container, or an integrity failure.
    pub fn decrypt_from_string(&self, encrypted_str: &str) -> Result<Vec<u8>, CryptoError> {
        let decoded =
            BASE64.decode(encrypted_str).map_err(|_| CryptoError::DecryptionFailed)?;
        let encrypted: EncryptedData =
            serde_json::from_slice(&decoded).map_err(|_| CryptoError::DecryptionFailed)?;
        self.decrypt(&encrypted)
    }

    /// Short fingerprint of the current key, for diagnostics.
    #[must_use]
    pub fn key_fingerprint(&self) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(&self.key);
        let result = hasher.finalize();
        BASE64.encode(&result[..8])
    }

    fn generate_nonce() -> [u8; 12] {
        let mut nonce = [0u8; 12];
        OsRng.fill_bytes(&mut nonce);
        nonce
    }
}
