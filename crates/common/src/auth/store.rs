//! Encrypted at-rest token persistence.
//!
//! The token payload is serialized, AES-256-GCM encrypted with a fresh
//! nonce on every save, written to a sibling temporary file, fsynced, and
//! atomically renamed over the target, so a crash mid-save always leaves
//! the previous file intact. The at-rest key lives in the platform
//! keychain, generated on first use.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use taxdesk_domain::{MtdError, Result, TokenStorageError};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::traits::TokenStore;
use super::types::TokenSet;
use crate::crypto::EncryptionService;

/// Source of the 32-byte at-rest encryption key.
pub trait TokenKeyProvider: Send + Sync {
    /// Return the key, creating and persisting one if none exists yet.
    ///
    /// # Errors
    /// Returns `TokenStorageError::Io` when the backing store is
    /// unavailable.
    fn encryption_key(&self) -> Result<Vec<u8>>;
}

/// Key provider backed by the platform keychain (macOS Keychain, Windows
/// Credential Manager, Linux Secret Service).
pub struct KeyringKeyProvider {
    service: String,
    account: String,
}

impl KeyringKeyProvider {
    /// Create a provider for the given keychain service/account pair.
    #[must_use]
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self { service: service.into(), account: account.into() }
    }

    fn entry(&self) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service, &self.account)
            .map_err(|e| TokenStorageError::Io(format!("keychain entry unavailable: {e}")).into())
    }
}

impl TokenKeyProvider for KeyringKeyProvider {
    fn encryption_key(&self) -> Result<Vec<u8>> {
        let entry = self.entry()?;

        match entry.get_password() {
            Ok(encoded) => {
                let key = BASE64.decode(encoded).map_err(|_| TokenStorageError::Corrupted)?;
                if key.len() != 32 {
                    return Err(TokenStorageError::Corrupted.into());
                }
                Ok(key)
            }
            Err(keyring::Error::NoEntry) => {
                debug!(service = %self.service, "generating new at-rest token key");
                let key = EncryptionService::generate_key();
                entry.set_password(&BASE64.encode(&key)).map_err(|e| {
                    MtdError::from(TokenStorageError::Io(format!(
                        "failed to persist at-rest key: {e}"
                    )))
                })?;
                Ok(key)
            }
            Err(e) => Err(TokenStorageError::Io(format!("keychain access failed: {e}")).into()),
        }
    }
}

/// Fixed-key provider for tests and headless environments.
pub struct StaticKeyProvider {
    key: Vec<u8>,
}

impl StaticKeyProvider {
    /// Wrap an existing 32-byte key.
    #[must_use]
    pub fn new(key: Vec<u8>) -> Self {
        Self { key }
    }
}

impl TokenKeyProvider for StaticKeyProvider {
    fn encryption_key(&self) -> Result<Vec<u8>> {
        Ok(self.key.clone())
    }
}

/// Encrypted single-writer token store over one file.
pub struct EncryptedTokenStore {
    path: PathBuf,
    cipher: EncryptionService,
    // Serializes save/load/delete; the file is single-writer.
    io_lock: Mutex<()>,
}

impl EncryptedTokenStore {
    /// Open a store over `path`, sourcing the key from `keys`.
    ///
    /// # Errors
    /// Propagates key-provider failures; an unusable key is
    /// `TokenStorageError::Corrupted`.
    pub fn open(path: impl Into<PathBuf>, keys: &dyn TokenKeyProvider) -> Result<Self> {
        let key = keys.encryption_key()?;
        let cipher =
            EncryptionService::new(key).map_err(|_| MtdError::from(TokenStorageError::Corrupted))?;

        Ok(Self { path: path.into(), cipher, io_lock: Mutex::new(()) })
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_atomically(&self, payload: &str) -> std::io::Result<()> {
        let tmp_path = self.path.with_extension("tmp");

        let mut tmp = std::fs::File::create(&tmp_path)?;
        tmp.write_all(payload.as_bytes())?;
        tmp.sync_all()?;
        drop(tmp);

        std::fs::rename(&tmp_path, &self.path)
    }
}

#[async_trait]
impl TokenStore for EncryptedTokenStore {
    async fn save(&self, tokens: &TokenSet) -> Result<()> {
        let _guard = self.io_lock.lock().await;

        let plaintext = serde_json::to_vec(tokens)
            .map_err(|e| MtdError::Internal(format!("token serialization failed: {e}")))?;

        // Fresh nonce per save: identical payloads never repeat on disk.
        let payload = self
            .cipher
            .encrypt_to_string(&plaintext)
            .map_err(|_| MtdError::from(TokenStorageError::Corrupted))?;

        self.write_atomically(&payload)
            .map_err(|e| MtdError::from(TokenStorageError::Io(format!("token save failed: {e}"))))?;

        debug!(path = %self.path.display(), "token set persisted");
        Ok(())
    }

    async fn load(&self) -> Result<Option<TokenSet>> {
        let _guard = self.io_lock.lock().await;

        let payload = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(TokenStorageError::Io(format!("token load failed: {e}")).into());
            }
        };

        let plaintext = self.cipher.decrypt_from_string(payload.trim()).map_err(|_| {
            warn!(path = %self.path.display(), "token store failed integrity check");
            MtdError::from(TokenStorageError::Corrupted)
        })?;

        let tokens: TokenSet = serde_json::from_slice(&plaintext)
            .map_err(|_| MtdError::from(TokenStorageError::Corrupted))?;

        Ok(Some(tokens))
    }

    async fn delete(&self) -> Result<()> {
        let _guard = self.io_lock.lock().await;

        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "token store deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TokenStorageError::Io(format!("token delete failed: {e}")).into()),
        }
    }

    async fn exists(&self) -> bool {
        let _guard = self.io_lock.lock().await;
        self.path.exists()
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for auth::store.
    use tempfile::TempDir;

    use super::*;

    fn store_in(dir: &TempDir) -> EncryptedTokenStore {
        let keys = StaticKeyProvider::new(EncryptionService::generate_key());
        EncryptedTokenStore::open(dir.path().join("tokens.enc"), &keys).unwrap()
    }

    fn sample_tokens() -> TokenSet {
        TokenSet::new(
            "access-value".to_string(),
            "refresh-value".to_string(),
            3600,
            Some("read:self-assessment".to_string()),
        )
    }

    #[tokio::test]
    async fn load_after_save_returns_equal_tokens() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let tokens = sample_tokens();

        store.save(&tokens).await.unwrap();
        let loaded = store.load().await.unwrap().unwrap();

        assert_eq!(loaded, tokens);
    }

    #[tokio::test]
    async fn identical_payloads_never_repeat_on_disk() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let tokens = sample_tokens();

        store.save(&tokens).await.unwrap();
        let first = std::fs::read_to_string(store.path()).unwrap();

        store.save(&tokens).await.unwrap();
        let second = std::fs::read_to_string(store.path()).unwrap();

        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn plaintext_never_reaches_disk() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        store.save(&sample_tokens()).await.unwrap();
        let raw = std::fs::read_to_string(store.path()).unwrap();

        assert!(!raw.contains("access-value"));
        assert!(!raw.contains("refresh-value"));
    }

    #[tokio::test]
    async fn missing_file_loads_as_none() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        assert_eq!(store.load().await.unwrap(), None);
        assert!(!store.exists().await);
    }

    #[tokio::test]
    async fn truncated_file_is_reported_as_corrupted() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        store.save(&sample_tokens()).await.unwrap();
        let raw = std::fs::read_to_string(store.path()).unwrap();
        std::fs::write(store.path(), &raw[..raw.len() / 2]).unwrap();

        let result = store.load().await;
        assert_eq!(result.unwrap_err(), MtdError::TokenStorage(TokenStorageError::Corrupted));
    }

    #[tokio::test]
    async fn garbage_file_is_reported_as_corrupted() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        std::fs::write(store.path(), "definitely not ciphertext").unwrap();

        let result = store.load().await;
        assert_eq!(result.unwrap_err(), MtdError::TokenStorage(TokenStorageError::Corrupted));
    }

    #[tokio::test]
    async fn wrong_key_is_reported_as_corrupted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tokens.enc");

        let first_keys = StaticKeyProvider::new(EncryptionService::generate_key());
        let writer = EncryptedTokenStore::open(&path, &first_keys).unwrap();
        writer.save(&sample_tokens()).await.unwrap();

        let other_keys = StaticKeyProvider::new(EncryptionService::generate_key());
        let reader = EncryptedTokenStore::open(&path, &other_keys).unwrap();

        let result = reader.load().await;
        assert_eq!(result.unwrap_err(), MtdError::TokenStorage(TokenStorageError::Corrupted));
    }

    #[tokio::test]
    async fn delete_removes_the_file_and_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        store.save(&sample_tokens()).await.unwrap();
        assert!(store.exists().await);

        store.delete().await.unwrap();
        assert!(!store.exists().await);
        assert!(!store.path().exists());

        // Deleting again must not fail.
        store.delete().await.unwrap();
    }

    #[tokio::test]
    async fn no_stray_temp_file_remains_after_save() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        store.save(&sample_tokens()).await.unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
