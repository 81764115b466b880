//! Secure scalar storage for small named secrets.
//!
//! The master key (and any other per-purpose secret, e.g. an API key) must
//! never be stored as plaintext on disk.  This module provides a
//! [`SecureKeyStore`] trait that abstracts over platform secure storage, with
//! two shipped backends:
//!
//! - [`FileKeyStore`] — cross-platform fallback that writes each namespace to
//!   its own file, encrypted under a device-derived key.
//! - [`MemoryKeyStore`] — in-process map, used by tests.
//!
//! Namespaces are opaque strings; the vault uses one fixed namespace for the
//! master key and separate namespaces for every other secret.  Backends must
//! never mix namespaces.
//!
//! # Security Notes
//!
//! - The file-based fallback is a compromise.  The device-derived key can be
//!   reconstructed by anyone with access to the same machine.  A real OS
//!   keychain provides hardware-backed or OS-protected key storage.
//! - Secret files are restricted to the current user (mode 0600 on Unix).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::crypto::{self, MasterKey};
use crate::error::{Result, VaultError};

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Abstraction over platform-specific secure scalar storage.
///
/// Implementations must be `Send + Sync` so the vault can be shared across
/// async tasks.
pub trait SecureKeyStore: Send + Sync {
    /// Store (or overwrite) `value` under `namespace`.  `label` is a
    /// human-readable account hint some backends attach to the entry.
    fn set(&self, namespace: &str, label: &str, value: &[u8]) -> Result<()>;

    /// Retrieve the secret stored under `namespace`, or `None` if nothing
    /// has been stored there.
    fn get(&self, namespace: &str) -> Result<Option<Vec<u8>>>;

    /// Delete the secret under `namespace`.  Returns whether an entry
    /// existed.  Deleting a missing entry is not an error.
    fn delete(&self, namespace: &str) -> Result<bool>;
}

// ---------------------------------------------------------------------------
// File-based fallback
// ---------------------------------------------------------------------------

/// Application salt mixed into the device-derived key.  Changing this
/// invalidates every previously stored secret.
const APP_SALT: &str = "skyvault-keystore-v1";

/// File-based keystore that writes one encrypted file per namespace.
///
/// Each file holds the vault codec's `base64(nonce || ciphertext || tag)`
/// string, sealed under the device-derived key.
pub struct FileKeyStore {
    /// Directory holding one `<namespace>.secret` file per entry.
    dir: PathBuf,
}

impl FileKeyStore {
    /// Create a keystore rooted at `dir`.  The directory is created on the
    /// first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn entry_path(&self, namespace: &str) -> PathBuf {
        // Namespaces are reverse-DNS style; keep the file name flat.
        self.dir.join(format!("{}.secret", namespace.replace('/', "_")))
    }

    /// Derive an encryption key from machine-specific data.
    ///
    /// Combines the hostname, username, and an application salt into a
    /// deterministic 256-bit key unique per machine/user combination.
    fn device_derived_key(&self) -> MasterKey {
        let hostname = Self::get_hostname();
        let username = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "unknown-user".into());

        let material = format!("{hostname}:{username}");
        crypto::derive_key(&material, APP_SALT)
    }

    /// Get the system hostname, falling back to "unknown-host".
    fn get_hostname() -> String {
        #[cfg(unix)]
        {
            std::fs::read_to_string("/etc/hostname")
                .map(|s| s.trim().to_string())
                .or_else(|_| std::env::var("HOSTNAME"))
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown-host".into())
        }

        #[cfg(not(unix))]
        {
            std::env::var("COMPUTERNAME")
                .or_else(|_| std::env::var("HOSTNAME"))
                .unwrap_or_else(|_| "unknown-host".into())
        }
    }
}

impl SecureKeyStore for FileKeyStore {
    fn set(&self, namespace: &str, label: &str, value: &[u8]) -> Result<()> {
        let device_key = self.device_derived_key();

        // The codec works on strings; secrets are binary, so base64 them
        // before sealing.
        use base64::Engine;
        let encoded = base64::engine::general_purpose::STANDARD.encode(value);
        let sealed = crypto::encrypt(&encoded, &device_key)?;

        std::fs::create_dir_all(&self.dir)?;
        let path = self.entry_path(namespace);
        std::fs::write(&path, sealed.as_bytes())?;

        // Restrict file permissions on Unix (owner read/write only).
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&path, perms)?;
        }

        tracing::info!(namespace, label, "stored secret in file keystore");
        Ok(())
    }

    fn get(&self, namespace: &str) -> Result<Option<Vec<u8>>> {
        let path = self.entry_path(namespace);
        if !path.exists() {
            return Ok(None);
        }

        let sealed = std::fs::read_to_string(&path)?;
        let device_key = self.device_derived_key();
        let encoded = crypto::decrypt(&sealed, &device_key)?;

        use base64::Engine;
        let value = base64::engine::general_purpose::STANDARD
            .decode(&encoded)
            .map_err(|e| VaultError::KeyStoreUnavailable {
                reason: format!("corrupt keystore entry for {namespace}: {e}"),
            })?;

        tracing::debug!(namespace, "retrieved secret from file keystore");
        Ok(Some(value))
    }

    fn delete(&self, namespace: &str) -> Result<bool> {
        let path = self.entry_path(namespace);
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&path)?;
        tracing::info!(namespace, "deleted secret from file keystore");
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

/// In-process keystore backed by a `HashMap`.  Nothing is persisted; intended
/// for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryKeyStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecureKeyStore for MemoryKeyStore {
    fn set(&self, namespace: &str, _label: &str, value: &[u8]) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| VaultError::Internal("keystore mutex poisoned".into()))?;
        entries.insert(namespace.to_string(), value.to_vec());
        Ok(())
    }

    fn get(&self, namespace: &str) -> Result<Option<Vec<u8>>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| VaultError::Internal("keystore mutex poisoned".into()))?;
        Ok(entries.get(namespace).cloned())
    }

    fn delete(&self, namespace: &str) -> Result<bool> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| VaultError::Internal("keystore mutex poisoned".into()))?;
        Ok(entries.remove(namespace).is_some())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
