//! Master-key lifecycle: the lock/unlock state machine.
//!
//! [`KeyManager`] exclusively owns the in-memory master key.  It is either
//! `Locked` (no key) or `Unlocked` (key present).  Unlocking derives the key
//! from a passphrase via PBKDF2 and a fixed configuration salt; quick unlock
//! reads a previously persisted key from the [`SecureKeyStore`].
//!
//! Unlocking does **not** verify the key against stored data — the vault
//! trusts whatever key is supplied.  A wrong passphrase only becomes visible
//! when decryption of existing records fails downstream.

use std::sync::{Arc, Mutex};

use crate::crypto::{self, MasterKey};
use crate::error::{Result, VaultError};
use crate::keystore::SecureKeyStore;

/// Owns the in-memory master key and its lock state.
pub struct KeyManager {
    keystore: Arc<dyn SecureKeyStore>,
    /// Fixed KDF salt from [`VaultConfig`](crate::config::VaultConfig).
    kdf_salt: String,
    /// Keystore namespace holding the quick-unlock key.
    master_key_namespace: String,
    /// `None` = locked.  The mutex is never held across an await point.
    key: Mutex<Option<MasterKey>>,
}

impl KeyManager {
    pub fn new(
        keystore: Arc<dyn SecureKeyStore>,
        kdf_salt: impl Into<String>,
        master_key_namespace: impl Into<String>,
    ) -> Self {
        Self {
            keystore,
            kdf_salt: kdf_salt.into(),
            master_key_namespace: master_key_namespace.into(),
            key: Mutex::new(None),
        }
    }

    /// Derive the master key from `passphrase` and transition to unlocked.
    ///
    /// Always succeeds for a well-formed passphrase: correctness against
    /// existing records is only observable when decryption fails later.
    pub fn unlock(&self, passphrase: &str) -> MasterKey {
        let key = crypto::derive_key(passphrase, &self.kdf_salt);
        *self.lock_slot() = Some(key.clone());
        tracing::info!("vault key adopted, state=unlocked");
        key
    }

    /// Try to unlock with a key previously persisted in the keystore.
    ///
    /// Returns `false` (staying locked) when no key is configured or the
    /// stored material is malformed — never an error for "not set up".
    /// Keystore transport failures still propagate.
    pub fn quick_unlock(&self) -> Result<bool> {
        let Some(bytes) = self.keystore.get(&self.master_key_namespace)? else {
            tracing::debug!("quick unlock: no persisted master key");
            return Ok(false);
        };

        let key = match MasterKey::from_slice(&bytes) {
            Ok(key) => key,
            Err(_) => {
                tracing::warn!(
                    len = bytes.len(),
                    "quick unlock: persisted key has wrong length, ignoring"
                );
                return Ok(false);
            }
        };

        *self.lock_slot() = Some(key);
        tracing::info!("vault unlocked via persisted key");
        Ok(true)
    }

    /// Discard the key from memory.  Idempotent and callable at any time.
    pub fn lock(&self) {
        let previous = self.lock_slot().take();
        if previous.is_some() {
            tracing::info!("vault locked");
        }
        // The dropped MasterKey zeroizes itself.
    }

    /// Whether a key is currently held.
    pub fn is_unlocked(&self) -> bool {
        self.lock_slot().is_some()
    }

    /// Clone of the current key, or [`VaultError::Locked`].
    pub fn current_key(&self) -> Result<MasterKey> {
        self.lock_slot().clone().ok_or(VaultError::Locked)
    }

    /// Persist the current key into the keystore for quick unlock.
    ///
    /// A keystore failure is reported to the caller but does not invalidate
    /// the unlocked state.
    pub fn persist_for_quick_unlock(&self) -> Result<()> {
        let key = self.current_key()?;
        self.keystore.set(
            &self.master_key_namespace,
            "master-key-user",
            key.as_bytes(),
        )?;
        tracing::info!("master key persisted for quick unlock");
        Ok(())
    }

    /// Remove any persisted quick-unlock key.  Returns whether one existed.
    pub fn clear_quick_unlock(&self) -> Result<bool> {
        self.keystore.delete(&self.master_key_namespace)
    }

    fn lock_slot(&self) -> std::sync::MutexGuard<'_, Option<MasterKey>> {
        // A poisoned mutex means a panic mid-assignment of an Option swap;
        // the value is still coherent, so recover the guard.
        self.key.lock().unwrap_or_else(|e| e.into_inner())
    }
}
