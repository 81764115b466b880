//! Vault controller: the observable lock/unlock state machine.
//!
//! [`VaultController`] composes the [`KeyManager`] and the
//! [`CredentialService`] into the surface callers interact with:
//!
//! ```text
//! Locked ──unlock──▶ Unlocking ──ok──▶ Unlocked
//!    ▲                   │
//!    │                 fail
//!    │                   ▼
//!    └───────────────── Error
//! ```
//!
//! `Unlocked → Locked` happens via an explicit [`lock`](VaultController::lock).
//! On construction the controller attempts a quick unlock (persisted key)
//! exactly once before settling into `Locked`.
//!
//! State is observed explicitly, not reactively: every operation returns a
//! [`VaultSnapshot`], and callers wanting push-style updates subscribe to a
//! `tokio::sync::watch` channel carrying a version counter and re-read the
//! snapshot when it bumps.

use tokio::sync::{Mutex, watch};

use crate::error::{Result, VaultError};
use crate::keys::KeyManager;
use crate::model::{CredentialView, NewCredential};
use crate::service::CredentialService;

// ---------------------------------------------------------------------------
// Snapshot types
// ---------------------------------------------------------------------------

/// The controller's current position in the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultStatus {
    /// No key in memory; credential operations are rejected.
    Locked,
    /// An unlock is in flight (key derivation + initial load).
    Unlocking,
    /// Key held, decrypted views available.
    Unlocked,
    /// The last unlock failed; settles back into `Locked`.
    Error,
}

/// Point-in-time view of the controller state.
///
/// `credentials` is the decrypted in-memory list; it is empty whenever the
/// vault is not unlocked.  `last_error` survives the `Error → Locked` settle
/// so callers can display what went wrong.
#[derive(Debug, Clone)]
pub struct VaultSnapshot {
    pub status: VaultStatus,
    pub credentials: Vec<CredentialView>,
    pub last_error: Option<String>,
    /// Monotonic change counter, mirrored on the watch channel.
    pub version: u64,
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

struct Inner {
    status: VaultStatus,
    credentials: Vec<CredentialView>,
    last_error: Option<String>,
    version: u64,
}

/// Observable vault state machine over key manager + credential service.
pub struct VaultController {
    keys: KeyManager,
    service: CredentialService,
    inner: Mutex<Inner>,
    notify: watch::Sender<u64>,
}

impl VaultController {
    /// Build the controller and attempt a quick unlock exactly once.
    ///
    /// A missing persisted key (or any quick-unlock failure) settles into
    /// `Locked`; it is not an error to start without one.
    pub async fn start(keys: KeyManager, service: CredentialService) -> Self {
        let (notify, _) = watch::channel(0);
        let controller = Self {
            keys,
            service,
            inner: Mutex::new(Inner {
                status: VaultStatus::Locked,
                credentials: Vec::new(),
                last_error: None,
                version: 0,
            }),
            notify,
        };

        match controller.keys.quick_unlock() {
            Ok(true) => {
                let mut inner = controller.inner.lock().await;
                controller.set_status(&mut inner, VaultStatus::Unlocking);
                if let Err(e) = controller.reload_views(&mut inner).await {
                    tracing::warn!(error = %e, "quick unlock load failed, settling locked");
                    controller.fail_unlock(&mut inner, &e);
                }
            }
            Ok(false) => {
                tracing::debug!("no quick-unlock key, starting locked");
            }
            Err(e) => {
                tracing::warn!(error = %e, "quick unlock errored, starting locked");
            }
        }

        controller
    }

    /// Derive a key from `passphrase` and move to `Unlocked`, loading the
    /// decrypted credential list on the way.
    ///
    /// A wrong passphrase does not fail here — the key is adopted as-is and
    /// wrong keys show up as undecryptable entries in the returned snapshot.
    /// The failure path (`Error`, then settle `Locked`) is taken when the
    /// initial load cannot reach or parse the remote collection.
    pub async fn unlock(&self, passphrase: &str) -> Result<VaultSnapshot> {
        let mut inner = self.inner.lock().await;
        self.set_status(&mut inner, VaultStatus::Unlocking);

        self.keys.unlock(passphrase);

        match self.reload_views(&mut inner).await {
            Ok(()) => Ok(Self::snapshot_of(&inner)),
            Err(e) => {
                self.fail_unlock(&mut inner, &e);
                Err(e)
            }
        }
    }

    /// Encrypt and persist a new credential, then refresh the view list.
    ///
    /// # Errors
    ///
    /// [`VaultError::Locked`] when no key is held.
    pub async fn add(&self, fields: NewCredential) -> Result<VaultSnapshot> {
        let key = self.keys.current_key()?;
        let mut inner = self.inner.lock().await;

        self.service.create(fields, &key).await?;
        self.reload_views(&mut inner).await?;
        Ok(Self::snapshot_of(&inner))
    }

    /// Re-encrypt changed fields onto an existing credential.
    pub async fn update(&self, id: &str, fields: NewCredential) -> Result<VaultSnapshot> {
        let key = self.keys.current_key()?;
        let mut inner = self.inner.lock().await;

        self.service.update(id, fields, &key).await?;
        self.reload_views(&mut inner).await?;
        Ok(Self::snapshot_of(&inner))
    }

    /// Delete a credential by id.
    pub async fn remove(&self, id: &str) -> Result<VaultSnapshot> {
        // Deleting needs no key material, but a locked vault must still
        // reject mutations.
        let _key = self.keys.current_key()?;
        let mut inner = self.inner.lock().await;

        self.service.delete(id).await?;
        self.reload_views(&mut inner).await?;
        Ok(Self::snapshot_of(&inner))
    }

    /// Re-fetch and re-decrypt the credential list.
    ///
    /// # Errors
    ///
    /// [`VaultError::Locked`] when no key is held.
    pub async fn refresh(&self) -> Result<VaultSnapshot> {
        self.keys.current_key()?;
        let mut inner = self.inner.lock().await;
        self.reload_views(&mut inner).await?;
        Ok(Self::snapshot_of(&inner))
    }

    /// Search by title/website/category and return decrypted matches.  Does
    /// not alter the held view list.
    pub async fn search(&self, query: &str) -> Result<Vec<CredentialView>> {
        let key = self.keys.current_key()?;
        self.service.search(query, &key).await
    }

    /// Drop the key and the decrypted views.  Idempotent.
    pub async fn lock(&self) -> VaultSnapshot {
        self.keys.lock();

        let mut inner = self.inner.lock().await;
        inner.credentials.clear();
        self.set_status(&mut inner, VaultStatus::Locked);
        Self::snapshot_of(&inner)
    }

    /// Persist the current master key into the secure keystore so the next
    /// [`start`](Self::start) can unlock without a passphrase.
    ///
    /// A keystore failure is returned to the caller but leaves the vault
    /// unlocked.
    pub fn enable_quick_unlock(&self) -> Result<()> {
        self.keys.persist_for_quick_unlock()
    }

    /// Current state without performing any I/O.
    pub async fn snapshot(&self) -> VaultSnapshot {
        Self::snapshot_of(&*self.inner.lock().await)
    }

    /// Subscribe to version bumps.  Receivers re-read
    /// [`snapshot`](Self::snapshot) when the value changes.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.notify.subscribe()
    }

    // -- Internal helpers ---------------------------------------------------

    /// Load + decrypt the credential list into the held state and move to
    /// `Unlocked`.  The caller must hold a key.
    async fn reload_views(&self, inner: &mut Inner) -> Result<()> {
        let key = self.keys.current_key()?;
        let views = self.service.list(&key).await?;

        inner.credentials = views;
        inner.last_error = None;
        inner.status = VaultStatus::Unlocked;
        self.bump(inner);
        Ok(())
    }

    /// Publish the `Error` state, then settle into `Locked` with the key
    /// discarded and the error message retained.
    fn fail_unlock(&self, inner: &mut Inner, error: &VaultError) {
        inner.last_error = Some(error.to_string());
        inner.status = VaultStatus::Error;
        self.bump(inner);

        self.keys.lock();
        inner.credentials.clear();
        inner.status = VaultStatus::Locked;
        self.bump(inner);
    }

    fn set_status(&self, inner: &mut Inner, status: VaultStatus) {
        if inner.status != status {
            tracing::info!(from = ?inner.status, to = ?status, "vault state transition");
        }
        inner.status = status;
        self.bump(inner);
    }

    fn bump(&self, inner: &mut Inner) {
        inner.version += 1;
        // Send fails only when every receiver is gone; snapshots still work.
        let _ = self.notify.send(inner.version);
    }

    fn snapshot_of(inner: &Inner) -> VaultSnapshot {
        VaultSnapshot {
            status: inner.status,
            credentials: inner.credentials.clone(),
            last_error: inner.last_error.clone(),
            version: inner.version,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::keystore::MemoryKeyStore;
    use crate::remote::InMemoryDocumentStore;
    use crate::repository::CredentialRepository;

    const SALT: &str = "test-salt";
    const NS: &str = "com.skyvault.master-key";

    fn build(
        store: Arc<InMemoryDocumentStore>,
        keystore: Arc<MemoryKeyStore>,
    ) -> (KeyManager, CredentialService) {
        let keys = KeyManager::new(keystore, SALT, NS);
        let repo = CredentialRepository::new(store, "db.json");
        (keys, CredentialService::new(repo))
    }

    async fn controller() -> (Arc<InMemoryDocumentStore>, VaultController) {
        let store = Arc::new(InMemoryDocumentStore::new());
        let keystore = Arc::new(MemoryKeyStore::new());
        let (keys, service) = build(store.clone(), keystore);
        (store.clone(), VaultController::start(keys, service).await)
    }

    fn fields(title: &str) -> NewCredential {
        NewCredential {
            title: title.into(),
            username: "user".into(),
            password: "pass".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn starts_locked_without_persisted_key() {
        let (_store, ctl) = controller().await;
        let snap = ctl.snapshot().await;
        assert_eq!(snap.status, VaultStatus::Locked);
        assert!(snap.credentials.is_empty());
        assert!(snap.last_error.is_none());
    }

    #[tokio::test]
    async fn start_quick_unlocks_with_persisted_key() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let keystore = Arc::new(MemoryKeyStore::new());

        // First session: unlock with a passphrase and opt into quick unlock.
        {
            let (keys, service) = build(store.clone(), keystore.clone());
            let ctl = VaultController::start(keys, service).await;
            ctl.unlock("passphrase").await.unwrap();
            ctl.add(fields("Email")).await.unwrap();
            ctl.enable_quick_unlock().unwrap();
        }

        // Second session: construction alone unlocks and loads.
        let (keys, service) = build(store, keystore);
        let ctl = VaultController::start(keys, service).await;
        let snap = ctl.snapshot().await;
        assert_eq!(snap.status, VaultStatus::Unlocked);
        assert_eq!(snap.credentials.len(), 1);
        assert_eq!(snap.credentials[0].title, "Email");
        assert!(snap.credentials[0].is_decrypted());
    }

    #[tokio::test]
    async fn unlock_add_list_roundtrip() {
        let (_store, ctl) = controller().await;

        let snap = ctl.unlock("passphrase").await.unwrap();
        assert_eq!(snap.status, VaultStatus::Unlocked);
        assert!(snap.credentials.is_empty());

        let snap = ctl.add(fields("T")).await.unwrap();
        assert_eq!(snap.credentials.len(), 1);
        assert_eq!(snap.credentials[0].title, "T");
        assert_eq!(snap.credentials[0].username, "user");
        assert_eq!(snap.credentials[0].password, "pass");
    }

    #[tokio::test]
    async fn lock_clears_views_and_rejects_operations() {
        let (_store, ctl) = controller().await;
        ctl.unlock("passphrase").await.unwrap();
        ctl.add(fields("T")).await.unwrap();

        let snap = ctl.lock().await;
        assert_eq!(snap.status, VaultStatus::Locked);
        assert!(snap.credentials.is_empty());

        assert!(matches!(ctl.refresh().await, Err(VaultError::Locked)));
        assert!(matches!(
            ctl.add(fields("X")).await,
            Err(VaultError::Locked)
        ));

        // Idempotent.
        let snap = ctl.lock().await;
        assert_eq!(snap.status, VaultStatus::Locked);
    }

    #[tokio::test]
    async fn failed_unlock_settles_locked_with_error() {
        let (store, ctl) = controller().await;
        store.set_failing(true);

        let result = ctl.unlock("passphrase").await;
        assert!(matches!(result, Err(VaultError::RemoteStore { .. })));

        let snap = ctl.snapshot().await;
        assert_eq!(snap.status, VaultStatus::Locked);
        assert!(snap.last_error.is_some());
        assert!(snap.credentials.is_empty());

        // Recovery: the next unlock succeeds and clears the error.
        store.set_failing(false);
        let snap = ctl.unlock("passphrase").await.unwrap();
        assert_eq!(snap.status, VaultStatus::Unlocked);
        assert!(snap.last_error.is_none());
    }

    #[tokio::test]
    async fn relock_then_unlock_decrypts_existing_records() {
        let (_store, ctl) = controller().await;
        ctl.unlock("passphrase").await.unwrap();
        ctl.add(fields("Keep")).await.unwrap();
        ctl.lock().await;

        let snap = ctl.unlock("passphrase").await.unwrap();
        assert_eq!(snap.credentials.len(), 1);
        assert!(snap.credentials[0].is_decrypted());
    }

    #[tokio::test]
    async fn wrong_passphrase_yields_flagged_entries() {
        let (_store, ctl) = controller().await;
        ctl.unlock("right").await.unwrap();
        ctl.add(fields("Secret")).await.unwrap();
        ctl.lock().await;

        // The key is adopted unverified; wrongness shows per record.
        let snap = ctl.unlock("wrong").await.unwrap();
        assert_eq!(snap.status, VaultStatus::Unlocked);
        assert_eq!(snap.credentials.len(), 1);
        assert!(!snap.credentials[0].is_decrypted());
        assert!(snap.credentials[0].decrypt_error.is_some());
    }

    #[tokio::test]
    async fn update_and_remove_refresh_views() {
        let (_store, ctl) = controller().await;
        ctl.unlock("passphrase").await.unwrap();

        let snap = ctl.add(fields("Old")).await.unwrap();
        let id = snap.credentials[0].id.clone();

        let snap = ctl.update(&id, fields("New")).await.unwrap();
        assert_eq!(snap.credentials.len(), 1);
        assert_eq!(snap.credentials[0].title, "New");

        let snap = ctl.remove(&id).await.unwrap();
        assert!(snap.credentials.is_empty());
    }

    #[tokio::test]
    async fn search_requires_unlock_and_decrypts() {
        let (_store, ctl) = controller().await;
        assert!(matches!(ctl.search("x").await, Err(VaultError::Locked)));

        ctl.unlock("passphrase").await.unwrap();
        ctl.add(fields("GitHub")).await.unwrap();
        ctl.add(fields("Bank")).await.unwrap();

        let hits = ctl.search("git").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "GitHub");
        assert_eq!(hits[0].username, "user");
    }

    #[tokio::test]
    async fn watch_subscribers_observe_version_bumps() {
        let (_store, ctl) = controller().await;
        let mut rx = ctl.subscribe();
        let v0 = *rx.borrow_and_update();

        ctl.unlock("passphrase").await.unwrap();
        rx.changed().await.unwrap();
        let v1 = *rx.borrow_and_update();
        assert!(v1 > v0);

        let snap = ctl.snapshot().await;
        assert_eq!(snap.version, v1);
    }
}
