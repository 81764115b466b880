//! Client-side encrypted credential vault synced to a remote JSON blob store.
//!
//! Skyvault keeps title/username/password/notes records encrypted end to end:
//! sensitive fields are sealed with AES-256-GCM before they reach the remote
//! document store, and plaintext exists only in process memory while the
//! vault is unlocked.  The remote store is treated as unreliable and
//! non-transactional — the whole collection lives in a single JSON document
//! that is replaced wholesale on every save.
//!
//! # Modules
//!
//! - [`crypto`] — AES-256-GCM encryption/decryption, PBKDF2 key derivation,
//!   the [`MasterKey`](crypto::MasterKey) type.
//! - [`keys`] — master-key lifecycle and the lock/unlock state.
//! - [`keystore`] — secure scalar storage for the quick-unlock key.
//! - [`remote`] — the four-operation remote document store contract.
//! - [`repository`] — cached read-modify-write persistence of the collection.
//! - [`service`] — encrypt-on-write / tolerant-decrypt-on-read credential API.
//! - [`controller`] — the observable locked/unlocking/unlocked state machine.
//! - [`model`] — credential record shapes.
//! - [`config`] — deployment-level configuration.
//! - [`error`] — unified error types.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use skyvault::config::VaultConfig;
//! use skyvault::controller::VaultController;
//! use skyvault::keys::KeyManager;
//! use skyvault::keystore::FileKeyStore;
//! use skyvault::model::NewCredential;
//! use skyvault::remote::InMemoryDocumentStore;
//! use skyvault::repository::CredentialRepository;
//! use skyvault::service::CredentialService;
//!
//! # async fn example() -> skyvault::error::Result<()> {
//! let config = VaultConfig::from_env();
//!
//! // Wire the collaborators explicitly; there is no global registry.
//! let remote = Arc::new(InMemoryDocumentStore::new());
//! let keystore = Arc::new(FileKeyStore::new("data/keystore"));
//! let keys = KeyManager::new(keystore, &config.kdf_salt, &config.master_key_namespace);
//! let repo = CredentialRepository::new(remote, &config.collection_filename);
//! let service = CredentialService::new(repo);
//!
//! // Construction attempts quick unlock once, then settles locked.
//! let vault = VaultController::start(keys, service).await;
//!
//! let snapshot = vault.unlock("my master passphrase").await?;
//! assert!(snapshot.credentials.is_empty());
//!
//! vault
//!     .add(NewCredential {
//!         title: "Email".into(),
//!         username: "alice@example.com".into(),
//!         password: "hunter2".into(),
//!         ..Default::default()
//!     })
//!     .await?;
//!
//! vault.lock().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod controller;
pub mod crypto;
pub mod error;
pub mod keys;
pub mod keystore;
pub mod model;
pub mod remote;
pub mod repository;
pub mod service;

// Re-export the most commonly used types at the crate root for convenience.
pub use config::VaultConfig;
pub use controller::{VaultController, VaultSnapshot, VaultStatus};
pub use crypto::MasterKey;
pub use error::{Result, VaultError};
pub use keys::KeyManager;
pub use keystore::{FileKeyStore, MemoryKeyStore, SecureKeyStore};
pub use model::{Credential, CredentialView, NewCredential};
pub use remote::{FileHandle, InMemoryDocumentStore, RemoteDocumentStore};
pub use repository::CredentialRepository;
pub use service::CredentialService;
