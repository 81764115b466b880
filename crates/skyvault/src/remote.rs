//! Remote document store contract.
//!
//! The vault persists the whole credential collection as a single JSON
//! document in a remote blob store (e.g. a Drive-style file API).  The core
//! only needs four operations, expressed by [`RemoteDocumentStore`]; the
//! transport itself (auth headers, multipart encoding, HTTP retries) lives in
//! the implementing crate.
//!
//! [`InMemoryDocumentStore`] is the reference implementation used by tests.
//! It counts calls per operation so tests can assert the upload/update path
//! selection and the single-fetch caching behavior.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, VaultError};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Handle to a remote file, as returned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHandle {
    /// Store-assigned opaque file id.
    pub id: String,
    /// The filename the document was created under.
    pub name: String,
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// The four remote operations the vault core consumes.
///
/// Content is always a UTF-8 JSON array of raw credential records.  None of
/// these operations are retried by the core; transport failures surface as
/// [`VaultError::RemoteStore`] and auth rejections as [`VaultError::Auth`].
#[async_trait]
pub trait RemoteDocumentStore: Send + Sync {
    /// Look up a file by name.  `None` when the document has never been
    /// created.
    async fn find_by_name(&self, name: &str) -> Result<Option<FileHandle>>;

    /// Download and JSON-parse the document behind `handle`.
    async fn download(&self, handle: &FileHandle) -> Result<serde_json::Value>;

    /// Create a new document.  Used exactly once per collection lifetime.
    async fn upload(&self, name: &str, content: &str) -> Result<FileHandle>;

    /// Replace the content of an existing document wholesale.
    async fn update(&self, handle: &FileHandle, content: &str) -> Result<FileHandle>;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

/// Per-operation call counters, for asserting store interaction patterns.
#[derive(Debug, Default)]
pub struct StoreCounters {
    finds: AtomicU64,
    downloads: AtomicU64,
    uploads: AtomicU64,
    updates: AtomicU64,
}

impl StoreCounters {
    pub fn finds(&self) -> u64 {
        self.finds.load(Ordering::Relaxed)
    }

    pub fn downloads(&self) -> u64 {
        self.downloads.load(Ordering::Relaxed)
    }

    pub fn uploads(&self) -> u64 {
        self.uploads.load(Ordering::Relaxed)
    }

    pub fn updates(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }
}

/// A single stored document.
struct StoredFile {
    handle: FileHandle,
    content: String,
}

/// In-memory [`RemoteDocumentStore`] for tests and local development.
///
/// Holds at most a handful of named documents, hands out random file ids,
/// and can be switched into a failing mode to exercise transport-error
/// propagation.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    files: Mutex<Vec<StoredFile>>,
    counters: StoreCounters,
    failing: AtomicBool,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Access the per-operation call counters.
    pub fn counters(&self) -> &StoreCounters {
        &self.counters
    }

    /// When `true`, every subsequent operation fails with
    /// [`VaultError::RemoteStore`].
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(VaultError::RemoteStore {
                reason: "simulated transport failure".into(),
            });
        }
        Ok(())
    }

    fn lock_files(&self) -> std::sync::MutexGuard<'_, Vec<StoredFile>> {
        self.files.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl RemoteDocumentStore for InMemoryDocumentStore {
    async fn find_by_name(&self, name: &str) -> Result<Option<FileHandle>> {
        self.check_available()?;
        self.counters.finds.fetch_add(1, Ordering::Relaxed);

        let files = self.lock_files();
        Ok(files
            .iter()
            .find(|f| f.handle.name == name)
            .map(|f| f.handle.clone()))
    }

    async fn download(&self, handle: &FileHandle) -> Result<serde_json::Value> {
        self.check_available()?;
        self.counters.downloads.fetch_add(1, Ordering::Relaxed);

        let files = self.lock_files();
        let file = files
            .iter()
            .find(|f| f.handle.id == handle.id)
            .ok_or_else(|| VaultError::RemoteStore {
                reason: format!("no file with id {}", handle.id),
            })?;

        Ok(serde_json::from_str(&file.content)?)
    }

    async fn upload(&self, name: &str, content: &str) -> Result<FileHandle> {
        self.check_available()?;
        self.counters.uploads.fetch_add(1, Ordering::Relaxed);

        let handle = FileHandle {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
        };

        let mut files = self.lock_files();
        files.push(StoredFile {
            handle: handle.clone(),
            content: content.to_string(),
        });

        Ok(handle)
    }

    async fn update(&self, handle: &FileHandle, content: &str) -> Result<FileHandle> {
        self.check_available()?;
        self.counters.updates.fetch_add(1, Ordering::Relaxed);

        let mut files = self.lock_files();
        let file = files
            .iter_mut()
            .find(|f| f.handle.id == handle.id)
            .ok_or_else(|| VaultError::RemoteStore {
                reason: format!("no file with id {}", handle.id),
            })?;

        file.content = content.to_string();
        Ok(file.handle.clone())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
