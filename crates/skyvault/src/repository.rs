//! Cached credential repository over the remote collection document.
//!
//! [`CredentialRepository`] is the only component that talks to the
//! [`RemoteDocumentStore`].  It maps the in-memory collection of encrypted
//! records onto a single remote JSON array under a fixed filename:
//!
//! - **Reads** go through a lazily populated cache: the first `load` fetches
//!   and deserializes the remote document (an absent document is an empty
//!   collection); subsequent reads are served from memory.
//! - **Writes** are read-modify-write: load the current collection, upsert or
//!   remove by id, serialize the whole array, then `update` the existing
//!   remote file — or `upload` to create it the first time.  The cache is
//!   replaced only after the remote write succeeds.
//!
//! # Consistency
//!
//! All repository state sits behind one `tokio::sync::Mutex` that is held
//! across the entire read-modify-write of a mutation, so concurrent `save`
//! calls on the same instance are serialized and cannot lose each other's
//! writes.  Writers on *other* instances (or other devices) still race on the
//! remote document: last serialization wins.  Cross-instance conflict
//! resolution is out of scope.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::{Result, VaultError};
use crate::model::Credential;
use crate::remote::{FileHandle, RemoteDocumentStore};

/// Mutable repository state: the last-known-good mirror of the remote
/// document plus the handle it lives under.
#[derive(Default)]
struct RepoState {
    /// `None` until the first successful load.  A failed load leaves this
    /// unpopulated so a later call retries the fetch instead of serving
    /// stale empty data.
    cache: Option<Vec<Credential>>,
    /// Remote handle, known once the document has been found or created.
    handle: Option<FileHandle>,
}

/// Repository mapping credentials onto one remote JSON document.
pub struct CredentialRepository {
    store: Arc<dyn RemoteDocumentStore>,
    filename: String,
    state: Mutex<RepoState>,
}

impl CredentialRepository {
    pub fn new(store: Arc<dyn RemoteDocumentStore>, filename: impl Into<String>) -> Self {
        Self {
            store,
            filename: filename.into(),
            state: Mutex::new(RepoState::default()),
        }
    }

    /// All records, from cache or remote.
    ///
    /// # Errors
    ///
    /// [`VaultError::RemoteStore`]/[`VaultError::Auth`] on transport failure,
    /// [`VaultError::Serialization`] when the document is not a valid record
    /// array.  The cache stays unpopulated on failure.
    pub async fn find_all(&self) -> Result<Vec<Credential>> {
        let mut state = self.state.lock().await;
        let records = self.load_locked(&mut state).await?;
        Ok(records.to_vec())
    }

    /// Look up a single record by id.  Absence is an expected outcome on
    /// read paths, so this returns `None` rather than an error.
    pub async fn find_by_id(&self, id: &str) -> Result<Option<Credential>> {
        let mut state = self.state.lock().await;
        let records = self.load_locked(&mut state).await?;
        Ok(records.iter().find(|c| c.id == id).cloned())
    }

    /// Case-insensitive substring search over the plaintext-safe fields
    /// (title, website, category).  Ciphertext fields are never matched.
    pub async fn search(&self, query: &str) -> Result<Vec<Credential>> {
        let needle = query.to_lowercase();
        let mut state = self.state.lock().await;
        let records = self.load_locked(&mut state).await?;

        Ok(records
            .iter()
            .filter(|c| {
                c.title.to_lowercase().contains(&needle)
                    || c.website
                        .as_deref()
                        .is_some_and(|w| w.to_lowercase().contains(&needle))
                    || c.category
                        .as_deref()
                        .is_some_and(|cat| cat.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect())
    }

    /// Upsert `record` by id and persist the full collection.
    ///
    /// The state lock is held from load to remote write, so saves on this
    /// instance are serialized.
    pub async fn save(&self, record: Credential) -> Result<()> {
        let mut state = self.state.lock().await;
        let mut records = self.load_locked(&mut state).await?.to_vec();

        match records.iter_mut().find(|c| c.id == record.id) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }

        self.persist_locked(&mut state, records).await
    }

    /// Remove the record with `id` and persist.
    ///
    /// # Errors
    ///
    /// [`VaultError::CredentialNotFound`] — absence is unexpected on delete
    /// paths.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let mut records = self.load_locked(&mut state).await?.to_vec();

        let before = records.len();
        records.retain(|c| c.id != id);
        if records.len() == before {
            return Err(VaultError::CredentialNotFound { id: id.to_string() });
        }

        self.persist_locked(&mut state, records).await
    }

    // -- Internal helpers ---------------------------------------------------

    /// Populate the cache if needed and return a reference to it.
    async fn load_locked<'a>(&self, state: &'a mut RepoState) -> Result<&'a [Credential]> {
        if state.cache.is_none() {
            let (records, handle) = self.fetch_remote().await?;
            tracing::debug!(
                count = records.len(),
                present = handle.is_some(),
                "populated credential cache from remote"
            );
            state.cache = Some(records);
            state.handle = handle;
        }

        Ok(state.cache.as_deref().expect("cache populated above"))
    }

    /// Fetch and deserialize the remote document.  An absent document is an
    /// empty collection, not an error.
    async fn fetch_remote(&self) -> Result<(Vec<Credential>, Option<FileHandle>)> {
        let Some(handle) = self.store.find_by_name(&self.filename).await? else {
            tracing::debug!(filename = %self.filename, "no remote document yet, starting empty");
            return Ok((Vec::new(), None));
        };

        let value = self.store.download(&handle).await?;
        let records: Vec<Credential> = serde_json::from_value(value)?;
        Ok((records, Some(handle)))
    }

    /// Serialize `records` and write them remotely: `update` when the file
    /// handle is known, `upload` to create the document the first time.
    /// The cache is replaced only on success.
    async fn persist_locked(&self, state: &mut RepoState, records: Vec<Credential>) -> Result<()> {
        let content = serde_json::to_string(&records)?;

        let handle = match &state.handle {
            Some(handle) => self.store.update(handle, &content).await?,
            None => self.store.upload(&self.filename, &content).await?,
        };

        tracing::info!(
            count = records.len(),
            file_id = %handle.id,
            "persisted credential collection"
        );

        state.handle = Some(handle);
        state.cache = Some(records);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
