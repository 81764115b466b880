//! Credential service: encryption on write, tolerant decryption on read.
//!
//! [`CredentialService`] sits between the controller and the repository.  It
//! encrypts the sensitive fields (username, password, notes) independently
//! with the caller-supplied master key before anything reaches the
//! repository, and decrypts them on the way back out.
//!
//! A record that fails to decrypt — wrong key, corrupt ciphertext — is never
//! dropped and never aborts a list call: it comes back as a
//! [`CredentialView`] flagged with `decrypt_error` and its ciphertext intact,
//! so callers can surface it as "undecryptable with the current key".

use crate::crypto::{self, MasterKey};
use crate::error::{Result, VaultError};
use crate::model::{Credential, CredentialView, NewCredential};
use crate::repository::CredentialRepository;

/// Encrypting/decrypting facade over the [`CredentialRepository`].
pub struct CredentialService {
    repo: CredentialRepository,
}

impl CredentialService {
    pub fn new(repo: CredentialRepository) -> Self {
        Self { repo }
    }

    /// Encrypt `fields` and persist a new credential.
    ///
    /// Returns the record as persisted, i.e. in ciphertext form.
    pub async fn create(&self, fields: NewCredential, key: &MasterKey) -> Result<Credential> {
        let username = crypto::encrypt(&fields.username, key)?;
        let password = crypto::encrypt(&fields.password, key)?;
        let notes = fields
            .notes
            .as_deref()
            .map(|n| crypto::encrypt(n, key))
            .transpose()?;

        let record = Credential::new(
            fields.title,
            username,
            password,
            fields.website,
            notes,
            fields.category,
        );

        self.repo.save(record.clone()).await?;
        tracing::info!(id = %record.id, "created credential");
        Ok(record)
    }

    /// Re-encrypt `fields` onto an existing record, preserving its id and
    /// creation time and bumping `updated_at`.
    ///
    /// # Errors
    ///
    /// [`VaultError::CredentialNotFound`] when `id` does not exist.
    pub async fn update(
        &self,
        id: &str,
        fields: NewCredential,
        key: &MasterKey,
    ) -> Result<Credential> {
        let mut record = self
            .repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| VaultError::CredentialNotFound { id: id.to_string() })?;

        record.title = fields.title;
        record.username = crypto::encrypt(&fields.username, key)?;
        record.password = crypto::encrypt(&fields.password, key)?;
        record.notes = fields
            .notes
            .as_deref()
            .map(|n| crypto::encrypt(n, key))
            .transpose()?;
        record.website = fields.website;
        record.category = fields.category;
        record.touch();

        self.repo.save(record.clone()).await?;
        tracing::info!(id = %record.id, "updated credential");
        Ok(record)
    }

    /// Remove a credential by id.
    ///
    /// # Errors
    ///
    /// [`VaultError::CredentialNotFound`] when `id` does not exist.
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.repo.delete(id).await?;
        tracing::info!(id, "deleted credential");
        Ok(())
    }

    /// All credentials, decrypted with `key` where possible.
    ///
    /// Per-record decrypt failures are tolerated: the failing entry is
    /// returned flagged instead of being dropped or failing the whole call.
    pub async fn list(&self, key: &MasterKey) -> Result<Vec<CredentialView>> {
        let records = self.repo.find_all().await?;
        Ok(records.into_iter().map(|r| decrypt_record(r, key)).collect())
    }

    /// A single decrypted credential, or `None` when the id is unknown.
    pub async fn get(&self, id: &str, key: &MasterKey) -> Result<Option<CredentialView>> {
        Ok(self
            .repo
            .find_by_id(id)
            .await?
            .map(|r| decrypt_record(r, key)))
    }

    /// Search the plaintext-safe fields, then decrypt the matches.
    pub async fn search(&self, query: &str, key: &MasterKey) -> Result<Vec<CredentialView>> {
        let records = self.repo.search(query).await?;
        Ok(records.into_iter().map(|r| decrypt_record(r, key)).collect())
    }
}

/// Decrypt one raw record into a view, downgrading decrypt failures to a
/// flag on the view.  All three sensitive fields must decrypt for the record
/// to count as readable; on failure the ciphertext is passed through intact.
fn decrypt_record(record: Credential, key: &MasterKey) -> CredentialView {
    let decrypted = (|| -> Result<(String, String, Option<String>)> {
        let username = crypto::decrypt(&record.username, key)?;
        let password = crypto::decrypt(&record.password, key)?;
        let notes = record
            .notes
            .as_deref()
            .map(|n| crypto::decrypt(n, key))
            .transpose()?;
        Ok((username, password, notes))
    })();

    match decrypted {
        Ok((username, password, notes)) => CredentialView {
            id: record.id,
            title: record.title,
            username,
            password,
            website: record.website,
            notes,
            category: record.category,
            created_at: record.created_at,
            updated_at: record.updated_at,
            decrypt_error: None,
        },
        Err(e) => {
            tracing::warn!(id = %record.id, error = %e, "credential undecryptable with current key");
            CredentialView {
                id: record.id,
                title: record.title,
                username: record.username,
                password: record.password,
                website: record.website,
                notes: record.notes,
                category: record.category,
                created_at: record.created_at,
                updated_at: record.updated_at,
                decrypt_error: Some(e.to_string()),
            }
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
    use crate::remote::InMemoryDocumentStore;
    use crate::repository::CredentialRepository;

    fn service() -> (Arc<InMemoryDocumentStore>, CredentialService) {
        let store = Arc::new(InMemoryDocumentStore::new());
        let repo = CredentialRepository::new(store.clone(), "db.json");
        (store, CredentialService::new(repo))
    }

    fn fields(title: &str) -> NewCredential {
        NewCredential {
            title: title.into(),
            username: "alice@example.com".into(),
            password: "s3cret!".into(),
            website: Some("https://example.com".into()),
            notes: Some("recovery code in drawer".into()),
            category: Some("personal".into()),
        }
    }

    #[tokio::test]
    async fn create_persists_ciphertext_only() {
        let (_store, svc) = service();
        let key = crypto::generate_random_key().unwrap();

        let created = svc.create(fields("Email"), &key).await.unwrap();

        // The persisted record must not carry plaintext in sensitive fields.
        assert_ne!(created.username, "alice@example.com");
        assert_ne!(created.password, "s3cret!");
        assert_ne!(created.notes.as_deref(), Some("recovery code in drawer"));
        // Plaintext-safe fields survive untouched.
        assert_eq!(created.title, "Email");
        assert_eq!(created.website.as_deref(), Some("https://example.com"));
    }

    #[tokio::test]
    async fn create_then_list_round_trips_plaintext() {
        let (_store, svc) = service();
        let key = crypto::generate_random_key().unwrap();

        svc.create(
            NewCredential {
                title: "T".into(),
                username: "u".into(),
                password: "p".into(),
                ..Default::default()
            },
            &key,
        )
        .await
        .unwrap();

        let views = svc.list(&key).await.unwrap();
        assert_eq!(views.len(), 1);
        let view = &views[0];
        assert!(view.is_decrypted());
        assert_eq!(view.title, "T");
        assert_eq!(view.username, "u");
        assert_eq!(view.password, "p");
        assert!(view.notes.is_none());
    }

    #[tokio::test]
    async fn list_flags_undecryptable_records_without_failing() {
        let (_store, svc) = service();
        let key1 = crypto::generate_random_key().unwrap();
        let key2 = crypto::generate_random_key().unwrap();

        svc.create(fields("Mine"), &key1).await.unwrap();
        let foreign = svc.create(fields("Theirs"), &key2).await.unwrap();

        let views = svc.list(&key1).await.unwrap();
        assert_eq!(views.len(), 2);

        let mine = views.iter().find(|v| v.title == "Mine").unwrap();
        let theirs = views.iter().find(|v| v.title == "Theirs").unwrap();

        assert!(mine.is_decrypted());
        assert_eq!(mine.username, "alice@example.com");

        assert!(!theirs.is_decrypted());
        assert!(theirs.decrypt_error.is_some());
        // Ciphertext is preserved, not replaced or dropped.
        assert_eq!(theirs.username, foreign.username);
        assert_eq!(theirs.password, foreign.password);
    }

    #[tokio::test]
    async fn update_reencrypts_and_bumps_updated_at() {
        let (_store, svc) = service();
        let key = crypto::generate_random_key().unwrap();

        let created = svc.create(fields("Bank"), &key).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;

        let mut changed = fields("Bank (new)");
        changed.password = "rotated!".into();
        let updated = svc.update(&created.id, changed, &key).await.unwrap();

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at > created.updated_at);
        // Fresh nonce means fresh ciphertext even for unchanged plaintext.
        assert_ne!(updated.username, created.username);

        let view = svc.get(&created.id, &key).await.unwrap().unwrap();
        assert_eq!(view.title, "Bank (new)");
        assert_eq!(view.password, "rotated!");
    }

    #[tokio::test]
    async fn update_missing_id_errors() {
        let (_store, svc) = service();
        let key = crypto::generate_random_key().unwrap();

        let result = svc.update("ghost", fields("X"), &key).await;
        assert!(matches!(result, Err(VaultError::CredentialNotFound { .. })));
    }

    #[tokio::test]
    async fn get_missing_id_is_none() {
        let (_store, svc) = service();
        let key = crypto::generate_random_key().unwrap();
        assert!(svc.get("ghost", &key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_then_list_shrinks() {
        let (_store, svc) = service();
        let key = crypto::generate_random_key().unwrap();

        let a = svc.create(fields("A"), &key).await.unwrap();
        svc.create(fields("B"), &key).await.unwrap();

        svc.delete(&a.id).await.unwrap();
        let views = svc.list(&key).await.unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].title, "B");
    }

    #[tokio::test]
    async fn search_decrypts_matches() {
        let (_store, svc) = service();
        let key = crypto::generate_random_key().unwrap();

        svc.create(fields("GitHub Account"), &key).await.unwrap();
        svc.create(fields("Bank"), &key).await.unwrap();

        let hits = svc.search("github", &key).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].is_decrypted());
        assert_eq!(hits[0].username, "alice@example.com");
    }
}
