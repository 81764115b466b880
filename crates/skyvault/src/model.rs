//! Credential data model.
//!
//! Three shapes of the same record move through the vault:
//!
//! - [`NewCredential`] — plaintext input fields supplied by the caller.
//! - [`Credential`] — the raw record as persisted remotely: `username`,
//!   `password`, and `notes` hold ciphertext, everything else is plaintext.
//! - [`CredentialView`] — the in-memory decrypted form returned to callers,
//!   or the same record flagged as undecryptable with its ciphertext intact.
//!
//! Wire format note: field names serialize as camelCase and timestamps as
//! ISO-8601 to stay byte-compatible with the existing remote documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Plaintext input for creating or updating a credential.
///
/// Every field is assigned explicitly — there is no merge of arbitrary
/// key/value input onto a record.
#[derive(Debug, Clone, Default)]
pub struct NewCredential {
    pub title: String,
    pub username: String,
    pub password: String,
    pub website: Option<String>,
    pub notes: Option<String>,
    pub category: Option<String>,
}

/// A credential as stored in the remote collection document.
///
/// `username`, `password`, and `notes` are ciphertext strings produced by
/// [`crate::crypto::encrypt`].  A `Credential` carrying plaintext in those
/// fields must never be written to the remote store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    /// Opaque unique id, generated at creation, immutable thereafter.
    pub id: String,

    /// Plaintext title, searchable.
    pub title: String,

    /// Encrypted username.
    pub username: String,

    /// Encrypted password.
    pub password: String,

    /// Plaintext website, optional.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,

    /// Encrypted notes, optional.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    /// Plaintext category, optional.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    /// When the credential was first created.
    pub created_at: DateTime<Utc>,

    /// When the credential content last changed.  Bumped on every mutation.
    pub updated_at: DateTime<Utc>,
}

impl Credential {
    /// Construct a fresh record with a random id and current timestamps.
    ///
    /// The sensitive fields are taken as-is: the service layer encrypts them
    /// before calling this.
    pub fn new(
        title: String,
        username: String,
        password: String,
        website: Option<String>,
        notes: Option<String>,
        category: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            title,
            username,
            password,
            website,
            notes,
            category,
            created_at: now,
            updated_at: now,
        }
    }

    /// Bump `updated_at` to now.  Called on every content mutation.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// A credential with sensitive fields decrypted for in-memory use.
///
/// When `decrypt_error` is `None`, `username`/`password`/`notes` hold
/// plaintext.  When it is `Some`, decryption failed (wrong key or corrupt
/// ciphertext) and those fields still hold the raw ciphertext so the caller
/// can surface the record as "undecryptable with the current key" instead of
/// dropping it.
#[derive(Debug, Clone, PartialEq)]
pub struct CredentialView {
    pub id: String,
    pub title: String,
    pub username: String,
    pub password: String,
    pub website: Option<String>,
    pub notes: Option<String>,
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// `Some(reason)` when the record could not be decrypted with the
    /// current master key.
    pub decrypt_error: Option<String>,
}

impl CredentialView {
    /// Whether the sensitive fields were decrypted successfully.
    pub fn is_decrypted(&self) -> bool {
        self.decrypt_error.is_none()
    }
}
