//! Vault error types.
//!
//! All vault subsystems surface errors through [`VaultError`], which is the
//! single error type returned by every public API in this crate.  Each variant
//! carries enough context for callers to decide how to handle the failure
//! without inspecting opaque strings.  Variants never embed key material,
//! plaintext secrets, or raw ciphertext.

/// Unified error type for the skyvault credential vault.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    // -- Crypto errors ------------------------------------------------------
    /// Encryption failed (e.g. invalid key length, ring internal error).
    #[error("encryption failed: {reason}")]
    EncryptionFailed { reason: String },

    /// Decryption failed (wrong key, corrupted ciphertext, or the decoded
    /// bytes were not valid UTF-8).  Per-record tolerant in list paths.
    #[error("decryption failed: {reason}")]
    DecryptionFailed { reason: String },

    /// Key derivation failed (e.g. invalid PBKDF2 parameters).
    #[error("key derivation failed: {reason}")]
    KeyDerivationFailed { reason: String },

    // -- Key lifecycle errors -----------------------------------------------
    /// The operation requires an unlocked vault.
    #[error("vault is locked")]
    Locked,

    /// The secure keystore backend is unavailable or rejected the request.
    #[error("keystore unavailable: {reason}")]
    KeyStoreUnavailable { reason: String },

    // -- Remote store errors ------------------------------------------------
    /// The remote store rejected our credentials.  Surfaced to the caller,
    /// never retried by the core.
    #[error("remote store rejected credentials: {reason}")]
    Auth { reason: String },

    /// Network or transport failure talking to the remote store.  Propagated
    /// to the caller, no automatic retry inside the core.
    #[error("remote store error: {reason}")]
    RemoteStore { reason: String },

    // -- Repository errors ---------------------------------------------------
    /// The requested credential does not exist.  Read paths return `None`
    /// instead; this variant is reserved for update/delete paths where
    /// absence is unexpected.
    #[error("credential not found: id={id}")]
    CredentialNotFound { id: String },

    // -- Underlying errors --------------------------------------------------
    /// JSON serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error from the filesystem (keystore file operations, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    // -- Generic ------------------------------------------------------------
    /// Catch-all for unexpected internal errors that don't fit a specific
    /// variant.  Prefer a typed variant whenever possible.
    #[error("internal vault error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the vault crate.
pub type Result<T> = std::result::Result<T, VaultError>;
