//! Vault configuration.
//!
//! All fixed, deployment-level values live here: the remote collection
//! filename, the KDF salt, and the keystore namespaces.  Values can be
//! overridden through `SKYVAULT_*` environment variables, matching how the
//! rest of the app configures itself.

/// Configuration for a vault instance.
#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// Name of the single remote JSON document holding the credential
    /// collection.
    pub collection_filename: String,

    /// Fixed salt for PBKDF2 passphrase derivation.  Configuration-level,
    /// not per-record: changing it orphans every previously encrypted field.
    pub kdf_salt: String,

    /// Keystore namespace for the persisted master key (quick unlock).
    /// Other secrets (e.g. an API key) use their own per-purpose namespaces
    /// and are never mixed into this one.
    pub master_key_namespace: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            collection_filename: "skyvault_credentials.json".into(),
            kdf_salt: "skyvault-kdf-salt-v1".into(),
            master_key_namespace: "com.skyvault.master-key".into(),
        }
    }
}

impl VaultConfig {
    /// Build a config from the environment, falling back to defaults.
    ///
    /// Recognized variables: `SKYVAULT_COLLECTION_FILENAME`,
    /// `SKYVAULT_KDF_SALT`, `SKYVAULT_MASTER_KEY_NAMESPACE`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            collection_filename: std::env::var("SKYVAULT_COLLECTION_FILENAME")
                .unwrap_or(defaults.collection_filename),
            kdf_salt: std::env::var("SKYVAULT_KDF_SALT").unwrap_or(defaults.kdf_salt),
            master_key_namespace: std::env::var("SKYVAULT_MASTER_KEY_NAMESPACE")
                .unwrap_or(defaults.master_key_namespace),
        }
    }
}
