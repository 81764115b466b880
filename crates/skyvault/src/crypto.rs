//! AES-256-GCM encryption codec using the `ring` crate.
//!
//! This module provides the cryptographic primitives for the vault:
//!
//! - **Encryption/decryption**: AES-256-GCM authenticated encryption with a
//!   randomly generated 96-bit nonce per call.  Ciphertexts are encoded as
//!   `base64(nonce || ciphertext || tag)` so they can be stored as plain
//!   strings inside the remote JSON document.
//! - **Key derivation**: PBKDF2-HMAC-SHA256 to derive a 256-bit master key
//!   from a passphrase and a fixed, configuration-level salt.
//! - **Random generation**: Cryptographically secure random key material via
//!   `ring`.
//!
//! # Security Notes
//!
//! - Encrypting the same plaintext twice under the same key yields different
//!   ciphertexts — the fresh random nonce is a required property, not a bug.
//! - Decryption with a wrong key fails closed: GCM authentication rejects the
//!   ciphertext before any plaintext is released.  Callers rely on this to
//!   detect a wrong master key.
//! - PBKDF2 iteration count is set to 600,000 as recommended by OWASP (2023).

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use ring::aead::{self, Aad, BoundKey, NONCE_LEN, Nonce, NonceSequence, SealingKey, UnboundKey};
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Result, VaultError};

/// Length of the AES-256-GCM key in bytes.
pub const KEY_LEN: usize = 32;

/// Length of the AES-256-GCM nonce in bytes (96 bits).
pub const NONCE_LEN_BYTES: usize = NONCE_LEN;

/// Length of the GCM authentication tag in bytes.
pub const TAG_LEN: usize = 16;

/// PBKDF2 iteration count — 600,000 per OWASP 2023 recommendation for
/// HMAC-SHA256.
const PBKDF2_ITERATIONS: u32 = 600_000;

/// PBKDF2 algorithm: HMAC-SHA256.
static PBKDF2_ALG: pbkdf2::Algorithm = pbkdf2::PBKDF2_HMAC_SHA256;

/// AES-256-GCM algorithm from `ring`.
static AEAD_ALG: &aead::Algorithm = &aead::AES_256_GCM;

// ---------------------------------------------------------------------------
// Master key
// ---------------------------------------------------------------------------

/// A 256-bit symmetric master key.
///
/// The key is transient: it lives only in process memory while the vault is
/// unlocked and is zeroized on drop.  `Debug` is redacted and the type is
/// deliberately not `Serialize` — the key must never reach a log line, an
/// error payload, or the sync channel.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey([u8; KEY_LEN]);

impl MasterKey {
    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Wrap a byte slice, failing if it is not exactly [`KEY_LEN`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| VaultError::KeyDerivationFailed {
                reason: format!("key must be {} bytes, got {}", KEY_LEN, bytes.len()),
            })?;
        Ok(Self(arr))
    }

    /// Raw key bytes, for handing to the keystore or the AEAD.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl PartialEq for MasterKey {
    fn eq(&self, other: &Self) -> bool {
        // Constant-time comparison; key equality is checked when verifying
        // KDF determinism, never by decrypt-and-compare.
        ring::constant_time::verify_slices_are_equal(&self.0, &other.0).is_ok()
    }
}

impl Eq for MasterKey {}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey(<redacted>)")
    }
}

// ---------------------------------------------------------------------------
// Nonce handling
// ---------------------------------------------------------------------------

/// A single-use nonce sequence that yields exactly one nonce and then errors.
///
/// `ring` requires a [`NonceSequence`] for sealing operations.  Since we
/// generate a fresh random nonce per encryption call, this wrapper ensures
/// each sealing key is used exactly once.
struct SingleNonce(Option<[u8; NONCE_LEN_BYTES]>);

impl SingleNonce {
    fn new(bytes: [u8; NONCE_LEN_BYTES]) -> Self {
        Self(Some(bytes))
    }
}

impl NonceSequence for SingleNonce {
    fn advance(&mut self) -> std::result::Result<Nonce, ring::error::Unspecified> {
        self.0
            .take()
            .map(Nonce::assume_unique_for_key)
            .ok_or(ring::error::Unspecified)
    }
}

// ---------------------------------------------------------------------------
// Encryption
// ---------------------------------------------------------------------------

/// Encrypt `plaintext` with AES-256-GCM under `key`.
///
/// Returns `base64(nonce || ciphertext || tag)`.  A fresh random 96-bit nonce
/// is generated per call, so repeated encryption of identical plaintext
/// produces different ciphertexts.
///
/// # Errors
///
/// Returns [`VaultError::EncryptionFailed`] if `ring` reports a failure.
pub fn encrypt(plaintext: &str, key: &MasterKey) -> Result<String> {
    let rng = SystemRandom::new();

    let mut nonce_bytes = [0u8; NONCE_LEN_BYTES];
    rng.fill(&mut nonce_bytes)
        .map_err(|_| VaultError::EncryptionFailed {
            reason: "failed to generate random nonce".into(),
        })?;

    let unbound_key =
        UnboundKey::new(AEAD_ALG, key.as_bytes()).map_err(|_| VaultError::EncryptionFailed {
            reason: "failed to create AES-256-GCM key".into(),
        })?;

    let mut sealing_key = SealingKey::new(unbound_key, SingleNonce::new(nonce_bytes));

    // `ring` encrypts in-place and appends the authentication tag.
    let mut in_out = plaintext.as_bytes().to_vec();
    sealing_key
        .seal_in_place_append_tag(Aad::empty(), &mut in_out)
        .map_err(|_| VaultError::EncryptionFailed {
            reason: "seal_in_place failed".into(),
        })?;

    let mut framed = Vec::with_capacity(NONCE_LEN_BYTES + in_out.len());
    framed.extend_from_slice(&nonce_bytes);
    framed.extend_from_slice(&in_out);

    tracing::trace!(
        plaintext_len = plaintext.len(),
        ciphertext_len = framed.len(),
        "encrypted field"
    );

    Ok(BASE64.encode(framed))
}

/// Decrypt a `base64(nonce || ciphertext || tag)` string under `key`.
///
/// # Errors
///
/// Returns [`VaultError::DecryptionFailed`] if the encoding is malformed, the
/// key is wrong, the ciphertext has been tampered with, or the decrypted
/// bytes are not valid UTF-8.  Wrong keys always fail here — garbage is never
/// returned as plaintext.
pub fn decrypt(ciphertext: &str, key: &MasterKey) -> Result<String> {
    let framed = BASE64
        .decode(ciphertext)
        .map_err(|e| VaultError::DecryptionFailed {
            reason: format!("invalid base64 ciphertext: {e}"),
        })?;

    if framed.len() < NONCE_LEN_BYTES + TAG_LEN {
        return Err(VaultError::DecryptionFailed {
            reason: format!(
                "ciphertext is {} bytes, expected at least {}",
                framed.len(),
                NONCE_LEN_BYTES + TAG_LEN
            ),
        });
    }

    let (nonce_bytes, body) = framed.split_at(NONCE_LEN_BYTES);
    let mut nonce = [0u8; NONCE_LEN_BYTES];
    nonce.copy_from_slice(nonce_bytes);

    let unbound_key =
        UnboundKey::new(AEAD_ALG, key.as_bytes()).map_err(|_| VaultError::DecryptionFailed {
            reason: "failed to create AES-256-GCM key".into(),
        })?;

    let mut opening_key = aead::OpeningKey::new(unbound_key, SingleNonce::new(nonce));

    let mut in_out = body.to_vec();
    let plaintext = opening_key
        .open_in_place(Aad::empty(), &mut in_out)
        .map_err(|_| VaultError::DecryptionFailed {
            reason: "authentication failed — wrong key or corrupted data".into(),
        })?;

    let text = std::str::from_utf8(plaintext).map_err(|_| VaultError::DecryptionFailed {
        reason: "decrypted bytes are not valid UTF-8".into(),
    })?;

    Ok(text.to_string())
}

// ---------------------------------------------------------------------------
// Key derivation
// ---------------------------------------------------------------------------

/// Derive a 256-bit master key from a `passphrase` and a fixed `salt` using
/// PBKDF2-HMAC-SHA256.
///
/// Deterministic: the same passphrase and salt always yield the same key.
/// The salt is a configuration-level value (see
/// [`VaultConfig::kdf_salt`](crate::config::VaultConfig)), not per-record.
pub fn derive_key(passphrase: &str, salt: &str) -> MasterKey {
    let iterations =
        std::num::NonZeroU32::new(PBKDF2_ITERATIONS).expect("PBKDF2_ITERATIONS is non-zero");

    let mut out = [0u8; KEY_LEN];
    pbkdf2::derive(
        PBKDF2_ALG,
        iterations,
        salt.as_bytes(),
        passphrase.as_bytes(),
        &mut out,
    );

    tracing::debug!("derived master key from passphrase via PBKDF2");
    MasterKey::from_bytes(out)
}

// ---------------------------------------------------------------------------
// Random keys
// ---------------------------------------------------------------------------

/// Generate a cryptographically random 256-bit master key, for cases where
/// no user passphrase is used directly as the key source.
///
/// # Errors
///
/// Returns [`VaultError::Internal`] if the system CSPRNG fails.
pub fn generate_random_key() -> Result<MasterKey> {
    let rng = SystemRandom::new();
    let mut buf = [0u8; KEY_LEN];
    rng.fill(&mut buf)
        .map_err(|_| VaultError::Internal("failed to generate random key".into()))?;
    Ok(MasterKey::from_bytes(buf))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = generate_random_key().unwrap();
        let plaintext = "hunter2, but longer and with unicode: ünïcödé";

        let ciphertext = encrypt(plaintext, &key).unwrap();
        let decrypted = decrypt(&ciphertext, &key).unwrap();

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn decrypt_with_wrong_key_fails() {
        let key1 = generate_random_key().unwrap();
        let key2 = generate_random_key().unwrap();

        let ciphertext = encrypt("secret data", &key1).unwrap();
        let result = decrypt(&ciphertext, &key2);

        assert!(matches!(result, Err(VaultError::DecryptionFailed { .. })));
    }

    #[test]
    fn encryption_is_non_deterministic() {
        let key = generate_random_key().unwrap();

        let c1 = encrypt("same plaintext", &key).unwrap();
        let c2 = encrypt("same plaintext", &key).unwrap();

        assert_ne!(c1, c2);
        // Both still decrypt to the original.
        assert_eq!(decrypt(&c1, &key).unwrap(), "same plaintext");
        assert_eq!(decrypt(&c2, &key).unwrap(), "same plaintext");
    }

    #[test]
    fn decrypt_with_tampered_ciphertext_fails() {
        let key = generate_random_key().unwrap();
        let ciphertext = encrypt("secret data", &key).unwrap();

        // Flip a bit inside the framed bytes and re-encode.
        let mut framed = BASE64.decode(&ciphertext).unwrap();
        let last = framed.len() - 1;
        framed[last] ^= 0x01;
        let tampered = BASE64.encode(framed);

        let result = decrypt(&tampered, &key);
        assert!(matches!(result, Err(VaultError::DecryptionFailed { .. })));
    }

    #[test]
    fn decrypt_rejects_malformed_input() {
        let key = generate_random_key().unwrap();

        assert!(decrypt("not base64 at all!!!", &key).is_err());
        // Valid base64 but far too short to hold nonce + tag.
        assert!(decrypt(&BASE64.encode(b"tiny"), &key).is_err());
    }

    #[test]
    fn derive_key_is_deterministic() {
        let k1 = derive_key("correct horse battery staple", "app-salt-v1");
        let k2 = derive_key("correct horse battery staple", "app-salt-v1");
        assert_eq!(k1, k2);
    }

    #[test]
    fn derive_key_is_salt_sensitive() {
        let k1 = derive_key("same passphrase", "salt-one");
        let k2 = derive_key("same passphrase", "salt-two");
        assert_ne!(k1, k2);
    }

    #[test]
    fn random_keys_are_distinct() {
        let k1 = generate_random_key().unwrap();
        let k2 = generate_random_key().unwrap();
        assert_ne!(k1, k2);
    }

    #[test]
    fn master_key_debug_is_redacted() {
        let key = generate_random_key().unwrap();
        let rendered = format!("{key:?}");
        assert_eq!(rendered, "MasterKey(<redacted>)");
    }

    #[test]
    fn empty_plaintext_roundtrip() {
        let key = generate_random_key().unwrap();
        let ciphertext = encrypt("", &key).unwrap();
        assert_eq!(decrypt(&ciphertext, &key).unwrap(), "");
    }
}
