//! Cryptographic primitives for the credential vault
//!
//! - `VaultKey`: 256-bit key that zeroizes on drop
//! - PBKDF2-HMAC-SHA256 key derivation
//! - AES-256-GCM sealing with the encoding `base64(IV || ciphertext || tag)`
//! - Password verifier `SHA-256(password || salt)` with constant-time comparison

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{Error, Result};

/// Salt size in bytes (128 bits)
pub const SALT_SIZE: usize = 16;

/// AES-GCM nonce size (96 bits)
pub const NONCE_SIZE: usize = 12;

/// AES-GCM authentication tag size
pub const TAG_SIZE: usize = 16;

/// Derived key size (256 bits)
pub const KEY_SIZE: usize = 32;

/// PBKDF2 iteration count used for newly derived keys
pub const DEFAULT_KDF_ITERATIONS: u32 = 100_000;

/// A 256-bit encryption key with automatic zeroization on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct VaultKey {
    key: [u8; KEY_SIZE],
}

impl VaultKey {
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }
}

impl std::fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Generate a fresh installation salt
pub fn generate_salt() -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Derive an AES-256 key from `password` and `salt`.
///
/// Deliberately slow; call from a blocking context when running async.
pub fn derive_key(password: &[u8], salt: &[u8], iterations: u32) -> VaultKey {
    let mut key = [0u8; KEY_SIZE];
    pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut key);
    VaultKey { key }
}

/// Offline password verifier, `SHA-256(password || salt)`
pub fn compute_verifier(password: &[u8], salt: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(password);
    hasher.update(salt);
    hasher.finalize().into()
}

/// Compare two byte strings without short-circuiting on the first mismatch
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Encrypt `plaintext` under a fresh random nonce
pub fn seal(key: &VaultKey, plaintext: &[u8]) -> Result<String> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| Error::Internal {
            message: "Invalid vault key length".to_string(),
            source: anyhow::anyhow!(e.to_string()),
        })?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    // aes-gcm appends the tag to the ciphertext
    let ciphertext = cipher.encrypt(nonce, plaintext).map_err(|e| Error::Internal {
        message: "Encryption failed".to_string(),
        source: anyhow::anyhow!(e.to_string()),
    })?;

    let mut output = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    output.extend_from_slice(&nonce_bytes);
    output.extend(ciphertext);
    Ok(STANDARD.encode(output))
}

/// Decrypt a value produced by [`seal`].
///
/// Every failure (bad base64, truncation, wrong key, tampering) is reported
/// as [`Error::Decryption`].
pub fn open(key: &VaultKey, encoded: &str) -> Result<Vec<u8>> {
    let data = STANDARD
        .decode(encoded.trim())
        .map_err(|_| Error::decryption("ciphertext is not valid base64"))?;

    if data.len() < NONCE_SIZE + TAG_SIZE {
        return Err(Error::decryption("ciphertext is too short"));
    }

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|_| Error::decryption("invalid vault key length"))?;

    let (nonce_bytes, ciphertext) = data.split_at(NONCE_SIZE);
    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| Error::decryption("authentication tag mismatch"))
}
