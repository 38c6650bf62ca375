//! Secret sealing using XChaCha20-Poly1305.
//!
//! Stored credentials are encrypted under a subkey derived from the
//! configured secret key and a caller-supplied salt, so the same key can
//! protect independent secrets without nonce-reuse concerns across domains.
//! XChaCha20-Poly1305's 24-byte nonce is safe for random generation.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use chacha20poly1305::{
    aead::{generic_array::GenericArray, Aead, AeadCore, KeyInit, OsRng},
    XChaCha20Poly1305,
};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use ledgerbridge_common::{Error, Result};

/// Length of encryption keys in bytes (256-bit).
pub const KEY_LENGTH: usize = 32;

/// Nonce size for XChaCha20-Poly1305 (24 bytes).
pub const NONCE_SIZE: usize = 24;

/// Authentication tag size (16 bytes).
pub const TAG_SIZE: usize = 16;

/// Key material for sealing stored secrets.
///
/// Zeroizes its memory on drop so the key does not persist after the
/// owning engine instance is gone.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey {
    key: [u8; KEY_LENGTH],
}

impl SecretKey {
    /// Create a secret key from raw bytes.
    pub fn from_bytes(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Derive a secret key from a configured passphrase.
    ///
    /// Uses blake2b with a fixed domain tag; deterministic, so the same
    /// configuration value always opens the same stored secrets.
    ///
    /// # Errors
    /// - Returns error if the passphrase is empty
    pub fn from_passphrase(passphrase: &str) -> Result<Self> {
        if passphrase.is_empty() {
            return Err(Error::Crypto(
                "Encryption passphrase cannot be empty".to_string(),
            ));
        }

        let mut hasher = Blake2b::<U32>::new();
        hasher.update(passphrase.as_bytes());
        hasher.update(b"ledgerbridge-secret-key");

        let result = hasher.finalize();
        let mut key = [0u8; KEY_LENGTH];
        key.copy_from_slice(&result);
        Ok(Self { key })
    }

    /// Get the key bytes.
    ///
    /// # Security
    /// The returned slice should be used immediately and not stored.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }

    /// Derive the salt-bound subkey actually fed to the cipher.
    fn derive_subkey(&self, salt: &[u8]) -> [u8; KEY_LENGTH] {
        let mut hasher = Blake2b::<U32>::new();
        hasher.update(self.key);
        hasher.update(salt);
        hasher.update(b"sealkey");

        let result = hasher.finalize();
        let mut derived = [0u8; KEY_LENGTH];
        derived.copy_from_slice(&result);
        derived
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey([REDACTED])")
    }
}

/// Encrypt plaintext under `key` bound to `salt`.
///
/// # Preconditions
/// - `salt` must not be empty
///
/// # Postconditions
/// - Returns nonce || ciphertext || tag
/// - The nonce is randomly generated
/// - Output length is plaintext length + NONCE_SIZE + TAG_SIZE
///
/// # Errors
/// - Returns error if the salt is empty or encryption fails
///
/// # Security
/// - A fresh random nonce per call
/// - Poly1305 authenticates the ciphertext
pub fn encrypt(key: &SecretKey, salt: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    if salt.is_empty() {
        return Err(Error::Crypto("Salt cannot be empty".to_string()));
    }

    let mut subkey = key.derive_subkey(salt);
    let cipher = XChaCha20Poly1305::new(GenericArray::from_slice(&subkey));
    let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| Error::Crypto(format!("Encryption failed: {}", e)))?;
    subkey.zeroize();

    // Prepend nonce to ciphertext
    let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    result.extend_from_slice(&nonce);
    result.extend_from_slice(&ciphertext);

    Ok(result)
}

/// Decrypt ciphertext produced by [`encrypt`] with the same key and salt.
///
/// # Preconditions
/// - `ciphertext` must be at least NONCE_SIZE + TAG_SIZE bytes
/// - Ciphertext format: nonce || encrypted_data || tag
///
/// # Errors
/// - Returns error if the ciphertext is too short
/// - Returns error if authentication fails (wrong key/salt or tampered data)
pub fn decrypt(key: &SecretKey, salt: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    if salt.is_empty() {
        return Err(Error::Crypto("Salt cannot be empty".to_string()));
    }

    if ciphertext.len() < NONCE_SIZE + TAG_SIZE {
        return Err(Error::Crypto("Ciphertext too short".to_string()));
    }

    let (nonce_bytes, encrypted) = ciphertext.split_at(NONCE_SIZE);
    let nonce = GenericArray::from_slice(nonce_bytes);

    let mut subkey = key.derive_subkey(salt);
    let cipher = XChaCha20Poly1305::new(GenericArray::from_slice(&subkey));

    let plaintext = cipher
        .decrypt(nonce, encrypted)
        .map_err(|e| Error::Crypto(format!("Decryption failed: {}", e)));
    subkey.zeroize();

    plaintext
}
