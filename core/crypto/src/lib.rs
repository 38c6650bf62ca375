//! Cryptographic primitives for LedgerBridge.
//!
//! This module provides:
//! - Authenticated encryption of stored secrets using XChaCha20-Poly1305
//! - Salt-bound subkey derivation with blake2b
//! - Secure key handling with automatic zeroization
//!
//! # Security Guarantees
//! - All key material is automatically zeroized on drop
//! - No plaintext or key material is ever logged

pub mod seal;

pub use seal::{decrypt, encrypt, SecretKey, KEY_LENGTH, NONCE_SIZE, TAG_SIZE};
