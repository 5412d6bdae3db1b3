//! Cryptographic primitives for the note vault.
//!
//! Provides key generation, password-based key derivation, the two supported
//! AEAD algorithms and the process-wide algorithm selection.

pub mod aead;
pub mod kdf;
pub mod key;
pub mod select;

pub use aead::{Algorithm, decrypt, encrypt, generate_salt};
pub use kdf::{KdfParams, derive_key};
pub use key::MasterKey;

/// Length of the salt (16 bytes).
pub const SALT_LEN: usize = 16;
/// Length of the master key (32 bytes / 256 bits).
pub const KEY_LEN: usize = 32;
/// Length of the authentication tag appended to every ciphertext.
pub const TAG_LEN: usize = 16;
/// Nonce length for AEGIS-256.
pub const AEGIS_NONCE_LEN: usize = 32;
/// Nonce length for XChaCha20-Poly1305.
pub const XCHACHA_NONCE_LEN: usize = 24;

use crate::error::{Result, VaultError};

/// Fill buffer with cryptographically secure random bytes
pub(crate) fn secure_random(buf: &mut [u8]) -> Result<()> {
    getrandom::fill(buf).map_err(|_| VaultError::Random)
}
