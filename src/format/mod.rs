//! On-disk formats.
//!
//! Provides version-aware parsing and serialization of encrypted blobs and
//! of the salt record used for password-derived keys.

use crate::crypto::{self, Algorithm, MasterKey};
use crate::error::{Result, VaultError};
use zeroize::Zeroizing;

pub mod salt;
pub mod v1;

pub use salt::SaltRecord;

/// Magic bytes identifying an encrypted blob ("NVBL").
pub const MAGIC: &[u8; 4] = b"NVBL";
/// Length of magic bytes.
pub const MAGIC_LEN: usize = 4;
/// Length of version field.
pub const VER_LEN: usize = 1;
/// Length of the algorithm field.
pub const ALG_LEN: usize = 1;
/// Latest format version
pub const CURRENT_VERSION: u8 = v1::VERSION_V1;

/// An authenticated ciphertext together with what is needed to open it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedBlob {
    version: u8,
    algorithm: Algorithm,
    nonce: Vec<u8>,
    ciphertext: Vec<u8>,
}

impl EncryptedBlob {
    /// Encrypt `plaintext` into a new blob with a fresh nonce.
    pub fn seal(algorithm: Algorithm, key: &MasterKey, plaintext: &[u8]) -> Result<Self> {
        let aad = header(CURRENT_VERSION, algorithm);
        let (nonce, ciphertext) = crypto::encrypt(algorithm, key, &aad, plaintext)?;
        Ok(Self {
            version: CURRENT_VERSION,
            algorithm,
            nonce,
            ciphertext,
        })
    }

    /// Decrypt with `key`, using the algorithm recorded in the blob.
    pub fn open(&self, key: &MasterKey) -> Result<Zeroizing<Vec<u8>>> {
        let aad = header(self.version, self.algorithm);
        crypto::decrypt(self.algorithm, key, &self.nonce, &aad, &self.ciphertext)
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn nonce(&self) -> &[u8] {
        &self.nonce
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }
}

/// Bytes bound as associated data: magic, version and algorithm id.
fn header(version: u8, algorithm: Algorithm) -> [u8; MAGIC_LEN + VER_LEN + ALG_LEN] {
    let mut aad = [0u8; MAGIC_LEN + VER_LEN + ALG_LEN];
    aad[..MAGIC_LEN].copy_from_slice(MAGIC);
    aad[MAGIC_LEN] = version;
    aad[MAGIC_LEN + VER_LEN] = algorithm.id();
    aad
}

/// Parses an encrypted blob.
///
/// Automatically dispatches to the appropriate version parser.
///
/// # Errors
///
/// Returns an error if:
/// - The data is too short
/// - The magic bytes are invalid
/// - The version is unsupported
pub fn parse(data: &[u8]) -> Result<EncryptedBlob> {
    if data.len() < MAGIC_LEN + VER_LEN {
        return Err(VaultError::Format("blob too short".into()));
    }

    if &data[..MAGIC_LEN] != MAGIC {
        return Err(VaultError::Format("invalid blob magic".into()));
    }

    match data[MAGIC_LEN] {
        v1::VERSION_V1 => v1::parse(data),
        other => Err(VaultError::Format(format!(
            "unsupported blob version {other}"
        ))),
    }
}

/// Serializes an encrypted blob to bytes.
pub fn serialize(blob: &EncryptedBlob) -> Result<Vec<u8>> {
    match blob.version() {
        v1::VERSION_V1 => v1::serialize(blob),
        other => Err(VaultError::Format(format!(
            "unsupported blob version {other}"
        ))),
    }
}
