//! Blob format v1.
//!
//! ```text
//! MAGIC (4) | VERSION (1) | ALGORITHM (1) | NONCE (24 or 32) | CIPHERTEXT+TAG
//! ```

use super::{ALG_LEN, EncryptedBlob, MAGIC, MAGIC_LEN, VER_LEN};
use crate::crypto::{Algorithm, TAG_LEN};
use crate::error::{Result, VaultError};

/// Current blob format version.
pub const VERSION_V1: u8 = 1;

const PREFIX_LEN: usize = MAGIC_LEN + VER_LEN + ALG_LEN;

/// Parses a v1 blob.
///
/// # Errors
///
/// Returns an error if the data is too short for the recorded algorithm or
/// the algorithm id is unknown.
pub fn parse(data: &[u8]) -> Result<EncryptedBlob> {
    if data.len() < PREFIX_LEN {
        return Err(VaultError::Format("blob too short for v1".into()));
    }

    let algorithm = Algorithm::from_id(data[MAGIC_LEN + VER_LEN])?;
    let nonce_len = algorithm.nonce_len();

    if data.len() < PREFIX_LEN + nonce_len + TAG_LEN {
        return Err(VaultError::Format("blob too short for v1".into()));
    }

    let mut offset = PREFIX_LEN;
    let nonce = data[offset..offset + nonce_len].to_vec();
    offset += nonce_len;

    let ciphertext = data[offset..].to_vec();

    Ok(EncryptedBlob {
        version: VERSION_V1,
        algorithm,
        nonce,
        ciphertext,
    })
}

/// Serializes a blob to v1 bytes.
///
/// # Errors
///
/// Returns an error if the blob is not v1 or the nonce does not match the
/// algorithm.
pub fn serialize(blob: &EncryptedBlob) -> Result<Vec<u8>> {
    if blob.version() != VERSION_V1 {
        return Err(VaultError::Format("wrong version for v1 serializer".into()));
    }

    if blob.nonce().len() != blob.algorithm().nonce_len() {
        return Err(VaultError::Format("invalid nonce length for v1".into()));
    }

    let mut buf = Vec::with_capacity(PREFIX_LEN + blob.nonce().len() + blob.ciphertext().len());

    buf.extend_from_slice(MAGIC);
    buf.push(VERSION_V1);
    buf.push(blob.algorithm().id());
    buf.extend_from_slice(blob.nonce());
    buf.extend_from_slice(blob.ciphertext());

    Ok(buf)
}
