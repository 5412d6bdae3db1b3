use aegis::aegis256::Aegis256;
use chacha20poly1305::{
    Key, XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit, Payload},
};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::{AEGIS_NONCE_LEN, MasterKey, SALT_LEN, TAG_LEN, XCHACHA_NONCE_LEN, secure_random};
use crate::error::{Result, VaultError};

/// Authenticated-encryption algorithms a blob can be sealed with.
///
/// The algorithm is recorded in every blob, so decryption never depends on
/// which algorithm the running process would pick for new writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    /// AEGIS-256, preferred on hosts with AES instructions.
    Aegis256,
    /// XChaCha20-Poly1305, constant-time in software.
    XChaCha20Poly1305,
}

impl Algorithm {
    pub const fn nonce_len(self) -> usize {
        match self {
            Algorithm::Aegis256 => AEGIS_NONCE_LEN,
            Algorithm::XChaCha20Poly1305 => XCHACHA_NONCE_LEN,
        }
    }

    /// Identifier stored in the blob header.
    pub const fn id(self) -> u8 {
        match self {
            Algorithm::Aegis256 => 1,
            Algorithm::XChaCha20Poly1305 => 2,
        }
    }

    pub fn from_id(id: u8) -> Result<Self> {
        match id {
            1 => Ok(Algorithm::Aegis256),
            2 => Ok(Algorithm::XChaCha20Poly1305),
            other => Err(VaultError::Format(format!("unknown algorithm id {other}"))),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Algorithm::Aegis256 => "aegis256",
            Algorithm::XChaCha20Poly1305 => "xchacha20poly1305",
        }
    }
}

impl std::str::FromStr for Algorithm {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aegis256" | "aegis-256" => Ok(Algorithm::Aegis256),
            "xchacha20poly1305" | "xchacha20-poly1305" | "xchacha" => {
                Ok(Algorithm::XChaCha20Poly1305)
            }
            other => Err(VaultError::InvalidState(format!(
                "unknown AEAD algorithm '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Generate salt
pub fn generate_salt() -> Result<[u8; SALT_LEN]> {
    let mut salt = [0u8; SALT_LEN];
    secure_random(&mut salt)?;
    Ok(salt)
}

/// Encrypt plaintext under `key`, binding `aad`.
///
/// The nonce is drawn from the OS generator inside this call and returned
/// alongside the ciphertext; callers cannot supply one.
pub fn encrypt(
    algorithm: Algorithm,
    key: &MasterKey,
    aad: &[u8],
    plaintext: &[u8],
) -> Result<(Vec<u8>, Vec<u8>)> {
    match algorithm {
        Algorithm::Aegis256 => {
            let mut nonce = [0u8; AEGIS_NONCE_LEN];
            secure_random(&mut nonce)?;

            let (mut ciphertext, tag) =
                Aegis256::<TAG_LEN>::new(key.as_bytes(), &nonce).encrypt(plaintext, aad);
            ciphertext.extend_from_slice(&tag);

            Ok((nonce.to_vec(), ciphertext))
        }
        Algorithm::XChaCha20Poly1305 => {
            let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));

            let mut nonce = [0u8; XCHACHA_NONCE_LEN];
            secure_random(&mut nonce)?;

            let ciphertext = cipher
                .encrypt(
                    XNonce::from_slice(&nonce),
                    Payload {
                        msg: plaintext,
                        aad,
                    },
                )
                .map_err(|_| VaultError::Format("encryption failed".into()))?;

            Ok((nonce.to_vec(), ciphertext))
        }
    }
}

/// Decrypt ciphertext
///
/// Fails closed: any mismatch, including a nonce of the wrong length,
/// yields [`VaultError::AuthenticationFailure`] and no plaintext.
pub fn decrypt(
    algorithm: Algorithm,
    key: &MasterKey,
    nonce: &[u8],
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
    if nonce.len() != algorithm.nonce_len() || ciphertext.len() < TAG_LEN {
        return Err(VaultError::AuthenticationFailure);
    }

    let plaintext = match algorithm {
        Algorithm::Aegis256 => {
            let nonce: [u8; AEGIS_NONCE_LEN] = nonce
                .try_into()
                .map_err(|_| VaultError::AuthenticationFailure)?;
            let (body, tag) = ciphertext.split_at(ciphertext.len() - TAG_LEN);
            let tag: [u8; TAG_LEN] = tag
                .try_into()
                .map_err(|_| VaultError::AuthenticationFailure)?;

            Aegis256::<TAG_LEN>::new(key.as_bytes(), &nonce)
                .decrypt(body, &tag, aad)
                .map_err(|_| VaultError::AuthenticationFailure)?
        }
        Algorithm::XChaCha20Poly1305 => {
            let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
            cipher
                .decrypt(
                    XNonce::from_slice(nonce),
                    Payload {
                        msg: ciphertext,
                        aad,
                    },
                )
                .map_err(|_| VaultError::AuthenticationFailure)?
        }
    };

    Ok(Zeroizing::new(plaintext))
}
