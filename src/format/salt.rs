//! Salt record for password-derived keys.
//!
//! ```text
//! MAGIC (4) | VERSION (1) | MEM_COST (4) | TIME_COST (4) | PARALLELISM (4) | SALT (16)
//! ```
//!
//! Not secret. One record per device, created once and reused by every
//! password derivation on that device.

use crate::crypto::{self, KdfParams, SALT_LEN};
use crate::error::{Result, VaultError};

pub const MAGIC: &[u8; 4] = b"NVKD";
pub const VERSION_V1: u8 = 1;

const MAGIC_LEN: usize = 4;
const VER_LEN: usize = 1;
const MEM_LEN: usize = 4;
const TIME_LEN: usize = 4;
const PAR_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaltRecord {
    kdf: KdfParams,
    salt: [u8; SALT_LEN],
}

impl SaltRecord {
    pub const LEN: usize = MAGIC_LEN + VER_LEN + MEM_LEN + TIME_LEN + PAR_LEN + SALT_LEN;

    pub fn new(kdf: KdfParams, salt: [u8; SALT_LEN]) -> Self {
        Self { kdf, salt }
    }

    /// A record with a fresh random salt.
    pub fn generate(kdf: KdfParams) -> Result<Self> {
        Ok(Self::new(kdf, crypto::generate_salt()?))
    }

    pub fn kdf(&self) -> &KdfParams {
        &self.kdf
    }

    pub fn salt(&self) -> &[u8; SALT_LEN] {
        &self.salt
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::LEN);

        buf.extend_from_slice(MAGIC);
        buf.push(VERSION_V1);

        buf.extend_from_slice(&self.kdf.mem_cost_kib().to_le_bytes());
        buf.extend_from_slice(&self.kdf.time_cost().to_le_bytes());
        buf.extend_from_slice(&self.kdf.parallelism().to_le_bytes());

        buf.extend_from_slice(&self.salt);

        buf
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() != Self::LEN {
            return Err(VaultError::Format("salt record has wrong length".into()));
        }

        if &data[..MAGIC_LEN] != MAGIC {
            return Err(VaultError::Format("invalid salt record".into()));
        }

        let version = data[MAGIC_LEN];
        if version != VERSION_V1 {
            return Err(VaultError::Format(format!(
                "unsupported salt record version: {version}"
            )));
        }

        let mut offset = MAGIC_LEN + VER_LEN;
        let mem_cost_kib = read_u32(data, offset);
        offset += MEM_LEN;

        let time_cost = read_u32(data, offset);
        offset += TIME_LEN;

        let parallelism = read_u32(data, offset);
        offset += PAR_LEN;

        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&data[offset..offset + SALT_LEN]);

        Ok(Self {
            kdf: KdfParams::new(mem_cost_kib, time_cost, parallelism)?,
            salt,
        })
    }
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&data[offset..offset + 4]);
    u32::from_le_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_roundtrip() {
        let record = SaltRecord::new(KdfParams::new(65536, 3, 2).unwrap(), [1u8; 16]);

        let bytes = record.to_bytes();
        assert_eq!(bytes.len(), SaltRecord::LEN);

        let parsed = SaltRecord::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.kdf().mem_cost_kib(), 65536);
        assert_eq!(parsed.kdf().time_cost(), 3);
        assert_eq!(parsed.kdf().parallelism(), 2);
        assert_eq!(parsed.salt(), &[1u8; 16]);
    }

    #[test]
    fn invalid_magic_fails() {
        let mut data = vec![0u8; SaltRecord::LEN];
        data[..4].copy_from_slice(b"FAIL");
        assert!(SaltRecord::from_bytes(&data).is_err());
    }

    #[test]
    fn rejected_params_fail() {
        let mut bytes = SaltRecord::new(KdfParams::interactive(), [0u8; 16]).to_bytes();
        // time cost = 0
        bytes[9..13].copy_from_slice(&0u32.to_le_bytes());
        assert!(matches!(
            SaltRecord::from_bytes(&bytes),
            Err(VaultError::KeyDerivation(_))
        ));
    }

    #[test]
    fn generated_salts_differ() {
        let a = SaltRecord::generate(KdfParams::interactive()).unwrap();
        let b = SaltRecord::generate(KdfParams::interactive()).unwrap();
        assert_ne!(a.salt(), b.salt());
    }
}
