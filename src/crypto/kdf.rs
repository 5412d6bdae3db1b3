use argon2::{Algorithm, Argon2, Params, Version};
use zeroize::Zeroizing;

use super::{KEY_LEN, MasterKey};
use crate::error::{Result, VaultError};

/// Argon2id cost parameters.
///
/// Persisted next to the salt, so a key derived today can still be
/// re-derived after the defaults change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    mem_cost_kib: u32,
    time_cost: u32,
    parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::interactive()
    }
}

impl KdfParams {
    /// Interactive tier: sub-second unlock on desktop hardware.
    pub const fn interactive() -> Self {
        Self {
            mem_cost_kib: 64 * 1024, // 64 MiB
            time_cost: 2,
            parallelism: 1,
        }
    }

    pub fn new(mem_cost_kib: u32, time_cost: u32, parallelism: u32) -> Result<Self> {
        let params = Self {
            mem_cost_kib,
            time_cost,
            parallelism,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn mem_cost_kib(&self) -> u32 {
        self.mem_cost_kib
    }

    pub fn time_cost(&self) -> u32 {
        self.time_cost
    }

    pub fn parallelism(&self) -> u32 {
        self.parallelism
    }

    pub fn validate(&self) -> Result<()> {
        if self.time_cost < 1 {
            return Err(kdf_error("argon2 time cost must be >= 1"));
        }
        if self.parallelism < 1 {
            return Err(kdf_error("argon2 parallelism must be >= 1"));
        }
        if self.mem_cost_kib < 8 * self.parallelism {
            return Err(kdf_error("argon2 memory cost must be at least 8 * parallelism"));
        }
        Ok(())
    }
}

fn kdf_error(msg: &str) -> VaultError {
    VaultError::KeyDerivation(msg.to_string())
}

/// Derive a master key from a password.
///
/// Pure: the same password, salt and parameters always give the same key.
/// This is the one deliberately slow operation in the crate.
pub fn derive_key(password: &str, salt: &[u8], kdf: KdfParams) -> Result<MasterKey> {
    kdf.validate()?;

    let params = Params::new(
        kdf.mem_cost_kib,
        kdf.time_cost,
        kdf.parallelism,
        Some(KEY_LEN),
    )
    .map_err(|e| VaultError::KeyDerivation(format!("failed to construct Argon2 params: {e}")))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut key[..])
        .map_err(|e| VaultError::KeyDerivation(format!("argon2 key derivation failed {e}")))?;

    tracing::debug!(
        mem_kib = kdf.mem_cost_kib,
        time = kdf.time_cost,
        "derived password key"
    );

    Ok(MasterKey::from_bytes(*key))
}
