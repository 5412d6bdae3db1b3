//! Encrypted persistence of the application state.

use zeroize::Zeroizing;

use crate::crypto::{Algorithm, MasterKey};
use crate::error::{Result, VaultError};
use crate::format::{self, EncryptedBlob};
use crate::state::StoredState;
use crate::storage::{KeyValueStore, keys};

/// Result of [`EncryptedStore::load`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOutcome {
    pub state: StoredState,
    /// The state came from the legacy plaintext copy and will be encrypted
    /// by the next save.
    pub pending_reencryption: bool,
}

/// Seals [`StoredState`] into a single blob slot.
///
/// Every save uses a fresh nonce and the algorithm fixed for this process.
/// Loads use whatever algorithm the blob records.
#[derive(Debug, Clone)]
pub struct EncryptedStore {
    algorithm: Algorithm,
    allow_plaintext: bool,
}

impl EncryptedStore {
    pub fn new(algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            allow_plaintext: false,
        }
    }

    /// Permit unencrypted writes when no key exists at all.
    ///
    /// Only for hosts where no key can be obtained. Every such write is
    /// logged at warn level.
    pub fn with_plaintext_fallback(mut self, allow: bool) -> Self {
        self.allow_plaintext = allow;
        self
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn allows_plaintext(&self) -> bool {
        self.allow_plaintext
    }

    /// Encrypt and persist `state`, then drop any legacy plaintext copy.
    ///
    /// The caller keeps `state`; a failed write loses nothing in memory.
    pub fn save(
        &self,
        kv: &dyn KeyValueStore,
        key: Option<&MasterKey>,
        state: &StoredState,
    ) -> Result<()> {
        let Some(key) = key else {
            return self.save_plaintext(kv, state);
        };

        let plaintext = Zeroizing::new(serde_json::to_vec(state)?);
        let blob = EncryptedBlob::seal(self.algorithm, key, &plaintext)?;
        kv.set(keys::STATE_BLOB, &format::serialize(&blob)?)?;

        if kv.contains(keys::LEGACY_STATE)? {
            kv.delete(keys::LEGACY_STATE)?;
            tracing::info!("removed legacy plaintext state after encrypted write");
        }

        tracing::debug!(
            algorithm = %self.algorithm,
            notes = state.notes.len(),
            "saved encrypted state"
        );
        Ok(())
    }

    fn save_plaintext(&self, kv: &dyn KeyValueStore, state: &StoredState) -> Result<()> {
        if !self.allow_plaintext {
            return Err(VaultError::NoKeyAvailable);
        }
        // only a device with no key material at all may degrade; a locked
        // one must be unlocked, and a blob would shadow the plaintext copy
        for key in [keys::VERIFICATION, keys::LEGACY_KEY, keys::STATE_BLOB] {
            if kv.contains(key)? {
                return Err(VaultError::NoKeyAvailable);
            }
        }

        tracing::warn!("no master key: writing notes UNENCRYPTED (plaintext fallback enabled)");
        kv.set(keys::LEGACY_STATE, &serde_json::to_vec(state)?)
    }

    /// Read the state.
    ///
    /// - blob present: decrypt it; failure is [`VaultError::UnreadableStore`]
    ///   and the blob is left untouched
    /// - only the legacy plaintext copy: return it, flagged for re-encryption
    /// - nothing: an empty state
    pub fn load(&self, kv: &dyn KeyValueStore, key: Option<&MasterKey>) -> Result<LoadOutcome> {
        if let Some(blob) = read_blob(kv)? {
            let key = key.ok_or(VaultError::NoKeyAvailable)?;
            let state = open_state(&blob, key)?;
            return Ok(LoadOutcome {
                state,
                pending_reencryption: false,
            });
        }

        match kv.get(keys::LEGACY_STATE)? {
            Some(bytes) => {
                let state = serde_json::from_slice(&bytes).map_err(|e| {
                    tracing::warn!(error = %e, "legacy plaintext state is malformed");
                    VaultError::UnreadableStore
                })?;
                tracing::info!("loaded legacy plaintext state; pending re-encryption");
                Ok(LoadOutcome {
                    state,
                    pending_reencryption: true,
                })
            }
            None => Ok(LoadOutcome {
                state: StoredState::default(),
                pending_reencryption: false,
            }),
        }
    }

    /// Whether the stored state (if any) opens under `key`.
    pub fn readable_with(&self, kv: &dyn KeyValueStore, key: &MasterKey) -> Result<bool> {
        match read_blob(kv)? {
            Some(blob) => Ok(blob.open(key).is_ok()),
            None => Ok(true),
        }
    }

    /// Re-encrypt the stored blob from `old` to `new`.
    ///
    /// A blob that already opens under `new` is left alone, so an
    /// interrupted re-key can be repeated.
    pub fn rekey(&self, kv: &dyn KeyValueStore, old: &MasterKey, new: &MasterKey) -> Result<()> {
        let Some(blob) = read_blob(kv)? else {
            return Ok(());
        };

        if blob.open(new).is_ok() {
            tracing::debug!("state already sealed under the new key");
            return Ok(());
        }

        let plaintext = blob.open(old).map_err(|_| VaultError::UnreadableStore)?;
        let resealed = EncryptedBlob::seal(self.algorithm, new, &plaintext)?;
        kv.set(keys::STATE_BLOB, &format::serialize(&resealed)?)?;

        tracing::info!("re-encrypted state under new key");
        Ok(())
    }
}

fn read_blob(kv: &dyn KeyValueStore) -> Result<Option<EncryptedBlob>> {
    match kv.get(keys::STATE_BLOB)? {
        Some(bytes) => format::parse(&bytes).map(Some).map_err(|e| {
            tracing::warn!(error = %e, "state blob is malformed");
            VaultError::UnreadableStore
        }),
        None => Ok(None),
    }
}

fn open_state(blob: &EncryptedBlob, key: &MasterKey) -> Result<StoredState> {
    let plaintext = blob.open(key).map_err(|e| match e {
        VaultError::AuthenticationFailure => VaultError::UnreadableStore,
        other => other,
    })?;
    serde_json::from_slice(&plaintext).map_err(|_| VaultError::UnreadableStore)
}
