//! Encrypted, device-local note storage.
//!
//! [`NoteVault`] is the session handle: it owns the persistence backend,
//! the master key and the encrypted store, and is what the editor talks to.
//!
//! ```text
//! open ─► provisioning mode ─► (unlock) ─► load ─► edit ─► save ─► ...
//! ```

pub mod config;
pub mod crypto;
pub mod error;
pub mod format;
pub mod keys;
pub mod share;
pub mod state;
pub mod storage;
pub mod transfer;
pub mod vault;

pub use crate::config::Config;
pub use crate::crypto::{Algorithm, KdfParams, MasterKey};
pub use crate::error::{Result, VaultError};
pub use crate::keys::{KeyState, ProvisioningMode};
pub use crate::state::{Folder, Note, StoredState, Tag};
pub use crate::storage::{FileStore, KeyValueStore, MemoryStore};
pub use crate::vault::LoadOutcome;

use crate::keys::KeyManager;
use crate::vault::EncryptedStore;

pub struct NoteVault<S: KeyValueStore> {
    storage: S,
    keys: KeyManager,
    store: EncryptedStore,
}

impl NoteVault<FileStore> {
    /// Open the store in `config.data_dir`.
    pub fn open_default(config: &Config) -> Result<Self> {
        Self::open(FileStore::new(&config.data_dir), config)
    }
}

impl<S: KeyValueStore> NoteVault<S> {
    /// Fix the AEAD choice for this process and resolve the provisioning mode.
    pub fn open(storage: S, config: &Config) -> Result<Self> {
        let algorithm = crypto::select::initialize(config.algorithm);
        Self::open_with_algorithm(storage, config, algorithm)
    }

    /// Like [`NoteVault::open`] with an explicit algorithm for new writes.
    pub fn open_with_algorithm(storage: S, config: &Config, algorithm: Algorithm) -> Result<Self> {
        let keys = KeyManager::open(&storage, config.kdf, algorithm)?;
        let store = EncryptedStore::new(algorithm).with_plaintext_fallback(config.allow_plaintext);
        if config.allow_plaintext {
            tracing::warn!("plaintext fallback is enabled");
        }

        Ok(Self {
            storage,
            keys,
            store,
        })
    }

    pub fn mode(&self) -> ProvisioningMode {
        self.keys.mode()
    }

    pub fn state(&self) -> KeyState {
        self.keys.state()
    }

    pub fn is_unlocked(&self) -> bool {
        self.keys.state() == KeyState::Unlocked
    }

    pub fn migration_pending(&self) -> bool {
        self.keys.migration_pending()
    }

    pub fn algorithm(&self) -> Algorithm {
        self.store.algorithm()
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// New device, no password: random key stored on the device.
    pub fn setup_random(&mut self) -> Result<()> {
        self.keys.setup_random(&self.storage)
    }

    /// New device protected by `password`.
    pub fn setup_password(&mut self, password: &str) -> Result<()> {
        self.keys.setup_password(&self.storage, password)
    }

    /// Unlock with `password`, finishing an interrupted migration if one is
    /// found.
    pub fn unlock(&mut self, password: &str) -> Result<()> {
        self.keys.unlock(&self.storage, password)?;

        if self.keys.migration_pending() {
            let store = &self.store;
            let storage = &self.storage;
            let result = self
                .keys
                .complete_migration(storage, |old, new| store.rekey(storage, old, new));
            if let Err(e) = result {
                // the next unlock retries; until then the session stays locked
                self.keys.lock();
                tracing::warn!(error = %e, "could not finish interrupted migration");
                return Err(e);
            }
        }
        Ok(())
    }

    /// Reload the key stored on a random-key device after [`NoteVault::lock`].
    pub fn unlock_stored_key(&mut self) -> Result<()> {
        self.keys.unlock_with_stored_key(&self.storage)
    }

    pub fn verify_password(&self, password: &str) -> Result<bool> {
        self.keys.verify_password(&self.storage, password)
    }

    pub fn lock(&mut self) {
        self.keys.lock();
    }

    pub fn load(&self) -> Result<LoadOutcome> {
        self.store.load(&self.storage, self.keys.key())
    }

    pub fn save(&self, state: &StoredState) -> Result<()> {
        self.store.save(&self.storage, self.keys.key(), state)
    }

    /// Replace the stored random key with one derived from `password`.
    ///
    /// Safe to call again after a failure; the legacy key is removed only
    /// once everything else succeeded.
    pub fn migrate_to_password(&mut self, password: &str) -> Result<()> {
        let store = &self.store;
        let storage = &self.storage;
        self.keys
            .migrate_legacy(storage, password, |old, new| store.rekey(storage, old, new))
    }

    /// Link carrying the current key in its fragment.
    pub fn share_link(&self, base_url: &str) -> Result<String> {
        Ok(share::link(base_url, self.keys.master_key()?))
    }

    /// Adopt the key from a shared link.
    ///
    /// Returns the URL with the key removed; the caller must replace the
    /// current history entry with it.
    ///
    /// Refused when notes stored on this device are sealed under a different
    /// key, since replacing the stored key would make them unreadable.
    pub fn adopt_shared_link(&mut self, url: &str) -> Result<String> {
        let (key, cleaned) = share::extract(url)?;
        if !self.store.readable_with(&self.storage, &key)? {
            return Err(VaultError::InvalidState(
                "notes on this device are sealed under a different key; export them before adopting a shared key".into(),
            ));
        }
        self.keys.adopt_key(&self.storage, key)?;
        Ok(cleaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::keys;

    fn config() -> Config {
        let mut config = Config::new("unused");
        config.kdf = KdfParams::new(1024, 1, 1).unwrap();
        config
    }

    fn open(kv: &MemoryStore) -> NoteVault<&MemoryStore> {
        NoteVault::open_with_algorithm(kv, &config(), Algorithm::XChaCha20Poly1305).unwrap()
    }

    #[test]
    fn fresh_install_loads_empty_state() {
        let kv = MemoryStore::new();
        let vault = open(&kv);
        assert_eq!(vault.state(), KeyState::Uninitialized);
        assert_eq!(vault.load().unwrap().state, StoredState::default());
    }

    #[test]
    fn locked_vault_refuses_to_save() {
        let kv = MemoryStore::new();
        let mut vault = open(&kv);
        vault.setup_password("pw").unwrap();
        vault.lock();

        let err = vault.save(&StoredState::new()).unwrap_err();
        assert!(err.needs_unlock());
        assert!(!kv.contains(keys::STATE_BLOB).unwrap());
    }

    #[test]
    fn migration_keeps_notes_readable() {
        let kv = MemoryStore::new();
        let mut vault = open(&kv);
        vault.setup_random().unwrap();

        let mut state = StoredState::new();
        state.add_note(Note::new("N1", "body")).unwrap();
        vault.save(&state).unwrap();

        vault.migrate_to_password("pw").unwrap();
        assert_eq!(vault.mode(), ProvisioningMode::Password);
        assert_eq!(vault.load().unwrap().state, state);

        let mut reopened = open(&kv);
        assert_eq!(reopened.state(), KeyState::Locked);
        reopened.unlock("pw").unwrap();
        assert_eq!(reopened.load().unwrap().state, state);
    }

    #[test]
    fn share_link_roundtrip_between_devices() {
        let a = MemoryStore::new();
        let mut device_a = open(&a);
        device_a.setup_random().unwrap();
        let link = device_a.share_link("https://notes.example/").unwrap();

        let b = MemoryStore::new();
        let mut device_b = open(&b);
        let cleaned = device_b.adopt_shared_link(&link).unwrap();

        assert_eq!(cleaned, "https://notes.example/");
        assert_eq!(device_b.mode(), ProvisioningMode::Legacy);
        assert!(device_b.is_unlocked());
    }

    #[test]
    fn adopting_foreign_key_keeps_existing_notes() {
        let a = MemoryStore::new();
        let mut device_a = open(&a);
        device_a.setup_random().unwrap();
        let link = device_a.share_link("https://x/").unwrap();

        let b = MemoryStore::new();
        let mut device_b = open(&b);
        device_b.setup_random().unwrap();
        let mut state = StoredState::new();
        state.add_note(Note::new("N1", "mine")).unwrap();
        device_b.save(&state).unwrap();
        let stored_key = b.get(keys::LEGACY_KEY).unwrap();

        assert!(matches!(
            device_b.adopt_shared_link(&link),
            Err(VaultError::InvalidState(_))
        ));
        assert_eq!(b.get(keys::LEGACY_KEY).unwrap(), stored_key);
        assert_eq!(open(&b).load().unwrap().state, state);
    }

    #[test]
    fn adopting_same_key_onto_synced_notes_is_allowed() {
        let a = MemoryStore::new();
        let mut device_a = open(&a);
        device_a.setup_random().unwrap();
        let mut state = StoredState::new();
        state.add_note(Note::new("N1", "")).unwrap();
        device_a.save(&state).unwrap();
        let link = device_a.share_link("https://x/").unwrap();

        let b = MemoryStore::new();
        b.set(keys::STATE_BLOB, &a.get(keys::STATE_BLOB).unwrap().unwrap())
            .unwrap();
        let mut device_b = open(&b);
        device_b.adopt_shared_link(&link).unwrap();
        assert_eq!(device_b.load().unwrap().state, state);
    }

    #[test]
    fn locked_password_vault_never_writes_plaintext() {
        let kv = MemoryStore::new();
        let mut config = config();
        config.allow_plaintext = true;
        let mut vault =
            NoteVault::open_with_algorithm(&kv, &config, Algorithm::XChaCha20Poly1305).unwrap();
        vault.setup_password("pw").unwrap();
        vault.lock();

        let mut state = StoredState::new();
        state.add_note(Note::new("secret-title", "secret body")).unwrap();
        assert!(matches!(
            vault.save(&state),
            Err(VaultError::NoKeyAvailable)
        ));
        assert_eq!(
            kv.keys(),
            vec![keys::SALT.to_string(), keys::VERIFICATION.to_string()]
        );
    }

    #[test]
    fn random_key_vault_can_unlock_after_lock() {
        let kv = MemoryStore::new();
        let mut vault = open(&kv);
        vault.setup_random().unwrap();
        vault.save(&StoredState::new()).unwrap();

        vault.lock();
        assert_eq!(vault.state(), KeyState::Locked);
        assert!(matches!(vault.load(), Err(VaultError::NoKeyAvailable)));

        vault.unlock_stored_key().unwrap();
        assert!(vault.load().is_ok());
    }
}
