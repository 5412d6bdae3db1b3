//! Master key lifecycle.
//!
//! Three generations of key management can be found on disk:
//!
//! ```text
//! key.verify present  -> Password  (key derived from a password, salt in key.salt)
//! key.legacy present  -> Legacy    (random key stored directly, eligible for migration)
//! neither             -> Fresh     (new install)
//! ```
//!
//! The mode is resolved once when the manager is opened. `key.verify` wins,
//! so a leftover `key.legacy` next to it means a migration was interrupted
//! before its commit point (deleting `key.legacy`).

use zeroize::Zeroizing;

use crate::crypto::{self, Algorithm, KdfParams, MasterKey};
use crate::error::{Result, VaultError};
use crate::format::{self, EncryptedBlob, SaltRecord};
use crate::share;
use crate::storage::{KeyValueStore, keys};

/// Plaintext sealed into the verification record.
pub const VERIFICATION_PLAINTEXT: &[u8] = b"notevault:verify:v1";

/// Which key-management generation this device uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningMode {
    Password,
    Legacy,
    Fresh,
}

impl ProvisioningMode {
    pub fn detect(kv: &dyn KeyValueStore) -> Result<Self> {
        if kv.contains(keys::VERIFICATION)? {
            Ok(ProvisioningMode::Password)
        } else if kv.contains(keys::LEGACY_KEY)? {
            Ok(ProvisioningMode::Legacy)
        } else {
            Ok(ProvisioningMode::Fresh)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Uninitialized,
    Locked,
    Unlocked,
}

/// Owns the in-memory master key.
pub struct KeyManager {
    mode: ProvisioningMode,
    key: Option<MasterKey>,
    kdf: KdfParams,
    algorithm: Algorithm,
    migration_pending: bool,
}

impl KeyManager {
    /// Resolve the provisioning mode. Legacy devices come up unlocked with
    /// their stored key; password devices come up locked.
    pub fn open(kv: &dyn KeyValueStore, kdf: KdfParams, algorithm: Algorithm) -> Result<Self> {
        let mode = ProvisioningMode::detect(kv)?;
        let mut manager = Self {
            mode,
            key: None,
            kdf,
            algorithm,
            migration_pending: false,
        };

        match mode {
            ProvisioningMode::Legacy => manager.unlock_with_stored_key(kv)?,
            ProvisioningMode::Password => {
                manager.migration_pending = kv.contains(keys::LEGACY_KEY)?;
                if manager.migration_pending {
                    tracing::warn!("found legacy key next to password record; migration incomplete");
                }
            }
            ProvisioningMode::Fresh => {}
        }

        tracing::info!(?mode, "key manager opened");
        Ok(manager)
    }

    pub fn mode(&self) -> ProvisioningMode {
        self.mode
    }

    pub fn state(&self) -> KeyState {
        match (&self.key, self.mode) {
            (Some(_), _) => KeyState::Unlocked,
            (None, ProvisioningMode::Fresh) => KeyState::Uninitialized,
            (None, _) => KeyState::Locked,
        }
    }

    pub fn migration_pending(&self) -> bool {
        self.migration_pending
    }

    pub fn key(&self) -> Option<&MasterKey> {
        self.key.as_ref()
    }

    /// The active key, or [`VaultError::NoKeyAvailable`].
    pub fn master_key(&self) -> Result<&MasterKey> {
        self.key.as_ref().ok_or(VaultError::NoKeyAvailable)
    }

    /// First run without a password: generate a random key and store it.
    pub fn setup_random(&mut self, kv: &dyn KeyValueStore) -> Result<()> {
        self.require_mode(ProvisioningMode::Fresh, "setup")?;

        let key = MasterKey::generate()?;
        self.install_legacy_key(kv, key)?;

        tracing::info!("provisioned random master key");
        Ok(())
    }

    /// First run with a password: persist only the salt record and the
    /// verification record.
    pub fn setup_password(&mut self, kv: &dyn KeyValueStore, password: &str) -> Result<()> {
        self.require_mode(ProvisioningMode::Fresh, "setup")?;

        let record = self.salt_record(kv)?;
        let key = crypto::derive_key(password, record.salt(), *record.kdf())?;

        self.write_verification(kv, &key)?;
        self.key = Some(key);
        self.mode = ProvisioningMode::Password;

        tracing::info!("provisioned password-derived master key");
        Ok(())
    }

    /// Install a key received from a shareable link as this device's key.
    pub fn adopt_key(&mut self, kv: &dyn KeyValueStore, key: MasterKey) -> Result<()> {
        if self.mode == ProvisioningMode::Password {
            return Err(VaultError::InvalidState(
                "cannot adopt a key on a password-protected device".into(),
            ));
        }

        self.install_legacy_key(kv, key)?;
        tracing::info!("adopted shared master key");
        Ok(())
    }

    /// Locked -> Unlocked for password devices.
    ///
    /// Fails with [`VaultError::WrongPassword`] and stays locked when the
    /// derived key does not open the verification record.
    pub fn unlock(&mut self, kv: &dyn KeyValueStore, password: &str) -> Result<()> {
        self.require_mode(ProvisioningMode::Password, "password unlock")?;

        let key = self.derive_verified(kv, password)?;
        if let Some(mut previous) = self.key.replace(key) {
            previous.clear();
        }

        tracing::info!("unlocked");
        Ok(())
    }

    /// Unlock a legacy device from its stored key.
    pub fn unlock_with_stored_key(&mut self, kv: &dyn KeyValueStore) -> Result<()> {
        self.require_mode(ProvisioningMode::Legacy, "stored-key unlock")?;

        let key = load_legacy_key(kv)?
            .ok_or_else(|| VaultError::InvalidState("legacy key disappeared".into()))?;
        self.key = Some(key);
        Ok(())
    }

    /// Check a password without changing state.
    pub fn verify_password(&self, kv: &dyn KeyValueStore, password: &str) -> Result<bool> {
        self.require_mode(ProvisioningMode::Password, "password check")?;

        match self.derive_verified(kv, password) {
            Ok(_) => Ok(true),
            Err(VaultError::WrongPassword) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Unlocked -> Locked. Zeroes the key; nothing persisted changes.
    pub fn lock(&mut self) {
        if let Some(mut key) = self.key.take() {
            key.clear();
            tracing::info!("locked");
        }
    }

    /// Move a legacy device to a password-derived key.
    ///
    /// `rekey(old, new)` must re-encrypt the stored state under `new`. The
    /// legacy key artifact is deleted last; if anything before that fails it
    /// stays, and calling this again with the same password resumes.
    ///
    /// Once the verification record is written the device is in `Password`
    /// mode with the migration pending, even on failure. If `rekey` fails the
    /// session keeps the legacy key, which still opens the stored state.
    pub fn migrate_legacy<F>(&mut self, kv: &dyn KeyValueStore, password: &str, rekey: F) -> Result<()>
    where
        F: FnOnce(&MasterKey, &MasterKey) -> Result<()>,
    {
        match self.mode {
            ProvisioningMode::Legacy => {}
            ProvisioningMode::Password if self.migration_pending => {
                self.unlock(kv, password)?;
                return self.complete_migration(kv, rekey);
            }
            _ => {
                return Err(VaultError::InvalidState(
                    "no legacy key to migrate".into(),
                ));
            }
        }

        let legacy = load_legacy_key(kv)?
            .ok_or_else(|| VaultError::InvalidState("no legacy key to migrate".into()))?;
        self.key = Some(legacy);

        let record = self.salt_record(kv)?;
        let new_key = crypto::derive_key(password, record.salt(), *record.kdf())?;

        match read_verification(kv)? {
            Some(blob) => check_verification(&blob, &new_key)?,
            None => self.write_verification(kv, &new_key)?,
        }
        self.mode = ProvisioningMode::Password;
        self.migration_pending = true;

        if let Some(mut old) = self.key.replace(new_key) {
            let result = rekey(&old, self.master_key()?);
            if let Err(e) = result {
                // keep the session readable with the key the state is still under
                if let Some(mut new_key) = self.key.replace(old) {
                    new_key.clear();
                }
                tracing::warn!(error = %e, "migration re-encryption failed; legacy key kept");
                return Err(e);
            }
            old.clear();
        }

        self.delete_legacy_key(kv)
    }

    /// Finish an interrupted migration using the already unlocked key.
    pub fn complete_migration<F>(&mut self, kv: &dyn KeyValueStore, rekey: F) -> Result<()>
    where
        F: FnOnce(&MasterKey, &MasterKey) -> Result<()>,
    {
        if !self.migration_pending {
            return Ok(());
        }

        let current = self.master_key()?;
        match load_legacy_key(kv)? {
            Some(mut legacy) => {
                rekey(&legacy, current)?;
                legacy.clear();
            }
            None => {
                self.migration_pending = false;
                return Ok(());
            }
        }

        self.delete_legacy_key(kv)
    }

    fn delete_legacy_key(&mut self, kv: &dyn KeyValueStore) -> Result<()> {
        kv.delete(keys::LEGACY_KEY)?;
        self.migration_pending = false;
        tracing::info!("legacy key removed; migration committed");
        Ok(())
    }

    fn install_legacy_key(&mut self, kv: &dyn KeyValueStore, key: MasterKey) -> Result<()> {
        let token = Zeroizing::new(share::encode_key(&key));
        kv.set(keys::LEGACY_KEY, token.as_bytes())?;

        if let Some(mut previous) = self.key.replace(key) {
            previous.clear();
        }
        self.mode = ProvisioningMode::Legacy;
        Ok(())
    }

    fn derive_verified(&self, kv: &dyn KeyValueStore, password: &str) -> Result<MasterKey> {
        let record = load_salt_record(kv)?
            .ok_or_else(|| VaultError::InvalidState("salt record missing".into()))?;
        let blob = read_verification(kv)?
            .ok_or_else(|| VaultError::InvalidState("verification record missing".into()))?;

        let key = crypto::derive_key(password, record.salt(), *record.kdf())?;
        check_verification(&blob, &key)?;
        Ok(key)
    }

    /// The device salt record, created and persisted on first use.
    fn salt_record(&self, kv: &dyn KeyValueStore) -> Result<SaltRecord> {
        if let Some(record) = load_salt_record(kv)? {
            return Ok(record);
        }

        let record = SaltRecord::generate(self.kdf)?;
        kv.set(keys::SALT, &record.to_bytes())?;
        tracing::debug!("created device salt");
        Ok(record)
    }

    fn write_verification(&self, kv: &dyn KeyValueStore, key: &MasterKey) -> Result<()> {
        let blob = EncryptedBlob::seal(self.algorithm, key, VERIFICATION_PLAINTEXT)?;
        kv.set(keys::VERIFICATION, &format::serialize(&blob)?)
    }

    fn require_mode(&self, expected: ProvisioningMode, action: &str) -> Result<()> {
        if self.mode == expected {
            Ok(())
        } else {
            Err(VaultError::InvalidState(format!(
                "{action} requires {expected:?} mode, device is in {:?} mode",
                self.mode
            )))
        }
    }
}

impl Drop for KeyManager {
    fn drop(&mut self) {
        self.lock();
    }
}

fn load_salt_record(kv: &dyn KeyValueStore) -> Result<Option<SaltRecord>> {
    kv.get(keys::SALT)?
        .map(|bytes| SaltRecord::from_bytes(&bytes))
        .transpose()
}

fn read_verification(kv: &dyn KeyValueStore) -> Result<Option<EncryptedBlob>> {
    kv.get(keys::VERIFICATION)?
        .map(|bytes| format::parse(&bytes))
        .transpose()
}

fn load_legacy_key(kv: &dyn KeyValueStore) -> Result<Option<MasterKey>> {
    match kv.get(keys::LEGACY_KEY)? {
        Some(bytes) => {
            let bytes = Zeroizing::new(bytes);
            let token = std::str::from_utf8(&bytes)
                .map_err(|_| VaultError::Format("legacy key is not text".into()))?;
            Ok(Some(share::decode_key(token)?))
        }
        None => Ok(None),
    }
}

fn check_verification(blob: &EncryptedBlob, key: &MasterKey) -> Result<()> {
    match blob.open(key) {
        Ok(plaintext) if plaintext.as_slice() == VERIFICATION_PLAINTEXT => Ok(()),
        Ok(_) | Err(VaultError::AuthenticationFailure) => Err(VaultError::WrongPassword),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn cheap() -> KdfParams {
        KdfParams::new(1024, 1, 1).unwrap()
    }

    fn open(kv: &MemoryStore) -> KeyManager {
        KeyManager::open(kv, cheap(), Algorithm::XChaCha20Poly1305).unwrap()
    }

    #[test]
    fn empty_store_is_fresh_and_uninitialized() {
        let kv = MemoryStore::new();
        let km = open(&kv);
        assert_eq!(km.mode(), ProvisioningMode::Fresh);
        assert_eq!(km.state(), KeyState::Uninitialized);
        assert!(matches!(km.master_key(), Err(VaultError::NoKeyAvailable)));
    }

    #[test]
    fn random_setup_reopens_unlocked() {
        let kv = MemoryStore::new();
        let mut km = open(&kv);
        km.setup_random(&kv).unwrap();
        let key = km.master_key().unwrap().clone();

        let km2 = open(&kv);
        assert_eq!(km2.mode(), ProvisioningMode::Legacy);
        assert_eq!(km2.state(), KeyState::Unlocked);
        assert_eq!(km2.master_key().unwrap(), &key);
    }

    #[test]
    fn password_setup_persists_no_key() {
        let kv = MemoryStore::new();
        let mut km = open(&kv);
        km.setup_password(&kv, "pw").unwrap();

        assert_eq!(
            kv.keys(),
            vec![keys::SALT.to_string(), keys::VERIFICATION.to_string()]
        );

        let km2 = open(&kv);
        assert_eq!(km2.mode(), ProvisioningMode::Password);
        assert_eq!(km2.state(), KeyState::Locked);
    }

    #[test]
    fn unlock_with_right_and_wrong_password() {
        let kv = MemoryStore::new();
        let mut km = open(&kv);
        km.setup_password(&kv, "correct-horse-battery").unwrap();
        let expected = km.master_key().unwrap().clone();

        let mut km2 = open(&kv);
        assert!(matches!(
            km2.unlock(&kv, "wrong-password"),
            Err(VaultError::WrongPassword)
        ));
        assert_eq!(km2.state(), KeyState::Locked);

        km2.unlock(&kv, "correct-horse-battery").unwrap();
        assert_eq!(km2.master_key().unwrap(), &expected);
    }

    #[test]
    fn verify_password_does_not_unlock() {
        let kv = MemoryStore::new();
        let mut km = open(&kv);
        km.setup_password(&kv, "pw").unwrap();

        let km2 = open(&kv);
        assert!(km2.verify_password(&kv, "pw").unwrap());
        assert!(!km2.verify_password(&kv, "nope").unwrap());
        assert_eq!(km2.state(), KeyState::Locked);
    }

    #[test]
    fn lock_clears_key() {
        let kv = MemoryStore::new();
        let mut km = open(&kv);
        km.setup_password(&kv, "pw").unwrap();
        km.lock();

        assert_eq!(km.state(), KeyState::Locked);
        assert!(km.key().is_none());
        assert_eq!(kv.keys().len(), 2);
    }

    #[test]
    fn setup_twice_fails() {
        let kv = MemoryStore::new();
        let mut km = open(&kv);
        km.setup_password(&kv, "pw").unwrap();
        assert!(matches!(
            km.setup_random(&kv),
            Err(VaultError::InvalidState(_))
        ));
    }

    #[test]
    fn salt_is_reused_after_aborted_setup() {
        let kv = MemoryStore::new();
        let record = SaltRecord::generate(cheap()).unwrap();
        kv.set(keys::SALT, &record.to_bytes()).unwrap();

        let mut km = open(&kv);
        km.setup_password(&kv, "pw").unwrap();

        let stored = SaltRecord::from_bytes(&kv.get(keys::SALT).unwrap().unwrap()).unwrap();
        assert_eq!(stored.salt(), record.salt());
    }

    #[test]
    fn migration_switches_key_and_deletes_legacy() {
        let kv = MemoryStore::new();
        let mut km = open(&kv);
        km.setup_random(&kv).unwrap();
        let legacy = km.master_key().unwrap().clone();

        let mut seen = None;
        km.migrate_legacy(&kv, "pw", |old, new| {
            seen = Some((old.clone(), new.clone()));
            Ok(())
        })
        .unwrap();

        let (old, new) = seen.unwrap();
        assert_eq!(old, legacy);
        assert_ne!(new, legacy);
        assert_eq!(km.master_key().unwrap(), &new);
        assert_eq!(km.mode(), ProvisioningMode::Password);
        assert!(!kv.contains(keys::LEGACY_KEY).unwrap());
    }

    #[test]
    fn failed_rekey_keeps_legacy_key() {
        let kv = MemoryStore::new();
        let mut km = open(&kv);
        km.setup_random(&kv).unwrap();
        let legacy = km.master_key().unwrap().clone();

        let err = km
            .migrate_legacy(&kv, "pw", |_, _| Err(VaultError::Persistence("disk full".into())))
            .unwrap_err();
        assert!(matches!(err, VaultError::Persistence(_)));
        assert!(kv.contains(keys::LEGACY_KEY).unwrap());
        assert_eq!(km.master_key().unwrap(), &legacy);
        assert_eq!(km.mode(), ProvisioningMode::Password);
        assert_eq!(km.state(), KeyState::Unlocked);
        assert!(km.migration_pending());

        // resuming in the same session finishes the job
        km.migrate_legacy(&kv, "pw", |old, _| {
            assert_eq!(old, &legacy);
            Ok(())
        })
        .unwrap();
        assert!(!km.migration_pending());
        assert!(!kv.contains(keys::LEGACY_KEY).unwrap());
    }

    #[test]
    fn failed_rekey_reopens_as_pending() {
        let kv = MemoryStore::new();
        let mut km = open(&kv);
        km.setup_random(&kv).unwrap();
        let _ = km.migrate_legacy(&kv, "pw", |_, _| Err(VaultError::Persistence("disk full".into())));

        let mut km2 = open(&kv);
        assert_eq!(km2.mode(), ProvisioningMode::Password);
        assert!(km2.migration_pending());

        km2.migrate_legacy(&kv, "pw", |_, _| Ok(())).unwrap();
        assert!(!km2.migration_pending());
        assert!(!kv.contains(keys::LEGACY_KEY).unwrap());
    }

    #[test]
    fn resumed_migration_rejects_other_password() {
        let kv = MemoryStore::new();
        let mut km = open(&kv);
        km.setup_random(&kv).unwrap();
        let _ = km.migrate_legacy(&kv, "pw", |_, _| Err(VaultError::Random));

        let mut km2 = open(&kv);
        assert!(matches!(
            km2.migrate_legacy(&kv, "other", |_, _| Ok(())),
            Err(VaultError::WrongPassword)
        ));
        assert!(kv.contains(keys::LEGACY_KEY).unwrap());
    }

    #[test]
    fn adopt_key_on_password_device_fails() {
        let kv = MemoryStore::new();
        let mut km = open(&kv);
        km.setup_password(&kv, "pw").unwrap();
        let key = MasterKey::generate().unwrap();
        assert!(km.adopt_key(&kv, key).is_err());
    }
}
