//! Persistence backends.
//!
//! The vault only needs get/set/delete on a handful of string keys.
//! [`FileStore`] keeps one file per key in a directory; [`MemoryStore`]
//! keeps everything in a map.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::crypto::secure_random;
use crate::error::{Result, VaultError};

/// Key names used in the backing store.
pub mod keys {
    /// Encrypted application state.
    pub const STATE_BLOB: &str = "state.blob";
    /// Unencrypted application state from before encryption was enabled.
    pub const LEGACY_STATE: &str = "state.json";
    /// Salt and Argon2 parameters.
    pub const SALT: &str = "key.salt";
    /// Blob proving a password-derived key is correct.
    pub const VERIFICATION: &str = "key.verify";
    /// Random master key stored directly (legacy generation).
    pub const LEGACY_KEY: &str = "key.legacy";
}

/// Minimal key-value persistence the vault depends on.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    fn set(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Removing a missing key is not an error.
    fn delete(&self, key: &str) -> Result<()>;

    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for &T {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        (**self).set(key, value)
    }

    fn delete(&self, key: &str) -> Result<()> {
        (**self).delete(key)
    }
}

/// A directory of files, one per key.
///
/// Writes are atomic: data goes to a temporary file which then replaces
/// the target.
#[derive(Clone, Debug)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Creates a new FileStore rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the directory holding the files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
        if !valid {
            return Err(VaultError::Persistence(format!("invalid storage key '{key}'")));
        }
        Ok(self.dir.join(key))
    }

    /// Writes data to `path` using atomic replace.
    ///
    /// 1. Write to a temporary file with a random name
    /// 2. Sync the temporary file to disk
    /// 3. Atomically replace the target with it
    /// 4. Sync the directory so the rename is persisted
    ///
    /// A crash leaves either the old or the new file, never a partial one.
    fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.dir)?;

        let tmp_path = random_tmp_path(path)?;

        // fail if exists
        let mut tmp_file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)?;

        tmp_file.write_all(data)?;
        tmp_file.sync_all()?;
        drop(tmp_file);

        if let Err(e) = atomic_replace(&tmp_path, path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        sync_dir(&self.dir)?;

        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match fs::read(&path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let path = self.path_for(key)?;
        self.write_atomic(&path, value)?;
        tracing::debug!(key, bytes = value.len(), "wrote storage key");
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                sync_dir(&self.dir)?;
                tracing::debug!(key, "deleted storage key");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Generates a unique temporary path next to `path`.
///
/// Format: `filename.tmp.<randomhex>`
fn random_tmp_path(path: &Path) -> Result<PathBuf> {
    let mut buf = [0u8; 8]; // 64 bit entropy
    secure_random(&mut buf)?;

    let rand_string = buf.iter().map(|b| format!("{:02x}", b)).collect::<String>();

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    Ok(path.with_file_name(format!("{file_name}.tmp.{rand_string}")))
}

#[cfg(not(target_os = "windows"))]
fn sync_dir(dir: &Path) -> Result<()> {
    fs::File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(target_os = "windows")]
fn sync_dir(_dir: &Path) -> Result<()> {
    // ReplaceFileW with REPLACEFILE_WRITE_THROUGH already flushed the rename
    Ok(())
}

/// Atomically replaces `target` with `tmp_path`.
///
/// Uses Windows `ReplaceFileW` with `REPLACEFILE_WRITE_THROUGH`; falls back
/// to a plain rename when the target does not exist yet.
#[cfg(target_os = "windows")]
fn atomic_replace(tmp_path: &Path, target: &Path) -> Result<()> {
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;
    use windows_sys::Win32::Storage::FileSystem::{REPLACEFILE_WRITE_THROUGH, ReplaceFileW};

    if !target.exists() {
        fs::rename(tmp_path, target)?;
        return Ok(());
    }

    fn to_wide(s: &OsStr) -> Vec<u16> {
        s.encode_wide().chain(std::iter::once(0)).collect()
    }

    let target_w = to_wide(target.as_os_str());
    let tmp_w = to_wide(tmp_path.as_os_str());

    // SAFETY:
    // - Strings are valid UTF-16 and null-terminated
    // - Pointers remain valid during the call
    // - Windows does not retain the pointers after return
    let result = unsafe {
        ReplaceFileW(
            target_w.as_ptr(),
            tmp_w.as_ptr(),
            std::ptr::null(),
            REPLACEFILE_WRITE_THROUGH,
            std::ptr::null(),
            std::ptr::null(),
        )
    };

    if result == 0 {
        let err = std::io::Error::last_os_error();
        return Err(VaultError::Persistence(format!("atomic replace failed: {err}")));
    }

    Ok(())
}

/// On Unix, `rename()` is atomic when both paths are on the same filesystem.
#[cfg(not(target_os = "windows"))]
fn atomic_replace(tmp_path: &Path, target: &Path) -> Result<()> {
    fs::rename(tmp_path, target)?;
    Ok(())
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Default, Debug)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entries.write().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }
}
