//! Runtime configuration.
//!
//! Defaults come from the platform data directory; environment variables
//! override them. The CLI layers its flags on top.

use std::env;
use std::path::PathBuf;

use directories::ProjectDirs;

use crate::crypto::{Algorithm, KdfParams};
use crate::error::{Result, VaultError};

pub const ENV_DIR: &str = "NOTEVAULT_DIR";
pub const ENV_ALLOW_PLAINTEXT: &str = "NOTEVAULT_ALLOW_PLAINTEXT";
pub const ENV_AEAD: &str = "NOTEVAULT_AEAD";
pub const ENV_ARGON_MEM: &str = "NOTEVAULT_ARGON_MEM";
pub const ENV_ARGON_TIME: &str = "NOTEVAULT_ARGON_TIME";
pub const ENV_ARGON_PARALLELISM: &str = "NOTEVAULT_ARGON_PARALLELISM";

#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the store files.
    pub data_dir: PathBuf,
    /// Argon2 cost for newly created salt records.
    pub kdf: KdfParams,
    /// Allow unencrypted writes when no key exists. Off by default.
    pub allow_plaintext: bool,
    /// Overrides the capability probe on first selection.
    pub algorithm: Option<Algorithm>,
}

impl Config {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            kdf: KdfParams::default(),
            allow_plaintext: false,
            algorithm: None,
        }
    }

    /// Defaults plus `NOTEVAULT_*` overrides.
    pub fn from_env() -> Result<Self> {
        let data_dir = match env::var_os(ENV_DIR) {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => default_data_dir()?,
        };

        let mut config = Self::new(data_dir);
        config.apply(|name| env::var(name).ok())?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup.
    fn apply(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup(ENV_ALLOW_PLAINTEXT) {
            self.allow_plaintext = parse_bool(ENV_ALLOW_PLAINTEXT, &v)?;
        }

        if let Some(v) = lookup(ENV_AEAD) {
            self.algorithm = Some(v.parse()?);
        }

        let mem = parse_u32(&lookup, ENV_ARGON_MEM)?;
        let time = parse_u32(&lookup, ENV_ARGON_TIME)?;
        let par = parse_u32(&lookup, ENV_ARGON_PARALLELISM)?;
        if mem.is_some() || time.is_some() || par.is_some() {
            self.kdf = KdfParams::new(
                mem.unwrap_or(self.kdf.mem_cost_kib()),
                time.unwrap_or(self.kdf.time_cost()),
                par.unwrap_or(self.kdf.parallelism()),
            )?;
        }

        Ok(())
    }
}

pub fn default_data_dir() -> Result<PathBuf> {
    let project_dirs = ProjectDirs::from("", "", "notevault").ok_or_else(|| {
        VaultError::Persistence("could not determine platform directories".into())
    })?;

    Ok(project_dirs.data_dir().to_path_buf())
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(VaultError::InvalidState(format!(
            "{name}: expected a boolean, got '{other}'"
        ))),
    }
}

fn parse_u32(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<u32>> {
    lookup(name)
        .map(|v| {
            v.trim().parse::<u32>().map_err(|_| {
                VaultError::InvalidState(format!("{name}: expected an integer, got '{v}'"))
            })
        })
        .transpose()
}
