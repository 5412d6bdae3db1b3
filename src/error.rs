//! Error types for the note vault.
//!
//! Authentication failures are deliberately coarse: a wrong key and a
//! corrupted ciphertext produce the same [`VaultError::AuthenticationFailure`].
//! Callers higher up translate it into [`VaultError::WrongPassword`] (unlock)
//! or [`VaultError::UnreadableStore`] (load) depending on what they attempted.

use thiserror::Error;

/// Result type alias for vault operations.
pub type Result<T> = std::result::Result<T, VaultError>;

#[derive(Debug, Error)]
pub enum VaultError {
    /// No master key is loaded; the caller must unlock first.
    #[error("vault is locked: no master key available")]
    NoKeyAvailable,

    /// AEAD tag mismatch. Wrong key and corruption are indistinguishable.
    #[error("authentication failed: invalid key or corrupted data")]
    AuthenticationFailure,

    #[error("incorrect password")]
    WrongPassword,

    /// The encrypted state exists but cannot be opened with the current key.
    #[error("stored notes are unreadable with the current key")]
    UnreadableStore,

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("import rejected: {0}")]
    Validation(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    /// Malformed blob or salt record.
    #[error("invalid stored format: {0}")]
    Format(String),

    #[error("OS random generator unavailable")]
    Random,

    /// Operation not allowed in the current provisioning mode.
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
}

impl From<std::io::Error> for VaultError {
    fn from(err: std::io::Error) -> Self {
        VaultError::Persistence(err.to_string())
    }
}

impl VaultError {
    /// True for conditions the UI should answer with the unlock screen.
    pub fn needs_unlock(&self) -> bool {
        matches!(self, VaultError::NoKeyAvailable | VaultError::WrongPassword)
    }
}
