//! Process-wide AEAD selection.
//!
//! The host is probed once; the result is fixed for the lifetime of the
//! process. A different choice only takes effect after a restart.

use std::sync::OnceLock;

use super::Algorithm;

static SELECTED: OnceLock<Algorithm> = OnceLock::new();

/// Fix the algorithm for new encryptions.
///
/// The first call wins. `preferred` overrides the probe on that first call
/// and is ignored afterwards.
pub fn initialize(preferred: Option<Algorithm>) -> Algorithm {
    *SELECTED.get_or_init(|| {
        let algorithm = preferred.unwrap_or_else(|| for_host(aes_accelerated()));
        tracing::info!(%algorithm, overridden = preferred.is_some(), "selected AEAD");
        algorithm
    })
}

/// The fixed algorithm, probing on first use.
pub fn current() -> Algorithm {
    initialize(None)
}

/// Choice for a host with or without AES acceleration.
pub const fn for_host(aes_accelerated: bool) -> Algorithm {
    if aes_accelerated {
        Algorithm::Aegis256
    } else {
        Algorithm::XChaCha20Poly1305
    }
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub fn aes_accelerated() -> bool {
    std::arch::is_x86_feature_detected!("aes") && std::arch::is_x86_feature_detected!("sse2")
}

#[cfg(target_arch = "aarch64")]
pub fn aes_accelerated() -> bool {
    std::arch::is_aarch64_feature_detected!("aes")
}

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64", target_arch = "aarch64")))]
pub fn aes_accelerated() -> bool {
    false
}
