//! Master key as a URL-safe token.
//!
//! A key travels in the fragment of a link (`https://host/app#key=<token>`).
//! Fragments are not sent with page requests. After [`extract`] the caller
//! must replace the current location with the returned, key-free URL so the
//! token does not stay in history.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use zeroize::Zeroizing;

use crate::crypto::{KEY_LEN, MasterKey};
use crate::error::{Result, VaultError};

/// Fragment parameter carrying the token.
pub const FRAGMENT_PARAM: &str = "key";

pub fn encode_key(key: &MasterKey) -> String {
    URL_SAFE_NO_PAD.encode(key.as_bytes())
}

pub fn decode_key(token: &str) -> Result<MasterKey> {
    let bytes = Zeroizing::new(
        URL_SAFE_NO_PAD
            .decode(token.trim().trim_end_matches('='))
            .map_err(|_| VaultError::Format("key token is not valid base64".into()))?,
    );

    if bytes.len() != KEY_LEN {
        return Err(VaultError::Format(format!(
            "key token must decode to {KEY_LEN} bytes"
        )));
    }

    let mut raw = [0u8; KEY_LEN];
    raw.copy_from_slice(&bytes);
    Ok(MasterKey::from_bytes(raw))
}

/// Link to `base_url` carrying the key in its fragment.
///
/// Any fragment already on `base_url` is replaced.
pub fn link(base_url: &str, key: &MasterKey) -> String {
    let base = base_url.split('#').next().unwrap_or(base_url);
    format!("{base}#{FRAGMENT_PARAM}={}", encode_key(key))
}

/// Pull the key out of a link.
///
/// Returns the key and the URL with the key parameter removed from the
/// fragment (and the fragment dropped entirely when nothing else is left).
pub fn extract(url: &str) -> Result<(MasterKey, String)> {
    let (base, fragment) = url
        .split_once('#')
        .ok_or_else(|| VaultError::NotFound("link has no fragment".into()))?;

    let mut token = None;
    let mut rest = Vec::new();
    for part in fragment.split('&').filter(|p| !p.is_empty()) {
        match part.split_once('=') {
            Some((name, value)) if name == FRAGMENT_PARAM => token = Some(value),
            _ => rest.push(part),
        }
    }

    let token = token.ok_or_else(|| VaultError::NotFound("link carries no key".into()))?;
    let key = decode_key(token)?;

    let cleaned = if rest.is_empty() {
        base.to_string()
    } else {
        format!("{base}#{}", rest.join("&"))
    };

    Ok((key, cleaned))
}
