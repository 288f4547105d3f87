//! Content keys and fingerprints for deduplication.
//!
//! Signed image URLs carry volatile query parameters (signatures, expiry), so
//! two links to the same asset differ textually. The content key drops the
//! query and fragment and keeps only `origin + path`; its SHA-256 fingerprint
//! names the stored objects. Equal keys therefore always land on the same
//! object names, which is what makes repeated submissions idempotent.

use sha2::{Digest, Sha256};
use url::Url;

/// Derive the content key for `url`: scheme, host, non-default port and path.
///
/// Unparseable input is used verbatim, so a malformed URL still yields a
/// deterministic key.
pub fn derive_key(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => format!("{}{}", parsed.origin().ascii_serialization(), parsed.path()),
        Err(_) => url.to_string(),
    }
}

/// Lowercase hex SHA-256 of `key`.
pub fn fingerprint(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

/// A URL's content key together with its fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentKey {
    pub key: String,
    pub fingerprint: String,
}

impl ContentKey {
    pub fn from_url(url: &str) -> Self {
        let key = derive_key(url);
        let fingerprint = fingerprint(&key);
        Self { key, fingerprint }
    }

    /// Object name of the compressed image.
    pub fn image_object_name(&self) -> String {
        format!("flow_{}.jpg", self.fingerprint)
    }

    /// Object name of the JSON metadata sidecar.
    pub fn sidecar_object_name(&self) -> String {
        format!("flow_{}.json", self.fingerprint)
    }
}
