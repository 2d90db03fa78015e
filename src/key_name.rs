//! Resource names of keys and key versions.
//!
//! See <https://cloud.google.com/kms/docs/resource-hierarchy> for the hierarchy
//! these names follow.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::KmsError;

const CRYPTO_KEY: &str = "projects/([^/]+)/locations/([a-zA-Z0-9_-]{1,63})/keyRings/\
                          [a-zA-Z0-9_-]{1,63}/cryptoKeys/[a-zA-Z0-9_-]{1,63}";
const CRYPTO_KEY_VERSION: &str =
    "projects/[^/]+/locations/[^/]+/keyRings/[^/]+/cryptoKeys/[^/]+/cryptoKeyVersions/.*";
const CRYPTO_KEY_PATH: &str = "projects/[^/]+/locations/[^/]+/keyRings/[^/]+/cryptoKeys/.*";

static CRYPTO_KEY_RE: Lazy<Regex> = Lazy::new(|| anchored(CRYPTO_KEY));
static CRYPTO_KEY_VERSION_RE: Lazy<Regex> = Lazy::new(|| anchored(CRYPTO_KEY_VERSION));
static CRYPTO_KEY_PATH_RE: Lazy<Regex> = Lazy::new(|| anchored(CRYPTO_KEY_PATH));

fn anchored(pattern: &str) -> Regex {
    Regex::new(&format!("^(?:{pattern})$")).expect("static key name pattern compiles")
}

/// Grammars a resource name can be checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyNamePattern {
    /// `projects/*/locations/*/keyRings/*/cryptoKeys/*`, used for encryption.
    CryptoKey,
    /// `.../cryptoKeys/*/cryptoKeyVersions/*`, used for signing.
    CryptoKeyVersion,
    /// Path grammar the HTTP surface accepts for `:encrypt` and `:decrypt`.
    CryptoKeyPath,
}

impl KeyNamePattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyNamePattern::CryptoKey => CRYPTO_KEY,
            KeyNamePattern::CryptoKeyVersion => CRYPTO_KEY_VERSION,
            KeyNamePattern::CryptoKeyPath => CRYPTO_KEY_PATH,
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        let re = match self {
            KeyNamePattern::CryptoKey => &*CRYPTO_KEY_RE,
            KeyNamePattern::CryptoKeyVersion => &*CRYPTO_KEY_VERSION_RE,
            KeyNamePattern::CryptoKeyPath => &*CRYPTO_KEY_PATH_RE,
        };
        re.is_match(name)
    }
}

/// A validated key or key-version resource name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyName(String);

impl KeyName {
    pub fn parse(name: impl Into<String>, pattern: KeyNamePattern) -> Result<Self, KmsError> {
        let name = name.into();
        if name.is_empty() {
            return Err(KmsError::InvalidKeyName {
                name,
                reason: "the key name is empty".into(),
            });
        }
        if !pattern.matches(&name) {
            return Err(KmsError::InvalidKeyName {
                name,
                reason: format!("the key name must follow {}", pattern.as_str()),
            });
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for KeyName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Strips the trailing `cryptoKeyVersions/{v}` from a key-version name.
///
/// Anything that is not shaped like a key-version name comes back unchanged.
pub fn key_version_to_key_name(resource_id: &str) -> String {
    const MARKERS: [&str; 5] = [
        "projects",
        "locations",
        "keyRings",
        "cryptoKeys",
        "cryptoKeyVersions",
    ];

    let parts: Vec<&str> = resource_id.split('/').collect();
    if parts.len() != 10 || MARKERS.iter().enumerate().any(|(i, m)| parts[i * 2] != *m) {
        return resource_id.to_string();
    }
    parts[..8].join("/")
}

/// Segments of a key's resource name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GcpKeyRef {
    pub project_id: String,
    pub location: String,
    pub key_ring: String,
    pub key_name: String,
}

impl GcpKeyRef {
    pub fn to_specifier(&self) -> String {
        format!(
            "projects/{}/locations/{}/keyRings/{}/cryptoKeys/{}",
            self.project_id, self.location, self.key_ring, self.key_name
        )
    }

    pub fn to_version_specifier(&self, version: u64) -> String {
        format!("{}/cryptoKeyVersions/{}", self.to_specifier(), version)
    }
}
