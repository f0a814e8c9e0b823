//! Cache Key Module
//!
//! Derives stable keys from source identifiers and maps keys to file names.

use std::fmt;

use sha2::{Digest, Sha256};

/// Longest key stored under its own name on disk.
const MAX_PLAIN_FILE_NAME: usize = 128;

/// Prefix of hashed file names. Never produced by a plain name.
const HASHED_PREFIX: char = '%';

/// Device names Windows reserves regardless of extension.
const RESERVED_STEMS: &[&str] = &[
    "con", "prn", "aux", "nul", "com1", "com2", "com3", "com4", "com5", "com6", "com7", "com8",
    "com9", "lpt1", "lpt2", "lpt3", "lpt4", "lpt5", "lpt6", "lpt7", "lpt8", "lpt9",
];

// == Cache Key ==
/// Opaque identifier of a cache entry, shared by both tiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Uses a caller-supplied key verbatim.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    // == Derive ==
    /// Derives the key for a source identifier.
    ///
    /// The same identifier always yields the same key: the lowercase hex
    /// SHA-256 digest of its bytes, which is also a valid file name.
    pub fn derive(source: &str) -> Self {
        Self(sha256_hex(source.as_bytes()))
    }

    // == File Name ==
    /// Returns the disk file name for this key.
    ///
    /// Keys made only of lowercase ASCII letters, digits, `-`, `_` and `.`
    /// (not leading or trailing) are used as is, unless their stem is a
    /// reserved device name. Anything else is replaced by `%` followed by
    /// the hex digest of the key, so distinct keys never share a file, even
    /// on case-insensitive filesystems.
    pub fn file_name(&self) -> String {
        if is_plain_file_name(&self.0) {
            self.0.clone()
        } else {
            format!("{}{}", HASHED_PREFIX, sha256_hex(self.0.as_bytes()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for CacheKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl From<&str> for CacheKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

// == Locator ==
/// Addresses an entry either by explicit key or by source identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Key(CacheKey),
    Url(String),
}

impl Locator {
    pub fn key(key: impl Into<CacheKey>) -> Self {
        Locator::Key(key.into())
    }

    pub fn url(url: impl Into<String>) -> Self {
        Locator::Url(url.into())
    }

    /// Resolves to the cache key, deriving it for URLs.
    pub fn to_key(&self) -> CacheKey {
        match self {
            Locator::Key(key) => key.clone(),
            Locator::Url(url) => CacheKey::derive(url),
        }
    }
}

impl From<CacheKey> for Locator {
    fn from(key: CacheKey) -> Self {
        Locator::Key(key)
    }
}

/// Picks the explicit key when given, otherwise derives one from `url`.
pub fn resolve_key(url: &str, key: Option<CacheKey>) -> CacheKey {
    key.unwrap_or_else(|| CacheKey::derive(url))
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_PLAIN_FILE_NAME
        && !name.starts_with('.')
        && !name.ends_with('.')
        && name.chars().all(is_plain_char)
        && !is_reserved_name(name)
}

fn is_plain_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '.')
}

fn is_reserved_name(name: &str) -> bool {
    let stem = name.split('.').next().unwrap_or(name);
    RESERVED_STEMS.contains(&stem)
}
