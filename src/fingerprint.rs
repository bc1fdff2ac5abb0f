use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use sha2::Digest as _;

const EMPTY_SENTINEL: &str = "empty";

/// Hash of normalized article text.
///
/// Blank text maps to a reserved sentinel so two genuinely empty pages are never
/// reported as duplicates of each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn empty() -> Self {
        Self(EMPTY_SENTINEL.to_owned())
    }

    pub fn of_text(text: &str) -> Self {
        let normalized = normalize_text(text);
        if normalized.is_empty() {
            return Self::empty();
        }
        let length = normalized.chars().count();
        Self(digest(&format!("{normalized}|{length}")))
    }

    /// Re-keys a fingerprint by URL, for runs that dedup per URL instead of per content.
    pub fn scoped_to(&self, url: &str) -> Self {
        if self.is_empty_sentinel() {
            return self.clone();
        }
        Self(digest(&format!("{url}|{}", self.0)))
    }

    pub fn is_empty_sentinel(&self) -> bool {
        self.0 == EMPTY_SENTINEL
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn digest(input: &str) -> String {
    let mut hasher = sha2::Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Collapses runs of whitespace inside each line and drops blank lines.
pub fn normalize_text(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Run-wide set of fingerprints already claimed, shared by every worker.
#[derive(Debug, Default)]
pub struct FingerprintRegistry {
    owners: Mutex<HashMap<Fingerprint, usize>>,
}

impl FingerprintRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically checks and inserts. Returns `false` when a different article already
    /// claimed this fingerprint; the same article may claim again (retries). The empty
    /// sentinel is always granted.
    pub fn claim(&self, fingerprint: &Fingerprint, article: usize) -> bool {
        if fingerprint.is_empty_sentinel() {
            return true;
        }
        let mut owners = self
            .owners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *owners.entry(fingerprint.clone()).or_insert(article) == article
    }

    pub fn len(&self) -> usize {
        self.owners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
