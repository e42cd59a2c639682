//! Header-row fingerprints.
//!
//! A fingerprint is the SHA-256 digest of the exact header sequence. Each
//! header is framed by its byte length so that `["ab", "c"]` and
//! `["a", "bc"]` never collide. No case or whitespace folding is applied:
//! byte-identical header rows are the only rows that share a fingerprint.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HeaderFingerprint(String);

impl HeaderFingerprint {
    pub fn compute<S: AsRef<str>>(headers: &[S]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update((headers.len() as u64).to_le_bytes());
        for header in headers {
            let bytes = header.as_ref().as_bytes();
            hasher.update((bytes.len() as u64).to_le_bytes());
            hasher.update(bytes);
        }
        HeaderFingerprint(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First twelve hex characters, for log lines.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(12) {
            Some((end, _)) => &self.0[..end],
            None => &self.0,
        }
    }
}

impl fmt::Display for HeaderFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for HeaderFingerprint {
    fn from(value: String) -> Self {
        HeaderFingerprint(value)
    }
}
