//! Candidate URL value object and canonicalization.
//!
//! The canonical form is the identity key for freshness checks and
//! deduplication everywhere downstream, so two discovered links that differ
//! only in tracking parameters must collapse to the same key.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Strip everything from the first `?` or `#` (whichever comes first).
///
/// Pure and idempotent; empty input is returned unchanged.
pub fn canonicalize(url: &str) -> String {
    let cut = url
        .find(['?', '#'])
        .unwrap_or(url.len());
    url[..cut].to_string()
}

/// A link discovered on a results page, paired with its canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CandidateUrl {
    /// The href exactly as it appeared in the DOM (absolute).
    pub raw: String,
    /// Tracking parameters and fragments stripped.
    pub canonical: String,
}

impl CandidateUrl {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let canonical = canonicalize(&raw);
        Self { raw, canonical }
    }

    /// Path portion of the canonical URL, used to build click selectors.
    pub fn canonical_path(&self) -> &str {
        match self.canonical.find("://") {
            Some(scheme_end) => {
                let rest = &self.canonical[scheme_end + 3..];
                match rest.find('/') {
                    Some(slash) => &rest[slash..],
                    None => "/",
                }
            }
            None => &self.canonical,
        }
    }
}

impl AsRef<str> for CandidateUrl {
    fn as_ref(&self) -> &str {
        &self.canonical
    }
}

impl fmt::Display for CandidateUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical)
    }
}
