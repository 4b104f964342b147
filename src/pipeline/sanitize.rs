//! Filename sanitisation: turn a client-supplied name into a safe on-disk name.
//!
//! The rules keep CJK ideographs intact, because the service's users name
//! their documents in Chinese far more often than in ASCII:
//!
//! 1. Unicode NFKD (compatibility decomposition): full-width letters fold to
//!    ASCII, accented letters split into base letter + combining mark
//! 2. Path separators (`/`, `\`) become spaces
//! 3. Runs of whitespace collapse into a single `_`
//! 4. Everything except `A-Z a-z 0-9 _ - .` and U+4E00–U+9FBF is dropped
//!    (this is where the combining marks from step 1 disappear)
//! 5. Leading and trailing `.` / `_` are stripped
//!
//! The result never contains a path separator, so it can always be joined
//! onto a directory without escaping it. Sanitising twice gives the same
//! result as sanitising once.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use unicode_normalization::UnicodeNormalization;

static RE_DISALLOWED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9_.\-\x{4E00}-\x{9FBF}]").unwrap());

/// Apply the sanitisation rules to `raw`. May return an empty string.
pub fn sanitize_filename(raw: &str) -> String {
    let decomposed: String = raw.nfkd().collect();
    let spaced = decomposed.replace(['/', '\\'], " ");
    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
    let kept = RE_DISALLOWED.replace_all(&joined, "");
    kept.trim_matches(|c| c == '.' || c == '_').to_string()
}

/// A non-empty, filesystem-safe file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SanitizedName(String);

impl SanitizedName {
    /// Sanitise `raw`; `None` when nothing survives.
    pub fn parse(raw: &str) -> Option<Self> {
        let name = sanitize_filename(raw);
        if name.is_empty() {
            None
        } else {
            Some(Self(name))
        }
    }

    /// Sanitise `raw`, falling back to `unnamed_<index>` when nothing survives.
    pub fn sanitize_or_fallback(raw: &str, index: usize) -> Self {
        Self::parse(raw).unwrap_or_else(|| Self(format!("unnamed_{index}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name without its final extension (`report.v2.doc` → `report.v2`).
    pub fn stem(&self) -> &str {
        match self.0.rsplit_once('.') {
            Some((stem, _)) => stem,
            None => &self.0,
        }
    }

    /// Final extension without the dot, as written (`Report.DOC` → `DOC`).
    pub fn extension(&self) -> Option<&str> {
        self.0.rsplit_once('.').map(|(_, ext)| ext)
    }

    /// `<stem>_<k>.<ext>` — used to break within-batch name collisions.
    pub fn with_counter(&self, k: usize) -> Self {
        match self.extension() {
            Some(ext) => Self(format!("{}_{}.{}", self.stem(), k, ext)),
            None => Self(format!("{}_{}", self.0, k)),
        }
    }
}

impl fmt::Display for SanitizedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SanitizedName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
