//! Composite join keys.
//!
//! Keys are normalized segments joined by a single `-`. The segment order and
//! separator must be identical on the registry and the source side or exact
//! lookups silently miss.

use serde::Serialize;

use crate::fuzzy::process;
use crate::normalize::{fold_diacritics, normalize_str};

/// Rendering of an absent segment. Matches what the dataframe tooling the
/// curated dictionaries were produced with wrote for missing values, so
/// override files keyed on such rows still line up.
pub const ABSENT_SEGMENT: &str = "nan";

pub const SEPARATOR: char = '-';

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CompositeKey {
    pub text: String,
    /// False when any segment was absent. Incomplete keys are syntactically
    /// valid but must not be fuzzy matched.
    pub complete: bool,
}

impl CompositeKey {
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl std::fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

/// Join already-normalized segments. `None` (or an empty segment) renders
/// as [`ABSENT_SEGMENT`].
pub fn join_segments(segments: &[Option<&str>]) -> CompositeKey {
    let mut text = String::new();
    let mut complete = true;
    for (i, seg) in segments.iter().enumerate() {
        if i > 0 {
            text.push(SEPARATOR);
        }
        match seg.filter(|s| !s.is_empty()) {
            Some(s) => text.push_str(s),
            None => {
                complete = false;
                text.push_str(ABSENT_SEGMENT);
            }
        }
    }
    CompositeKey { text, complete }
}

/// Normalize raw segments, then join them.
pub fn build_key(raw_segments: &[Option<&str>]) -> CompositeKey {
    let normalized: Vec<Option<String>> = raw_segments
        .iter()
        .map(|s| s.map(normalize_str))
        .collect();
    let refs: Vec<Option<&str>> = normalized.iter().map(|s| s.as_deref()).collect();
    join_segments(&refs)
}

pub fn state_key(state: Option<&str>) -> CompositeKey {
    build_key(&[state])
}

pub fn municipality_key(state: Option<&str>, municipality: Option<&str>) -> CompositeKey {
    build_key(&[state, municipality])
}

pub fn locality_key(municipality: Option<&str>, locality: Option<&str>) -> CompositeKey {
    build_key(&[municipality, locality])
}

/// Lookup form of a key typed by a person: processed like a match query,
/// diacritics folded, whitespace collapsed. Used to line curated override
/// keys up with source and registry keys.
pub fn canonical_key(text: &str) -> String {
    fold_diacritics(&process(text))
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
