//! Approximate string matching on composite keys.
//!
//! Scores are integers in `0..=100`. The scorer is a token-set ratio: both
//! strings are split into token sets, so word order and repeated words do not
//! matter, and a string whose tokens are a subset of the other's scores 100.

use std::collections::BTreeSet;

use serde::Serialize;

/// Best candidate for a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FuzzyMatch {
    /// Position in the candidate slice.
    pub index: usize,
    pub score: u8,
}

/// Lowercase, turn every non-alphanumeric char into a space, trim.
///
/// Applied to both sides before scoring. Key separators (`-`) become token
/// boundaries.
pub fn process(text: &str) -> String {
    let mapped: String = text
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    mapped.to_lowercase().trim().to_string()
}

/// InDel-normalized similarity `100 * 2 * LCS / (|a| + |b|)`, rounded.
pub fn ratio(a: &str, b: &str) -> u8 {
    if a.is_empty() && b.is_empty() {
        return 100;
    }
    let similarity = rapidfuzz::fuzz::ratio(a.chars(), b.chars());
    (similarity * 100.0).round().clamp(0.0, 100.0) as u8
}

/// Token-set ratio of two raw strings.
pub fn token_set_ratio(a: &str, b: &str) -> u8 {
    let pa = process(a);
    let pb = process(b);
    token_set_ratio_processed(&pa, &pb)
}

fn token_set_ratio_processed(a: &str, b: &str) -> u8 {
    let tokens_a: BTreeSet<&str> = a.split_whitespace().collect();
    let tokens_b: BTreeSet<&str> = b.split_whitespace().collect();
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0;
    }

    let sect: Vec<&str> = tokens_a.intersection(&tokens_b).copied().collect();
    let diff_ab: Vec<&str> = tokens_a.difference(&tokens_b).copied().collect();
    let diff_ba: Vec<&str> = tokens_b.difference(&tokens_a).copied().collect();

    let sorted_sect = sect.join(" ");
    let combined_ab = join_nonempty(&sorted_sect, &diff_ab.join(" "));
    let combined_ba = join_nonempty(&sorted_sect, &diff_ba.join(" "));

    ratio(&sorted_sect, &combined_ab)
        .max(ratio(&sorted_sect, &combined_ba))
        .max(ratio(&combined_ab, &combined_ba))
}

fn join_nonempty(head: &str, tail: &str) -> String {
    match (head.is_empty(), tail.is_empty()) {
        (true, _) => tail.to_string(),
        (_, true) => head.to_string(),
        _ => format!("{head} {tail}"),
    }
}

/// A candidate list processed once and matched against many queries.
#[derive(Debug, Clone)]
pub struct Choices {
    processed: Vec<String>,
}

impl Choices {
    pub fn new<S: AsRef<str>>(candidates: &[S]) -> Self {
        Self {
            processed: candidates.iter().map(|c| process(c.as_ref())).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.processed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processed.is_empty()
    }

    /// Highest-scoring candidate regardless of any threshold.
    ///
    /// A candidate whose tokens are a subset of the query's also scores 100,
    /// so ties on the token-set score go to the higher plain [`ratio`] of the
    /// processed strings, then to the earliest candidate. Stable for a stable
    /// candidate order.
    pub fn best(&self, query: &str) -> Option<FuzzyMatch> {
        let query = process(query);
        let mut best: Option<(FuzzyMatch, u8)> = None;
        for (index, candidate) in self.processed.iter().enumerate() {
            if *candidate == query && !query.is_empty() {
                return Some(FuzzyMatch { index, score: 100 });
            }
            let score = token_set_ratio_processed(&query, candidate);
            let closeness = match &best {
                Some((b, _)) if score < b.score => None,
                Some((b, tiebreak)) if score == b.score => {
                    Some(ratio(&query, candidate)).filter(|c| c > tiebreak)
                }
                _ => Some(ratio(&query, candidate)),
            };
            if let Some(closeness) = closeness {
                best = Some((FuzzyMatch { index, score }, closeness));
            }
        }
        best.map(|(m, _)| m)
    }

    /// Best candidate scoring at least `threshold`, or `None`.
    pub fn extract_one(&self, query: &str, threshold: u8) -> Option<FuzzyMatch> {
        self.best(query).filter(|m| m.score >= threshold)
    }
}

pub fn best_candidate<S: AsRef<str>>(query: &str, candidates: &[S]) -> Option<FuzzyMatch> {
    Choices::new(candidates).best(query)
}

pub fn extract_one<S: AsRef<str>>(
    query: &str,
    candidates: &[S],
    threshold: u8,
) -> Option<FuzzyMatch> {
    Choices::new(candidates).extract_one(query, threshold)
}
