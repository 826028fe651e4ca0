//! Rows that did not resolve, shaped for override curation.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::codes::GeoLevel;
use crate::model::{MatchOutcome, MatchResult, Resolution, SourceRecord};
use crate::overrides::Invalidation;
use crate::table::Table;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticReason {
    /// A key segment was absent; the key was not matched.
    IncompleteSourceKey,
    /// Best candidate scored below the stage threshold, or no candidates.
    NoMatch,
    /// No resolved or named containing unit to scope the search.
    NoCandidateScope,
    /// An override moved a containing code and the automated code was dropped.
    InvalidatedByOverride,
}

impl DiagnosticReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::IncompleteSourceKey => "incomplete_source_key",
            Self::NoMatch => "no_match",
            Self::NoCandidateScope => "no_candidate_scope",
            Self::InvalidatedByOverride => "invalidated_by_override",
        }
    }
}

impl std::fmt::Display for DiagnosticReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub row: usize,
    pub stage: GeoLevel,
    pub reason: DiagnosticReason,
    pub source_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_candidate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_score: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Build from the final (post-override) resolutions. A stage whose code
    /// ended up present, by override or by inference from a finer match, is
    /// not reported.
    pub fn collect(
        resolutions: &[Resolution],
        sources: &[SourceRecord],
        matches: &[MatchResult],
        invalidated: &[Invalidation],
    ) -> Self {
        let unresolved = |row: usize, level: GeoLevel| {
            resolutions.get(row).map_or(true, |r| r.get(level).is_none())
        };

        let mut entries: Vec<Diagnostic> = matches
            .iter()
            .filter(|m| m.outcome != MatchOutcome::Matched && unresolved(m.row, m.stage))
            .map(|m| {
                let reason = match m.outcome {
                    MatchOutcome::IncompleteKey => DiagnosticReason::IncompleteSourceKey,
                    MatchOutcome::NoCandidateScope => DiagnosticReason::NoCandidateScope,
                    _ => DiagnosticReason::NoMatch,
                };
                Diagnostic {
                    row: m.row,
                    stage: m.stage,
                    reason,
                    source_key: m.source_key.clone(),
                    scope: m.scope.clone(),
                    best_candidate: m.best_rejected.as_ref().map(|(k, _)| k.clone()),
                    best_score: m.best_rejected.as_ref().map(|(_, s)| *s),
                    detail: None,
                }
            })
            .collect();

        for inv in invalidated.iter().filter(|i| unresolved(i.row, i.level)) {
            let source_key = sources
                .get(inv.row)
                .and_then(|s| s.key(inv.level))
                .map(|k| k.text.clone())
                .unwrap_or_default();
            entries.push(Diagnostic {
                row: inv.row,
                stage: inv.level,
                reason: DiagnosticReason::InvalidatedByOverride,
                source_key,
                scope: None,
                best_candidate: None,
                best_score: None,
                detail: Some(format!("{} {} dropped by override '{}'", inv.level, inv.previous, inv.table)),
            });
        }

        entries.sort_by_key(|d| (d.row, d.stage, d.reason));
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    /// Number of distinct rows with at least one diagnostic.
    pub fn rows(&self) -> usize {
        let mut rows: Vec<usize> = self.entries.iter().map(|d| d.row).collect();
        rows.dedup();
        rows.len()
    }

    pub fn count_by_reason(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for d in &self.entries {
            *counts.entry(d.reason.to_string()).or_insert(0) += 1;
        }
        counts
    }

    /// The diagnostics view: one line per unresolved stage with the raw
    /// source names next to the key and the closest rejected candidate.
    pub fn to_table(&self, sources: &[SourceRecord]) -> Table {
        let mut table = Table::new(
            [
                "row",
                "stage",
                "reason",
                "entity",
                "municipality",
                "locality",
                "source_key",
                "scope",
                "best_candidate",
                "best_score",
                "detail",
            ]
            .iter()
            .map(|h| h.to_string())
            .collect(),
        );
        for d in &self.entries {
            let raw = |level: GeoLevel| {
                sources
                    .get(d.row)
                    .and_then(|s| s.raw(level))
                    .unwrap_or("")
                    .to_string()
            };
            table.push_row(vec![
                d.row.to_string(),
                d.stage.to_string(),
                d.reason.to_string(),
                raw(GeoLevel::Entity),
                raw(GeoLevel::Municipality),
                raw(GeoLevel::Locality),
                d.source_key.clone(),
                d.scope.clone().unwrap_or_default(),
                d.best_candidate.clone().unwrap_or_default(),
                d.best_score.map(|s| s.to_string()).unwrap_or_default(),
                d.detail.clone().unwrap_or_default(),
            ]);
        }
        table
    }
}
