use std::collections::BTreeMap;

use serde::Serialize;

use crate::codes::{Codes, GeoCode, GeoLevel, Provenance, ResolvedCode};
use crate::config::SourceColumns;
use crate::diagnostics::Diagnostics;
use crate::error::ResolveError;
use crate::keys::{self, CompositeKey};
use crate::normalize::normalize;
use crate::table::Table;

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Pre-loaded tables. Override tables are keyed by the `name` of their
/// `[[overrides]]` entry.
#[derive(Debug, Clone, Default)]
pub struct ResolveInput {
    pub registry: Table,
    pub source: Table,
    pub overrides: BTreeMap<String, Table>,
}

/// The geographic fields of one source row. Every other column stays in the
/// source table and is only copied through to the output.
#[derive(Debug, Clone)]
pub struct SourceRecord {
    pub row: usize,
    pub entity_raw: Option<String>,
    pub municipality_raw: Option<String>,
    pub locality_raw: Option<String>,
    pub entity_norm: Option<String>,
    pub municipality_norm: Option<String>,
    pub locality_norm: Option<String>,
    pub state_key: CompositeKey,
    pub municipality_key: CompositeKey,
    /// `None` when the source has no locality column.
    pub locality_key: Option<CompositeKey>,
}

impl SourceRecord {
    pub fn key(&self, level: GeoLevel) -> Option<&CompositeKey> {
        match level {
            GeoLevel::Entity => Some(&self.state_key),
            GeoLevel::Municipality => Some(&self.municipality_key),
            GeoLevel::Locality => self.locality_key.as_ref(),
        }
    }

    pub fn raw(&self, level: GeoLevel) -> Option<&str> {
        match level {
            GeoLevel::Entity => self.entity_raw.as_deref(),
            GeoLevel::Municipality => self.municipality_raw.as_deref(),
            GeoLevel::Locality => self.locality_raw.as_deref(),
        }
    }
}

/// Read the geographic columns of the source table. The entity and
/// municipality columns are required; the locality column only when configured.
pub fn load_sources(table: &Table, columns: &SourceColumns) -> Result<Vec<SourceRecord>, ResolveError> {
    const TABLE: &str = "source";
    let entity_idx = table.column_index(TABLE, &columns.entity)?;
    let mun_idx = table.column_index(TABLE, &columns.municipality)?;
    let loc_idx = match &columns.locality {
        Some(name) => Some(table.column_index(TABLE, name)?),
        None => None,
    };

    let records = (0..table.len())
        .map(|row| {
            let raw = |col: usize| table.cell(row, col).map(|s| s.trim().to_string());
            let entity_raw = raw(entity_idx);
            let municipality_raw = raw(mun_idx);
            let locality_raw = loc_idx.and_then(raw);

            let norm = |v: &Option<String>| normalize(v.as_deref()).filter(|s| !s.is_empty());
            let entity_norm = norm(&entity_raw);
            let municipality_norm = norm(&municipality_raw);
            let locality_norm = norm(&locality_raw);

            let state_key = keys::join_segments(&[entity_norm.as_deref()]);
            let municipality_key =
                keys::join_segments(&[entity_norm.as_deref(), municipality_norm.as_deref()]);
            let locality_key = loc_idx.map(|_| {
                keys::join_segments(&[municipality_norm.as_deref(), locality_norm.as_deref()])
            });

            SourceRecord {
                row,
                entity_raw,
                municipality_raw,
                locality_raw,
                entity_norm,
                municipality_norm,
                locality_norm,
                state_key,
                municipality_key,
                locality_key,
            }
        })
        .collect();
    Ok(records)
}

// ---------------------------------------------------------------------------
// Resolution slot
// ---------------------------------------------------------------------------

/// Per-record resolution state, filled in stage by stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub entity: Option<ResolvedCode>,
    pub municipality: Option<ResolvedCode>,
    pub locality: Option<ResolvedCode>,
    /// Score of the finest automated match.
    pub match_score: Option<u8>,
    pub match_stage: Option<GeoLevel>,
}

impl Resolution {
    pub fn get(&self, level: GeoLevel) -> Option<&ResolvedCode> {
        match level {
            GeoLevel::Entity => self.entity.as_ref(),
            GeoLevel::Municipality => self.municipality.as_ref(),
            GeoLevel::Locality => self.locality.as_ref(),
        }
    }

    pub fn set(&mut self, level: GeoLevel, code: GeoCode, provenance: Provenance) {
        self.put(level, ResolvedCode { code, provenance, score: None });
    }

    /// Record a fuzzy match at `level`. The caller updates `match_score` and
    /// `match_stage`.
    pub fn set_matched(&mut self, level: GeoLevel, code: GeoCode, score: u8) {
        self.put(
            level,
            ResolvedCode {
                code,
                provenance: Provenance::Matched,
                score: Some(score),
            },
        );
    }

    fn put(&mut self, level: GeoLevel, resolved: ResolvedCode) {
        let slot = Some(resolved);
        match level {
            GeoLevel::Entity => self.entity = slot,
            GeoLevel::Municipality => self.municipality = slot,
            GeoLevel::Locality => self.locality = slot,
        }
    }

    pub fn clear(&mut self, level: GeoLevel) {
        match level {
            GeoLevel::Entity => self.entity = None,
            GeoLevel::Municipality => self.municipality = None,
            GeoLevel::Locality => self.locality = None,
        }
    }

    /// Re-derive `match_score` and `match_stage` from the finest code still
    /// held by a fuzzy match. Both end up `None` when overrides replaced or
    /// dropped every matched code.
    pub fn refresh_match(&mut self) {
        let finest = GeoLevel::ALL.into_iter().rev().find_map(|level| {
            self.get(level)
                .filter(|r| r.provenance == Provenance::Matched)
                .map(|r| (level, r.score))
        });
        self.match_stage = finest.map(|(level, _)| level);
        self.match_score = finest.and_then(|(_, score)| score);
    }

    pub fn code(&self, level: GeoLevel) -> Option<&GeoCode> {
        self.get(level).map(|r| &r.code)
    }

    pub fn codes(&self) -> Codes {
        Codes {
            entity: self.code(GeoLevel::Entity).cloned(),
            municipality: self.code(GeoLevel::Municipality).cloned(),
            locality: self.code(GeoLevel::Locality).cloned(),
        }
    }

    /// Terminal state over the levels a run resolves (`levels` excludes the
    /// locality when the source has no locality column).
    pub fn status(&self, levels: &[GeoLevel]) -> ResolutionStatus {
        let present = levels.iter().filter(|l| self.get(**l).is_some()).count();
        match present {
            0 => ResolutionStatus::Unresolved,
            n if n == levels.len() => ResolutionStatus::Full,
            _ => ResolutionStatus::Partial,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStatus {
    Full,
    Partial,
    Unresolved,
}

// ---------------------------------------------------------------------------
// Match results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchOutcome {
    Matched,
    NoMatch,
    IncompleteKey,
    NoCandidateScope,
}

/// One record's outcome at one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchResult {
    pub row: usize,
    pub stage: GeoLevel,
    pub source_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u8>,
    pub outcome: MatchOutcome,
    /// Scope the query ran against, e.g. `entity 21`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Best candidate below the threshold, kept for curation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_rejected: Option<(String, u8)>,
}

// ---------------------------------------------------------------------------
// Summary + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StageSummary {
    pub matched: usize,
    pub unmatched: usize,
    pub incomplete_keys: usize,
    pub no_scope: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolveSummary {
    pub total_rows: usize,
    pub fully_resolved: usize,
    pub partially_resolved: usize,
    pub unresolved: usize,
    pub stages: BTreeMap<GeoLevel, StageSummary>,
    pub overrides_applied: usize,
    pub diagnostics_by_reason: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolveMeta {
    pub config_name: String,
    pub engine_version: String,
    pub run_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolveOutput {
    pub meta: ResolveMeta,
    pub summary: ResolveSummary,
    #[serde(skip)]
    pub enriched: Table,
    pub diagnostics: Diagnostics,
    /// Diagnostics rendered with raw source names, for curators.
    #[serde(skip)]
    pub diagnostics_view: Table,
    /// Best candidate per distinct query, for reviewing accepted matches.
    #[serde(skip)]
    pub matches_view: Table,
    #[serde(skip)]
    pub resolutions: Vec<Resolution>,
    #[serde(skip)]
    pub matches: Vec<MatchResult>,
}

impl ResolveOutput {
    /// JSON report: meta, summary and diagnostics. Tables are written
    /// separately.
    pub fn report_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// True when every row resolved at every level the run covers.
    pub fn is_complete(&self) -> bool {
        self.summary.fully_resolved == self.summary.total_rows
    }
}
