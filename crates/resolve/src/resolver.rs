//! Hierarchical resolution: state, then municipality, then locality.
//!
//! Each stage is a pure function from the previous resolutions to new ones.
//! A stage scopes its candidates with whatever the previous stages resolved
//! and falls back to the source's own text when they did not. A miss never
//! stops later stages.

use std::borrow::Cow;
use std::collections::BTreeMap;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::codes::{GeoLevel, Provenance};
use crate::fuzzy::Choices;
use crate::keys::CompositeKey;
use crate::model::{MatchOutcome, MatchResult, Resolution, SourceRecord};
use crate::registry::{CandidateSet, GeoRecord, RegistryIndex, Scope};

#[derive(Debug, Clone, Copy)]
pub struct StageConfig {
    /// Minimum accepted score, inclusive.
    pub threshold: u8,
    /// Evaluate distinct queries on the rayon pool.
    pub parallel: bool,
}

#[derive(Debug, Clone, Default)]
pub struct StageOutput {
    pub resolutions: Vec<Resolution>,
    pub matches: Vec<MatchResult>,
}

pub fn resolve_state_stage(
    prior: &[Resolution],
    sources: &[SourceRecord],
    index: &RegistryIndex,
    config: &StageConfig,
) -> StageOutput {
    run_stage(GeoLevel::Entity, prior, sources, index, config, |_, _| Some(Scope::States))
}

pub fn resolve_municipality_stage(
    prior: &[Resolution],
    sources: &[SourceRecord],
    index: &RegistryIndex,
    config: &StageConfig,
) -> StageOutput {
    run_stage(GeoLevel::Municipality, prior, sources, index, config, |source, resolution| {
        Some(municipality_scope(source, resolution, index))
    })
}

pub fn resolve_locality_stage(
    prior: &[Resolution],
    sources: &[SourceRecord],
    index: &RegistryIndex,
    config: &StageConfig,
) -> StageOutput {
    run_stage(GeoLevel::Locality, prior, sources, index, config, |source, resolution| {
        locality_scope(source, resolution, index)
    })
}

fn municipality_scope(source: &SourceRecord, resolution: &Resolution, index: &RegistryIndex) -> Scope {
    if let Some(entity) = resolution.code(GeoLevel::Entity) {
        return Scope::Entity(entity.clone());
    }
    match source.entity_norm.as_deref() {
        Some(name) if !index.entities_named(name).is_empty() => Scope::EntitiesNamed(name.to_string()),
        _ => Scope::AllMunicipalities,
    }
}

fn locality_scope(source: &SourceRecord, resolution: &Resolution, index: &RegistryIndex) -> Option<Scope> {
    let entity = resolution.code(GeoLevel::Entity);
    if let (Some(e), Some(m)) = (entity, resolution.code(GeoLevel::Municipality)) {
        return Some(Scope::Municipality(e.clone(), m.clone()));
    }
    let name = source.municipality_norm.as_deref()?;
    index
        .has_municipality_named(name, entity)
        .then(|| Scope::MunicipalitiesNamed {
            entity: entity.cloned(),
            name: name.to_string(),
        })
}

// ---------------------------------------------------------------------------
// Stage driver
// ---------------------------------------------------------------------------

enum Plan {
    Query(Scope),
    Incomplete,
    NoScope,
}

struct Planned<'a> {
    key: &'a CompositeKey,
    plan: Plan,
}

#[derive(Debug, Clone)]
struct Best {
    record: usize,
    key: String,
    score: u8,
}

struct ScopeGroup<'a> {
    scope: &'a Scope,
    set: Cow<'a, CandidateSet>,
    choices: Choices,
}

fn run_stage<F>(
    level: GeoLevel,
    prior: &[Resolution],
    sources: &[SourceRecord],
    index: &RegistryIndex,
    config: &StageConfig,
    scope_of: F,
) -> StageOutput
where
    F: Fn(&SourceRecord, &Resolution) -> Option<Scope>,
{
    debug_assert_eq!(prior.len(), sources.len());

    // Rows without a key at this level (no locality column) sit the stage out.
    let plans: Vec<Option<Planned>> = sources
        .iter()
        .zip(prior)
        .map(|(source, resolution)| {
            let key = source.key(level)?;
            let plan = if !key.complete {
                Plan::Incomplete
            } else {
                match scope_of(source, resolution) {
                    Some(scope) => Plan::Query(scope),
                    None => Plan::NoScope,
                }
            };
            Some(Planned { key, plan })
        })
        .collect();

    // Distinct (scope, key) pairs, grouped by scope so each candidate set is
    // assembled and processed once.
    let mut by_scope: BTreeMap<&Scope, Vec<&str>> = BTreeMap::new();
    for planned in plans.iter().flatten() {
        if let Plan::Query(scope) = &planned.plan {
            by_scope.entry(scope).or_default().push(planned.key.as_str());
        }
    }
    let groups: Vec<ScopeGroup> = by_scope
        .keys()
        .map(|&scope| {
            let set = index.candidates(scope);
            let choices = Choices::new(&set.keys);
            ScopeGroup { scope, set, choices }
        })
        .collect();
    let mut jobs: Vec<(usize, &str)> = Vec::new();
    for (g, keys) in by_scope.into_values().enumerate() {
        let mut keys = keys;
        keys.sort_unstable();
        keys.dedup();
        jobs.extend(keys.into_iter().map(|k| (g, k)));
    }

    let evaluate = |&(g, key): &(usize, &str)| -> Option<Best> {
        let group = &groups[g];
        let found = group.choices.best(key).map(|m| Best {
            record: group.set.records[m.index],
            key: group.set.keys[m.index].clone(),
            score: m.score,
        });
        debug!(
            stage = %level,
            scope = %group.scope,
            key,
            candidates = group.choices.len(),
            best = found.as_ref().map(|b| b.key.as_str()),
            score = found.as_ref().map(|b| b.score),
            "query"
        );
        found
    };
    let results: Vec<Option<Best>> = if config.parallel {
        jobs.par_iter().map(evaluate).collect()
    } else {
        jobs.iter().map(evaluate).collect()
    };
    let memo: BTreeMap<(&Scope, &str), Option<Best>> = jobs
        .iter()
        .map(|&(g, key)| (groups[g].scope, key))
        .zip(results)
        .collect();

    let mut resolutions = prior.to_vec();
    let mut matches = Vec::with_capacity(sources.len());
    let mut matched = 0usize;
    let mut fallback_rows = 0usize;

    for ((source, planned), resolution) in sources.iter().zip(&plans).zip(resolutions.iter_mut()) {
        let Some(planned) = planned else {
            continue;
        };
        let mut result = MatchResult {
            row: source.row,
            stage: level,
            source_key: planned.key.text.clone(),
            matched_key: None,
            score: None,
            outcome: MatchOutcome::NoMatch,
            scope: None,
            best_rejected: None,
        };
        match &planned.plan {
            Plan::Incomplete => result.outcome = MatchOutcome::IncompleteKey,
            Plan::NoScope => result.outcome = MatchOutcome::NoCandidateScope,
            Plan::Query(scope) => {
                if scope.is_raw_text_fallback() {
                    fallback_rows += 1;
                }
                result.scope = Some(scope.to_string());
                match memo.get(&(scope, planned.key.as_str())).and_then(Option::as_ref) {
                    Some(best) if best.score >= config.threshold => {
                        apply_match(resolution, level, index.record(best.record), best.score);
                        result.matched_key = Some(best.key.clone());
                        result.score = Some(best.score);
                        result.outcome = MatchOutcome::Matched;
                        matched += 1;
                    }
                    Some(best) => result.best_rejected = Some((best.key.clone(), best.score)),
                    None => {}
                }
            }
        }
        matches.push(result);
    }

    if fallback_rows > 0 {
        warn!(
            stage = %level,
            rows = fallback_rows,
            "scoped by source text because no containing code was resolved; matches may cross entities"
        );
    }
    info!(
        stage = %level,
        rows = matches.len(),
        queries = jobs.len(),
        matched,
        unmatched = matches.len() - matched,
        threshold = config.threshold,
        "stage complete"
    );

    StageOutput { resolutions, matches }
}

/// Record a match at `level` and fill any missing coarser code from the
/// matched registry row. Resolved coarser codes are left as they are.
fn apply_match(resolution: &mut Resolution, level: GeoLevel, record: &GeoRecord, score: u8) {
    let codes = record.codes();
    for coarser in GeoLevel::ALL.into_iter().filter(|l| *l < level) {
        if resolution.get(coarser).is_none() {
            if let Some(code) = codes.get(coarser) {
                resolution.set(coarser, code.clone(), Provenance::Inferred);
            }
        }
    }
    if let Some(code) = codes.get(level) {
        resolution.set_matched(level, code.clone(), score);
    }
    resolution.match_score = Some(score);
    resolution.match_stage = Some(level);
}
