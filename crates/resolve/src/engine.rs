use std::collections::BTreeMap;

use tracing::info;

use crate::codes::GeoLevel;
use crate::config::ResolveConfig;
use crate::diagnostics::Diagnostics;
use crate::error::ResolveError;
use crate::model::{
    load_sources, MatchOutcome, MatchResult, ResolutionStatus, Resolution, ResolveInput, ResolveMeta,
    ResolveOutput, ResolveSummary, StageSummary,
};
use crate::output::{enrich, match_table, OutputSchema};
use crate::overrides::{reconcile, OverrideSet, OverrideTable};
use crate::registry::{load_registry, RegistryIndex};
use crate::resolver::{resolve_locality_stage, resolve_municipality_stage, resolve_state_stage, StageConfig};

/// Run resolution per config. Structural problems (registry columns,
/// override conflicts, config) fail the run before any row is matched.
pub fn run(config: &ResolveConfig, input: &ResolveInput) -> Result<ResolveOutput, ResolveError> {
    config.validate()?;

    let index = RegistryIndex::build(load_registry(&input.registry, &config.registry.columns)?);
    index.validate_expected_entities(&config.expected_entities)?;

    let overrides = load_overrides(config, input, &index)?;

    let sources = load_sources(&input.source, &config.source.columns)?;
    let with_locality = config.source.columns.locality.is_some();
    let schema = OutputSchema::build(&input.source.headers, &config.output, with_locality)?;
    info!(rows = sources.len(), with_locality, "source loaded");

    let stage = |level: GeoLevel| StageConfig {
        threshold: config.thresholds.for_level(level),
        parallel: config.parallel,
    };
    let start = vec![Resolution::default(); sources.len()];
    let state = resolve_state_stage(&start, &sources, &index, &stage(GeoLevel::Entity));
    let municipality =
        resolve_municipality_stage(&state.resolutions, &sources, &index, &stage(GeoLevel::Municipality));
    let mut matches = state.matches;
    matches.extend(municipality.matches);
    let resolved = if with_locality {
        let locality =
            resolve_locality_stage(&municipality.resolutions, &sources, &index, &stage(GeoLevel::Locality));
        matches.extend(locality.matches);
        locality.resolutions
    } else {
        municipality.resolutions
    };

    let reconciled = reconcile(&resolved, &sources, &overrides);
    let diagnostics = Diagnostics::collect(&reconciled.resolutions, &sources, &matches, &reconciled.invalidated);
    let diagnostics_view = diagnostics.to_table(&sources);
    let enriched = enrich(&input.source, &reconciled.resolutions, &index, &schema);
    let matches_view = match_table(&matches);

    let levels: &[GeoLevel] = if with_locality {
        &GeoLevel::ALL
    } else {
        &GeoLevel::ALL[..2]
    };
    let summary = compute_summary(
        &reconciled.resolutions,
        levels,
        &matches,
        reconciled.applied.len(),
        &diagnostics,
    );
    info!(
        rows = summary.total_rows,
        full = summary.fully_resolved,
        partial = summary.partially_resolved,
        unresolved = summary.unresolved,
        overrides = summary.overrides_applied,
        diagnostics = diagnostics.len(),
        "resolution complete"
    );

    Ok(ResolveOutput {
        meta: ResolveMeta {
            config_name: config.name.clone(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
        },
        summary,
        enriched,
        diagnostics,
        diagnostics_view,
        matches_view,
        resolutions: reconciled.resolutions,
        matches,
    })
}

fn load_overrides(
    config: &ResolveConfig,
    input: &ResolveInput,
    index: &RegistryIndex,
) -> Result<OverrideSet, ResolveError> {
    let mut tables = Vec::with_capacity(config.overrides.len());
    for spec in &config.overrides {
        let table = input
            .overrides
            .get(&spec.name)
            .ok_or_else(|| ResolveError::MissingTable(format!("override:{}", spec.name)))?;
        tables.push(OverrideTable::from_table(table, spec, index)?);
    }
    OverrideSet::build(tables)
}

fn compute_summary(
    resolutions: &[Resolution],
    levels: &[GeoLevel],
    matches: &[MatchResult],
    overrides_applied: usize,
    diagnostics: &Diagnostics,
) -> ResolveSummary {
    let mut summary = ResolveSummary {
        total_rows: resolutions.len(),
        overrides_applied,
        diagnostics_by_reason: diagnostics.count_by_reason(),
        ..ResolveSummary::default()
    };
    for r in resolutions {
        match r.status(levels) {
            ResolutionStatus::Full => summary.fully_resolved += 1,
            ResolutionStatus::Partial => summary.partially_resolved += 1,
            ResolutionStatus::Unresolved => summary.unresolved += 1,
        }
    }
    let mut stages: BTreeMap<GeoLevel, StageSummary> = BTreeMap::new();
    for m in matches {
        let s = stages.entry(m.stage).or_default();
        match m.outcome {
            MatchOutcome::Matched => s.matched += 1,
            MatchOutcome::NoMatch => s.unmatched += 1,
            MatchOutcome::IncompleteKey => s.incomplete_keys += 1,
            MatchOutcome::NoCandidateScope => s.no_scope += 1,
        }
    }
    summary.stages = stages;
    summary
}
