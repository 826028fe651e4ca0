//! Enriched output table with an explicit schema: passthrough columns first,
//! then the resolved codes and their canonical registry names.

use std::collections::{BTreeMap, BTreeSet};

use crate::codes::{Codes, GeoLevel};
use crate::config::OutputConfig;
use crate::error::ResolveError;
use crate::model::{MatchOutcome, MatchResult, Resolution};
use crate::registry::RegistryIndex;
use crate::table::Table;

/// Output column layout, fixed before any row is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSchema {
    /// Source column index and output label of each passthrough column.
    pub passthrough: Vec<(usize, String)>,
    pub include_locality: bool,
    pub include_score: bool,
    pub labels: Vec<String>,
}

impl OutputSchema {
    pub fn build(source_headers: &[String], config: &OutputConfig, include_locality: bool) -> Result<Self, ResolveError> {
        let invalid = |msg: String| ResolveError::ConfigValidation(msg);
        for name in config.rename.keys().chain(&config.drop) {
            if !source_headers.contains(name) {
                return Err(invalid(format!("output: source has no column '{name}'")));
            }
        }

        let l = &config.labels;
        let mut labels = vec![
            l.entity_code.clone(),
            l.entity_name.clone(),
            l.municipality_code.clone(),
            l.municipality_name.clone(),
        ];
        if include_locality {
            labels.push(l.locality_code.clone());
            labels.push(l.locality_name.clone());
        }
        if config.include_score {
            labels.push(l.score.clone());
        }

        let passthrough: Vec<(usize, String)> = source_headers
            .iter()
            .enumerate()
            .filter(|(_, h)| !config.drop.contains(h))
            .map(|(i, h)| (i, config.rename.get(h).unwrap_or(h).clone()))
            .collect();

        let mut seen: BTreeSet<&str> = BTreeSet::new();
        for header in passthrough.iter().map(|(_, h)| h).chain(&labels) {
            if !seen.insert(header.as_str()) {
                return Err(invalid(format!(
                    "output column '{header}' appears twice; rename or drop the source column"
                )));
            }
        }

        Ok(Self {
            passthrough,
            include_locality,
            include_score: config.include_score,
            labels,
        })
    }

    pub fn headers(&self) -> Vec<String> {
        self.passthrough
            .iter()
            .map(|(_, h)| h.clone())
            .chain(self.labels.iter().cloned())
            .collect()
    }
}

/// Build the enriched table. Row order follows the source.
pub fn enrich(source: &Table, resolutions: &[Resolution], index: &RegistryIndex, schema: &OutputSchema) -> Table {
    let mut table = Table::new(schema.headers());
    for (row, resolution) in resolutions.iter().enumerate() {
        let mut cells: Vec<String> = schema
            .passthrough
            .iter()
            .map(|(col, _)| {
                source
                    .rows
                    .get(row)
                    .and_then(|r| r.get(*col))
                    .cloned()
                    .unwrap_or_default()
            })
            .collect();

        let codes = resolution.codes();
        let levels: &[GeoLevel] = if schema.include_locality {
            &GeoLevel::ALL
        } else {
            &GeoLevel::ALL[..2]
        };
        for &level in levels {
            cells.push(codes.get(level).map(|c| c.to_string()).unwrap_or_default());
            cells.push(canonical_name(index, &codes, level).unwrap_or_default());
        }
        if schema.include_score {
            cells.push(resolution.match_score.map(|s| s.to_string()).unwrap_or_default());
        }
        table.push_row(cells);
    }
    table
}

/// Registry name for the code at `level`, looked up with the codes down to
/// that level only, so an unknown finer code does not hide coarser names.
fn canonical_name(index: &RegistryIndex, codes: &Codes, level: GeoLevel) -> Option<String> {
    codes.get(level)?;
    let prefix = Codes {
        entity: codes.entity.clone(),
        municipality: codes.municipality.clone().filter(|_| level >= GeoLevel::Municipality),
        locality: codes.locality.clone().filter(|_| level >= GeoLevel::Locality),
    };
    let record = index.record_for(&prefix)?;
    Some(match level {
        GeoLevel::Entity => record.entity_name.clone(),
        GeoLevel::Municipality => record.municipality_name.clone(),
        GeoLevel::Locality => record.locality_name.clone(),
    })
}

/// Match dictionary for curators: one row per distinct query (stage, scope,
/// source key) that had a best candidate, accepted or not, with the number of
/// source rows that asked it. Sorted by stage, then key.
pub fn match_table(matches: &[MatchResult]) -> Table {
    let mut queries: BTreeMap<(GeoLevel, &str, &str), (&str, u8, bool, usize)> = BTreeMap::new();
    for m in matches {
        let best = match (m.outcome, &m.matched_key, m.score, &m.best_rejected) {
            (MatchOutcome::Matched, Some(key), Some(score), _) => (key.as_str(), score, true),
            (MatchOutcome::NoMatch, _, _, Some((key, score))) => (key.as_str(), *score, false),
            _ => continue,
        };
        let scope = m.scope.as_deref().unwrap_or("");
        queries
            .entry((m.stage, m.source_key.as_str(), scope))
            .or_insert((best.0, best.1, best.2, 0))
            .3 += 1;
    }

    let mut table = Table::new(
        ["stage", "source_key", "best_match", "score", "accepted", "scope", "rows"]
            .iter()
            .map(|h| h.to_string())
            .collect(),
    );
    for ((stage, key, scope), (best, score, accepted, rows)) in queries {
        table.push_row(vec![
            stage.to_string(),
            key.to_string(),
            best.to_string(),
            score.to_string(),
            if accepted { "yes" } else { "no" }.to_string(),
            scope.to_string(),
            rows.to_string(),
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes::{GeoCode, Provenance};
    use crate::config::RegistryColumns;
    use crate::registry::load_registry;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn index() -> RegistryIndex {
        let registry = Table {
            headers: headers(&["CVE_ENT", "NOM_ENT", "CVE_MUN", "NOM_MUN", "CVE_LOC", "NOM_LOC", "POB_TOTAL"]),
            rows: vec![headers(&[
                "30",
                "Veracruz de Ignacio de la Llave",
                "87",
                "Xalapa",
                "1",
                "Xalapa-Enríquez",
                "400000",
            ])],
        };
        RegistryIndex::build(load_registry(&registry, &RegistryColumns::default()).unwrap())
    }

    #[test]
    fn schema_renames_and_drops() {
        let mut config = OutputConfig::default();
        config.rename.insert("BENEF".into(), "Beneficiario".into());
        config.drop.push("ZONA".into());
        let schema = OutputSchema::build(&headers(&["BENEF", "ZONA", "MONTO"]), &config, false).unwrap();
        assert_eq!(
            schema.headers(),
            headers(&[
                "Beneficiario",
                "MONTO",
                "Clave de entidad",
                "Entidad federativa",
                "Clave de municipio",
                "Municipio",
                "Puntaje"
            ])
        );
    }

    #[test]
    fn schema_rejects_collisions_and_unknown_columns() {
        let config = OutputConfig::default();
        let err = OutputSchema::build(&headers(&["Municipio", "MONTO"]), &config, false).unwrap_err();
        assert!(err.to_string().contains("'Municipio' appears twice"));

        let mut config = OutputConfig::default();
        config.drop.push("NOPE".into());
        let err = OutputSchema::build(&headers(&["MONTO"]), &config, false).unwrap_err();
        assert!(err.to_string().contains("no column 'NOPE'"));
    }

    #[test]
    fn enrich_writes_codes_and_canonical_names() {
        let index = index();
        let source = Table {
            headers: headers(&["ENTIDAD", "MUNICIPIO", "LOCALIDAD"]),
            rows: vec![headers(&["Veracruz", "Xalapa", "Xalapa"]), headers(&["Zzz", "", ""])],
        };
        let mut resolved = Resolution::default();
        resolved.set(GeoLevel::Entity, GeoCode::parse("30", GeoLevel::Entity).unwrap(), Provenance::Matched);
        resolved.set(GeoLevel::Municipality, GeoCode::parse("87", GeoLevel::Municipality).unwrap(), Provenance::Matched);
        resolved.set(GeoLevel::Locality, GeoCode::parse("9", GeoLevel::Locality).unwrap(), Provenance::Override);
        resolved.match_score = Some(100);

        let schema = OutputSchema::build(&source.headers, &OutputConfig::default(), true).unwrap();
        let table = enrich(&source, &[resolved, Resolution::default()], &index, &schema);
        assert_eq!(table.headers.len(), 10);
        assert_eq!(
            table.rows[0][3..],
            headers(&["30", "Veracruz de Ignacio de la Llave", "087", "Xalapa", "0009", "", "100"])[..]
        );
        assert!(table.rows[1][3..].iter().all(String::is_empty));
    }

    fn query(row: usize, stage: GeoLevel, key: &str, outcome: MatchOutcome) -> MatchResult {
        MatchResult {
            row,
            stage,
            source_key: key.into(),
            matched_key: None,
            score: None,
            outcome,
            scope: Some("states".into()),
            best_rejected: None,
        }
    }

    #[test]
    fn match_table_lists_each_query_once() {
        let mut accepted = query(0, GeoLevel::Entity, "veracruz", MatchOutcome::Matched);
        accepted.matched_key = Some("veracruz de ignacio de la llave".into());
        accepted.score = Some(100);
        let mut repeat = accepted.clone();
        repeat.row = 3;
        let mut rejected = query(1, GeoLevel::Entity, "pueblaa", MatchOutcome::NoMatch);
        rejected.best_rejected = Some(("puebla".into(), 92));
        let incomplete = query(2, GeoLevel::Entity, "nan", MatchOutcome::IncompleteKey);

        let table = match_table(&[accepted, rejected, incomplete, repeat]);
        assert_eq!(table.headers, headers(&["stage", "source_key", "best_match", "score", "accepted", "scope", "rows"]));
        assert_eq!(
            table.rows,
            vec![
                headers(&["entity", "pueblaa", "puebla", "92", "no", "states", "1"]),
                headers(&["entity", "veracruz", "veracruz de ignacio de la llave", "100", "yes", "states", "2"]),
            ]
        );
    }
}
