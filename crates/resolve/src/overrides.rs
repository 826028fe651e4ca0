//! Curated override tables and their reconciliation over automated matches.
//!
//! An override maps a source composite key to validated codes. Overrides
//! always win over the resolver, even when the resolver matched with a
//! perfect score.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::codes::{Codes, GeoCode, GeoLevel, Provenance};
use crate::config::{DuplicatePolicy, OverrideSpec, OverrideTargetColumns};
use crate::error::ResolveError;
use crate::keys::canonical_key;
use crate::model::{Resolution, SourceRecord};
use crate::registry::RegistryIndex;
use crate::table::Table;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideEntry {
    /// Row in the override table the entry was read from.
    pub row: usize,
    /// Codes down to the table's grain.
    pub codes: Codes,
}

/// One loaded override table, keyed by [`canonical_key`].
#[derive(Debug, Clone)]
pub struct OverrideTable {
    pub name: String,
    pub grain: GeoLevel,
    pub entries: BTreeMap<String, OverrideEntry>,
}

impl OverrideTable {
    pub fn from_table(table: &Table, spec: &OverrideSpec, index: &RegistryIndex) -> Result<Self, ResolveError> {
        let role = format!("override:{}", spec.name);
        let key_idx = table.column_index(&role, &spec.key_column)?;
        let target = TargetReader::new(table, &role, spec, index)?;

        let mut entries: BTreeMap<String, OverrideEntry> = BTreeMap::new();
        for row in 0..table.len() {
            let key = canonical_key(table.cell(row, key_idx).unwrap_or(""));
            if key.is_empty() {
                debug!(table = %spec.name, row, "override row without key skipped");
                continue;
            }
            let entry = OverrideEntry {
                row,
                codes: target.codes(row, &key)?,
            };
            match entries.get(&key) {
                Some(existing) if existing.codes == entry.codes => {}
                Some(existing) => match spec.on_duplicate {
                    DuplicatePolicy::Reject => {
                        return Err(ResolveError::DuplicateOverrideKey {
                            table: spec.name.clone(),
                            key,
                        });
                    }
                    DuplicatePolicy::LastWins => {
                        warn!(
                            table = %spec.name,
                            key = %key,
                            replaced = %existing.codes,
                            with = %entry.codes,
                            "duplicate override key, last row wins"
                        );
                        entries.insert(key, entry);
                    }
                },
                None => {
                    entries.insert(key, entry);
                }
            }
        }

        info!(table = %spec.name, grain = %spec.grain, entries = entries.len(), "override table loaded");
        Ok(Self {
            name: spec.name.clone(),
            grain: spec.grain,
            entries,
        })
    }
}

/// Reads the target codes of one override row, either from explicit code
/// columns or through a registry key lookup.
enum TargetReader<'a> {
    Codes {
        grain: GeoLevel,
        role: &'a str,
        table: &'a Table,
        columns: [Option<usize>; 3],
    },
    RegistryKey {
        grain: GeoLevel,
        name: &'a str,
        table: &'a Table,
        column: usize,
        entity_column: Option<usize>,
        index: &'a RegistryIndex,
    },
}

impl<'a> TargetReader<'a> {
    fn new(
        table: &'a Table,
        role: &'a str,
        spec: &'a OverrideSpec,
        index: &'a RegistryIndex,
    ) -> Result<Self, ResolveError> {
        let lookup = |name: &Option<String>| -> Result<Option<usize>, ResolveError> {
            name.as_deref().map(|n| table.column_index(role, n)).transpose()
        };
        match &spec.target {
            OverrideTargetColumns::Codes {
                entity_code,
                municipality_code,
                locality_code,
            } => Ok(Self::Codes {
                grain: spec.grain,
                role,
                table,
                columns: [lookup(entity_code)?, lookup(municipality_code)?, lookup(locality_code)?],
            }),
            OverrideTargetColumns::RegistryKey {
                column,
                entity_code_column,
            } => Ok(Self::RegistryKey {
                grain: spec.grain,
                name: &spec.name,
                table,
                column: table.column_index(role, column)?,
                entity_column: lookup(entity_code_column)?,
                index,
            }),
        }
    }

    fn codes(&self, row: usize, key: &str) -> Result<Codes, ResolveError> {
        match self {
            Self::Codes {
                grain,
                role,
                table,
                columns,
            } => {
                let mut codes = Codes::default();
                for (level, col) in GeoLevel::ALL.into_iter().zip(columns) {
                    if level > *grain {
                        break;
                    }
                    let raw = col.and_then(|c| table.cell(row, c)).unwrap_or("");
                    let code = GeoCode::parse(raw, level).ok_or_else(|| ResolveError::InvalidCode {
                        table: role.to_string(),
                        row,
                        level: level.name(),
                        value: raw.into(),
                    })?;
                    set_level(&mut codes, level, code);
                }
                Ok(codes)
            }
            Self::RegistryKey {
                grain,
                name,
                table,
                column,
                entity_column,
                index,
            } => {
                let target = table.cell(row, *column).unwrap_or("");
                let mut found = index.find_key(*grain, target);
                if let Some(col) = entity_column {
                    if let Some(entity) = table
                        .cell(row, *col)
                        .and_then(|raw| GeoCode::parse(raw, GeoLevel::Entity))
                    {
                        found.retain(|&i| index.record(i).entity_code == entity);
                    }
                }
                match found.as_slice() {
                    [] => Err(ResolveError::UnknownOverrideTarget {
                        table: name.to_string(),
                        row,
                        key: target.to_string(),
                    }),
                    [single] => {
                        let full = index.record(*single).codes();
                        let mut codes = Codes::default();
                        for level in GeoLevel::ALL.into_iter().filter(|l| l <= grain) {
                            if let Some(code) = full.get(level) {
                                set_level(&mut codes, level, code.clone());
                            }
                        }
                        Ok(codes)
                    }
                    several => {
                        debug!(table = %name, row, key, "registry key shared by several entities");
                        Err(ResolveError::AmbiguousOverrideTarget {
                            table: name.to_string(),
                            row,
                            key: target.to_string(),
                            entities: several
                                .iter()
                                .map(|&i| index.record(i).entity_code.to_string())
                                .collect(),
                        })
                    }
                }
            }
        }
    }
}

fn set_level(codes: &mut Codes, level: GeoLevel, code: GeoCode) {
    match level {
        GeoLevel::Entity => codes.entity = Some(code),
        GeoLevel::Municipality => codes.municipality = Some(code),
        GeoLevel::Locality => codes.locality = Some(code),
    }
}

// ---------------------------------------------------------------------------
// Merged set
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideHit {
    pub table: String,
    pub codes: Codes,
}

/// All override tables merged per grain. Building it fails on any key that
/// two tables map to different codes.
#[derive(Debug, Clone, Default)]
pub struct OverrideSet {
    grains: BTreeMap<GeoLevel, BTreeMap<String, OverrideHit>>,
}

impl OverrideSet {
    pub fn build(tables: Vec<OverrideTable>) -> Result<Self, ResolveError> {
        let mut grains: BTreeMap<GeoLevel, BTreeMap<String, OverrideHit>> = BTreeMap::new();
        for table in tables {
            let merged = grains.entry(table.grain).or_default();
            for (key, entry) in table.entries {
                match merged.get(&key) {
                    Some(hit) if hit.codes == entry.codes => {}
                    Some(hit) => {
                        return Err(ResolveError::OverrideConflict {
                            grain: table.grain.to_string(),
                            key,
                            first_table: hit.table.clone(),
                            first: hit.codes.to_string(),
                            second_table: table.name,
                            second: entry.codes.to_string(),
                        });
                    }
                    None => {
                        merged.insert(
                            key,
                            OverrideHit {
                                table: table.name.clone(),
                                codes: entry.codes,
                            },
                        );
                    }
                }
            }
        }
        Ok(Self { grains })
    }

    pub fn lookup(&self, grain: GeoLevel, key: &str) -> Option<&OverrideHit> {
        self.grains.get(&grain)?.get(&canonical_key(key))
    }

    pub fn len(&self) -> usize {
        self.grains.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedOverride {
    pub row: usize,
    pub grain: GeoLevel,
    pub table: String,
}

/// An automated code dropped because an override moved its containing code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invalidation {
    pub row: usize,
    pub level: GeoLevel,
    pub previous: GeoCode,
    pub table: String,
}

#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    pub resolutions: Vec<Resolution>,
    pub applied: Vec<AppliedOverride>,
    pub invalidated: Vec<Invalidation>,
}

/// Apply overrides coarse to fine. An override replaces every code down to
/// its grain. Automated codes finer than the grain are cleared when the
/// override moved a code containing them. When overrides of two grains hit
/// the same row and disagree on a shared level, the finer one wins.
///
/// `match_score` and `match_stage` of a touched row are re-derived from the
/// finest code that is still a fuzzy match.
pub fn reconcile(resolutions: &[Resolution], sources: &[SourceRecord], overrides: &OverrideSet) -> Reconciliation {
    let mut out = Reconciliation {
        resolutions: resolutions.to_vec(),
        ..Reconciliation::default()
    };
    if overrides.is_empty() {
        return out;
    }

    for (source, resolution) in sources.iter().zip(out.resolutions.iter_mut()) {
        let mut touched = false;
        for grain in GeoLevel::ALL {
            let Some(key) = source.key(grain) else {
                continue;
            };
            let Some(hit) = overrides.lookup(grain, key.as_str()) else {
                continue;
            };
            touched = true;

            // A coarser override already applied to this row loses to this one.
            for level in GeoLevel::ALL.into_iter().filter(|l| *l < grain) {
                let Some(earlier) = resolution.get(level) else {
                    continue;
                };
                if earlier.provenance == Provenance::Override && hit.codes.get(level) != Some(&earlier.code) {
                    warn!(
                        row = source.row,
                        level = %level,
                        replaced = %earlier.code,
                        table = %hit.table,
                        "finer override contradicts a coarser one; the finer one wins"
                    );
                }
            }

            let moved = GeoLevel::ALL
                .into_iter()
                .filter(|l| *l <= grain)
                .any(|l| resolution.code(l) != hit.codes.get(l));
            for level in GeoLevel::ALL.into_iter().filter(|l| *l <= grain) {
                if let Some(code) = hit.codes.get(level) {
                    resolution.set(level, code.clone(), Provenance::Override);
                }
            }
            if moved {
                for finer in GeoLevel::ALL.into_iter().filter(|l| *l > grain) {
                    let Some(stale) = resolution.get(finer) else {
                        continue;
                    };
                    if stale.provenance == Provenance::Override {
                        continue;
                    }
                    out.invalidated.push(Invalidation {
                        row: source.row,
                        level: finer,
                        previous: stale.code.clone(),
                        table: hit.table.clone(),
                    });
                    resolution.clear(finer);
                }
            }
            out.applied.push(AppliedOverride {
                row: source.row,
                grain,
                table: hit.table.clone(),
            });
        }
        if touched {
            resolution.refresh_match();
        }
    }

    info!(
        applied = out.applied.len(),
        invalidated = out.invalidated.len(),
        "overrides reconciled"
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RegistryColumns, SourceColumns};
    use crate::model::load_sources;
    use crate::registry::load_registry;

    fn table(headers: &[&str], rows: &[&[&str]]) -> Table {
        Table {
            headers: headers.iter().map(|s| s.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
        }
    }

    fn index() -> RegistryIndex {
        let registry = table(
            &["CVE_ENT", "NOM_ENT", "CVE_MUN", "NOM_MUN", "CVE_LOC", "NOM_LOC", "POB_TOTAL"],
            &[
                &["12", "Guerrero", "1", "Acapulco de Juárez", "1", "Acapulco de Juárez", "700000"],
                &["12", "Guerrero", "1", "Acapulco de Juárez", "2", "Kilómetro 30", "1500"],
                &["12", "Guerrero", "99", "Tlacoachistlahuaca", "1", "Tlacoachistlahuaca", "5000"],
                &["20", "Oaxaca", "1", "San Juan", "1", "Centro", "10"],
                &["21", "Puebla", "5", "San Juan", "1", "Centro", "10"],
            ],
        );
        RegistryIndex::build(load_registry(&registry, &RegistryColumns::default()).unwrap())
    }

    fn codes_spec(name: &str, grain: GeoLevel) -> OverrideSpec {
        OverrideSpec {
            name: name.into(),
            grain,
            file: crate::config::FileSpec {
                file: format!("{name}.csv"),
                encoding: "utf-8".into(),
                delimiter: None,
            },
            key_column: "KEY".into(),
            target: OverrideTargetColumns::Codes {
                entity_code: Some("CVE_ENT".into()),
                municipality_code: Some("CVE_MUN".into()),
                locality_code: Some("CVE_LOC".into()),
            },
            on_duplicate: DuplicatePolicy::LastWins,
        }
    }

    fn registry_key_spec(name: &str, grain: GeoLevel, entity_column: Option<&str>) -> OverrideSpec {
        OverrideSpec {
            target: OverrideTargetColumns::RegistryKey {
                column: "KEY_INEGI".into(),
                entity_code_column: entity_column.map(String::from),
            },
            ..codes_spec(name, grain)
        }
    }

    fn code(level: GeoLevel, raw: &str) -> Option<GeoCode> {
        GeoCode::parse(raw, level)
    }

    #[test]
    fn codes_target_reads_down_to_grain() {
        let index = index();
        let t = table(
            &["KEY", "CVE_ENT", "CVE_MUN", "CVE_LOC"],
            &[&["Guerrero-Acapulco", "12", "1", "2"]],
        );
        let loaded = OverrideTable::from_table(&t, &codes_spec("mun", GeoLevel::Municipality), &index).unwrap();
        let entry = &loaded.entries["guerrero acapulco"];
        assert_eq!(entry.codes.entity, code(GeoLevel::Entity, "12"));
        assert_eq!(entry.codes.municipality, code(GeoLevel::Municipality, "1"));
        assert!(entry.codes.locality.is_none());
    }

    #[test]
    fn registry_key_target_resolves_codes() {
        let index = index();
        let t = table(
            &["KEY", "KEY_INEGI"],
            &[&["guerrero-acapulco", "GUERRERO-Acapulco de Juárez"]],
        );
        let loaded =
            OverrideTable::from_table(&t, &registry_key_spec("mun", GeoLevel::Municipality, None), &index).unwrap();
        let entry = &loaded.entries["guerrero acapulco"];
        assert_eq!(entry.codes.to_string(), "12/001/_");
    }

    #[test]
    fn unknown_registry_key_fails() {
        let index = index();
        let t = table(&["KEY", "KEY_INEGI"], &[&["guerrero-acapulco", "guerrero-acapulquito"]]);
        let err = OverrideTable::from_table(&t, &registry_key_spec("mun", GeoLevel::Municipality, None), &index)
            .unwrap_err();
        assert!(matches!(err, ResolveError::UnknownOverrideTarget { row: 0, .. }));
    }

    #[test]
    fn shared_locality_key_needs_entity_column() {
        let index = index();
        let t = table(&["KEY", "KEY_INEGI", "ENT"], &[&["san juan-el centro", "san juan-centro", "21"]]);
        let err = OverrideTable::from_table(&t, &registry_key_spec("loc", GeoLevel::Locality, None), &index)
            .unwrap_err();
        assert!(
            matches!(err, ResolveError::AmbiguousOverrideTarget { ref entities, .. } if entities == &vec!["20".to_string(), "21".to_string()])
        );

        let loaded =
            OverrideTable::from_table(&t, &registry_key_spec("loc", GeoLevel::Locality, Some("ENT")), &index)
                .unwrap();
        assert_eq!(loaded.entries["san juan el centro"].codes.to_string(), "21/005/0001");
    }

    #[test]
    fn duplicate_keys_follow_policy() {
        let index = index();
        let t = table(
            &["KEY", "CVE_ENT", "CVE_MUN", "CVE_LOC"],
            &[&["k1", "12", "1", "1"], &["K1 ", "12", "1", "2"], &["k2", "12", "1", "1"], &["k2", "12", "1", "1"]],
        );
        let loaded = OverrideTable::from_table(&t, &codes_spec("loc", GeoLevel::Locality), &index).unwrap();
        assert_eq!(loaded.entries.len(), 2);
        assert_eq!(loaded.entries["k1"].codes.locality, code(GeoLevel::Locality, "2"));
        assert_eq!(loaded.entries["k1"].row, 1);

        let mut reject = codes_spec("loc", GeoLevel::Locality);
        reject.on_duplicate = DuplicatePolicy::Reject;
        let err = OverrideTable::from_table(&t, &reject, &index).unwrap_err();
        assert!(matches!(err, ResolveError::DuplicateOverrideKey { ref key, .. } if key == "k1"));
    }

    #[test]
    fn invalid_code_cell_is_fatal() {
        let index = index();
        let t = table(&["KEY", "CVE_ENT", "CVE_MUN", "CVE_LOC"], &[&["k1", "12", "", "1"]]);
        let err = OverrideTable::from_table(&t, &codes_spec("loc", GeoLevel::Locality), &index).unwrap_err();
        assert!(matches!(err, ResolveError::InvalidCode { level: "municipality", .. }));
    }

    #[test]
    fn conflicting_tables_fail_the_set() {
        let index = index();
        let a = table(&["KEY", "CVE_ENT", "CVE_MUN", "CVE_LOC"], &[&["k1", "12", "1", ""]]);
        let b = table(&["KEY", "CVE_ENT", "CVE_MUN", "CVE_LOC"], &[&["k1", "12", "99", ""]]);
        let tables = vec![
            OverrideTable::from_table(&a, &codes_spec("mun_2021", GeoLevel::Municipality), &index).unwrap(),
            OverrideTable::from_table(&b, &codes_spec("mun_2022", GeoLevel::Municipality), &index).unwrap(),
        ];
        let err = OverrideSet::build(tables).unwrap_err();
        assert!(matches!(
            err,
            ResolveError::OverrideConflict { ref first_table, ref second_table, .. }
                if first_table == "mun_2021" && second_table == "mun_2022"
        ));
    }

    #[test]
    fn identical_entries_across_tables_collapse() {
        let index = index();
        let a = table(&["KEY", "CVE_ENT", "CVE_MUN", "CVE_LOC"], &[&["k1", "12", "1", ""]]);
        let tables = vec![
            OverrideTable::from_table(&a, &codes_spec("a", GeoLevel::Municipality), &index).unwrap(),
            OverrideTable::from_table(&a, &codes_spec("b", GeoLevel::Municipality), &index).unwrap(),
        ];
        let set = OverrideSet::build(tables).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.lookup(GeoLevel::Municipality, "K1").unwrap().table, "a");
    }

    fn matched(entity: &str, municipality: &str, locality: Option<&str>) -> Resolution {
        let mut r = Resolution::default();
        r.set(GeoLevel::Entity, code(GeoLevel::Entity, entity).unwrap(), Provenance::Matched);
        r.set(GeoLevel::Municipality, code(GeoLevel::Municipality, municipality).unwrap(), Provenance::Matched);
        if let Some(l) = locality {
            r.set(GeoLevel::Locality, code(GeoLevel::Locality, l).unwrap(), Provenance::Matched);
        }
        r
    }

    fn sources() -> Vec<SourceRecord> {
        let columns = SourceColumns {
            locality: Some("LOCALIDAD".into()),
            ..SourceColumns::default()
        };
        load_sources(
            &table(&["ENTIDAD", "MUNICIPIO", "LOCALIDAD"], &[&["Guerrero", "Acapulco", "Kilometro 30"]]),
            &columns,
        )
        .unwrap()
    }

    #[test]
    fn override_wins_over_automated_match() {
        let index = index();
        let t = table(&["KEY", "CVE_ENT", "CVE_MUN", "CVE_LOC"], &[&["guerrero-acapulco", "12", "99", ""]]);
        let set =
            OverrideSet::build(vec![OverrideTable::from_table(&t, &codes_spec("mun", GeoLevel::Municipality), &index).unwrap()])
                .unwrap();

        let out = reconcile(&[matched("12", "1", Some("2"))], &sources(), &set);
        let r = &out.resolutions[0];
        assert_eq!(r.code(GeoLevel::Municipality).unwrap().as_str(), "099");
        assert_eq!(r.municipality.as_ref().unwrap().provenance, Provenance::Override);
        assert_eq!(r.entity.as_ref().unwrap().provenance, Provenance::Override);
        // The matched locality belonged to municipality 001.
        assert!(r.locality.is_none());
        assert_eq!(out.invalidated.len(), 1);
        assert_eq!(out.invalidated[0].previous.as_str(), "0002");
        assert_eq!(out.applied, vec![AppliedOverride { row: 0, grain: GeoLevel::Municipality, table: "mun".into() }]);
    }

    #[test]
    fn confirming_override_keeps_finer_codes() {
        let index = index();
        let t = table(&["KEY", "CVE_ENT", "CVE_MUN", "CVE_LOC"], &[&["guerrero-acapulco", "12", "1", ""]]);
        let set =
            OverrideSet::build(vec![OverrideTable::from_table(&t, &codes_spec("mun", GeoLevel::Municipality), &index).unwrap()])
                .unwrap();
        let out = reconcile(&[matched("12", "1", Some("2"))], &sources(), &set);
        assert_eq!(out.resolutions[0].code(GeoLevel::Locality).unwrap().as_str(), "0002");
        assert!(out.invalidated.is_empty());
    }

    fn scored(entity: &str, municipality: &str, locality: &str) -> Resolution {
        let mut r = Resolution::default();
        r.set_matched(GeoLevel::Entity, code(GeoLevel::Entity, entity).unwrap(), 100);
        r.set_matched(GeoLevel::Municipality, code(GeoLevel::Municipality, municipality).unwrap(), 97);
        r.set_matched(GeoLevel::Locality, code(GeoLevel::Locality, locality).unwrap(), 100);
        r.match_score = Some(100);
        r.match_stage = Some(GeoLevel::Locality);
        r
    }

    #[test]
    fn override_resets_stale_match_score() {
        let index = index();
        let t = table(&["KEY", "CVE_ENT", "CVE_MUN", "CVE_LOC"], &[&["guerrero-acapulco", "12", "99", ""]]);
        let set =
            OverrideSet::build(vec![OverrideTable::from_table(&t, &codes_spec("mun", GeoLevel::Municipality), &index).unwrap()])
                .unwrap();
        let out = reconcile(&[scored("12", "1", "2")], &sources(), &set);
        let r = &out.resolutions[0];
        assert!(r.locality.is_none());
        assert_eq!(r.match_score, None);
        assert_eq!(r.match_stage, None);
    }

    #[test]
    fn entity_override_keeps_surviving_match_score() {
        let index = index();
        let t = table(&["KEY", "CVE_ENT", "CVE_MUN", "CVE_LOC"], &[&["guerrero", "12", "", ""]]);
        let set =
            OverrideSet::build(vec![OverrideTable::from_table(&t, &codes_spec("ent", GeoLevel::Entity), &index).unwrap()])
                .unwrap();
        let out = reconcile(&[scored("12", "1", "2")], &sources(), &set);
        let r = &out.resolutions[0];
        assert_eq!(r.entity.as_ref().unwrap().provenance, Provenance::Override);
        assert_eq!(r.match_stage, Some(GeoLevel::Locality));
        assert_eq!(r.match_score, Some(100));
    }

    #[test]
    fn finer_override_wins_over_contradicting_coarser_one() {
        let index = index();
        let ent = table(&["KEY", "CVE_ENT", "CVE_MUN", "CVE_LOC"], &[&["guerrero", "20", "", ""]]);
        let mun = table(&["KEY", "CVE_ENT", "CVE_MUN", "CVE_LOC"], &[&["guerrero-acapulco", "12", "1", ""]]);
        let set = OverrideSet::build(vec![
            OverrideTable::from_table(&ent, &codes_spec("ent", GeoLevel::Entity), &index).unwrap(),
            OverrideTable::from_table(&mun, &codes_spec("mun", GeoLevel::Municipality), &index).unwrap(),
        ])
        .unwrap();
        let out = reconcile(&[Resolution::default()], &sources(), &set);
        let r = &out.resolutions[0];
        assert_eq!(r.codes().to_string(), "12/001/_");
        assert_eq!(r.entity.as_ref().unwrap().provenance, Provenance::Override);
        assert_eq!(out.applied.len(), 2);
        assert_eq!(out.applied[1].table, "mun");
    }

    #[test]
    fn locality_override_fills_unresolved_record() {
        let index = index();
        let t = table(&["KEY", "CVE_ENT", "CVE_MUN", "CVE_LOC"], &[&["acapulco-kilometro 30", "12", "1", "2"]]);
        let set =
            OverrideSet::build(vec![OverrideTable::from_table(&t, &codes_spec("loc", GeoLevel::Locality), &index).unwrap()])
                .unwrap();
        let out = reconcile(&[Resolution::default()], &sources(), &set);
        assert_eq!(out.resolutions[0].codes().to_string(), "12/001/0002");
    }
}
