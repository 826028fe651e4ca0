//! Reference registry: typed rows, deduplication and the scoped candidate
//! index the resolver matches against.

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use crate::codes::{Codes, GeoCode, GeoLevel};
use crate::config::RegistryColumns;
use crate::error::ResolveError;
use crate::keys::{self, canonical_key, CompositeKey};
use crate::normalize::normalize_str;
use crate::table::Table;

const TABLE: &str = "registry";

/// One registry row with its normalized names and composite keys.
#[derive(Debug, Clone)]
pub struct GeoRecord {
    /// Row number in the registry table (0-based, header excluded).
    pub row: usize,
    pub entity_code: GeoCode,
    pub entity_name: String,
    pub municipality_code: GeoCode,
    pub municipality_name: String,
    pub locality_code: GeoCode,
    pub locality_name: String,
    pub population: u64,
    pub entity_norm: String,
    pub municipality_norm: String,
    pub locality_norm: String,
    pub state_key: CompositeKey,
    pub municipality_key: CompositeKey,
    pub locality_key: CompositeKey,
}

impl GeoRecord {
    pub fn codes(&self) -> Codes {
        Codes {
            entity: Some(self.entity_code.clone()),
            municipality: Some(self.municipality_code.clone()),
            locality: Some(self.locality_code.clone()),
        }
    }

    pub fn key(&self, level: GeoLevel) -> &CompositeKey {
        match level {
            GeoLevel::Entity => &self.state_key,
            GeoLevel::Municipality => &self.municipality_key,
            GeoLevel::Locality => &self.locality_key,
        }
    }
}

/// Parse the registry table. Every mapped column is required; exact
/// duplicate rows are dropped (first kept).
pub fn load_registry(table: &Table, columns: &RegistryColumns) -> Result<Vec<GeoRecord>, ResolveError> {
    let idx = |name: &str| table.column_index(TABLE, name);
    let entity_code_idx = idx(&columns.entity_code)?;
    let entity_name_idx = idx(&columns.entity_name)?;
    let mun_code_idx = idx(&columns.municipality_code)?;
    let mun_name_idx = idx(&columns.municipality_name)?;
    let loc_code_idx = idx(&columns.locality_code)?;
    let loc_name_idx = idx(&columns.locality_name)?;
    let population_idx = idx(&columns.population)?;

    let mut seen: BTreeSet<&[String]> = BTreeSet::new();
    let mut records = Vec::with_capacity(table.len());

    for (row, cells) in table.rows.iter().enumerate() {
        if !seen.insert(cells.as_slice()) {
            continue;
        }
        let text = |col: usize| table.cell(row, col).unwrap_or("").trim().to_string();
        let code = |col: usize, level: GeoLevel| -> Result<GeoCode, ResolveError> {
            let raw = table.cell(row, col).unwrap_or("");
            GeoCode::parse(raw, level).ok_or_else(|| ResolveError::InvalidCode {
                table: TABLE.into(),
                row,
                level: level.name(),
                value: raw.into(),
            })
        };

        let entity_name = text(entity_name_idx);
        let municipality_name = text(mun_name_idx);
        let locality_name = text(loc_name_idx);
        let entity_norm = normalize_str(&entity_name);
        let municipality_norm = normalize_str(&municipality_name);
        let locality_norm = normalize_str(&locality_name);

        records.push(GeoRecord {
            row,
            entity_code: code(entity_code_idx, GeoLevel::Entity)?,
            municipality_code: code(mun_code_idx, GeoLevel::Municipality)?,
            locality_code: code(loc_code_idx, GeoLevel::Locality)?,
            population: parse_population(row, table.cell(row, population_idx))?,
            state_key: keys::join_segments(&[Some(entity_norm.as_str())]),
            municipality_key: keys::join_segments(&[
                Some(entity_norm.as_str()),
                Some(municipality_norm.as_str()),
            ]),
            locality_key: keys::join_segments(&[
                Some(municipality_norm.as_str()),
                Some(locality_norm.as_str()),
            ]),
            entity_name,
            municipality_name,
            locality_name,
            entity_norm,
            municipality_norm,
            locality_norm,
        });
    }

    let dropped = table.len() - records.len();
    if dropped > 0 {
        debug!(dropped, "registry: exact duplicate rows removed");
    }
    Ok(records)
}

fn parse_population(row: usize, raw: Option<&str>) -> Result<u64, ResolveError> {
    let Some(raw) = raw else {
        return Ok(0);
    };
    let trimmed = raw.trim();
    let digits = trimmed.strip_suffix(".0").unwrap_or(trimmed);
    digits.parse::<u64>().map_err(|_| ResolveError::InvalidPopulation {
        row,
        value: raw.into(),
    })
}

/// Keep one row per key: the largest population, first-encountered on ties.
///
/// Returns a filtered view in first-seen key order; the input is untouched.
pub fn dedup_by_key<'a, K, F>(records: &'a [GeoRecord], key: F) -> Vec<&'a GeoRecord>
where
    K: Ord,
    F: Fn(&GeoRecord) -> K,
{
    let mut slot_of: BTreeMap<K, usize> = BTreeMap::new();
    let mut kept: Vec<&GeoRecord> = Vec::new();
    for record in records {
        match slot_of.get(&key(record)) {
            Some(&slot) => {
                if record.population > kept[slot].population {
                    kept[slot] = record;
                }
            }
            None => {
                slot_of.insert(key(record), kept.len());
                kept.push(record);
            }
        }
    }
    kept
}

// ---------------------------------------------------------------------------
// Candidate sets
// ---------------------------------------------------------------------------

/// Candidate keys paired with the registry record each one stands for.
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    pub keys: Vec<String>,
    pub records: Vec<usize>,
}

impl CandidateSet {
    fn push(&mut self, key: &CompositeKey, record: usize) {
        self.keys.push(key.text.clone());
        self.records.push(record);
    }

    fn extend(&mut self, other: &CandidateSet) {
        self.keys.extend(other.keys.iter().cloned());
        self.records.extend(other.records.iter().copied());
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Which slice of the registry a query is matched against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scope {
    /// All states.
    States,
    /// Municipalities of one resolved entity.
    Entity(GeoCode),
    /// Municipalities of every entity carrying this normalized name.
    EntitiesNamed(String),
    /// Every municipality in the registry.
    AllMunicipalities,
    /// Localities of one resolved municipality.
    Municipality(GeoCode, GeoCode),
    /// Localities of municipalities carrying this normalized name,
    /// restricted to one entity when it is known.
    MunicipalitiesNamed {
        entity: Option<GeoCode>,
        name: String,
    },
}

impl Scope {
    /// True for scopes derived from source text rather than a resolved code.
    /// Matches under these scopes can land in the wrong containing entity.
    pub fn is_raw_text_fallback(&self) -> bool {
        matches!(
            self,
            Scope::EntitiesNamed(_) | Scope::AllMunicipalities | Scope::MunicipalitiesNamed { .. }
        )
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::States => write!(f, "states"),
            Self::Entity(e) => write!(f, "entity {e}"),
            Self::EntitiesNamed(name) => write!(f, "entities named '{name}'"),
            Self::AllMunicipalities => write!(f, "all municipalities"),
            Self::Municipality(e, m) => write!(f, "municipality {e}/{m}"),
            Self::MunicipalitiesNamed { entity: Some(e), name } => {
                write!(f, "municipalities named '{name}' in entity {e}")
            }
            Self::MunicipalitiesNamed { entity: None, name } => {
                write!(f, "municipalities named '{name}'")
            }
        }
    }
}

/// Deduplicated, scoped view of the registry. Built once per run and shared
/// read-only by every resolver stage.
#[derive(Debug)]
pub struct RegistryIndex {
    records: Vec<GeoRecord>,
    states: CandidateSet,
    municipalities: BTreeMap<GeoCode, CandidateSet>,
    localities: BTreeMap<(GeoCode, GeoCode), CandidateSet>,
    entities_by_name: BTreeMap<String, Vec<GeoCode>>,
    municipalities_by_name: BTreeMap<String, Vec<(GeoCode, GeoCode)>>,
    state_keys: BTreeMap<String, usize>,
    municipality_keys: BTreeMap<String, usize>,
    locality_keys: BTreeMap<String, Vec<usize>>,
    entity_rows: BTreeMap<GeoCode, usize>,
    municipality_rows: BTreeMap<(GeoCode, GeoCode), usize>,
    locality_rows: BTreeMap<(GeoCode, GeoCode, GeoCode), usize>,
}

impl RegistryIndex {
    pub fn build(records: Vec<GeoRecord>) -> Self {
        let pos_of: BTreeMap<usize, usize> =
            records.iter().enumerate().map(|(i, r)| (r.row, i)).collect();
        let at = |r: &GeoRecord| pos_of[&r.row];

        let mut states = CandidateSet::default();
        let mut state_keys = BTreeMap::new();
        let mut entities_by_name: BTreeMap<String, Vec<GeoCode>> = BTreeMap::new();
        for r in dedup_by_key(&records, |r| r.state_key.text.clone()) {
            states.push(&r.state_key, at(r));
            state_keys.entry(canonical_key(&r.state_key.text)).or_insert(at(r));
            let codes = entities_by_name.entry(r.entity_norm.clone()).or_default();
            if !codes.contains(&r.entity_code) {
                codes.push(r.entity_code.clone());
            }
        }

        let mut municipalities: BTreeMap<GeoCode, CandidateSet> = BTreeMap::new();
        let mut municipality_keys = BTreeMap::new();
        let mut municipalities_by_name: BTreeMap<String, Vec<(GeoCode, GeoCode)>> = BTreeMap::new();
        for r in dedup_by_key(&records, |r| r.municipality_key.text.clone()) {
            municipalities
                .entry(r.entity_code.clone())
                .or_default()
                .push(&r.municipality_key, at(r));
            municipality_keys.entry(canonical_key(&r.municipality_key.text)).or_insert(at(r));
            let codes = (r.entity_code.clone(), r.municipality_code.clone());
            let named = municipalities_by_name.entry(r.municipality_norm.clone()).or_default();
            if !named.contains(&codes) {
                named.push(codes);
            }
        }

        let mut localities: BTreeMap<(GeoCode, GeoCode), CandidateSet> = BTreeMap::new();
        let mut locality_keys: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for r in dedup_by_key(&records, |r| (r.entity_code.clone(), r.locality_key.text.clone())) {
            localities
                .entry((r.entity_code.clone(), r.municipality_code.clone()))
                .or_default()
                .push(&r.locality_key, at(r));
            locality_keys.entry(canonical_key(&r.locality_key.text)).or_default().push(at(r));
        }

        // Code lookups cover every row, including those deduplicated away
        // from the candidate sets, so any valid code has a canonical name.
        let mut entity_rows = BTreeMap::new();
        let mut municipality_rows = BTreeMap::new();
        let mut locality_rows = BTreeMap::new();
        for (i, r) in records.iter().enumerate() {
            entity_rows.entry(r.entity_code.clone()).or_insert(i);
            municipality_rows
                .entry((r.entity_code.clone(), r.municipality_code.clone()))
                .or_insert(i);
            locality_rows
                .entry((r.entity_code.clone(), r.municipality_code.clone(), r.locality_code.clone()))
                .or_insert(i);
        }

        info!(
            rows = records.len(),
            states = states.len(),
            municipalities = municipality_keys.len(),
            localities = locality_rows.len(),
            "registry indexed"
        );

        Self {
            records,
            states,
            municipalities,
            localities,
            entities_by_name,
            municipalities_by_name,
            state_keys,
            municipality_keys,
            locality_keys,
            entity_rows,
            municipality_rows,
            locality_rows,
        }
    }

    pub fn record(&self, index: usize) -> &GeoRecord {
        &self.records[index]
    }

    pub fn records(&self) -> &[GeoRecord] {
        &self.records
    }

    /// Candidates for a scope. Borrowed when the scope maps onto one
    /// precomputed set, assembled when it spans several.
    pub fn candidates(&self, scope: &Scope) -> Cow<'_, CandidateSet> {
        match scope {
            Scope::States => Cow::Borrowed(&self.states),
            Scope::Entity(entity) => self.borrowed_or_empty(self.municipalities.get(entity)),
            Scope::EntitiesNamed(name) => {
                let mut set = CandidateSet::default();
                for code in self.entities_by_name.get(name).into_iter().flatten() {
                    if let Some(s) = self.municipalities.get(code) {
                        set.extend(s);
                    }
                }
                Cow::Owned(set)
            }
            Scope::AllMunicipalities => {
                let mut set = CandidateSet::default();
                for s in self.municipalities.values() {
                    set.extend(s);
                }
                Cow::Owned(set)
            }
            Scope::Municipality(entity, municipality) => {
                self.borrowed_or_empty(self.localities.get(&(entity.clone(), municipality.clone())))
            }
            Scope::MunicipalitiesNamed { entity, name } => {
                let mut set = CandidateSet::default();
                for (e, m) in self.municipalities_by_name.get(name).into_iter().flatten() {
                    if entity.as_ref().is_some_and(|want| want != e) {
                        continue;
                    }
                    if let Some(s) = self.localities.get(&(e.clone(), m.clone())) {
                        set.extend(s);
                    }
                }
                Cow::Owned(set)
            }
        }
    }

    fn borrowed_or_empty<'a>(&'a self, set: Option<&'a CandidateSet>) -> Cow<'a, CandidateSet> {
        match set {
            Some(s) => Cow::Borrowed(s),
            None => Cow::Owned(CandidateSet::default()),
        }
    }

    /// Entity codes whose normalized name equals `name`.
    pub fn entities_named(&self, name: &str) -> &[GeoCode] {
        self.entities_by_name.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_municipality_named(&self, name: &str, entity: Option<&GeoCode>) -> bool {
        self.municipalities_by_name
            .get(name)
            .is_some_and(|v| v.iter().any(|(e, _)| entity.map_or(true, |want| want == e)))
    }

    /// Lookup of a registry composite key in [`canonical_key`] form. Locality
    /// keys can map to several records (one per entity sharing a
    /// municipality name).
    pub fn find_key(&self, level: GeoLevel, key: &str) -> Vec<usize> {
        let key = canonical_key(key);
        match level {
            GeoLevel::Entity => self.state_keys.get(&key).copied().into_iter().collect(),
            GeoLevel::Municipality => self.municipality_keys.get(&key).copied().into_iter().collect(),
            GeoLevel::Locality => self.locality_keys.get(&key).cloned().unwrap_or_default(),
        }
    }

    /// Registry record standing for the given codes at the finest level
    /// present. Used for canonical names in the output.
    pub fn record_for(&self, codes: &Codes) -> Option<&GeoRecord> {
        let entity = codes.entity.as_ref()?;
        let row = match (&codes.municipality, &codes.locality) {
            (Some(m), Some(l)) => self
                .locality_rows
                .get(&(entity.clone(), m.clone(), l.clone()))
                .copied(),
            (Some(m), None) => self.municipality_rows.get(&(entity.clone(), m.clone())).copied(),
            _ => self.entity_rows.get(entity).copied(),
        }?;
        Some(&self.records[row])
    }

    pub fn has_entity(&self, code: &GeoCode) -> bool {
        self.entity_rows.contains_key(code)
    }

    /// Fail when a configured entity has no candidate set.
    pub fn validate_expected_entities(&self, expected: &[String]) -> Result<(), ResolveError> {
        for name in expected {
            let norm = normalize_str(name);
            let has_rows = self
                .entities_named(&norm)
                .iter()
                .any(|code| self.municipalities.get(code).is_some_and(|s| !s.is_empty()));
            if !has_rows {
                return Err(ResolveError::MissingEntityScope(name.clone()));
            }
        }
        Ok(())
    }
}
