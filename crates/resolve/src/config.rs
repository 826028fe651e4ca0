use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;

use crate::codes::GeoLevel;
use crate::error::ResolveError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ResolveConfig {
    pub name: String,
    pub registry: RegistryConfig,
    pub source: SourceConfig,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub overrides: Vec<OverrideSpec>,
    #[serde(default)]
    pub output: OutputConfig,
    /// Entity names that must have a candidate set in the registry.
    #[serde(default)]
    pub expected_entities: Vec<String>,
    /// Evaluate match queries on the rayon pool.
    #[serde(default = "default_parallel")]
    pub parallel: bool,
}

fn default_parallel() -> bool {
    true
}

// ---------------------------------------------------------------------------
// File location (read by the loader, never by the engine)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct FileSpec {
    pub file: String,
    /// WHATWG encoding label: `utf-8`, `windows-1252`, `latin1`, ...
    #[serde(default = "default_encoding")]
    pub encoding: String,
    /// Single ASCII field delimiter. Defaults to `,`.
    #[serde(default)]
    pub delimiter: Option<String>,
}

fn default_encoding() -> String {
    "utf-8".into()
}

impl FileSpec {
    pub fn delimiter_byte(&self) -> Result<u8, ResolveError> {
        match self.delimiter.as_deref() {
            None => Ok(b','),
            Some("\\t") | Some("tab") => Ok(b'\t'),
            Some(d) if d.len() == 1 && d.is_ascii() => Ok(d.as_bytes()[0]),
            Some(d) => Err(ResolveError::ConfigValidation(format!(
                "{}: delimiter must be a single ASCII character, got '{d}'",
                self.file
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    #[serde(flatten)]
    pub file: FileSpec,
    #[serde(default)]
    pub columns: RegistryColumns,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistryColumns {
    pub entity_code: String,
    pub entity_name: String,
    pub municipality_code: String,
    pub municipality_name: String,
    pub locality_code: String,
    pub locality_name: String,
    pub population: String,
}

impl Default for RegistryColumns {
    fn default() -> Self {
        Self {
            entity_code: "CVE_ENT".into(),
            entity_name: "NOM_ENT".into(),
            municipality_code: "CVE_MUN".into(),
            municipality_name: "NOM_MUN".into(),
            locality_code: "CVE_LOC".into(),
            locality_name: "NOM_LOC".into(),
            population: "POB_TOTAL".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(flatten)]
    pub file: FileSpec,
    #[serde(default)]
    pub columns: SourceColumns,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceColumns {
    pub entity: String,
    pub municipality: String,
    /// Without a locality column the locality stage is skipped.
    pub locality: Option<String>,
}

impl Default for SourceColumns {
    fn default() -> Self {
        Self {
            entity: "ENTIDAD".into(),
            municipality: "MUNICIPIO".into(),
            locality: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Thresholds
// ---------------------------------------------------------------------------

/// Minimum token-set score (0-100) accepted at each stage.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub state: u8,
    pub municipality: u8,
    pub locality: u8,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            state: 96,
            municipality: 96,
            locality: 85,
        }
    }
}

impl Thresholds {
    pub fn for_level(&self, level: GeoLevel) -> u8 {
        match level {
            GeoLevel::Entity => self.state,
            GeoLevel::Municipality => self.municipality,
            GeoLevel::Locality => self.locality,
        }
    }
}

// ---------------------------------------------------------------------------
// Overrides
// ---------------------------------------------------------------------------

/// One `[[overrides]]` table. Tables of the same grain must agree on every
/// shared key. Tables of different grains are applied coarse to fine, so when
/// an entity override and a municipality override hit the same row with
/// different entity codes, the municipality override's codes are kept (and a
/// warning is logged).
#[derive(Debug, Clone, Deserialize)]
pub struct OverrideSpec {
    pub name: String,
    /// Granularity of `key_column`: entity keys are `state`, municipality keys
    /// `state-municipality`, locality keys `municipality-locality`.
    pub grain: GeoLevel,
    #[serde(flatten)]
    pub file: FileSpec,
    pub key_column: String,
    pub target: OverrideTargetColumns,
    #[serde(default)]
    pub on_duplicate: DuplicatePolicy,
}

/// Where an override row's validated codes come from.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OverrideTargetColumns {
    /// Explicit code columns.
    Codes {
        #[serde(default)]
        entity_code: Option<String>,
        #[serde(default)]
        municipality_code: Option<String>,
        #[serde(default)]
        locality_code: Option<String>,
    },
    /// A registry composite key of the same grain, looked up in the registry.
    RegistryKey {
        column: String,
        /// Disambiguates locality keys shared by several entities.
        #[serde(default)]
        entity_code_column: Option<String>,
    },
}

/// Policy for a key repeated inside one override table with differing codes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// The row appearing last in the table wins.
    #[default]
    LastWins,
    Reject,
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Passthrough column renames, source label → output label.
    pub rename: BTreeMap<String, String>,
    /// Passthrough columns left out of the enriched table.
    pub drop: Vec<String>,
    pub labels: OutputLabels,
    pub include_score: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            rename: BTreeMap::new(),
            drop: Vec::new(),
            labels: OutputLabels::default(),
            include_score: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputLabels {
    pub entity_code: String,
    pub entity_name: String,
    pub municipality_code: String,
    pub municipality_name: String,
    pub locality_code: String,
    pub locality_name: String,
    pub score: String,
}

impl Default for OutputLabels {
    fn default() -> Self {
        Self {
            entity_code: "Clave de entidad".into(),
            entity_name: "Entidad federativa".into(),
            municipality_code: "Clave de municipio".into(),
            municipality_name: "Municipio".into(),
            locality_code: "Clave de localidad".into(),
            locality_name: "Localidad".into(),
            score: "Puntaje".into(),
        }
    }
}

impl OutputLabels {
    pub fn all(&self) -> [&str; 7] {
        [
            &self.entity_code,
            &self.entity_name,
            &self.municipality_code,
            &self.municipality_name,
            &self.locality_code,
            &self.locality_name,
            &self.score,
        ]
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl ResolveConfig {
    pub fn from_toml(input: &str) -> Result<Self, ResolveError> {
        let config: ResolveConfig =
            toml::from_str(input).map_err(|e| ResolveError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ResolveError> {
        let fail = |msg: String| -> Result<(), ResolveError> { Err(ResolveError::ConfigValidation(msg)) };

        for level in GeoLevel::ALL {
            let t = self.thresholds.for_level(level);
            if t > 100 {
                return fail(format!("{level} threshold must be within 0..=100, got {t}"));
            }
        }

        self.registry.file.delimiter_byte()?;
        self.source.file.delimiter_byte()?;

        if self.source.columns.entity.is_empty() || self.source.columns.municipality.is_empty() {
            return fail("source columns 'entity' and 'municipality' are required".into());
        }

        let mut names = BTreeSet::new();
        for spec in &self.overrides {
            if spec.name.is_empty() {
                return fail("override tables need a non-empty name".into());
            }
            if !names.insert(spec.name.as_str()) {
                return fail(format!("duplicate override name '{}'", spec.name));
            }
            if spec.key_column.is_empty() {
                return fail(format!("override '{}': key_column is empty", spec.name));
            }
            spec.file.delimiter_byte()?;
            validate_target(spec)?;
        }

        // Every output label must be distinct, and no rename may land on one.
        let labels = self.output.labels.all();
        let mut seen = BTreeSet::new();
        for label in labels {
            if label.is_empty() {
                return fail("output labels must be non-empty".into());
            }
            if !seen.insert(label) {
                return fail(format!("output label '{label}' is used twice"));
            }
        }
        let mut targets = BTreeSet::new();
        for (from, to) in &self.output.rename {
            if seen.contains(to.as_str()) {
                return fail(format!("rename '{from}' → '{to}' collides with an output label"));
            }
            if !targets.insert(to.as_str()) {
                return fail(format!("two columns are renamed to '{to}'"));
            }
        }

        Ok(())
    }
}

fn validate_target(spec: &OverrideSpec) -> Result<(), ResolveError> {
    let OverrideTargetColumns::Codes {
        entity_code,
        municipality_code,
        locality_code,
    } = &spec.target
    else {
        return Ok(());
    };

    let required: &[(&str, bool)] = match spec.grain {
        GeoLevel::Entity => &[("entity_code", entity_code.is_some())],
        GeoLevel::Municipality => &[
            ("entity_code", entity_code.is_some()),
            ("municipality_code", municipality_code.is_some()),
        ],
        GeoLevel::Locality => &[
            ("entity_code", entity_code.is_some()),
            ("municipality_code", municipality_code.is_some()),
            ("locality_code", locality_code.is_some()),
        ],
    };
    for (column, present) in required {
        if !present {
            return Err(ResolveError::ConfigValidation(format!(
                "override '{}': {} grain needs a {column} column",
                spec.name, spec.grain
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
name = "Fertilizantes 2022"

[registry]
file = "inegi_2022.csv"

[source]
file = "fertilizantes_2022.csv"
encoding = "windows-1252"
"#;

    #[test]
    fn parse_minimal_uses_defaults() {
        let config = ResolveConfig::from_toml(MINIMAL).unwrap();
        assert_eq!(config.name, "Fertilizantes 2022");
        assert_eq!(config.registry.file.encoding, "utf-8");
        assert_eq!(config.registry.columns.entity_code, "CVE_ENT");
        assert_eq!(config.registry.columns.population, "POB_TOTAL");
        assert_eq!(config.source.file.encoding, "windows-1252");
        assert_eq!(config.source.columns.entity, "ENTIDAD");
        assert!(config.source.columns.locality.is_none());
        assert_eq!(config.thresholds.state, 96);
        assert_eq!(config.thresholds.municipality, 96);
        assert_eq!(config.thresholds.locality, 85);
        assert!(config.overrides.is_empty());
        assert!(config.parallel);
        assert!(config.output.include_score);
        assert_eq!(config.output.labels.entity_code, "Clave de entidad");
    }

    #[test]
    fn parse_full() {
        let input = r#"
name = "Full"
expected_entities = ["Guerrero", "Oaxaca"]
parallel = false

[registry]
file = "inegi.csv"
encoding = "windows-1252"
[registry.columns]
population = "POBTOT"

[source]
file = "benef.csv"
delimiter = ";"
[source.columns]
entity = "ESTADO"
municipality = "MUNICIPIO"
locality = "LOCALIDAD"

[thresholds]
locality = 90

[[overrides]]
name = "mun_22"
grain = "municipality"
file = "diccionario_MUN_22_simple.csv"
delimiter = ";"
key_column = "KEY_benef_mun"
target = { kind = "registry_key", column = "KEY_inegi_municipio" }

[[overrides]]
name = "loc_22"
grain = "locality"
file = "diccionario_LOC_22_simple.csv"
key_column = "KEY_benef_loc"
on_duplicate = "reject"
[overrides.target]
kind = "codes"
entity_code = "CVE_ENT"
municipality_code = "CVE_MUN"
locality_code = "CVE_LOC"

[output]
drop = ["ZONA"]
include_score = false
[output.rename]
BENEFICIARIO = "Nombre del beneficiario"
"#;
        let config = ResolveConfig::from_toml(input).unwrap();
        assert_eq!(config.expected_entities, vec!["Guerrero", "Oaxaca"]);
        assert!(!config.parallel);
        assert_eq!(config.registry.columns.population, "POBTOT");
        assert_eq!(config.registry.columns.entity_code, "CVE_ENT");
        assert_eq!(config.source.file.delimiter_byte().unwrap(), b';');
        assert_eq!(config.source.columns.locality.as_deref(), Some("LOCALIDAD"));
        assert_eq!(config.thresholds.locality, 90);
        assert_eq!(config.thresholds.state, 96);

        assert_eq!(config.overrides.len(), 2);
        let mun = &config.overrides[0];
        assert_eq!(mun.grain, GeoLevel::Municipality);
        assert_eq!(mun.on_duplicate, DuplicatePolicy::LastWins);
        assert!(matches!(
            &mun.target,
            OverrideTargetColumns::RegistryKey { column, entity_code_column: None } if column == "KEY_inegi_municipio"
        ));
        let loc = &config.overrides[1];
        assert_eq!(loc.on_duplicate, DuplicatePolicy::Reject);
        assert!(matches!(loc.target, OverrideTargetColumns::Codes { .. }));

        assert_eq!(config.output.drop, vec!["ZONA"]);
        assert!(!config.output.include_score);
        assert_eq!(config.output.rename["BENEFICIARIO"], "Nombre del beneficiario");
    }

    #[test]
    fn tab_delimiter_alias() {
        let spec = FileSpec {
            file: "x.tsv".into(),
            encoding: "utf-8".into(),
            delimiter: Some("\\t".into()),
        };
        assert_eq!(spec.delimiter_byte().unwrap(), b'\t');
    }

    #[test]
    fn reject_threshold_above_100() {
        let input = format!("{MINIMAL}\n[thresholds]\nstate = 101\n");
        let err = ResolveConfig::from_toml(&input).unwrap_err();
        assert!(err.to_string().contains("entity threshold"));
    }

    #[test]
    fn reject_multichar_delimiter() {
        let input = MINIMAL.replace("encoding = \"windows-1252\"", "delimiter = \";;\"");
        let err = ResolveConfig::from_toml(&input).unwrap_err();
        assert!(err.to_string().contains("single ASCII character"));
    }

    #[test]
    fn reject_unknown_grain() {
        let input = format!(
            r#"{MINIMAL}
[[overrides]]
name = "x"
grain = "colonia"
file = "x.csv"
key_column = "k"
target = {{ kind = "codes", entity_code = "e" }}
"#
        );
        assert!(matches!(
            ResolveConfig::from_toml(&input),
            Err(ResolveError::ConfigParse(_))
        ));
    }

    #[test]
    fn reject_codes_target_missing_level_column() {
        let input = format!(
            r#"{MINIMAL}
[[overrides]]
name = "loc"
grain = "locality"
file = "loc.csv"
key_column = "k"
target = {{ kind = "codes", entity_code = "CVE_ENT", municipality_code = "CVE_MUN" }}
"#
        );
        let err = ResolveConfig::from_toml(&input).unwrap_err();
        assert!(err.to_string().contains("needs a locality_code column"));
    }

    #[test]
    fn reject_duplicate_override_names() {
        let table = r#"
[[overrides]]
name = "mun"
grain = "municipality"
file = "a.csv"
key_column = "k"
target = { kind = "registry_key", column = "r" }
"#;
        let input = format!("{MINIMAL}{table}{table}");
        let err = ResolveConfig::from_toml(&input).unwrap_err();
        assert!(err.to_string().contains("duplicate override name 'mun'"));
    }

    #[test]
    fn reject_rename_onto_code_label() {
        let input = format!("{MINIMAL}\n[output.rename]\nCVE = \"Clave de entidad\"\n");
        let err = ResolveConfig::from_toml(&input).unwrap_err();
        assert!(err.to_string().contains("collides with an output label"));
    }
}
