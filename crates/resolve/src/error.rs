use thiserror::Error;

/// Structural failures that abort a resolution run.
///
/// Per-record problems (no match, incomplete keys) are never errors; they
/// flow into [`crate::diagnostics::Diagnostics`] instead.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// TOML parse / deserialization error.
    #[error("config parse error: {0}")]
    ConfigParse(String),

    /// Config validation error (bad threshold, colliding labels, etc.).
    #[error("config validation error: {0}")]
    ConfigValidation(String),

    /// Required column absent from an input table.
    #[error("{table}: missing column '{column}'")]
    MissingColumn { table: String, column: String },

    /// An input table named by the config was not supplied.
    #[error("no table loaded for '{0}'")]
    MissingTable(String),

    /// A registry or override code is not a fixed-width number.
    #[error("{table}, row {row}: invalid {level} code '{value}'")]
    InvalidCode {
        table: String,
        row: usize,
        level: &'static str,
        value: String,
    },

    #[error("registry, row {row}: invalid population '{value}'")]
    InvalidPopulation { row: usize, value: String },

    /// An expected entity has no candidate set in the registry.
    #[error("expected entity '{0}' has no rows in the registry")]
    MissingEntityScope(String),

    /// Same key mapped to different codes by two override tables.
    #[error("override conflict on {grain} key '{key}': '{first_table}' says {first}, '{second_table}' says {second}")]
    OverrideConflict {
        grain: String,
        key: String,
        first_table: String,
        first: String,
        second_table: String,
        second: String,
    },

    /// Duplicate key inside one table whose policy is `reject`.
    #[error("override '{table}': duplicate key '{key}' with differing codes")]
    DuplicateOverrideKey { table: String, key: String },

    #[error("override '{table}', row {row}: registry key '{key}' not found")]
    UnknownOverrideTarget { table: String, row: usize, key: String },

    #[error("override '{table}', row {row}: registry key '{key}' exists under entities {entities:?}")]
    AmbiguousOverrideTarget {
        table: String,
        row: usize,
        key: String,
        entities: Vec<String>,
    },
}

impl ResolveError {
    /// True for failures caused by the reference data or curated overrides
    /// rather than by the run configuration.
    pub fn is_data_error(&self) -> bool {
        !matches!(self, Self::ConfigParse(_) | Self::ConfigValidation(_))
    }
}
