//! `georef-resolve` — hierarchical geographic entity resolution.
//!
//! Pure engine crate: receives pre-loaded registry, source and override
//! tables, returns an enriched table plus diagnostics. No CLI or IO
//! dependencies.

pub mod codes;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod fuzzy;
pub mod keys;
pub mod model;
pub mod normalize;
pub mod output;
pub mod overrides;
pub mod registry;
pub mod resolver;
pub mod table;

pub use codes::{Codes, GeoCode, GeoLevel, Provenance};
pub use config::ResolveConfig;
pub use diagnostics::{Diagnostic, DiagnosticReason, Diagnostics};
pub use engine::run;
pub use error::ResolveError;
pub use model::{MatchResult, Resolution, ResolveInput, ResolveOutput, ResolveSummary};
pub use table::Table;
