//! `georef run` and `georef validate`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use georef_resolve::config::FileSpec;
use georef_resolve::{ResolveConfig, ResolveInput, ResolveOutput, Table};
use tracing::info;

use crate::exit_codes::{EXIT_INVALID_CONFIG, EXIT_IO, EXIT_UNRESOLVED, EXIT_USAGE};
use crate::CliError;

pub struct RunArgs {
    pub config: PathBuf,
    pub output: Option<PathBuf>,
    pub diagnostics: Option<PathBuf>,
    pub matches: Option<PathBuf>,
    pub report: Option<PathBuf>,
    pub json: bool,
    pub delimiter: char,
    pub strict: bool,
}

pub fn cmd_run(args: RunArgs) -> Result<(), CliError> {
    let delimiter = output_delimiter(args.delimiter)?;
    let config = load_config(&args.config)?;
    let base_dir = base_dir(&args.config);

    let mut overrides = BTreeMap::new();
    for spec in &config.overrides {
        overrides.insert(spec.name.clone(), load_table(base_dir, &spec.file)?);
    }
    let input = ResolveInput {
        registry: load_table(base_dir, &config.registry.file)?,
        source: load_table(base_dir, &config.source.file)?,
        overrides,
    };

    let output = georef_resolve::run(&config, &input).map_err(CliError::resolve)?;

    let stem = config_stem(&args.config);
    let enriched_path = args
        .output
        .unwrap_or_else(|| base_dir.join(format!("{stem}.enriched.csv")));
    let diagnostics_path = args
        .diagnostics
        .unwrap_or_else(|| base_dir.join(format!("{stem}.diagnostics.csv")));
    let matches_path = args
        .matches
        .unwrap_or_else(|| base_dir.join(format!("{stem}.matches.csv")));

    georef_io::write_table(&enriched_path, &output.enriched, delimiter).map_err(CliError::io)?;
    eprintln!("wrote {}", enriched_path.display());
    georef_io::write_table(&diagnostics_path, &output.diagnostics_view, delimiter).map_err(CliError::io)?;
    eprintln!("wrote {}", diagnostics_path.display());
    georef_io::write_table(&matches_path, &output.matches_view, delimiter).map_err(CliError::io)?;
    eprintln!("wrote {}", matches_path.display());

    if args.report.is_some() || args.json {
        let json = output
            .report_json()
            .map_err(|e| CliError::new(EXIT_IO, format!("JSON serialization error: {e}")))?;
        if let Some(ref path) = args.report {
            georef_io::write_text(path, &json).map_err(CliError::io)?;
            eprintln!("wrote {}", path.display());
        }
        if args.json {
            println!("{json}");
        }
    }

    print_summary(&output);

    if args.strict && !output.is_complete() {
        let s = &output.summary;
        return Err(CliError::new(
            EXIT_UNRESOLVED,
            format!(
                "{} of {} rows not fully resolved",
                s.partially_resolved + s.unresolved,
                s.total_rows
            ),
        )
        .with_hint(format!(
            "curate override entries from {}",
            diagnostics_path.display()
        )));
    }
    Ok(())
}

pub fn cmd_validate(config_path: PathBuf) -> Result<(), CliError> {
    let config = load_config(&config_path)?;
    eprintln!(
        "valid: '{}' with {} override table(s), locality stage {}",
        config.name,
        config.overrides.len(),
        if config.source.columns.locality.is_some() {
            "on"
        } else {
            "off"
        },
    );
    Ok(())
}

fn load_config(path: &Path) -> Result<ResolveConfig, CliError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| CliError::new(EXIT_IO, format!("cannot read config {}: {e}", path.display())))?;
    ResolveConfig::from_toml(&text).map_err(|e| CliError::new(EXIT_INVALID_CONFIG, e.to_string()))
}

/// Config-relative file paths resolve against the config's directory.
fn base_dir(config_path: &Path) -> &Path {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

fn config_stem(config_path: &Path) -> String {
    config_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "georef".to_string())
}

fn load_table(base_dir: &Path, spec: &FileSpec) -> Result<Table, CliError> {
    let delimiter = spec.delimiter_byte().map_err(CliError::resolve)?;
    let path = base_dir.join(&spec.file);
    let table = georef_io::read_table(&path, &spec.encoding, delimiter).map_err(CliError::io)?;
    info!(file = %path.display(), encoding = %spec.encoding, rows = table.len(), "table loaded");
    Ok(table)
}

fn output_delimiter(c: char) -> Result<u8, CliError> {
    u8::try_from(c)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| CliError::new(EXIT_USAGE, format!("--delimiter must be an ASCII character, got '{c}'")))
}

fn print_summary(output: &ResolveOutput) {
    let s = &output.summary;
    eprintln!(
        "{}: {} rows, {} fully resolved, {} partial, {} unresolved",
        output.meta.config_name, s.total_rows, s.fully_resolved, s.partially_resolved, s.unresolved,
    );
    for (level, stage) in &s.stages {
        eprintln!(
            "  {:<13} {} matched, {} no match, {} incomplete key, {} no scope",
            level.to_string(),
            stage.matched,
            stage.unmatched,
            stage.incomplete_keys,
            stage.no_scope,
        );
    }
    if s.overrides_applied > 0 {
        eprintln!("  overrides applied: {}", s.overrides_applied);
    }
    if !s.diagnostics_by_reason.is_empty() {
        let reasons: Vec<String> = s
            .diagnostics_by_reason
            .iter()
            .map(|(reason, n)| format!("{reason} {n}"))
            .collect();
        eprintln!("  diagnostics: {}", reasons.join(", "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_dir_of_bare_file_is_cwd() {
        assert_eq!(base_dir(Path::new("run.toml")), Path::new("."));
        assert_eq!(base_dir(Path::new("conf/run.toml")), Path::new("conf"));
    }

    #[test]
    fn stem_names_default_outputs() {
        assert_eq!(config_stem(Path::new("conf/fertilizantes_2022.toml")), "fertilizantes_2022");
    }

    #[test]
    fn output_delimiter_must_be_ascii() {
        assert_eq!(output_delimiter(';').unwrap(), b';');
        assert_eq!(output_delimiter('é').unwrap_err().code, EXIT_USAGE);
    }
}
