// georef CLI - config-driven geographic code resolution

mod exit_codes;
mod run;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use georef_io::IoError;
use georef_resolve::ResolveError;
use tracing_subscriber::EnvFilter;

use exit_codes::{resolve_exit_code, EXIT_IO, EXIT_SUCCESS};

#[derive(Parser)]
#[command(name = "georef")]
#[command(about = "Attach census geographic codes to free-text place names")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// Debug logging (per-query match scores). Overrides RUST_LOG.
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a source table against the registry
    #[command(after_help = "\
Examples:
  georef run fertilizantes_2022.toml
  georef run fertilizantes_2022.toml --output out/enriched.csv --strict
  georef run fertilizantes_2022.toml --json > report.json

File paths inside the config are relative to the config file.")]
    Run {
        /// Path to the run config (.toml)
        config: PathBuf,

        /// Enriched table path [default: <config>.enriched.csv]
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Diagnostics table path [default: <config>.diagnostics.csv]
        #[arg(long)]
        diagnostics: Option<PathBuf>,

        /// Match dictionary path [default: <config>.matches.csv]
        #[arg(long)]
        matches: Option<PathBuf>,

        /// Write the JSON report (meta, summary, diagnostics) to a file
        #[arg(long)]
        report: Option<PathBuf>,

        /// Print the JSON report to stdout
        #[arg(long)]
        json: bool,

        /// Field delimiter of the written tables
        #[arg(long, default_value = ",")]
        delimiter: char,

        /// Exit 6 when any row is not fully resolved
        #[arg(long)]
        strict: bool,
    },

    /// Parse and validate a run config without reading any table
    #[command(after_help = "\
Examples:
  georef validate fertilizantes_2022.toml")]
    Validate {
        /// Path to the run config (.toml)
        config: PathBuf,
    },
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (",
        env!("GIT_COMMIT_HASH"),
        ")",
        "\nengine:  georef-resolve ",
        env!("CARGO_PKG_VERSION"),
    )
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("georef=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("georef=info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Run {
            config,
            output,
            diagnostics,
            matches,
            report,
            json,
            delimiter,
            strict,
        } => run::cmd_run(run::RunArgs {
            config,
            output,
            diagnostics,
            matches,
            report,
            json,
            delimiter,
            strict,
        }),
        Commands::Validate { config } => run::cmd_validate(config),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn new(code: u8, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into(), hint: None }
    }

    /// Engine failure, with a curation hint where one helps.
    pub fn resolve(err: ResolveError) -> Self {
        let hint = match &err {
            ResolveError::MissingColumn { .. } => {
                Some("column names match exactly; check the `columns` tables of the config".to_string())
            }
            ResolveError::MissingEntityScope(_) => {
                Some("names in `expected_entities` must match the registry's entity names".to_string())
            }
            ResolveError::OverrideConflict { .. } => {
                Some("keep the key in one table only, or make both tables agree".to_string())
            }
            ResolveError::DuplicateOverrideKey { .. } => {
                Some("remove the stale row, or set on_duplicate = \"last_wins\"".to_string())
            }
            ResolveError::AmbiguousOverrideTarget { .. } => {
                Some("set `entity_code_column` on the override target to pick one entity".to_string())
            }
            _ => None,
        };
        Self { code: resolve_exit_code(&err), message: err.to_string(), hint }
    }

    pub fn io(err: IoError) -> Self {
        let hint = match &err {
            IoError::Decode { .. } => {
                Some("set `encoding` for this file in the config, e.g. encoding = \"windows-1252\"".to_string())
            }
            IoError::Csv { .. } => Some("set `delimiter` for this file in the config".to_string()),
            _ => None,
        };
        Self { code: EXIT_IO, message: err.to_string(), hint }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}
