//! `restock run` and `restock validate`.

use std::path::{Path, PathBuf};

use clap::Args;
use log::info;
use restock_io::{default_output_path, load_source, SaveSummary, TargetDocument};
use restock_recon::{ColumnRef, RunConfig, RunReport};
use serde::Serialize;

use crate::exit_codes::{EXIT_INVALID_CONFIG, EXIT_WRITE};
use crate::report::render_summary;
use crate::CliError;

#[derive(Args)]
pub struct RunArgs {
    /// Inventory report (.xlsx, .xls or .csv)
    pub source: PathBuf,

    /// Order sheet to fill (.xlsx or .xls); never modified
    pub target: PathBuf,

    /// TOML config file
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Order-sheet join-key column, as a 1-based index or letters (2, B)
    #[arg(long)]
    pub key_column: Option<ColumnRef>,

    /// Order-sheet quantity column to write, as a 1-based index or letters
    #[arg(long)]
    pub value_column: Option<ColumnRef>,

    /// First order-sheet row holding data (1-based)
    #[arg(long)]
    pub first_data_row: Option<usize>,

    /// Minimum similarity for a gap suggestion (0.0-1.0)
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Output workbook [default: <target-stem>_<YYYYmmdd_HHMMSS>.xlsx next to the target]
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Write the JSON report to a file
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Print the JSON report to stdout
    #[arg(long)]
    pub json: bool,
}

/// JSON document for `--json` / `--report`.
#[derive(Serialize)]
struct RunOutput<'a> {
    #[serde(flatten)]
    report: &'a RunReport,
    output: &'a SaveSummary,
}

/// Read and validate a config file; no file means all defaults.
pub fn load_config(path: Option<&Path>) -> Result<RunConfig, CliError> {
    let Some(path) = path else {
        return Ok(RunConfig::default());
    };
    let text = std::fs::read_to_string(path).map_err(|e| {
        CliError::new(EXIT_INVALID_CONFIG, format!("cannot read config {}: {e}", path.display()))
    })?;
    let config = RunConfig::from_toml(&text)?;
    info!("config loaded from {}", path.display());
    Ok(config)
}

fn apply_overrides(config: &mut RunConfig, args: &RunArgs) {
    if let Some(col) = args.key_column {
        config.target.key_column = Some(col);
    }
    if let Some(col) = args.value_column {
        config.target.value_column = Some(col);
    }
    if let Some(row) = args.first_data_row {
        config.target.first_data_row = Some(row);
    }
    if let Some(threshold) = args.threshold {
        config.report.similarity_threshold = threshold;
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

pub fn cmd_run(args: RunArgs) -> Result<(), CliError> {
    let mut config = load_config(args.config.as_deref())?;
    apply_overrides(&mut config, &args);
    config.validate()?;

    let dest = match &args.output {
        Some(path) => path.clone(),
        None => default_output_path(&args.target, &chrono::Local::now()),
    };
    if same_file(&dest, &args.target) {
        return Err(CliError::usage("--output must differ from the order sheet")
            .with_hint("the order sheet is never modified; pick another output path"));
    }

    let source = load_source(&args.source, &config.input)?;
    let mut target = TargetDocument::open(&args.target, &config.input)?;

    let mut report = restock_recon::run(&source, &mut target.grid, &config)?;
    report.warnings.extend(target.warnings.iter().cloned());

    let saved = target.save(&dest)?;
    info!("{} cells written to {}", target.grid.writes().len(), dest.display());

    let output = RunOutput { report: &report, output: &saved };
    let json_str = serde_json::to_string_pretty(&output)
        .map_err(|e| CliError::new(EXIT_WRITE, format!("JSON serialization error: {e}")))?;

    if let Some(ref path) = args.report {
        std::fs::write(path, &json_str).map_err(|e| {
            CliError::new(EXIT_WRITE, format!("cannot write report {}: {e}", path.display()))
        })?;
        eprintln!("wrote {}", path.display());
    }

    if args.json {
        println!("{json_str}");
    }

    // Human summary to stderr
    for line in render_summary(&report, &saved) {
        eprintln!("{line}");
    }

    Ok(())
}

pub fn cmd_validate(config_path: PathBuf) -> Result<(), CliError> {
    let config = load_config(Some(&config_path))?;
    eprintln!(
        "ok: {} (source header row {}, key markers {:?}, duplicates {}, threshold {})",
        config_path.display(),
        config.source.header_row,
        config.source.key_markers,
        config.source.duplicate_keys,
        config.report.similarity_threshold,
    );
    Ok(())
}
