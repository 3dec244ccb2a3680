// restock CLI - fills an order sheet's quantity column from an inventory report

mod exit_codes;
mod inspect;
mod report;
mod run;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use log::LevelFilter;
use restock_io::IoError;
use restock_recon::ReconError;

use exit_codes::{io_exit_code, recon_exit_code, EXIT_SUCCESS, EXIT_USAGE};

/// Environment variable read by the logger; overrides `-v`.
const LOG_ENV: &str = "RESTOCK_LOG";

#[derive(Parser)]
#[command(name = "restock")]
#[command(about = "Fill an order sheet's quantity column from an inventory report")]
#[command(version)]
#[command(subcommand_required = false)]
struct Cli {
    /// More log output on stderr (-v info, -vv debug). RESTOCK_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile an order sheet against an inventory report
    #[command(after_help = "\
Examples:
  restock run stock.xlsx order.xlsx
  restock run stock.csv order.xls --output order_filled.xlsx
  restock run stock.xlsx order.xlsx --key-column B --value-column D --first-data-row 4
  restock run stock.xlsx order.xlsx --config restock.toml --threshold 0.6 --json
  restock run stock.xlsx order.xlsx --report run.json")]
    Run(run::RunArgs),

    /// Show which order-sheet columns a run would use
    #[command(after_help = "\
Examples:
  restock inspect order.xlsx
  restock inspect order.xlsx --config restock.toml --json")]
    Inspect {
        /// Order sheet (.xlsx or .xls)
        target: PathBuf,

        /// TOML config file (keyword sets, explicit columns)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Output JSON to stdout instead of the human summary
        #[arg(long)]
        json: bool,
    },

    /// Validate a config file without running
    #[command(after_help = "\
Examples:
  restock validate restock.toml")]
    Validate {
        /// Path to the TOML config file
        config: PathBuf,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_env(LOG_ENV)
        .format_timestamp(None)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        None => {
            // No subcommand = show usage
            eprintln!("Usage: restock <command> [options]");
            eprintln!("       restock --help for more information");
            Ok(())
        }
        Some(Commands::Run(args)) => run::cmd_run(args),
        Some(Commands::Inspect { target, config, json }) => inspect::cmd_inspect(target, config, json),
        Some(Commands::Validate { config }) => run::cmd_validate(config),
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

    pub fn usage(msg: impl Into<String>) -> Self {
        Self::new(EXIT_USAGE, msg)
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<ReconError> for CliError {
    fn from(err: ReconError) -> Self {
        let hint = match &err {
            ReconError::MissingColumn { .. } => {
                Some("set [source] primary_column / secondary_column to the report's header names")
            }
            ReconError::NoKeyColumn { .. } => {
                Some("set [source] key_markers to text found in the code column's header")
            }
            ReconError::UnresolvedColumns { .. } => {
                Some("pass --key-column / --value-column, or run `restock inspect <target>`")
            }
            ReconError::DuplicateKey { .. } => {
                Some("set [source] duplicate_keys = \"last_wins\" to keep the later row")
            }
            _ => None,
        };
        Self {
            code: recon_exit_code(&err),
            message: err.to_string(),
            hint: hint.map(String::from),
        }
    }
}

impl From<IoError> for CliError {
    fn from(err: IoError) -> Self {
        let hint = match &err {
            IoError::LegacyConversion(_) => Some("re-save the order sheet as .xlsx and retry"),
            IoError::EmptyOrTruncatedDocument { .. } => {
                Some("check that the download finished; the floor is [input] min_document_bytes")
            }
            _ => None,
        };
        Self {
            code: io_exit_code(&err),
            message: err.to_string(),
            hint: hint.map(String::from),
        }
    }
}
