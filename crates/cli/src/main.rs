// subimpute - apportion measurements between supergroups and subgroups
// from the command line.

mod exit_codes;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use imputer_core::{AgeParser, DEFAULT_AGE_MAX};
use imputer_engine::{GroupType, Record};
use imputer_io::{create_group_map, write_records, write_records_to, IoError, RecordFormat, RunConfig, RunInputs};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use exit_codes::{io_exit_code, io_hint, EXIT_ERROR, EXIT_HIERARCHY, EXIT_IO, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "subimpute")]
#[command(about = "Disaggregate supergroup measurements to subgroups, or aggregate them back")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// Debug-level logging on stderr (RUST_LOG overrides)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the impute described by a TOML config
    #[command(after_help = "\
Examples:
  subimpute run states.toml
  subimpute run ages.toml -o ages_out.csv
  subimpute run ages.toml --json | jq '.[0]'")]
    Run {
        /// Run config (TOML)
        config: PathBuf,

        /// Output file, .json or .csv (overrides files.output; omit for stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// JSON on stdout: records, or a run summary when writing a file
        #[arg(long)]
        json: bool,
    },

    /// Check a config and its record files without imputing
    Validate {
        /// Run config (TOML)
        config: PathBuf,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the interval each age-group label stands for
    #[command(after_help = "\
Examples:
  subimpute parse-age '0-4 years' '65+ years'
  subimpute parse-age '6 months-<2 years' --age-max 120")]
    ParseAge {
        /// Age-group labels
        #[arg(required = true)]
        labels: Vec<String>,

        /// Upper bound used for open-ended labels such as "65+ years"
        #[arg(long, default_value_t = DEFAULT_AGE_MAX)]
        age_max: f64,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("GIT_COMMIT_HASH"), ")",
        "\nengine:  imputer-engine ", env!("CARGO_PKG_VERSION"),
        "\ntarget:  ", env!("TARGET"),
    )
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Run { config, output, json } => cmd_run(&config, output, json),
        Commands::Validate { config, json } => cmd_validate(&config, json),
        Commands::ParseAge { labels, age_max, json } => cmd_parse_age(&labels, age_max, json),
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

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn args(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_IO, message: msg.into(), hint: None }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<IoError> for CliError {
    fn from(err: IoError) -> Self {
        Self {
            code: io_exit_code(&err),
            message: err.to_string(),
            hint: io_hint(&err).map(str::to_string),
        }
    }
}

// ============================================================================
// run
// ============================================================================

#[derive(Serialize)]
struct RunSummary<'a> {
    direction: String,
    grouping: String,
    records: usize,
    output: &'a Path,
}

fn cmd_run(config_path: &Path, output: Option<PathBuf>, json: bool) -> Result<(), CliError> {
    let config = RunConfig::load(config_path)?;
    tracing::debug!(path = %config_path.display(), ?config, "loaded config");
    let records = imputer_io::run(&config)?;

    match output.or_else(|| config.files.output.clone()) {
        Some(path) => {
            write_records(&path, &records)?;
            if json {
                let summary = RunSummary {
                    direction: config.direction.to_string(),
                    grouping: config.grouping.to_string(),
                    records: records.len(),
                    output: &path,
                };
                print_json(&summary)?;
            } else {
                eprintln!("wrote {} records to {}", records.len(), path.display());
            }
        }
        None => {
            let format = if json { RecordFormat::Json } else { RecordFormat::Csv };
            print_records(&records, format)?;
        }
    }
    Ok(())
}

fn print_records(records: &[Record], format: RecordFormat) -> Result<(), CliError> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    write_records_to(&mut handle, records, format)?;
    handle.flush().map_err(|e| CliError::io(e.to_string()))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let text = serde_json::to_string_pretty(value).map_err(|e| CliError {
        code: EXIT_ERROR,
        message: format!("cannot serialize output: {e}"),
        hint: None,
    })?;
    println!("{}", text);
    Ok(())
}

// ============================================================================
// validate
// ============================================================================

#[derive(Serialize)]
struct ValidateReport {
    valid: bool,
    direction: String,
    grouping: String,
    supergroups: usize,
    subgroups: usize,
    loop_over: Vec<String>,
}

/// Parse the config, read every record file, and build the group map.
fn cmd_validate(config_path: &Path, json: bool) -> Result<(), CliError> {
    let config = RunConfig::load(config_path)?;
    let inputs = RunInputs::load(&config)?;
    let map = create_group_map(&config, &inputs.supergroups, &inputs.subgroups, inputs.pairing.as_deref())?;

    let report = ValidateReport {
        valid: true,
        direction: config.direction.to_string(),
        grouping: config.grouping.to_string(),
        supergroups: map.tier_names(GroupType::Supergroup).len(),
        subgroups: map.tier_names(GroupType::Subgroup).len(),
        loop_over: config.loop_over.clone(),
    };
    if json {
        print_json(&report)?;
    } else {
        println!(
            "ok: {} {} run over {} supergroups and {} subgroups",
            report.grouping, report.direction, report.supergroups, report.subgroups
        );
    }
    Ok(())
}

// ============================================================================
// parse-age
// ============================================================================

#[derive(Serialize)]
struct ParsedAge {
    label: String,
    lower: f64,
    upper: f64,
}

fn cmd_parse_age(labels: &[String], age_max: f64, json: bool) -> Result<(), CliError> {
    let parser = AgeParser::new(age_max)
        .map_err(|e| CliError::args(e.to_string()).with_hint("--age-max must be a positive number"))?;

    let mut parsed = Vec::with_capacity(labels.len());
    for label in labels {
        let range = parser.parse(label).map_err(|e| CliError {
            code: EXIT_HIERARCHY,
            message: e.to_string(),
            hint: Some("labels look like '0-4 years', '65+ years', '1 year' or '6 months-<2 years'".into()),
        })?;
        parsed.push(ParsedAge {
            label: label.clone(),
            lower: range.lower(),
            upper: range.upper(),
        });
    }

    if json {
        return print_json(&parsed);
    }
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    for p in &parsed {
        writeln!(handle, "{}\t[{}, {})", p.label, p.lower, p.upper).map_err(|e| CliError::io(e.to_string()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_args() {
        let cli = Cli::try_parse_from(["subimpute", "run", "cfg.toml", "-o", "out.json", "--json"]).unwrap();
        match cli.command {
            Commands::Run { config, output, json } => {
                assert_eq!(config, PathBuf::from("cfg.toml"));
                assert_eq!(output, Some(PathBuf::from("out.json")));
                assert!(json);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn verbose_is_global() {
        let cli = Cli::try_parse_from(["subimpute", "validate", "cfg.toml", "-v"]).unwrap();
        assert!(cli.verbose);
    }

    #[test]
    fn parse_age_needs_labels() {
        assert!(Cli::try_parse_from(["subimpute", "parse-age"]).is_err());
        let cli = Cli::try_parse_from(["subimpute", "parse-age", "65+ years", "--age-max", "120"]).unwrap();
        match cli.command {
            Commands::ParseAge { labels, age_max, .. } => {
                assert_eq!(labels, ["65+ years"]);
                assert_eq!(age_max, 120.0);
            }
            _ => panic!("expected parse-age"),
        }
    }

    #[test]
    fn io_errors_carry_exit_code_and_hint() {
        let err = CliError::from(IoError::LoopOver("partitions differ".into()));
        assert_eq!(err.code, exit_codes::EXIT_DATA);
        assert!(err.hint.is_some());
    }
}
