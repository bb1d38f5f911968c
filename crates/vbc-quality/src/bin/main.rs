//! Quality measure command-line interface

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use vbc_quality::cli::measures::{self, MeasuresConfig};
use vbc_quality::cli::output::{self, ColorMode, OutputFormat};
use vbc_quality::cli::patient::{self, PatientConfig};
use vbc_quality::cli::run::{self, RunConfig};
use vbc_quality::cli::session::{PeriodSelection, SessionConfig};
use vbc_quality::cli::validate::{self, ValidateConfig};

/// Quality measure command-line tool
#[derive(Parser)]
#[command(name = "vbcq")]
#[command(author, version, about = "Value-based care quality measures", long_about = None)]
struct Cli {
    /// Verbose output (debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format
    #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Pretty, global = true)]
    format: OutputFormat,

    /// Output file (default: stdout)
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Color output
    #[arg(long, value_enum, default_value_t = ColorMode::Auto, global = true)]
    color: ColorMode,

    /// Fact bundle (JSON)
    #[arg(short, long, global = true)]
    data: Option<PathBuf>,

    /// Additional code sets and measure definitions (JSON)
    #[arg(long, global = true)]
    definitions: Option<PathBuf>,

    /// Engine configuration (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct PeriodArgs {
    /// Calendar year to measure (default: last year)
    #[arg(short, long, conflicts_with_all = ["start", "end"])]
    year: Option<i32>,

    /// Period start (YYYY-MM-DD)
    #[arg(long, requires = "end")]
    start: Option<NaiveDate>,

    /// Period end (YYYY-MM-DD)
    #[arg(long, requires = "start")]
    end: Option<NaiveDate>,
}

impl From<PeriodArgs> for PeriodSelection {
    fn from(args: PeriodArgs) -> Self {
        Self {
            year: args.year,
            start: args.start,
            end: args.end,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List registered measures
    Measures {
        /// Evaluate the fact bundle to populate aggregates
        #[arg(short, long)]
        evaluate: bool,

        #[command(flatten)]
        period: PeriodArgs,
    },

    /// Show a measure's definition, aggregate and eligible patients
    Measure {
        /// Measure identifier, e.g. HEDIS-DM-A1C
        id: String,

        #[command(flatten)]
        period: PeriodArgs,
    },

    /// Evaluate measures over the fact bundle
    Run {
        /// Measures to evaluate (default: all active)
        #[arg(short, long = "measure")]
        measures: Vec<String>,

        /// Include per-patient result rows
        #[arg(short, long)]
        results: bool,

        /// Re-evaluate the published run and check the rows reproduce
        #[arg(long)]
        verify: bool,

        #[command(flatten)]
        period: PeriodArgs,
    },

    /// Show one patient's measure results
    Patient {
        /// Patient identifier
        id: String,

        #[command(flatten)]
        period: PeriodArgs,
    },

    /// Run data-quality checks on the fact bundle and definitions
    Validate {
        /// Reference date for plausibility checks (default: today)
        #[arg(long)]
        today: Option<NaiveDate>,

        /// Strict mode (warnings as errors)
        #[arg(short, long)]
        strict: bool,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .init();
}

#[tokio::main]
async fn main() {
    human_panic::setup_panic!();

    let cli = Cli::parse();
    output::setup_colors(cli.color);
    init_logging(cli.verbose);

    if let Err(e) = dispatch(cli).await {
        eprintln!("{}", output::format_error(&e));
        std::process::exit(1);
    }
}

async fn dispatch(cli: Cli) -> Result<()> {
    let session = SessionConfig {
        data: cli.data,
        definitions: cli.definitions,
        config: cli.config,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Measures { evaluate, period } => {
            let config = MeasuresConfig {
                session,
                period: period.into(),
                evaluate,
                format: cli.format,
                output_file: cli.output,
            };
            measures::list(config).await
        }

        Commands::Measure { id, period } => {
            let config = MeasuresConfig {
                session,
                period: period.into(),
                evaluate: true,
                format: cli.format,
                output_file: cli.output,
            };
            measures::show(&id, config).await
        }

        Commands::Run {
            measures,
            results,
            verify,
            period,
        } => {
            let config = RunConfig {
                session,
                period: period.into(),
                measures,
                results,
                verify,
                format: cli.format,
                output_file: cli.output,
            };
            run::run(config).await
        }

        Commands::Patient { id, period } => {
            let config = PatientConfig {
                session,
                period: period.into(),
                format: cli.format,
                output_file: cli.output,
            };
            patient::show(&id, config).await
        }

        Commands::Validate { today, strict } => {
            let config = ValidateConfig {
                session,
                today,
                strict,
            };
            validate::validate(config).await
        }
    }
}
