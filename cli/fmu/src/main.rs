//! fmu CLI — inspect, validate and run model packages.

mod commands;

use std::path::{Path, PathBuf};
use std::process;

use anyhow::Context;
use clap::{Parser, Subcommand};
use fmu_import::Importer;
use fmu_model::FmuKind;

use commands::{simulate::SimulationOptions, OutputFormat};

#[derive(Parser)]
#[command(name = "fmu", version, about = "Inspect and run model packages")]
struct Cli {
    /// Log importer and binary messages at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show model metadata and supported binary kinds
    Inspect {
        /// Package archive or extracted package directory
        package: PathBuf,
        /// Output format (text, json)
        #[arg(long)]
        format: Option<String>,
    },
    /// List variables in value-reference order
    Variables {
        /// Package archive or extracted package directory
        package: PathBuf,
        /// Only variables with this causality (input, output, parameter, ...)
        #[arg(long)]
        causality: Option<String>,
        /// Output format (text, json)
        #[arg(long)]
        format: Option<String>,
    },
    /// Print the structural dependency tables
    Structure {
        /// Package archive or extracted package directory
        package: PathBuf,
        /// Output format (text, json)
        #[arg(long)]
        format: Option<String>,
    },
    /// Run the model and print its outputs as CSV
    Simulate {
        /// Package archive or extracted package directory
        package: PathBuf,
        /// Start time (default: the model's default experiment, else 0)
        #[arg(long)]
        start: Option<f64>,
        /// Stop time (default: the model's default experiment, else 1)
        #[arg(long)]
        stop: Option<f64>,
        /// Communication step size
        #[arg(long)]
        step: Option<f64>,
        /// Binary kind to run (co-simulation, model-exchange)
        #[arg(long)]
        kind: Option<String>,
    },
    /// Manage the extraction cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// List extracted packages
    List,
    /// Remove every extracted package
    Clear,
}

fn main() {
    let cli = Cli::parse();
    setup_tracing(cli.verbose);

    let result = run(cli);
    if let Err(e) = result {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let cwd = std::env::current_dir()?;
    let importer = load_importer(&cwd)?;

    match cli.command {
        Commands::Inspect { package, format } => {
            let format = OutputFormat::parse(format.as_deref())?;
            commands::inspect::run(&importer, &package, format)
        }

        Commands::Variables {
            package,
            causality,
            format,
        } => {
            let format = OutputFormat::parse(format.as_deref())?;
            commands::variables::run(&importer, &package, causality.as_deref(), format)
        }

        Commands::Structure { package, format } => {
            let format = OutputFormat::parse(format.as_deref())?;
            commands::structure::run(&importer, &package, format)
        }

        Commands::Simulate {
            package,
            start,
            stop,
            step,
            kind,
        } => {
            let kind = match kind.as_deref() {
                None => None,
                Some(name) => Some(FmuKind::parse(name).with_context(|| {
                    format!("unknown kind '{name}' (expected co-simulation or model-exchange)")
                })?),
            };
            commands::simulate::run(
                &importer,
                &package,
                &SimulationOptions {
                    kind,
                    start,
                    stop,
                    step,
                },
            )
        }

        Commands::Cache { action } => match action {
            CacheAction::List => commands::cache::list(importer.cache()),
            CacheAction::Clear => commands::cache::clear(importer.cache()),
        },
    }
}

/// Importer configured from the nearest `fmu.toml`, if any.
fn load_importer(cwd: &Path) -> anyhow::Result<Importer> {
    Importer::discover(cwd).context("loading fmu.toml")
}

/// `FMU_LOG` overrides the default filter.
fn setup_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env("FMU_LOG").unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn,fmu_binding=info")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .init();
}
