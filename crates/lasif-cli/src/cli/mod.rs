mod commands;
mod helpers;

use clap::Parser;
use lasif_core::domain::LasifError;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt};

pub fn run_from_env() -> i32 {
    init_logging();
    let args: Vec<String> = std::env::args().skip(1).collect();

    match run(args) {
        Ok(code) => code,
        Err(error) => {
            let error = error.as_lasif_error();
            eprintln!("{}", error.diagnostic_line());
            error.exit_code()
        }
    }
}

pub fn run<I, S>(args: I) -> Result<i32, CliError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let full_args = std::iter::once("lasif-rs".to_string())
        .chain(args.into_iter().map(Into::into))
        .collect::<Vec<_>>();

    match Cli::try_parse_from(&full_args) {
        Ok(cli) => dispatch_parsed(cli),
        Err(err) => match err.kind() {
            clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                print!("{}", err);
                Ok(0)
            }
            _ => Err(CliError::Usage(err.to_string())),
        },
    }
}

/// Logs go to stderr; `RUST_LOG` overrides the default `info` filter.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[derive(Parser)]
#[command(name = "lasif-rs", about = "Full-waveform inversion project workflow")]
struct Cli {
    /// Project root containing lasif_config.json
    #[arg(long, global = true, default_value = ".")]
    project: PathBuf,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(clap::Subcommand)]
enum CliCommand {
    /// Compute and cache the adjoint source of every window
    CalculateAdjointSources(commands::AdjointArgs),
    /// Combine window adjoint sources into solver input files
    FinalizeAdjointSources(commands::AdjointArgs),
    /// Write solver input files for the events of an iteration
    GenerateInputFiles(commands::InputFileArgs),
    /// Write per-event station lists and the chunk setup file
    WriteStationLists(commands::StationListArgs),
    /// Print the project domain in SPECFEM3D GLOBE terms
    SpecfemDomain,
}

fn dispatch_parsed(cli: Cli) -> Result<i32, CliError> {
    let project = cli.project;
    match cli.command {
        CliCommand::CalculateAdjointSources(args) => {
            commands::run_calculate_adjoint_sources(&project, args)
        }
        CliCommand::FinalizeAdjointSources(args) => {
            commands::run_finalize_adjoint_sources(&project, args)
        }
        CliCommand::GenerateInputFiles(args) => commands::run_generate_input_files(&project, args),
        CliCommand::WriteStationLists(args) => commands::run_write_station_lists(&project, args),
        CliCommand::SpecfemDomain => commands::run_specfem_domain(&project),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error("{0}")]
    Workflow(#[from] LasifError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CliError {
    fn as_lasif_error(&self) -> LasifError {
        match self {
            Self::Usage(message) => LasifError::configuration("CONFIG.CLI_USAGE", message.clone()),
            Self::Workflow(error) => error.clone(),
            Self::Internal(error) => LasifError::internal("RUN.CLI", format!("{error:#}")),
        }
    }
}
