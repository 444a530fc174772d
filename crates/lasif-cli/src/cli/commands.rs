use super::CliError;
use super::helpers::{ProjectContext, emit, select_events};
use lasif_core::actions::{Actions, JsonInputFileWriter};
use lasif_core::domain::{LasifError, SimulationType};
use lasif_core::misfit::{MisfitAdjointCalculator, WaveformDifferenceMisfit};
use lasif_core::rotations::specfem_globe_domain;
use lasif_core::serialization::format_float_repr;
use lasif_core::sources::{EventCatalog, TravelTimeTable};
use lasif_core::specfem_fwi::{
    ArrivalWindow, ChunkSetup, EventTiming, event_timings, write_cmt_solutions,
    write_station_lists,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(clap::Args)]
pub(super) struct AdjointArgs {
    /// Iteration name
    #[arg(long)]
    iteration: String,

    /// Glob pattern selecting events; repeatable, all events by default
    #[arg(long = "events", value_name = "PATTERN")]
    events: Vec<String>,
}

#[derive(clap::Args)]
pub(super) struct InputFileArgs {
    /// Iteration name
    #[arg(long)]
    iteration: String,

    /// normal_simulation, adjoint_forward or adjoint_reverse
    #[arg(long, default_value = "normal_simulation")]
    simulation_type: String,

    /// Glob pattern selecting events; repeatable, all events by default
    #[arg(long = "events", value_name = "PATTERN")]
    events: Vec<String>,
}

#[derive(clap::Args)]
pub(super) struct StationListArgs {
    /// Iteration name
    #[arg(long)]
    iteration: String,

    /// Also write the chunk setup file
    #[arg(long)]
    setup_file: bool,

    /// Also write one CMTSOLUTION file per event with preprocessed data
    #[arg(long)]
    cmt_solutions: bool,

    /// Travel-time table; the setup file timing then follows the fastest
    /// arrival into the domain
    #[arg(long, value_name = "FILE")]
    travel_times: Option<PathBuf>,

    /// Phase of interest for the fastest arrival
    #[arg(long, default_value = "P")]
    phase: String,

    /// Seconds kept before the fastest arrival
    #[arg(long, default_value_t = 0.0)]
    window_margin: f64,

    /// Seconds simulated from the start of the window
    #[arg(long, default_value_t = 3600.0)]
    window_length: f64,
}

pub(super) fn run_calculate_adjoint_sources(
    project: &Path,
    args: AdjointArgs,
) -> Result<i32, CliError> {
    let context = ProjectContext::load(project)?;
    let iteration = context.iteration(&args.iteration)?;
    let actions = Actions::new(
        &context.config,
        &context.archive,
        &context.archive,
        &context.archive,
    )?;
    let misfit = WaveformDifferenceMisfit;

    let mut failed = 0;
    for event_name in select_events(&iteration, &args.events)? {
        let event = context.archive.event(&event_name)?;
        let calculator =
            MisfitAdjointCalculator::new(&event, &iteration, &context.archive, &misfit);
        let report = actions.calculate_all_adjoint_sources(&iteration, &event_name, &calculator)?;
        emit(format!(
            "{}: adjoint sources computed for {} of {} station(s)",
            event_name,
            report.succeeded.len(),
            report.total
        ))?;
        failed += report.failures.len();
    }
    if failed > 0 {
        warn!(failed, "some stations could not be computed");
    }
    Ok(0)
}

pub(super) fn run_finalize_adjoint_sources(
    project: &Path,
    args: AdjointArgs,
) -> Result<i32, CliError> {
    let context = ProjectContext::load(project)?;
    let iteration = context.iteration(&args.iteration)?;
    let actions = Actions::new(
        &context.config,
        &context.archive,
        &context.archive,
        &context.archive,
    )?;
    let misfit = WaveformDifferenceMisfit;

    for event_name in select_events(&iteration, &args.events)? {
        let event = context.archive.event(&event_name)?;
        let calculator =
            MisfitAdjointCalculator::new(&event, &iteration, &context.archive, &misfit);
        let report = actions.finalize_adjoint_sources(&iteration, &event_name, &calculator)?;
        if report.manifest.is_some() {
            emit(format!(
                "{}: wrote adjoint sources for {} station(s) to {}",
                event_name,
                report.stations_written.len(),
                report.output_folder.display()
            ))?;
        } else {
            emit(format!("{}: Could not create a single adjoint source.", event_name))?;
        }
    }
    Ok(0)
}

pub(super) fn run_generate_input_files(
    project: &Path,
    args: InputFileArgs,
) -> Result<i32, CliError> {
    let simulation_type = SimulationType::parse(&args.simulation_type)?;
    let context = ProjectContext::load(project)?;
    let iteration = context.iteration(&args.iteration)?;
    let actions = Actions::new(
        &context.config,
        &context.archive,
        &context.archive,
        &context.archive,
    )?;

    for event_name in select_events(&iteration, &args.events)? {
        let written = actions.generate_input_files(
            &iteration,
            &event_name,
            simulation_type,
            &JsonInputFileWriter,
        )?;
        for path in written {
            emit(path.display())?;
        }
    }
    Ok(0)
}

pub(super) fn run_write_station_lists(
    project: &Path,
    args: StationListArgs,
) -> Result<i32, CliError> {
    let context = ProjectContext::load(project)?;
    let iteration = context.iteration(&args.iteration)?;

    for path in write_station_lists(&context.config, &iteration, &context.archive)? {
        emit(path.display())?;
    }

    if args.cmt_solutions {
        let written =
            write_cmt_solutions(&context.config, &iteration, &context.archive, &context.archive)?;
        for path in written {
            emit(path.display())?;
        }
    }

    if args.setup_file {
        let timings: BTreeMap<String, EventTiming> = match &args.travel_times {
            Some(table) => event_timings(
                &context.config,
                &iteration,
                &context.archive,
                &TravelTimeTable::load(table)?,
                &args.phase,
                ArrivalWindow {
                    margin: args.window_margin,
                    length: args.window_length,
                },
            )?,
            None => {
                let timing = EventTiming::from_iteration(&iteration);
                iteration
                    .events
                    .keys()
                    .map(|event_name| (event_name.clone(), timing))
                    .collect()
            }
        };
        let setup = ChunkSetup::from_domain(&context.config.domain, iteration.minimum_period());
        let path = setup.write(&context.config, &iteration, &timings)?;
        emit(path.display())?;
    }
    Ok(0)
}

pub(super) fn run_specfem_domain(project: &Path) -> Result<i32, CliError> {
    let context = ProjectContext::load(project)?;
    let chunk = specfem_globe_domain(&context.config.domain).map_err(LasifError::from)?;

    for (key, value) in [
        ("ANGULAR_WIDTH_XI_IN_DEGREES", chunk.angular_width_xi_in_degrees),
        ("ANGULAR_WIDTH_ETA_IN_DEGREES", chunk.angular_width_eta_in_degrees),
        ("CENTER_LATITUDE_IN_DEGREES", chunk.center_latitude_in_degrees),
        ("CENTER_LONGITUDE_IN_DEGREES", chunk.center_longitude_in_degrees),
        ("GAMMA_ROTATION_AZIMUTH", chunk.gamma_rotation_azimuth),
    ] {
        emit(format!("{} = {}", key, format_float_repr(value)))?;
    }
    Ok(if chunk.consistent { 0 } else { 1 })
}
