use super::{Actions, channels_by_station};
use crate::adjoint::{AdjointSourceWriter, OutputFormatter, aggregate_station};
use crate::domain::{Iteration, LasifResult};
use crate::scheduler::DistributionReport;
use crate::windows::AdjointSourceCalculator;
use std::path::PathBuf;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FinalizeReport {
    pub output_folder: PathBuf,
    /// `NET.STA` of every station with written adjoint sources, in write
    /// order.
    pub stations_written: Vec<String>,
    /// Stations whose adjoint source could not be computed.
    pub stations_failed: Vec<String>,
    pub manifest: Option<PathBuf>,
}

impl Actions<'_> {
    /// Computes (and caches) the adjoint source of every window of the event.
    /// Stations whose computation fails are reported, not fatal.
    pub fn calculate_all_adjoint_sources(
        &self,
        iteration: &Iteration,
        event_name: &str,
        calculator: &dyn AdjointSourceCalculator,
    ) -> LasifResult<DistributionReport> {
        let iteration_event = iteration.event(event_name)?;
        let manager = self.window_manager(event_name, &iteration.name);

        let stations: Vec<_> = channels_by_station(manager.list()?)
            .into_iter()
            .filter(|(station, _)| iteration_event.stations.contains_key(station))
            .collect();

        let report = self.scheduler.distribute(
            "calculate_adjoint_sources",
            stations,
            |(station, _)| station.clone(),
            |(_, channels)| {
                for channel_id in channels {
                    for window in manager.get(channel_id)?.iter() {
                        manager.get_or_compute_adjoint_source(channel_id, window, calculator)?;
                    }
                }
                Ok(())
            },
            None,
        );
        for failure in &report.failures {
            warn!(
                "Could not calculate adjoint source for iteration {} and station {}. Repick \
                 windows? Reason: {}",
                iteration.name,
                failure.name,
                failure.error
            );
        }
        Ok(report)
    }

    /// Combines the windows of every station into weighted three-component
    /// adjoint sources and writes them in the iteration's solver format.
    pub fn finalize_adjoint_sources(
        &self,
        iteration: &Iteration,
        event_name: &str,
        calculator: &dyn AdjointSourceCalculator,
    ) -> LasifResult<FinalizeReport> {
        let iteration_event = iteration.event(event_name)?;
        let mut writer = AdjointSourceWriter::for_iteration(iteration, &self.config.domain)?;
        let output_folder = self.config.output_folder(
            "adjoint_sources",
            &format!("ITERATION_{}__{}", iteration.name, event_name),
        )?;
        let manager = self.window_manager(event_name, &iteration.name);

        let mut report = FinalizeReport {
            output_folder: output_folder.clone(),
            ..FinalizeReport::default()
        };
        let mut coordinates = None;

        let stations = channels_by_station(manager.list()?);
        let total = stations.len();
        let step = (total / 10).max(1);
        for (index, (station, channels)) in stations.into_iter().enumerate() {
            let processed = index + 1;
            if processed % step == 0 || processed == total {
                info!(label = "finalize_adjoint_sources", processed, total, "progress");
            }
            let Some(iteration_station) = iteration_event.stations.get(&station) else {
                continue;
            };
            let scale = iteration_event.event_weight * iteration_station.station_weight;

            let source = match aggregate_station(&manager, &station, &channels, scale, calculator) {
                Ok(Some(source)) => source,
                Ok(None) => {
                    debug!(station = %station, "no usable windows");
                    continue;
                }
                Err(error) if error.category().is_recoverable() => {
                    warn!(
                        "Could not calculate adjoint source for iteration {} and station {}. \
                         Repick windows? Reason: {}",
                        iteration.name, station, error
                    );
                    report.stations_failed.push(station);
                    continue;
                }
                Err(error) => return Err(error),
            };

            if coordinates.is_none() {
                coordinates = Some(self.stations.stations_for_event(event_name)?);
            }
            let Some(station_coordinates) = coordinates
                .as_ref()
                .and_then(|all| all.get(&station))
                .copied()
            else {
                warn!(event = %event_name, station = %station, "no coordinates for station");
                report.stations_failed.push(station);
                continue;
            };

            writer.serialize_station(&output_folder, &source, &station_coordinates)?;
            report.stations_written.push(station);
        }

        if writer.stations_written() == 0 {
            warn!(
                event = %event_name,
                iteration = %iteration.name,
                "Could not create a single adjoint source."
            );
            return Ok(report);
        }

        report.manifest = writer.serialize_manifest(&output_folder)?;
        info!(
            "Wrote adjoint sources for {} station(s) to {}.",
            report.stations_written.len(),
            output_folder.display()
        );
        Ok(report)
    }
}
