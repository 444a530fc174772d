use super::preprocess::complete_components;
use super::{Actions, channels_by_station};
use crate::domain::project::ensure_directory;
use crate::domain::{
    ChannelId, Component, Event, Iteration, LasifResult, ProcessParams, StationCoordinates,
};
use crate::rotations::epicentral_distance_deg;
use crate::scheduler::{DistributionReport, EventScope, LogHeader, ProcessingLog};
use crate::sources::TravelTimeModel;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// One processed channel whose synthetic is needed for the source wavelet
/// estimate.
#[derive(Debug, Clone, PartialEq)]
pub struct StfChannelJob {
    pub event_name: String,
    pub event: Event,
    pub channel_id: ChannelId,
    pub component: Component,
    pub coordinates: StationCoordinates,
    /// Seconds after origin.
    pub first_p_arrival: f64,
    pub process_params: ProcessParams,
    pub iteration_name: String,
}

/// Computes the reference synthetic of one channel and stores it with the
/// iteration's synthetics.
pub trait SyntheticsGenerator: Send + Sync {
    fn generate(&self, job: &StfChannelJob) -> LasifResult<()>;
}

/// Deconvolves the synthetics of one event from its data and writes the
/// estimated source time function into `output_folder`.
pub trait StfDeconvolver: Send + Sync {
    fn deconvolve(
        &self,
        event_name: &str,
        jobs: &[StfChannelJob],
        output_folder: &Path,
        components: &[Component],
    ) -> LasifResult<()>;
}

#[derive(Debug, Default)]
pub struct StfReport {
    /// `None` when every synthetic already existed.
    pub synthetics: Option<DistributionReport>,
    /// Folder of every event whose wavelet was estimated.
    pub estimated: Vec<(String, PathBuf)>,
    /// Events without usable processed data.
    pub skipped: Vec<String>,
}

impl Actions<'_> {
    /// Estimates the source wavelet of every event of `iteration` (or of
    /// `event_names` only): missing synthetics are generated through the
    /// scheduler, then each event is deconvolved once.
    pub fn stf_estimate(
        &self,
        iteration: &Iteration,
        components: &[&str],
        event_names: Option<&[String]>,
        travel_times: &dyn TravelTimeModel,
        generator: &dyn SyntheticsGenerator,
        deconvolver: &dyn StfDeconvolver,
    ) -> LasifResult<StfReport> {
        let components = complete_components(components)?;
        let jobs = self.stf_jobs(iteration, &components, event_names, travel_times)?;

        let missing: Vec<StfChannelJob> = jobs
            .iter()
            .filter(|job| {
                !self
                    .waveforms
                    .has_synthetic(&job.event_name, &iteration.name, &job.channel_id)
            })
            .cloned()
            .collect();

        let mut report = StfReport::default();
        if missing.is_empty() {
            info!(iteration = %iteration.name, "No synthetic files to be processed");
        } else {
            let log = ProcessingLog::open(self.config.log_file(
                "SYNTHETICS",
                &format!("reference_synthetics_iteration_{}", iteration.name),
            )?)?;
            let scope =
                event_names.map_or(EventScope::All, |names| EventScope::Selected(names.len()));
            let mut header = LogHeader::new(
                format!("Synthetic info for iteration {}", iteration.name),
                scope,
            );
            header.components = components.iter().map(ToString::to_string).collect();
            log.write_header(&header)?;

            report.synthetics = Some(self.scheduler.distribute(
                "stf_synthetics",
                missing,
                |job| format!("{} -- {}", job.event_name, job.channel_id),
                |job| generator.generate(job),
                Some(&log),
            ));
        }

        for event_name in iteration.events.keys() {
            if event_names.is_some_and(|names| !names.contains(event_name)) {
                continue;
            }
            let event_jobs: Vec<StfChannelJob> = jobs
                .iter()
                .filter(|job| &job.event_name == event_name)
                .cloned()
                .collect();
            if event_jobs.is_empty() {
                info!(event = %event_name, "No data for this event, will skip the stf estimation");
                report.skipped.push(event_name.clone());
                continue;
            }

            let folder = self.waveforms.stf_folder(event_name, &iteration.name);
            ensure_directory(&folder, "IO.STF_FOLDER")?;
            info!(event = %event_name, channels = event_jobs.len(), "Estimating the stf");
            deconvolver.deconvolve(event_name, &event_jobs, &folder, &components)?;
            report.estimated.push((event_name.clone(), folder));
        }
        Ok(report)
    }

    fn stf_jobs(
        &self,
        iteration: &Iteration,
        components: &[Component],
        event_names: Option<&[String]>,
        travel_times: &dyn TravelTimeModel,
    ) -> LasifResult<Vec<StfChannelJob>> {
        let processing_tag = iteration.processing_tag();
        let mut jobs = Vec::new();

        for event_name in iteration.events.keys() {
            if event_names.is_some_and(|names| !names.contains(event_name)) {
                continue;
            }
            let event = self.events.event(event_name)?;

            let available = self.stations.stations_for_event(event_name).and_then(|stations| {
                Ok((stations, self.waveforms.processed_channels(event_name, &processing_tag)?))
            });
            let (stations, processed) = match available {
                Ok(available) => available,
                Err(error) if error.category().is_recoverable() => {
                    warn!(
                        event = %event_name,
                        "No data found for event '{}'. Did you delete data after the iteration \
                         has been created?",
                        event_name
                    );
                    continue;
                }
                Err(error) => return Err(error),
            };

            for (station, channels) in channels_by_station(processed) {
                let Some(coordinates) = stations.get(&station).copied() else {
                    continue;
                };

                let mut locations: Vec<&str> = channels.iter().map(ChannelId::location).collect();
                locations.dedup();
                let Some(location) = self.config.location_policy.choose(&locations) else {
                    continue;
                };
                if locations.len() > 1 {
                    warn!(
                        event = %event_name,
                        station = %station,
                        location,
                        "More than one location found for event '{}' at station '{}'.",
                        event_name,
                        station
                    );
                }
                let location = location.to_string();

                let distance = epicentral_distance_deg(
                    coordinates.latitude,
                    coordinates.longitude,
                    event.latitude,
                    event.longitude,
                );
                let Some(first_p_arrival) = travel_times.first_p_arrival(event.depth_in_km, distance)
                else {
                    warn!(
                        event = %event_name,
                        station = %station,
                        "No P wave for epicentral distance {:.6}",
                        distance
                    );
                    continue;
                };

                for channel_id in channels.into_iter().filter(|channel| channel.location() == location) {
                    let Some(component) = channel_id.component().filter(|c| components.contains(c))
                    else {
                        continue;
                    };
                    jobs.push(StfChannelJob {
                        event_name: event_name.clone(),
                        event: event.clone(),
                        channel_id,
                        component,
                        coordinates,
                        first_p_arrival,
                        process_params: iteration.process_params,
                        iteration_name: iteration.name.clone(),
                    });
                }
            }
        }
        Ok(jobs)
    }
}
