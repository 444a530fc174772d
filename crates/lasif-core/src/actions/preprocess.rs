use super::{Actions, channels_by_station};
use crate::domain::{
    ChannelId, Component, Event, Iteration, LasifError, LasifResult, ProcessParams,
    StationCoordinates,
};
use crate::rotations::epicentral_distance_deg;
use crate::scheduler::{DistributionReport, EventScope, LogHeader, ProcessingLog};
use crate::sources::TravelTimeModel;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

/// Everything the preprocessing strategy needs for one station of one event.
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessingJob {
    pub event_name: String,
    pub event: Event,
    /// `NET.STA.LOC` of the chosen location.
    pub station: String,
    pub coordinates: StationCoordinates,
    /// Seconds after origin.
    pub first_p_arrival: f64,
    pub process_params: ProcessParams,
    pub processing_tag: String,
    pub components: Vec<Component>,
    pub noise_threshold: Option<f64>,
    pub channels: Vec<ChannelId>,
}

pub trait Preprocessor: Send + Sync {
    fn process(&self, job: &PreprocessingJob) -> LasifResult<()>;
}

/// Validates the requested components and adds the missing partner of each
/// horizontal pair (R with T, E with N).
pub fn complete_components(requested: &[&str]) -> LasifResult<Vec<Component>> {
    if requested.len() > 3 {
        return Err(LasifError::configuration(
            "CONFIG.COMPONENTS",
            "There are more than 3 components given",
        ));
    }

    let mut components = Vec::with_capacity(4);
    for token in requested {
        let component = Component::parse(token)?;
        if !components.contains(&component) {
            components.push(component);
        }
    }
    for (present, partner) in [
        (Component::R, Component::T),
        (Component::T, Component::R),
        (Component::E, Component::N),
        (Component::N, Component::E),
    ] {
        if components.contains(&present) && !components.contains(&partner) {
            components.push(partner);
        }
    }
    Ok(components)
}

/// Recorded components needed to produce `components`; R and T are derived
/// from E and N.
pub fn components_to_process(components: &[Component]) -> Vec<Component> {
    let mut needed = Vec::with_capacity(3);
    let mut require = |component: Component| {
        if !needed.contains(&component) {
            needed.push(component);
        }
    };
    if components.contains(&Component::R) || components.contains(&Component::T) {
        require(Component::E);
        require(Component::N);
    }
    for component in Component::GEOGRAPHIC {
        if components.contains(&component) {
            require(component);
        }
    }
    needed
}

impl Actions<'_> {
    /// Preprocesses the raw data of every event of `iteration` (or of
    /// `event_names` only) through `preprocessor`, one job per station.
    #[allow(clippy::too_many_arguments)]
    pub fn preprocess_data(
        &self,
        iteration: &Iteration,
        components: &[&str],
        noise_threshold: Option<f64>,
        event_names: Option<&[String]>,
        recompute: bool,
        travel_times: &dyn TravelTimeModel,
        preprocessor: &dyn Preprocessor,
    ) -> LasifResult<DistributionReport> {
        let components = complete_components(components)?;
        let needed = components_to_process(&components);

        let (jobs, origin_times) = self.preprocessing_jobs(
            iteration,
            &components,
            &needed,
            noise_threshold,
            event_names,
            recompute,
            travel_times,
        )?;
        if jobs.is_empty() {
            info!(iteration = %iteration.name, "No data files to be processed");
        }

        let log = ProcessingLog::open(self.config.log_file(
            "DATA_PREPROCESSING",
            &format!("processing_iteration_{}", iteration.name),
        )?)?;
        let scope = event_names.map_or(EventScope::All, |names| EventScope::Selected(names.len()));
        let mut header = LogHeader::new(
            format!("Processing info for iteration {}", iteration.name),
            scope,
        );
        header.origin_time_range = origin_times
            .iter()
            .min()
            .zip(origin_times.iter().max())
            .map(|(first, last)| (*first, *last));
        header.components = components.iter().map(ToString::to_string).collect();
        header.extra_lines.push(match noise_threshold {
            Some(threshold) => format!("with noise threshold {:.2}", threshold),
            None => "with noise threshold by default (see preprocessing strategy)".to_string(),
        });
        log.write_header(&header)?;

        Ok(self.scheduler.distribute(
            "preprocess_data",
            jobs,
            |job| format!("{} -- {}", job.event_name, job.station),
            |job| preprocessor.process(job),
            Some(&log),
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn preprocessing_jobs(
        &self,
        iteration: &Iteration,
        components: &[Component],
        needed: &[Component],
        noise_threshold: Option<f64>,
        event_names: Option<&[String]>,
        recompute: bool,
        travel_times: &dyn TravelTimeModel,
    ) -> LasifResult<(Vec<PreprocessingJob>, Vec<DateTime<Utc>>)> {
        let processing_tag = iteration.processing_tag();
        let mut jobs = Vec::new();
        let mut origin_times = Vec::new();

        for event_name in iteration.events.keys() {
            if event_names.is_some_and(|names| !names.contains(event_name)) {
                continue;
            }
            let event = self.events.event(event_name)?;
            origin_times.push(event.origin_time);

            let available = self
                .stations
                .stations_for_event(event_name)
                .and_then(|stations| Ok((stations, self.waveforms.raw_channels(event_name)?)));
            let (stations, raw_channels) = match available {
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

            for (station, channels) in channels_by_station(raw_channels) {
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
                        "More than one location found for event '{}' at station '{}'. Location \
                         '{}' will be chosen.",
                        event_name,
                        station,
                        location
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
                    warn!(event = %event_name, station = %station, "No P wave for station {}", station);
                    continue;
                };

                let selected: Vec<ChannelId> = channels
                    .into_iter()
                    .filter(|channel| channel.location() == location)
                    .filter(|channel| channel.component().is_some_and(|c| needed.contains(&c)))
                    .filter(|channel| {
                        recompute || !self.output_exists(event_name, &processing_tag, channel, components)
                    })
                    .collect();
                if selected.is_empty() {
                    continue;
                }

                jobs.push(PreprocessingJob {
                    event_name: event_name.clone(),
                    event: event.clone(),
                    station: format!("{}.{}", station, location),
                    coordinates,
                    first_p_arrival,
                    process_params: iteration.process_params,
                    processing_tag: processing_tag.clone(),
                    components: components.to_vec(),
                    noise_threshold,
                    channels: selected,
                });
            }
        }
        Ok((jobs, origin_times))
    }

    /// A horizontal recording only counts as processed when the rotated
    /// outputs that were requested exist as well.
    fn output_exists(
        &self,
        event_name: &str,
        processing_tag: &str,
        channel: &ChannelId,
        components: &[Component],
    ) -> bool {
        if !self.waveforms.has_processed(event_name, processing_tag, channel) {
            return false;
        }
        if channel.component() == Some(Component::Z) {
            return true;
        }
        [Component::R, Component::T]
            .into_iter()
            .filter(|rotated| components.contains(rotated))
            .all(|rotated| {
                self.waveforms
                    .has_processed(event_name, processing_tag, &channel.with_component(rotated))
            })
    }
}
