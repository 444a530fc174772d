//! Setup files for the coupled SPECFEM/AxiSEM FWI chunk workflow: per-event
//! station lists and CMT solutions, and the `KEY : VALUE` meshing setup.

use crate::domain::project::ensure_directory;
use crate::domain::{
    Domain, Event, Iteration, LasifError, LasifResult, ProjectConfig, StationCoordinates,
};
use crate::rotations::epicentral_distance_deg;
use crate::serialization::{format_float_repr, format_scientific, write_artifact};
use crate::sources::{EventCatalog, StationCatalog, TravelTimeModel, WaveformArchive};
use chrono::{Datelike, Timelike};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::PathBuf;
use tracing::{info, warn};

pub const SETUP_FILE_NAME: &str = "setup_file.in";
pub const CMT_FOLDER_NAME: &str = "CMTSOLUTION_FILES";

/// N m to dyne cm.
const NEWTON_METER_TO_DYNE_CM: f64 = 1.0e7;

/// Slowest shear velocity assumed in the chunk, km/s.
const SLOWEST_WAVE_SPEED: f64 = 3.8;

/// Writes one `STATIONS_<event>` file per event of the iteration into
/// `<output>/<iteration>/`. Events without station information get an empty
/// file.
pub fn write_station_lists(
    config: &ProjectConfig,
    iteration: &Iteration,
    stations: &dyn StationCatalog,
) -> LasifResult<Vec<PathBuf>> {
    let folder = config.paths.output.join(&iteration.name);
    ensure_directory(&folder, "IO.OUTPUT_FOLDER")?;

    let mut written = Vec::with_capacity(iteration.events.len());
    for event_name in iteration.events.keys() {
        let coordinates = match stations.stations_for_event(event_name) {
            Ok(coordinates) => coordinates,
            Err(error) if error.category().is_recoverable() => {
                warn!(event = %event_name, "no station information: {}", error);
                BTreeMap::new()
            }
            Err(error) => return Err(error),
        };
        let path = folder.join(format!("STATIONS_{}", event_name));
        write_artifact(&path, &render_station_list(&coordinates), "IO.STATION_LIST")?;
        written.push(path);
    }
    info!(
        iteration = %iteration.name,
        files = written.len(),
        "wrote station lists to {}",
        folder.display()
    );
    Ok(written)
}

/// `station network latitude longitude elevation burial`, one station per line.
pub fn render_station_list(stations: &BTreeMap<String, StationCoordinates>) -> String {
    let mut rendered = String::new();
    for (id, coordinates) in stations {
        let (network, station) = crate::domain::split_station_id(id);
        let _ = writeln!(
            rendered,
            "{} {} {} {} {} {}",
            station,
            network,
            format_float_repr(coordinates.latitude),
            format_float_repr(coordinates.longitude),
            format_float_repr(coordinates.elevation_in_m),
            format_float_repr(coordinates.local_depth_in_m)
        );
    }
    rendered
}

/// `CMTSOLUTION` text of `event`. Moment tensor components are stored in
/// N m and written in dyne cm; time shift and half duration are zero.
pub fn render_cmt_solution(event: &Event) -> String {
    let origin = event.origin_time;
    let seconds = origin.second() as f64 + origin.nanosecond() as f64 / 1.0e9;
    let mut rendered = format!(
        " {:>4}{:5}{:3}{:3}{:3}{:3}{:6.2}{:9.4}{:10.4}{:6.1}{:4.1}{:4.1} {}\n",
        "PDE",
        origin.year(),
        origin.month(),
        origin.day(),
        origin.hour(),
        origin.minute(),
        seconds,
        event.latitude,
        event.longitude,
        event.depth_in_km,
        event.magnitude,
        event.magnitude,
        event.event_name
    );
    let _ = writeln!(rendered, "event name:{:>17}", event.event_name);
    let _ = writeln!(rendered, "time shift:{:17.4}", 0.0);
    let _ = writeln!(rendered, "half duration:{:14.4}", 0.0);
    let _ = writeln!(rendered, "latitude:{:19.4}", event.latitude);
    let _ = writeln!(rendered, "longitude:{:18.4}", event.longitude);
    let _ = writeln!(rendered, "depth:{:22.4}", event.depth_in_km);
    let tensor = event.moment_tensor;
    for (name, value) in [
        ("Mrr", tensor.m_rr),
        ("Mtt", tensor.m_tt),
        ("Mpp", tensor.m_pp),
        ("Mrt", tensor.m_rt),
        ("Mrp", tensor.m_rp),
        ("Mtp", tensor.m_tp),
    ] {
        let value = format_scientific(value * NEWTON_METER_TO_DYNE_CM, 6).to_uppercase();
        let _ = writeln!(rendered, "{}:{:>24}", name, value);
    }
    rendered
}

/// Writes `<output>/<iteration>/CMTSOLUTION_FILES/CMTSOLUTION_<event>` for
/// every event of the iteration that has preprocessed data.
pub fn write_cmt_solutions(
    config: &ProjectConfig,
    iteration: &Iteration,
    events: &dyn EventCatalog,
    waveforms: &dyn WaveformArchive,
) -> LasifResult<Vec<PathBuf>> {
    let folder = config.paths.output.join(&iteration.name).join(CMT_FOLDER_NAME);
    let processing_tag = iteration.processing_tag();

    let mut written = Vec::with_capacity(iteration.events.len());
    for event_name in iteration.events.keys() {
        match waveforms.processed_channels(event_name, &processing_tag) {
            Ok(channels) if !channels.is_empty() => {}
            Ok(_) => {
                warn!(event = %event_name, "no preprocessed data, skipping CMT solution");
                continue;
            }
            Err(error) if error.category().is_recoverable() => {
                warn!(event = %event_name, "no preprocessed data, skipping CMT solution: {}", error);
                continue;
            }
            Err(error) => return Err(error),
        }

        let event = events.event(event_name)?;
        ensure_directory(&folder, "IO.OUTPUT_FOLDER")?;
        let path = folder.join(format!("CMTSOLUTION_{}", event_name));
        write_artifact(&path, &render_cmt_solution(&event), "IO.CMT_SOLUTION")?;
        written.push(path);
    }
    info!(
        iteration = %iteration.name,
        files = written.len(),
        "wrote CMT solutions to {}",
        folder.display()
    );
    Ok(written)
}

/// Earliest arrival of `phase` at any of the four domain corners, in seconds
/// after the origin time.
pub fn fastest_arrival(
    event: &Event,
    domain: &Domain,
    travel_times: &dyn TravelTimeModel,
    phase: &str,
) -> LasifResult<f64> {
    domain
        .corners()
        .into_iter()
        .filter_map(|(latitude, longitude)| {
            let distance =
                epicentral_distance_deg(event.latitude, event.longitude, latitude, longitude);
            travel_times.first_arrival(phase, event.depth_in_km, distance)
        })
        .min_by(f64::total_cmp)
        .ok_or_else(|| {
            LasifError::computation(
                "RUN.FASTEST_ARRIVAL",
                format!(
                    "No {} arrival at any corner of the domain for event '{}'.",
                    phase, event.event_name
                ),
            )
        })
}

/// Part of each record kept around the fastest arrival.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArrivalWindow {
    /// Seconds kept before the fastest arrival.
    pub margin: f64,
    /// Seconds simulated from the start of the window.
    pub length: f64,
}

/// Simulation time window of one event, in seconds after the origin time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventTiming {
    pub time_begin: f64,
    pub time_end: f64,
    pub time_length: f64,
    pub time_step: f64,
}

impl EventTiming {
    /// Timing implied by the iteration's simulation parameters.
    pub fn from_iteration(iteration: &Iteration) -> Self {
        let simulation = iteration.solver_settings.simulation_parameters;
        let time_length = simulation.number_of_time_steps as f64 * simulation.time_increment;
        Self {
            time_begin: 0.0,
            time_end: time_length,
            time_length,
            time_step: simulation.time_increment,
        }
    }

    /// Timing of a record cut from `margin` seconds before the fastest
    /// arrival; `time_step` is the sampling of the cut record.
    pub fn from_fastest_arrival(fastest_arrival: f64, window: ArrivalWindow, time_step: f64) -> Self {
        let time_begin = fastest_arrival - window.margin;
        Self {
            time_begin,
            time_end: time_begin + window.length,
            time_length: window.margin + window.length,
            time_step,
        }
    }
}

/// Timing of every event of the iteration derived from the fastest arrival
/// of `phase` into the domain, sampled at the processing interval.
pub fn event_timings(
    config: &ProjectConfig,
    iteration: &Iteration,
    events: &dyn EventCatalog,
    travel_times: &dyn TravelTimeModel,
    phase: &str,
    window: ArrivalWindow,
) -> LasifResult<BTreeMap<String, EventTiming>> {
    let mut timings = BTreeMap::new();
    for event_name in iteration.events.keys() {
        let event = events.event(event_name)?;
        let arrival = fastest_arrival(&event, &config.domain, travel_times, phase)?;
        timings.insert(
            event_name.clone(),
            EventTiming::from_fastest_arrival(arrival, window, iteration.process_params.dt),
        );
    }
    Ok(timings)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChunkSetup {
    pub longitude_center: f64,
    pub latitude_center: f64,
    pub longitude_extension: f64,
    pub latitude_extension: f64,
    pub vertical_extension: f64,
    pub azimuth: f64,
    pub depth: f64,
    pub element_size_in_km: f64,
    pub dominant_period: f64,
}

impl ChunkSetup {
    pub fn from_domain(domain: &Domain, lowpass_period: f64) -> Self {
        if domain.rotation_axis != [0.0, 0.0, 1.0] {
            warn!(
                "rotation_angle_in_degree is understood as the rotation around the Z axis for \
                 the chunk setup"
            );
        }
        Self {
            longitude_center: (domain.min_longitude + domain.max_longitude) / 2.0,
            latitude_center: (domain.min_latitude + domain.max_latitude) / 2.0,
            longitude_extension: domain.longitude_range() / 2.0,
            latitude_extension: domain.latitude_range() / 2.0,
            vertical_extension: domain.max_depth_in_km - domain.min_depth_in_km,
            azimuth: domain.rotation_angle_in_degree,
            depth: domain.min_depth_in_km,
            // one spectral element per half wavelength of the slowest wave
            element_size_in_km: SLOWEST_WAVE_SPEED * lowpass_period / 2.0,
            dominant_period: lowpass_period,
        }
    }

    /// Renders the setup file. Time sampling is taken from the alphabetically
    /// first event; every event contributes its CMT and station file entries.
    pub fn render(&self, timings: &BTreeMap<String, EventTiming>) -> LasifResult<String> {
        let Some(first) = timings.values().next() else {
            return Err(LasifError::configuration(
                "CONFIG.CHUNK_EVENTS",
                "the chunk setup needs at least one event",
            ));
        };

        let mut out = String::new();
        let mut key = |name: &str, value: String| {
            let _ = writeln!(out, "{} : {}", name, value);
        };
        key("axisem_coupling", "1".to_string());
        key("model_type", "ak135".to_string());
        key("LONGITUDE_CENTER_OF_CHUNK", format_float_repr(self.longitude_center));
        key("LATITUDE_CENTER_OF_CHUNK", format_float_repr(self.latitude_center));
        key("LONGITUDE_EXTENTION", format_float_repr(self.longitude_extension));
        key("LATITUDE_EXTENTION", format_float_repr(self.latitude_extension));
        key("VERTICAL_EXTENTION", format_float_repr(self.vertical_extension));
        key("AZIMUTH_OF_CHUNK", format_float_repr(self.azimuth));
        key("DEPTH_OF_CHUNK", format_float_repr(self.depth));
        let element_size = format_float_repr(self.element_size_in_km);
        key("SIZE_EL_LONGITUDE_IN_KM", element_size.clone());
        key("SIZE_EL_LATITUDE_IN_KM", element_size.clone());
        key("SIZE_EL_DEPTH_IN_KM", element_size);
        key("EARTH_MODEL", "ak135".to_string());
        key("DOMINANT_PERIOD", format_float_repr(self.dominant_period));
        key("NTHETA_SLICES", "8".to_string());
        key("NRADIAL_SLICES", "2".to_string());
        for event_name in timings.keys() {
            key("CMT_SOLUTION_FILE", format!("CMTSOLUTION_{}", event_name));
        }
        key("station_type", "geo_file".to_string());
        for event_name in timings.keys() {
            key("STATION_FILE", format!("STATIONS_{}", event_name));
        }
        key("number_of_mpi_domain", "1".to_string());
        key("time_length", format_float_repr(first.time_length));
        key("time_step", format_float_repr(first.time_step));
        // data sampling is twice the simulation step
        key("time_step_data", format_float_repr(first.time_step * 2.0));
        key("use_gpu", "1".to_string());
        let joined = |value: fn(&EventTiming) -> f64| {
            timings
                .values()
                .map(|timing| format_float_repr(value(timing)))
                .collect::<Vec<_>>()
                .join(" ")
        };
        key("TIME_BEGIN", joined(|timing| timing.time_begin));
        key("TIME_END", joined(|timing| timing.time_end));
        key("script_type", "default".to_string());
        key("use_inverse_problem", "1".to_string());
        Ok(out)
    }

    /// Writes `<output>/<iteration>/setup_file.in`.
    pub fn write(
        &self,
        config: &ProjectConfig,
        iteration: &Iteration,
        timings: &BTreeMap<String, EventTiming>,
    ) -> LasifResult<PathBuf> {
        let folder = config.paths.output.join(&iteration.name);
        ensure_directory(&folder, "IO.OUTPUT_FOLDER")?;
        let path = folder.join(SETUP_FILE_NAME);
        write_artifact(&path, &self.render(timings)?, "IO.SETUP_FILE")?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        ArrivalWindow, ChunkSetup, EventTiming, fastest_arrival, render_cmt_solution,
        render_station_list,
    };
    use crate::domain::{Domain, Event, LasifErrorCategory, MomentTensor, StationCoordinates};
    use crate::sources::TravelTimeModel;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    /// Ten seconds per degree of epicentral distance.
    struct LinearTravelTimes;

    impl TravelTimeModel for LinearTravelTimes {
        fn first_p_arrival(&self, _source_depth_in_km: f64, distance_in_degree: f64) -> Option<f64> {
            (distance_in_degree < 30.0).then_some(10.0 * distance_in_degree)
        }
    }

    fn event(latitude: f64, longitude: f64) -> Event {
        Event {
            event_name: "GCMT_event_TURKEY_Mag_5.9_2011-5-19-20-15".to_string(),
            origin_time: Utc
                .with_ymd_and_hms(2011, 5, 19, 20, 15, 22)
                .single()
                .expect("valid origin time"),
            latitude,
            longitude,
            depth_in_km: 7.0,
            magnitude: 5.9,
            magnitude_type: "Mwc".to_string(),
            moment_tensor: MomentTensor {
                m_rr: 5.1e17,
                m_tt: -2.5e17,
                m_pp: -2.6e17,
                m_rt: 0.0,
                m_rp: 1.2e16,
                m_tp: -3.0e17,
            },
        }
    }

    fn domain() -> Domain {
        Domain {
            min_latitude: 30.0,
            max_latitude: 40.0,
            min_longitude: 130.0,
            max_longitude: 145.0,
            min_depth_in_km: 0.0,
            max_depth_in_km: 400.0,
            rotation_axis: [0.0, 0.0, 1.0],
            rotation_angle_in_degree: 15.0,
        }
    }

    fn chunk(lowpass_period: f64) -> ChunkSetup {
        ChunkSetup::from_domain(&domain(), lowpass_period)
    }

    #[test]
    fn chunk_geometry_follows_domain_bounds() {
        let setup = chunk(20.0);

        assert_eq!(setup.longitude_center, 137.5);
        assert_eq!(setup.latitude_center, 35.0);
        assert_eq!(setup.longitude_extension, 7.5);
        assert_eq!(setup.latitude_extension, 5.0);
        assert_eq!(setup.vertical_extension, 400.0);
        assert_eq!(setup.azimuth, 15.0);
        assert_eq!(setup.depth, 0.0);
        assert!((setup.element_size_in_km - 38.0).abs() < 1e-12);
        assert_eq!(setup.dominant_period, 20.0);
    }

    #[test]
    fn station_list_splits_network_and_station() {
        let mut stations = BTreeMap::new();
        stations.insert(
            "BO.ABU".to_string(),
            StationCoordinates {
                latitude: 34.86,
                longitude: 139.82,
                elevation_in_m: 44.0,
                local_depth_in_m: 0.0,
            },
        );

        assert_eq!(
            render_station_list(&stations),
            "ABU BO 34.86 139.82 44.0 0.0\n"
        );
    }

    #[test]
    fn setup_lists_every_event_and_uses_the_first_timing() {
        let mut timings = BTreeMap::new();
        timings.insert(
            "event_b".to_string(),
            EventTiming {
                time_begin: 10.0,
                time_end: 200.0,
                time_length: 300.0,
                time_step: 0.2,
            },
        );
        timings.insert(
            "event_a".to_string(),
            EventTiming {
                time_begin: 5.0,
                time_end: 100.0,
                time_length: 150.0,
                time_step: 0.1,
            },
        );

        let rendered = chunk(20.0).render(&timings).expect("setup should render");
        let lines: Vec<&str> = rendered.lines().collect();

        assert!(lines.contains(&"LONGITUDE_CENTER_OF_CHUNK : 137.5"));
        assert!(lines.contains(&"AZIMUTH_OF_CHUNK : 15.0"));
        assert!(lines.contains(&"SIZE_EL_DEPTH_IN_KM : 38.0"));
        assert!(lines.contains(&"time_step : 0.1"));
        assert!(lines.contains(&"time_step_data : 0.2"));
        assert!(lines.contains(&"TIME_BEGIN : 5.0 10.0"));
        let cmt: Vec<&&str> = lines
            .iter()
            .filter(|line| line.starts_with("CMT_SOLUTION_FILE"))
            .collect();
        assert_eq!(
            cmt,
            vec![
                &"CMT_SOLUTION_FILE : CMTSOLUTION_event_a",
                &"CMT_SOLUTION_FILE : CMTSOLUTION_event_b"
            ]
        );
    }

    #[test]
    fn setup_without_events_is_rejected() {
        let error = chunk(20.0)
            .render(&BTreeMap::new())
            .expect_err("no events should fail");
        assert_eq!(error.code(), "CONFIG.CHUNK_EVENTS");
    }

    #[test]
    fn cmt_solution_lists_hypocenter_and_moment_tensor_in_dyne_cm() {
        let rendered = render_cmt_solution(&event(39.15, 29.1));
        let lines: Vec<&str> = rendered.lines().collect();

        assert_eq!(
            lines[0],
            "  PDE 2011  5 19 20 15 22.00  39.1500   29.1000   7.0 5.9 5.9 \
             GCMT_event_TURKEY_Mag_5.9_2011-5-19-20-15"
        );
        assert_eq!(lines[1], "event name:GCMT_event_TURKEY_Mag_5.9_2011-5-19-20-15");
        assert_eq!(lines[2], "time shift:           0.0000");
        assert_eq!(lines[6], "depth:                7.0000");
        assert_eq!(lines[7], "Mrr:            5.100000E+24");
        assert_eq!(lines[10], "Mrt:            0.000000E+00");
        assert_eq!(lines[12], "Mtp:           -3.000000E+24");
        assert_eq!(lines.len(), 13);
    }

    #[test]
    fn fastest_arrival_uses_the_nearest_domain_corner() {
        let domain = Domain {
            min_latitude: 0.0,
            max_latitude: 10.0,
            min_longitude: 0.0,
            max_longitude: 10.0,
            min_depth_in_km: 0.0,
            max_depth_in_km: 500.0,
            rotation_axis: [0.0, 0.0, 1.0],
            rotation_angle_in_degree: 0.0,
        };

        let arrival = fastest_arrival(&event(0.0, -5.0), &domain, &LinearTravelTimes, "P")
            .expect("P should reach the domain");
        assert!((arrival - 50.0).abs() < 1e-9);

        let error = fastest_arrival(&event(0.0, -5.0), &domain, &LinearTravelTimes, "S")
            .expect_err("model knows no S");
        assert_eq!(error.category(), LasifErrorCategory::Computation);
        assert_eq!(error.code(), "RUN.FASTEST_ARRIVAL");
    }

    #[test]
    fn arrival_timing_starts_one_margin_before_the_arrival() {
        let timing = EventTiming::from_fastest_arrival(
            120.0,
            ArrivalWindow {
                margin: 20.0,
                length: 300.0,
            },
            0.5,
        );

        assert_eq!(
            timing,
            EventTiming {
                time_begin: 100.0,
                time_end: 400.0,
                time_length: 320.0,
                time_step: 0.5,
            }
        );
    }
}
