use super::Actions;
use crate::domain::{
    Domain, Event, Iteration, LasifError, LasifResult, SimulationType, SolverFamily,
    StationCoordinates,
};
use crate::rotations::specfem_globe_domain;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const INPUT_FILE_NAME: &str = "solver_input.json";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputStation {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub elevation_in_m: f64,
    pub local_depth_in_m: f64,
}

/// Solver-independent description of one simulation, handed to an
/// [`InputFileWriter`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolverInput {
    pub solver_format: String,
    pub simulation_type: String,
    pub event: Event,
    pub stations: Vec<InputStation>,
    pub config: SolverInputConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SolverInputConfig {
    Ses3d(Ses3dInputConfig),
    SpecfemCartesian(SpecfemCartesianInputConfig),
    SpecfemGlobe(SpecfemGlobeInputConfig),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ses3dInputConfig {
    pub event_tag: String,
    pub number_of_time_steps: usize,
    pub time_increment_in_s: f64,
    pub output_folder: String,
    pub simulation_type: String,
    pub adjoint_forward_wavefield_output_folder: String,
    pub adjoint_forward_sampling_rate: usize,
    pub is_dissipative: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub q_model_relaxation_times: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub q_model_weights_of_relaxation_mechanisms: Option<Vec<f64>>,
    pub nx_global: usize,
    pub ny_global: usize,
    pub nz_global: usize,
    pub px: usize,
    pub py: usize,
    pub pz: usize,
    pub lagrange_polynomial_degree: usize,
    pub mesh_min_latitude: f64,
    pub mesh_max_latitude: f64,
    pub mesh_min_longitude: f64,
    pub mesh_max_longitude: f64,
    pub mesh_min_depth_in_km: f64,
    pub mesh_max_depth_in_km: f64,
    pub rotation_angle_in_degree: f64,
    pub rotation_axis: [f64; 3],
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SpecfemCartesianInputConfig {
    pub nstep: usize,
    pub dt: f64,
    pub nproc: usize,
    pub simulation_type: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SpecfemGlobeInputConfig {
    pub nproc_xi: usize,
    pub nproc_eta: usize,
    pub nchunks: usize,
    pub nex_xi: usize,
    pub nex_eta: usize,
    pub oceans: bool,
    pub ellipticity: bool,
    pub topography: bool,
    pub gravity: bool,
    pub rotation: bool,
    pub attenuation: bool,
    pub absorbing_conditions: bool,
    pub partial_phys_dispersion_only: bool,
    pub undo_attenuation: bool,
    pub gpu_mode: bool,
    pub simulation_type: u8,
    pub save_forward: bool,
    pub angular_width_xi_in_degrees: f64,
    pub angular_width_eta_in_degrees: f64,
    pub center_latitude_in_degrees: f64,
    pub center_longitude_in_degrees: f64,
    pub gamma_rotation_azimuth: f64,
    pub model: String,
    pub record_length_in_minutes: f64,
}

/// Renders a [`SolverInput`] into the files a solver run needs.
pub trait InputFileWriter {
    fn write(&self, input: &SolverInput, output_dir: &Path) -> LasifResult<Vec<PathBuf>>;
}

/// Writes the whole input description as one JSON document.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonInputFileWriter;

impl InputFileWriter for JsonInputFileWriter {
    fn write(&self, input: &SolverInput, output_dir: &Path) -> LasifResult<Vec<PathBuf>> {
        let path = output_dir.join(INPUT_FILE_NAME);
        let payload = serde_json::to_string_pretty(input).map_err(|source| {
            LasifError::internal(
                "RUN.INPUT_FILE_SERIALIZE",
                format!("failed to serialize solver input: {}", source),
            )
        })?;
        fs::write(&path, payload).map_err(|source| {
            LasifError::io_system(
                "IO.INPUT_FILE_WRITE",
                format!("failed to write '{}': {}", path.display(), source),
            )
        })?;
        Ok(vec![path])
    }
}

fn solver_format(family: SolverFamily) -> &'static str {
    match family {
        SolverFamily::Ses3d41 => "ses3d_4_1",
        SolverFamily::Ses3d20 => "ses3d_2_0",
        SolverFamily::Specfem3dCartesian => "SPECFEM3D_CARTESIAN",
        SolverFamily::Specfem3dGlobeCem => "SPECFEM3D_GLOBE_CEM",
    }
}

fn missing_settings(family: SolverFamily, block: &str) -> LasifError {
    LasifError::configuration(
        "CONFIG.SOLVER_SETTINGS",
        format!(
            "solver '{}' requires a '{}' block in the iteration's solver settings",
            family, block
        ),
    )
}

/// Builds the solver configuration of one event. Stations are limited to
/// those enabled for the event in `iteration`.
pub fn build_solver_input(
    iteration: &Iteration,
    event: &Event,
    stations: &BTreeMap<String, StationCoordinates>,
    domain: &Domain,
    simulation_type: SimulationType,
) -> LasifResult<SolverInput> {
    let iteration_event = iteration.event(&event.event_name)?;
    let family = iteration.solver_family()?;
    let settings = &iteration.solver_settings;
    let simulation = settings.simulation_parameters;

    let config = match family {
        SolverFamily::Ses3d41 | SolverFamily::Ses3d20 => {
            let ses3d = settings
                .ses3d
                .as_ref()
                .ok_or_else(|| missing_settings(family, "ses3d"))?;
            let event_tag = event.event_name.replace(' ', "_");
            let relaxation = family == SolverFamily::Ses3d41;
            SolverInputConfig::Ses3d(Ses3dInputConfig {
                event_tag: event.event_name.clone(),
                number_of_time_steps: simulation.number_of_time_steps,
                time_increment_in_s: simulation.time_increment,
                output_folder: ses3d.output_directory.replace("{{EVENT_NAME}}", &event_tag),
                simulation_type: simulation_type.as_str().to_string(),
                adjoint_forward_wavefield_output_folder: ses3d
                    .forward_field_output_directory
                    .replace("{{EVENT_NAME}}", &event_tag),
                adjoint_forward_sampling_rate: ses3d.sampling_rate_of_forward_field,
                is_dissipative: simulation.is_dissipative,
                q_model_relaxation_times: relaxation.then(|| ses3d.relaxation_times.clone()),
                q_model_weights_of_relaxation_mechanisms: relaxation
                    .then(|| ses3d.relaxation_weights.clone()),
                nx_global: ses3d.nx_global,
                ny_global: ses3d.ny_global,
                nz_global: ses3d.nz_global,
                px: ses3d.px_processors_in_theta_direction,
                py: ses3d.py_processors_in_phi_direction,
                pz: ses3d.pz_processors_in_r_direction,
                lagrange_polynomial_degree: ses3d.lagrange_polynomial_degree,
                mesh_min_latitude: domain.min_latitude,
                mesh_max_latitude: domain.max_latitude,
                mesh_min_longitude: domain.min_longitude,
                mesh_max_longitude: domain.max_longitude,
                mesh_min_depth_in_km: domain.min_depth_in_km,
                mesh_max_depth_in_km: domain.max_depth_in_km,
                rotation_angle_in_degree: domain.rotation_angle_in_degree,
                rotation_axis: domain.rotation_axis,
            })
        }
        SolverFamily::Specfem3dCartesian => {
            let cartesian = settings
                .specfem_cartesian
                .ok_or_else(|| missing_settings(family, "specfem_cartesian"))?;
            let simulation_type = match simulation_type {
                SimulationType::NormalSimulation => {
                    return Err(LasifError::not_implemented(
                        "RUN.SIMULATION_TYPE",
                        "'normal_simulate' not supported for SPECFEM3D Cartesian. Please choose \
                         either 'adjoint_forward' or 'adjoint_reverse'.",
                    ));
                }
                SimulationType::AdjointForward => 1,
                SimulationType::AdjointReverse => 2,
            };
            SolverInputConfig::SpecfemCartesian(SpecfemCartesianInputConfig {
                nstep: simulation.number_of_time_steps,
                dt: simulation.time_increment,
                nproc: cartesian.number_of_processors,
                simulation_type,
            })
        }
        SolverFamily::Specfem3dGlobeCem => {
            let globe = settings
                .specfem_globe
                .as_ref()
                .ok_or_else(|| missing_settings(family, "specfem_globe"))?;
            let (simulation_type, save_forward) = match simulation_type {
                SimulationType::NormalSimulation => (1, false),
                SimulationType::AdjointForward => (1, true),
                SimulationType::AdjointReverse => (2, true),
            };
            let chunk = specfem_globe_domain(domain)?;
            SolverInputConfig::SpecfemGlobe(SpecfemGlobeInputConfig {
                nproc_xi: globe.number_of_processors_xi,
                nproc_eta: globe.number_of_processors_eta,
                nchunks: globe.number_of_chunks,
                nex_xi: globe.elements_per_chunk_xi,
                nex_eta: globe.elements_per_chunk_eta,
                oceans: globe.simulate_oceans,
                ellipticity: globe.simulate_ellipticity,
                topography: globe.simulate_topography,
                gravity: globe.simulate_gravity,
                rotation: globe.simulate_rotation,
                attenuation: globe.simulate_attenuation,
                absorbing_conditions: true,
                partial_phys_dispersion_only: globe.fast_undo_attenuation,
                undo_attenuation: !globe.fast_undo_attenuation,
                gpu_mode: globe.use_gpu,
                simulation_type,
                save_forward,
                angular_width_xi_in_degrees: chunk.angular_width_xi_in_degrees,
                angular_width_eta_in_degrees: chunk.angular_width_eta_in_degrees,
                center_latitude_in_degrees: chunk.center_latitude_in_degrees,
                center_longitude_in_degrees: chunk.center_longitude_in_degrees,
                gamma_rotation_azimuth: chunk.gamma_rotation_azimuth,
                model: globe.model.clone(),
                record_length_in_minutes: iteration.process_params.record_length_in_minutes(),
            })
        }
    };

    let stations = stations
        .iter()
        .filter(|(id, _)| iteration_event.stations.contains_key(*id))
        .map(|(id, coordinates)| InputStation {
            id: id.clone(),
            latitude: coordinates.latitude,
            longitude: coordinates.longitude,
            elevation_in_m: coordinates.elevation_in_m,
            local_depth_in_m: coordinates.local_depth_in_m,
        })
        .collect();

    Ok(SolverInput {
        solver_format: solver_format(family).to_string(),
        simulation_type: simulation_type.as_str().to_string(),
        event: event.clone(),
        stations,
        config,
    })
}

impl Actions<'_> {
    /// Writes the solver input files of one event into
    /// `<output>/input_files/ITERATION_<it>__<simulation type>__EVENT_<event>`.
    pub fn generate_input_files(
        &self,
        iteration: &Iteration,
        event_name: &str,
        simulation_type: SimulationType,
        writer: &dyn InputFileWriter,
    ) -> LasifResult<Vec<PathBuf>> {
        iteration.event(event_name)?;
        let event = self.events.event(event_name)?;
        let stations = self.stations.stations_for_event(event_name)?;
        let input = build_solver_input(
            iteration,
            &event,
            &stations,
            &self.config.domain,
            simulation_type,
        )?;

        let output_dir = self.config.output_folder(
            "input_files",
            &format!(
                "ITERATION_{}__{}__EVENT_{}",
                iteration.name,
                simulation_type.tag(),
                event_name
            ),
        )?;
        let written = writer.write(&input, &output_dir)?;
        info!("Written files to '{}'.", output_dir.display());
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::{SolverInputConfig, build_solver_input};
    use crate::domain::{
        Domain, Event, Iteration, IterationEvent, IterationStation, LasifErrorCategory,
        ProcessParams, SimulationType, SolverSettings, StationCoordinates,
    };
    use crate::domain::iteration::{
        Ses3dSettings, SimulationParameters, SpecfemCartesianSettings, SpecfemGlobeSettings,
    };
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    fn event() -> Event {
        Event {
            event_name: "GCMT event 2011".to_string(),
            origin_time: Utc.with_ymd_and_hms(2011, 5, 19, 20, 15, 22).unwrap(),
            latitude: 39.15,
            longitude: 29.1,
            depth_in_km: 7.0,
            magnitude: 5.9,
            magnitude_type: "Mwc".to_string(),
            moment_tensor: Default::default(),
        }
    }

    fn domain() -> Domain {
        Domain {
            min_latitude: -10.0,
            max_latitude: 10.0,
            min_longitude: -10.0,
            max_longitude: 10.0,
            min_depth_in_km: 0.0,
            max_depth_in_km: 500.0,
            rotation_axis: [0.0, 0.0, 1.0],
            rotation_angle_in_degree: 0.0,
        }
    }

    fn iteration(solver: &str) -> Iteration {
        let mut stations = BTreeMap::new();
        stations.insert("IU.ANMO".to_string(), IterationStation::default());
        let mut events = BTreeMap::new();
        events.insert(
            "GCMT event 2011".to_string(),
            IterationEvent {
                event_weight: 1.0,
                stations,
            },
        );
        Iteration {
            name: "1".to_string(),
            description: String::new(),
            process_params: ProcessParams {
                highpass: 0.01,
                lowpass: 0.025,
                npts: 2000,
                dt: 0.75,
            },
            solver_settings: SolverSettings {
                solver: solver.to_string(),
                adjoint_source_time_shift: None,
                simulation_parameters: SimulationParameters {
                    number_of_time_steps: 2000,
                    time_increment: 0.75,
                    is_dissipative: true,
                },
                ses3d: Some(Ses3dSettings {
                    output_directory: "../OUTPUT/{{EVENT_NAME}}".to_string(),
                    forward_field_output_directory: "../fwd/{{EVENT_NAME}}".to_string(),
                    sampling_rate_of_forward_field: 10,
                    relaxation_times: vec![1.7, 14.1, 100.0],
                    relaxation_weights: vec![2.5, 2.4, 2.6],
                    nx_global: 15,
                    ny_global: 15,
                    nz_global: 10,
                    px_processors_in_theta_direction: 1,
                    py_processors_in_phi_direction: 1,
                    pz_processors_in_r_direction: 1,
                    lagrange_polynomial_degree: 4,
                }),
                specfem_cartesian: Some(SpecfemCartesianSettings {
                    number_of_processors: 4,
                }),
                specfem_globe: Some(SpecfemGlobeSettings {
                    number_of_processors_xi: 5,
                    number_of_processors_eta: 5,
                    number_of_chunks: 1,
                    elements_per_chunk_xi: 240,
                    elements_per_chunk_eta: 240,
                    model: "CEM_ACCEPT".to_string(),
                    simulate_oceans: true,
                    simulate_ellipticity: true,
                    simulate_topography: true,
                    simulate_gravity: true,
                    simulate_rotation: true,
                    simulate_attenuation: true,
                    fast_undo_attenuation: false,
                    use_gpu: false,
                }),
            },
            events,
        }
    }

    fn stations() -> BTreeMap<String, StationCoordinates> {
        let coordinates = StationCoordinates {
            latitude: 34.9,
            longitude: -106.4,
            elevation_in_m: 1850.0,
            local_depth_in_m: 100.0,
        };
        let mut stations = BTreeMap::new();
        stations.insert("IU.ANMO".to_string(), coordinates);
        stations.insert("GE.DAG".to_string(), coordinates);
        stations
    }

    #[test]
    fn ses3d_input_substitutes_event_name_into_folders() {
        let input = build_solver_input(
            &iteration("SES3D 4.1"),
            &event(),
            &stations(),
            &domain(),
            SimulationType::AdjointForward,
        )
        .expect("ses3d input should build");

        assert_eq!(input.solver_format, "ses3d_4_1");
        assert_eq!(input.simulation_type, "adjoint forward");
        assert_eq!(input.stations.len(), 1);
        assert_eq!(input.stations[0].id, "IU.ANMO");
        let SolverInputConfig::Ses3d(config) = input.config else {
            panic!("expected a ses3d configuration");
        };
        assert_eq!(config.output_folder, "../OUTPUT/GCMT_event_2011");
        assert_eq!(config.adjoint_forward_wavefield_output_folder, "../fwd/GCMT_event_2011");
        assert_eq!(config.q_model_relaxation_times, Some(vec![1.7, 14.1, 100.0]));
        assert_eq!(config.mesh_max_depth_in_km, 500.0);
    }

    #[test]
    fn ses3d_2_0_input_has_no_relaxation_mechanisms() {
        let input = build_solver_input(
            &iteration("SES3D 2.0"),
            &event(),
            &stations(),
            &domain(),
            SimulationType::NormalSimulation,
        )
        .expect("ses3d input should build");

        let SolverInputConfig::Ses3d(config) = input.config else {
            panic!("expected a ses3d configuration");
        };
        assert_eq!(config.q_model_relaxation_times, None);
        assert_eq!(config.q_model_weights_of_relaxation_mechanisms, None);
    }

    #[test]
    fn specfem_cartesian_rejects_normal_simulations() {
        let error = build_solver_input(
            &iteration("SPECFEM3D CARTESIAN"),
            &event(),
            &stations(),
            &domain(),
            SimulationType::NormalSimulation,
        )
        .expect_err("normal simulation should be rejected");
        assert_eq!(error.category(), LasifErrorCategory::NotImplemented);

        let input = build_solver_input(
            &iteration("SPECFEM3D CARTESIAN"),
            &event(),
            &stations(),
            &domain(),
            SimulationType::AdjointReverse,
        )
        .expect("adjoint reverse should build");
        let SolverInputConfig::SpecfemCartesian(config) = input.config else {
            panic!("expected a cartesian configuration");
        };
        assert_eq!(config.simulation_type, 2);
        assert_eq!(config.nproc, 4);
    }

    #[test]
    fn specfem_globe_input_describes_the_chunk() {
        let input = build_solver_input(
            &iteration("SPECFEM3D GLOBE CEM"),
            &event(),
            &stations(),
            &domain(),
            SimulationType::AdjointForward,
        )
        .expect("globe input should build");

        let SolverInputConfig::SpecfemGlobe(config) = input.config else {
            panic!("expected a globe configuration");
        };
        assert_eq!((config.simulation_type, config.save_forward), (1, true));
        assert!(config.absorbing_conditions);
        assert!(config.undo_attenuation);
        assert!(!config.partial_phys_dispersion_only);
        assert!((config.angular_width_xi_in_degrees - 20.0).abs() < 1e-9);
        assert!(config.center_latitude_in_degrees.abs() < 1e-9);
        assert!((config.record_length_in_minutes - 25.0).abs() < 1e-12);
    }

    #[test]
    fn missing_solver_block_is_a_configuration_error() {
        let mut iteration = iteration("SES3D 4.1");
        iteration.solver_settings.ses3d = None;

        let error = build_solver_input(
            &iteration,
            &event(),
            &stations(),
            &domain(),
            SimulationType::AdjointForward,
        )
        .expect_err("missing block should fail");
        assert_eq!(error.code(), "CONFIG.SOLVER_SETTINGS");
    }

    #[test]
    fn events_outside_the_iteration_are_not_found() {
        let mut other = event();
        other.event_name = "unknown".to_string();

        let error = build_solver_input(
            &iteration("SES3D 4.1"),
            &other,
            &stations(),
            &domain(),
            SimulationType::AdjointForward,
        )
        .expect_err("event is not part of the iteration");
        assert_eq!(error.category(), LasifErrorCategory::NotFound);
    }
}
