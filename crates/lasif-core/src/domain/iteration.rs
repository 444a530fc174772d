use super::{LasifError, LasifResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Iteration {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub process_params: ProcessParams,
    pub solver_settings: SolverSettings,
    #[serde(default)]
    pub events: BTreeMap<String, IterationEvent>,
}

impl Iteration {
    pub fn processing_tag(&self) -> String {
        self.process_params.processing_tag()
    }

    pub fn minimum_period(&self) -> f64 {
        1.0 / self.process_params.lowpass
    }

    pub fn maximum_period(&self) -> f64 {
        1.0 / self.process_params.highpass
    }

    pub fn event(&self, event_name: &str) -> LasifResult<&IterationEvent> {
        self.events.get(event_name).ok_or_else(|| {
            let available = self
                .events
                .keys()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join("\n\t");
            LasifError::not_found(
                "DATA.ITERATION_EVENT",
                format!(
                    "Event '{}' not part of iteration '{}'.\nEvents available in iteration:\n\t{}",
                    event_name, self.name, available
                ),
            )
        })
    }

    pub fn solver_family(&self) -> LasifResult<SolverFamily> {
        SolverFamily::from_name(&self.solver_settings.solver)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationEvent {
    #[serde(default = "unit_weight")]
    pub event_weight: f64,
    #[serde(default)]
    pub stations: BTreeMap<String, IterationStation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IterationStation {
    #[serde(default = "unit_weight")]
    pub station_weight: f64,
}

impl Default for IterationStation {
    fn default() -> Self {
        Self { station_weight: 1.0 }
    }
}

fn unit_weight() -> f64 {
    1.0
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProcessParams {
    pub highpass: f64,
    pub lowpass: f64,
    pub npts: usize,
    pub dt: f64,
}

impl ProcessParams {
    pub fn processing_tag(&self) -> String {
        format!(
            "preprocessed_hp_{:.5}_lp_{:.5}_npts_{}_dt_{:.6}",
            self.highpass, self.lowpass, self.npts, self.dt
        )
    }

    pub fn record_length_in_minutes(&self) -> f64 {
        self.npts as f64 * self.dt / 60.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverSettings {
    pub solver: String,
    #[serde(default)]
    pub adjoint_source_time_shift: Option<f64>,
    pub simulation_parameters: SimulationParameters,
    #[serde(default)]
    pub ses3d: Option<Ses3dSettings>,
    #[serde(default)]
    pub specfem_cartesian: Option<SpecfemCartesianSettings>,
    #[serde(default)]
    pub specfem_globe: Option<SpecfemGlobeSettings>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationParameters {
    pub number_of_time_steps: usize,
    pub time_increment: f64,
    #[serde(default)]
    pub is_dissipative: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ses3dSettings {
    pub output_directory: String,
    pub forward_field_output_directory: String,
    pub sampling_rate_of_forward_field: usize,
    #[serde(default)]
    pub relaxation_times: Vec<f64>,
    #[serde(default)]
    pub relaxation_weights: Vec<f64>,
    pub nx_global: usize,
    pub ny_global: usize,
    pub nz_global: usize,
    pub px_processors_in_theta_direction: usize,
    pub py_processors_in_phi_direction: usize,
    pub pz_processors_in_r_direction: usize,
    pub lagrange_polynomial_degree: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpecfemCartesianSettings {
    pub number_of_processors: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecfemGlobeSettings {
    pub number_of_processors_xi: usize,
    pub number_of_processors_eta: usize,
    pub number_of_chunks: usize,
    pub elements_per_chunk_xi: usize,
    pub elements_per_chunk_eta: usize,
    pub model: String,
    #[serde(default)]
    pub simulate_oceans: bool,
    #[serde(default)]
    pub simulate_ellipticity: bool,
    #[serde(default)]
    pub simulate_topography: bool,
    #[serde(default)]
    pub simulate_gravity: bool,
    #[serde(default)]
    pub simulate_rotation: bool,
    #[serde(default)]
    pub simulate_attenuation: bool,
    #[serde(default)]
    pub fast_undo_attenuation: bool,
    #[serde(default)]
    pub use_gpu: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SolverFamily {
    Ses3d41,
    Ses3d20,
    Specfem3dCartesian,
    Specfem3dGlobeCem,
}

impl SolverFamily {
    pub fn from_name(name: &str) -> LasifResult<Self> {
        let normalized = name
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_ascii_lowercase();
        match normalized.as_str() {
            "ses3d 4.1" => Ok(Self::Ses3d41),
            "ses3d 2.0" => Ok(Self::Ses3d20),
            "specfem3d cartesian" => Ok(Self::Specfem3dCartesian),
            "specfem3d globe cem" => Ok(Self::Specfem3dGlobeCem),
            _ => Err(LasifError::not_implemented(
                "RUN.SOLVER_FAMILY",
                format!(
                    "Unknown solver '{}'. Currently only SES3D 4.1, SES3D 2.0, SPECFEM3D \
                     CARTESIAN, and SPECFEM3D GLOBE CEM are supported.",
                    name
                ),
            )),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ses3d41 => "SES3D 4.1",
            Self::Ses3d20 => "SES3D 2.0",
            Self::Specfem3dCartesian => "SPECFEM3D CARTESIAN",
            Self::Specfem3dGlobeCem => "SPECFEM3D GLOBE CEM",
        }
    }
}

impl Display for SolverFamily {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimulationType {
    NormalSimulation,
    AdjointForward,
    AdjointReverse,
}

impl SimulationType {
    pub fn parse(value: &str) -> LasifResult<Self> {
        match value.trim().replace('_', " ").to_ascii_lowercase().as_str() {
            "normal simulation" => Ok(Self::NormalSimulation),
            "adjoint forward" => Ok(Self::AdjointForward),
            "adjoint reverse" => Ok(Self::AdjointReverse),
            _ => Err(LasifError::configuration(
                "CONFIG.SIMULATION_TYPE",
                format!(
                    "Unknown simulation type '{}'. Possible values are: 'normal simulation', \
                     'adjoint forward', 'adjoint reverse'",
                    value
                ),
            )),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NormalSimulation => "normal simulation",
            Self::AdjointForward => "adjoint forward",
            Self::AdjointReverse => "adjoint reverse",
        }
    }

    pub fn tag(self) -> String {
        self.as_str().replace(' ', "_")
    }
}

#[cfg(test)]
mod tests {
    use super::{ProcessParams, SimulationType, SolverFamily};
    use crate::domain::LasifErrorCategory;

    #[test]
    fn solver_family_is_selected_by_explicit_name() {
        assert_eq!(
            SolverFamily::from_name("SES3D 4.1").expect("known solver"),
            SolverFamily::Ses3d41
        );
        assert_eq!(
            SolverFamily::from_name("  specfem3d   globe CEM ").expect("known solver"),
            SolverFamily::Specfem3dGlobeCem
        );
    }

    #[test]
    fn substring_matches_are_not_solver_families() {
        for name in ["ses3d", "specfem", "my ses3d 4.1 fork", "axisem"] {
            let error = SolverFamily::from_name(name).expect_err("ambiguous name should fail");
            assert_eq!(error.category(), LasifErrorCategory::NotImplemented);
        }
    }

    #[test]
    fn processing_tag_encodes_all_parameters() {
        let params = ProcessParams {
            highpass: 0.01,
            lowpass: 0.025,
            npts: 2000,
            dt: 0.75,
        };
        assert_eq!(
            params.processing_tag(),
            "preprocessed_hp_0.01000_lp_0.02500_npts_2000_dt_0.750000"
        );
        assert!((params.record_length_in_minutes() - 25.0).abs() < 1e-12);
    }

    #[test]
    fn simulation_types_accept_spaces_or_underscores() {
        assert_eq!(
            SimulationType::parse("adjoint_forward").expect("valid"),
            SimulationType::AdjointForward
        );
        assert_eq!(SimulationType::AdjointReverse.tag(), "adjoint_reverse");
        assert!(SimulationType::parse("forward").is_err());
    }
}
