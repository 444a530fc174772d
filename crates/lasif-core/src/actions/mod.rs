//! Workflow steps of an inversion iteration: preprocessing, source wavelet
//! estimation, window selection, adjoint source computation and
//! finalization, and solver input generation.
//!
//! Every step takes its pluggable behavior (preprocessing, deconvolution,
//! window picking, adjoint computation, input-file writing) as an explicit
//! strategy argument.

mod adjoint;
mod input_files;
mod preprocess;
mod stf;
mod windows;

pub use adjoint::FinalizeReport;
pub use input_files::{
    INPUT_FILE_NAME, InputFileWriter, InputStation, JsonInputFileWriter, Ses3dInputConfig,
    SolverInput, SolverInputConfig, SpecfemCartesianInputConfig, SpecfemGlobeInputConfig,
    build_solver_input,
};
pub use preprocess::{PreprocessingJob, Preprocessor, components_to_process, complete_components};
pub use stf::{StfChannelJob, StfDeconvolver, StfReport, SyntheticsGenerator};
pub use windows::{PickRequest, PickerOptions, WindowPicker};

use crate::domain::{ChannelId, LasifResult, ProjectConfig};
use crate::scheduler::TaskScheduler;
use crate::sources::{EventCatalog, StationCatalog, WaveformArchive};
use crate::windows::WindowGroupManager;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Project state and collaborators shared by all workflow steps.
pub struct Actions<'a> {
    config: &'a ProjectConfig,
    events: &'a dyn EventCatalog,
    stations: &'a dyn StationCatalog,
    waveforms: &'a dyn WaveformArchive,
    scheduler: TaskScheduler,
    window_managers: Mutex<BTreeMap<(String, String), Arc<WindowGroupManager>>>,
}

impl<'a> Actions<'a> {
    pub fn new(
        config: &'a ProjectConfig,
        events: &'a dyn EventCatalog,
        stations: &'a dyn StationCatalog,
        waveforms: &'a dyn WaveformArchive,
    ) -> LasifResult<Self> {
        Ok(Self {
            config,
            events,
            stations,
            waveforms,
            scheduler: TaskScheduler::from_config(config)?,
            window_managers: Mutex::new(BTreeMap::new()),
        })
    }

    pub fn with_scheduler(mut self, scheduler: TaskScheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn config(&self) -> &ProjectConfig {
        self.config
    }

    /// Window store of one event and iteration. The same manager, and with
    /// it the adjoint source cache, is shared by every step of this instance.
    pub fn window_manager(&self, event_name: &str, iteration_name: &str) -> Arc<WindowGroupManager> {
        let mut managers = self
            .window_managers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        managers
            .entry((event_name.to_string(), iteration_name.to_string()))
            .or_insert_with(|| {
                Arc::new(WindowGroupManager::new(
                    &self.config.paths.windows,
                    event_name,
                    iteration_name,
                ))
            })
            .clone()
    }
}

/// Groups sorted channel ids by their `NET.STA` station.
fn channels_by_station(channels: Vec<ChannelId>) -> BTreeMap<String, Vec<ChannelId>> {
    let mut grouped: BTreeMap<String, Vec<ChannelId>> = BTreeMap::new();
    for channel_id in channels {
        grouped.entry(channel_id.station()).or_default().push(channel_id);
    }
    for channels in grouped.values_mut() {
        channels.sort();
    }
    grouped
}
