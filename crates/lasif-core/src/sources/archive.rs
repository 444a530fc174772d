use super::{EventCatalog, StationCatalog, WaveformArchive};
use crate::domain::project::{ensure_directory, read_json_file};
use crate::domain::{
    ChannelId, Event, Iteration, LasifError, LasifResult, MatchedWaveforms, ProjectPaths,
    StationCoordinates, Trace,
};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaveformKind {
    Raw,
    /// Keyed by the iteration's processing tag.
    Processed(String),
    /// Keyed by the iteration name.
    Synthetic(String),
    /// Estimated source time functions, keyed by the iteration name.
    Stf(String),
}

impl WaveformKind {
    fn folder_name(&self) -> String {
        match self {
            Self::Raw => "raw".to_string(),
            Self::Processed(tag) => tag.clone(),
            Self::Synthetic(iteration) => format!("synthetics/ITERATION_{}", iteration),
            Self::Stf(iteration) => format!("stf/ITERATION_{}", iteration),
        }
    }
}

/// Project directory laid out as JSON documents:
///
/// ```text
/// EVENTS/<event>.json
/// ITERATIONS/ITERATION_<name>.json
/// STATIONS/<event>.json
/// <waveforms>/<event>/raw/<channel>.json
/// <waveforms>/<event>/<processing tag>/<channel>.json
/// <waveforms>/<event>/synthetics/ITERATION_<name>/<channel>.json
/// <waveforms>/<event>/stf/ITERATION_<name>/
/// ```
#[derive(Debug, Clone)]
pub struct JsonProjectArchive {
    root: PathBuf,
    waveforms: PathBuf,
}

impl JsonProjectArchive {
    pub fn new(paths: &ProjectPaths) -> Self {
        Self {
            root: paths.root.clone(),
            waveforms: paths.waveforms.clone(),
        }
    }

    pub fn load_iteration(&self, iteration_name: &str) -> LasifResult<Iteration> {
        let path = self
            .root
            .join("ITERATIONS")
            .join(format!("ITERATION_{}.json", iteration_name));
        read_json_file(&path, "DATA.ITERATION")
    }

    pub fn waveform_folder(&self, event_name: &str, kind: &WaveformKind) -> PathBuf {
        self.waveforms.join(event_name).join(kind.folder_name())
    }

    pub fn store_trace(&self, event_name: &str, kind: &WaveformKind, trace: &Trace) -> LasifResult<PathBuf> {
        let folder = self.waveform_folder(event_name, kind);
        ensure_directory(&folder, "IO.WAVEFORM_FOLDER")?;
        let path = folder.join(format!("{}.json", trace.channel_id));
        let payload = serde_json::to_string(trace).map_err(|source| {
            LasifError::internal(
                "RUN.WAVEFORM_SERIALIZE",
                format!("failed to serialize {}: {}", trace.channel_id, source),
            )
        })?;
        fs::write(&path, payload).map_err(|source| {
            LasifError::io_system(
                "IO.WAVEFORM_WRITE",
                format!("failed to write '{}': {}", path.display(), source),
            )
        })?;
        Ok(path)
    }

    fn channels_in(&self, folder: &Path) -> LasifResult<Vec<ChannelId>> {
        let entries = fs::read_dir(folder).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                LasifError::not_found(
                    "DATA.WAVEFORMS",
                    format!("no waveforms in '{}'", folder.display()),
                )
            } else {
                LasifError::io_system(
                    "IO.WAVEFORM_FOLDER",
                    format!("failed to list '{}': {}", folder.display(), source),
                )
            }
        })?;

        let mut channels = Vec::new();
        for entry in entries.flatten() {
            let file_name = entry.file_name();
            if let Some(stem) = file_name.to_str().and_then(|name| name.strip_suffix(".json")) {
                channels.push(ChannelId::parse(stem)?);
            }
        }
        channels.sort();
        Ok(channels)
    }

    fn station_traces(&self, folder: &Path, station: &str) -> LasifResult<Vec<Trace>> {
        self.channels_in(folder)?
            .into_iter()
            .filter(|channel_id| channel_id.station() == station)
            .map(|channel_id| {
                read_json_file(&folder.join(format!("{}.json", channel_id)), "DATA.TRACE")
            })
            .collect()
    }
}

impl EventCatalog for JsonProjectArchive {
    fn event(&self, event_name: &str) -> LasifResult<Event> {
        let path = self.root.join("EVENTS").join(format!("{}.json", event_name));
        if !path.is_file() {
            return Err(LasifError::not_found(
                "DATA.EVENT",
                format!("Event '{}' not known to the project.", event_name),
            ));
        }
        read_json_file(&path, "DATA.EVENT")
    }

    fn event_names(&self) -> LasifResult<Vec<String>> {
        let folder = self.root.join("EVENTS");
        let entries = match fs::read_dir(&folder) {
            Ok(entries) => entries,
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(LasifError::io_system(
                    "IO.EVENT_FOLDER",
                    format!("failed to list '{}': {}", folder.display(), source),
                ));
            }
        };
        let mut names: Vec<String> = entries
            .flatten()
            .filter_map(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .and_then(|name| name.strip_suffix(".json"))
                    .map(str::to_string)
            })
            .collect();
        names.sort();
        Ok(names)
    }
}

impl StationCatalog for JsonProjectArchive {
    fn stations_for_event(
        &self,
        event_name: &str,
    ) -> LasifResult<BTreeMap<String, StationCoordinates>> {
        let path = self.root.join("STATIONS").join(format!("{}.json", event_name));
        read_json_file(&path, "DATA.STATIONS")
    }
}

impl WaveformArchive for JsonProjectArchive {
    fn raw_channels(&self, event_name: &str) -> LasifResult<Vec<ChannelId>> {
        self.channels_in(&self.waveform_folder(event_name, &WaveformKind::Raw))
    }

    fn processed_channels(&self, event_name: &str, processing_tag: &str) -> LasifResult<Vec<ChannelId>> {
        self.channels_in(
            &self.waveform_folder(event_name, &WaveformKind::Processed(processing_tag.to_string())),
        )
    }

    fn has_processed(&self, event_name: &str, processing_tag: &str, channel_id: &ChannelId) -> bool {
        self.waveform_folder(event_name, &WaveformKind::Processed(processing_tag.to_string()))
            .join(format!("{}.json", channel_id))
            .is_file()
    }

    fn has_synthetic(&self, event_name: &str, iteration_name: &str, channel_id: &ChannelId) -> bool {
        self.waveform_folder(event_name, &WaveformKind::Synthetic(iteration_name.to_string()))
            .join(format!("{}.json", channel_id))
            .is_file()
    }

    fn stf_folder(&self, event_name: &str, iteration_name: &str) -> PathBuf {
        self.waveform_folder(event_name, &WaveformKind::Stf(iteration_name.to_string()))
    }

    fn matching_waveforms(
        &self,
        event: &Event,
        iteration: &Iteration,
        station: &str,
    ) -> LasifResult<MatchedWaveforms> {
        let coordinates = self
            .stations_for_event(&event.event_name)?
            .get(station)
            .copied()
            .ok_or_else(|| {
                LasifError::not_found(
                    "DATA.STATION_COORDINATES",
                    format!(
                        "No coordinates found for station '{}' and event '{}'.",
                        station, event.event_name
                    ),
                )
            })?;

        let processed = WaveformKind::Processed(iteration.processing_tag());
        let synthetic = WaveformKind::Synthetic(iteration.name.clone());
        let data = self.station_traces(&self.waveform_folder(&event.event_name, &processed), station)?;
        let synthetics =
            self.station_traces(&self.waveform_folder(&event.event_name, &synthetic), station)?;

        if data.is_empty() || synthetics.is_empty() {
            return Err(LasifError::not_found(
                "DATA.WAVEFORMS",
                format!(
                    "No matching data found for event '{}', iteration '{}', and station '{}'.",
                    event.event_name, iteration.name, station
                ),
            ));
        }

        Ok(MatchedWaveforms {
            data,
            synthetics,
            coordinates,
        })
    }
}
