//! Collaborators that supply events, station metadata, and waveforms to the
//! workflow actions.

mod archive;
mod travel_times;

pub use archive::{JsonProjectArchive, WaveformKind};
pub use travel_times::TravelTimeTable;

use crate::domain::{ChannelId, Event, Iteration, LasifResult, MatchedWaveforms, StationCoordinates};
use std::collections::BTreeMap;
use std::path::PathBuf;

pub trait EventCatalog: Send + Sync {
    fn event(&self, event_name: &str) -> LasifResult<Event>;
    fn event_names(&self) -> LasifResult<Vec<String>>;
}

pub trait StationCatalog: Send + Sync {
    /// Coordinates of every station available for `event_name`, keyed by
    /// `NET.STA`.
    fn stations_for_event(&self, event_name: &str)
    -> LasifResult<BTreeMap<String, StationCoordinates>>;
}

pub trait WaveformArchive: Send + Sync {
    /// Channels of the unprocessed recordings of `event_name`.
    fn raw_channels(&self, event_name: &str) -> LasifResult<Vec<ChannelId>>;

    /// Channels processed under `processing_tag`.
    fn processed_channels(&self, event_name: &str, processing_tag: &str) -> LasifResult<Vec<ChannelId>>;

    fn has_processed(&self, event_name: &str, processing_tag: &str, channel_id: &ChannelId)
    -> bool;

    fn has_synthetic(&self, event_name: &str, iteration_name: &str, channel_id: &ChannelId) -> bool;

    /// Folder receiving the source time functions estimated for one event
    /// and iteration.
    fn stf_folder(&self, event_name: &str, iteration_name: &str) -> PathBuf;

    /// Processed observations and synthetics of one station, with the
    /// station's coordinates.
    fn matching_waveforms(
        &self,
        event: &Event,
        iteration: &Iteration,
        station: &str,
    ) -> LasifResult<MatchedWaveforms>;
}

/// Travel times through a 1-D Earth model.
pub trait TravelTimeModel: Send + Sync {
    /// Seconds after origin of the first `P` arrival, if the phase exists at
    /// this distance.
    fn first_p_arrival(&self, source_depth_in_km: f64, distance_in_degree: f64) -> Option<f64>;

    /// First arrival of `phase`. Models that only know `P` answer nothing
    /// for other phases.
    fn first_arrival(
        &self,
        phase: &str,
        source_depth_in_km: f64,
        distance_in_degree: f64,
    ) -> Option<f64> {
        if phase == "P" {
            self.first_p_arrival(source_depth_in_km, distance_in_degree)
        } else {
            None
        }
    }
}
