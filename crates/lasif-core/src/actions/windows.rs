use super::Actions;
use crate::domain::{
    Component, Event, Iteration, LasifError, LasifResult, Trace, select_component,
};
use crate::scheduler::DistributionReport;
use crate::windows::{WindowGroup, WindowGroupManager};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Free-form options forwarded to the picker.
pub type PickerOptions = BTreeMap<String, Value>;

/// Inputs of one window-picking call for one component.
#[derive(Debug, Clone, Copy)]
pub struct PickRequest<'a> {
    pub observed: &'a Trace,
    pub synthetic: &'a Trace,
    pub event_latitude: f64,
    pub event_longitude: f64,
    pub event_depth_in_km: f64,
    pub station_latitude: f64,
    pub station_longitude: f64,
    pub minimum_period: f64,
    pub maximum_period: f64,
    pub iteration: &'a Iteration,
    pub options: &'a PickerOptions,
}

pub trait WindowPicker: Send + Sync {
    /// Returns the `(start, end)` pairs of the selected windows.
    fn pick(&self, request: &PickRequest<'_>) -> LasifResult<Vec<(DateTime<Utc>, DateTime<Utc>)>>;
}

impl Actions<'_> {
    /// Picks windows for every station of the event that has none yet.
    /// Stations that already carry windows are left untouched.
    pub fn select_windows(
        &self,
        event_name: &str,
        iteration: &Iteration,
        picker: &dyn WindowPicker,
    ) -> LasifResult<DistributionReport> {
        let event = self.events.event(event_name)?;
        let iteration_event = iteration.event(event_name)?;
        let manager = self.window_manager(event_name, &iteration.name);

        let picked = manager.stations_with_windows()?;
        let candidates: Vec<String> = iteration_event
            .stations
            .keys()
            .filter(|station| !picked.contains(*station))
            .cloned()
            .collect();
        info!(
            event = %event_name,
            iteration = %iteration.name,
            candidates = candidates.len(),
            already_picked = picked.len(),
            "selecting windows"
        );

        let options = PickerOptions::new();
        Ok(self.scheduler.distribute(
            "select_windows",
            candidates,
            |station| format!("{} -- {}", event_name, station),
            |station| {
                self.pick_station(&manager, &event, iteration, station, picker, &options)
                    .map(|_| ())
            },
            None,
        ))
    }

    /// Replaces all windows of `station` with freshly picked ones and returns
    /// the number of windows written.
    pub fn select_windows_for_station(
        &self,
        event_name: &str,
        iteration: &Iteration,
        station: &str,
        picker: &dyn WindowPicker,
        options: &PickerOptions,
    ) -> LasifResult<usize> {
        let event = self.events.event(event_name)?;
        let manager = self.window_manager(event_name, &iteration.name);
        self.pick_station(&manager, &event, iteration, station, picker, options)
    }

    fn pick_station(
        &self,
        manager: &WindowGroupManager,
        event: &Event,
        iteration: &Iteration,
        station: &str,
        picker: &dyn WindowPicker,
        options: &PickerOptions,
    ) -> LasifResult<usize> {
        let waveforms = self.waveforms.matching_waveforms(event, iteration, station)?;

        // Every component is picked before the station's windows change on disk.
        let mut found_something = false;
        let mut groups = Vec::new();
        for component in [Component::E, Component::N, Component::Z] {
            let (Ok(observed), Ok(synthetic)) = (
                select_component(&waveforms.data, component),
                select_component(&waveforms.synthetics, component),
            ) else {
                continue;
            };
            found_something = true;

            let windows = picker.pick(&PickRequest {
                observed,
                synthetic,
                event_latitude: event.latitude,
                event_longitude: event.longitude,
                event_depth_in_km: event.depth_in_km,
                station_latitude: waveforms.coordinates.latitude,
                station_longitude: waveforms.coordinates.longitude,
                minimum_period: iteration.minimum_period(),
                maximum_period: iteration.maximum_period(),
                iteration,
                options,
            })?;
            if windows.is_empty() {
                continue;
            }

            let mut group = WindowGroup::new(observed.channel_id.clone());
            for (starttime, endtime) in &windows {
                group.add_window(*starttime, *endtime, 1.0)?;
            }
            debug!(channel = %observed.channel_id, windows = windows.len(), "picked windows");
            groups.push(group);
        }

        if !found_something {
            return Err(LasifError::not_found(
                "DATA.MATCHING_WAVEFORMS",
                format!(
                    "No matching data found for event '{}', iteration '{}', and station '{}'.",
                    event.event_name, iteration.name, station
                ),
            ));
        }

        manager.delete_windows_for_station(station)?;
        let mut written = 0;
        for group in &groups {
            manager.write_group(group)?;
            written += group.len();
        }
        Ok(written)
    }
}
