use super::{AdjointSourceCalculator, Window, WindowGroup};
use crate::domain::project::{ensure_directory, read_json_file};
use crate::domain::{ChannelId, LasifError, LasifResult};
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

pub type AdjointSignal = Arc<[f64]>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct WindowKey {
    channel_id: ChannelId,
    starttime: DateTime<Utc>,
    endtime: DateTime<Utc>,
}

/// Persistent windows of one (event, iteration) pair, one JSON file per
/// channel, plus the memoized adjoint sources of those windows.
#[derive(Debug)]
pub struct WindowGroupManager {
    folder: PathBuf,
    event_name: String,
    iteration_name: String,
    cache: Mutex<HashMap<WindowKey, AdjointSignal>>,
}

impl WindowGroupManager {
    pub fn new(windows_root: &Path, event_name: &str, iteration_name: &str) -> Self {
        Self {
            folder: windows_root
                .join(event_name)
                .join(format!("ITERATION_{}", iteration_name)),
            event_name: event_name.to_string(),
            iteration_name: iteration_name.to_string(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn event_name(&self) -> &str {
        &self.event_name
    }

    pub fn iteration_name(&self) -> &str {
        &self.iteration_name
    }

    /// Sorted ids of all channels that have a window file.
    pub fn list(&self) -> LasifResult<Vec<ChannelId>> {
        let entries = match fs::read_dir(&self.folder) {
            Ok(entries) => entries,
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(LasifError::io_system(
                    "IO.WINDOW_FOLDER",
                    format!("failed to list '{}': {}", self.folder.display(), source),
                ));
            }
        };

        let mut channels = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| {
                LasifError::io_system(
                    "IO.WINDOW_FOLDER",
                    format!("failed to list '{}': {}", self.folder.display(), source),
                )
            })?;
            let file_name = entry.file_name();
            let Some(stem) = file_name.to_str().and_then(|name| name.strip_suffix(".json")) else {
                continue;
            };
            channels.push(ChannelId::parse(stem)?);
        }
        channels.sort();
        Ok(channels)
    }

    /// Windows of `channel_id`; an empty group when none were picked.
    pub fn get(&self, channel_id: &ChannelId) -> LasifResult<WindowGroup> {
        let path = self.channel_file(channel_id);
        if !path.is_file() {
            return Ok(WindowGroup::new(channel_id.clone()));
        }
        read_json_file(&path, "DATA.WINDOW_GROUP")
    }

    /// Persists `group`, replacing whatever was stored for its channel. An
    /// empty group removes the channel file.
    pub fn write_group(&self, group: &WindowGroup) -> LasifResult<()> {
        let path = self.channel_file(&group.channel_id);
        self.invalidate_station(&group.channel_id.station());

        if group.is_empty() {
            return remove_file_if_present(&path);
        }

        ensure_directory(&self.folder, "IO.WINDOW_FOLDER")?;
        let payload = serde_json::to_string_pretty(group).map_err(|source| {
            LasifError::internal(
                "RUN.WINDOW_SERIALIZE",
                format!("failed to serialize windows of {}: {}", group.channel_id, source),
            )
        })?;
        fs::write(&path, payload).map_err(|source| {
            LasifError::io_system(
                "IO.WINDOW_WRITE",
                format!("failed to write '{}': {}", path.display(), source),
            )
        })
    }

    /// Removes every window of the `NET.STA` station and returns how many
    /// channel files were deleted.
    pub fn delete_windows_for_station(&self, station: &str) -> LasifResult<usize> {
        self.invalidate_station(station);

        let mut deleted = 0;
        for channel_id in self.list()? {
            if channel_id.station() == station {
                remove_file_if_present(&self.channel_file(&channel_id))?;
                deleted += 1;
            }
        }
        if deleted > 0 {
            debug!(station, deleted, "deleted window files");
        }
        Ok(deleted)
    }

    pub fn stations_with_windows(&self) -> LasifResult<BTreeSet<String>> {
        Ok(self
            .list()?
            .iter()
            .map(ChannelId::station)
            .collect())
    }

    /// Adjoint source of `window`, computed at most once per window identity
    /// until the station's window set changes.
    pub fn get_or_compute_adjoint_source(
        &self,
        channel_id: &ChannelId,
        window: &Window,
        calculator: &dyn AdjointSourceCalculator,
    ) -> LasifResult<AdjointSignal> {
        let key = WindowKey {
            channel_id: channel_id.clone(),
            starttime: window.starttime(),
            endtime: window.endtime(),
        };
        if let Some(cached) = self.lock_cache().get(&key) {
            return Ok(Arc::clone(cached));
        }

        let signal: AdjointSignal = calculator.adjoint_source(channel_id, window)?.into();
        self.lock_cache().insert(key, Arc::clone(&signal));
        Ok(signal)
    }

    pub fn cached_adjoint_sources(&self) -> usize {
        self.lock_cache().len()
    }

    fn invalidate_station(&self, station: &str) {
        self.lock_cache()
            .retain(|key, _| key.channel_id.station() != station);
    }

    fn lock_cache(&self) -> MutexGuard<'_, HashMap<WindowKey, AdjointSignal>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn channel_file(&self, channel_id: &ChannelId) -> PathBuf {
        self.folder.join(format!("{}.json", channel_id))
    }
}

fn remove_file_if_present(path: &Path) -> LasifResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(source) if source.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(LasifError::io_system(
            "IO.WINDOW_DELETE",
            format!("failed to delete '{}': {}", path.display(), source),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::WindowGroupManager;
    use crate::domain::{ChannelId, LasifError, LasifResult};
    use crate::windows::{AdjointSourceCalculator, Window, WindowGroup};
    use chrono::{DateTime, TimeDelta, TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct CountingCalculator {
        calls: AtomicUsize,
    }

    impl AdjointSourceCalculator for CountingCalculator {
        fn adjoint_source(&self, _: &ChannelId, window: &Window) -> LasifResult<Vec<f64>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if window.weight() == 0.0 {
                return Err(LasifError::computation("RUN.MISFIT", "no usable signal"));
            }
            Ok(vec![window.weight(); 3])
        }
    }

    fn origin() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2010, 3, 24, 14, 11, 31).unwrap()
    }

    fn group(channel: &str, spans: &[(i64, i64)]) -> WindowGroup {
        let mut group = WindowGroup::new(ChannelId::parse(channel).expect("valid channel id"));
        for (start, end) in spans {
            group
                .add_window(
                    origin() + TimeDelta::seconds(*start),
                    origin() + TimeDelta::seconds(*end),
                    1.0,
                )
                .expect("valid window");
        }
        group
    }

    #[test]
    fn groups_persist_per_channel_and_list_sorted() {
        let temp = TempDir::new().expect("tempdir should be created");
        let manager = WindowGroupManager::new(temp.path(), "GCMT_event_TURKEY", "1");

        manager
            .write_group(&group("IU.ANMO.00.BHZ", &[(100, 200)]))
            .expect("write should succeed");
        manager
            .write_group(&group("BW.FURT..BHN", &[(50, 80), (90, 120)]))
            .expect("write should succeed");

        let listed = manager.list().expect("list should succeed");
        let names: Vec<String> = listed.iter().map(ToString::to_string).collect();
        assert_eq!(names, vec!["BW.FURT..BHN", "IU.ANMO.00.BHZ"]);
        assert!(manager.folder().ends_with("GCMT_event_TURKEY/ITERATION_1"));

        let loaded = manager.get(&listed[0]).expect("group should load");
        assert_eq!(loaded.len(), 2);
        assert_eq!(
            manager.stations_with_windows().expect("stations").len(),
            2
        );
    }

    #[test]
    fn missing_channel_yields_empty_group() {
        let temp = TempDir::new().expect("tempdir should be created");
        let manager = WindowGroupManager::new(temp.path(), "EV", "1");
        let channel = ChannelId::parse("IU.ANMO.00.BHZ").expect("valid id");

        assert!(manager.get(&channel).expect("get should succeed").is_empty());
        assert!(manager.list().expect("list should succeed").is_empty());
    }

    #[test]
    fn deleting_a_station_removes_all_of_its_channels() {
        let temp = TempDir::new().expect("tempdir should be created");
        let manager = WindowGroupManager::new(temp.path(), "EV", "1");
        for channel in ["IU.ANMO.00.BHZ", "IU.ANMO.00.BHN", "IU.COLA.00.BHZ"] {
            manager
                .write_group(&group(channel, &[(0, 10)]))
                .expect("write should succeed");
        }

        let deleted = manager
            .delete_windows_for_station("IU.ANMO")
            .expect("delete should succeed");
        assert_eq!(deleted, 2);
        let remaining: Vec<String> = manager
            .stations_with_windows()
            .expect("stations")
            .into_iter()
            .collect();
        assert_eq!(remaining, vec!["IU.COLA"]);
    }

    #[test]
    fn adjoint_sources_are_memoized_until_the_station_changes() {
        let temp = TempDir::new().expect("tempdir should be created");
        let manager = WindowGroupManager::new(temp.path(), "EV", "1");
        let calculator = CountingCalculator {
            calls: AtomicUsize::new(0),
        };
        let anmo = group("IU.ANMO.00.BHZ", &[(0, 10)]);
        let cola = group("IU.COLA.00.BHZ", &[(0, 10)]);

        for _ in 0..3 {
            manager
                .get_or_compute_adjoint_source(&anmo.channel_id, &anmo.windows[0], &calculator)
                .expect("computation should succeed");
        }
        manager
            .get_or_compute_adjoint_source(&cola.channel_id, &cola.windows[0], &calculator)
            .expect("computation should succeed");
        assert_eq!(calculator.calls.load(Ordering::SeqCst), 2);
        assert_eq!(manager.cached_adjoint_sources(), 2);

        manager.write_group(&anmo).expect("write should succeed");
        assert_eq!(manager.cached_adjoint_sources(), 1);

        let signal = manager
            .get_or_compute_adjoint_source(&anmo.channel_id, &anmo.windows[0], &calculator)
            .expect("computation should succeed");
        assert_eq!(&*signal, &[1.0, 1.0, 1.0]);
        assert_eq!(calculator.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn failed_computations_are_not_cached() {
        let temp = TempDir::new().expect("tempdir should be created");
        let manager = WindowGroupManager::new(temp.path(), "EV", "1");
        let calculator = CountingCalculator {
            calls: AtomicUsize::new(0),
        };
        let channel = ChannelId::parse("IU.ANMO.00.BHZ").expect("valid id");
        let window = Window::new(origin(), origin() + TimeDelta::seconds(5), 0.0)
            .expect("zero weight is allowed");

        for _ in 0..2 {
            assert!(
                manager
                    .get_or_compute_adjoint_source(&channel, &window, &calculator)
                    .is_err()
            );
        }
        assert_eq!(calculator.calls.load(Ordering::SeqCst), 2);
        assert_eq!(manager.cached_adjoint_sources(), 0);
    }
}
