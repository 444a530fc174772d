use super::{LasifError, LasifResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const PROJECT_CONFIG_FILE: &str = "lasif_config.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    #[serde(default)]
    pub paths: ProjectPaths,
    pub domain: Domain,
    #[serde(default)]
    pub location_policy: LocationPolicy,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

fn default_workers() -> usize {
    1
}

fn default_queue_depth() -> usize {
    64
}

impl ProjectConfig {
    /// Reads `lasif_config.json` from `root` and anchors all relative paths
    /// at `root`.
    pub fn load(root: impl AsRef<Path>) -> LasifResult<Self> {
        let root = root.as_ref();
        let mut config: Self = read_json_file(&root.join(PROJECT_CONFIG_FILE), "CONFIG.PROJECT")?;
        config.paths = config.paths.anchored_at(root);
        Ok(config)
    }

    /// Directory for outputs of `kind`, e.g. `adjoint_sources`, tagged by
    /// `tag`. Created when missing.
    pub fn output_folder(&self, kind: &str, tag: &str) -> LasifResult<PathBuf> {
        let folder = self.paths.output.join(kind).join(tag);
        ensure_directory(&folder, "IO.OUTPUT_FOLDER")?;
        Ok(folder)
    }

    pub fn log_file(&self, component: &str, description: &str) -> LasifResult<PathBuf> {
        let folder = self.paths.logs.join(component);
        ensure_directory(&folder, "IO.LOG_FOLDER")?;
        Ok(folder.join(format!("{}.log", description)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectPaths {
    #[serde(default)]
    pub root: PathBuf,
    #[serde(default = "default_output")]
    pub output: PathBuf,
    #[serde(default = "default_logs")]
    pub logs: PathBuf,
    #[serde(default = "default_windows")]
    pub windows: PathBuf,
    #[serde(default = "default_waveforms")]
    pub waveforms: PathBuf,
}

fn default_output() -> PathBuf {
    PathBuf::from("OUTPUT")
}

fn default_logs() -> PathBuf {
    PathBuf::from("LOGS")
}

fn default_windows() -> PathBuf {
    PathBuf::from("ADJOINT_SOURCES_AND_WINDOWS/WINDOWS")
}

fn default_waveforms() -> PathBuf {
    PathBuf::from("DATA")
}

impl Default for ProjectPaths {
    fn default() -> Self {
        Self {
            root: PathBuf::new(),
            output: default_output(),
            logs: default_logs(),
            windows: default_windows(),
            waveforms: default_waveforms(),
        }
    }
}

impl ProjectPaths {
    pub fn under(root: impl AsRef<Path>) -> Self {
        Self::default().anchored_at(root.as_ref())
    }

    fn anchored_at(self, root: &Path) -> Self {
        let anchor = |path: PathBuf| {
            if path.is_absolute() {
                path
            } else {
                root.join(path)
            }
        };
        Self {
            root: root.to_path_buf(),
            output: anchor(self.output),
            logs: anchor(self.logs),
            windows: anchor(self.windows),
            waveforms: anchor(self.waveforms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    pub min_latitude: f64,
    pub max_latitude: f64,
    pub min_longitude: f64,
    pub max_longitude: f64,
    pub min_depth_in_km: f64,
    pub max_depth_in_km: f64,
    #[serde(default = "default_rotation_axis")]
    pub rotation_axis: [f64; 3],
    #[serde(default)]
    pub rotation_angle_in_degree: f64,
}

fn default_rotation_axis() -> [f64; 3] {
    [0.0, 0.0, 1.0]
}

impl Domain {
    pub fn is_rotated(&self) -> bool {
        self.rotation_angle_in_degree != 0.0
    }

    pub fn latitude_range(&self) -> f64 {
        self.max_latitude - self.min_latitude
    }

    pub fn longitude_range(&self) -> f64 {
        self.max_longitude - self.min_longitude
    }

    pub fn center(&self) -> (f64, f64) {
        (
            self.min_latitude + self.latitude_range() / 2.0,
            self.min_longitude + self.longitude_range() / 2.0,
        )
    }

    pub fn corners(&self) -> [(f64, f64); 4] {
        [
            (self.min_latitude, self.min_longitude),
            (self.min_latitude, self.max_longitude),
            (self.max_latitude, self.min_longitude),
            (self.max_latitude, self.max_longitude),
        ]
    }
}

/// Which location code to use when one station recorded under several.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "policy", content = "locations", rename_all = "snake_case")]
pub enum LocationPolicy {
    #[default]
    AlphabeticallyFirst,
    /// First listed location code that is present; falls back to the
    /// alphabetically first one.
    Preferred(Vec<String>),
}

impl LocationPolicy {
    pub fn choose<'a>(&self, locations: &[&'a str]) -> Option<&'a str> {
        let mut sorted = locations.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        if let Self::Preferred(preferred) = self {
            if let Some(found) = preferred
                .iter()
                .find_map(|wanted| sorted.iter().copied().find(|code| *code == wanted.as_str()))
            {
                return Some(found);
            }
        }
        sorted.first().copied()
    }
}

pub fn read_json_file<T: DeserializeOwned>(path: &Path, code: &'static str) -> LasifResult<T> {
    let source = fs::read_to_string(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            LasifError::not_found(code, format!("file '{}' does not exist", path.display()))
        } else {
            LasifError::io_system(
                code,
                format!("failed to read '{}': {}", path.display(), source),
            )
        }
    })?;
    serde_json::from_str(&source).map_err(|source| {
        LasifError::configuration(
            code,
            format!("failed to parse '{}': {}", path.display(), source),
        )
    })
}

pub fn ensure_directory(path: &Path, code: &'static str) -> LasifResult<()> {
    fs::create_dir_all(path).map_err(|source| {
        LasifError::io_system(
            code,
            format!(
                "failed to create directory '{}': {}",
                path.display(),
                source
            ),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::{Domain, LocationPolicy, PROJECT_CONFIG_FILE, ProjectConfig};
    use crate::domain::LasifErrorCategory;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn alphabetically_first_location_is_the_default() {
        let policy = LocationPolicy::default();
        assert_eq!(policy.choose(&["10", "00", "10"]), Some("00"));
        assert_eq!(policy.choose(&[]), None);
    }

    #[test]
    fn preferred_locations_win_when_present() {
        let policy = LocationPolicy::Preferred(vec!["10".to_string(), "20".to_string()]);
        assert_eq!(policy.choose(&["00", "20", "10"]), Some("10"));
        assert_eq!(policy.choose(&["00", "20"]), Some("20"));
        assert_eq!(policy.choose(&["01", "00"]), Some("00"));
    }

    #[test]
    fn domain_center_and_ranges_follow_bounds() {
        let domain = Domain {
            min_latitude: 30.0,
            max_latitude: 50.0,
            min_longitude: -10.0,
            max_longitude: 30.0,
            min_depth_in_km: 0.0,
            max_depth_in_km: 500.0,
            rotation_axis: [0.0, 0.0, 1.0],
            rotation_angle_in_degree: 0.0,
        };
        assert_eq!(domain.center(), (40.0, 10.0));
        assert_eq!(domain.latitude_range(), 20.0);
        assert!(!domain.is_rotated());
    }

    #[test]
    fn project_config_anchors_relative_paths() {
        let temp = TempDir::new().expect("tempdir should be created");
        fs::write(
            temp.path().join(PROJECT_CONFIG_FILE),
            r#"{
                "name": "TestProject",
                "domain": {
                    "min_latitude": -10.0, "max_latitude": 10.0,
                    "min_longitude": -10.0, "max_longitude": 10.0,
                    "min_depth_in_km": 0.0, "max_depth_in_km": 200.0
                },
                "location_policy": {"policy": "preferred", "locations": ["00"]},
                "workers": 3
            }"#,
        )
        .expect("config should be written");

        let config = ProjectConfig::load(temp.path()).expect("config should load");
        assert_eq!(config.workers, 3);
        assert_eq!(config.queue_depth, 64);
        assert_eq!(config.paths.output, temp.path().join("OUTPUT"));
        assert_eq!(config.domain.rotation_axis, [0.0, 0.0, 1.0]);
        assert_eq!(
            config.location_policy,
            LocationPolicy::Preferred(vec!["00".to_string()])
        );

        let folder = config
            .output_folder("adjoint_sources", "ITERATION_1__EV")
            .expect("output folder should be created");
        assert!(folder.is_dir());
    }

    #[test]
    fn missing_project_config_is_not_found() {
        let temp = TempDir::new().expect("tempdir should be created");
        let error = ProjectConfig::load(temp.path()).expect_err("config is absent");
        assert_eq!(error.category(), LasifErrorCategory::NotFound);
    }
}
