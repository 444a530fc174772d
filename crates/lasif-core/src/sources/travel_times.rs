use super::TravelTimeModel;
use crate::domain::LasifResult;
use crate::domain::project::read_json_file;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct PhaseCurve {
    distances_in_degree: Vec<f64>,
    times: Vec<f64>,
}

/// Travel-time curves tabulated per phase over epicentral distance, read
/// from JSON:
///
/// ```text
/// {"phases": {"P": {"distances_in_degree": [0.0, 10.0], "times": [0.0, 142.5]}}}
/// ```
///
/// Curves are for a single source depth. A phase has no arrival outside the
/// tabulated distance range.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TravelTimeTable {
    phases: BTreeMap<String, PhaseCurve>,
}

impl TravelTimeTable {
    pub fn load(path: &Path) -> LasifResult<Self> {
        read_json_file(path, "DATA.TRAVEL_TIMES")
    }

    pub fn phases(&self) -> impl Iterator<Item = &str> {
        self.phases.keys().map(String::as_str)
    }
}

impl TravelTimeModel for TravelTimeTable {
    fn first_p_arrival(&self, source_depth_in_km: f64, distance_in_degree: f64) -> Option<f64> {
        self.first_arrival("P", source_depth_in_km, distance_in_degree)
    }

    fn first_arrival(
        &self,
        phase: &str,
        _source_depth_in_km: f64,
        distance_in_degree: f64,
    ) -> Option<f64> {
        let curve = self.phases.get(phase)?;
        interpolate_within(distance_in_degree, &curve.distances_in_degree, &curve.times)
    }
}

fn interpolate_within(x: f64, x_grid: &[f64], y_grid: &[f64]) -> Option<f64> {
    if x_grid.len() < 2 || x_grid.len() != y_grid.len() {
        return None;
    }
    if !x_grid.windows(2).all(|window| window[0] < window[1]) {
        return None;
    }
    let last = x_grid.len() - 1;
    if !(x_grid[0]..=x_grid[last]).contains(&x) {
        return None;
    }

    let upper = x_grid
        .windows(2)
        .position(|window| x <= window[1])
        .map(|index| index + 1)?;
    let lower = upper - 1;
    let fraction = (x - x_grid[lower]) / (x_grid[upper] - x_grid[lower]);
    Some(y_grid[lower] + fraction * (y_grid[upper] - y_grid[lower]))
}

#[cfg(test)]
mod tests {
    use super::TravelTimeTable;
    use crate::domain::LasifErrorCategory;
    use crate::sources::TravelTimeModel;
    use std::fs;
    use tempfile::TempDir;

    fn table() -> TravelTimeTable {
        serde_json::from_str(
            r#"{"phases": {
                "P": {"distances_in_degree": [0.0, 10.0, 20.0], "times": [0.0, 140.0, 270.0]},
                "S": {"distances_in_degree": [0.0, 10.0], "times": [0.0, 250.0]}
            }}"#,
        )
        .expect("table should parse")
    }

    #[test]
    fn arrivals_are_interpolated_between_samples() {
        let table = table();

        let arrival = table.first_p_arrival(10.0, 15.0).expect("P should arrive");
        assert!((arrival - 205.0).abs() < 1e-12);
        let arrival = table.first_arrival("S", 10.0, 5.0).expect("S should arrive");
        assert!((arrival - 125.0).abs() < 1e-12);
        assert_eq!(table.first_arrival("P", 10.0, 20.0), Some(270.0));
        assert_eq!(table.phases().collect::<Vec<_>>(), vec!["P", "S"]);
    }

    #[test]
    fn unknown_phases_and_distances_have_no_arrival() {
        let table = table();

        assert_eq!(table.first_arrival("PKIKP", 10.0, 5.0), None);
        assert_eq!(table.first_arrival("S", 10.0, 12.0), None);
        assert_eq!(table.first_p_arrival(10.0, -1.0), None);
    }

    #[test]
    fn missing_tables_are_not_found() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = temp.path().join("travel_times.json");

        let error = TravelTimeTable::load(&path).expect_err("table is missing");
        assert_eq!(error.category(), LasifErrorCategory::NotFound);

        fs::write(&path, r#"{"phases": {}}"#).expect("table should be written");
        let table = TravelTimeTable::load(&path).expect("table should load");
        assert_eq!(table.first_p_arrival(0.0, 1.0), None);
    }
}
