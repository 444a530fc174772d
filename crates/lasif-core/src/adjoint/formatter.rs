use super::StationAdjointSource;
use crate::domain::{
    Component, Domain, Iteration, LasifResult, SolverFamily, StationCoordinates, split_station_id,
};
use crate::rotations::{lat2colat, rotate_data, rotate_lat_lon};
use crate::serialization::{format_fixed, format_float_repr, format_scientific, write_artifact};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const SES3D_MANIFEST: &str = "ad_srcfile";
pub const SPECFEM_MANIFEST: &str = "STATIONS_ADJOINT";

/// Serializes finalized station adjoint sources for one solver.
pub trait OutputFormatter {
    /// Writes the files of one station and returns their paths.
    fn serialize_station(
        &mut self,
        folder: &Path,
        source: &StationAdjointSource,
        coordinates: &StationCoordinates,
    ) -> LasifResult<Vec<PathBuf>>;

    /// Writes the receiver manifest. Nothing is written when no station was
    /// serialized.
    fn serialize_manifest(&self, folder: &Path) -> LasifResult<Option<PathBuf>>;

    fn stations_written(&self) -> usize;
}

#[derive(Debug, Clone, PartialEq)]
pub enum AdjointSourceWriter {
    Ses3d(Ses3dAdjointWriter),
    Specfem(SpecfemAdjointWriter),
}

impl AdjointSourceWriter {
    pub fn for_iteration(iteration: &Iteration, domain: &Domain) -> LasifResult<Self> {
        Ok(match iteration.solver_family()? {
            SolverFamily::Ses3d41 | SolverFamily::Ses3d20 => {
                Self::Ses3d(Ses3dAdjointWriter::new(*domain))
            }
            SolverFamily::Specfem3dCartesian | SolverFamily::Specfem3dGlobeCem => {
                let time_shift = iteration
                    .solver_settings
                    .adjoint_source_time_shift
                    .unwrap_or_else(|| {
                        warn!(
                            iteration = %iteration.name,
                            "no adjoint_source_time_shift in the iteration; no time shift will \
                             be applied to the adjoint sources"
                        );
                        0.0
                    });
                Self::Specfem(SpecfemAdjointWriter::new(
                    iteration.process_params.dt,
                    time_shift,
                ))
            }
        })
    }

    fn formatter(&mut self) -> &mut dyn OutputFormatter {
        match self {
            Self::Ses3d(writer) => writer,
            Self::Specfem(writer) => writer,
        }
    }
}

impl OutputFormatter for AdjointSourceWriter {
    fn serialize_station(
        &mut self,
        folder: &Path,
        source: &StationAdjointSource,
        coordinates: &StationCoordinates,
    ) -> LasifResult<Vec<PathBuf>> {
        self.formatter()
            .serialize_station(folder, source, coordinates)
    }

    fn serialize_manifest(&self, folder: &Path) -> LasifResult<Option<PathBuf>> {
        match self {
            Self::Ses3d(writer) => writer.serialize_manifest(folder),
            Self::Specfem(writer) => writer.serialize_manifest(folder),
        }
    }

    fn stations_written(&self) -> usize {
        match self {
            Self::Ses3d(writer) => writer.stations_written(),
            Self::Specfem(writer) => writer.stations_written(),
        }
    }
}

/// One `ad_src_<n>` file per station, numbered in write order, in the
/// solver's (colatitude, longitude, depth) frame with x pointing south.
#[derive(Debug, Clone, PartialEq)]
pub struct Ses3dAdjointWriter {
    domain: Domain,
    receivers: Vec<[f64; 3]>,
}

impl Ses3dAdjointWriter {
    pub fn new(domain: Domain) -> Self {
        Self {
            domain,
            receivers: Vec::new(),
        }
    }
}

impl OutputFormatter for Ses3dAdjointWriter {
    fn serialize_station(
        &mut self,
        folder: &Path,
        source: &StationAdjointSource,
        coordinates: &StationCoordinates,
    ) -> LasifResult<Vec<PathBuf>> {
        let (lat, lon) = (coordinates.latitude, coordinates.longitude);
        let (rotated_lat, rotated_lon, [north, east, vertical]) = if self.domain.is_rotated() {
            let axis = self.domain.rotation_axis;
            let angle = -self.domain.rotation_angle_in_degree;
            let (rotated_lat, rotated_lon) = rotate_lat_lon(lat, lon, axis, angle)?;
            let rotated = rotate_data(
                &source.north,
                &source.east,
                &source.vertical,
                lat,
                lon,
                axis,
                angle,
            )?;
            (rotated_lat, rotated_lon, rotated)
        } else {
            (
                lat,
                lon,
                [
                    source.north.clone(),
                    source.east.clone(),
                    source.vertical.clone(),
                ],
            )
        };

        let receiver = [lat2colat(rotated_lat), rotated_lon, 0.0];
        let content = render_ses3d_source(receiver, &north, &east, &vertical);
        let path = folder.join(format!("ad_src_{}", self.receivers.len() + 1));
        write_artifact(&path, &content, "IO.ADJOINT_SOURCE_WRITE")?;
        self.receivers.push(receiver);
        Ok(vec![path])
    }

    fn serialize_manifest(&self, folder: &Path) -> LasifResult<Option<PathBuf>> {
        if self.receivers.is_empty() {
            return Ok(None);
        }
        let path = folder.join(SES3D_MANIFEST);
        write_artifact(
            &path,
            &render_ses3d_manifest(&self.receivers),
            "IO.ADJOINT_MANIFEST_WRITE",
        )?;
        Ok(Some(path))
    }

    fn stations_written(&self) -> usize {
        self.receivers.len()
    }
}

/// Two-column `<NET.STA>.MX<C>.adj` files, one per component, with the
/// signal flipped in time and polarity.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecfemAdjointWriter {
    dt: f64,
    time_shift: f64,
    stations: BTreeMap<String, StationCoordinates>,
}

impl SpecfemAdjointWriter {
    pub fn new(dt: f64, time_shift: f64) -> Self {
        Self {
            dt,
            time_shift,
            stations: BTreeMap::new(),
        }
    }
}

impl OutputFormatter for SpecfemAdjointWriter {
    fn serialize_station(
        &mut self,
        folder: &Path,
        source: &StationAdjointSource,
        coordinates: &StationCoordinates,
    ) -> LasifResult<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(3);
        for component in [Component::Z, Component::N, Component::E] {
            let samples = source.component(component).unwrap_or_default();
            let path = folder.join(format!("{}.MX{}.adj", source.station, component));
            write_artifact(
                &path,
                &render_specfem_component(samples, self.dt, self.time_shift),
                "IO.ADJOINT_SOURCE_WRITE",
            )?;
            written.push(path);
        }
        self.stations.insert(source.station.clone(), *coordinates);
        Ok(written)
    }

    fn serialize_manifest(&self, folder: &Path) -> LasifResult<Option<PathBuf>> {
        if self.stations.is_empty() {
            return Ok(None);
        }
        let path = folder.join(SPECFEM_MANIFEST);
        write_artifact(
            &path,
            &render_stations_adjoint(&self.stations),
            "IO.ADJOINT_MANIFEST_WRITE",
        )?;
        Ok(Some(path))
    }

    fn stations_written(&self) -> usize {
        self.stations.len()
    }
}

pub fn render_ses3d_source(receiver: [f64; 3], north: &[f64], east: &[f64], vertical: &[f64]) -> String {
    let mut content = String::with_capacity(64 + north.len() * 42);
    content.push_str("-- adjoint source ------------------\n");
    content.push_str("-- source coordinates (colat,lon,depth)\n");
    let _ = writeln!(
        content,
        "{} {} {}",
        format_fixed(receiver[0], 6),
        format_fixed(receiver[1], 6),
        format_fixed(receiver[2], 6)
    );
    content.push_str("-- source time function (x, y, z) --\n");
    for ((n, e), z) in north.iter().zip(east).zip(vertical) {
        let _ = writeln!(
            content,
            "{} {} {}",
            format_scientific(-n, 6),
            format_scientific(*e, 6),
            format_scientific(*z, 6)
        );
    }
    content.push('\n');
    content
}

pub fn render_ses3d_manifest(receivers: &[[f64; 3]]) -> String {
    let mut content = format!("{}\n", receivers.len());
    for [colat, lon, depth] in receivers {
        let _ = writeln!(content, "{:.6} {:.6} {:.6}", colat, lon, depth);
    }
    content.push('\n');
    content
}

pub fn render_specfem_component(samples: &[f64], dt: f64, time_shift: f64) -> String {
    let mut content = String::with_capacity(samples.len() * 50);
    for (index, value) in samples.iter().rev().enumerate() {
        let time = index as f64 * dt + time_shift;
        let _ = writeln!(
            content,
            "{} {}",
            format_scientific(time, 18),
            format_scientific(-value, 18)
        );
    }
    content
}

/// `STA NET LAT LON ELEVATION BURIAL` per station, sorted by `NET.STA`.
pub fn render_stations_adjoint(stations: &BTreeMap<String, StationCoordinates>) -> String {
    let mut content = String::new();
    for (station, coordinates) in stations {
        let (network, code) = split_station_id(station);
        let _ = writeln!(
            content,
            "{} {} {} {} {} {}",
            code,
            network,
            format_float_repr(coordinates.latitude),
            format_float_repr(coordinates.longitude),
            format_float_repr(coordinates.elevation_in_m),
            format_float_repr(coordinates.local_depth_in_m)
        );
    }
    content
}
