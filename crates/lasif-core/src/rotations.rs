//! Spherical geometry and rotations between the geographic frame and the
//! rotated frame of a simulation domain.
//!
//! Angles are in degrees, Cartesian vectors live on the unit sphere unless a
//! radius is given, and rotations are right-handed about the given axis.

use crate::domain::{Domain, LasifError};
use faer::Mat;
use tracing::warn;

pub type RotationMatrix = Mat<f64>;

const AXIS_EPSILON: f64 = 1.0e-12;
const SPECFEM_AXIS_TOLERANCE_DEG: f64 = 0.01;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RotationError {
    #[error("rotation axis {axis:?} has zero length")]
    DegenerateAxis { axis: [f64; 3] },
    #[error("channel lengths differ: north={north}, east={east}, vertical={vertical}")]
    ChannelLengthMismatch {
        north: usize,
        east: usize,
        vertical: usize,
    },
}

impl From<RotationError> for LasifError {
    fn from(error: RotationError) -> Self {
        match error {
            RotationError::DegenerateAxis { .. } => {
                LasifError::configuration("CONFIG.ROTATION_AXIS", error.to_string())
            }
            RotationError::ChannelLengthMismatch { .. } => {
                LasifError::computation("RUN.ROTATION_CHANNELS", error.to_string())
            }
        }
    }
}

pub fn lat2colat(lat: f64) -> f64 {
    90.0 - lat
}

pub fn colat2lat(colat: f64) -> f64 {
    90.0 - colat
}

pub fn lat_lon_radius_to_xyz(lat: f64, lon: f64, radius: f64) -> [f64; 3] {
    let colat = lat2colat(lat).to_radians();
    let lon = lon.to_radians();
    [
        radius * colat.sin() * lon.cos(),
        radius * colat.sin() * lon.sin(),
        radius * colat.cos(),
    ]
}

/// Returns `(lat, lon, radius)`. The origin maps to `(0, 0, 0)`.
pub fn xyz_to_lat_lon_radius(xyz: [f64; 3]) -> (f64, f64, f64) {
    let radius = norm(xyz);
    if radius == 0.0 {
        return (0.0, 0.0, 0.0);
    }
    let colat = (xyz[2] / radius).clamp(-1.0, 1.0).acos().to_degrees();
    let lon = xyz[1].atan2(xyz[0]).to_degrees();
    (colat2lat(colat), lon, radius)
}

/// Great-circle distance between two points in degrees.
pub fn epicentral_distance_deg(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1 = lat1.to_radians();
    let lat2 = lat2.to_radians();
    let half_dlat = (lat2 - lat1) / 2.0;
    let half_dlon = (lon2 - lon1).to_radians() / 2.0;
    let h = half_dlat.sin().powi(2) + lat1.cos() * lat2.cos() * half_dlon.sin().powi(2);
    (2.0 * h.sqrt().clamp(0.0, 1.0).asin()).to_degrees()
}

pub fn rotation_matrix(axis: [f64; 3], angle_deg: f64) -> Result<RotationMatrix, RotationError> {
    let length = norm(axis);
    if length < AXIS_EPSILON {
        return Err(RotationError::DegenerateAxis { axis });
    }
    let [c1, c2, c3] = axis.map(|component| component / length);
    let angle = angle_deg.to_radians();
    let (sin, cos) = angle.sin_cos();
    let one_minus_cos = 1.0 - cos;

    let mut matrix = RotationMatrix::zeros(3, 3);
    matrix[(0, 0)] = cos + one_minus_cos * c1 * c1;
    matrix[(0, 1)] = one_minus_cos * c1 * c2 - sin * c3;
    matrix[(0, 2)] = one_minus_cos * c1 * c3 + sin * c2;
    matrix[(1, 0)] = one_minus_cos * c2 * c1 + sin * c3;
    matrix[(1, 1)] = cos + one_minus_cos * c2 * c2;
    matrix[(1, 2)] = one_minus_cos * c2 * c3 - sin * c1;
    matrix[(2, 0)] = one_minus_cos * c3 * c1 - sin * c2;
    matrix[(2, 1)] = one_minus_cos * c3 * c2 + sin * c1;
    matrix[(2, 2)] = cos + one_minus_cos * c3 * c3;
    Ok(matrix)
}

pub fn rotate_vector(matrix: &RotationMatrix, vector: [f64; 3]) -> [f64; 3] {
    let mut rotated = [0.0; 3];
    for (row, value) in rotated.iter_mut().enumerate() {
        *value = (0..3).map(|col| matrix[(row, col)] * vector[col]).sum();
    }
    rotated
}

pub fn rotate_lat_lon(
    lat: f64,
    lon: f64,
    axis: [f64; 3],
    angle_deg: f64,
) -> Result<(f64, f64), RotationError> {
    let matrix = rotation_matrix(axis, angle_deg)?;
    let rotated = rotate_vector(&matrix, lat_lon_radius_to_xyz(lat, lon, 1.0));
    let (lat, lon, _) = xyz_to_lat_lon_radius(rotated);
    Ok((lat, lon))
}

/// Rotates a three-component recording made at `(lat, lon)` so that it is
/// expressed in the local north/east/up frame of the rotated location.
///
/// Returns `[north, east, vertical]`.
pub fn rotate_data(
    north: &[f64],
    east: &[f64],
    vertical: &[f64],
    lat: f64,
    lon: f64,
    axis: [f64; 3],
    angle_deg: f64,
) -> Result<[Vec<f64>; 3], RotationError> {
    if north.len() != east.len() || north.len() != vertical.len() {
        return Err(RotationError::ChannelLengthMismatch {
            north: north.len(),
            east: east.len(),
            vertical: vertical.len(),
        });
    }

    let rotation = rotation_matrix(axis, angle_deg)?;
    let (new_lat, new_lon) = rotate_lat_lon(lat, lon, axis, angle_deg)?;
    let transfer = multiply(
        &transpose(&local_basis(new_lat, new_lon)),
        &multiply(&rotation, &local_basis(lat, lon)),
    );

    let mut rotated = [
        Vec::with_capacity(north.len()),
        Vec::with_capacity(north.len()),
        Vec::with_capacity(north.len()),
    ];
    for index in 0..north.len() {
        let sample = rotate_vector(&transfer, [north[index], east[index], vertical[index]]);
        for (channel, value) in rotated.iter_mut().zip(sample) {
            channel.push(value);
        }
    }
    Ok(rotated)
}

/// Inverse of [`rotation_matrix`]: returns `(axis, angle_deg)` with a unit
/// axis and an angle in `[0, 180]`.
pub fn axis_and_angle_from_rotation_matrix(matrix: &RotationMatrix) -> ([f64; 3], f64) {
    let trace = matrix[(0, 0)] + matrix[(1, 1)] + matrix[(2, 2)];
    let angle = ((trace - 1.0) / 2.0).clamp(-1.0, 1.0).acos();

    if angle < 1.0e-9 {
        return ([0.0, 0.0, 1.0], 0.0);
    }

    let axis = if std::f64::consts::PI - angle < 1.0e-6 {
        half_turn_axis(matrix)
    } else {
        [
            matrix[(2, 1)] - matrix[(1, 2)],
            matrix[(0, 2)] - matrix[(2, 0)],
            matrix[(1, 0)] - matrix[(0, 1)],
        ]
    };
    let length = norm(axis);
    (axis.map(|component| component / length), angle.to_degrees())
}

fn half_turn_axis(matrix: &RotationMatrix) -> [f64; 3] {
    let diagonal = [matrix[(0, 0)], matrix[(1, 1)], matrix[(2, 2)]];
    let pivot = (0..3)
        .max_by(|a, b| diagonal[*a].total_cmp(&diagonal[*b]))
        .unwrap_or(2);
    let mut axis = [0.0; 3];
    axis[pivot] = ((diagonal[pivot] + 1.0) / 2.0).max(0.0).sqrt();
    for other in (0..3).filter(|index| *index != pivot) {
        axis[other] = (matrix[(pivot, other)] + matrix[(other, pivot)]) / (4.0 * axis[pivot]);
    }
    axis
}

/// Chunk description in the terms SPECFEM3D GLOBE expects.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpecfemGlobeDomain {
    pub angular_width_xi_in_degrees: f64,
    pub angular_width_eta_in_degrees: f64,
    pub center_latitude_in_degrees: f64,
    pub center_longitude_in_degrees: f64,
    pub gamma_rotation_azimuth: f64,
    /// False when no axis through the rotated center reproduces the domain
    /// rotation; the emitted geometry is then not correct.
    pub consistent: bool,
}

pub fn specfem_globe_domain(domain: &Domain) -> Result<SpecfemGlobeDomain, RotationError> {
    let lat_range = domain.latitude_range();
    let lng_range = domain.longitude_range();
    let (c_lat, c_lng) = domain.center();
    let angle = domain.rotation_angle_in_degree;

    let (c_lat_1, c_lng_1) = rotate_lat_lon(c_lat, c_lng, domain.rotation_axis, angle)?;

    let a = rotation_matrix(domain.rotation_axis, angle)?;
    let latitude_rotation = -(c_lat_1 - c_lat);
    let longitude_rotation = c_lng_1 - c_lng;
    let b = rotation_matrix(
        lat_lon_radius_to_xyz(0.0, c_lng + 90.0, 1.0),
        latitude_rotation,
    )?;
    let c = rotation_matrix([0.0, 0.0, 1.0], longitude_rotation)?;
    let d = multiply(&a, &transpose(&multiply(&c, &b)));

    let (mut axis, mut gamma) = axis_and_angle_from_rotation_matrix(&d);
    if gamma == 0.0 {
        axis = lat_lon_radius_to_xyz(c_lat_1, c_lng_1, 1.0);
    }

    let mismatch = |axis: [f64; 3]| {
        let (lat, lon, _) = xyz_to_lat_lon_radius(axis);
        (lat - c_lat_1).abs() >= SPECFEM_AXIS_TOLERANCE_DEG
            || (lon - c_lng_1).abs() >= SPECFEM_AXIS_TOLERANCE_DEG
    };

    if mismatch(axis) {
        axis = axis.map(|component| -component);
        gamma = -gamma;
    }
    let consistent = !mismatch(axis);
    if !consistent {
        warn!(
            center_latitude = c_lat_1,
            center_longitude = c_lng_1,
            "Failed to describe the domain in terms that SPECFEM understands. The domain \
             definition in the output files will NOT BE CORRECT!"
        );
    }

    Ok(SpecfemGlobeDomain {
        angular_width_xi_in_degrees: lng_range,
        angular_width_eta_in_degrees: lat_range,
        center_latitude_in_degrees: c_lat_1,
        center_longitude_in_degrees: c_lng_1,
        gamma_rotation_azimuth: gamma,
        consistent,
    })
}

/// Columns are the local north, east and up unit vectors at `(lat, lon)`.
fn local_basis(lat: f64, lon: f64) -> RotationMatrix {
    let (sin_lat, cos_lat) = lat.to_radians().sin_cos();
    let (sin_lon, cos_lon) = lon.to_radians().sin_cos();
    let columns = [
        [-sin_lat * cos_lon, -sin_lat * sin_lon, cos_lat],
        [-sin_lon, cos_lon, 0.0],
        [cos_lat * cos_lon, cos_lat * sin_lon, sin_lat],
    ];

    let mut basis = RotationMatrix::zeros(3, 3);
    for (col, vector) in columns.iter().enumerate() {
        for (row, value) in vector.iter().enumerate() {
            basis[(row, col)] = *value;
        }
    }
    basis
}

fn multiply(left: &RotationMatrix, right: &RotationMatrix) -> RotationMatrix {
    let mut product = RotationMatrix::zeros(3, 3);
    for row in 0..3 {
        for col in 0..3 {
            product[(row, col)] = (0..3).map(|k| left[(row, k)] * right[(k, col)]).sum();
        }
    }
    product
}

fn transpose(matrix: &RotationMatrix) -> RotationMatrix {
    let mut transposed = RotationMatrix::zeros(3, 3);
    for row in 0..3 {
        for col in 0..3 {
            transposed[(col, row)] = matrix[(row, col)];
        }
    }
    transposed
}

fn norm(vector: [f64; 3]) -> f64 {
    vector.iter().map(|value| value * value).sum::<f64>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64, tolerance: f64, label: &str) {
        assert!(
            (actual - expected).abs() <= tolerance,
            "{}: expected {}, got {}",
            label,
            expected,
            actual
        );
    }

    #[test]
    fn cartesian_conversion_round_trips() {
        for (lat, lon) in [(0.0, 0.0), (45.0, 120.0), (-33.5, -70.25), (89.0, 10.0)] {
            let (back_lat, back_lon, radius) =
                xyz_to_lat_lon_radius(lat_lon_radius_to_xyz(lat, lon, 6371.0));
            assert_close(back_lat, lat, 1e-9, "lat");
            assert_close(back_lon, lon, 1e-9, "lon");
            assert_close(radius, 6371.0, 1e-6, "radius");
        }
    }

    #[test]
    fn rotation_about_pole_shifts_longitude() {
        let (lat, lon) = rotate_lat_lon(10.0, 0.0, [0.0, 0.0, 1.0], 90.0)
            .expect("rotation should succeed");
        assert_close(lat, 10.0, 1e-9, "lat");
        assert_close(lon, 90.0, 1e-9, "lon");
    }

    #[test]
    fn rotating_forth_and_back_returns_the_original_point() {
        let axis = [0.3, -1.2, 0.8];
        for (lat, lon) in [(12.0, 34.0), (-45.0, 170.0), (60.5, -20.25)] {
            for angle in [-57.0, 5.5, 33.0, 140.0] {
                let (r_lat, r_lon) =
                    rotate_lat_lon(lat, lon, axis, angle).expect("forward rotation");
                let (b_lat, b_lon) =
                    rotate_lat_lon(r_lat, r_lon, axis, -angle).expect("inverse rotation");
                assert_close(b_lat, lat, 1e-6, "lat");
                assert_close(b_lon, lon, 1e-6, "lon");
            }
        }
    }

    #[test]
    fn zero_axis_is_rejected() {
        let error = rotation_matrix([0.0, 0.0, 0.0], 10.0).expect_err("zero axis should fail");
        assert_eq!(error, RotationError::DegenerateAxis { axis: [0.0; 3] });
        let lasif: LasifError = error.into();
        assert_eq!(
            lasif.category(),
            crate::domain::LasifErrorCategory::Configuration
        );
    }

    #[test]
    fn spinning_about_the_pole_keeps_local_components() {
        let north = [1.0, 0.0, -2.0];
        let east = [0.0, 1.0, 0.5];
        let vertical = [3.0, -1.0, 0.0];
        let [n, e, z] = rotate_data(&north, &east, &vertical, 40.0, 15.0, [0.0, 0.0, 1.0], 25.0)
            .expect("rotation should succeed");

        for index in 0..3 {
            assert_close(n[index], north[index], 1e-12, "north");
            assert_close(e[index], east[index], 1e-12, "east");
            assert_close(z[index], vertical[index], 1e-12, "vertical");
        }
    }

    #[test]
    fn rotated_data_round_trips_and_preserves_amplitude() {
        let axis = [1.0, 1.0, 0.2];
        let north = [0.4, -1.0];
        let east = [2.0, 0.3];
        let vertical = [-0.7, 1.1];
        let (lat, lon) = (35.0, 25.0);

        let [n, e, z] = rotate_data(&north, &east, &vertical, lat, lon, axis, 30.0)
            .expect("forward rotation");
        let (r_lat, r_lon) = rotate_lat_lon(lat, lon, axis, 30.0).expect("rotated location");
        let [n2, e2, z2] =
            rotate_data(&n, &e, &z, r_lat, r_lon, axis, -30.0).expect("inverse rotation");

        for index in 0..2 {
            let before = north[index].powi(2) + east[index].powi(2) + vertical[index].powi(2);
            let after = n[index].powi(2) + e[index].powi(2) + z[index].powi(2);
            assert_close(after, before, 1e-12, "amplitude");
            assert_close(n2[index], north[index], 1e-9, "north");
            assert_close(e2[index], east[index], 1e-9, "east");
            assert_close(z2[index], vertical[index], 1e-9, "vertical");
        }
    }

    #[test]
    fn mismatched_channel_lengths_are_rejected() {
        let error = rotate_data(&[1.0], &[1.0, 2.0], &[1.0], 0.0, 0.0, [0.0, 0.0, 1.0], 1.0)
            .expect_err("mismatched lengths should fail");
        assert!(matches!(error, RotationError::ChannelLengthMismatch { .. }));
    }

    #[test]
    fn axis_and_angle_are_recovered_from_the_matrix() {
        let axis = [2.0, -1.0, 0.5];
        let length = norm(axis);
        for angle in [12.0, 90.0, 179.9999999, 180.0] {
            let matrix = rotation_matrix(axis, angle).expect("matrix");
            let (recovered_axis, recovered_angle) = axis_and_angle_from_rotation_matrix(&matrix);
            assert_close(recovered_angle, angle, 1e-5, "angle");
            let rebuilt = rotation_matrix(recovered_axis, recovered_angle).expect("rebuilt");
            for row in 0..3 {
                for col in 0..3 {
                    assert_close(rebuilt[(row, col)], matrix[(row, col)], 1e-6, "entry");
                }
            }
            if angle < 179.0 {
                for index in 0..3 {
                    assert_close(recovered_axis[index], axis[index] / length, 1e-9, "axis");
                }
            }
        }
    }

    #[test]
    fn epicentral_distance_matches_known_geometry() {
        assert_close(epicentral_distance_deg(0.0, 0.0, 0.0, 90.0), 90.0, 1e-9, "equator");
        assert_close(epicentral_distance_deg(90.0, 0.0, -90.0, 0.0), 180.0, 1e-9, "poles");
        assert_close(epicentral_distance_deg(10.0, 20.0, 10.0, 20.0), 0.0, 1e-12, "same");
    }

    #[test]
    fn unrotated_domain_maps_directly_onto_specfem_chunk() {
        let domain = Domain {
            min_latitude: 30.0,
            max_latitude: 50.0,
            min_longitude: 0.0,
            max_longitude: 30.0,
            min_depth_in_km: 0.0,
            max_depth_in_km: 600.0,
            rotation_axis: [0.0, 0.0, 1.0],
            rotation_angle_in_degree: 0.0,
        };
        let chunk = specfem_globe_domain(&domain).expect("chunk should be described");

        assert!(chunk.consistent);
        assert_close(chunk.center_latitude_in_degrees, 40.0, 1e-9, "center lat");
        assert_close(chunk.center_longitude_in_degrees, 15.0, 1e-9, "center lon");
        assert_close(chunk.gamma_rotation_azimuth, 0.0, 1e-9, "gamma");
        assert_eq!(chunk.angular_width_xi_in_degrees, 30.0);
        assert_eq!(chunk.angular_width_eta_in_degrees, 20.0);
    }

    #[test]
    fn rotated_domain_center_follows_the_domain_rotation() {
        let domain = Domain {
            min_latitude: -10.0,
            max_latitude: 10.0,
            min_longitude: -10.0,
            max_longitude: 10.0,
            min_depth_in_km: 0.0,
            max_depth_in_km: 600.0,
            rotation_axis: [0.0, 0.0, 1.0],
            rotation_angle_in_degree: 40.0,
        };
        let chunk = specfem_globe_domain(&domain).expect("chunk should be described");

        assert!(chunk.consistent);
        assert_close(chunk.center_latitude_in_degrees, 0.0, 1e-9, "center lat");
        assert_close(chunk.center_longitude_in_degrees, 40.0, 1e-9, "center lon");
    }
}
