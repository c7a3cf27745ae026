//! WGS84 geodetic/ECEF conversions and small 3-vector helpers

use crate::types::GroundPoint;

/// WGS84 semi-major axis (meters)
pub const WGS84_A: f64 = 6_378_137.0;

/// WGS84 first eccentricity squared
pub const WGS84_E2: f64 = 0.00669437999014;

/// WGS84 semi-minor axis (meters)
pub const WGS84_B: f64 = 6_356_752.314_245;

/// Prime vertical radius of curvature at a geodetic latitude (radians)
pub fn prime_vertical_radius(latitude_rad: f64) -> f64 {
    WGS84_A / (1.0 - WGS84_E2 * latitude_rad.sin().powi(2)).sqrt()
}

/// Convert lat/lon/height to ECEF coordinates
pub fn geodetic_to_ecef(point: &GroundPoint) -> [f64; 3] {
    let lat_rad = point.latitude.to_radians();
    let lon_rad = point.longitude.to_radians();

    let n = prime_vertical_radius(lat_rad);
    let (sin_lat, cos_lat) = lat_rad.sin_cos();
    let (sin_lon, cos_lon) = lon_rad.sin_cos();

    let x = (n + point.height) * cos_lat * cos_lon;
    let y = (n + point.height) * cos_lat * sin_lon;
    let z = (n * (1.0 - WGS84_E2) + point.height) * sin_lat;

    [x, y, z]
}

/// Convert ECEF coordinates to lat/lon/height
pub fn ecef_to_geodetic(ecef: &[f64; 3]) -> GroundPoint {
    let [x, y, z] = *ecef;
    let longitude = y.atan2(x);
    let p = (x * x + y * y).sqrt();

    // On the polar axis the latitude iteration degenerates
    if p < 1e-9 {
        let latitude = if z >= 0.0 { 90.0 } else { -90.0 };
        return GroundPoint {
            latitude,
            longitude: longitude.to_degrees(),
            height: z.abs() - WGS84_B,
        };
    }

    let mut latitude = z.atan2(p * (1.0 - WGS84_E2));
    let mut height = 0.0;
    for _ in 0..10 {
        let n = prime_vertical_radius(latitude);
        height = p / latitude.cos() - n;
        let next = z.atan2(p * (1.0 - WGS84_E2 * n / (n + height)));
        let converged = (next - latitude).abs() < 1e-15;
        latitude = next;
        if converged {
            break;
        }
    }
    let n = prime_vertical_radius(latitude);
    height = if latitude.cos().abs() > 1e-10 {
        p / latitude.cos() - n
    } else {
        height
    };

    GroundPoint {
        latitude: latitude.to_degrees(),
        longitude: longitude.to_degrees(),
        height,
    }
}

pub fn sub(a: &[f64; 3], b: &[f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

pub fn add(a: &[f64; 3], b: &[f64; 3]) -> [f64; 3] {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

pub fn scale(a: &[f64; 3], factor: f64) -> [f64; 3] {
    [a[0] * factor, a[1] * factor, a[2] * factor]
}

pub fn dot(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

pub fn norm(a: &[f64; 3]) -> f64 {
    dot(a, a).sqrt()
}

/// Calculate distance between two 3D points
pub fn distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    norm(&sub(a, b))
}
