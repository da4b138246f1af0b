use chrono::{DateTime, Utc};

use crate::clock::unix_seconds;
use crate::predict::error::PredictError;
use crate::predict::ground_station::{GroundStation, EARTH_ROTATION_RAD_S, WGS84_A_KM, WGS84_E2};
use crate::predict::tle::OrbitModel;
use crate::predict::types::SatPoint;

/// Topocentric view of the satellite plus its inertial and Earth-fixed
/// positions at one instant.
#[derive(Debug, Clone, Copy)]
pub struct Observation {
    pub azimuth_deg: f64,
    pub elevation_deg: f64,
    pub range_km: f64,
    pub range_rate_km_s: f64,
    pub position_teme_km: [f64; 3],
    pub position_ecef_km: [f64; 3],
}

pub fn observe(
    station: &GroundStation,
    model: &OrbitModel,
    timestamp: DateTime<Utc>,
) -> Result<Observation, PredictError> {
    let naive = timestamp.naive_utc();
    let minutes = model
        .elements
        .datetime_to_minutes_since_epoch(&naive)
        .map_err(|e| PredictError::Propagation(e.to_string()))?;

    let prediction = model
        .constants
        .propagate(minutes)
        .map_err(|e| PredictError::Propagation(e.to_string()))?;

    let sidereal = sgp4::iau_epoch_to_sidereal_time(sgp4::julian_years_since_j2000(&naive));

    let sat_ecef = teme_to_ecef_position(prediction.position, sidereal);
    let sat_vel_ecef = teme_to_ecef_velocity(prediction.position, prediction.velocity, sidereal);

    let sta_ecef = station.position_ecef_km();
    let sta_vel = station.velocity_ecef_km_s();

    let dr = sub(sat_ecef, sta_ecef);
    let range_km = norm(dr);

    let enu = ecef_to_enu(dr, station.lat_rad(), station.lon_rad());
    let azimuth = enu.0.atan2(enu.1).to_degrees().rem_euclid(360.0);
    let elevation = if range_km > 0.0 {
        (enu.2 / range_km).asin().to_degrees()
    } else {
        0.0
    };

    let range_rate_km_s = if range_km > 0.0 {
        dot(sub(sat_vel_ecef, sta_vel), dr) / range_km
    } else {
        0.0
    };

    Ok(Observation {
        azimuth_deg: azimuth,
        elevation_deg: elevation,
        range_km,
        range_rate_km_s,
        position_teme_km: prediction.position,
        position_ecef_km: sat_ecef,
    })
}

pub fn sat_point(
    station: &GroundStation,
    model: &OrbitModel,
    timestamp: DateTime<Utc>,
) -> Result<SatPoint, PredictError> {
    let obs = observe(station, model, timestamp)?;
    let (latitude, longitude, height_m) = ecef_to_geodetic(obs.position_ecef_km);
    let sun = sun_direction(timestamp);

    Ok(SatPoint {
        timestamp: unix_seconds(timestamp),
        azimuth_degrees: obs.azimuth_deg,
        elevation_degrees: obs.elevation_deg,
        range_m: obs.range_km * 1000.0,
        range_rate_m_s: obs.range_rate_km_s * 1000.0,
        latitude_degrees: latitude,
        longitude_degrees: longitude,
        height_m,
        is_eclipsed: in_earth_shadow(obs.position_teme_km, sun),
    })
}

pub fn teme_to_ecef_position(pos_teme: [f64; 3], gmst: f64) -> [f64; 3] {
    let cos_gmst = gmst.cos();
    let sin_gmst = gmst.sin();
    [
        pos_teme[0] * cos_gmst + pos_teme[1] * sin_gmst,
        -pos_teme[0] * sin_gmst + pos_teme[1] * cos_gmst,
        pos_teme[2],
    ]
}

pub fn teme_to_ecef_velocity(pos_teme: [f64; 3], vel_teme: [f64; 3], gmst: f64) -> [f64; 3] {
    let pos = teme_to_ecef_position(pos_teme, gmst);
    let rotated = teme_to_ecef_position(vel_teme, gmst);
    [
        rotated[0] + EARTH_ROTATION_RAD_S * pos[1],
        rotated[1] - EARTH_ROTATION_RAD_S * pos[0],
        rotated[2],
    ]
}

pub fn ecef_to_enu(dr: [f64; 3], lat_rad: f64, lon_rad: f64) -> (f64, f64, f64) {
    let sin_lat = lat_rad.sin();
    let cos_lat = lat_rad.cos();
    let sin_lon = lon_rad.sin();
    let cos_lon = lon_rad.cos();

    let east = -sin_lon * dr[0] + cos_lon * dr[1];
    let north = -sin_lat * cos_lon * dr[0] - sin_lat * sin_lon * dr[1] + cos_lat * dr[2];
    let up = cos_lat * cos_lon * dr[0] + cos_lat * sin_lon * dr[1] + sin_lat * dr[2];
    (east, north, up)
}

/// WGS-84 latitude, longitude (degrees) and height (metres).
pub fn ecef_to_geodetic(ecef_km: [f64; 3]) -> (f64, f64, f64) {
    let [x, y, z] = ecef_km;
    let lon = y.atan2(x);
    let p = (x * x + y * y).sqrt();

    let mut lat = z.atan2(p * (1.0 - WGS84_E2));
    let mut height = 0.0;
    for _ in 0..6 {
        let sin_lat = lat.sin();
        let n = WGS84_A_KM / (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt();
        height = if lat.cos().abs() > 1e-9 {
            p / lat.cos() - n
        } else {
            z.abs() - n * (1.0 - WGS84_E2)
        };
        lat = z.atan2(p * (1.0 - WGS84_E2 * n / (n + height)));
    }

    (lat.to_degrees(), lon.to_degrees(), height * 1000.0)
}

/// Unit vector towards the Sun in the mean equatorial frame, good to about
/// a hundredth of a degree.
pub fn sun_direction(timestamp: DateTime<Utc>) -> [f64; 3] {
    let days = unix_seconds(timestamp) / 86_400.0 + 2_440_587.5 - 2_451_545.0;
    let mean_longitude = (280.460 + 0.985_647_4 * days).to_radians();
    let mean_anomaly = (357.528 + 0.985_600_3 * days).to_radians();
    let ecliptic_longitude = mean_longitude
        + (1.915 * mean_anomaly.sin() + 0.020 * (2.0 * mean_anomaly).sin()).to_radians();
    let obliquity = (23.439 - 0.000_000_4 * days).to_radians();

    [
        ecliptic_longitude.cos(),
        obliquity.cos() * ecliptic_longitude.sin(),
        obliquity.sin() * ecliptic_longitude.sin(),
    ]
}

/// Cylindrical shadow: behind the Earth and within one Earth radius of the
/// Earth-Sun line.
pub fn in_earth_shadow(position_km: [f64; 3], sun_unit: [f64; 3]) -> bool {
    let along = dot(position_km, sun_unit);
    if along >= 0.0 {
        return false;
    }
    let perpendicular = [
        position_km[0] - along * sun_unit[0],
        position_km[1] - along * sun_unit[1],
        position_km[2] - along * sun_unit[2],
    ];
    norm(perpendicular) < WGS84_A_KM
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn sub(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn norm(a: [f64; 3]) -> f64 {
    dot(a, a).sqrt()
}
