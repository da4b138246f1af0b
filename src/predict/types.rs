use serde::Serialize;

use crate::db::{AzElLimits, Channel, Satellite};

/// A downlink channel paired with the station limits for its band.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompatibleMode {
    pub channel: Channel,
    pub limits: AzElLimits,
}

/// One pass as reported by a geometry engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PassWindow {
    pub start_timestamp: f64,
    pub end_timestamp: f64,
    pub start_azimuth_degrees: f64,
    pub end_azimuth_degrees: f64,
    pub max_elevation_degrees: f64,
}

impl PassWindow {
    pub fn duration_seconds(&self) -> f64 {
        self.end_timestamp - self.start_timestamp
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub satellite: Satellite,
    pub start_timestamp: f64,
    pub end_timestamp: f64,
    pub start_azimuth_degrees: f64,
    pub end_azimuth_degrees: f64,
    pub max_elevation_degrees: f64,
    pub mode: CompatibleMode,
}

impl Prediction {
    pub fn new(satellite: Satellite, mode: CompatibleMode, window: PassWindow) -> Self {
        Self {
            satellite,
            start_timestamp: window.start_timestamp,
            end_timestamp: window.end_timestamp,
            start_azimuth_degrees: window.start_azimuth_degrees,
            end_azimuth_degrees: window.end_azimuth_degrees,
            max_elevation_degrees: window.max_elevation_degrees,
            mode,
        }
    }

    pub fn duration_seconds(&self) -> f64 {
        self.end_timestamp - self.start_timestamp
    }
}

/// Satellite position seen from a station at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SatPoint {
    pub timestamp: f64,
    pub azimuth_degrees: f64,
    pub elevation_degrees: f64,
    pub range_m: f64,
    pub range_rate_m_s: f64,
    pub latitude_degrees: f64,
    pub longitude_degrees: f64,
    pub height_m: f64,
    pub is_eclipsed: bool,
}
