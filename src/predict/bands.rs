use crate::db::{AzElLimits, Satellite, Station};
use crate::predict::types::CompatibleMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum Band {
    #[strum(serialize = "2m")]
    TwoMetre,
    #[strum(serialize = "70cm")]
    SeventyCentimetre,
}

impl Band {
    pub fn classify(hz: f64) -> Option<Band> {
        if is_2m_band(hz) {
            Some(Band::TwoMetre)
        } else if is_70cm_band(hz) {
            Some(Band::SeventyCentimetre)
        } else {
            None
        }
    }
}

pub fn is_2m_band(hz: f64) -> bool {
    (100e6..200e6).contains(&hz)
}

pub fn is_70cm_band(hz: f64) -> bool {
    (400e6..500e6).contains(&hz)
}

/// Downlink channels of `satellite` the station can receive, each paired with
/// the station limits for the channel's band.
pub fn compatible_modes(station: &Station, satellite: &Satellite) -> Vec<CompatibleMode> {
    let Some(capabilities) = &station.capabilities else {
        return Vec::new();
    };

    satellite
        .channels
        .iter()
        .filter(|c| c.downlink)
        .filter_map(|channel| {
            let limits = match Band::classify(channel.frequency_hz)? {
                Band::TwoMetre => capabilities.vhf_limits.as_ref(),
                Band::SeventyCentimetre => capabilities.uhf_limits.as_ref(),
            }?;
            limits.is_valid().then(|| CompatibleMode {
                channel: channel.clone(),
                limits: limits.clone(),
            })
        })
        .collect()
}

/// Elevation floor plus an azimuth sector `[min_azimuth, max_azimuth)` that
/// wraps through north when `min_azimuth > max_azimuth`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibilityLimits {
    pub min_elevation: f64,
    pub min_azimuth: f64,
    pub max_azimuth: f64,
}

impl VisibilityLimits {
    pub fn from_limits(limits: &AzElLimits) -> Option<Self> {
        Some(Self {
            min_elevation: limits.min_elevation_degrees?,
            min_azimuth: limits.min_azimuth_degrees?,
            max_azimuth: limits.max_azimuth_degrees?,
        })
    }

    pub fn contains(&self, azimuth: f64, elevation: f64) -> bool {
        if elevation < self.min_elevation {
            return false;
        }
        if self.min_azimuth <= self.max_azimuth {
            self.min_azimuth <= azimuth && azimuth < self.max_azimuth
        } else {
            azimuth < self.max_azimuth || azimuth >= self.min_azimuth
        }
    }
}
