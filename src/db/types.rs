use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AzElLimits {
    #[serde(default)]
    pub min_azimuth_degrees: Option<f64>,
    #[serde(default)]
    pub max_azimuth_degrees: Option<f64>,
    #[serde(default)]
    pub min_elevation_degrees: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_elevation_degrees: Option<f64>,
}

impl AzElLimits {
    /// Usable for prediction only when the three mandatory bounds are set.
    pub fn is_valid(&self) -> bool {
        self.min_azimuth_degrees.is_some()
            && self.max_azimuth_degrees.is_some()
            && self.min_elevation_degrees.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Capabilities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vhf_limits: Option<AzElLimits>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uhf_limits: Option<AzElLimits>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub id: String,
    pub secret: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
    /// Metres above the ellipsoid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elevation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Capabilities>,
    #[serde(default)]
    pub scheduler_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub frequency_hz: f64,
    #[serde(default)]
    pub downlink: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Satellite {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tle: Option<String>,
    #[serde(default)]
    pub channels: Vec<Channel>,
    #[serde(default)]
    pub disable_tracking: bool,
}

impl Satellite {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum BlobFormat {
    Iq,
    Frame,
    Morse,
    Freeform,
    Datum,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blob {
    pub format: BlobFormat,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inline_data: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datum: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub station_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub satellite_id: Option<String>,
    pub start_timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elevation: Option<f64>,
    #[serde(default)]
    pub blobs: Vec<Blob>,
    #[serde(default)]
    pub version: u64,
}

impl Contact {
    /// Opens a new contact for `station`, copying its location.
    pub fn new(station: &Station, user_id: &str, satellite_id: Option<&str>, now: i64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            station_id: Some(station.id.clone()),
            user_id: Some(user_id.to_string()),
            satellite_id: satellite_id.map(String::from),
            start_timestamp: now,
            end_timestamp: None,
            lat: station.lat,
            lng: station.lng,
            elevation: station.elevation,
            blobs: Vec::new(),
            version: 0,
        }
    }

    #[cfg(test)]
    pub fn is_closed(&self) -> bool {
        self.end_timestamp.is_some()
    }

    #[cfg(test)]
    pub fn append_blob(&mut self, blob: Blob) -> Result<(), super::StorageError> {
        if self.is_closed() {
            return Err(super::StorageError::ContactClosed(self.id.clone()));
        }
        self.blobs.push(blob);
        Ok(())
    }

    pub fn close(&mut self, end: i64) {
        self.end_timestamp = Some(end);
    }
}
