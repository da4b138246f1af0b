use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::predict::bands::VisibilityLimits;
use crate::predict::error::PredictError;
use crate::predict::ground_station::GroundStation;
use crate::predict::types::{PassWindow, SatPoint};

/// Orbital geometry for one satellite seen from one station.
#[async_trait]
pub trait GeometryEngine: Send + Sync {
    /// Passes inside `limits` starting within `[begin, begin + duration)`,
    /// ordered by start.
    async fn predict(
        &self,
        begin: DateTime<Utc>,
        duration: Duration,
        station: &GroundStation,
        limits: &VisibilityLimits,
        tle: &str,
    ) -> Result<Vec<PassWindow>, PredictError>;

    /// `floor(duration / resolution)` samples starting at `begin`.
    async fn pass_details(
        &self,
        begin: DateTime<Utc>,
        duration: Duration,
        station: &GroundStation,
        tle: &str,
        resolution_seconds: f64,
    ) -> Result<Vec<SatPoint>, PredictError>;
}

pub(crate) fn sample_count(duration: Duration, resolution_seconds: f64) -> usize {
    if resolution_seconds <= 0.0 {
        return 0;
    }
    (duration.as_secs_f64() / resolution_seconds).floor() as usize
}
