use chrono::{DateTime, Utc};
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;

use crate::db::{SatelliteDb, Station};
use crate::predict::bands::{compatible_modes, VisibilityLimits};
use crate::predict::engine::GeometryEngine;
use crate::predict::error::PredictError;
use crate::predict::ground_station::GroundStation;
use crate::predict::types::{Prediction, SatPoint};

pub const PREDICTION_HORIZON: Duration = Duration::from_secs(18 * 3600);

/// Predictions for one station. `error` holds the last per-satellite
/// failure; the predictions from every other satellite are still present.
#[derive(Debug, Default)]
pub struct PredictionBatch {
    pub predictions: Vec<Prediction>,
    pub error: Option<PredictError>,
}

pub struct PassPredictor {
    satellites: Arc<SatelliteDb>,
    engine: Arc<dyn GeometryEngine>,
}

impl PassPredictor {
    pub fn new(satellites: Arc<SatelliteDb>, engine: Arc<dyn GeometryEngine>) -> Self {
        Self { satellites, engine }
    }

    pub async fn pass_predictions(&self, station: &Station, begin: DateTime<Utc>) -> PredictionBatch {
        let mut batch = PredictionBatch::default();
        let Some(observer) = GroundStation::from_station(station) else {
            debug!("{}: no location, skipping predictions", station.id);
            return batch;
        };

        for satellite in self.satellites.list() {
            let Some(tle) = satellite.tle.as_deref() else {
                continue;
            };

            for mode in compatible_modes(station, satellite) {
                let Some(limits) = VisibilityLimits::from_limits(&mode.limits) else {
                    continue;
                };
                match self
                    .engine
                    .predict(begin, PREDICTION_HORIZON, &observer, &limits, tle)
                    .await
                {
                    Ok(windows) => batch.predictions.extend(
                        windows
                            .into_iter()
                            .map(|w| Prediction::new(satellite.clone(), mode.clone(), w)),
                    ),
                    Err(e) => {
                        warn!(
                            "{}: prediction error for satellite {}: {}",
                            station.id, satellite.id, e
                        );
                        batch.error = Some(e);
                    }
                }
            }
        }

        batch
            .predictions
            .sort_by(|a, b| a.start_timestamp.total_cmp(&b.start_timestamp));
        batch
    }

    pub async fn pass_details(
        &self,
        begin: DateTime<Utc>,
        duration: Duration,
        station: &GroundStation,
        tle: &str,
        resolution_seconds: f64,
    ) -> Result<Vec<SatPoint>, PredictError> {
        self.engine
            .pass_details(begin, duration, station, tle, resolution_seconds)
            .await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::time::Duration;

    use crate::predict::bands::VisibilityLimits;
    use crate::predict::engine::{sample_count, GeometryEngine};
    use crate::predict::error::PredictError;
    use crate::predict::ground_station::GroundStation;
    use crate::predict::types::{PassWindow, SatPoint};

    /// Canned windows keyed by TLE text; unknown TLEs fail.
    #[derive(Default)]
    pub struct ScriptedEngine {
        pub windows: Mutex<HashMap<String, Vec<PassWindow>>>,
        pub predict_calls: Mutex<usize>,
        pub fail_details: bool,
    }

    impl ScriptedEngine {
        pub fn with(tle: &str, windows: Vec<PassWindow>) -> Self {
            let engine = Self::default();
            engine.windows.lock().insert(tle.to_string(), windows);
            engine
        }
    }

    pub fn window(start: f64, end: f64) -> PassWindow {
        PassWindow {
            start_timestamp: start,
            end_timestamp: end,
            start_azimuth_degrees: 0.0,
            end_azimuth_degrees: 180.0,
            max_elevation_degrees: 45.0,
        }
    }

    #[async_trait]
    impl GeometryEngine for ScriptedEngine {
        async fn predict(
            &self,
            _begin: DateTime<Utc>,
            _duration: Duration,
            _station: &GroundStation,
            _limits: &VisibilityLimits,
            tle: &str,
        ) -> Result<Vec<PassWindow>, PredictError> {
            *self.predict_calls.lock() += 1;
            self.windows
                .lock()
                .get(tle)
                .cloned()
                .ok_or_else(|| PredictError::EngineExit("exit status: 1".to_string()))
        }

        async fn pass_details(
            &self,
            begin: DateTime<Utc>,
            duration: Duration,
            _station: &GroundStation,
            _tle: &str,
            resolution_seconds: f64,
        ) -> Result<Vec<SatPoint>, PredictError> {
            if self.fail_details {
                return Err(PredictError::Malformed("scripted failure".to_string()));
            }
            let begin = crate::clock::unix_seconds(begin);
            Ok((0..sample_count(duration, resolution_seconds))
                .map(|i| SatPoint {
                    timestamp: begin + i as f64 * resolution_seconds,
                    azimuth_degrees: i as f64 * 10.0,
                    elevation_degrees: 30.0,
                    range_m: 1_000_000.0,
                    range_rate_m_s: 0.0,
                    latitude_degrees: 47.0,
                    longitude_degrees: 8.0,
                    height_m: 700_000.0,
                    is_eclipsed: false,
                })
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{window, ScriptedEngine};
    use super::*;
    use crate::clock::from_unix_seconds;
    use crate::db::{AzElLimits, Capabilities, Channel, Satellite};
    use crate::predict::sgp4_engine::Sgp4Engine;
    use crate::predict::tle::fixtures::SWISSCUBE;

    fn limits() -> AzElLimits {
        AzElLimits {
            min_azimuth_degrees: Some(270.0),
            max_azimuth_degrees: Some(90.0),
            min_elevation_degrees: Some(20.0),
            max_elevation_degrees: None,
        }
    }

    fn zurich() -> Station {
        Station {
            id: "zurich".to_string(),
            secret: "secret".to_string(),
            user_id: "owner".to_string(),
            name: None,
            lat: Some(47.4),
            lng: Some(8.5),
            elevation: Some(400.0),
            capabilities: Some(Capabilities {
                vhf_limits: Some(limits()),
                uhf_limits: Some(limits()),
            }),
            scheduler_enabled: true,
        }
    }

    fn satellite(id: &str, tle: Option<&str>, hz: f64) -> Satellite {
        Satellite {
            id: id.to_string(),
            name: None,
            tle: tle.map(String::from),
            channels: vec![Channel {
                frequency_hz: hz,
                downlink: true,
                mode: None,
            }],
            disable_tracking: false,
        }
    }

    #[tokio::test]
    async fn zurich_sees_swisscube() {
        let satellites = SatelliteDb::new(vec![satellite("swisscube", Some(SWISSCUBE), 145.8e6)]);
        let predictor = PassPredictor::new(Arc::new(satellites), Arc::new(Sgp4Engine));

        let batch = predictor
            .pass_predictions(&zurich(), from_unix_seconds(1_338_799_998.0))
            .await;
        assert!(batch.error.is_none());
        assert!(!batch.predictions.is_empty());
        for p in &batch.predictions {
            assert!(p.start_timestamp < p.end_timestamp);
            assert!((0.0..=90.0).contains(&p.max_elevation_degrees));
            assert_eq!(p.satellite.id, "swisscube");
        }
    }

    #[tokio::test]
    async fn merges_sorted_and_surfaces_last_error() {
        let engine = ScriptedEngine::with("tle-a", vec![window(500.0, 600.0), window(100.0, 200.0)]);
        engine
            .windows
            .lock()
            .insert("tle-b".to_string(), vec![window(300.0, 400.0)]);
        let satellites = SatelliteDb::new(vec![
            satellite("a", Some("tle-a"), 437e6),
            satellite("b", Some("tle-b"), 145e6),
            satellite("broken", Some("tle-broken"), 145e6),
            satellite("no-tle", None, 145e6),
            satellite("sband", Some("tle-a"), 2.2e9),
        ]);
        let engine = Arc::new(engine);
        let predictor = PassPredictor::new(Arc::new(satellites), engine.clone());

        let batch = predictor
            .pass_predictions(&zurich(), from_unix_seconds(0.0))
            .await;
        let starts: Vec<_> = batch.predictions.iter().map(|p| p.start_timestamp).collect();
        assert_eq!(starts, vec![100.0, 300.0, 500.0]);
        assert!(matches!(batch.error, Some(PredictError::EngineExit(_))));
        assert_eq!(*engine.predict_calls.lock(), 3);
    }

    #[tokio::test]
    async fn station_without_location_predicts_nothing() {
        let engine = Arc::new(ScriptedEngine::with("tle-a", vec![window(1.0, 2.0)]));
        let satellites = SatelliteDb::new(vec![satellite("a", Some("tle-a"), 437e6)]);
        let predictor = PassPredictor::new(Arc::new(satellites), engine.clone());
        let station = Station {
            lat: None,
            ..zurich()
        };
        let batch = predictor
            .pass_predictions(&station, from_unix_seconds(0.0))
            .await;
        assert!(batch.predictions.is_empty());
        assert_eq!(*engine.predict_calls.lock(), 0);
    }
}
