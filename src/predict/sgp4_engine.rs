use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::clock::{from_unix_seconds, unix_seconds};
use crate::predict::bands::VisibilityLimits;
use crate::predict::engine::{sample_count, GeometryEngine};
use crate::predict::error::PredictError;
use crate::predict::ground_station::GroundStation;
use crate::predict::propagation::{observe, round2, sat_point};
use crate::predict::tle::OrbitModel;
use crate::predict::types::{PassWindow, SatPoint};

const COARSE_STEP_SECONDS: f64 = 60.0;
const FINE_RESOLUTION_SECONDS: f64 = 1.0;

/// In-process SGP4 propagation.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sgp4Engine;

#[async_trait]
impl GeometryEngine for Sgp4Engine {
    async fn predict(
        &self,
        begin: DateTime<Utc>,
        duration: Duration,
        station: &GroundStation,
        limits: &VisibilityLimits,
        tle: &str,
    ) -> Result<Vec<PassWindow>, PredictError> {
        let station = *station;
        let limits = *limits;
        let tle = tle.to_string();
        tokio::task::spawn_blocking(move || {
            let model = OrbitModel::from_tle(&tle)?;
            PassSearch {
                station: &station,
                model: &model,
                limits: &limits,
            }
            .find_passes(unix_seconds(begin), duration.as_secs_f64())
        })
        .await
        .map_err(|e| PredictError::Propagation(e.to_string()))?
    }

    async fn pass_details(
        &self,
        begin: DateTime<Utc>,
        duration: Duration,
        station: &GroundStation,
        tle: &str,
        resolution_seconds: f64,
    ) -> Result<Vec<SatPoint>, PredictError> {
        let model = OrbitModel::from_tle(tle)?;
        let begin_ts = unix_seconds(begin);
        (0..sample_count(duration, resolution_seconds))
            .map(|i| {
                let t = begin_ts + i as f64 * resolution_seconds;
                sat_point(station, &model, from_unix_seconds(t))
            })
            .collect()
    }
}

struct PassSearch<'a> {
    station: &'a GroundStation,
    model: &'a OrbitModel,
    limits: &'a VisibilityLimits,
}

impl PassSearch<'_> {
    fn look(&self, t: f64) -> Result<(f64, f64), PredictError> {
        let obs = observe(self.station, self.model, from_unix_seconds(t))?;
        Ok((obs.azimuth_deg, obs.elevation_deg))
    }

    fn visible_at(&self, t: f64) -> Result<bool, PredictError> {
        let (az, el) = self.look(t)?;
        Ok(self.limits.contains(az, el))
    }

    /// Scans at a coarse step and refines every visibility change. A pass
    /// still open when the window ends is closed at the last scanned step.
    fn find_passes(&self, begin: f64, seconds: f64) -> Result<Vec<PassWindow>, PredictError> {
        let mut passes = Vec::new();
        let mut open: Option<(f64, f64)> = None;
        let steps = (seconds / COARSE_STEP_SECONDS).ceil() as i64;
        let mut t = begin;

        for i in 1..=steps {
            let t_last = begin + (i - 1) as f64 * COARSE_STEP_SECONDS;
            t = begin + i as f64 * COARSE_STEP_SECONDS;
            let visible = self.visible_at(t)?;

            match open {
                None if visible => {
                    open = Some(self.find_transition(t_last, t)?);
                }
                Some((start, start_az)) if !visible => {
                    let (end, end_az) = self.find_transition(t_last, t)?;
                    passes.push(PassWindow {
                        start_timestamp: start,
                        end_timestamp: end,
                        start_azimuth_degrees: round2(start_az),
                        end_azimuth_degrees: round2(end_az),
                        max_elevation_degrees: round2(self.max_elevation(start, end)?),
                    });
                    open = None;
                }
                _ => {}
            }
        }

        if let Some((start, start_az)) = open {
            let (end_az, _) = self.look(t)?;
            passes.push(PassWindow {
                start_timestamp: start,
                end_timestamp: t,
                start_azimuth_degrees: round2(start_az),
                end_azimuth_degrees: round2(end_az),
                max_elevation_degrees: round2(self.max_elevation(start, t)?),
            });
        }

        Ok(passes)
    }

    /// Bisects down to one second. When both ends agree the lower bound is
    /// returned, which is how a pass already in progress at `begin` opens.
    fn find_transition(&self, mut lower: f64, mut upper: f64) -> Result<(f64, f64), PredictError> {
        let v_lower = self.visible_at(lower)?;
        if v_lower == self.visible_at(upper)? {
            let (az, _) = self.look(lower)?;
            return Ok((lower, az));
        }

        while upper - lower > FINE_RESOLUTION_SECONDS {
            let mid = 0.5 * (lower + upper);
            if self.visible_at(mid)? == v_lower {
                lower = mid;
            } else {
                upper = mid;
            }
        }

        let (az, _) = self.look(upper)?;
        Ok((upper, az))
    }

    /// Elevation is unimodal across a pass; ternary search to one second.
    fn max_elevation(&self, mut lower: f64, mut upper: f64) -> Result<f64, PredictError> {
        while upper - lower > FINE_RESOLUTION_SECONDS {
            let dt = upper - lower;
            let t1 = lower + 0.3 * dt;
            let t2 = lower + 0.7 * dt;
            let (_, e1) = self.look(t1)?;
            let (_, e2) = self.look(t2)?;
            if e1 > e2 {
                upper = t2;
            } else {
                lower = t1;
            }
        }
        Ok(self.look(lower)?.1)
    }
}
