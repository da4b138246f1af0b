use chrono::{DateTime, TimeZone, Utc};
use std::time::Duration;

/// Source of wall-clock time for the scheduler.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Wall clock anchored once and advanced by the tokio timer.
///
/// Follows `tokio::time::pause`, which lets tests sleep through hours of
/// schedule instantly while timestamps still move forward.
#[cfg(test)]
pub struct MonotonicClock {
    origin_wall: DateTime<Utc>,
    origin: tokio::time::Instant,
}

#[cfg(test)]
impl MonotonicClock {
    pub fn new(origin_wall: DateTime<Utc>) -> Self {
        Self {
            origin_wall,
            origin: tokio::time::Instant::now(),
        }
    }
}

#[cfg(test)]
impl Clock for MonotonicClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = tokio::time::Instant::now() - self.origin;
        self.origin_wall + chrono::Duration::from_std(elapsed).unwrap_or_default()
    }
}

pub fn unix_seconds(t: DateTime<Utc>) -> f64 {
    t.timestamp_millis() as f64 / 1000.0
}

pub fn from_unix_seconds(seconds: f64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt((seconds * 1000.0).round() as i64)
        .single()
        .unwrap_or_default()
}

/// Time left until `target`, zero if it already passed.
pub fn until(clock: &dyn Clock, target: DateTime<Utc>) -> Duration {
    (target - clock.now()).to_std().unwrap_or(Duration::ZERO)
}
