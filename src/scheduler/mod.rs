mod capture;
mod lease;
mod notify;
mod station_loop;
mod supervisor;
mod twiddle;

pub use lease::{CaptureLeases, LocalLeases};
pub use notify::{ChangeNotifier, PollingNotifier};
pub use supervisor::Supervisor;

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::config::SchedulerConfig;
use crate::db::{ContactDb, StationDb};
use crate::mux::StationControl;
use crate::predict::PassPredictor;

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// Receivers stream to `{stream_base_url}/{contact_id}`.
    pub stream_base_url: String,
    /// `host:port` the TNC reports decoded frames to.
    pub api_server: String,
    pub poll_interval: Duration,
    pub no_pass_wait: Duration,
    pub disabled_wait: Duration,
    pub error_wait: Duration,
    pub lookup_retry: Duration,
    pub motor_resolution_seconds: f64,
    /// Added to the pass duration to form the lease ttl.
    pub lease_margin: Duration,
    pub lease_wait: Duration,
}

impl SchedulerSettings {
    pub fn new(stream_base_url: impl Into<String>, api_server: impl Into<String>) -> Self {
        Self {
            stream_base_url: stream_base_url.into(),
            api_server: api_server.into(),
            poll_interval: Duration::from_secs(60),
            no_pass_wait: Duration::from_secs(10 * 3600),
            disabled_wait: Duration::from_secs(10 * 60),
            error_wait: Duration::from_secs(10 * 60),
            lookup_retry: Duration::from_secs(10),
            motor_resolution_seconds: 10.0,
            lease_margin: Duration::from_secs(60),
            lease_wait: Duration::from_secs(30),
        }
    }

    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self {
            poll_interval: config.poll_interval,
            ..Self::new(&config.stream_base_url, &config.api_server)
        }
    }

    pub fn stream_url(&self, contact_id: &str) -> String {
        format!(
            "{}/{}",
            self.stream_base_url.trim_end_matches('/'),
            contact_id
        )
    }
}

/// Collaborators shared by the supervisor, every station loop and capture.
pub struct SchedulerContext {
    pub stations: Arc<dyn StationDb>,
    pub contacts: Arc<dyn ContactDb>,
    pub control: Arc<dyn StationControl>,
    pub predictor: Arc<PassPredictor>,
    pub leases: Arc<dyn CaptureLeases>,
    pub notifier: Arc<dyn ChangeNotifier>,
    pub clock: Arc<dyn Clock>,
    pub settings: SchedulerSettings,
    /// Cancelled on process shutdown; running captures tear down and
    /// loops stop sleeping.
    pub shutdown: CancellationToken,
}
