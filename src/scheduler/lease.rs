use async_trait::async_trait;
use log::warn;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Debug, Error)]
pub enum LeaseError {
    #[error("capture lease for {station_id} still held after {waited:?}")]
    Busy {
        station_id: String,
        waited: Duration,
    },
    #[error("capture lease for {0} expired or was taken over")]
    Lost(String),
}

/// Exclusive right to drive one station's hardware until `expires_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub station_id: String,
    pub token: u64,
    pub expires_at: Instant,
}

/// Per-station capture exclusion. An expired lease can be taken by anyone,
/// so a crashed holder blocks the station for at most its ttl.
#[async_trait]
pub trait CaptureLeases: Send + Sync {
    async fn acquire(
        &self,
        station_id: &str,
        ttl: Duration,
        wait: Duration,
    ) -> Result<Lease, LeaseError>;

    async fn release(&self, lease: Lease) -> Result<(), LeaseError>;
}

/// Leases held in this process.
#[derive(Default)]
pub struct LocalLeases {
    held: Mutex<HashMap<String, (u64, Instant)>>,
    next_token: AtomicU64,
    released: Notify,
}

impl LocalLeases {
    pub fn new() -> Self {
        Self::default()
    }

    fn try_take(&self, station_id: &str, ttl: Duration) -> Result<Lease, Instant> {
        let now = Instant::now();
        let mut held = self.held.lock();
        if let Some((_, expires_at)) = held.get(station_id) {
            if *expires_at > now {
                return Err(*expires_at);
            }
        }
        let token = self.next_token.fetch_add(1, Ordering::Relaxed) + 1;
        let expires_at = now + ttl;
        held.insert(station_id.to_string(), (token, expires_at));
        Ok(Lease {
            station_id: station_id.to_string(),
            token,
            expires_at,
        })
    }
}

#[async_trait]
impl CaptureLeases for LocalLeases {
    async fn acquire(
        &self,
        station_id: &str,
        ttl: Duration,
        wait: Duration,
    ) -> Result<Lease, LeaseError> {
        let deadline = Instant::now() + wait;
        loop {
            let released = self.released.notified();
            let held_until = match self.try_take(station_id, ttl) {
                Ok(lease) => return Ok(lease),
                Err(expires_at) => expires_at,
            };
            if Instant::now() >= deadline {
                return Err(LeaseError::Busy {
                    station_id: station_id.to_string(),
                    waited: wait,
                });
            }
            tokio::select! {
                _ = released => {}
                _ = tokio::time::sleep_until(held_until.min(deadline)) => {}
            }
        }
    }

    async fn release(&self, lease: Lease) -> Result<(), LeaseError> {
        if lease.expires_at < Instant::now() {
            warn!("{}: capture outlived its lease", lease.station_id);
        }
        let removed = {
            let mut held = self.held.lock();
            match held.get(&lease.station_id) {
                Some((token, _)) if *token == lease.token => {
                    held.remove(&lease.station_id);
                    true
                }
                _ => false,
            }
        };
        if !removed {
            return Err(LeaseError::Lost(lease.station_id));
        }
        self.released.notify_waiters();
        Ok(())
    }
}
