use log::{info, warn};
use parking_lot::RwLock;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, oneshot};

use crate::mux::error::StationRpcError;
use crate::mux::proto::StationResponse;

pub enum StationCommand {
    Call {
        url: String,
        reply: oneshot::Sender<Result<StationResponse, StationRpcError>>,
    },
    /// Tells the handler to say goodbye to the station and exit. `done` fires
    /// once it has deregistered.
    Disconnect { done: oneshot::Sender<()> },
}

#[derive(Clone)]
pub struct ConnectionHandle {
    pub connection_id: u64,
    pub commands: mpsc::Sender<StationCommand>,
}

/// Live station connections keyed by station id. The lock is never held
/// across an await.
#[derive(Default)]
pub struct StationRegistry {
    stations: RwLock<HashMap<String, ConnectionHandle>>,
    next_connection_id: AtomicU64,
}

impl StationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_connection_id(&self) -> u64 {
        self.next_connection_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Registers `handle`, first kicking any connection already registered
    /// under the same id and waiting for it to go away.
    pub async fn connect(&self, station_id: &str, handle: ConnectionHandle) {
        loop {
            let existing = self.stations.read().get(station_id).cloned();
            if let Some(existing) = existing {
                info!(
                    "{}: disconnecting duplicate connection {}",
                    station_id, existing.connection_id
                );
                let (done, acked) = oneshot::channel();
                if existing
                    .commands
                    .send(StationCommand::Disconnect { done })
                    .await
                    .is_ok()
                {
                    let _ = acked.await;
                }
                self.disconnect(station_id, existing.connection_id);
            }

            let mut stations = self.stations.write();
            match stations.entry(station_id.to_string()) {
                Entry::Vacant(slot) => {
                    slot.insert(handle);
                    return;
                }
                Entry::Occupied(_) => {
                    warn!("{}: another connection registered first, retrying", station_id);
                }
            }
        }
    }

    /// Removes the entry only if it still belongs to `connection_id`.
    pub fn disconnect(&self, station_id: &str, connection_id: u64) -> bool {
        let mut stations = self.stations.write();
        match stations.get(station_id) {
            Some(handle) if handle.connection_id == connection_id => {
                stations.remove(station_id);
                true
            }
            _ => false,
        }
    }

    pub fn is_connected(&self, station_id: &str) -> bool {
        self.stations.read().contains_key(station_id)
    }

    pub fn count(&self) -> usize {
        self.stations.read().len()
    }

    pub fn list_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.stations.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn sender(&self, station_id: &str) -> Option<mpsc::Sender<StationCommand>> {
        self.stations
            .read()
            .get(station_id)
            .map(|handle| handle.commands.clone())
    }
}
