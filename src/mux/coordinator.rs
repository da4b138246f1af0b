use log::info;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::oneshot;
use utoipa::ToSchema;

use crate::mux::error::CoordinatorError;
use crate::mux::proto::StationResponse;
use crate::mux::registry::{StationCommand, StationRegistry};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StationCountResponse {
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StationListResponse {
    pub station_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StationStatus {
    pub is_connected: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StationCallRequest {
    /// Path and query sent to the station, e.g. `/ReceiverStop`.
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StationCallResponse {
    pub status_code: u16,
    pub data: Vec<u8>,
}

impl From<StationResponse> for StationCallResponse {
    fn from(response: StationResponse) -> Self {
        Self {
            status_code: response.status_code,
            data: response.data,
        }
    }
}

impl From<StationCallResponse> for StationResponse {
    fn from(response: StationCallResponse) -> Self {
        Self {
            status_code: response.status_code,
            data: response.data,
        }
    }
}

/// Control plane over the live station connections.
pub struct Coordinator {
    registry: Arc<StationRegistry>,
}

impl Coordinator {
    pub fn new(registry: Arc<StationRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<StationRegistry> {
        &self.registry
    }

    pub fn station_count(&self) -> usize {
        self.registry.count()
    }

    pub fn station_list(&self) -> Vec<String> {
        self.registry.list_ids()
    }

    pub fn station_status(&self, station_id: &str) -> StationStatus {
        StationStatus {
            is_connected: self.registry.is_connected(station_id),
        }
    }

    /// Queues `url` on the station's connection and waits for its answer.
    /// Fails straight away when the station is not connected.
    pub async fn station_call(
        &self,
        station_id: &str,
        url: &str,
    ) -> Result<StationResponse, CoordinatorError> {
        let Some(sender) = self.registry.sender(station_id) else {
            info!("{}: no such station connected", station_id);
            return Err(CoordinatorError::NotConnected(station_id.to_string()));
        };

        let rpc_error = |reason: String| CoordinatorError::StationRpc {
            station_id: station_id.to_string(),
            reason,
        };

        let (reply, answer) = oneshot::channel();
        sender
            .send(StationCommand::Call {
                url: url.to_string(),
                reply,
            })
            .await
            .map_err(|_| rpc_error("connection closed".to_string()))?;

        answer
            .await
            .map_err(|_| rpc_error("connection closed".to_string()))?
            .map_err(|e| rpc_error(e.to_string()))
    }
}
