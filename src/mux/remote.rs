use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use crate::mux::control::StationControl;
use crate::mux::coordinator::{
    StationCallRequest, StationCallResponse, StationCountResponse, StationListResponse,
    StationStatus,
};
use crate::mux::error::CoordinatorError;
use crate::mux::proto::StationResponse;

pub const STATION_RPC_ERROR: &str = "station_rpc_error";

#[derive(Deserialize)]
struct ApiErrorBody {
    error: String,
    #[serde(default)]
    message: Option<String>,
}

/// `StationControl` over the coordinator's HTTP API.
pub struct RemoteCoordinator {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl RemoteCoordinator {
    /// `timeout` bounds each HTTP request and should exceed the coordinator's
    /// per-RPC timeout.
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, CoordinatorError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/coordinator{}", self.base_url, path)
    }

    fn station_path(station_id: &str, action: &str) -> String {
        format!("/stations/{}/{}", urlencoding::encode(station_id), action)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, CoordinatorError> {
        let response = self.authorize(self.client.get(self.url(path))).send().await?;
        decode(response, None).await
    }
}

async fn decode<T: DeserializeOwned>(
    response: reqwest::Response,
    station_id: Option<&str>,
) -> Result<T, CoordinatorError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }

    let body = response.text().await.unwrap_or_default();
    let (error, message) = match serde_json::from_str::<ApiErrorBody>(&body) {
        Ok(parsed) => (parsed.error, parsed.message.unwrap_or_default()),
        Err(_) => (String::new(), body),
    };

    match station_id {
        Some(station_id) if error == STATION_RPC_ERROR => Err(CoordinatorError::StationRpc {
            station_id: station_id.to_string(),
            reason: message,
        }),
        _ => Err(CoordinatorError::Api {
            status: status.as_u16(),
            message: if message.is_empty() { error } else { message },
        }),
    }
}

#[async_trait]
impl StationControl for RemoteCoordinator {
    async fn station_count(&self) -> Result<usize, CoordinatorError> {
        let response: StationCountResponse = self.get("/stations/count").await?;
        Ok(response.count)
    }

    async fn station_list(&self) -> Result<Vec<String>, CoordinatorError> {
        let response: StationListResponse = self.get("/stations").await?;
        Ok(response.station_ids)
    }

    async fn station_status(&self, station_id: &str) -> Result<StationStatus, CoordinatorError> {
        self.get(&Self::station_path(station_id, "status")).await
    }

    async fn station_call(
        &self,
        station_id: &str,
        url: &str,
    ) -> Result<StationResponse, CoordinatorError> {
        let request = self
            .client
            .post(self.url(&Self::station_path(station_id, "call")))
            .json(&StationCallRequest {
                url: url.to_string(),
            });
        let response = self.authorize(request).send().await?;
        let response: StationCallResponse = decode(response, Some(station_id)).await?;
        Ok(response.into())
    }
}
