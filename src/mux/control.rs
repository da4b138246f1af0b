use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::mux::coordinator::{Coordinator, StationStatus};
use crate::mux::error::{ActionError, CoordinatorError};
use crate::mux::proto::{action_url, StationResponse};

/// The four coordinator operations, local or over the network.
#[async_trait]
pub trait StationControl: Send + Sync {
    async fn station_count(&self) -> Result<usize, CoordinatorError>;
    async fn station_list(&self) -> Result<Vec<String>, CoordinatorError>;
    async fn station_status(&self, station_id: &str) -> Result<StationStatus, CoordinatorError>;
    async fn station_call(
        &self,
        station_id: &str,
        url: &str,
    ) -> Result<StationResponse, CoordinatorError>;
}

#[async_trait]
impl StationControl for Coordinator {
    async fn station_count(&self) -> Result<usize, CoordinatorError> {
        Ok(Coordinator::station_count(self))
    }

    async fn station_list(&self) -> Result<Vec<String>, CoordinatorError> {
        Ok(Coordinator::station_list(self))
    }

    async fn station_status(&self, station_id: &str) -> Result<StationStatus, CoordinatorError> {
        Ok(Coordinator::station_status(self, station_id))
    }

    async fn station_call(
        &self,
        station_id: &str,
        url: &str,
    ) -> Result<StationResponse, CoordinatorError> {
        Coordinator::station_call(self, station_id, url).await
    }
}

/// Rotator setpoint at an absolute Unix time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotorCoordinate {
    pub timestamp: f64,
    pub azimuth_degrees: f64,
    pub elevation_degrees: f64,
}

const RECEIVER_SET_FREQUENCY: &str = "ReceiverSetFrequency";
const RECEIVER_START: &str = "ReceiverStart";
const RECEIVER_STOP: &str = "ReceiverStop";
const TNC_START: &str = "TNCStart";
const TNC_STOP: &str = "TNCStop";
const MOTOR_START: &str = "MotorStart";
const MOTOR_STOP: &str = "MotorStop";

/// Typed hardware actions for one station.
pub struct StationActions<'a> {
    control: &'a dyn StationControl,
    station_id: &'a str,
}

impl<'a> StationActions<'a> {
    pub fn new(control: &'a dyn StationControl, station_id: &'a str) -> Self {
        Self {
            control,
            station_id,
        }
    }

    async fn call_checked(
        &self,
        action: &'static str,
        params: &[(&str, &str)],
    ) -> Result<(), ActionError> {
        let url = action_url(action, params);
        let response = self.control.station_call(self.station_id, &url).await?;
        if response.status_code != 200 {
            return Err(ActionError::Status {
                action,
                code: response.status_code,
            });
        }
        Ok(())
    }

    pub async fn receiver_set_frequency(&self, hz: i64) -> Result<(), ActionError> {
        let hz = hz.to_string();
        self.call_checked(RECEIVER_SET_FREQUENCY, &[("hz", hz.as_str())])
            .await
    }

    pub async fn receiver_start(&self, stream_url: &str) -> Result<(), ActionError> {
        self.call_checked(RECEIVER_START, &[("stream_url", stream_url)])
            .await
    }

    pub async fn receiver_stop(&self) -> Result<(), ActionError> {
        self.call_checked(RECEIVER_STOP, &[]).await
    }

    pub async fn tnc_start(&self, api_server: &str, satellite_id: &str) -> Result<(), ActionError> {
        let (host, port) = split_host_port(api_server)?;
        self.call_checked(
            TNC_START,
            &[
                ("api_host", host),
                ("api_port", port),
                ("satellite_id", satellite_id),
            ],
        )
        .await
    }

    pub async fn tnc_stop(&self) -> Result<(), ActionError> {
        self.call_checked(TNC_STOP, &[]).await
    }

    /// Sends the program with times relative to `now` (whole seconds).
    pub async fn motor_start(
        &self,
        program: &[MotorCoordinate],
        now: DateTime<Utc>,
    ) -> Result<(), ActionError> {
        let encoded = encode_motor_program(program, now)?;
        self.call_checked(MOTOR_START, &[("program", encoded.as_str())])
            .await
    }

    pub async fn motor_stop(&self) -> Result<(), ActionError> {
        self.call_checked(MOTOR_STOP, &[]).await
    }
}

pub fn encode_motor_program(
    program: &[MotorCoordinate],
    now: DateTime<Utc>,
) -> Result<String, ActionError> {
    if program.is_empty() {
        return Err(ActionError::EmptyMotorProgram);
    }
    let start = now.timestamp() as f64;
    let coords: Vec<[f64; 3]> = program
        .iter()
        .map(|c| [c.timestamp - start, c.azimuth_degrees, c.elevation_degrees])
        .collect();
    Ok(serde_json::to_string(&coords)?)
}

/// Splits `host:port` at the first colon.
pub fn split_host_port(server: &str) -> Result<(&str, &str), ActionError> {
    server
        .split_once(':')
        .ok_or_else(|| ActionError::InvalidApiServer(server.to_string()))
}

#[cfg(test)]
pub(crate) mod testing {
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashSet;

    use super::StationControl;
    use crate::mux::coordinator::StationStatus;
    use crate::mux::error::CoordinatorError;
    use crate::mux::proto::StationResponse;

    /// Records every call; actions listed in `failing` answer 500 and
    /// stations outside `online` are not connected.
    #[derive(Default)]
    pub struct RecordingControl {
        pub calls: Mutex<Vec<(String, String)>>,
        pub online: Mutex<Vec<String>>,
        pub failing: Mutex<HashSet<String>>,
    }

    impl RecordingControl {
        pub fn online(ids: &[&str]) -> Self {
            let control = Self::default();
            *control.online.lock() = ids.iter().map(|s| s.to_string()).collect();
            control
        }

        /// Action names in call order, without query strings.
        pub fn actions(&self) -> Vec<String> {
            self.calls
                .lock()
                .iter()
                .map(|(_, url)| {
                    url.trim_start_matches('/')
                        .split('?')
                        .next()
                        .unwrap_or_default()
                        .to_string()
                })
                .collect()
        }
    }

    #[async_trait]
    impl StationControl for RecordingControl {
        async fn station_count(&self) -> Result<usize, CoordinatorError> {
            Ok(self.online.lock().len())
        }

        async fn station_list(&self) -> Result<Vec<String>, CoordinatorError> {
            Ok(self.online.lock().clone())
        }

        async fn station_status(&self, station_id: &str) -> Result<StationStatus, CoordinatorError> {
            Ok(StationStatus {
                is_connected: self.online.lock().iter().any(|id| id == station_id),
            })
        }

        async fn station_call(
            &self,
            station_id: &str,
            url: &str,
        ) -> Result<StationResponse, CoordinatorError> {
            self.calls
                .lock()
                .push((station_id.to_string(), url.to_string()));
            let action = url.trim_start_matches('/').split('?').next().unwrap_or_default();
            let status_code = if self.failing.lock().contains(action) {
                500
            } else {
                200
            };
            Ok(StationResponse {
                status_code,
                data: Vec::new(),
            })
        }
    }
}
