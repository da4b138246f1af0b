use bytes::Bytes;
use http_body_util::{BodyExt, Empty, LengthLimitError, Limited};
use hyper::client::conn::http1::{self, SendRequest};
use hyper::header::{HOST, USER_AGENT};
use hyper::Request;
use hyper_util::rt::TokioIo;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;

use crate::mux::error::{HandshakeError, StationRpcError};

pub const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationResponse {
    pub status_code: u16,
    pub data: Vec<u8>,
}

/// Payload of the station's answer to `/Identify`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(rename = "Version", default)]
    pub version: String,
    #[serde(rename = "Client", default)]
    pub client: String,
    #[serde(rename = "Station_id")]
    pub station_id: String,
    #[serde(rename = "Secret")]
    pub secret: String,
}

/// `/{action}?{params}` with every key and value percent-encoded.
pub fn action_url(action: &str, params: &[(&str, &str)]) -> String {
    let mut url = format!("/{}", action);
    for (i, (key, value)) in params.iter().enumerate() {
        url.push(if i == 0 { '?' } else { '&' });
        url.push_str(&urlencoding::encode(key));
        url.push('=');
        url.push_str(&urlencoding::encode(value));
    }
    url
}

/// Client side of the HTTP/1.1 exchange carried over a station-initiated
/// connection. The coordinator sends requests, the station answers.
pub struct StationTransport {
    sender: Option<SendRequest<Empty<Bytes>>>,
    connection: Option<JoinHandle<()>>,
}

impl StationTransport {
    pub async fn connect<S>(stream: S) -> Result<Self, StationRpcError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (sender, connection) = http1::handshake(TokioIo::new(stream))
            .await
            .map_err(StationRpcError::from_hyper)?;
        let connection = tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!("Station connection ended: {}", e);
            }
        });
        Ok(Self {
            sender: Some(sender),
            connection: Some(connection),
        })
    }

    pub async fn call(
        &mut self,
        url: &str,
        timeout: Duration,
    ) -> Result<StationResponse, StationRpcError> {
        tokio::time::timeout(timeout, self.exchange(url))
            .await
            .map_err(|_| StationRpcError::Timeout(timeout))?
    }

    pub async fn identify(&mut self, timeout: Duration) -> Result<Identity, HandshakeError> {
        let response = self.call("/Identify", timeout).await?;
        if response.status_code != 200 {
            return Err(HandshakeError::Status(response.status_code));
        }
        let identity: Identity = serde_json::from_slice(&response.data)?;

        let raw = String::from_utf8_lossy(&response.data);
        let masked = if identity.secret.is_empty() {
            raw.into_owned()
        } else {
            raw.replace(&identity.secret, "SECRET")
        };
        info!("Identify info: {}", masked);

        Ok(identity)
    }

    pub async fn ping(&mut self, timeout: Duration) -> bool {
        match self.call("/Ping", timeout).await {
            Ok(response) if response.status_code == 200 => true,
            Ok(response) => {
                info!("Ping error code: {}", response.status_code);
                false
            }
            Err(e) => {
                info!("Ping failed: {}", e);
                false
            }
        }
    }

    /// Best effort; the outcome is only logged. Later calls fail with
    /// `ConnectionClosed`.
    pub async fn disconnect(&mut self, reason: &str, timeout: Duration) {
        info!("Disconnecting station because: {}", reason);
        let url = action_url("Disconnect", &[("reason", reason)]);
        if let Err(e) = self.call(&url, timeout).await {
            debug!("Disconnect request failed: {}", e);
        }
        // Without a sender the connection shuts the stream down.
        self.sender = None;
        if let Some(connection) = self.connection.take() {
            if tokio::time::timeout(timeout, connection).await.is_err() {
                debug!("Station connection did not close within {:?}", timeout);
            }
        }
    }

    async fn exchange(&mut self, url: &str) -> Result<StationResponse, StationRpcError> {
        let sender = self
            .sender
            .as_mut()
            .ok_or(StationRpcError::ConnectionClosed)?;
        let request = Request::get(url)
            .header(HOST, "station")
            .header(USER_AGENT, "carp-mux")
            .body(Empty::new())
            .map_err(|e| StationRpcError::InvalidUrl(format!("{:?}: {}", url, e)))?;

        sender.ready().await.map_err(StationRpcError::from_hyper)?;
        let response = sender
            .send_request(request)
            .await
            .map_err(StationRpcError::from_hyper)?;
        let status_code = response.status().as_u16();

        let body = Limited::new(response.into_body(), MAX_BODY_BYTES)
            .collect()
            .await
            .map_err(|e| {
                if e.is::<LengthLimitError>() {
                    return StationRpcError::BodyTooLarge(MAX_BODY_BYTES);
                }
                match e.downcast::<hyper::Error>() {
                    Ok(e) => StationRpcError::from_hyper(*e),
                    Err(e) => StationRpcError::MalformedResponse(e.to_string()),
                }
            })?;

        Ok(StationResponse {
            status_code,
            data: body.to_bytes().to_vec(),
        })
    }
}
