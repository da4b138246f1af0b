use std::time::Duration;
use thiserror::Error;

use crate::db::StorageError;

/// Failure of one request/response exchange on a station connection.
#[derive(Debug, Error)]
pub enum StationRpcError {
    #[error("transport error: {0}")]
    Http(#[from] hyper::Error),
    #[error("invalid request URL {0}")]
    InvalidUrl(String),
    #[error("station did not answer within {0:?}")]
    Timeout(Duration),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("response body exceeds {0} bytes")]
    BodyTooLarge(usize),
    #[error("connection closed by station")]
    ConnectionClosed,
}

impl StationRpcError {
    pub(crate) fn from_hyper(e: hyper::Error) -> Self {
        let eof = std::error::Error::source(&e)
            .and_then(|source| source.downcast_ref::<std::io::Error>())
            .is_some_and(|io| io.kind() == std::io::ErrorKind::UnexpectedEof);
        if e.is_parse() {
            StationRpcError::MalformedResponse(e.to_string())
        } else if eof || e.is_closed() || e.is_canceled() || e.is_incomplete_message() {
            StationRpcError::ConnectionClosed
        } else {
            StationRpcError::Http(e)
        }
    }

    /// False for errors raised before anything reached the station.
    pub fn closes_connection(&self) -> bool {
        !matches!(self, StationRpcError::InvalidUrl(_))
    }
}

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error(transparent)]
    Rpc(#[from] StationRpcError),
    #[error("Identify returned status {0}")]
    Status(u16),
    #[error("bad Identify payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("authentication denied for station {0}")]
    Denied(String),
    #[error("station store error: {0}")]
    Store(#[from] StorageError),
}

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("station RPC error: {0} not connected")]
    NotConnected(String),
    #[error("station RPC error: {station_id}: {reason}")]
    StationRpc { station_id: String, reason: String },
    #[error("coordinator transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("coordinator API error {status}: {message}")]
    Api { status: u16, message: String },
}

#[derive(Debug, Error)]
pub enum ActionError {
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),
    #[error("{action} returned status {code}")]
    Status { action: &'static str, code: u16 },
    #[error("empty motor program")]
    EmptyMotorProgram,
    #[error("motor program encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("invalid API server address {0:?}")]
    InvalidApiServer(String),
}

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("{path}: {source}")]
    Pem {
        path: String,
        source: tokio_rustls::rustls::pki_types::pem::Error,
    },
    #[error("{0}: no certificates found")]
    NoCertificates(String),
    #[error("TLS configuration: {0}")]
    Config(#[from] tokio_rustls::rustls::Error),
}
