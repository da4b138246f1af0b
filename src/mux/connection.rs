use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::db::StationDb;
use crate::mux::auth::authenticate_station;
use crate::mux::error::HandshakeError;
use crate::mux::proto::{Identity, StationTransport};
use crate::mux::registry::{ConnectionHandle, StationCommand, StationRegistry};

const COMMAND_QUEUE_DEPTH: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum ConnectionState {
    Connecting,
    Identifying,
    Authenticated,
    Serving,
    Closed,
}

#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    pub rpc_timeout: Duration,
    pub keepalive_interval: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            rpc_timeout: Duration::from_secs(60),
            keepalive_interval: Duration::from_secs(20 * 60),
        }
    }
}

/// Drives one inbound station connection from handshake to close.
pub struct ConnectionHandler {
    peer: String,
    registry: Arc<StationRegistry>,
    stations: Arc<dyn StationDb>,
    settings: ConnectionSettings,
    state: ConnectionState,
}

impl ConnectionHandler {
    pub fn new(
        peer: String,
        registry: Arc<StationRegistry>,
        stations: Arc<dyn StationDb>,
        settings: ConnectionSettings,
    ) -> Self {
        Self {
            peer,
            registry,
            stations,
            settings,
            state: ConnectionState::Connecting,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    fn transition(&mut self, next: ConnectionState) {
        debug!("{}: {} -> {}", self.peer, self.state, next);
        self.state = next;
    }

    /// Returns once the connection is closed. Handshake failures come back
    /// as errors; the connection never registered in that case.
    pub async fn run<S>(mut self, stream: S) -> Result<(), HandshakeError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let mut transport = StationTransport::connect(stream).await?;
        let identity = match self.handshake(&mut transport).await {
            Ok(identity) => identity,
            Err(e) => {
                self.transition(ConnectionState::Closed);
                return Err(e);
            }
        };
        self.serve(&mut transport, &identity.station_id).await;
        Ok(())
    }

    async fn handshake(
        &mut self,
        transport: &mut StationTransport,
    ) -> Result<Identity, HandshakeError> {
        self.transition(ConnectionState::Identifying);
        let identity = transport.identify(self.settings.rpc_timeout).await?;
        info!(
            "Station identified: {}, {}, {}",
            identity.station_id, identity.version, identity.client
        );

        match authenticate_station(&*self.stations, &identity.station_id, &identity.secret).await {
            Ok(true) => {
                self.transition(ConnectionState::Authenticated);
                Ok(identity)
            }
            Ok(false) => {
                warn!("{}: authentication denied", identity.station_id);
                transport
                    .disconnect("authentication denied", self.settings.rpc_timeout)
                    .await;
                Err(HandshakeError::Denied(identity.station_id))
            }
            Err(e) => {
                warn!("{}: authentication error: {}", identity.station_id, e);
                transport
                    .disconnect("internal server error", self.settings.rpc_timeout)
                    .await;
                Err(e.into())
            }
        }
    }

    async fn serve(&mut self, transport: &mut StationTransport, station_id: &str) {
        let connection_id = self.registry.next_connection_id();
        let (commands, mut inbox) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        self.registry
            .connect(
                station_id,
                ConnectionHandle {
                    connection_id,
                    commands,
                },
            )
            .await;
        self.transition(ConnectionState::Serving);
        info!("{}: serving connection {}", station_id, connection_id);

        let period = self.settings.keepalive_interval;
        let mut keepalive = interval_at(Instant::now() + period, period);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let timeout = self.settings.rpc_timeout;

        loop {
            tokio::select! {
                command = inbox.recv() => match command {
                    Some(StationCommand::Call { url, reply }) => {
                        let result = transport.call(&url, timeout).await;
                        let failure = result
                            .as_ref()
                            .err()
                            .filter(|e| e.closes_connection())
                            .map(|e| e.to_string());
                        let _ = reply.send(result);
                        if let Some(e) = failure {
                            warn!("{}: error during station RPC: {}", station_id, e);
                            break;
                        }
                    }
                    Some(StationCommand::Disconnect { done }) => {
                        transport.disconnect("disconnected by server", timeout).await;
                        self.registry.disconnect(station_id, connection_id);
                        let _ = done.send(());
                        break;
                    }
                    None => break,
                },
                _ = keepalive.tick() => {
                    if !transport.ping(timeout).await {
                        transport.disconnect("ping time out", timeout).await;
                        info!("{}: station connection timed out", station_id);
                        break;
                    }
                }
            }
        }

        self.registry.disconnect(station_id, connection_id);
        self.transition(ConnectionState::Closed);
        info!("{}: connection {} closed", station_id, connection_id);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

    use crate::mux::proto::Identity;

    /// Scripted station peer: answers Identify with `identity`, Ping with
    /// `ping_status` and everything else with 200. Records request paths.
    pub struct FakeStation {
        pub identity: Identity,
        pub ping_status: u16,
        pub requests: Arc<Mutex<Vec<String>>>,
    }

    impl FakeStation {
        pub fn new(station_id: &str, secret: &str) -> Self {
            Self {
                identity: Identity {
                    version: "1".to_string(),
                    client: "fake".to_string(),
                    station_id: station_id.to_string(),
                    secret: secret.to_string(),
                },
                ping_status: 200,
                requests: Arc::new(Mutex::new(Vec::new())),
            }
        }

        pub async fn serve<S: AsyncRead + AsyncWrite + Unpin>(self, stream: S) {
            let mut stream = BufReader::new(stream);
            loop {
                let mut request_line = String::new();
                match stream.read_line(&mut request_line).await {
                    Ok(0) | Err(_) => return,
                    Ok(_) => {}
                }
                loop {
                    let mut header = String::new();
                    match stream.read_line(&mut header).await {
                        Ok(0) | Err(_) => return,
                        Ok(_) if header.trim().is_empty() => break,
                        Ok(_) => {}
                    }
                }
                let path = request_line
                    .split_whitespace()
                    .nth(1)
                    .unwrap_or_default()
                    .to_string();
                self.requests.lock().push(path.clone());

                let (status, body) = if path == "/Identify" {
                    (200, serde_json::to_vec(&self.identity).unwrap())
                } else if path == "/Ping" {
                    (self.ping_status, Vec::new())
                } else {
                    (200, format!("ok {}", path).into_bytes())
                };
                let head = format!(
                    "HTTP/1.1 {} X\r\nContent-Length: {}\r\n\r\n",
                    status,
                    body.len()
                );
                if stream.write_all(head.as_bytes()).await.is_err()
                    || stream.write_all(&body).await.is_err()
                    || stream.flush().await.is_err()
                {
                    return;
                }
                if path.starts_with("/Disconnect") {
                    return;
                }
            }
        }
    }
}
