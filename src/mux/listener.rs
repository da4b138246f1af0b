use log::{error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;

use crate::db::StationDb;
use crate::mux::connection::{ConnectionHandler, ConnectionSettings};
use crate::mux::registry::StationRegistry;

/// Accepts station connections until `shutdown` fires, one handler task per
/// connection. With `tls` set every stream is wrapped before the handshake.
pub async fn run_listener(
    listener: TcpListener,
    registry: Arc<StationRegistry>,
    stations: Arc<dyn StationDb>,
    settings: ConnectionSettings,
    tls: Option<TlsAcceptor>,
    shutdown: CancellationToken,
) {
    if let Ok(addr) = listener.local_addr() {
        let scheme = if tls.is_some() { "TLS" } else { "plain TCP" };
        info!("Listening for stations on {} ({})", addr, scheme);
    }

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    info!("Station connected from {}", peer);
                    let _ = stream.set_nodelay(true);
                    let handler = ConnectionHandler::new(
                        peer.to_string(),
                        registry.clone(),
                        stations.clone(),
                        settings,
                    );
                    tokio::spawn(serve_connection(
                        handler,
                        stream,
                        peer,
                        tls.clone(),
                        settings.rpc_timeout,
                    ));
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            },
        }
    }

    info!("Station listener stopped");
}

async fn serve_connection(
    handler: ConnectionHandler,
    stream: TcpStream,
    peer: SocketAddr,
    tls: Option<TlsAcceptor>,
    timeout: Duration,
) {
    let result = match tls {
        Some(acceptor) => match tokio::time::timeout(timeout, acceptor.accept(stream)).await {
            Ok(Ok(stream)) => handler.run(stream).await,
            Ok(Err(e)) => {
                warn!("{}: TLS handshake failed: {}", peer, e);
                return;
            }
            Err(_) => {
                warn!("{}: TLS handshake timed out", peer);
                return;
            }
        },
        None => handler.run(stream).await,
    };
    if let Err(e) = result {
        warn!("{}: handshake failed: {}", peer, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryStore, Station};
    use crate::mux::connection::testing::FakeStation;
    use crate::mux::tls::{load_acceptor, testing::self_signed};
    use tokio_rustls::rustls::crypto::ring;
    use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName};
    use tokio_rustls::rustls::{ClientConfig, RootCertStore};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio_rustls::TlsConnector;

    fn stations() -> Arc<dyn StationDb> {
        Arc::new(MemoryStore::with_stations([Station {
            id: "st".to_string(),
            secret: "s".to_string(),
            user_id: "u".to_string(),
            name: None,
            lat: None,
            lng: None,
            elevation: None,
            capabilities: None,
            scheduler_enabled: false,
        }]))
    }

    async fn start(
        tls: Option<TlsAcceptor>,
    ) -> (
        SocketAddr,
        Arc<StationRegistry>,
        CancellationToken,
        tokio::task::JoinHandle<()>,
    ) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let registry = Arc::new(StationRegistry::new());
        let shutdown = CancellationToken::new();
        let server = tokio::spawn(run_listener(
            listener,
            registry.clone(),
            stations(),
            ConnectionSettings::default(),
            tls,
            shutdown.clone(),
        ));
        (addr, registry, shutdown, server)
    }

    async fn wait_registered(registry: &StationRegistry) {
        while !registry.is_connected("st") {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn tcp_station_registers() {
        let (addr, registry, shutdown, server) = start(None).await;

        let stream = TcpStream::connect(addr).await.unwrap();
        tokio::spawn(FakeStation::new("st", "s").serve(stream));

        wait_registered(&registry).await;
        shutdown.cancel();
        server.await.unwrap();
        assert_eq!(registry.list_ids(), vec!["st"]);
    }

    #[tokio::test]
    async fn tls_station_registers() {
        let cert = self_signed();
        let acceptor = load_acceptor(&cert.cert_file, &cert.key_file).unwrap();
        let (addr, registry, shutdown, server) = start(Some(acceptor)).await;

        let mut roots = RootCertStore::empty();
        roots
            .add(CertificateDer::from(cert.cert_der.clone()))
            .unwrap();
        let client = ClientConfig::builder_with_provider(Arc::new(ring::default_provider()))
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_root_certificates(roots)
            .with_no_client_auth();
        let connector = TlsConnector::from(Arc::new(client));

        let tcp = TcpStream::connect(addr).await.unwrap();
        let stream = connector
            .connect(ServerName::try_from("localhost").unwrap(), tcp)
            .await
            .unwrap();
        tokio::spawn(FakeStation::new("st", "s").serve(stream));

        wait_registered(&registry).await;
        shutdown.cancel();
        server.await.unwrap();
        assert_eq!(registry.list_ids(), vec!["st"]);
    }

    #[tokio::test]
    async fn plaintext_client_never_reaches_a_tls_listener() {
        let cert = self_signed();
        let acceptor = load_acceptor(&cert.cert_file, &cert.key_file).unwrap();
        let (addr, registry, shutdown, server) = start(Some(acceptor)).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n")
            .await
            .unwrap();
        let mut rest = Vec::new();
        let closed =
            tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut rest)).await;
        assert!(closed.is_ok(), "listener should drop the connection");

        shutdown.cancel();
        server.await.unwrap();
        assert_eq!(registry.count(), 0);
    }
}
