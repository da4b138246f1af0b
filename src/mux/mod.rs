mod auth;
mod connection;
mod control;
mod coordinator;
mod error;
mod listener;
mod proto;
mod registry;
mod remote;
mod tls;

pub use connection::ConnectionSettings;
pub use control::{MotorCoordinate, StationActions, StationControl};
pub use coordinator::{
    Coordinator, StationCallRequest, StationCallResponse, StationCountResponse,
    StationListResponse, StationStatus,
};
pub use error::{ActionError, CoordinatorError, TlsError};
pub use listener::run_listener;
pub use registry::StationRegistry;
pub use remote::{RemoteCoordinator, STATION_RPC_ERROR};
pub use tls::load_acceptor;

#[cfg(test)]
pub(crate) use connection::{testing::FakeStation, ConnectionHandler};
#[cfg(test)]
pub(crate) use control::testing;
