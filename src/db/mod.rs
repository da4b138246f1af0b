mod error;
mod file;
#[cfg(test)]
mod memory;
mod satellites;
mod types;

use async_trait::async_trait;

pub use error::StorageError;
pub use file::FileStore;
#[cfg(test)]
pub use memory::MemoryStore;
pub use satellites::SatelliteDb;
pub use types::{AzElLimits, Capabilities, Channel, Contact, Satellite, Station};

#[async_trait]
pub trait StationDb: Send + Sync {
    async fn lookup(&self, id: &str) -> Result<Option<Station>, StorageError>;
    async fn store(&self, station: &Station) -> Result<(), StorageError>;
    async fn all_stations(&self) -> Result<Vec<Station>, StorageError>;
}

#[async_trait]
pub trait ContactDb: Send + Sync {
    async fn store(&self, contact: &Contact) -> Result<(), StorageError>;
    async fn lookup(&self, id: &str) -> Result<Option<Contact>, StorageError>;

    /// Writes `contact` if the stored version still matches its own, then
    /// bumps the version on both sides.
    async fn update(&self, contact: &mut Contact) -> Result<(), StorageError>;
}
