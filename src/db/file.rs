use async_trait::async_trait;
use log::error;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use super::{Contact, ContactDb, Station, StationDb, StorageError};

const STATIONS_FOLDER: &str = "stations";
const CONTACTS_FOLDER: &str = "contacts";

/// Stations and contacts as one YAML file per record under `base`.
pub struct FileStore {
    base: PathBuf,
    update_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(base: PathBuf) -> Self {
        FileStore {
            base,
            update_lock: Mutex::new(()),
        }
    }

    fn record_path(&self, folder: &str, id: &str) -> PathBuf {
        self.base.join(folder).join(format!("{}.yaml", id))
    }

    async fn read_record<T: serde::de::DeserializeOwned>(
        &self,
        folder: &str,
        id: &str,
    ) -> Result<Option<T>, StorageError> {
        if !is_safe_id(id) {
            return Ok(None);
        }
        let path = self.record_path(folder, id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_yaml::from_str(&content)?))
    }

    async fn write_record<T: serde::Serialize>(
        &self,
        folder: &str,
        id: &str,
        record: &T,
    ) -> Result<(), StorageError> {
        if !is_safe_id(id) {
            return Err(StorageError::NotFound(id.to_string()));
        }
        tokio::fs::create_dir_all(self.base.join(folder)).await?;
        let content = serde_yaml::to_string(record)?;
        let path = self.record_path(folder, id);
        let tmp = path.with_extension("yaml.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(tmp, path).await?;
        Ok(())
    }
}

fn is_safe_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

async fn list_yaml_files(folder: &Path) -> Result<Vec<PathBuf>, StorageError> {
    let mut files = Vec::new();
    let mut entries = match tokio::fs::read_dir(folder).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(files),
        Err(e) => return Err(e.into()),
    };
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "yaml") {
            files.push(path);
        }
    }
    Ok(files)
}

#[async_trait]
impl StationDb for FileStore {
    async fn lookup(&self, id: &str) -> Result<Option<Station>, StorageError> {
        self.read_record(STATIONS_FOLDER, id).await
    }

    async fn store(&self, station: &Station) -> Result<(), StorageError> {
        self.write_record(STATIONS_FOLDER, &station.id, station)
            .await
    }

    async fn all_stations(&self) -> Result<Vec<Station>, StorageError> {
        let mut stations = Vec::new();
        for path in list_yaml_files(&self.base.join(STATIONS_FOLDER)).await? {
            let content = match tokio::fs::read_to_string(&path).await {
                Ok(content) => content,
                Err(e) => {
                    error!("Failed to read station file {}: {}", path.display(), e);
                    continue;
                }
            };
            match serde_yaml::from_str::<Station>(&content) {
                Ok(station) => stations.push(station),
                Err(e) => error!("Failed to parse station {}: {}", path.display(), e),
            }
        }
        stations.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(stations)
    }
}

#[async_trait]
impl ContactDb for FileStore {
    async fn store(&self, contact: &Contact) -> Result<(), StorageError> {
        self.write_record(CONTACTS_FOLDER, &contact.id, contact)
            .await
    }

    async fn lookup(&self, id: &str) -> Result<Option<Contact>, StorageError> {
        self.read_record(CONTACTS_FOLDER, id).await
    }

    async fn update(&self, contact: &mut Contact) -> Result<(), StorageError> {
        let _guard = self.update_lock.lock().await;
        let stored: Contact = self
            .read_record(CONTACTS_FOLDER, &contact.id)
            .await?
            .ok_or_else(|| StorageError::NotFound(contact.id.clone()))?;
        if stored.version != contact.version {
            return Err(StorageError::Conflict {
                id: contact.id.clone(),
                expected: contact.version,
                found: stored.version,
            });
        }
        let mut next = contact.clone();
        next.version += 1;
        self.write_record(CONTACTS_FOLDER, &next.id, &next).await?;
        contact.version = next.version;
        Ok(())
    }
}
