use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use super::{Contact, ContactDb, Station, StationDb, StorageError};

/// Process-local store for stations and contacts.
#[derive(Default)]
pub struct MemoryStore {
    stations: RwLock<HashMap<String, Station>>,
    contacts: RwLock<HashMap<String, Contact>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stations(stations: impl IntoIterator<Item = Station>) -> Self {
        let store = Self::new();
        {
            let mut map = store.stations.write();
            for station in stations {
                map.insert(station.id.clone(), station);
            }
        }
        store
    }

    pub fn contacts(&self) -> Vec<Contact> {
        let mut contacts: Vec<_> = self.contacts.read().values().cloned().collect();
        contacts.sort_by_key(|c| c.start_timestamp);
        contacts
    }
}

#[async_trait]
impl StationDb for MemoryStore {
    async fn lookup(&self, id: &str) -> Result<Option<Station>, StorageError> {
        Ok(self.stations.read().get(id).cloned())
    }

    async fn store(&self, station: &Station) -> Result<(), StorageError> {
        self.stations
            .write()
            .insert(station.id.clone(), station.clone());
        Ok(())
    }

    async fn all_stations(&self) -> Result<Vec<Station>, StorageError> {
        let mut stations: Vec<_> = self.stations.read().values().cloned().collect();
        stations.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(stations)
    }
}

#[async_trait]
impl ContactDb for MemoryStore {
    async fn store(&self, contact: &Contact) -> Result<(), StorageError> {
        self.contacts
            .write()
            .insert(contact.id.clone(), contact.clone());
        Ok(())
    }

    async fn lookup(&self, id: &str) -> Result<Option<Contact>, StorageError> {
        Ok(self.contacts.read().get(id).cloned())
    }

    async fn update(&self, contact: &mut Contact) -> Result<(), StorageError> {
        let mut contacts = self.contacts.write();
        let stored = contacts
            .get_mut(&contact.id)
            .ok_or_else(|| StorageError::NotFound(contact.id.clone()))?;
        if stored.version != contact.version {
            return Err(StorageError::Conflict {
                id: contact.id.clone(),
                expected: contact.version,
                found: stored.version,
            });
        }
        contact.version += 1;
        *stored = contact.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact(id: &str) -> Contact {
        Contact {
            id: id.to_string(),
            station_id: Some("st".to_string()),
            user_id: Some("u".to_string()),
            satellite_id: None,
            start_timestamp: 10,
            end_timestamp: None,
            lat: None,
            lng: None,
            elevation: None,
            blobs: Vec::new(),
            version: 0,
        }
    }

    #[tokio::test]
    async fn update_bumps_version_and_detects_conflicts() {
        let store = MemoryStore::new();
        let mut first = contact("c1");
        ContactDb::store(&store, &first).await.unwrap();
        let mut stale = first.clone();

        first.close(20);
        store.update(&mut first).await.unwrap();
        assert_eq!(first.version, 1);

        stale.close(30);
        match store.update(&mut stale).await {
            Err(StorageError::Conflict {
                expected, found, ..
            }) => {
                assert_eq!(expected, 0);
                assert_eq!(found, 1);
            }
            other => panic!("expected conflict, got {:?}", other),
        }
        let stored = ContactDb::lookup(&store, "c1").await.unwrap().unwrap();
        assert_eq!(stored.end_timestamp, Some(20));
    }

    #[tokio::test]
    async fn update_of_unknown_contact_is_not_found() {
        let store = MemoryStore::new();
        let mut missing = contact("nope");
        assert!(matches!(
            store.update(&mut missing).await,
            Err(StorageError::NotFound(_))
        ));
    }
}
