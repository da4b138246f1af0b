use crate::db::{StationDb, StorageError};

/// Exact id and secret match against the station store. An unknown station
/// is a plain denial, not an error.
pub async fn authenticate_station(
    stations: &dyn StationDb,
    id: &str,
    secret: &str,
) -> Result<bool, StorageError> {
    Ok(match stations.lookup(id).await? {
        Some(station) => station.id == id && station.secret == secret,
        None => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryStore, Station};

    #[tokio::test]
    async fn compares_id_and_secret() {
        let store = MemoryStore::with_stations([Station {
            id: "st".to_string(),
            secret: "right".to_string(),
            user_id: "u".to_string(),
            name: None,
            lat: None,
            lng: None,
            elevation: None,
            capabilities: None,
            scheduler_enabled: false,
        }]);
        assert!(authenticate_station(&store, "st", "right").await.unwrap());
        assert!(!authenticate_station(&store, "st", "wrong").await.unwrap());
        assert!(!authenticate_station(&store, "other", "right").await.unwrap());
        assert!(!authenticate_station(&store, "st", "").await.unwrap());
    }
}
