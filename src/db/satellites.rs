use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use super::{Satellite, StorageError};

#[derive(Deserialize)]
struct SatelliteFile {
    #[serde(default)]
    satellites: Vec<Satellite>,
}

/// Satellite list loaded once at start-up.
pub struct SatelliteDb {
    satellites: Vec<Satellite>,
}

impl SatelliteDb {
    /// Later entries replace earlier ones with the same id, keeping the
    /// position of the first.
    pub fn new(entries: Vec<Satellite>) -> Self {
        let mut satellites: Vec<Satellite> = Vec::with_capacity(entries.len());
        let mut by_id = HashMap::new();
        for satellite in entries {
            match by_id.get(&satellite.id).copied() {
                Some(index) => {
                    log::warn!("Duplicate satellite id {}, last entry wins", satellite.id);
                    satellites[index] = satellite;
                }
                None => {
                    by_id.insert(satellite.id.clone(), satellites.len());
                    satellites.push(satellite);
                }
            }
        }
        Self { satellites }
    }

    pub fn from_file(path: &Path) -> Result<Self, StorageError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, StorageError> {
        let file: SatelliteFile = serde_yaml::from_str(content)?;
        Ok(Self::new(file.satellites))
    }

    pub fn list(&self) -> &[Satellite] {
        &self.satellites
    }

    #[cfg(test)]
    pub fn get(&self, id: &str) -> Option<&Satellite> {
        self.satellites.iter().find(|s| s.id == id)
    }

    pub fn len(&self) -> usize {
        self.satellites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.satellites.is_empty()
    }
}
