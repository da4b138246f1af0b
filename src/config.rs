use serde::{Deserialize, Deserializer};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub mux: MuxConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    pub storage: StorageConfig,
    pub satellites: SatellitesConfig,
    #[serde(default)]
    pub geometry: GeometryConfig,
    #[serde(default)]
    pub api_keys: Vec<ApiKey>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MuxConfig {
    #[serde(default = "default_station_listen")]
    pub station_listen: String,
    #[serde(default = "default_rpc_bind")]
    pub rpc_bind: String,
    #[serde(default = "default_rpc_timeout", deserialize_with = "de_duration")]
    pub rpc_timeout: Duration,
    #[serde(default = "default_keepalive", deserialize_with = "de_duration")]
    pub keepalive_interval: Duration,
    /// PEM certificate chain; stations connect over TLS when set together
    /// with `private_key_file`.
    #[serde(default)]
    pub cert_file: Option<PathBuf>,
    #[serde(default)]
    pub private_key_file: Option<PathBuf>,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            station_listen: default_station_listen(),
            rpc_bind: default_rpc_bind(),
            rpc_timeout: default_rpc_timeout(),
            keepalive_interval: default_keepalive(),
            cert_file: None,
            private_key_file: None,
        }
    }
}

fn default_station_listen() -> String {
    "0.0.0.0:1234".to_string()
}

fn default_rpc_bind() -> String {
    "127.0.0.1:1235".to_string()
}

fn default_rpc_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_keepalive() -> Duration {
    Duration::from_secs(20 * 60)
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_coordinator_url")]
    pub coordinator_url: String,
    #[serde(default)]
    pub coordinator_api_key: Option<String>,
    #[serde(default = "default_stream_base_url")]
    pub stream_base_url: String,
    #[serde(default = "default_api_server")]
    pub api_server: String,
    #[serde(default = "default_poll_interval", deserialize_with = "de_duration")]
    pub poll_interval: Duration,
    /// Client timeout for coordinator API requests. Must exceed
    /// `mux.rpc_timeout` so station RPC errors arrive as such.
    #[serde(default = "default_coordinator_timeout", deserialize_with = "de_duration")]
    pub coordinator_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            coordinator_url: default_coordinator_url(),
            coordinator_api_key: None,
            stream_base_url: default_stream_base_url(),
            api_server: default_api_server(),
            poll_interval: default_poll_interval(),
            coordinator_timeout: default_coordinator_timeout(),
        }
    }
}

fn default_coordinator_url() -> String {
    "http://127.0.0.1:1235".to_string()
}

fn default_stream_base_url() -> String {
    "http://127.0.0.1:5050".to_string()
}

fn default_api_server() -> String {
    "127.0.0.1:5051".to_string()
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_coordinator_timeout() -> Duration {
    Duration::from_secs(90)
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub base_folder: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SatellitesConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "engine", rename_all = "snake_case")]
pub enum GeometryConfig {
    #[default]
    Sgp4,
    Process {
        predict_command: String,
        pass_details_command: String,
        #[serde(default = "default_engine_timeout", deserialize_with = "de_duration")]
        timeout: Duration,
    },
}

fn default_engine_timeout() -> Duration {
    Duration::from_secs(60)
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiKey {
    pub key: String,
    pub name: String,
    pub permissions: HashSet<Permission>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ReadStations,
    CallStations,
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.mux.cert_file.is_some() != self.mux.private_key_file.is_some() {
            return Err(ConfigError::Invalid(
                "mux.cert_file and mux.private_key_file must be set together".to_string(),
            ));
        }
        if self.scheduler.coordinator_timeout <= self.mux.rpc_timeout {
            return Err(ConfigError::Invalid(format!(
                "scheduler.coordinator_timeout ({}) must be longer than mux.rpc_timeout ({})",
                humantime::format_duration(self.scheduler.coordinator_timeout),
                humantime::format_duration(self.mux.rpc_timeout)
            )));
        }
        Ok(())
    }

    pub fn find_api_key(&self, key: &str) -> Option<&ApiKey> {
        self.api_keys.iter().find(|k| k.key == key)
    }
}

fn de_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(raw.trim()).map_err(serde::de::Error::custom)
}
