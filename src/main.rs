mod clock;
mod config;
mod db;
mod mux;
mod predict;
mod scheduler;
mod web;

use clap::{Parser, Subcommand};
use log::{info, warn};
use std::process::ExitCode;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::clock::{from_unix_seconds, SystemClock};
use crate::config::{Config, ConfigError, GeometryConfig};
use crate::db::{FileStore, SatelliteDb, StationDb, StorageError};
use crate::mux::{
    load_acceptor, run_listener, ConnectionSettings, Coordinator, CoordinatorError,
    RemoteCoordinator, StationControl, StationRegistry, TlsError,
};
use crate::predict::{Band, GeometryEngine, OrbitModel, PassPredictor, ProcessEngine, Sgp4Engine};
use crate::scheduler::{
    LocalLeases, PollingNotifier, SchedulerContext, SchedulerSettings, Supervisor,
};
use crate::web::{run_server, AppState};

#[derive(Parser)]
#[command(name = "carp-mux")]
#[command(about = "Ground station multiplexer and pass scheduler")]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "carp.yaml")]
    config: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Accept station connections and serve the coordinator API
    Mux,
    /// Schedule captures through a remote coordinator
    Schedule,
    /// Multiplexer and scheduler in one process
    Run,
    /// Print the upcoming passes for a station
    Predict { station_id: String },
    /// Check the configuration and satellite list
    Validate,
}

#[derive(Debug, Error)]
enum StartupError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error("storage: {0}")]
    Storage(#[from] StorageError),
    #[error("coordinator: {0}")]
    Coordinator(#[from] CoordinatorError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TLS: {0}")]
    Tls(#[from] TlsError),
    #[error("unknown station {0}")]
    UnknownStation(String),
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let config = match Config::from_file(&cli.config) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("Error loading {}: {}", cli.config, e);
            return ExitCode::FAILURE;
        }
    };

    if let Commands::Validate = cli.command {
        return validate(&config);
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error starting runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(async move {
        match cli.command {
            Commands::Mux => mux(config).await,
            Commands::Schedule => schedule(config).await,
            Commands::Run => run(config).await,
            Commands::Predict { station_id } => predict(config, &station_id).await,
            Commands::Validate => Ok(()),
        }
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Cancelled on Ctrl-C.
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, shutting down");
        }
        trigger.cancel();
    });
    token
}

fn geometry_engine(config: &GeometryConfig) -> Arc<dyn GeometryEngine> {
    match config {
        GeometryConfig::Sgp4 => Arc::new(Sgp4Engine),
        GeometryConfig::Process {
            predict_command,
            pass_details_command,
            timeout,
        } => Arc::new(ProcessEngine::new(
            predict_command.clone(),
            pass_details_command.clone(),
            *timeout,
        )),
    }
}

fn predictor(config: &Config) -> Result<Arc<PassPredictor>, StartupError> {
    let satellites = SatelliteDb::from_file(&config.satellites.path)?;
    if satellites.is_empty() {
        warn!(
            "No satellites in {}, nothing will be scheduled",
            config.satellites.path.display()
        );
    }
    info!(
        "Loaded {} satellites from {}",
        satellites.len(),
        config.satellites.path.display()
    );
    Ok(Arc::new(PassPredictor::new(
        Arc::new(satellites),
        geometry_engine(&config.geometry),
    )))
}

fn scheduler_context(
    config: &Config,
    store: Arc<FileStore>,
    control: Arc<dyn StationControl>,
    shutdown: CancellationToken,
) -> Result<Arc<SchedulerContext>, StartupError> {
    Ok(Arc::new(SchedulerContext {
        stations: store.clone(),
        contacts: store,
        control,
        predictor: predictor(config)?,
        leases: Arc::new(LocalLeases::new()),
        notifier: Arc::new(PollingNotifier),
        clock: Arc::new(SystemClock),
        settings: SchedulerSettings::from_config(&config.scheduler),
        shutdown,
    }))
}

async fn serve_mux(
    config: Arc<Config>,
    stations: Arc<dyn StationDb>,
    coordinator: Arc<Coordinator>,
    shutdown: CancellationToken,
) -> Result<(), StartupError> {
    let tls = match (&config.mux.cert_file, &config.mux.private_key_file) {
        (Some(cert_file), Some(private_key_file)) => {
            Some(load_acceptor(cert_file, private_key_file)?)
        }
        _ => {
            warn!("No TLS certificate configured, station secrets travel in cleartext");
            None
        }
    };
    let station_listener = TcpListener::bind(&config.mux.station_listen).await?;
    let rpc_listener = TcpListener::bind(&config.mux.rpc_bind).await?;
    let settings = ConnectionSettings {
        rpc_timeout: config.mux.rpc_timeout,
        keepalive_interval: config.mux.keepalive_interval,
    };
    let state = AppState {
        config: config.clone(),
        coordinator: coordinator.clone(),
    };

    let (_, served) = tokio::join!(
        run_listener(
            station_listener,
            coordinator.registry().clone(),
            stations,
            settings,
            tls,
            shutdown.clone(),
        ),
        run_server(rpc_listener, state, shutdown),
    );
    served?;
    Ok(())
}

async fn mux(config: Arc<Config>) -> Result<(), StartupError> {
    let store = Arc::new(FileStore::new(config.storage.base_folder.clone()));
    let coordinator = Arc::new(Coordinator::new(Arc::new(StationRegistry::new())));
    serve_mux(config, store, coordinator, shutdown_token()).await
}

async fn schedule(config: Arc<Config>) -> Result<(), StartupError> {
    let store = Arc::new(FileStore::new(config.storage.base_folder.clone()));
    let remote = RemoteCoordinator::new(
        &config.scheduler.coordinator_url,
        config.scheduler.coordinator_api_key.clone(),
        config.scheduler.coordinator_timeout,
    )?;
    let ctx = scheduler_context(&config, store, Arc::new(remote), shutdown_token())?;
    Supervisor::new(ctx).run().await;
    Ok(())
}

async fn run(config: Arc<Config>) -> Result<(), StartupError> {
    let store = Arc::new(FileStore::new(config.storage.base_folder.clone()));
    let coordinator = Arc::new(Coordinator::new(Arc::new(StationRegistry::new())));
    let shutdown = shutdown_token();
    let ctx = scheduler_context(&config, store.clone(), coordinator.clone(), shutdown.clone())?;

    let (served, ()) = tokio::join!(
        serve_mux(config, store, coordinator, shutdown),
        Supervisor::new(ctx).run(),
    );
    served
}

async fn predict(config: Arc<Config>, station_id: &str) -> Result<(), StartupError> {
    let store = FileStore::new(config.storage.base_folder.clone());
    let station = StationDb::lookup(&store, station_id)
        .await?
        .ok_or_else(|| StartupError::UnknownStation(station_id.to_string()))?;

    let batch = predictor(&config)?
        .pass_predictions(&station, chrono::Utc::now())
        .await;
    if let Some(e) = &batch.error {
        eprintln!("Warning: some predictions failed, last error: {}", e);
    }

    println!("{} upcoming passes for {}", batch.predictions.len(), station_id);
    for p in &batch.predictions {
        println!(
            "  {}  {:>4.0}s  max el {:>5.1}  {:>6.0}->{:<6.0}  {} ({:.3} MHz){}",
            from_unix_seconds(p.start_timestamp).format("%Y-%m-%d %H:%M:%S"),
            p.duration_seconds(),
            p.max_elevation_degrees,
            p.start_azimuth_degrees,
            p.end_azimuth_degrees,
            p.satellite.display_name(),
            p.mode.channel.frequency_hz / 1e6,
            if p.satellite.disable_tracking {
                "  [tracking disabled]"
            } else {
                ""
            }
        );
    }
    Ok(())
}

fn validate(config: &Config) -> ExitCode {
    let satellites = match SatelliteDb::from_file(&config.satellites.path) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("Error loading {}: {}", config.satellites.path.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let mut problems = 0;
    for satellite in satellites.list() {
        match satellite.tle.as_deref().map(OrbitModel::from_tle) {
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                println!("  {}: bad TLE: {}", satellite.id, e);
                problems += 1;
            }
            None => println!("  {}: no TLE, never predicted", satellite.id),
        }
        for channel in &satellite.channels {
            match Band::classify(channel.frequency_hz) {
                Some(band) => log::debug!("{}: {} Hz in {}", satellite.id, channel.frequency_hz, band),
                None => println!(
                    "  {}: channel {} Hz is outside every supported band",
                    satellite.id, channel.frequency_hz
                ),
            }
        }
    }

    println!(
        "Configuration is valid ({} satellites, {} API keys, {:?} geometry)",
        satellites.len(),
        config.api_keys.len(),
        config.geometry
    );
    if problems > 0 {
        println!("{} satellites with unusable TLEs", problems);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
