use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;

use crate::clock::{from_unix_seconds, until};
use crate::db::Station;
use crate::scheduler::capture::CaptureSequence;
use crate::scheduler::twiddle::next_pass;
use crate::scheduler::SchedulerContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum LoopState {
    Idle,
    PassSelected,
    Capturing,
}

/// How one pass through the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Iteration {
    LookupFailed,
    StationGone,
    NoPasses,
    SchedulingDisabled,
    /// The station changed while waiting for the pass.
    Stale,
    /// The station is no longer connected to the coordinator.
    Offline,
    Captured,
    CaptureFailed,
    Shutdown,
}

enum Lookup {
    Found(Station),
    Done(Iteration),
}

/// Schedules passes for one station until its record disappears or it
/// goes offline.
pub struct StationLoop {
    ctx: Arc<SchedulerContext>,
    station_id: String,
    state: LoopState,
}

impl StationLoop {
    pub fn new(ctx: Arc<SchedulerContext>, station_id: impl Into<String>) -> Self {
        Self {
            ctx,
            station_id: station_id.into(),
            state: LoopState::Idle,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> LoopState {
        self.state
    }

    fn transition(&mut self, next: LoopState) {
        if self.state != next {
            log::debug!("{}: {} -> {}", self.station_id, self.state, next);
            self.state = next;
        }
    }

    pub async fn run(mut self) {
        info!("{}: scheduling loop started", self.station_id);
        loop {
            match self.run_once().await {
                Iteration::StationGone | Iteration::Offline | Iteration::Shutdown => break,
                _ => {}
            }
        }
        info!("{}: scheduling loop exiting", self.station_id);
    }

    pub async fn run_once(&mut self) -> Iteration {
        self.transition(LoopState::Idle);
        let station = match self.lookup().await {
            Lookup::Found(station) => station,
            Lookup::Done(iteration) => return iteration,
        };

        let ctx = self.ctx.clone();
        let batch = ctx.predictor.pass_predictions(&station, ctx.clock.now()).await;
        if let Some(e) = &batch.error {
            warn!("{}: error getting pass predictions: {}", self.station_id, e);
        }

        let Some(pass) = next_pass(batch.predictions) else {
            info!("{}: no upcoming passes", self.station_id);
            return self.idle(ctx.settings.no_pass_wait, Iteration::NoPasses).await;
        };

        if !station.scheduler_enabled {
            log::debug!("{}: scheduling disabled", self.station_id);
            let woke = tokio::select! {
                _ = ctx.shutdown.cancelled() => Iteration::Shutdown,
                _ = ctx.notifier.wait_for_change(&self.station_id, ctx.settings.disabled_wait) => {
                    Iteration::SchedulingDisabled
                }
            };
            return woke;
        }

        self.transition(LoopState::PassSelected);
        let delay = until(ctx.clock.as_ref(), from_unix_seconds(pass.start_timestamp));
        info!(
            "{}: next pass {} in {}",
            self.station_id,
            pass.satellite.display_name(),
            humantime::format_duration(Duration::from_secs(delay.as_secs()))
        );
        if self.sleep(delay).await {
            return Iteration::Shutdown;
        }

        let station = match self.lookup().await {
            Lookup::Found(station) => station,
            Lookup::Done(iteration) => return iteration,
        };
        if !station.scheduler_enabled {
            info!("{}: scheduling disabled while waiting, skipping pass", self.station_id);
            return Iteration::Stale;
        }
        match ctx.control.station_status(&self.station_id).await {
            Ok(status) if status.is_connected => {}
            Ok(_) => {
                info!("{}: station went offline, skipping pass", self.station_id);
                return Iteration::Offline;
            }
            Err(e) => {
                warn!("{}: error getting station status: {}", self.station_id, e);
                return Iteration::Offline;
            }
        }

        self.transition(LoopState::Capturing);
        let result = CaptureSequence::new(&ctx, &station, &pass)
            .run(&ctx.shutdown)
            .await;
        self.transition(LoopState::Idle);
        match result {
            Ok(outcome) => {
                if !outcome.failed_steps.is_empty() {
                    warn!(
                        "{}: contact {} recorded with failed steps: {}",
                        self.station_id,
                        outcome.contact.id,
                        outcome.failed_steps.join(", ")
                    );
                }
                if outcome.aborted {
                    Iteration::Shutdown
                } else {
                    Iteration::Captured
                }
            }
            Err(e) => {
                warn!("{}: capture failed: {}", self.station_id, e);
                self.idle(ctx.settings.error_wait, Iteration::CaptureFailed)
                    .await
            }
        }
    }

    async fn lookup(&self) -> Lookup {
        match self.ctx.stations.lookup(&self.station_id).await {
            Ok(Some(station)) => Lookup::Found(station),
            Ok(None) => {
                info!("{}: station no longer exists", self.station_id);
                Lookup::Done(Iteration::StationGone)
            }
            Err(e) => {
                warn!("{}: error looking up station: {}", self.station_id, e);
                Lookup::Done(
                    self.idle(self.ctx.settings.lookup_retry, Iteration::LookupFailed)
                        .await,
                )
            }
        }
    }

    async fn idle(&self, wait: Duration, iteration: Iteration) -> Iteration {
        if self.sleep(wait).await {
            Iteration::Shutdown
        } else {
            iteration
        }
    }

    /// Returns true when woken by shutdown.
    async fn sleep(&self, wait: Duration) -> bool {
        tokio::select! {
            _ = self.ctx.shutdown.cancelled() => true,
            _ = tokio::time::sleep(wait) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::db::{StationDb, StorageError};
    use crate::mux::{Coordinator, StationRegistry};
    use crate::predict::testing::{window, ScriptedEngine};
    use crate::scheduler::testing::{fixture, satellite, station, T0};

    #[tokio::test(start_paused = true)]
    async fn disabled_station_never_captures() {
        let engine = ScriptedEngine::with("tle-a", vec![window(T0 + 60.0, T0 + 180.0)]);
        let f = fixture(
            vec![station("zurich", false)],
            vec![satellite("swisscube", "tle-a")],
            engine,
            &["zurich"],
        );
        let mut station_loop = StationLoop::new(f.ctx.clone(), "zurich");

        for _ in 0..3 {
            assert_eq!(station_loop.run_once().await, Iteration::SchedulingDisabled);
        }
        assert!(f.control.calls.lock().is_empty());
        assert!(f.store.contacts().is_empty());
        assert_eq!(
            f.ctx.clock.now().timestamp(),
            T0 as i64 + 3 * 600,
            "each disabled iteration waits ten minutes"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn enabled_station_captures_next_pass() {
        let engine = ScriptedEngine::with("tle-a", vec![window(T0 + 60.0, T0 + 180.0)]);
        let f = fixture(
            vec![station("zurich", true)],
            vec![satellite("swisscube", "tle-a")],
            engine,
            &["zurich"],
        );
        let mut station_loop = StationLoop::new(f.ctx.clone(), "zurich");

        assert_eq!(station_loop.run_once().await, Iteration::Captured);
        assert_eq!(station_loop.state(), LoopState::Idle);
        let contacts = f.store.contacts();
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].start_timestamp, T0 as i64 + 60);
        assert_eq!(contacts[0].end_timestamp, Some(T0 as i64 + 180));
    }

    #[tokio::test(start_paused = true)]
    async fn tracking_disabled_satellite_is_never_captured() {
        let engine = ScriptedEngine::with("tle-retired", vec![window(T0 + 10.0, T0 + 100.0)]);
        engine
            .windows
            .lock()
            .insert("tle-a".to_string(), vec![window(T0 + 500.0, T0 + 560.0)]);
        let mut retired = satellite("retired", "tle-retired");
        retired.disable_tracking = true;
        let f = fixture(
            vec![station("zurich", true)],
            vec![retired, satellite("swisscube", "tle-a")],
            engine,
            &["zurich"],
        );

        let mut station_loop = StationLoop::new(f.ctx.clone(), "zurich");
        assert_eq!(station_loop.run_once().await, Iteration::Captured);
        let contacts = f.store.contacts();
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].satellite_id.as_deref(), Some("swisscube"));
    }

    #[tokio::test(start_paused = true)]
    async fn no_passes_waits_ten_hours() {
        let f = fixture(
            vec![station("zurich", true)],
            vec![satellite("swisscube", "tle-a")],
            ScriptedEngine::with("tle-a", Vec::new()),
            &["zurich"],
        );
        let mut station_loop = StationLoop::new(f.ctx.clone(), "zurich");

        assert_eq!(station_loop.run_once().await, Iteration::NoPasses);
        assert_eq!(f.ctx.clock.now().timestamp(), T0 as i64 + 10 * 3600);
    }

    #[tokio::test(start_paused = true)]
    async fn prediction_errors_are_not_fatal() {
        // "tle-b" is unknown to the engine and fails.
        let f = fixture(
            vec![station("zurich", true)],
            vec![satellite("broken", "tle-b"), satellite("swisscube", "tle-a")],
            ScriptedEngine::with("tle-a", vec![window(T0 + 5.0, T0 + 65.0)]),
            &["zurich"],
        );
        let mut station_loop = StationLoop::new(f.ctx.clone(), "zurich");
        assert_eq!(station_loop.run_once().await, Iteration::Captured);
    }

    #[tokio::test(start_paused = true)]
    async fn station_disabled_while_waiting_is_stale() {
        let engine = ScriptedEngine::with("tle-a", vec![window(T0 + 60.0, T0 + 180.0)]);
        let f = fixture(
            vec![station("zurich", true)],
            vec![satellite("swisscube", "tle-a")],
            engine,
            &["zurich"],
        );
        let stations = f.ctx.stations.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            stations.store(&station("zurich", false)).await.unwrap();
        });

        let mut station_loop = StationLoop::new(f.ctx.clone(), "zurich");
        assert_eq!(station_loop.run_once().await, Iteration::Stale);
        assert!(f.control.calls.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_station_ends_the_loop() {
        let f = fixture(Vec::new(), Vec::new(), ScriptedEngine::default(), &[]);
        let station_loop = StationLoop::new(f.ctx.clone(), "gone");
        tokio::time::timeout(Duration::from_secs(1), station_loop.run())
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn disconnected_station_skips_the_pass_and_stops() {
        let engine = ScriptedEngine::with("tle-a", vec![window(T0 + 60.0, T0 + 180.0)]);
        let f = fixture(
            vec![station("zurich", true)],
            vec![satellite("swisscube", "tle-a")],
            engine,
            &[],
        );
        let ctx = SchedulerContext {
            stations: f.ctx.stations.clone(),
            contacts: f.ctx.contacts.clone(),
            control: Arc::new(Coordinator::new(Arc::new(StationRegistry::new()))),
            predictor: f.ctx.predictor.clone(),
            leases: f.ctx.leases.clone(),
            notifier: f.ctx.notifier.clone(),
            clock: f.ctx.clock.clone(),
            settings: f.ctx.settings.clone(),
            shutdown: f.ctx.shutdown.clone(),
        };
        let ctx = Arc::new(ctx);

        let mut station_loop = StationLoop::new(ctx.clone(), "zurich");
        assert_eq!(station_loop.run_once().await, Iteration::Offline);
        assert!(f.store.contacts().is_empty());

        tokio::time::timeout(
            Duration::from_secs(300),
            StationLoop::new(ctx, "zurich").run(),
        )
        .await
        .unwrap();
        assert!(f.store.contacts().is_empty());
    }

    struct FlakyStations;

    #[async_trait]
    impl StationDb for FlakyStations {
        async fn lookup(&self, _id: &str) -> Result<Option<Station>, StorageError> {
            Err(StorageError::Io(std::io::Error::other("connection reset")))
        }

        async fn store(&self, _station: &Station) -> Result<(), StorageError> {
            Ok(())
        }

        async fn all_stations(&self) -> Result<Vec<Station>, StorageError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn lookup_errors_back_off_briefly() {
        let f = fixture(Vec::new(), Vec::new(), ScriptedEngine::default(), &[]);
        let ctx = SchedulerContext {
            stations: Arc::new(FlakyStations),
            contacts: f.ctx.contacts.clone(),
            control: f.ctx.control.clone(),
            predictor: f.ctx.predictor.clone(),
            leases: f.ctx.leases.clone(),
            notifier: f.ctx.notifier.clone(),
            clock: f.ctx.clock.clone(),
            settings: f.ctx.settings.clone(),
            shutdown: f.ctx.shutdown.clone(),
        };
        let mut station_loop = StationLoop::new(Arc::new(ctx), "zurich");

        assert_eq!(station_loop.run_once().await, Iteration::LookupFailed);
        assert_eq!(f.ctx.clock.now().timestamp(), T0 as i64 + 10);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_interrupts_the_wait_for_a_pass() {
        let engine = ScriptedEngine::with("tle-a", vec![window(T0 + 3600.0, T0 + 3700.0)]);
        let f = fixture(
            vec![station("zurich", true)],
            vec![satellite("swisscube", "tle-a")],
            engine,
            &["zurich"],
        );
        let shutdown = f.ctx.shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            shutdown.cancel();
        });

        let mut station_loop = StationLoop::new(f.ctx.clone(), "zurich");
        assert_eq!(station_loop.run_once().await, Iteration::Shutdown);
        assert_eq!(station_loop.state(), LoopState::PassSelected);
        assert!(f.control.calls.lock().is_empty());
    }
}
