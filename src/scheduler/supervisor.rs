use log::{info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::mux::CoordinatorError;
use crate::scheduler::station_loop::StationLoop;
use crate::scheduler::SchedulerContext;

/// Keeps one scheduling loop running per online station.
pub struct Supervisor {
    ctx: Arc<SchedulerContext>,
    loops: HashMap<String, JoinHandle<()>>,
}

impl Supervisor {
    pub fn new(ctx: Arc<SchedulerContext>) -> Self {
        Self {
            ctx,
            loops: HashMap::new(),
        }
    }

    #[cfg(test)]
    pub fn active(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.loops.keys().cloned().collect();
        ids.sort();
        ids
    }

    fn reap(&mut self) {
        self.loops.retain(|station_id, handle| {
            let finished = handle.is_finished();
            if finished {
                info!("Station no longer scheduled: {}", station_id);
            }
            !finished
        });
    }

    /// Reaps finished loops and starts one for every online station
    /// without one. Returns how many were started.
    pub async fn scan_once(&mut self) -> Result<usize, CoordinatorError> {
        self.reap();
        let online = self.ctx.control.station_list().await?;

        let mut started = 0;
        for station_id in online {
            if self.loops.contains_key(&station_id) {
                continue;
            }
            info!("Station now active: {}", station_id);
            let station_loop = StationLoop::new(self.ctx.clone(), station_id.clone());
            self.loops
                .insert(station_id, tokio::spawn(station_loop.run()));
            started += 1;
        }
        Ok(started)
    }

    /// Scans until shutdown, then waits for every loop to finish so that
    /// running captures get their teardown out.
    pub async fn run(mut self) {
        info!(
            "Scheduler started, polling every {}",
            humantime::format_duration(self.ctx.settings.poll_interval)
        );
        loop {
            if let Err(e) = self.scan_once().await {
                warn!("Error listing stations: {}", e);
            }
            tokio::select! {
                _ = self.ctx.shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.ctx.settings.poll_interval) => {}
            }
        }

        info!("Scheduler stopping, waiting for {} loops", self.loops.len());
        for (station_id, handle) in self.loops.drain() {
            if let Err(e) = handle.await {
                warn!("{}: scheduling loop panicked: {}", station_id, e);
            }
        }
    }
}
