use log::{info, warn};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::db::{Contact, Station, StorageError};
use crate::mux::{ActionError, MotorCoordinate, StationActions};
use crate::predict::{GroundStation, PredictError, Prediction};
use crate::scheduler::lease::LeaseError;
use crate::scheduler::SchedulerContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum CaptureState {
    Planning,
    Leasing,
    Recording,
    Configuring,
    Holding,
    TearingDown,
    Closing,
    Done,
}

/// Failures that stop a capture before any hardware command is sent.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("station {0} has no location")]
    NoLocation(String),
    #[error("satellite {0} has no TLE")]
    NoTle(String),
    #[error("pass details: {0}")]
    PassDetails(#[from] PredictError),
    #[error("{0}")]
    Lease(#[from] LeaseError),
    #[error("contact store: {0}")]
    Contact(#[from] StorageError),
}

#[derive(Debug)]
pub struct CaptureOutcome {
    pub contact: Contact,
    /// The hold was cut short by the abort token.
    pub aborted: bool,
    /// Actions the station refused or never answered, in order.
    pub failed_steps: Vec<&'static str>,
}

/// One pass recorded on one station.
pub struct CaptureSequence<'a> {
    ctx: &'a SchedulerContext,
    station: &'a Station,
    pass: &'a Prediction,
    state: CaptureState,
    label: String,
    failed_steps: Vec<&'static str>,
}

impl<'a> CaptureSequence<'a> {
    pub fn new(ctx: &'a SchedulerContext, station: &'a Station, pass: &'a Prediction) -> Self {
        Self {
            ctx,
            station,
            pass,
            state: CaptureState::Planning,
            label: station.id.clone(),
            failed_steps: Vec::new(),
        }
    }

    fn enter(&mut self, state: CaptureState) {
        log::debug!("{}: capture {} -> {}", self.label, self.state, state);
        self.state = state;
    }

    fn actions(&self) -> StationActions<'a> {
        StationActions::new(self.ctx.control.as_ref(), &self.station.id)
    }

    fn record(&mut self, step: &'static str, result: Result<(), ActionError>) {
        if let Err(e) = result {
            warn!("{}: {} failed: {}", self.label, step, e);
            self.failed_steps.push(step);
        }
    }

    fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.pass.duration_seconds().max(0.0))
    }

    async fn motor_program(&self) -> Result<Vec<MotorCoordinate>, CaptureError> {
        let observer = GroundStation::from_station(self.station)
            .ok_or_else(|| CaptureError::NoLocation(self.station.id.clone()))?;
        let tle = self
            .pass
            .satellite
            .tle
            .as_deref()
            .ok_or_else(|| CaptureError::NoTle(self.pass.satellite.id.clone()))?;

        let points = self
            .ctx
            .predictor
            .pass_details(
                self.ctx.clock.now(),
                self.duration(),
                &observer,
                tle,
                self.ctx.settings.motor_resolution_seconds,
            )
            .await?;
        Ok(points
            .into_iter()
            .map(|p| MotorCoordinate {
                timestamp: p.timestamp,
                azimuth_degrees: p.azimuth_degrees,
                elevation_degrees: p.elevation_degrees,
            })
            .collect())
    }

    /// Runs the pass to completion. Teardown is always sent once the
    /// contact exists; `abort` only shortens the hold.
    pub async fn run(mut self, abort: &CancellationToken) -> Result<CaptureOutcome, CaptureError> {
        let pass = self.pass;
        let satellite = &pass.satellite;
        let duration = self.duration();
        info!(
            "{}: capturing {} for {:?} on {:.0} Hz",
            self.label,
            satellite.display_name(),
            duration,
            pass.mode.channel.frequency_hz
        );

        let program = self.motor_program().await?;

        self.enter(CaptureState::Leasing);
        let lease = self
            .ctx
            .leases
            .acquire(
                &self.station.id,
                duration + self.ctx.settings.lease_margin,
                self.ctx.settings.lease_wait,
            )
            .await?;

        self.enter(CaptureState::Recording);
        let mut contact = Contact::new(
            self.station,
            &self.station.user_id,
            Some(satellite.id.as_str()),
            self.ctx.clock.now().timestamp(),
        );
        if let Err(e) = self.ctx.contacts.store(&contact).await {
            warn!("{}: error creating contact: {}", self.label, e);
            if let Err(e) = self.ctx.leases.release(lease).await {
                warn!("{}: {}", self.label, e);
            }
            return Err(e.into());
        }
        self.label = format!("{}/{}", self.station.id, contact.id);

        self.enter(CaptureState::Configuring);
        if !abort.is_cancelled() {
            self.configure(&contact.id, &program).await;
        }

        self.enter(CaptureState::Holding);
        let aborted = tokio::select! {
            _ = abort.cancelled() => true,
            _ = tokio::time::sleep(duration) => false,
        };
        if aborted {
            info!("{}: capture aborted", self.label);
        }

        self.enter(CaptureState::TearingDown);
        let actions = self.actions();
        let result = actions.tnc_stop().await;
        self.record("TNCStop", result);
        let result = actions.receiver_stop().await;
        self.record("ReceiverStop", result);
        let result = actions.motor_stop().await;
        self.record("MotorStop", result);

        self.enter(CaptureState::Closing);
        contact.close(self.ctx.clock.now().timestamp());
        if let Err(e) = self.ctx.contacts.update(&mut contact).await {
            warn!("{}: error persisting contact end: {}", self.label, e);
        }
        if let Err(e) = self.ctx.leases.release(lease).await {
            warn!("{}: {}", self.label, e);
        }

        self.enter(CaptureState::Done);
        info!("{}: capture finished", self.label);
        Ok(CaptureOutcome {
            contact,
            aborted,
            failed_steps: self.failed_steps,
        })
    }

    async fn configure(&mut self, contact_id: &str, program: &[MotorCoordinate]) {
        let actions = self.actions();
        let ctx = self.ctx;
        let pass = self.pass;
        let settings = &ctx.settings;

        let result = actions
            .receiver_set_frequency(pass.mode.channel.frequency_hz as i64)
            .await;
        self.record("ReceiverSetFrequency", result);

        let result = actions.receiver_start(&settings.stream_url(contact_id)).await;
        self.record("ReceiverStart", result);

        // Reset a decoder left running by an earlier capture.
        let result = actions.tnc_stop().await;
        self.record("TNCStop", result);
        let result = actions.tnc_start(&settings.api_server, &pass.satellite.id).await;
        self.record("TNCStart", result);

        let result = actions.motor_start(program, ctx.clock.now()).await;
        self.record("MotorStart", result);
    }
}
