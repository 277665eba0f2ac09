//! Door motion - runs the stepper through a full ramp to open or close
//!
//! Opening walks the step index down from `ramp_steps - 1` to 0, closing walks
//! it up from 0. Between steps the task sleeps on the tokio timer, which is the
//! only place the detection loop yields while the door moves.

use crate::domain::types::DoorState;
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::hardware::{HardwareError, RetryPolicy};
use crate::services::stepper::StepperDriver;
use embedded_hal::digital::OutputPin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, trace};

pub struct DoorMotion<O> {
    driver: StepperDriver<O>,
    state: DoorState,
    ramp_steps: u32,
    step_interval: Duration,
    release_after_move: bool,
    metrics: Arc<Metrics>,
}

impl<O: OutputPin> DoorMotion<O> {
    pub fn new(coils: [O; 4], config: &Config, retry: RetryPolicy, metrics: Arc<Metrics>) -> Self {
        Self {
            driver: StepperDriver::new(coils, retry, metrics.clone()),
            state: DoorState::Closed,
            ramp_steps: config.ramp_steps(),
            step_interval: config.step_interval(),
            release_after_move: config.release_after_move(),
            metrics,
        }
    }

    pub fn state(&self) -> DoorState {
        self.state
    }

    /// Declare where the leaf is without moving it (bring-up only)
    pub fn assume_state(&mut self, state: DoorState) {
        self.state = state;
    }

    /// Total travel time for one open or close
    pub fn travel_time(&self) -> Duration {
        self.step_interval.saturating_mul(self.ramp_steps)
    }

    /// Open the door. Returns false if it was already open.
    pub async fn open(&mut self) -> Result<bool, HardwareError> {
        if self.state == DoorState::Open {
            return Ok(false);
        }
        info!(steps = %self.ramp_steps, "door_opening");
        self.run_ramp(DoorState::Open).await?;
        Ok(true)
    }

    /// Close the door. Returns false if it was already closed.
    pub async fn close(&mut self) -> Result<bool, HardwareError> {
        if self.state == DoorState::Closed {
            return Ok(false);
        }
        info!(steps = %self.ramp_steps, "door_closing");
        self.run_ramp(DoorState::Closed).await?;
        Ok(true)
    }

    async fn run_ramp(&mut self, target: DoorState) -> Result<(), HardwareError> {
        let start = Instant::now();
        let n = self.ramp_steps;

        for i in 0..n {
            let step = match target {
                DoorState::Open => n - 1 - i,
                DoorState::Closed => i,
            };
            self.driver.set_phase(step).await?;
            trace!(step = %step, "motor_step");
            tokio::time::sleep(self.step_interval).await;
        }

        if self.release_after_move {
            self.driver.release().await?;
        }

        self.state = target;
        self.metrics.record_motor_steps(u64::from(n));
        self.metrics.record_door_motion(target);
        info!(
            door = %target.as_str(),
            duration_ms = %start.elapsed().as_millis(),
            "door_motion_complete"
        );
        Ok(())
    }

    /// De-energize the motor
    pub async fn release(&mut self) -> Result<(), HardwareError> {
        self.driver.release().await
    }

    /// Best-effort de-energize for shutdown paths
    pub fn release_now(&mut self) -> Vec<HardwareError> {
        self.driver.release_now()
    }
}
