//! Presence detection and passage orchestration
//!
//! The DoorController owns every GPIO line and runs one cooperative loop:
//!
//! ```text
//!  IDLE ──[outer active]──▶ ENTRY: open ─▶ wait outer clear ─▶ window(inner)
//!    │                                                          │
//!    │                              commit: close, +1, report ◀─┤
//!    │                              abandon: close             ◀─┘
//!    │
//!    └──[inner active]──▶ EXIT: open ─▶ wait inner clear ─▶ window(outer)
//!                                   commit: close, -1 / abandon: close
//! ```
//!
//! Every passage ends with a cooldown before polling resumes. Entry is checked
//! before exit on each tick, so when both sensors fire together entry wins.

#[cfg(test)]
mod tests;

use crate::domain::types::{DetectionState, DoorState, Passage, PassageOutcome, SensorSide};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::gpio::DoorPins;
use crate::io::hardware::{HardwareError, RetryPolicy};
use crate::services::door_motion::DoorMotion;
use crate::services::occupancy::Occupancy;
use crate::services::report_worker::ReportSender;
use embedded_hal::digital::{InputPin, OutputPin};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep, Instant};
use tracing::{error, info, warn};

/// Single owner of the door hardware and the detection state
pub struct DoorController<I, O> {
    /// Sensor facing the street
    outer: I,
    /// Sensor facing the room
    inner: I,
    /// Stepper-driven door leaf
    door: DoorMotion<O>,
    /// People counter and light relay
    occupancy: Occupancy<O>,
    /// Queue to the telemetry worker
    reports: ReportSender,
    state: DetectionState,
    poll_interval: Duration,
    confirmation_window: Duration,
    cooldown: Duration,
    retry: RetryPolicy,
    metrics: Arc<Metrics>,
}

impl<I: InputPin, O: OutputPin> DoorController<I, O> {
    pub fn new(
        pins: DoorPins<I, O>,
        config: &Config,
        reports: ReportSender,
        metrics: Arc<Metrics>,
    ) -> Self {
        let retry = RetryPolicy::from_config(config);
        Self {
            outer: pins.outer_sensor,
            inner: pins.inner_sensor,
            door: DoorMotion::new(pins.motor, config, retry, metrics.clone()),
            occupancy: Occupancy::new(pins.relay, retry, metrics.clone()),
            reports,
            state: DetectionState::Idle,
            poll_interval: Duration::from_millis(config.poll_interval_ms()),
            confirmation_window: Duration::from_millis(config.confirmation_window_ms()),
            cooldown: Duration::from_millis(config.cooldown_ms()),
            retry,
            metrics,
        }
    }

    /// Put outputs in their startup state: coils off, relay from the count
    pub async fn initialize(&mut self) -> Result<(), HardwareError> {
        self.door.release().await?;
        self.occupancy.apply_relay().await?;
        info!(
            door = %self.door.state().as_str(),
            occupancy = %self.occupancy.count(),
            "controller_initialized"
        );
        Ok(())
    }

    pub fn state(&self) -> DetectionState {
        self.state
    }

    pub fn door_state(&self) -> DoorState {
        self.door.state()
    }

    pub fn occupancy(&self) -> u32 {
        self.occupancy.count()
    }

    pub fn light_on(&self) -> bool {
        self.occupancy.light_on()
    }

    async fn read_sensor(&mut self, side: SensorSide) -> Result<bool, HardwareError> {
        let line = side.as_str();
        let pin = match side {
            SensorSide::Outer => &mut self.outer,
            SensorSide::Inner => &mut self.inner,
        };
        self.retry
            .run(line, &self.metrics, || pin.is_high().map_err(|e| HardwareError::read(line, e)))
            .await
    }

    /// Evaluate both sensors once, entry first.
    ///
    /// Each triggered branch runs its full passage (door motion, window and
    /// cooldown) before the next is checked.
    pub async fn poll_once(&mut self) -> Result<Vec<PassageOutcome>, HardwareError> {
        let mut outcomes = Vec::new();
        for passage in [Passage::Entry, Passage::Exit] {
            if self.read_sensor(passage.trigger()).await? {
                outcomes.push(self.handle_passage(passage).await?);
            }
        }
        Ok(outcomes)
    }

    /// Run one passage from trigger to cooldown
    pub async fn handle_passage(&mut self, passage: Passage) -> Result<PassageOutcome, HardwareError> {
        self.state = DetectionState::in_progress(passage);
        info!(
            passage = %passage.as_str(),
            trigger = %passage.trigger().as_str(),
            "passage_detected"
        );

        self.door.open().await?;

        // Hold until the person clears the trigger sensor
        while self.read_sensor(passage.trigger()).await? {
            sleep(self.poll_interval).await;
        }

        let confirmed = self.await_confirmation(passage).await?;
        self.door.close().await?;

        let outcome = if confirmed {
            let occupancy = match passage {
                Passage::Entry => self.occupancy.increment().await?,
                Passage::Exit => self.occupancy.decrement().await?,
            };
            if passage == Passage::Entry {
                self.reports.send_count(occupancy);
            }
            self.metrics.record_committed(passage);
            info!(passage = %passage.as_str(), occupancy = %occupancy, "passage_committed");
            PassageOutcome::Committed { passage, occupancy }
        } else {
            self.metrics.record_abandoned(passage);
            info!(
                passage = %passage.as_str(),
                window_ms = %self.confirmation_window.as_millis(),
                occupancy = %self.occupancy.count(),
                "passage_abandoned"
            );
            PassageOutcome::Abandoned { passage }
        };

        self.state = DetectionState::Idle;
        sleep(self.cooldown).await;
        Ok(outcome)
    }

    /// Poll the confirming sensor until it fires or the window runs out
    async fn await_confirmation(&mut self, passage: Passage) -> Result<bool, HardwareError> {
        let deadline = Instant::now() + self.confirmation_window;
        while Instant::now() < deadline {
            if self.read_sensor(passage.confirmation()).await? {
                return Ok(true);
            }
            sleep(self.poll_interval).await;
        }
        Ok(false)
    }

    async fn tick(&mut self) -> Result<(), HardwareError> {
        self.poll_once().await?;
        sleep(self.poll_interval).await;
        Ok(())
    }

    /// Poll until shutdown or a fatal hardware error.
    ///
    /// Shutdown is observed at any suspension point, including mid-ramp.
    /// Outputs are left safe in both cases.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), HardwareError> {
        info!(
            poll_interval_ms = %self.poll_interval.as_millis(),
            confirmation_window_ms = %self.confirmation_window.as_millis(),
            cooldown_ms = %self.cooldown.as_millis(),
            travel_ms = %self.door.travel_time().as_millis(),
            "detector_started"
        );

        let result = loop {
            if *shutdown.borrow() {
                break Ok(());
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(state = %self.state.as_str(), "detector_shutdown");
                        break Ok(());
                    }
                }
                tick = self.tick() => {
                    if let Err(e) = tick {
                        error!(error = %e, state = %self.state.as_str(), "hardware_fatal");
                        break Err(e);
                    }
                }
            }
        };

        self.shutdown();
        result
    }

    /// Drive every output to its safe state: coils off, light off.
    ///
    /// Keeps going past failing lines so as much as possible is de-energized.
    pub fn shutdown(&mut self) {
        let mut errors = self.door.release_now();
        if let Err(e) = self.occupancy.switch_off_now() {
            errors.push(e);
        }

        if errors.is_empty() {
            info!(occupancy = %self.occupancy.count(), "outputs_safe");
        } else {
            for e in &errors {
                warn!(error = %e, "safe_state_write_failed");
            }
        }
    }
}
