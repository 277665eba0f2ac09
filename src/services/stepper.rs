//! Unipolar stepper driver
//!
//! Maps a step index to one of four coil phases. Exactly one coil is high at
//! a time. The table order must match the coil wiring: a wrong order turns
//! the motor the other way, which software cannot detect.
//!
//! ```text
//!   phase 0 -> D   phase 1 -> B   phase 2 -> C   phase 3 -> A
//! ```

use crate::infra::metrics::Metrics;
use crate::io::hardware::{HardwareError, RetryPolicy};
use embedded_hal::digital::{OutputPin, PinState};
use std::sync::Arc;

/// Motor line names, indexed like the coil array (A, B, C, D)
const LINE_NAMES: [&str; 4] = ["motor_a", "motor_b", "motor_c", "motor_d"];

/// Coil index (into A, B, C, D) energized for each phase
pub const PHASE_TABLE: [usize; 4] = [3, 1, 2, 0];

/// Coil to energize for a given step
#[inline]
pub fn coil_for_step(step: u32) -> usize {
    PHASE_TABLE[(step % 4) as usize]
}

pub struct StepperDriver<O> {
    /// Coil lines A, B, C, D
    coils: [O; 4],
    retry: RetryPolicy,
    metrics: Arc<Metrics>,
}

impl<O: OutputPin> StepperDriver<O> {
    pub fn new(coils: [O; 4], retry: RetryPolicy, metrics: Arc<Metrics>) -> Self {
        Self { coils, retry, metrics }
    }

    /// Energize the single coil for `step % 4`, all others low
    pub async fn set_phase(&mut self, step: u32) -> Result<(), HardwareError> {
        let active = coil_for_step(step);
        // Same write order as the wiring table: D, C, B, A
        for idx in (0..4).rev() {
            let state = if idx == active { PinState::High } else { PinState::Low };
            self.write(idx, state).await?;
        }
        Ok(())
    }

    /// De-energize every coil
    pub async fn release(&mut self) -> Result<(), HardwareError> {
        for idx in 0..4 {
            self.write(idx, PinState::Low).await?;
        }
        Ok(())
    }

    async fn write(&mut self, idx: usize, state: PinState) -> Result<(), HardwareError> {
        let line = LINE_NAMES[idx];
        let coil = &mut self.coils[idx];
        self.retry
            .run(line, &self.metrics, || {
                coil.set_state(state).map_err(|e| HardwareError::write(line, e))
            })
            .await
    }

    /// Best-effort release used on shutdown; keeps going past failed lines
    pub fn release_now(&mut self) -> Vec<HardwareError> {
        self.coils
            .iter_mut()
            .zip(LINE_NAMES)
            .filter_map(|(coil, line)| coil.set_low().err().map(|e| HardwareError::write(line, e)))
            .collect()
    }
}
