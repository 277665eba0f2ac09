//! Occupancy counter and the light relay
//!
//! The only writer of the relay line. The relay is active low: the light is
//! on (line low) whenever at least one person is inside.

use crate::infra::metrics::Metrics;
use crate::io::hardware::{HardwareError, RetryPolicy};
use embedded_hal::digital::{OutputPin, PinState};
use std::sync::Arc;
use tracing::info;

const RELAY_LINE: &str = "relay";

/// Relay line level for a given occupancy
#[inline]
pub fn relay_level(count: u32) -> PinState {
    if count >= 1 {
        PinState::Low
    } else {
        PinState::High
    }
}

pub struct Occupancy<O> {
    count: u32,
    relay: O,
    retry: RetryPolicy,
    metrics: Arc<Metrics>,
}

impl<O: OutputPin> Occupancy<O> {
    pub fn new(relay: O, retry: RetryPolicy, metrics: Arc<Metrics>) -> Self {
        Self { count: 0, relay, retry, metrics }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn light_on(&self) -> bool {
        relay_level(self.count) == PinState::Low
    }

    /// One more person inside
    pub async fn increment(&mut self) -> Result<u32, HardwareError> {
        self.count = self.count.saturating_add(1);
        self.apply_relay().await?;
        Ok(self.count)
    }

    /// One person left; floors at zero
    pub async fn decrement(&mut self) -> Result<u32, HardwareError> {
        self.count = self.count.saturating_sub(1);
        self.apply_relay().await?;
        Ok(self.count)
    }

    /// Drive the relay line from the current count
    pub async fn apply_relay(&mut self) -> Result<(), HardwareError> {
        let level = relay_level(self.count);
        let relay = &mut self.relay;
        self.retry
            .run(RELAY_LINE, &self.metrics, || {
                relay.set_state(level).map_err(|e| HardwareError::write(RELAY_LINE, e))
            })
            .await?;
        self.metrics.set_occupancy(self.count);
        info!(occupancy = %self.count, light = %(level == PinState::Low), "relay_applied");
        Ok(())
    }

    /// Switch the light off without touching the count (shutdown path)
    pub fn switch_off_now(&mut self) -> Result<(), HardwareError> {
        self.relay.set_high().map_err(|e| HardwareError::write(RELAY_LINE, e))
    }
}
