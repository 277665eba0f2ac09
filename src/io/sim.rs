//! Simulated GPIO lines
//!
//! Cloneable pin handles around shared state. The controller owns one clone,
//! the caller keeps another to drive sensors or inspect outputs. Used by the
//! `simulated` backend and throughout the tests.
//!
//! Timing uses the tokio clock so scripted sensors follow paused test time.

use embedded_hal::digital::{self, ErrorKind, ErrorType, InputPin, OutputPin};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Injected pin fault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimFault;

impl digital::Error for SimFault {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

#[derive(Debug, Default)]
struct InputState {
    forced: Option<bool>,
    /// Active intervals [start, end)
    windows: Vec<(Instant, Instant)>,
    failures_pending: u32,
    fail_always: bool,
    reads: u64,
}

impl InputState {
    fn level(&self, now: Instant) -> bool {
        self.forced
            .unwrap_or_else(|| self.windows.iter().any(|(start, end)| *start <= now && now < *end))
    }
}

/// Presence sensor line driven from test or stdin
#[derive(Debug, Clone, Default)]
pub struct SimInput {
    state: Arc<Mutex<InputState>>,
}

impl SimInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold the line at a fixed level until [`SimInput::release`]
    pub fn set(&self, active: bool) {
        self.state.lock().forced = Some(active);
    }

    /// Drop a forced level, falling back to scripted windows
    pub fn release(&self) {
        self.state.lock().forced = None;
    }

    /// Activate the line for `duration` starting now
    pub fn pulse(&self, duration: Duration) {
        self.pulse_after(Duration::ZERO, duration);
    }

    /// Activate the line for `duration` starting `offset` from now
    pub fn pulse_after(&self, offset: Duration, duration: Duration) {
        let now = Instant::now();
        let start = now + offset;
        let mut state = self.state.lock();
        // Expired windows can never match again
        state.windows.retain(|(_, end)| *end > now);
        state.windows.push((start, start + duration));
    }

    /// Fail the next `count` reads
    pub fn fail_next(&self, count: u32) {
        self.state.lock().failures_pending = count;
    }

    /// Fail every read from now on
    pub fn fail_always(&self) {
        self.state.lock().fail_always = true;
    }

    pub fn reads(&self) -> u64 {
        self.state.lock().reads
    }
}

impl ErrorType for SimInput {
    type Error = SimFault;
}

impl InputPin for SimInput {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        let mut state = self.state.lock();
        state.reads += 1;
        if state.fail_always {
            return Err(SimFault);
        }
        if state.failures_pending > 0 {
            state.failures_pending -= 1;
            return Err(SimFault);
        }
        Ok(state.level(Instant::now()))
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.is_high().map(|high| !high)
    }
}

#[derive(Debug, Default)]
struct OutputState {
    high: bool,
    writes: u64,
    rising_edges: u64,
    failures_pending: u32,
    fail_always: bool,
}

/// Output line that records what was written to it
#[derive(Debug, Clone, Default)]
pub struct SimOutput {
    state: Arc<Mutex<OutputState>>,
}

impl SimOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start at a given level without counting a write
    pub fn with_level(high: bool) -> Self {
        let output = Self::default();
        output.state.lock().high = high;
        output
    }

    pub fn is_set_high(&self) -> bool {
        self.state.lock().high
    }

    /// Total successful writes
    pub fn writes(&self) -> u64 {
        self.state.lock().writes
    }

    /// Low-to-high transitions, one per energized motor phase
    pub fn rising_edges(&self) -> u64 {
        self.state.lock().rising_edges
    }

    pub fn fail_next(&self, count: u32) {
        self.state.lock().failures_pending = count;
    }

    pub fn fail_always(&self) {
        self.state.lock().fail_always = true;
    }

    fn write(&self, high: bool) -> Result<(), SimFault> {
        let mut state = self.state.lock();
        if state.fail_always {
            return Err(SimFault);
        }
        if state.failures_pending > 0 {
            state.failures_pending -= 1;
            return Err(SimFault);
        }
        if high && !state.high {
            state.rising_edges += 1;
        }
        state.high = high;
        state.writes += 1;
        Ok(())
    }
}

impl ErrorType for SimOutput {
    type Error = SimFault;
}

impl OutputPin for SimOutput {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.write(false)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.write(true)
    }
}
