//! Hardware access errors and the bounded retry policy
//!
//! Every GPIO read and write goes through [`RetryPolicy`]. A line that keeps
//! failing after `max_attempts` is reported as [`HardwareError::RetriesExhausted`],
//! which the controller treats as fatal.

use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use embedded_hal::digital::{self, ErrorKind};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum HardwareError {
    #[error("failed to read line {line}: {detail}")]
    Read { line: &'static str, detail: String },

    #[error("failed to write line {line}: {detail}")]
    Write { line: &'static str, detail: String },

    #[error("failed to set up gpio{pin}: {source}")]
    Setup {
        pin: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line} failed {attempts} times, last error: {last}")]
    RetriesExhausted { line: &'static str, attempts: u32, last: Box<HardwareError> },
}

impl HardwareError {
    /// Wrap a pin driver error from a failed read
    pub fn read<E: digital::Error>(line: &'static str, err: E) -> Self {
        HardwareError::Read { line, detail: describe(&err) }
    }

    /// Wrap a pin driver error from a failed write
    pub fn write<E: digital::Error>(line: &'static str, err: E) -> Self {
        HardwareError::Write { line, detail: describe(&err) }
    }

    /// Name of the line that failed, if known
    pub fn line(&self) -> Option<&'static str> {
        match self {
            HardwareError::Read { line, .. }
            | HardwareError::Write { line, .. }
            | HardwareError::RetriesExhausted { line, .. } => Some(line),
            HardwareError::Setup { .. } => None,
        }
    }
}

fn describe<E: digital::Error>(err: &E) -> String {
    match err.kind() {
        ErrorKind::Other => format!("{err:?}"),
        kind => format!("{kind:?}: {err:?}"),
    }
}

/// How many times a GPIO operation is attempted before it is fatal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, delay: Duration::from_millis(10) }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.hardware_max_attempts().max(1),
            delay: Duration::from_millis(config.hardware_retry_delay_ms()),
        }
    }

    /// Single attempt, no delay
    pub fn no_retry() -> Self {
        Self { max_attempts: 1, delay: Duration::ZERO }
    }

    /// Run `op` until it succeeds or the attempts are used up.
    ///
    /// The operation itself is synchronous (a pin access); only the pause
    /// between attempts yields to the runtime.
    pub async fn run<T, F>(
        &self,
        line: &'static str,
        metrics: &Metrics,
        mut op: F,
    ) -> Result<T, HardwareError>
    where
        F: FnMut() -> Result<T, HardwareError>,
    {
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts => {
                    warn!(line = %line, attempt = %attempt, error = %e, "gpio_retry");
                    metrics.record_hardware_retry();
                    attempt += 1;
                    if !self.delay.is_zero() {
                        tokio::time::sleep(self.delay).await;
                    }
                }
                Err(e) if self.max_attempts == 1 => return Err(e),
                Err(e) => {
                    return Err(HardwareError::RetriesExhausted {
                        line,
                        attempts: attempt,
                        last: Box::new(e),
                    })
                }
            }
        }
    }
}
