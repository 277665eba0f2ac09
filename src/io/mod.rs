//! IO modules - hardware lines and the outbound telemetry call
//!
//! - `hardware` - GPIO error taxonomy and bounded retry policy
//! - `gpio` - Linux sysfs pins and the door pin set
//! - `sim` - Simulated pins for development and tests
//! - `telemetry` - HTTP reporter for occupancy counts
//! - `collector` - In-process stand-in for the occupancy collector

pub mod collector;
pub mod gpio;
pub mod hardware;
pub mod sim;
pub mod telemetry;

// Re-export commonly used types
pub use gpio::{DoorPins, SimTaps, SysfsPin};
pub use hardware::{HardwareError, RetryPolicy};
pub use sim::{SimInput, SimOutput};
pub use telemetry::{CountReporter, LogOnlyReporter, ReportOutcome, TelemetryReporter};
