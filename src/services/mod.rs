//! Services - door control logic
//!
//! - `stepper` - Four-coil stepper phase driver
//! - `door_motion` - Open/close ramps and door state
//! - `occupancy` - People counter and light relay
//! - `detector` - Sensor polling and passage state machine
//! - `report_worker` - Async telemetry worker

pub mod detector;
pub mod door_motion;
pub mod occupancy;
pub mod report_worker;
pub mod stepper;

// Re-export commonly used types
pub use detector::DoorController;
pub use door_motion::DoorMotion;
pub use occupancy::Occupancy;
pub use report_worker::{create_report_worker, report_channel, ReportSender, ReportWorker};
