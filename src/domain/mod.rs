//! Domain models - door, detection and passage types

pub mod types;

pub use types::{DetectionState, DoorState, Passage, PassageOutcome, SensorSide};
