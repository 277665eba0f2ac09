//! Shared types for the door controller

use serde::Serialize;

/// Physical position of the door leaf
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DoorState {
    #[default]
    Closed,
    Open,
}

impl DoorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DoorState::Closed => "closed",
            DoorState::Open => "open",
        }
    }
}

/// Which presence sensor a reading came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorSide {
    Outer,
    Inner,
}

impl SensorSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorSide::Outer => "outer",
            SensorSide::Inner => "inner",
        }
    }
}

/// Direction of a person moving through the doorway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Passage {
    Entry,
    Exit,
}

impl Passage {
    /// Sensor whose activation starts this passage
    pub fn trigger(&self) -> SensorSide {
        match self {
            Passage::Entry => SensorSide::Outer,
            Passage::Exit => SensorSide::Inner,
        }
    }

    /// Sensor whose activation confirms this passage
    pub fn confirmation(&self) -> SensorSide {
        match self {
            Passage::Entry => SensorSide::Inner,
            Passage::Exit => SensorSide::Outer,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Passage::Entry => "entry",
            Passage::Exit => "exit",
        }
    }
}

/// Detection state machine position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionState {
    #[default]
    Idle,
    EntryInProgress,
    ExitInProgress,
}

impl DetectionState {
    pub fn in_progress(passage: Passage) -> Self {
        match passage {
            Passage::Entry => DetectionState::EntryInProgress,
            Passage::Exit => DetectionState::ExitInProgress,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionState::Idle => "idle",
            DetectionState::EntryInProgress => "entry_in_progress",
            DetectionState::ExitInProgress => "exit_in_progress",
        }
    }
}

/// How a triggered passage was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PassageOutcome {
    /// Second sensor fired inside the confirmation window
    Committed { passage: Passage, occupancy: u32 },
    /// Confirmation window expired
    Abandoned { passage: Passage },
}

impl PassageOutcome {
    pub fn passage(&self) -> Passage {
        match self {
            PassageOutcome::Committed { passage, .. } | PassageOutcome::Abandoned { passage } => {
                *passage
            }
        }
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, PassageOutcome::Committed { .. })
    }
}

/// Body of the outbound occupancy report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PeopleCountPayload {
    pub jumlah_orang: u32,
}
