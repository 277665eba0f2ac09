//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics so the detection loop and the telemetry worker can record
//! without coordination. Reporting takes a snapshot of every counter.
//!
//! NOTE: All atomics use Relaxed ordering. These are statistical counters
//! only. Do NOT use them for coordination or logic decisions.

use crate::domain::types::{DoorState, Passage};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Door state values for the gauge
pub const DOOR_STATE_CLOSED: u64 = 0;
pub const DOOR_STATE_OPEN: u64 = 1;

/// Lock-free metrics collector
pub struct Metrics {
    /// Committed entries (monotonic)
    entries_total: AtomicU64,
    /// Committed exits (monotonic)
    exits_total: AtomicU64,
    /// Entries abandoned after the confirmation window (monotonic)
    abandoned_entries_total: AtomicU64,
    /// Exits abandoned after the confirmation window (monotonic)
    abandoned_exits_total: AtomicU64,
    /// Motor phase steps driven (monotonic)
    motor_steps_total: AtomicU64,
    /// Completed open sequences (monotonic)
    door_opens_total: AtomicU64,
    /// Completed close sequences (monotonic)
    door_closes_total: AtomicU64,
    /// Current door state (0=closed, 1=open)
    door_state: AtomicU64,
    /// Current occupancy as last applied to the relay
    occupancy: AtomicU64,
    /// GPIO operations that needed a retry (monotonic)
    hardware_retries_total: AtomicU64,
    /// Reports acknowledged with 201 (monotonic)
    reports_delivered_total: AtomicU64,
    /// Reports rejected or failed in transport (monotonic)
    reports_failed_total: AtomicU64,
    /// Reports dropped because the queue was full (monotonic)
    reports_dropped_total: AtomicU64,
    /// Creation time, for uptime
    started_at: Instant,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            entries_total: AtomicU64::new(0),
            exits_total: AtomicU64::new(0),
            abandoned_entries_total: AtomicU64::new(0),
            abandoned_exits_total: AtomicU64::new(0),
            motor_steps_total: AtomicU64::new(0),
            door_opens_total: AtomicU64::new(0),
            door_closes_total: AtomicU64::new(0),
            door_state: AtomicU64::new(DOOR_STATE_CLOSED),
            occupancy: AtomicU64::new(0),
            hardware_retries_total: AtomicU64::new(0),
            reports_delivered_total: AtomicU64::new(0),
            reports_failed_total: AtomicU64::new(0),
            reports_dropped_total: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    #[inline]
    pub fn record_committed(&self, passage: Passage) {
        match passage {
            Passage::Entry => self.entries_total.fetch_add(1, Ordering::Relaxed),
            Passage::Exit => self.exits_total.fetch_add(1, Ordering::Relaxed),
        };
    }

    #[inline]
    pub fn record_abandoned(&self, passage: Passage) {
        match passage {
            Passage::Entry => self.abandoned_entries_total.fetch_add(1, Ordering::Relaxed),
            Passage::Exit => self.abandoned_exits_total.fetch_add(1, Ordering::Relaxed),
        };
    }

    #[inline]
    pub fn record_motor_steps(&self, steps: u64) {
        self.motor_steps_total.fetch_add(steps, Ordering::Relaxed);
    }

    /// Record a completed motion sequence and the resulting door state
    #[inline]
    pub fn record_door_motion(&self, state: DoorState) {
        match state {
            DoorState::Open => {
                self.door_opens_total.fetch_add(1, Ordering::Relaxed);
                self.door_state.store(DOOR_STATE_OPEN, Ordering::Relaxed);
            }
            DoorState::Closed => {
                self.door_closes_total.fetch_add(1, Ordering::Relaxed);
                self.door_state.store(DOOR_STATE_CLOSED, Ordering::Relaxed);
            }
        }
    }

    #[inline]
    pub fn set_occupancy(&self, count: u32) {
        self.occupancy.store(u64::from(count), Ordering::Relaxed);
    }

    #[inline]
    pub fn record_hardware_retry(&self) {
        self.hardware_retries_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_report_delivered(&self) {
        self.reports_delivered_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_report_failed(&self) {
        self.reports_failed_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_report_dropped(&self) {
        self.reports_dropped_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn motor_steps_total(&self) -> u64 {
        self.motor_steps_total.load(Ordering::Relaxed)
    }

    pub fn hardware_retries_total(&self) -> u64 {
        self.hardware_retries_total.load(Ordering::Relaxed)
    }

    /// Snapshot all counters
    pub fn report(&self) -> MetricsSummary {
        MetricsSummary {
            uptime_secs: self.started_at.elapsed().as_secs(),
            entries_total: self.entries_total.load(Ordering::Relaxed),
            exits_total: self.exits_total.load(Ordering::Relaxed),
            abandoned_entries_total: self.abandoned_entries_total.load(Ordering::Relaxed),
            abandoned_exits_total: self.abandoned_exits_total.load(Ordering::Relaxed),
            motor_steps_total: self.motor_steps_total.load(Ordering::Relaxed),
            door_opens_total: self.door_opens_total.load(Ordering::Relaxed),
            door_closes_total: self.door_closes_total.load(Ordering::Relaxed),
            door_state: self.door_state.load(Ordering::Relaxed),
            occupancy: self.occupancy.load(Ordering::Relaxed),
            hardware_retries_total: self.hardware_retries_total.load(Ordering::Relaxed),
            reports_delivered_total: self.reports_delivered_total.load(Ordering::Relaxed),
            reports_failed_total: self.reports_failed_total.load(Ordering::Relaxed),
            reports_dropped_total: self.reports_dropped_total.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of all counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSummary {
    pub uptime_secs: u64,
    pub entries_total: u64,
    pub exits_total: u64,
    pub abandoned_entries_total: u64,
    pub abandoned_exits_total: u64,
    pub motor_steps_total: u64,
    pub door_opens_total: u64,
    pub door_closes_total: u64,
    pub door_state: u64,
    pub occupancy: u64,
    pub hardware_retries_total: u64,
    pub reports_delivered_total: u64,
    pub reports_failed_total: u64,
    pub reports_dropped_total: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            uptime_secs = %self.uptime_secs,
            occupancy = %self.occupancy,
            door = if self.door_state == DOOR_STATE_OPEN { "open" } else { "closed" },
            entries = %self.entries_total,
            exits = %self.exits_total,
            abandoned_entries = %self.abandoned_entries_total,
            abandoned_exits = %self.abandoned_exits_total,
            door_opens = %self.door_opens_total,
            door_closes = %self.door_closes_total,
            motor_steps = %self.motor_steps_total,
            hw_retries = %self.hardware_retries_total,
            reports_ok = %self.reports_delivered_total,
            reports_failed = %self.reports_failed_total,
            reports_dropped = %self.reports_dropped_total,
            "metrics"
        );
    }
}
