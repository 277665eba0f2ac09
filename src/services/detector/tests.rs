//! Tests for the detection state machine
//!
//! All tests run on paused tokio time: motor ramps, confirmation windows and
//! cooldowns advance instantly while keeping their relative order.

use super::*;
use crate::io::gpio::SimTaps;
use crate::io::sim::{SimInput, SimOutput};
use crate::services::report_worker::{report_channel, CountReport};
use tokio::sync::mpsc;

/// Test harness that keeps the report receiver and pin taps alive
struct TestController {
    controller: DoorController<SimInput, SimOutput>,
    taps: SimTaps,
    reports: mpsc::Receiver<CountReport>,
    metrics: Arc<Metrics>,
}

impl std::ops::Deref for TestController {
    type Target = DoorController<SimInput, SimOutput>;
    fn deref(&self) -> &Self::Target {
        &self.controller
    }
}

impl std::ops::DerefMut for TestController {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.controller
    }
}

impl TestController {
    fn reported_counts(&mut self) -> Vec<u32> {
        let mut counts = Vec::new();
        while let Ok(report) = self.reports.try_recv() {
            counts.push(report.count);
        }
        counts
    }
}

async fn create_test_controller() -> TestController {
    create_test_controller_with_config(Config::default()).await
}

async fn create_test_controller_with_config(config: Config) -> TestController {
    let metrics = Arc::new(Metrics::new());
    let (pins, taps) = DoorPins::simulated();
    let (sender, reports) = report_channel(metrics.clone(), 16);
    let mut controller = DoorController::new(pins, &config, sender, metrics.clone());
    controller.initialize().await.unwrap();
    TestController { controller, taps, reports, metrics }
}

fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

#[tokio::test(start_paused = true)]
async fn test_initial_state() {
    let tc = create_test_controller().await;
    assert_eq!(tc.state(), DetectionState::Idle);
    assert_eq!(tc.door_state(), DoorState::Closed);
    assert_eq!(tc.occupancy(), 0);
    assert!(!tc.taps.light_on());
    assert_eq!(tc.taps.energized_coils(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_idle_tick_without_sensors_does_nothing() {
    let mut tc = create_test_controller().await;
    let outcomes = tc.poll_once().await.unwrap();
    assert!(outcomes.is_empty());
    assert_eq!(tc.taps.motor_activations(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_entry_committed_when_inner_fires_in_window() {
    let mut tc = create_test_controller().await;
    // Door travel is 500 steps at 1/150 s, about 3.3 s
    tc.taps.outer_sensor.pulse(millis(300));
    tc.taps.inner_sensor.pulse_after(secs(4), millis(500));

    let outcomes = tc.poll_once().await.unwrap();

    assert_eq!(outcomes, vec![PassageOutcome::Committed { passage: Passage::Entry, occupancy: 1 }]);
    assert_eq!(tc.occupancy(), 1);
    assert!(tc.taps.light_on());
    assert_eq!(tc.door_state(), DoorState::Closed);
    assert_eq!(tc.state(), DetectionState::Idle);
    assert_eq!(tc.reported_counts(), vec![1]);
    // One open and one close ramp
    assert_eq!(tc.metrics.motor_steps_total(), 1000);
}

#[tokio::test(start_paused = true)]
async fn test_entry_abandoned_when_window_expires() {
    let mut tc = create_test_controller().await;
    tc.taps.outer_sensor.pulse(millis(300));

    let outcomes = tc.poll_once().await.unwrap();

    assert_eq!(outcomes, vec![PassageOutcome::Abandoned { passage: Passage::Entry }]);
    assert_eq!(tc.occupancy(), 0);
    assert!(!tc.taps.light_on());
    assert_eq!(tc.door_state(), DoorState::Closed);
    assert!(tc.reported_counts().is_empty());

    let summary = tc.metrics.report();
    assert_eq!(summary.abandoned_entries_total, 1);
    assert_eq!(summary.door_opens_total, 1);
    assert_eq!(summary.door_closes_total, 1);
}

#[tokio::test(start_paused = true)]
async fn test_inner_after_window_does_not_count() {
    let mut tc = create_test_controller().await;
    // Window runs from ~3.3 s to ~8.3 s
    tc.taps.outer_sensor.pulse(millis(300));
    tc.taps.inner_sensor.pulse_after(secs(9), millis(500));

    let outcomes = tc.poll_once().await.unwrap();
    assert_eq!(outcomes[0], PassageOutcome::Abandoned { passage: Passage::Entry });
    assert_eq!(tc.occupancy(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_window_starts_after_trigger_clears() {
    let mut tc = create_test_controller().await;
    // Person lingers on the outer sensor well past the door opening.
    // Window is 6 s..11 s; counted from the open it would end at ~8.3 s.
    tc.taps.outer_sensor.pulse(secs(6));
    tc.taps.inner_sensor.pulse_after(secs(10), millis(500));

    let outcomes = tc.poll_once().await.unwrap();
    assert!(outcomes[0].is_committed());
    assert_eq!(tc.occupancy(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_exit_at_zero_stays_at_zero() {
    let mut tc = create_test_controller().await;
    tc.taps.inner_sensor.pulse(millis(300));
    tc.taps.outer_sensor.pulse_after(secs(4), millis(500));

    let outcomes = tc.poll_once().await.unwrap();

    assert_eq!(outcomes, vec![PassageOutcome::Committed { passage: Passage::Exit, occupancy: 0 }]);
    assert_eq!(tc.occupancy(), 0);
    assert!(!tc.taps.light_on());
    // Exits are not reported
    assert!(tc.reported_counts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_exit_from_three_keeps_light_on() {
    let mut tc = create_test_controller().await;
    for _ in 0..3 {
        tc.controller.occupancy.increment().await.unwrap();
    }
    tc.taps.inner_sensor.pulse(millis(300));
    tc.taps.outer_sensor.pulse_after(secs(4), millis(500));

    let outcomes = tc.poll_once().await.unwrap();

    assert_eq!(outcomes, vec![PassageOutcome::Committed { passage: Passage::Exit, occupancy: 2 }]);
    assert_eq!(tc.occupancy(), 2);
    assert!(tc.taps.light_on());
    assert!(tc.reported_counts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_exit_abandoned_leaves_count() {
    let mut tc = create_test_controller().await;
    tc.controller.occupancy.increment().await.unwrap();
    tc.taps.inner_sensor.pulse(millis(300));

    let outcomes = tc.poll_once().await.unwrap();
    assert_eq!(outcomes, vec![PassageOutcome::Abandoned { passage: Passage::Exit }]);
    assert_eq!(tc.occupancy(), 1);
    assert!(tc.taps.light_on());
}

#[tokio::test(start_paused = true)]
async fn test_entry_wins_when_both_sensors_active() {
    let mut tc = create_test_controller().await;
    tc.taps.outer_sensor.pulse(millis(300));
    tc.taps.inner_sensor.pulse(millis(300));

    let outcomes = tc.poll_once().await.unwrap();

    // Inner cleared long before the window opened, and is idle again by the
    // time the exit branch is checked
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].passage(), Passage::Entry);
}

#[tokio::test(start_paused = true)]
async fn test_both_branches_checked_in_one_tick() {
    let mut tc = create_test_controller().await;
    // Entry abandons: open 3.3 s, window to 8.3 s, close to 11.7 s, cooldown to 16.7 s.
    // Inner is active when the exit branch is evaluated right after.
    tc.taps.outer_sensor.pulse(millis(300));
    tc.taps.inner_sensor.pulse_after(secs(16), secs(1));

    let outcomes = tc.poll_once().await.unwrap();

    assert_eq!(
        outcomes,
        vec![
            PassageOutcome::Abandoned { passage: Passage::Entry },
            PassageOutcome::Abandoned { passage: Passage::Exit },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_cooldown_follows_every_passage() {
    let mut tc = create_test_controller().await;
    tc.taps.outer_sensor.pulse(millis(300));
    tc.taps.inner_sensor.pulse_after(secs(4), millis(500));
    let start = Instant::now();

    tc.poll_once().await.unwrap();

    let travel = tc.controller.door.travel_time();
    assert!(start.elapsed() >= travel * 2 + secs(5));
}

#[tokio::test(start_paused = true)]
async fn test_custom_timing() {
    let config = Config::default().with_motor(20, 5.0).with_detection_timing(50, 1000, 200);
    let mut tc = create_test_controller_with_config(config).await;
    tc.taps.outer_sensor.pulse(millis(100));
    tc.taps.inner_sensor.pulse_after(millis(500), millis(100));
    let start = Instant::now();

    let outcomes = tc.poll_once().await.unwrap();

    assert!(outcomes[0].is_committed());
    assert_eq!(tc.metrics.motor_steps_total(), 40);
    assert!(start.elapsed() < secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_transient_read_failure_is_retried() {
    let mut tc = create_test_controller().await;
    tc.taps.outer_sensor.fail_next(2);

    let outcomes = tc.poll_once().await.unwrap();
    assert!(outcomes.is_empty());
    assert_eq!(tc.metrics.hardware_retries_total(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_persistent_read_failure_is_fatal_and_leaves_outputs_safe() {
    let mut tc = create_test_controller().await;
    tc.controller.occupancy.increment().await.unwrap();
    assert!(tc.taps.light_on());
    tc.taps.inner_sensor.fail_always();

    let (_tx, rx) = watch::channel(false);
    let err = tc.run(rx).await.unwrap_err();

    assert!(matches!(err, HardwareError::RetriesExhausted { line: "inner", attempts: 3, .. }));
    assert!(!tc.taps.light_on());
    assert_eq!(tc.taps.energized_coils(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_motor_failure_is_fatal() {
    let mut tc = create_test_controller().await;
    tc.taps.motor[1].fail_always();
    tc.taps.outer_sensor.pulse(millis(300));

    let (_tx, rx) = watch::channel(false);
    let err = tc.run(rx).await.unwrap_err();
    assert_eq!(err.line(), Some("motor_b"));
    assert_eq!(tc.door_state(), DoorState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_mid_motion_releases_outputs() {
    let mut tc = create_test_controller().await;
    tc.controller.occupancy.increment().await.unwrap();
    tc.taps.outer_sensor.pulse(millis(300));
    let taps = tc.taps.clone();

    let (tx, rx) = watch::channel(false);
    let stop = async move {
        sleep(secs(1)).await;
        // Door is half way through its opening ramp
        assert_eq!(taps.energized_coils(), 1);
        tx.send(true).unwrap();
    };

    let (result, ()) = tokio::join!(tc.controller.run(rx), stop);

    assert!(result.is_ok());
    assert_eq!(tc.taps.energized_coils(), 0);
    assert!(!tc.taps.light_on());
    // The interrupted ramp never completed
    assert_eq!(tc.door_state(), DoorState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_run_handles_consecutive_entries() {
    let mut tc = create_test_controller().await;
    // First entry resolves by ~12.4 s including cooldown
    tc.taps.outer_sensor.pulse(millis(300));
    tc.taps.inner_sensor.pulse_after(secs(4), millis(500));
    tc.taps.outer_sensor.pulse_after(secs(13), millis(300));
    tc.taps.inner_sensor.pulse_after(secs(17), millis(500));

    let (tx, rx) = watch::channel(false);
    let stop = async move {
        sleep(secs(30)).await;
        tx.send(true).unwrap();
    };
    let (result, ()) = tokio::join!(tc.controller.run(rx), stop);

    assert!(result.is_ok());
    assert_eq!(tc.occupancy(), 2);
    assert_eq!(tc.reported_counts(), vec![1, 2]);
    assert_eq!(tc.metrics.report().entries_total, 2);
}
