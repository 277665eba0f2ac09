//! Report worker - sends occupancy counts off the detection loop
//!
//! The detection loop enqueues counts with `try_send` and never waits on the
//! network. The worker drains the queue and hands each count to a
//! [`CountReporter`]. Failures are counted and logged, never propagated.

use crate::infra::metrics::Metrics;
use crate::io::telemetry::{CountReporter, ReportOutcome};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// A count waiting to be reported
#[derive(Debug)]
pub struct CountReport {
    pub count: u32,
    /// When the count was enqueued (for queue delay measurement)
    pub enqueued_at: Instant,
}

/// Cheap handle the detection loop uses to queue reports
#[derive(Clone)]
pub struct ReportSender {
    tx: mpsc::Sender<CountReport>,
    metrics: Arc<Metrics>,
}

impl ReportSender {
    /// Queue a count; dropped with a warning if the queue is full or closed
    pub fn send_count(&self, count: u32) -> bool {
        let report = CountReport { count, enqueued_at: Instant::now() };
        match self.tx.try_send(report) {
            Ok(()) => true,
            Err(e) => {
                warn!(count = %count, error = %e, "telemetry_report_dropped");
                self.metrics.record_report_dropped();
                false
            }
        }
    }
}

/// Worker that delivers queued counts
pub struct ReportWorker<R> {
    reporter: Arc<R>,
    rx: mpsc::Receiver<CountReport>,
    metrics: Arc<Metrics>,
}

impl<R: CountReporter> ReportWorker<R> {
    pub fn new(reporter: Arc<R>, rx: mpsc::Receiver<CountReport>, metrics: Arc<Metrics>) -> Self {
        Self { reporter, rx, metrics }
    }

    /// Run the worker, processing reports until every sender is dropped
    pub async fn run(mut self) {
        info!("report_worker_started");

        while let Some(report) = self.rx.recv().await {
            let queue_delay_ms = report.enqueued_at.elapsed().as_millis() as u64;

            match self.reporter.report(report.count).await {
                ReportOutcome::Delivered => self.metrics.record_report_delivered(),
                outcome => {
                    self.metrics.record_report_failed();
                    warn!(count = %report.count, outcome = ?outcome, "telemetry_report_not_delivered");
                }
            }

            tracing::debug!(
                count = %report.count,
                queue_delay_ms = %queue_delay_ms,
                "report_processed"
            );
        }

        info!("report_worker_stopped");
    }
}

/// Create a report queue and worker
///
/// Returns the sender (for the detection loop) and the worker (to be spawned)
pub fn create_report_worker<R: CountReporter>(
    reporter: Arc<R>,
    metrics: Arc<Metrics>,
    buffer_size: usize,
) -> (ReportSender, ReportWorker<R>) {
    let (tx, rx) = mpsc::channel(buffer_size);
    let sender = ReportSender { tx, metrics: metrics.clone() };
    let worker = ReportWorker::new(reporter, rx, metrics);
    (sender, worker)
}

/// Report queue whose receiver stays with the caller (tests, tools)
pub fn report_channel(
    metrics: Arc<Metrics>,
    buffer_size: usize,
) -> (ReportSender, mpsc::Receiver<CountReport>) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (ReportSender { tx, metrics }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Records every count and answers with a fixed outcome
    struct RecordingReporter {
        outcome: ReportOutcome,
        seen: Mutex<Vec<u32>>,
    }

    impl RecordingReporter {
        fn new(outcome: ReportOutcome) -> Arc<Self> {
            Arc::new(Self { outcome, seen: Mutex::new(Vec::new()) })
        }
    }

    #[async_trait]
    impl CountReporter for RecordingReporter {
        async fn report(&self, count: u32) -> ReportOutcome {
            self.seen.lock().push(count);
            self.outcome
        }
    }

    #[tokio::test]
    async fn test_worker_delivers_in_order() {
        let metrics = Arc::new(Metrics::new());
        let reporter = RecordingReporter::new(ReportOutcome::Delivered);
        let (sender, worker) = create_report_worker(reporter.clone(), metrics.clone(), 8);

        assert!(sender.send_count(1));
        assert!(sender.send_count(2));
        drop(sender);
        worker.run().await;

        assert_eq!(*reporter.seen.lock(), vec![1, 2]);
        assert_eq!(metrics.report().reports_delivered_total, 2);
    }

    #[tokio::test]
    async fn test_worker_survives_rejections() {
        let metrics = Arc::new(Metrics::new());
        let reporter = RecordingReporter::new(ReportOutcome::Rejected { status: 500 });
        let (sender, worker) = create_report_worker(reporter.clone(), metrics.clone(), 8);

        sender.send_count(1);
        sender.send_count(2);
        sender.send_count(3);
        drop(sender);
        worker.run().await;

        assert_eq!(reporter.seen.lock().len(), 3);
        let summary = metrics.report();
        assert_eq!(summary.reports_failed_total, 3);
        assert_eq!(summary.reports_delivered_total, 0);
    }

    #[test]
    fn test_full_queue_drops_without_blocking() {
        let metrics = Arc::new(Metrics::new());
        let (sender, mut rx) = report_channel(metrics.clone(), 1);

        assert!(sender.send_count(1));
        assert!(!sender.send_count(2));
        assert_eq!(metrics.report().reports_dropped_total, 1);
        assert_eq!(rx.try_recv().unwrap().count, 1);
    }
}
