//! Occupancy reporting to the external collector
//!
//! `POST {collector_url}/api/people` with `{"jumlah_orang": <count>}`.
//! The collector answers 201 on success. Anything else is logged and dropped.

use crate::domain::types::PeopleCountPayload;
use crate::infra::config::Config;
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

pub const PEOPLE_COUNT_PATH: &str = "/api/people";

/// Result of one report attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    /// Collector answered 201
    Delivered,
    /// Collector answered with any other status
    Rejected { status: u16 },
    /// Connection, timeout or client setup failure
    TransportFailed,
}

impl ReportOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, ReportOutcome::Delivered)
    }
}

/// Something that can deliver an occupancy count
#[async_trait]
pub trait CountReporter: Send + Sync {
    async fn report(&self, count: u32) -> ReportOutcome;
}

/// Reporter backed by a reusable reqwest client
pub struct TelemetryReporter {
    endpoint: String,
    http_client: Option<reqwest::Client>,
}

impl TelemetryReporter {
    pub fn new(config: &Config) -> Self {
        Self::with_endpoint(
            people_count_endpoint(config.collector_url()),
            Duration::from_millis(config.telemetry_timeout_ms()),
        )
    }

    pub fn with_endpoint(endpoint: String, timeout: Duration) -> Self {
        // Create HTTP client once for reuse (connection pooling)
        let http_client = match reqwest::Client::builder().timeout(timeout).build() {
            Ok(client) => Some(client),
            Err(e) => {
                error!(error = %e, "telemetry_client_build_failed");
                None
            }
        };
        Self { endpoint, http_client }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Join the collector base URL and the people-count path
pub fn people_count_endpoint(base_url: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), PEOPLE_COUNT_PATH)
}

#[async_trait]
impl CountReporter for TelemetryReporter {
    async fn report(&self, count: u32) -> ReportOutcome {
        let Some(ref client) = self.http_client else {
            error!(count = %count, "telemetry_client_not_initialized");
            return ReportOutcome::TransportFailed;
        };

        let start = Instant::now();
        let payload = PeopleCountPayload { jumlah_orang: count };

        match client.post(&self.endpoint).json(&payload).send().await {
            Ok(response) if response.status() == reqwest::StatusCode::CREATED => {
                info!(
                    count = %count,
                    latency_ms = %start.elapsed().as_millis(),
                    "telemetry_report_delivered"
                );
                ReportOutcome::Delivered
            }
            Ok(response) => {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                warn!(
                    count = %count,
                    status = %status,
                    body = %body,
                    latency_ms = %start.elapsed().as_millis(),
                    "telemetry_report_rejected"
                );
                ReportOutcome::Rejected { status }
            }
            Err(e) => {
                error!(
                    count = %count,
                    error = %e,
                    timeout = %e.is_timeout(),
                    latency_ms = %start.elapsed().as_millis(),
                    "telemetry_report_failed"
                );
                ReportOutcome::TransportFailed
            }
        }
    }
}

/// Reporter used when telemetry is disabled: logs the count only
pub struct LogOnlyReporter;

#[async_trait]
impl CountReporter for LogOnlyReporter {
    async fn report(&self, count: u32) -> ReportOutcome {
        info!(count = %count, "telemetry_disabled_count");
        ReportOutcome::Delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_join() {
        assert_eq!(
            people_count_endpoint("http://192.168.137.19:5000"),
            "http://192.168.137.19:5000/api/people"
        );
        assert_eq!(people_count_endpoint("http://collector/"), "http://collector/api/people");
    }

    #[test]
    fn test_reporter_uses_configured_url() {
        let config = Config::default().with_collector_url("http://10.0.0.2:8080");
        let reporter = TelemetryReporter::new(&config);
        assert_eq!(reporter.endpoint(), "http://10.0.0.2:8080/api/people");
    }

    #[tokio::test]
    async fn test_unreachable_collector_is_transport_failure() {
        // Port 9 (discard) on localhost is closed on test machines
        let reporter = TelemetryReporter::with_endpoint(
            people_count_endpoint("http://127.0.0.1:9"),
            Duration::from_millis(500),
        );
        assert_eq!(reporter.report(1).await, ReportOutcome::TransportFailed);
    }

    #[tokio::test]
    async fn test_log_only_reporter() {
        assert!(LogOnlyReporter.report(4).await.is_delivered());
    }
}
