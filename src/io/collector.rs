//! Stand-in for the occupancy collector
//!
//! Accepts `POST /api/people` with `{"jumlah_orang": n}` and answers 201, or
//! 400 when the count is missing. Can be told to answer every report with a
//! fixed failure status. Backs the `mock-collector` binary and the telemetry
//! integration tests.

use crate::io::telemetry::PEOPLE_COUNT_PATH;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Shared collector state: behavior switch and everything received
#[derive(Debug, Default)]
pub struct CollectorState {
    fail_status: Option<u16>,
    received: Mutex<Vec<u32>>,
}

impl CollectorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every report with `status` instead of 201
    pub fn failing_with(status: u16) -> Self {
        Self { fail_status: Some(status), ..Self::default() }
    }

    /// Counts accepted so far, in arrival order
    pub fn received(&self) -> Vec<u32> {
        self.received.lock().clone()
    }
}

fn json_response(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .expect("static response should not fail")
}

/// Pull the count out of a report body
fn parse_count(body: &[u8]) -> Option<u32> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    value.get("jumlah_orang")?.as_u64().and_then(|n| u32::try_from(n).ok())
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<CollectorState>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    if req.method() != Method::POST || req.uri().path() != PEOPLE_COUNT_PATH {
        return Ok(json_response(StatusCode::NOT_FOUND, r#"{"error":"not_found"}"#.to_string()));
    }

    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(error = %e, "collector_body_read_failed");
            return Ok(json_response(StatusCode::BAD_REQUEST, r#"{"error":"unreadable_body"}"#.to_string()));
        }
    };

    let Some(count) = parse_count(&body) else {
        warn!(body = %String::from_utf8_lossy(&body), "collector_missing_count");
        return Ok(json_response(
            StatusCode::BAD_REQUEST,
            r#"{"error":"jumlah_orang is required"}"#.to_string(),
        ));
    };

    if let Some(status) = state.fail_status {
        warn!(count = %count, status = %status, "collector_forced_failure");
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return Ok(json_response(status, r#"{"error":"forced_failure"}"#.to_string()));
    }

    state.received.lock().push(count);
    info!(count = %count, "collector_count_received");
    Ok(json_response(StatusCode::CREATED, format!(r#"{{"jumlah_orang":{count}}}"#)))
}

/// Serve reports on `listener` until shutdown flips to true
pub async fn serve(
    listener: TcpListener,
    state: Arc<CollectorState>,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    info!(addr = %listener.local_addr()?, "collector_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let state = state.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let state = state.clone();
                                async move { handle_request(req, state).await }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "collector_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "collector_accept_error");
                    }
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("collector_shutdown");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_count() {
        assert_eq!(parse_count(br#"{"jumlah_orang": 3}"#), Some(3));
        assert_eq!(parse_count(br#"{"jumlah_orang": 0, "extra": true}"#), Some(0));
    }

    #[test]
    fn test_parse_count_rejects_bad_bodies() {
        assert_eq!(parse_count(br#"{}"#), None);
        assert_eq!(parse_count(br#"{"jumlah_orang": "3"}"#), None);
        assert_eq!(parse_count(br#"{"jumlah_orang": -1}"#), None);
        assert_eq!(parse_count(b"not json"), None);
    }

    #[test]
    fn test_failing_state_records_nothing() {
        let state = CollectorState::failing_with(503);
        assert_eq!(state.fail_status, Some(503));
        assert!(state.received().is_empty());
    }
}
