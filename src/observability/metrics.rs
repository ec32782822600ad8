//! Metrics collection and exposition.
//!
//! # Metrics
//! - `configd_sessions_active` (gauge): live sessions
//! - `configd_commits_total` (counter): commits by outcome
//! - `configd_commit_duration_seconds` (histogram): commit latency
//! - `configd_commit_actions_total` (counter): external actions by outcome
//! - `configd_rpc_requests_total` (counter): RPC calls by method, outcome
//!
//! # Design Decisions
//! - Recording is a no-op until [`init_metrics`] installs the exporter
//! - Outcome labels are a small fixed set to bound cardinality

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Duration;

/// Install the Prometheus recorder and its HTTP scrape listener.
///
/// Must be called from inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    describe();
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

fn describe() {
    describe_gauge!("configd_sessions_active", "Number of open configuration sessions");
    describe_counter!("configd_commits_total", "Commits by outcome");
    describe_histogram!("configd_commit_duration_seconds", "Commit duration in seconds");
    describe_counter!(
        "configd_commit_actions_total",
        "External commit actions by outcome"
    );
    describe_counter!("configd_rpc_requests_total", "RPC requests by method and outcome");
}

pub fn record_sessions_active(count: usize) {
    gauge!("configd_sessions_active").set(count as f64);
}

/// `outcome` is one of `applied`, `empty`, `invalid`, `failed`, `busy`.
pub fn record_commit(outcome: &'static str, elapsed: Duration) {
    counter!("configd_commits_total", "outcome" => outcome).increment(1);
    histogram!("configd_commit_duration_seconds").record(elapsed.as_secs_f64());
}

pub fn record_action(success: bool) {
    let outcome = if success { "success" } else { "failure" };
    counter!("configd_commit_actions_total", "outcome" => outcome).increment(1);
}

pub fn record_rpc(method: &'static str, outcome: &'static str) {
    counter!("configd_rpc_requests_total", "method" => method, "outcome" => outcome).increment(1);
}
