//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Sessions, commit pipeline, persistence, RPC handlers produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (fmt layer, filtered by RUST_LOG or configured level)
//!     → Prometheus scrape endpoint (when enabled)
//! ```
//!
//! # Design Decisions
//! - Every state transition logs with `session`, `path`, or `commit_id` fields
//! - Metric updates go through the `metrics` facade and cost nothing when no
//!   recorder is installed (tests, disabled exporter)

pub mod logging;
pub mod metrics;
