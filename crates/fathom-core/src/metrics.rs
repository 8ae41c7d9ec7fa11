//! Prometheus metrics helpers for the fathom processor.
//!
//! This module provides centralized metrics initialization and the common
//! metric definitions used across components.
//!
//! # Usage
//!
//! ```rust,ignore
//! use fathom_core::metrics::{init_metrics, start_metrics_server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let handle = init_metrics();
//!     let addr = start_metrics_server(9090, handle).await.unwrap();
//!     tracing::info!("metrics on {addr}");
//!
//!     use metrics::{counter, gauge};
//!     counter!("processor_blocks_total").increment(1);
//!     gauge!("processor_last_block").set(42.0);
//! }
//! ```
//!
//! # Metric Naming Conventions
//!
//! - Prefix: component name (`processor_`, `archive_`, `batch_`)
//! - Suffix: unit or type (`_total`, `_seconds`)
//! - Labels: used sparingly to avoid cardinality explosion

use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;

/// Environment variables consulted for the metrics listen port, in order.
const PORT_ENV_VARS: &[&str] = &["PROCESSOR_PROMETHEUS_PORT", "PROMETHEUS_PORT"];

/// Initialize the Prometheus metrics recorder.
///
/// Must be called once at startup before any metrics are recorded. Returns
/// a handle for [`start_metrics_server`].
///
/// # Panics
///
/// Panics if called more than once (the recorder can only be installed once).
pub fn init_metrics() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder");

    register_common_metrics();

    handle
}

/// Like [`init_metrics`] but returns `None` if a recorder is already
/// installed, instead of panicking. Useful for tests.
pub fn try_init_metrics() -> Option<PrometheusHandle> {
    PrometheusBuilder::new().install_recorder().ok()
}

/// Resolve the metrics listen port from the environment.
///
/// Checks `PROCESSOR_PROMETHEUS_PORT`, then `PROMETHEUS_PORT`. Returns
/// `None` when neither is set or the value does not parse.
pub fn prometheus_port_from_env() -> Option<u16> {
    PORT_ENV_VARS
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find_map(|value| value.trim().parse().ok())
}

/// Start the Prometheus metrics HTTP server.
///
/// Serves the `/metrics` endpoint on the given port; port `0` binds an
/// ephemeral port. The server runs on a background task; the bound address
/// is returned so callers can log or scrape it.
pub async fn start_metrics_server(
    port: u16,
    handle: PrometheusHandle,
) -> Result<SocketAddr, std::io::Error> {
    let app = Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound = listener.local_addr()?;
    tracing::info!("Metrics server listening on http://{}/metrics", bound);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Metrics server failed: {}", e);
        }
    });

    Ok(bound)
}

/// Register descriptions for the metrics emitted by the processor.
///
/// Called automatically by [`init_metrics`].
fn register_common_metrics() {
    // =========================================================================
    // Progress
    // =========================================================================

    describe_gauge!(
        "processor_last_block",
        "Highest block committed to the database"
    );
    describe_gauge!(
        "processor_archive_height",
        "Last observed archive height (-1 before the first observation)"
    );
    describe_counter!(
        "processor_blocks_total",
        "Blocks delivered to the handler"
    );
    describe_counter!(
        "processor_items_total",
        "Items (logs and transactions) delivered to the handler"
    );
    describe_counter!("processor_batches_total", "Batches processed");

    // =========================================================================
    // Archive client
    // =========================================================================

    describe_counter!("archive_requests_total", "Archive HTTP requests issued");
    describe_counter!(
        "archive_retries_total",
        "Archive requests retried after a transient failure"
    );
    describe_histogram!(
        "archive_query_duration_seconds",
        "Wall time of archive query round trips"
    );
}

/// Set a gauge value.
///
/// Convenience wrapper around `metrics::gauge!`.
#[inline]
pub fn set_gauge(name: &'static str, value: f64) {
    metrics::gauge!(name).set(value);
}

/// Increment a counter.
///
/// Convenience wrapper around `metrics::counter!`.
#[inline]
pub fn increment(name: &'static str, count: u64) {
    metrics::counter!(name).increment(count);
}
