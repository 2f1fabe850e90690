//! Prometheus metrics for the authentication server.
//!
//! When `METRICS_BIND` is set, metrics are exposed in Prometheus text format
//! on that address. Without an installed exporter the recording calls are
//! no-ops.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use pb_server::metrics;
//! use std::net::SocketAddr;
//!
//! let addr: SocketAddr = "127.0.0.1:9090".parse().unwrap();
//! metrics::init_metrics(addr).unwrap();
//!
//! metrics::http_requests_total("POST", "/auth/login", 200);
//! metrics::login_attempts_total(true);
//! ```

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Initialize Prometheus metrics exporter.
///
/// Metrics will be available at `http://<addr>/metrics`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {}", e))
}

// ============================================================================
// HTTP Metrics
// ============================================================================

/// Record HTTP request.
pub fn http_requests_total(method: &str, path: &str, status: u16) {
    metrics::counter!("http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record HTTP request duration in milliseconds.
pub fn http_request_duration_ms(method: &str, path: &str, duration_ms: f64) {
    metrics::histogram!("http_request_duration_ms",
        "method" => method.to_string(),
        "path" => path.to_string()
    )
    .record(duration_ms);
}

// ============================================================================
// Auth Metrics
// ============================================================================

/// Increment registrations counter.
pub fn registrations_total() {
    metrics::counter!("registrations_total").increment(1);
}

/// Increment login attempts counter.
pub fn login_attempts_total(success: bool) {
    metrics::counter!("login_attempts_total",
        "success" => success.to_string()
    )
    .increment(1);
}

/// Increment session refresh counter.
pub fn session_refreshes_total(success: bool) {
    metrics::counter!("session_refreshes_total",
        "success" => success.to_string()
    )
    .increment(1);
}

/// Increment password email counter; `flow` is `reset` or `set`.
pub fn password_emails_total(flow: &'static str) {
    metrics::counter!("password_emails_total", "flow" => flow).increment(1);
}

/// Increment OAuth login counter.
pub fn oauth_logins_total(success: bool) {
    metrics::counter!("oauth_logins_total",
        "success" => success.to_string()
    )
    .increment(1);
}

/// Add to the purged reset-token counter.
pub fn reset_tokens_purged_total(count: u64) {
    metrics::counter!("reset_tokens_purged_total").increment(count);
}
