//! Prometheus metrics setup and metric definitions

use crate::domain::TokenKind;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub const AUTHZ_DECISIONS_TOTAL: &str = "authgate_authz_decisions_total";
pub const PERMISSION_RESOLUTIONS_TOTAL: &str = "authgate_permission_resolutions_total";
pub const TOKEN_CLASSIFICATIONS_TOTAL: &str = "authgate_token_classifications_total";

/// Install the Prometheus recorder and return a handle for rendering metrics.
pub fn install_prometheus_recorder() -> anyhow::Result<PrometheusHandle> {
    // Sub-millisecond buckets: most decisions never leave the process
    let buckets = [
        0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
    ];

    let handle = PrometheusBuilder::new()
        .set_buckets(&buckets)?
        .install_recorder()?;
    Ok(handle)
}

/// Register metric descriptions and emit initial zero values so Prometheus output
/// includes HELP/TYPE lines for all metrics from startup (not just after first use).
pub fn describe_metrics() {
    // HTTP metrics
    describe_counter!("authgate_http_requests_total", "Total number of HTTP requests");
    describe_histogram!(
        "authgate_http_request_duration_seconds",
        "HTTP request duration in seconds"
    );
    describe_gauge!(
        "authgate_http_requests_in_flight",
        "Number of HTTP requests currently being processed"
    );

    // Authorization metrics
    describe_counter!(
        AUTHZ_DECISIONS_TOTAL,
        "Authorization decisions by outcome (allow/deny/error)"
    );
    describe_counter!(
        PERMISSION_RESOLUTIONS_TOTAL,
        "Route to permission resolutions by outcome (hit/miss/error)"
    );
    describe_counter!(
        TOKEN_CLASSIFICATIONS_TOTAL,
        "Bearer credentials classified by kind (system/app/user/invalid)"
    );

    counter!(AUTHZ_DECISIONS_TOTAL, "outcome" => "allow").absolute(0);
    counter!(AUTHZ_DECISIONS_TOTAL, "outcome" => "deny").absolute(0);
    counter!(PERMISSION_RESOLUTIONS_TOTAL, "outcome" => "hit").absolute(0);
    counter!(PERMISSION_RESOLUTIONS_TOTAL, "outcome" => "miss").absolute(0);
    counter!(TOKEN_CLASSIFICATIONS_TOTAL, "kind" => "invalid").absolute(0);
    histogram!("authgate_http_request_duration_seconds", "method" => "GET", "path" => "/health")
        .record(0.0);
    gauge!("authgate_http_requests_in_flight").set(0.0);
}

pub fn record_decision(outcome: &'static str) {
    counter!(AUTHZ_DECISIONS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_resolution(outcome: &'static str) {
    counter!(PERMISSION_RESOLUTIONS_TOTAL, "outcome" => outcome).increment(1);
}

/// `None` records a rejected credential
pub fn record_classification(kind: Option<TokenKind>) {
    let label = kind.map(|k| k.as_str()).unwrap_or("invalid");
    counter!(TOKEN_CLASSIFICATIONS_TOTAL, "kind" => label).increment(1);
}
