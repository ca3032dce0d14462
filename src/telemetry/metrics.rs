//! Metric name taxonomy and the Prometheus exporter.
//!
//! Metric names are contract — dashboards and alerts reference them.
//! Everything is prefixed `warden_`.

use std::net::SocketAddr;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};

// ─── Names ───────────────────────────────────────────────────────────────────

pub const RUNS_TOTAL: &str = "warden_runs_total";
pub const TOKENS_USED_TOTAL: &str = "warden_tokens_used_total";
pub const ITERATIONS_TOTAL: &str = "warden_iterations_total";
pub const GUARDRAIL_BLOCKS_TOTAL: &str = "warden_guardrail_blocks_total";
pub const FINDINGS_TOTAL: &str = "warden_findings_total";
pub const ESCALATIONS_TOTAL: &str = "warden_escalations_total";
pub const RUN_DURATION_SECONDS: &str = "warden_run_duration_seconds";
pub const SCHEDULE_LAG_SECONDS: &str = "warden_schedule_lag_seconds";
pub const ACTIVE_RUNS: &str = "warden_active_runs";

/// Bucket boundaries for `warden_run_duration_seconds`.
pub const RUN_DURATION_BUCKETS: &[f64] = &[
    1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0, 2400.0,
];

// ─── Exporter ────────────────────────────────────────────────────────────────

/// Install the Prometheus recorder and start the scrape listener.
pub fn install_exporter(bind_address: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(bind_address)
        .set_buckets_for_metric(
            Matcher::Full(RUN_DURATION_SECONDS.to_string()),
            RUN_DURATION_BUCKETS,
        )
        .map_err(|e| format!("invalid histogram buckets: {e}"))?
        .install()
        .map_err(|e| format!("failed to install prometheus exporter: {e}"))
}

// ─── Recording helpers ───────────────────────────────────────────────────────

pub fn record_run_completed(agent: &str, status: &str, duration_secs: f64) {
    counter!(RUNS_TOTAL, "agent" => agent.to_string(), "status" => status.to_string())
        .increment(1);
    histogram!(RUN_DURATION_SECONDS, "agent" => agent.to_string()).record(duration_secs);
}

pub fn record_tokens(agent: &str, model: &str, tokens: u64) {
    counter!(TOKENS_USED_TOTAL, "agent" => agent.to_string(), "model" => model.to_string())
        .increment(tokens);
}

pub fn record_iteration(agent: &str) {
    counter!(ITERATIONS_TOTAL, "agent" => agent.to_string()).increment(1);
}

pub fn record_guardrail_block(agent: &str, action: &str) {
    counter!(GUARDRAIL_BLOCKS_TOTAL, "agent" => agent.to_string(), "action" => action.to_string())
        .increment(1);
}

pub fn record_finding(agent: &str, severity: &str) {
    counter!(FINDINGS_TOTAL, "agent" => agent.to_string(), "severity" => severity.to_string())
        .increment(1);
}

pub fn record_escalation(agent: &str, reason: &str) {
    counter!(ESCALATIONS_TOTAL, "agent" => agent.to_string(), "reason" => reason.to_string())
        .increment(1);
}

pub fn record_schedule_lag(agent: &str, lag_secs: f64) {
    gauge!(SCHEDULE_LAG_SECONDS, "agent" => agent.to_string()).set(lag_secs);
}

pub fn active_runs_delta(delta: i64) {
    if delta >= 0 {
        gauge!(ACTIVE_RUNS).increment(delta as f64);
    } else {
        gauge!(ACTIVE_RUNS).decrement((-delta) as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_names_are_prefixed() {
        for name in [
            RUNS_TOTAL,
            TOKENS_USED_TOTAL,
            ITERATIONS_TOTAL,
            GUARDRAIL_BLOCKS_TOTAL,
            FINDINGS_TOTAL,
            ESCALATIONS_TOTAL,
            RUN_DURATION_SECONDS,
            SCHEDULE_LAG_SECONDS,
            ACTIVE_RUNS,
        ] {
            assert!(name.starts_with("warden_"), "{name}");
        }
    }

    #[test]
    fn duration_buckets_are_sorted() {
        let mut sorted = RUN_DURATION_BUCKETS.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        assert_eq!(sorted.as_slice(), RUN_DURATION_BUCKETS);
        assert_eq!(RUN_DURATION_BUCKETS.len(), 10);
    }

    #[test]
    fn recording_without_exporter_does_not_panic() {
        record_run_completed("ops/watchman", "succeeded", 12.5);
        record_tokens("ops/watchman", "m", 800);
        record_guardrail_block("ops/watchman", "kubectl.delete");
        record_schedule_lag("ops/watchman", 61.0);
        active_runs_delta(1);
        active_runs_delta(-1);
    }
}
