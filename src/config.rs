//! Process flags.
//!
//! Flag names and defaults are contract — deployment manifests reference
//! them.  Duration-valued flags accept humantime forms (`168h`, `30s`).

use std::time::Duration;

use clap::Parser;

fn parse_duration(raw: &str) -> Result<Duration, String> {
    humantime::parse_duration(raw).map_err(|e| format!("invalid duration '{raw}': {e}"))
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "warden",
    about = "Policy-constrained control plane for LLM-driven infrastructure agents",
    version
)]
pub struct Flags {
    /// Address the Prometheus metrics endpoint binds to.
    #[arg(long, default_value = "0.0.0.0:9090")]
    pub metrics_bind_address: String,

    /// Address the health/readiness probe endpoint binds to.
    #[arg(long, default_value = "0.0.0.0:8081")]
    pub health_probe_bind_address: String,

    /// Enable leader election so only one active manager exists in a
    /// replicated deployment.
    #[arg(long, default_value_t = false)]
    pub leader_elect: bool,

    /// OTLP/gRPC endpoint for trace export; empty disables tracing export.
    /// Also read from OTEL_EXPORTER_OTLP_ENDPOINT.
    #[arg(long, default_value = "")]
    pub otel_endpoint: String,

    /// Age after completion at which run records become deletable.
    #[arg(long, default_value = "168h", value_parser = parse_duration)]
    pub retention_ttl: Duration,

    /// Interval between retention scans.
    #[arg(long, default_value = "1h", value_parser = parse_duration)]
    pub retention_scan_interval: Duration,

    /// Maximum run records deleted per retention scan.
    #[arg(long, default_value_t = 100)]
    pub retention_max_batch: usize,

    /// Newest runs preserved per agent regardless of age.
    #[arg(long, default_value_t = 5)]
    pub retention_preserve_min: usize,

    /// Time allowed for in-flight runs to finish on shutdown.
    #[arg(long, default_value = "30s", value_parser = parse_duration)]
    pub drain_timeout: Duration,

    /// Cluster-wide concurrent run cap.
    #[arg(long, default_value_t = 10)]
    pub max_concurrent_cluster: usize,

    /// Per-agent concurrent run cap.
    #[arg(long, default_value_t = 1)]
    pub max_concurrent_per_agent: usize,

    /// Directory of agent declarations (YAML) to schedule.
    #[arg(long, default_value = "")]
    pub agents_dir: String,
}

// ─── Tests ───────────────────────────────────────────────────────────────────
