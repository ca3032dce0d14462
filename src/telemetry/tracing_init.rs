//! Tracing subscriber setup, with optional OTLP export.
//!
//! Span taxonomy (names are contract):
//! - `agent.run` — parent span per run (`agent`, `trigger`)
//! - `agent.assemble` — prompt assembly
//! - `gen_ai.chat` — one model call (GenAI semconv attributes plus
//!   a custom `iteration`)
//! - `agent.tool_call` — one tool evaluation + execution
//! - `agent.report` — report finalization

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable consulted when no `--otel-endpoint` flag is given.
pub const OTEL_ENDPOINT_ENV: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

/// Initialize the global tracing subscriber.
///
/// `otel_endpoint` enables OTLP/gRPC span export when non-empty; it falls
/// back to `OTEL_EXPORTER_OTLP_ENDPOINT`, and an empty value disables
/// tracing export entirely (local fmt logging stays on).
pub fn init_tracing(otel_endpoint: Option<&str>) -> Result<(), String> {
    let endpoint = otel_endpoint
        .map(str::to_string)
        .filter(|e| !e.is_empty())
        .or_else(|| std::env::var(OTEL_ENDPOINT_ENV).ok().filter(|e| !e.is_empty()));

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);

    match endpoint {
        Some(endpoint) => {
            let provider = opentelemetry_otlp::new_pipeline()
                .tracing()
                .with_exporter(
                    opentelemetry_otlp::new_exporter()
                        .tonic()
                        .with_endpoint(endpoint),
                )
                .install_batch(opentelemetry_sdk::runtime::Tokio)
                .map_err(|e| format!("failed to install OTLP pipeline: {e}"))?;
            let tracer = provider.tracer("warden");
            opentelemetry::global::set_tracer_provider(provider);

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .with(tracing_opentelemetry::layer().with_tracer(tracer))
                .try_init()
                .map_err(|e| format!("failed to init tracing: {e}"))
        }
        None => tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| format!("failed to init tracing: {e}")),
    }
}
