//! Observability: metric taxonomy and tracing/OTLP initialization.

pub mod metrics;
pub mod tracing_init;

pub use tracing_init::init_tracing;
