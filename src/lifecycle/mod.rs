//! Process lifecycle: in-flight run tracking, graceful drain, retention.

pub mod retention;
pub mod shutdown;
pub mod tracker;

pub use retention::{RetentionConfig, RetentionScanner};
pub use shutdown::ShutdownManager;
pub use tracker::{RunGuard, RunTracker};
