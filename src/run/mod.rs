//! Run execution: the audit record model and the conversation loop.

pub mod findings;
pub mod orchestrator;
pub mod record;
pub mod sanitize;

pub use findings::extract_findings;
pub use orchestrator::{RunConfig, Runner};
pub use record::{
    ActionRecord, Finding, FindingSeverity, GuardrailSummary, Run, RunPhase, Trigger, Usage,
};
pub use sanitize::sanitize_action_result;
