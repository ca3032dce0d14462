//! Declarative agent model: identity, policy, schedule, and environment.

pub mod environment;
pub mod types;

pub use environment::{DataResourceIndex, Endpoint, Environment, McpServer, NamespaceGroup};
pub use types::{
    Agent, ApprovalMode, AutonomyLevel, Escalation, Guardrails, ModelSettings, ModelTier,
    Reporting, ScheduleSpec, SkillRef,
};
