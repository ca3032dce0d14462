pub mod agent;
pub mod ai;
pub mod config;
pub mod event_bus;
pub mod lifecycle;
pub mod limiter;
pub mod probes;
pub mod prompt;
pub mod run;
pub mod safety;
pub mod scheduler;
pub mod skills;
pub mod store;
pub mod telemetry;
pub mod tools;

/// Convenience re-exports for the most commonly used traits and types across
/// the warden codebase.
///
/// ```rust
/// use warden::prelude::*;
/// ```
pub mod prelude {
    // Agent model
    pub use crate::agent::{Agent, ApprovalMode, AutonomyLevel, Environment, Guardrails};

    // Provider contract
    pub use crate::ai::{ChatProvider, CompletionRequest, CompletionResponse, RetryingProvider};

    // Tool system
    pub use crate::tools::{Tool, ToolRegistry, extract_target};

    // Safety engine
    pub use crate::safety::{ActionStatus, CooldownTracker, Decision, SafetyEngine};

    // Skills
    pub use crate::skills::{Skill, SkillCache, SkillLoader};

    // Run execution
    pub use crate::run::{Run, RunConfig, RunPhase, Runner, Trigger};

    // Admission & scheduling
    pub use crate::limiter::{RateLimiter, RateLimiterConfig};
    pub use crate::scheduler::Scheduler;

    // Persistence
    pub use crate::store::{MemoryRunStore, RunStore};

    // Event bus
    pub use crate::event_bus::{AppEvent, EventBus, TokioBroadcastBus};
}
