//! The safety engine: deterministic pre-flight evaluation of tool calls.
//!
//! Every tool call proposed by the model passes through
//! [`SafetyEngine::evaluate`] before any side effect occurs.  The pipeline
//! runs a fixed sequence of checks — action-registry match, blast-radius
//! assessment, hardcoded data protection, configurable protection classes,
//! tool-level classification, data-resource impact, autonomy ceiling,
//! deny/allow lists, cooldowns, and the undeclared-mutation rule — and the
//! first check that blocks wins.

pub mod blast;
pub mod cooldown;
pub mod decision;
pub mod engine;
pub mod matching;
pub mod protection;

pub use blast::{Assessment, BlastInput, BlastLevel, BlastTarget, MutationDepth};
pub use cooldown::CooldownTracker;
pub use decision::{ActionStatus, Decision, PreFlight};
pub use engine::SafetyEngine;
pub use matching::glob_match;
pub use protection::{ProtectionAction, ProtectionClass, ProtectionEngine, ProtectionRule};
