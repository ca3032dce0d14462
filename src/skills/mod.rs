//! Skill system: typed skill/action model, source resolution, and caching.
//!
//! A skill is a markdown instruction bundle (`SKILL.md`, YAML frontmatter +
//! body) with an optional Action Sheet (`actions.yaml`) declaring the tool
//! actions the skill is permitted to drive.  Skills resolve from four source
//! kinds (`bundled`, `configmap://`, `git://`, `oci://`) through the loader
//! and are cached content-addressed with a TTL.

pub mod cache;
pub mod embedded;
pub mod error;
pub mod loader;
pub mod source;
pub mod types;

pub use cache::SkillCache;
pub use error::{SkillError, SkillResult};
pub use loader::{ConfigMapSource, SkillLoader};
pub use source::SkillSource;
pub use types::{Action, ActionSheet, ActionTier, Skill, ValidationReport};
