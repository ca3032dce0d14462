//! Error types for the skill system.

use thiserror::Error;

/// Errors that can occur while resolving, parsing, or validating skills.
#[derive(Debug, Error)]
pub enum SkillError {
    #[error("skill not found: {0}")]
    NotFound(String),

    #[error("unsupported skill source: {0}")]
    UnsupportedSource(String),

    #[error("failed to parse skill: {0}")]
    Parse(String),

    #[error("invalid skill definition: {0}")]
    Invalid(String),

    #[error("skill source fetch failed: {0}")]
    Fetch(String),

    #[error("skill artifact too large: {size} bytes (cap {cap})")]
    TooLarge { size: u64, cap: u64 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<serde_yaml::Error> for SkillError {
    fn from(err: serde_yaml::Error) -> Self {
        SkillError::Parse(err.to_string())
    }
}

/// Result type for skill operations.
pub type SkillResult<T> = Result<T, SkillError>;
