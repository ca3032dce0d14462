//! Tool capability contracts and the dispatch registry.

pub mod registry;
pub mod target;
pub mod traits;

pub use registry::ToolRegistry;
pub use target::extract_target;
pub use traits::{ActionClassification, Capability, Tool, ToolDefinition, ToolDomain};
