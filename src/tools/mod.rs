pub mod builtin;
pub mod definition;
pub mod registry;

pub use definition::{JsonType, ToolCall, ToolDefinition, ToolDescriptor, ToolParam, ToolResult};
pub use registry::ToolRegistry;
