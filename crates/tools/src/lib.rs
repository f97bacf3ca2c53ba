//! Built-in tool implementations for Forgeloop.
//!
//! The coding agent works on the local workspace through four tools:
//! `read_file`, `write_file`, `bash` (allow-listed) and `search_files`.

pub mod file_read;
pub mod file_write;
pub mod search;
pub mod shell;

use forgeloop_core::tool::ToolRegistry;

pub use file_read::FileReadTool;
pub use file_write::FileWriteTool;
pub use search::SearchFilesTool;
pub use shell::BashTool;

/// Create a registry with every built-in tool.
///
/// `allowed_commands` is the program-name prefix list for `bash`; an empty
/// list means no command may run.
pub fn default_registry(allowed_commands: Vec<String>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(FileReadTool));
    registry.register(Box::new(FileWriteTool));
    registry.register(Box::new(BashTool::new(allowed_commands)));
    registry.register(Box::new(SearchFilesTool));
    registry
}

/// Pull a required string argument out of a tool's JSON arguments.
pub(crate) fn required_str<'a>(
    arguments: &'a serde_json::Value,
    key: &str,
) -> Result<&'a str, forgeloop_core::error::ToolError> {
    arguments[key].as_str().ok_or_else(|| {
        forgeloop_core::error::ToolError::InvalidArguments(format!("Missing '{key}' argument"))
    })
}
