//! `read_file`: return a file's contents.

use async_trait::async_trait;
use forgeloop_core::error::ToolError;
use forgeloop_core::tool::{Tool, ToolResult};

use crate::required_str;

pub struct FileReadTool;

#[async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file at the given path."
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let path = required_str(&arguments, "path")?;

        match tokio::fs::read_to_string(path).await {
            Ok(content) => {
                let bytes = content.len();
                Ok(ToolResult::ok(content).with_metadata("bytes", bytes))
            }
            Err(e) => Ok(ToolResult::failure(format!("Failed to read {path}: {e}"))),
        }
    }
}
