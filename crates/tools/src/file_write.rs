//! `write_file`: create or overwrite a file, creating parent directories.

use async_trait::async_trait;
use forgeloop_core::error::ToolError;
use forgeloop_core::tool::{Tool, ToolResult};

use crate::required_str;

pub struct FileWriteTool;

#[async_trait]
impl Tool for FileWriteTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file, creating parent directories as needed."
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let path = required_str(&arguments, "path")?;
        let content = required_str(&arguments, "content")?;

        if let Some(parent) = std::path::Path::new(path).parent()
            && !parent.as_os_str().is_empty()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            return Ok(ToolResult::failure(format!("Failed to create directory: {e}")));
        }

        match tokio::fs::write(path, content).await {
            Ok(()) => Ok(
                ToolResult::ok(format!("Successfully wrote {} bytes to {path}", content.len()))
                    .with_metadata("bytes", content.len()),
            ),
            Err(e) => Ok(ToolResult::failure(format!("Failed to write file: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("src/api/mod.rs");

        let result = FileWriteTool
            .execute(serde_json::json!({
                "path": file_path.to_str().unwrap(),
                "content": "pub mod routes;\n",
            }))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(std::fs::read_to_string(&file_path).unwrap(), "pub mod routes;\n");
    }

    #[tokio::test]
    async fn missing_content_is_error() {
        let result = FileWriteTool
            .execute(serde_json::json!({ "path": "out.txt" }))
            .await;
        assert!(matches!(result, Err(ToolError::InvalidArguments(_))));
    }
}
