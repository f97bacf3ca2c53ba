//! `bash`: run an allow-listed shell command.
//!
//! The allow-list is a prefix check on the trimmed command text. It is a
//! coarse guardrail; it does not parse arguments and does not stop
//! `git; rm -rf .` style chaining.

use async_trait::async_trait;
use forgeloop_core::error::ToolError;
use forgeloop_core::tool::{Tool, ToolResult};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::required_str;

pub struct BashTool {
    allowed_commands: Vec<String>,
}

impl BashTool {
    pub fn new(allowed_commands: Vec<String>) -> Self {
        Self { allowed_commands }
    }

    /// True if the trimmed command starts with one of the allowed program names.
    /// An empty allow-list permits nothing.
    pub fn is_command_allowed(&self, command: &str) -> bool {
        let command = command.trim();
        !command.is_empty()
            && self
                .allowed_commands
                .iter()
                .filter(|a| !a.is_empty())
                .any(|a| command.starts_with(a.as_str()))
    }
}

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn description(&self) -> &str {
        "Run an allow-listed shell command and return its stdout."
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let command = required_str(&arguments, "command")?;

        if !self.is_command_allowed(command) {
            return Err(ToolError::CommandNotAllowed(command.to_string()));
        }

        debug!(command = %command, "Executing shell command");

        let output = if cfg!(target_os = "windows") {
            Command::new("cmd").args(["/C", command]).output().await
        } else {
            Command::new("sh").args(["-c", command]).output().await
        };
        let output = output.map_err(|e| ToolError::ExecutionFailed {
            tool_name: "bash".into(),
            reason: e.to_string(),
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let code = output.status.code().unwrap_or(-1);

        let result = if output.status.success() {
            ToolResult::ok(stdout)
        } else {
            warn!(command = %command, exit_code = code, "Command failed");
            let error = if stderr.trim().is_empty() {
                format!("Command exited with status {code}")
            } else {
                stderr.trim().to_string()
            };
            ToolResult {
                output: stdout,
                ..ToolResult::failure(error)
            }
        };

        Ok(result.with_metadata("exit_code", code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool() -> BashTool {
        BashTool::new(vec!["echo".into(), "git".into(), "pytest".into()])
    }

    #[test]
    fn prefix_allow_list() {
        let tool = tool();
        assert!(tool.is_command_allowed("git status"));
        assert!(tool.is_command_allowed("   pytest -v  "));
        assert!(!tool.is_command_allowed("rm -rf /"));
        assert!(!tool.is_command_allowed("sudo git status"));
        assert!(!tool.is_command_allowed("   "));
    }

    #[test]
    fn empty_allow_list_denies_everything() {
        let tool = BashTool::new(vec![]);
        assert!(!tool.is_command_allowed("echo hi"));
    }

    #[tokio::test]
    async fn rejected_command_never_runs() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("marker");
        let command = format!("touch {}", marker.display());

        let result = tool().execute(serde_json::json!({ "command": command })).await;
        assert!(matches!(result, Err(ToolError::CommandNotAllowed(_))));
        assert!(!marker.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runs_allowed_command() {
        let result = tool()
            .execute(serde_json::json!({ "command": "echo hello" }))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.output.trim(), "hello");
        assert_eq!(result.metadata["exit_code"], 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_is_failed_result() {
        let result = tool()
            .execute(serde_json::json!({ "command": "echo oops >&2; exit 3" }))
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("oops"));
        assert_eq!(result.metadata["exit_code"], 3);
    }
}
