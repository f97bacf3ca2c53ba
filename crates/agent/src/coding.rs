//! Coding role: executes one task at a time and captures what worked.

use chrono::Utc;
use forgeloop_core::error::{Error, GatewayError, ToolError};
use forgeloop_core::event::DomainEvent;
use forgeloop_core::knowledge::{CodePattern, Solution};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::agent::Agent;
use crate::parse::{infer_pattern_type, parse_file_blocks};
use crate::plan::{Task, TaskResult, TestRun};

/// Result of [`CodingAgent::analyze_code`].
#[derive(Debug, Clone)]
pub struct CodeAnalysis {
    pub path: String,
    pub content: String,
    pub analysis: String,
}

pub struct CodingAgent {
    agent: Agent,
    test_command: Option<String>,
    apply_file_blocks: bool,
}

impl CodingAgent {
    /// Wrap an agent built with [`crate::AgentRole::Coding`].
    pub fn new(agent: Agent) -> Self {
        Self {
            agent,
            test_command: None,
            apply_file_blocks: false,
        }
    }

    /// Run this command through `bash` after every task.
    pub fn with_test_command(mut self, command: Option<String>) -> Self {
        self.test_command = command;
        self
    }

    /// Write `FILE:` blocks found in task output to disk.
    pub fn with_file_blocks(mut self, apply: bool) -> Self {
        self.apply_file_blocks = apply;
        self
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    pub fn agent_mut(&mut self) -> &mut Agent {
        &mut self.agent
    }

    /// Execute one task without history.
    ///
    /// `success` means the model produced output; test runs are recorded
    /// alongside but do not change it.
    pub async fn execute_task(
        &mut self,
        task: &Task,
        plan_context: Option<&str>,
    ) -> Result<TaskResult, GatewayError> {
        let context = plan_context
            .map(|c| format!("Context:\n{c}"))
            .unwrap_or_default();
        let prompt = format!(
            "Execute this coding task:\n\nTask: {}\nComplexity: {}\n\n{context}\n\n\
             Use available tools to implement this task.\n\
             Test your changes if possible.\n\
             Report the result clearly.",
            task.description, task.complexity
        );

        let output = self.agent.converse(&prompt, false).await?;
        let mut result = TaskResult::new(task.clone(), true, output);

        if self.apply_file_blocks {
            for block in parse_file_blocks(&result.output) {
                let (ok, payload) = self
                    .write_code(&block.path, &block.content, &task.description)
                    .await;
                if !ok {
                    warn!(path = %block.path, error = %payload, "Could not apply file block");
                }
            }
        }

        result.test_results = self.run_tests().await;
        info!(task = %task.id, tests = result.test_results.len(), "Task executed");
        Ok(result)
    }

    /// Write a file and, when that works, remember its content as a pattern.
    ///
    /// The pattern write is best-effort: a store failure is logged and the
    /// file write result is returned unchanged.
    pub async fn write_code(&self, path: &str, content: &str, description: &str) -> (bool, String) {
        let (ok, payload) = self
            .agent
            .invoke_tool("write_file", json!({ "path": path, "content": content }))
            .await;
        if !ok {
            return (ok, payload);
        }

        let pattern = CodePattern::new(infer_pattern_type(description), content, description)
            .with_context(format!("File: {path}"));
        match self.agent.knowledge().add_pattern(pattern).await {
            Ok(stored) => {
                debug!(id = stored.id, pattern_type = %stored.pattern_type, "Pattern captured");
                self.agent.publish(DomainEvent::KnowledgeUpdated {
                    operation: "add_pattern".into(),
                    record_id: stored.id,
                    timestamp: Utc::now(),
                });
            }
            Err(e) => warn!(error = %e, path, "Failed to capture pattern"),
        }

        (ok, payload)
    }

    /// Run the configured test command, if any.
    pub async fn run_tests(&self) -> Vec<TestRun> {
        let Some(command) = &self.test_command else {
            return Vec::new();
        };
        let (success, output) = self
            .agent
            .invoke_tool("bash", json!({ "command": command }))
            .await;
        vec![TestRun {
            command: command.clone(),
            success,
            output,
        }]
    }

    /// Read a file and ask for a quality assessment, without history.
    pub async fn analyze_code(&mut self, path: &str) -> Result<CodeAnalysis, Error> {
        let (ok, content) = self
            .agent
            .invoke_tool("read_file", json!({ "path": path }))
            .await;
        if !ok {
            return Err(ToolError::ExecutionFailed {
                tool_name: "read_file".into(),
                reason: content,
            }
            .into());
        }

        let prompt = format!(
            "Analyze this code:\n\n{content}\n\nProvide:\n\
             - Code quality assessment\n\
             - Potential issues\n\
             - Suggestions for improvement\n\
             - Complexity estimate"
        );
        let analysis = self.agent.converse(&prompt, false).await?;

        Ok(CodeAnalysis {
            path: path.to_string(),
            content,
            analysis,
        })
    }

    /// Persist a successful result as a `coding_task` solution.
    ///
    /// Best-effort: returns `None` for failed results and for store errors.
    pub async fn learn_from_execution(&self, result: &TaskResult) -> Option<Solution> {
        if !result.success {
            return None;
        }

        let task = serde_json::to_value(&result.task).unwrap_or_default();
        let solution = Solution::new(
            "coding_task",
            result.output.as_str(),
            format!("Successfully completed: {}", result.task.description),
        )
        .with_metadata("task", task);

        match self.agent.knowledge().add_solution(solution).await {
            Ok(stored) => {
                self.agent.publish(DomainEvent::KnowledgeUpdated {
                    operation: "add_solution".into(),
                    record_id: stored.id,
                    timestamp: Utc::now(),
                });
                Some(stored)
            }
            Err(e) => {
                warn!(error = %e, task = %result.task.id, "Failed to record solution");
                None
            }
        }
    }
}
