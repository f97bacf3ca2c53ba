//! Plan and task types shared by the role agents and the orchestrator.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Estimated effort for one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

impl Complexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of planned work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// `task_1`, `task_2`, ... in parse order
    pub id: String,
    pub description: String,
    pub complexity: Complexity,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

impl Task {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        complexity: Complexity,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            complexity,
            completed: false,
            result: None,
        }
    }
}

/// A stored pattern retrieved to give a planning pass context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeHit {
    pub pattern_id: i64,
    pub pattern_type: String,
    pub body: String,
    pub description: String,
    pub success_rate: f64,
}

/// A decomposition of one user request.
///
/// `subtasks` is never empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub request: String,
    pub narrative: String,
    pub subtasks: Vec<Task>,
    #[serde(default)]
    pub relevant_patterns: Vec<KnowledgeHit>,
    #[serde(default)]
    pub refined: bool,
}

impl Plan {
    pub fn completed_count(&self) -> usize {
        self.subtasks.iter().filter(|t| t.completed).count()
    }
}

/// Raw record of one test command run after a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRun {
    pub command: String,
    pub success: bool,
    pub output: String,
}

/// Outcome of executing one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task: Task,
    /// Authoritative for downstream scoring
    pub success: bool,
    pub output: String,
    #[serde(default)]
    pub test_results: Vec<TestRun>,
}

impl TaskResult {
    pub fn new(task: Task, success: bool, output: impl Into<String>) -> Self {
        Self {
            task,
            success,
            output: output.into(),
            test_results: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complexity_serializes_lowercase() {
        let json = serde_json::to_string(&Complexity::Medium).unwrap();
        assert_eq!(json, "\"medium\"");
        assert_eq!(Complexity::High.to_string(), "high");
    }

    #[test]
    fn completed_count_tracks_flags() {
        let mut plan = Plan {
            request: "r".into(),
            narrative: "n".into(),
            subtasks: vec![
                Task::new("task_1", "a", Complexity::Low),
                Task::new("task_2", "b", Complexity::Low),
            ],
            relevant_patterns: vec![],
            refined: false,
        };
        assert_eq!(plan.completed_count(), 0);
        plan.subtasks[1].completed = true;
        assert_eq!(plan.completed_count(), 1);
    }
}
