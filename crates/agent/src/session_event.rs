//! What the orchestrator tells the presentation layer, and what it asks of it.
//!
//! `SessionEvent` is the whole output contract: a terminal, a test recorder
//! or a remote client only ever sees these. Input flows back through the
//! one question the orchestrator has to ask mid-cycle, plan confirmation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::learning::AgentMetrics;
use crate::plan::{Plan, Task};

/// Events emitted while a request moves through the cycle.
///
/// - `plan_created`     : a new or refined plan, ready for confirmation
/// - `task_started`     : task `index` of `total` begins
/// - `fragment`         : streamed narration text
/// - `task_completed`   : the task ran; output preview attached
/// - `task_failed`      : the task raised; the plan continues
/// - `metrics`          : learning counters after a learning pass
/// - `patterns_learned` : patterns extracted by a learning pass
/// - `info` / `error`   : free-form notices
/// - `summary`          : the plan finished
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    PlanCreated {
        narrative: String,
        tasks: Vec<Task>,
        refined: bool,
    },

    TaskStarted {
        index: usize,
        total: usize,
        task: Task,
    },

    Fragment { content: String },

    TaskCompleted {
        index: usize,
        task_id: String,
        success: bool,
        preview: String,
    },

    TaskFailed {
        index: usize,
        task_id: String,
        error: String,
    },

    Metrics { metrics: AgentMetrics },

    PatternsLearned { count: usize },

    Info { message: String },

    Error { message: String },

    Summary { completed: usize, total: usize },
}

impl SessionEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::PlanCreated { .. } => "plan_created",
            Self::TaskStarted { .. } => "task_started",
            Self::Fragment { .. } => "fragment",
            Self::TaskCompleted { .. } => "task_completed",
            Self::TaskFailed { .. } => "task_failed",
            Self::Metrics { .. } => "metrics",
            Self::PatternsLearned { .. } => "patterns_learned",
            Self::Info { .. } => "info",
            Self::Error { .. } => "error",
            Self::Summary { .. } => "summary",
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::Info {
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

/// The presentation side of a session.
#[async_trait]
pub trait Presenter: Send + Sync {
    async fn emit(&self, event: SessionEvent);

    /// Block until the user accepts or declines the plan.
    async fn confirm_plan(&self, plan: &Plan) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::Complexity;

    #[test]
    fn tagged_with_snake_case_type() {
        let event = SessionEvent::TaskCompleted {
            index: 2,
            task_id: "task_2".into(),
            success: true,
            preview: "done".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "task_completed");
        assert_eq!(json["task_id"], "task_2");
        assert_eq!(event.event_type(), "task_completed");
    }

    #[test]
    fn round_trips_task_payload() {
        let event = SessionEvent::TaskStarted {
            index: 1,
            total: 3,
            task: Task::new("task_1", "Build API", Complexity::Medium),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"complexity\":\"medium\""));
        let back: SessionEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
