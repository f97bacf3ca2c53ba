//! Role agents and the orchestrator that drives them.
//!
//! A request flows through a fixed cycle:
//!
//! 1. **Plan**: the planning agent retrieves past patterns and preferences,
//!    asks the model for a plan and parses it into tasks
//! 2. **Confirm**: the presenter accepts or declines the plan
//! 3. **Execute**: each task is narrated (streamed) and then executed by the
//!    coding agent; a failing task does not stop the next one
//! 4. **Learn**: after every task, and once more at the end, the learning
//!    agent evaluates the session and extracts reusable patterns
//!
//! All three roles share one [`Agent`] type; they differ in their directive
//! and in how they read the model's output.

pub mod agent;
pub mod coding;
pub mod learning;
pub mod orchestrator;
pub mod parse;
pub mod plan;
pub mod planning;
pub mod session_event;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use agent::{Agent, AgentRole, ConverseStream};
pub use coding::{CodeAnalysis, CodingAgent};
pub use learning::{AgentMetrics, Evaluation, FeedbackRecord, LearningAgent};
pub use orchestrator::{
    KnowledgeSnapshot, Orchestrator, OrchestratorConfig, OrchestratorState, RequestOutcome,
};
pub use parse::{ExtractedPattern, FileBlock, PatternSet};
pub use plan::{Complexity, KnowledgeHit, Plan, Task, TaskResult, TestRun};
pub use planning::PlanningAgent;
pub use session_event::{Presenter, SessionEvent};
