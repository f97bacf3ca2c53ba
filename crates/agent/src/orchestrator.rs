//! The plan → confirm → execute → learn cycle.
//!
//! # Architecture
//!
//! ```text
//! request
//!    │
//!    ▼
//! ┌──────────┐   plan    ┌──────────────────────┐  declined
//! │ Planning │ ────────▶ │ AwaitingConfirmation │ ─────────▶ Idle
//! └──────────┘           └──────────┬───────────┘
//!                                   │ confirmed
//!                                   ▼
//!                     ┌──────────────────────────┐
//!                     │ Executing(i), i = 1..n   │ ◀─┐  stream, execute,
//!                     └──────────┬───────────────┘ ──┘  learning pass
//!                                ▼
//!                         SessionLearning ─────────▶ Idle
//! ```
//!
//! One request runs end to end before the next is accepted. Tasks run in
//! order; a failing task is reported and the next one starts anyway.

use std::sync::Arc;

use chrono::Utc;
use forgeloop_config::{AgentSettings, AppConfig};
use forgeloop_core::error::{Error, GatewayError, StoreError};
use forgeloop_core::event::{DomainEvent, EventBus};
use forgeloop_core::gateway::Gateway;
use forgeloop_core::knowledge::{CodePattern, KnowledgeCounts, KnowledgeStore, PatternQuery};
use forgeloop_core::tool::ToolRegistry;
use tracing::{debug, info, warn};

use crate::agent::{Agent, AgentRole, DEFAULT_KNOWLEDGE_LIMIT, DEFAULT_TEMPERATURE};
use crate::coding::{CodeAnalysis, CodingAgent};
use crate::learning::{AgentMetrics, FeedbackRecord, LearningAgent};
use crate::plan::{Complexity, KnowledgeHit, Plan, Task, TaskResult};
use crate::planning::{DEFAULT_PREFERENCE_LIMIT, PlanningAgent};
use crate::session_event::{Presenter, SessionEvent};

/// Patterns listed by [`Orchestrator::show_knowledge`].
const KNOWLEDGE_LISTING_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Idle,
    Planning,
    AwaitingConfirmation,
    /// 1-based task index
    Executing { index: usize, total: usize },
    SessionLearning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// The user turned the plan down; nothing ran.
    Declined,
    Executed { completed: usize, total: usize },
    /// A refine was asked for with no plan to refine.
    NoActivePlan,
}

/// Knobs the orchestrator hands to the agents it builds.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub temperature: f32,
    pub search_limit: usize,
    pub preference_limit: usize,
    pub agent: AgentSettings,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            search_limit: DEFAULT_KNOWLEDGE_LIMIT,
            preference_limit: DEFAULT_PREFERENCE_LIMIT,
            agent: AgentSettings::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            temperature: config.temperature,
            search_limit: config.knowledge.search_limit,
            preference_limit: config.knowledge.preference_limit,
            agent: config.agent.clone(),
        }
    }
}

/// What `/learn` shows.
#[derive(Debug, Clone)]
pub struct KnowledgeSnapshot {
    pub patterns: Vec<CodePattern>,
    pub counts: KnowledgeCounts,
}

/// Owns the three role agents and the active plan.
pub struct Orchestrator {
    planner: PlanningAgent,
    coder: CodingAgent,
    learner: LearningAgent,
    knowledge: Arc<dyn KnowledgeStore>,
    settings: AgentSettings,
    state: OrchestratorState,
    current_plan: Option<Plan>,
    event_bus: Option<Arc<EventBus>>,
}

impl Orchestrator {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        tools: Arc<ToolRegistry>,
        knowledge: Arc<dyn KnowledgeStore>,
        config: OrchestratorConfig,
    ) -> Self {
        let make = |role: AgentRole| {
            Agent::new(role, Arc::clone(&gateway), Arc::clone(&tools), Arc::clone(&knowledge))
                .with_temperature(config.temperature)
                .with_knowledge_limit(config.search_limit)
        };

        let planner = PlanningAgent::new(make(AgentRole::Planning))
            .with_preference_limit(config.preference_limit);
        let coder = CodingAgent::new(make(AgentRole::Coding))
            .with_test_command(config.agent.test_command.clone())
            .with_file_blocks(config.agent.apply_file_blocks);
        let learner = LearningAgent::new(make(AgentRole::Learning));

        Self {
            planner,
            coder,
            learner,
            knowledge,
            settings: config.agent,
            state: OrchestratorState::Idle,
            current_plan: None,
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.planner.agent_mut().set_event_bus(Arc::clone(&bus));
        self.coder.agent_mut().set_event_bus(Arc::clone(&bus));
        self.learner.agent_mut().set_event_bus(Arc::clone(&bus));
        self.event_bus = Some(bus);
        self
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    pub fn current_plan(&self) -> Option<&Plan> {
        self.current_plan.as_ref()
    }

    pub fn metrics(&self) -> AgentMetrics {
        self.learner.metrics()
    }

    pub fn planner(&self) -> &PlanningAgent {
        &self.planner
    }

    pub fn coder(&self) -> &CodingAgent {
        &self.coder
    }

    pub fn learner(&self) -> &LearningAgent {
        &self.learner
    }

    fn publish_error(&self, context: &str, error: &impl std::fmt::Display) {
        if let Some(bus) = &self.event_bus {
            bus.publish(DomainEvent::ErrorOccurred {
                context: context.to_string(),
                error_message: error.to_string(),
                timestamp: Utc::now(),
            });
        }
    }

    /// Run one request through the whole cycle.
    ///
    /// Only a planning failure is returned as `Err`; task and learning
    /// failures are reported through the presenter and the plan carries on.
    pub async fn handle_request(
        &mut self,
        request: &str,
        presenter: &dyn Presenter,
    ) -> Result<RequestOutcome, Error> {
        self.state = OrchestratorState::Planning;
        info!(request, "Planning request");

        let plan = match self.planner.create_plan(request).await {
            Ok(plan) => plan,
            Err(e) => {
                self.state = OrchestratorState::Idle;
                self.publish_error("planning", &e);
                return Err(e);
            }
        };

        self.current_plan = Some(plan);
        self.confirm_and_execute(presenter).await
    }

    /// Rewrite the active plan from feedback, then confirm and run it.
    pub async fn refine_plan(
        &mut self,
        feedback: &str,
        presenter: &dyn Presenter,
    ) -> Result<RequestOutcome, Error> {
        let Some(plan) = self.current_plan.clone() else {
            return Ok(RequestOutcome::NoActivePlan);
        };

        self.state = OrchestratorState::Planning;
        let refined = match self.planner.refine_plan(&plan, feedback).await {
            Ok(refined) => refined,
            Err(e) => {
                self.state = OrchestratorState::Idle;
                self.publish_error("refine", &e);
                return Err(e.into());
            }
        };

        self.current_plan = Some(refined);
        self.confirm_and_execute(presenter).await
    }

    async fn confirm_and_execute(
        &mut self,
        presenter: &dyn Presenter,
    ) -> Result<RequestOutcome, Error> {
        let Some(plan) = self.current_plan.clone() else {
            self.state = OrchestratorState::Idle;
            return Ok(RequestOutcome::NoActivePlan);
        };

        presenter
            .emit(SessionEvent::PlanCreated {
                narrative: plan.narrative.clone(),
                tasks: plan.subtasks.clone(),
                refined: plan.refined,
            })
            .await;

        self.state = OrchestratorState::AwaitingConfirmation;
        if !presenter.confirm_plan(&plan).await {
            self.state = OrchestratorState::Idle;
            presenter.emit(SessionEvent::info("Plan not executed")).await;
            return Ok(RequestOutcome::Declined);
        }

        let (completed, total) = self.execute_plan(&plan, presenter).await;
        self.state = OrchestratorState::Idle;
        Ok(RequestOutcome::Executed { completed, total })
    }

    async fn execute_plan(&mut self, plan: &Plan, presenter: &dyn Presenter) -> (usize, usize) {
        let total = plan.subtasks.len();
        let mut completed = 0;

        for (i, task) in plan.subtasks.iter().enumerate() {
            let index = i + 1;
            self.state = OrchestratorState::Executing { index, total };

            match self.run_task(index, total, task, &plan.narrative, presenter).await {
                Ok(result) => {
                    if result.success {
                        completed += 1;
                    }
                    presenter
                        .emit(SessionEvent::TaskCompleted {
                            index,
                            task_id: task.id.clone(),
                            success: result.success,
                            preview: preview(&result.output, self.settings.output_preview_chars),
                        })
                        .await;
                    self.record_task_result(i, &result);
                    self.coder.learn_from_execution(&result).await;
                }
                Err(e) => {
                    warn!(task = %task.id, error = %e, "Task failed");
                    self.publish_error(&format!("task {index}"), &e);
                    presenter
                        .emit(SessionEvent::TaskFailed {
                            index,
                            task_id: task.id.clone(),
                            error: e.to_string(),
                        })
                        .await;
                }
            }

            if self.settings.learning_enabled {
                let so_far = self.plan_tasks(index);
                self.learn_from_session(&so_far, completed, presenter).await;
            }
        }

        info!(completed, total, "Plan finished");
        presenter.emit(SessionEvent::Summary { completed, total }).await;

        self.state = OrchestratorState::SessionLearning;
        if self.settings.learning_enabled {
            let all = self.plan_tasks(total);
            self.learn_from_session(&all, completed, presenter).await;
        }
        if self.settings.feedback_patterns {
            self.score_patterns(&plan.relevant_patterns, completed == total).await;
        }

        (completed, total)
    }

    async fn run_task(
        &mut self,
        index: usize,
        total: usize,
        task: &Task,
        narrative: &str,
        presenter: &dyn Presenter,
    ) -> Result<TaskResult, Error> {
        presenter
            .emit(SessionEvent::TaskStarted {
                index,
                total,
                task: task.clone(),
            })
            .await;

        let prompt = format!("Execute task: {}", task.description);
        let mut stream = self.coder.agent_mut().converse_stream(&prompt, true).await?;
        while let Some(fragment) = stream.next().await {
            presenter
                .emit(SessionEvent::Fragment { content: fragment? })
                .await;
        }

        Ok(self.coder.execute_task(task, Some(narrative)).await?)
    }

    fn record_task_result(&mut self, position: usize, result: &TaskResult) {
        if let Some(plan) = self.current_plan.as_mut()
            && let Some(task) = plan.subtasks.get_mut(position)
        {
            task.completed = result.success;
            task.result = Some(result.output.clone());
        }
    }

    fn plan_tasks(&self, count: usize) -> Vec<Task> {
        self.current_plan
            .as_ref()
            .map(|p| p.subtasks.iter().take(count).cloned().collect())
            .unwrap_or_default()
    }

    /// Evaluate the session so far and extract patterns from it.
    async fn learn_from_session(
        &mut self,
        tasks: &[Task],
        successes: usize,
        presenter: &dyn Presenter,
    ) {
        let total = tasks.len();
        let rate = successes as f64 / total.max(1) as f64;
        let listing: Vec<String> = tasks
            .iter()
            .map(|t| format!("- [{}] {}", if t.completed { "x" } else { " " }, t.description))
            .collect();
        let request = self
            .current_plan
            .as_ref()
            .map(|p| p.request.clone())
            .unwrap_or_default();

        let session = TaskResult::new(
            Task::new("session", format!("Session: {request}"), Complexity::Medium),
            successes > 0,
            format!(
                "Completed {successes}/{total} tasks (success rate: {:.0}%)\n{}",
                rate * 100.0,
                listing.join("\n")
            ),
        );

        match self.learner.evaluate_task(&session).await {
            Ok(evaluation) => {
                presenter
                    .emit(SessionEvent::Metrics {
                        metrics: evaluation.metrics,
                    })
                    .await;
            }
            Err(e) => {
                self.publish_error("learning", &e);
                presenter
                    .emit(SessionEvent::error(format!("Learning pass failed: {e}")))
                    .await;
                return;
            }
        }

        match self.learner.extract_pattern(&session).await {
            Ok(Some(set)) if !set.is_empty() => {
                let stored = self.learner.persist_patterns(&set).await;
                debug!(extracted = set.len(), stored, "Session patterns stored");
                presenter
                    .emit(SessionEvent::PatternsLearned { count: set.len() })
                    .await;
            }
            Ok(_) => {}
            Err(e) => {
                self.publish_error("learning", &e);
                presenter
                    .emit(SessionEvent::error(format!("Pattern extraction failed: {e}")))
                    .await;
            }
        }
    }

    /// Fold the plan's outcome into the patterns it was built from.
    async fn score_patterns(&self, hits: &[KnowledgeHit], success: bool) {
        for hit in hits {
            match self.knowledge.update_pattern_success(hit.pattern_id, success).await {
                Ok(()) => {
                    if let Some(bus) = &self.event_bus {
                        bus.publish(DomainEvent::KnowledgeUpdated {
                            operation: "update_pattern_success".into(),
                            record_id: hit.pattern_id,
                            timestamp: Utc::now(),
                        });
                    }
                }
                Err(e) => warn!(id = hit.pattern_id, error = %e, "Failed to score pattern"),
            }
        }
    }

    /// Top stored patterns plus record totals.
    pub async fn show_knowledge(&self) -> Result<KnowledgeSnapshot, StoreError> {
        let patterns = self
            .knowledge
            .search_patterns(PatternQuery::new().with_limit(KNOWLEDGE_LISTING_LIMIT))
            .await?;
        let counts = self.knowledge.counts().await?;
        Ok(KnowledgeSnapshot { patterns, counts })
    }

    /// Forget every agent's conversation. Directives and metrics stay.
    pub fn clear_history(&mut self) {
        self.planner.agent_mut().reset_history();
        self.coder.agent_mut().reset_history();
        self.learner.agent_mut().reset_history();
    }

    pub async fn submit_feedback(
        &mut self,
        feedback: &str,
    ) -> Result<FeedbackRecord, GatewayError> {
        self.learner.improve_from_feedback(feedback).await
    }

    pub async fn generate_report(&mut self) -> Result<String, GatewayError> {
        self.learner.generate_report().await
    }

    pub async fn analyze_code(&mut self, path: &str) -> Result<CodeAnalysis, Error> {
        self.coder.analyze_code(path).await
    }
}

/// The first `max` chars of `text`, with an ellipsis when cut.
pub fn preview(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ScriptedGateway, empty_tools};
    use async_trait::async_trait;
    use forgeloop_knowledge::InMemoryKnowledgeStore;
    use std::sync::Mutex;

    struct RecordingPresenter {
        events: Mutex<Vec<SessionEvent>>,
        accept: bool,
    }

    impl RecordingPresenter {
        fn accepting() -> Self {
            Self {
                events: Mutex::new(Vec::new()),
                accept: true,
            }
        }

        fn declining() -> Self {
            Self {
                events: Mutex::new(Vec::new()),
                accept: false,
            }
        }

        fn events(&self) -> Vec<SessionEvent> {
            self.events.lock().unwrap().clone()
        }

        fn count(&self, event_type: &str) -> usize {
            self.events()
                .iter()
                .filter(|e| e.event_type() == event_type)
                .count()
        }
    }

    #[async_trait]
    impl Presenter for RecordingPresenter {
        async fn emit(&self, event: SessionEvent) {
            self.events.lock().unwrap().push(event);
        }

        async fn confirm_plan(&self, _plan: &Plan) -> bool {
            self.accept
        }
    }

    fn orchestrator(
        gateway: Arc<ScriptedGateway>,
        store: Arc<InMemoryKnowledgeStore>,
        agent: AgentSettings,
    ) -> Orchestrator {
        Orchestrator::new(
            gateway,
            Arc::new(empty_tools()),
            store,
            OrchestratorConfig {
                agent,
                ..OrchestratorConfig::default()
            },
        )
    }

    fn without_learning() -> AgentSettings {
        AgentSettings {
            learning_enabled: false,
            ..AgentSettings::default()
        }
    }

    #[tokio::test]
    async fn failed_task_does_not_stop_the_plan() {
        let gateway = Arc::new(ScriptedGateway::new(vec![
            Ok("1. Write docs\n2. Write code\n3. Write tests".into()),
            // task 1
            Ok("Working on docs".into()),
            Ok("Docs written".into()),
            Ok("Evaluation 1".into()),
            Ok(
                r#"{"patterns":[{"type":"general_code","code":"x","description":"doc layout"}]}"#
                    .into(),
            ),
            // task 2
            Err(GatewayError::Network("connection reset".into())),
            Ok("Evaluation 2".into()),
            Ok("no patterns".into()),
            // task 3
            Ok("Working on tests".into()),
            Ok("Tests written".into()),
            Ok("Evaluation 3".into()),
            Ok("no patterns".into()),
            // final pass
            Ok("Final evaluation".into()),
            Ok("no patterns".into()),
        ]));
        let store = Arc::new(InMemoryKnowledgeStore::new());
        let mut orch = orchestrator(gateway.clone(), store.clone(), AgentSettings::default());
        let presenter = RecordingPresenter::accepting();

        let outcome = orch.handle_request("document the project", &presenter).await.unwrap();
        assert_eq!(outcome, RequestOutcome::Executed { completed: 2, total: 3 });
        assert_eq!(orch.state(), OrchestratorState::Idle);
        assert_eq!(gateway.call_count(), 14);

        let events = presenter.events();
        assert!(events.contains(&SessionEvent::TaskFailed {
            index: 2,
            task_id: "task_2".into(),
            error: "Gateway error: Network error: connection reset".into(),
        }));
        let started: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::TaskStarted { index, .. } => Some(*index),
                _ => None,
            })
            .collect();
        assert_eq!(started, vec![1, 2, 3]);
        assert!(events.contains(&SessionEvent::Summary { completed: 2, total: 3 }));
        assert_eq!(presenter.count("patterns_learned"), 1);
        assert_eq!(presenter.count("metrics"), 4);

        let flags: Vec<bool> = orch
            .current_plan()
            .unwrap()
            .subtasks
            .iter()
            .map(|t| t.completed)
            .collect();
        assert_eq!(flags, vec![true, false, true]);

        // one learning pass per task plus the final one
        let metrics = orch.metrics();
        assert_eq!(metrics.total_tasks, 4);
        assert_eq!(metrics.successful_tasks, 4);
        assert_eq!(metrics.patterns_learned, 1);

        let counts = store.counts().await.unwrap();
        assert_eq!(counts.patterns, 1);
        assert_eq!(counts.solutions, 2);
    }

    #[tokio::test]
    async fn failed_task_still_gets_a_learning_pass() {
        let gateway = Arc::new(ScriptedGateway::new(vec![
            Ok("1. Only task".into()),
            Err(GatewayError::Network("connection reset".into())),
            Ok("Evaluation after failure".into()),
            Ok("Final evaluation".into()),
        ]));
        let mut orch = orchestrator(
            gateway.clone(),
            Arc::new(InMemoryKnowledgeStore::new()),
            AgentSettings::default(),
        );
        let presenter = RecordingPresenter::accepting();

        let outcome = orch.handle_request("x", &presenter).await.unwrap();
        assert_eq!(outcome, RequestOutcome::Executed { completed: 0, total: 1 });

        // evaluated right after the failure, then again after the summary
        let prompts = gateway.prompts();
        assert_eq!(prompts.len(), 4);
        assert!(prompts[2].starts_with("Evaluate this task execution"));
        assert!(prompts[3].starts_with("Evaluate this task execution"));
        let types: Vec<&str> = presenter.events().iter().map(|e| e.event_type()).collect();
        let failed = types.iter().position(|t| *t == "task_failed").unwrap();
        let summary = types.iter().position(|t| *t == "summary").unwrap();
        assert!(types[failed..summary].contains(&"metrics"));

        let metrics = orch.metrics();
        assert_eq!(metrics.total_tasks, 2);
        assert_eq!(metrics.successful_tasks, 0);
    }

    #[tokio::test]
    async fn narration_streams_before_execution() {
        let gateway = Arc::new(
            ScriptedGateway::texts(&["1. Only task", "narrating the work", "result"])
                .with_fragment_size(5),
        );
        let mut orch = orchestrator(
            gateway,
            Arc::new(InMemoryKnowledgeStore::new()),
            without_learning(),
        );
        let presenter = RecordingPresenter::accepting();

        orch.handle_request("x", &presenter).await.unwrap();
        let types: Vec<&str> = presenter.events().iter().map(|e| e.event_type()).collect();
        let first_fragment = types.iter().position(|t| *t == "fragment").unwrap();
        let completed = types.iter().position(|t| *t == "task_completed").unwrap();
        assert!(types[..first_fragment].contains(&"task_started"));
        assert!(first_fragment < completed);
        assert_eq!(presenter.count("fragment"), 4);
        // narration joins the coder's history, execution does not
        assert_eq!(orch.coder().agent().conversation().len(), 2);
    }

    #[tokio::test]
    async fn declined_plan_runs_nothing() {
        let gateway = Arc::new(ScriptedGateway::texts(&["1. Step one\n2. Step two"]));
        let mut orch = orchestrator(
            gateway.clone(),
            Arc::new(InMemoryKnowledgeStore::new()),
            AgentSettings::default(),
        );
        let presenter = RecordingPresenter::declining();

        let outcome = orch.handle_request("anything", &presenter).await.unwrap();
        assert_eq!(outcome, RequestOutcome::Declined);
        assert_eq!(orch.state(), OrchestratorState::Idle);
        assert_eq!(gateway.call_count(), 1);
        assert_eq!(presenter.count("task_started"), 0);
        assert_eq!(presenter.count("plan_created"), 1);
        assert_eq!(orch.current_plan().unwrap().subtasks.len(), 2);
        assert_eq!(orch.metrics(), AgentMetrics::default());
    }

    #[tokio::test]
    async fn planning_failure_is_request_level() {
        let gateway = Arc::new(ScriptedGateway::new(vec![Err(GatewayError::AuthenticationFailed(
            "invalid key".into(),
        ))]));
        let mut orch = orchestrator(
            gateway,
            Arc::new(InMemoryKnowledgeStore::new()),
            AgentSettings::default(),
        );
        let presenter = RecordingPresenter::accepting();

        let err = orch.handle_request("anything", &presenter).await.unwrap_err();
        assert!(err.to_string().contains("invalid key"));
        assert_eq!(orch.state(), OrchestratorState::Idle);
        assert!(orch.current_plan().is_none());
        assert!(presenter.events().is_empty());
    }

    #[tokio::test]
    async fn interrupted_narration_fails_the_task_without_committing() {
        let gateway = Arc::new(
            ScriptedGateway::texts(&["1. Only task", "narration that breaks"])
                .with_fragment_size(4)
                .with_stream_failure_after(2),
        );
        let mut orch = orchestrator(
            gateway.clone(),
            Arc::new(InMemoryKnowledgeStore::new()),
            without_learning(),
        );
        let presenter = RecordingPresenter::accepting();

        let outcome = orch.handle_request("x", &presenter).await.unwrap();
        assert_eq!(outcome, RequestOutcome::Executed { completed: 0, total: 1 });
        assert_eq!(presenter.count("fragment"), 2);
        assert_eq!(presenter.count("task_failed"), 1);
        assert!(orch.coder().agent().conversation().is_empty());
        assert_eq!(gateway.call_count(), 2);
    }

    #[tokio::test]
    async fn plan_outcome_rescores_retrieved_patterns() {
        let store = Arc::new(InMemoryKnowledgeStore::new());
        let seeded = store
            .add_pattern(CodePattern::new("api_endpoint", "fn get() {}", "GET handler"))
            .await
            .unwrap();

        let gateway = Arc::new(ScriptedGateway::texts(&["1. Add endpoint", "narration", "done"]));
        let mut orch = orchestrator(gateway, store.clone(), without_learning());
        orch.handle_request("users api", &RecordingPresenter::accepting()).await.unwrap();

        assert_eq!(orch.current_plan().unwrap().relevant_patterns.len(), 1);
        let patterns = store.search_patterns(PatternQuery::new()).await.unwrap();
        let rescored = patterns.iter().find(|p| p.id == seeded.id).unwrap();
        assert_eq!(rescored.usage_count, 1);
        assert_eq!(rescored.success_rate, 1.0);
        assert_eq!(store.counts().await.unwrap().solutions, 1);
    }

    #[tokio::test]
    async fn refine_requires_an_active_plan() {
        let gateway = Arc::new(ScriptedGateway::texts(&[]));
        let mut orch = orchestrator(
            gateway.clone(),
            Arc::new(InMemoryKnowledgeStore::new()),
            AgentSettings::default(),
        );
        let outcome = orch
            .refine_plan("smaller steps", &RecordingPresenter::accepting())
            .await
            .unwrap();
        assert_eq!(outcome, RequestOutcome::NoActivePlan);
        assert_eq!(gateway.call_count(), 0);
    }

    #[tokio::test]
    async fn refine_replaces_the_active_plan() {
        let gateway = Arc::new(ScriptedGateway::texts(&[
            "1. Big step",
            "1. Small step\n2. Another small step",
        ]));
        let mut orch = orchestrator(
            gateway,
            Arc::new(InMemoryKnowledgeStore::new()),
            AgentSettings::default(),
        );
        let presenter = RecordingPresenter::declining();

        orch.handle_request("build it", &presenter).await.unwrap();
        let outcome = orch.refine_plan("smaller steps", &presenter).await.unwrap();
        assert_eq!(outcome, RequestOutcome::Declined);

        let plan = orch.current_plan().unwrap();
        assert!(plan.refined);
        assert_eq!(plan.request, "build it");
        assert_eq!(plan.subtasks.len(), 2);
        assert!(presenter.events().iter().any(|e| matches!(
            e,
            SessionEvent::PlanCreated { refined: true, .. }
        )));
    }

    #[tokio::test]
    async fn side_channels_do_not_move_the_state_machine() {
        let store = Arc::new(InMemoryKnowledgeStore::new());
        store.add_pattern(CodePattern::new("test", "t", "smoke")).await.unwrap();
        let gateway = Arc::new(ScriptedGateway::texts(&["1. Step", "1. Remember this"]));
        let mut orch = orchestrator(gateway, store, AgentSettings::default());

        orch.handle_request("x", &RecordingPresenter::declining()).await.unwrap();
        assert_eq!(orch.planner().agent().conversation().len(), 2);

        let snapshot = orch.show_knowledge().await.unwrap();
        assert_eq!(snapshot.patterns.len(), 1);
        assert_eq!(snapshot.counts.patterns, 1);

        let record = orch.submit_feedback("more tests please").await.unwrap();
        assert!(record.applied);
        assert_eq!(orch.show_knowledge().await.unwrap().counts.preferences, 1);

        orch.clear_history();
        assert!(orch.planner().agent().conversation().is_empty());
        assert!(orch.learner().agent().conversation().is_empty());
        assert_eq!(orch.state(), OrchestratorState::Idle);
    }

    #[test]
    fn preview_cuts_on_char_boundaries() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("abcdef", 3), "abc...");
        assert_eq!(preview("ééééé", 2), "éé...");
    }
}
