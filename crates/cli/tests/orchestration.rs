//! End-to-end runs of the orchestrator against real knowledge stores.
//!
//! The gateway answers by prompt kind rather than by call order, so these
//! tests survive changes in how many learning calls a task makes.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use forgeloop_agent::{
    Complexity, Orchestrator, OrchestratorConfig, OrchestratorState, Plan, Presenter,
    RequestOutcome, SessionEvent,
};
use forgeloop_core::error::GatewayError;
use forgeloop_core::gateway::{FragmentStream, Gateway};
use forgeloop_core::knowledge::{KnowledgeStore, PatternQuery};
use forgeloop_core::message::Turn;
use forgeloop_core::tool::ToolRegistry;
use forgeloop_knowledge::{InMemoryKnowledgeStore, SqliteKnowledgeStore};
use tokio::sync::mpsc;

const PATTERN_REPLY: &str = r#"```json
{"patterns": [{"type": "api_endpoint", "code": "fn handler() {}", "description": "REST handler", "complexity": "low"}]}
```"#;

/// Answers each prompt by its opening words.
struct RoutingGateway {
    plan: String,
    /// Tasks whose execution call fails
    fail_execution: Option<&'static str>,
    /// Tasks whose narration stream breaks after one fragment
    break_narration: Option<&'static str>,
    prompts: Mutex<Vec<String>>,
}

impl RoutingGateway {
    fn new(plan: &str) -> Self {
        Self {
            plan: plan.to_string(),
            fail_execution: None,
            break_narration: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn failing_execution_of(mut self, marker: &'static str) -> Self {
        self.fail_execution = Some(marker);
        self
    }

    fn breaking_narration_of(mut self, marker: &'static str) -> Self {
        self.break_narration = Some(marker);
        self
    }

    fn prompts_starting_with(&self, prefix: &str) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.starts_with(prefix))
            .cloned()
            .collect()
    }

    fn record(&self, turns: &[Turn]) -> String {
        let prompt = turns.last().map(|t| t.content.clone()).unwrap_or_default();
        self.prompts.lock().unwrap().push(prompt.clone());
        prompt
    }
}

fn mentions(text: &str, marker: Option<&str>) -> bool {
    marker.is_some_and(|m| text.contains(m))
}

/// The `Task:` line of an execution prompt; the plan narrative names every task.
fn task_line(prompt: &str) -> &str {
    prompt
        .lines()
        .find(|l| l.starts_with("Task: "))
        .unwrap_or_default()
}

#[async_trait]
impl Gateway for RoutingGateway {
    fn name(&self) -> &str {
        "routing"
    }

    fn model(&self) -> &str {
        "routing-1"
    }

    async fn complete(&self, turns: &[Turn], _temperature: f32) -> Result<String, GatewayError> {
        let prompt = self.record(turns);
        if prompt.starts_with("Create a detailed development plan") {
            Ok(self.plan.clone())
        } else if prompt.starts_with("Execute this coding task") {
            if mentions(task_line(&prompt), self.fail_execution) {
                Err(GatewayError::Network("connection reset".into()))
            } else {
                Ok("Implemented and verified.".into())
            }
        } else if prompt.starts_with("Evaluate this task execution") {
            Ok("Solid work.".into())
        } else if prompt.starts_with("Extract reusable patterns") {
            Ok(PATTERN_REPLY.into())
        } else {
            Ok("Noted.".into())
        }
    }

    async fn complete_streaming(
        &self,
        turns: &[Turn],
        _temperature: f32,
    ) -> Result<FragmentStream, GatewayError> {
        let prompt = self.record(turns);
        let (tx, rx) = mpsc::channel(4);
        let _ = tx.try_send(Ok("Working ".to_string()));
        if mentions(&prompt, self.break_narration) {
            let _ = tx.try_send(Err(GatewayError::StreamInterrupted("peer closed".into())));
        } else {
            let _ = tx.try_send(Ok("on it.".to_string()));
        }
        Ok(rx)
    }
}

#[derive(Default)]
struct RecordingPresenter {
    events: Mutex<Vec<SessionEvent>>,
}

impl RecordingPresenter {
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
        true
    }
}

fn orchestrator(gateway: Arc<RoutingGateway>, store: Arc<dyn KnowledgeStore>) -> Orchestrator {
    Orchestrator::new(
        gateway,
        Arc::new(ToolRegistry::new()),
        store,
        OrchestratorConfig::default(),
    )
}

#[tokio::test]
async fn one_failing_task_leaves_the_rest_of_the_plan_running() {
    let gateway = Arc::new(
        RoutingGateway::new("1. Build API (complexity: medium)\n2. Deploy service\n3. Write tests")
            .failing_execution_of("Deploy service"),
    );
    let store = Arc::new(InMemoryKnowledgeStore::new());
    let mut orch = orchestrator(gateway.clone(), store.clone());
    let presenter = RecordingPresenter::default();

    let outcome = orch.handle_request("ship the todo service", &presenter).await.unwrap();
    assert_eq!(outcome, RequestOutcome::Executed { completed: 2, total: 3 });
    assert_eq!(orch.state(), OrchestratorState::Idle);

    let plan = orch.current_plan().unwrap();
    assert_eq!(plan.subtasks[0].description, "Build API (complexity: medium)");
    assert_eq!(plan.subtasks[0].complexity, Complexity::Medium);
    assert_eq!(
        plan.subtasks.iter().map(|t| t.completed).collect::<Vec<_>>(),
        vec![true, false, true]
    );

    let events = presenter.events();
    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::TaskFailed { index: 2, task_id, .. } if task_id == "task_2"
    )));
    assert!(events.contains(&SessionEvent::Summary { completed: 2, total: 3 }));
    assert_eq!(presenter.count("task_completed"), 2);

    // a learning pass after each task and one after the summary
    assert_eq!(gateway.prompts_starting_with("Evaluate this task execution").len(), 4);
    assert_eq!(gateway.prompts_starting_with("Extract reusable patterns").len(), 4);

    let counts = store.counts().await.unwrap();
    assert_eq!(counts.patterns, 4);
    assert_eq!(counts.solutions, 2);
}

#[tokio::test]
async fn nothing_is_extracted_from_a_session_with_no_successes() {
    let gateway = Arc::new(RoutingGateway::new("1. Deploy service").failing_execution_of("Deploy"));
    let store = Arc::new(InMemoryKnowledgeStore::new());
    let mut orch = orchestrator(gateway.clone(), store.clone());
    let presenter = RecordingPresenter::default();

    let outcome = orch.handle_request("deploy", &presenter).await.unwrap();
    assert_eq!(outcome, RequestOutcome::Executed { completed: 0, total: 1 });

    assert!(gateway.prompts_starting_with("Extract reusable patterns").is_empty());
    assert_eq!(presenter.count("patterns_learned"), 0);
    assert_eq!(store.counts().await.unwrap().patterns, 0);

    let metrics = orch.metrics();
    assert_eq!(metrics.total_tasks, 2);
    assert_eq!(metrics.successful_tasks, 0);
    assert_eq!(metrics.patterns_learned, 0);
}

#[tokio::test]
async fn metrics_only_grow_across_requests() {
    let gateway = Arc::new(
        RoutingGateway::new("1. Build API\n2. Deploy service").failing_execution_of("Deploy"),
    );
    let mut orch = orchestrator(gateway, Arc::new(InMemoryKnowledgeStore::new()));
    let presenter = RecordingPresenter::default();

    orch.handle_request("first", &presenter).await.unwrap();
    orch.handle_request("second", &presenter).await.unwrap();

    let snapshots: Vec<_> = presenter
        .events()
        .into_iter()
        .filter_map(|e| match e {
            SessionEvent::Metrics { metrics } => Some(metrics),
            _ => None,
        })
        .collect();
    assert_eq!(snapshots.len(), 6);
    for pair in snapshots.windows(2) {
        assert!(pair[1].total_tasks > pair[0].total_tasks);
        assert!(pair[1].successful_tasks >= pair[0].successful_tasks);
        assert!(pair[1].patterns_learned >= pair[0].patterns_learned);
        assert!(pair[1].successful_tasks <= pair[1].total_tasks);
    }
}

#[tokio::test]
async fn broken_narration_fails_only_its_task() {
    let gateway = Arc::new(
        RoutingGateway::new("1. Flaky step\n2. Steady step").breaking_narration_of("Flaky"),
    );
    let mut orch = orchestrator(gateway.clone(), Arc::new(InMemoryKnowledgeStore::new()));
    let presenter = RecordingPresenter::default();

    let outcome = orch.handle_request("x", &presenter).await.unwrap();
    assert_eq!(outcome, RequestOutcome::Executed { completed: 1, total: 2 });
    assert_eq!(presenter.count("task_failed"), 1);

    // the broken exchange never reaches history and is never executed
    let history = orch.coder().agent().conversation().turns().to_vec();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].content, "Execute task: Steady step");
    let executed = gateway.prompts_starting_with("Execute this coding task");
    assert_eq!(executed.len(), 1);
    assert!(executed[0].contains("Steady step"));
}

#[tokio::test]
async fn learned_patterns_inform_the_next_session() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("knowledge.db");
    let db = db.to_str().unwrap();

    {
        let store = Arc::new(SqliteKnowledgeStore::new(db).await.unwrap());
        let gateway = Arc::new(RoutingGateway::new("1. Build API"));
        let mut orch = orchestrator(gateway.clone(), store);
        orch.handle_request("users api", &RecordingPresenter::default())
            .await
            .unwrap();

        let first_plan = &gateway.prompts_starting_with("Create a detailed development plan")[0];
        assert!(!first_plan.contains("Relevant past patterns"));
    }

    let store = Arc::new(SqliteKnowledgeStore::new(db).await.unwrap());
    let stored = store.counts().await.unwrap();
    assert_eq!(stored.patterns, 2);
    assert_eq!(stored.solutions, 1);

    let gateway = Arc::new(RoutingGateway::new("1. Build API"));
    let mut orch = orchestrator(gateway.clone(), store.clone());
    orch.handle_request("orders api", &RecordingPresenter::default())
        .await
        .unwrap();

    let second_plan = &gateway.prompts_starting_with("Create a detailed development plan")[0];
    assert!(second_plan.contains("Relevant past patterns:"));
    assert!(second_plan.contains("- api_endpoint: REST handler"));
    assert_eq!(orch.current_plan().unwrap().relevant_patterns.len(), 2);

    // the fully successful plan counts as one more use of each retrieved pattern
    let patterns = store.search_patterns(PatternQuery::new()).await.unwrap();
    assert_eq!(patterns.len(), 4);
    assert_eq!(patterns.iter().filter(|p| p.usage_count == 1).count(), 2);
}
