//! Planning role: turns a request into a [`Plan`].

use forgeloop_core::error::{Error, GatewayError};
use tracing::{debug, info};

use crate::agent::Agent;
use crate::parse::parse_subtasks;
use crate::plan::{KnowledgeHit, Plan};

pub const DEFAULT_PREFERENCE_LIMIT: usize = 3;

pub struct PlanningAgent {
    agent: Agent,
    preference_limit: usize,
}

impl PlanningAgent {
    /// Wrap an agent built with [`crate::AgentRole::Planning`].
    pub fn new(agent: Agent) -> Self {
        Self {
            agent,
            preference_limit: DEFAULT_PREFERENCE_LIMIT,
        }
    }

    pub fn with_preference_limit(mut self, limit: usize) -> Self {
        self.preference_limit = limit;
        self
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    pub fn agent_mut(&mut self) -> &mut Agent {
        &mut self.agent
    }

    /// Retrieve context, ask the model for a plan, parse its subtasks.
    pub async fn create_plan(&mut self, request: &str) -> Result<Plan, Error> {
        let hits = self.agent.query_knowledge(request).await?;
        let preferences = self.agent.knowledge().get_preferences(None).await?;
        debug!(
            patterns = hits.len(),
            preferences = preferences.len(),
            "Planning context retrieved"
        );

        let mut context = String::new();
        if !hits.is_empty() {
            context.push_str("\n\nRelevant past patterns:\n");
            for hit in &hits {
                context.push_str(&pattern_line(hit));
            }
        }
        if !preferences.is_empty() {
            context.push_str("\nUser preferences:\n");
            for pref in preferences.iter().take(self.preference_limit) {
                context.push_str(&format!(
                    "- {}: {} (confidence: {:.0}%)\n",
                    pref.preference_type,
                    pref.value,
                    pref.confidence * 100.0
                ));
            }
        }

        let prompt = format!(
            "Create a detailed development plan for: {request}\n{context}\n\
             Consider best practices and potential issues. Be thorough but practical."
        );
        let narrative = self.agent.converse(&prompt, true).await?;
        let subtasks = parse_subtasks(&narrative);
        info!(tasks = subtasks.len(), "Plan created");

        Ok(Plan {
            request: request.to_string(),
            narrative,
            subtasks,
            relevant_patterns: hits,
            refined: false,
        })
    }

    /// Rewrite a plan in response to feedback. Subtasks are parsed afresh.
    pub async fn refine_plan(&mut self, plan: &Plan, feedback: &str) -> Result<Plan, GatewayError> {
        let prompt = format!(
            "Refine this plan based on feedback:\n\nCurrent Plan:\n{}\n\nFeedback:\n{feedback}\n\n\
             Update the plan to address the feedback.",
            plan.narrative
        );
        let narrative = self.agent.converse(&prompt, true).await?;
        let subtasks = parse_subtasks(&narrative);
        info!(tasks = subtasks.len(), "Plan refined");

        Ok(Plan {
            request: plan.request.clone(),
            narrative,
            subtasks,
            relevant_patterns: plan.relevant_patterns.clone(),
            refined: true,
        })
    }
}

fn pattern_line(hit: &KnowledgeHit) -> String {
    format!(
        "- {}: {} (success rate: {:.0}%)\n",
        hit.pattern_type,
        hit.description,
        hit.success_rate * 100.0
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentRole;
    use crate::plan::Complexity;
    use crate::test_helpers::{ScriptedGateway, empty_tools};
    use forgeloop_core::knowledge::{CodePattern, KnowledgeStore, UserPreference};
    use forgeloop_knowledge::InMemoryKnowledgeStore;
    use std::sync::Arc;

    fn planner(gateway: Arc<ScriptedGateway>, store: Arc<InMemoryKnowledgeStore>) -> PlanningAgent {
        PlanningAgent::new(Agent::new(
            AgentRole::Planning,
            gateway,
            Arc::new(empty_tools()),
            store,
        ))
    }

    #[tokio::test]
    async fn create_plan_parses_narrative() {
        let gateway = Arc::new(ScriptedGateway::texts(&[
            "- Main goal: API\n- Subtasks:\n  1. Build API (complexity: medium)\n  2. Write tests\n",
        ]));
        let mut planner = planner(gateway.clone(), Arc::new(InMemoryKnowledgeStore::new()));

        let plan = planner.create_plan("a todo service").await.unwrap();
        assert_eq!(plan.request, "a todo service");
        assert_eq!(plan.subtasks.len(), 2);
        assert_eq!(plan.subtasks[0].complexity, Complexity::Medium);
        assert!(!plan.refined);
        assert!(plan.relevant_patterns.is_empty());

        let prompt = &gateway.prompts()[0];
        assert!(prompt.starts_with("Create a detailed development plan for: a todo service"));
        assert!(!prompt.contains("Relevant past patterns"));
        // planning keeps history
        assert_eq!(planner.agent().conversation().len(), 2);
    }

    #[tokio::test]
    async fn context_lists_patterns_and_preferences() {
        let store = Arc::new(InMemoryKnowledgeStore::new());
        store
            .add_pattern(CodePattern::new("api_endpoint", "fn get() {}", "GET handler"))
            .await
            .unwrap();
        store
            .set_preference(UserPreference::new("feedback", "prefer small commits"))
            .await
            .unwrap();

        let gateway = Arc::new(ScriptedGateway::texts(&["No numbered steps."]));
        let mut planner = planner(gateway.clone(), store);
        let plan = planner.create_plan("users endpoint").await.unwrap();

        assert_eq!(plan.relevant_patterns.len(), 1);
        assert_eq!(plan.subtasks.len(), 1);
        assert_eq!(plan.subtasks[0].complexity, Complexity::High);

        let prompt = &gateway.prompts()[0];
        assert!(prompt.contains("- api_endpoint: GET handler (success rate: 100%)"));
        assert!(prompt.contains("- feedback: prefer small commits (confidence: 50%)"));
    }

    #[tokio::test]
    async fn refine_replaces_narrative_and_marks_refined() {
        let gateway = Arc::new(ScriptedGateway::texts(&[
            "1. Write docs",
            "1. Write docs\n2. Create examples\n3. System integration",
        ]));
        let mut planner = planner(gateway.clone(), Arc::new(InMemoryKnowledgeStore::new()));
        let plan = planner.create_plan("docs").await.unwrap();

        let refined = planner.refine_plan(&plan, "add examples").await.unwrap();
        assert!(refined.refined);
        assert_eq!(refined.request, "docs");
        let complexities: Vec<_> = refined.subtasks.iter().map(|t| t.complexity).collect();
        assert_eq!(
            complexities,
            vec![Complexity::Low, Complexity::Medium, Complexity::High]
        );

        let prompt = &gateway.prompts()[1];
        assert!(prompt.contains("Current Plan:\n1. Write docs"));
        assert!(prompt.contains("Feedback:\nadd examples"));
    }

    #[tokio::test]
    async fn gateway_failure_surfaces() {
        let gateway = Arc::new(ScriptedGateway::new(vec![Err(GatewayError::AuthenticationFailed(
            "bad key".into(),
        ))]));
        let mut planner = planner(gateway, Arc::new(InMemoryKnowledgeStore::new()));
        let err = planner.create_plan("anything").await.unwrap_err();
        assert!(matches!(err, Error::Gateway(GatewayError::AuthenticationFailed(_))));
        assert!(planner.agent().conversation().is_empty());
    }
}
