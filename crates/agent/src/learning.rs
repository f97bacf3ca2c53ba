//! Learning role: evaluates outcomes, extracts patterns, keeps session metrics.

use chrono::Utc;
use forgeloop_core::error::GatewayError;
use forgeloop_core::event::DomainEvent;
use forgeloop_core::knowledge::{CodePattern, UserPreference};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::agent::Agent;
use crate::parse::{PatternSet, extract_numbered_lines, parse_pattern_set};
use crate::plan::TaskResult;

/// Cumulative counters for one learning agent's lifetime.
///
/// Never decrease; `successful_tasks <= total_tasks`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentMetrics {
    pub total_tasks: u64,
    pub successful_tasks: u64,
    pub patterns_learned: u64,
}

impl AgentMetrics {
    pub fn success_rate(&self) -> f64 {
        if self.total_tasks == 0 {
            0.0
        } else {
            self.successful_tasks as f64 / self.total_tasks as f64
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub evaluation: String,
    pub success: bool,
    pub metrics: AgentMetrics,
}

/// What came of one piece of user feedback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub feedback: String,
    pub improvements: String,
    /// The feedback was stored as a preference
    pub applied: bool,
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

pub struct LearningAgent {
    agent: Agent,
    metrics: AgentMetrics,
}

impl LearningAgent {
    /// Wrap an agent built with [`crate::AgentRole::Learning`].
    pub fn new(agent: Agent) -> Self {
        Self {
            agent,
            metrics: AgentMetrics::default(),
        }
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    pub fn agent_mut(&mut self) -> &mut Agent {
        &mut self.agent
    }

    pub fn metrics(&self) -> AgentMetrics {
        self.metrics
    }

    /// Count the result, then ask for an assessment.
    ///
    /// The counters move even if the gateway call fails.
    pub async fn evaluate_task(&mut self, result: &TaskResult) -> Result<Evaluation, GatewayError> {
        self.metrics.total_tasks += 1;
        if result.success {
            self.metrics.successful_tasks += 1;
        }

        let prompt = format!(
            "Evaluate this task execution:\n\n\
             Task: {}\nSuccess: {}\nOutput: {}\n\n\
             Provide assessment:\n\
             1. Success/Failure analysis\n\
             2. What went well (if successful)\n\
             3. What went wrong (if failed)\n\
             4. Key learnings\n\
             5. Recommendations for improvement",
            result.task.description,
            result.success,
            truncate_chars(&result.output, 500)
        );
        let evaluation = self.agent.converse(&prompt, false).await?;

        Ok(Evaluation {
            evaluation,
            success: result.success,
            metrics: self.metrics,
        })
    }

    /// Ask for reusable patterns from a successful result.
    ///
    /// Failed results return `None` without a model call. An unparseable
    /// reply is also `None`.
    pub async fn extract_pattern(
        &mut self,
        result: &TaskResult,
    ) -> Result<Option<PatternSet>, GatewayError> {
        if !result.success {
            return Ok(None);
        }

        let prompt = format!(
            "Extract reusable patterns from this successful task:\n\n\
             Description: {}\nOutput: {}\n\n\
             Identify:\n\
             1. Code patterns that could be reused\n\
             2. Approaches that worked well\n\
             3. General principles that apply\n\n\
             Format as JSON with 'patterns' array containing:\n\
             - type: pattern type (e.g., api_endpoint, data_model, test_pattern)\n\
             - code: the pattern code\n\
             - description: when and why to use this pattern\n\
             - complexity: low/medium/high",
            result.task.description,
            truncate_chars(&result.output, 1000)
        );
        let reply = self.agent.converse(&prompt, false).await?;

        match parse_pattern_set(&reply) {
            Ok(set) => {
                self.metrics.patterns_learned += set.len() as u64;
                debug!(patterns = set.len(), "Patterns extracted");
                Ok(Some(set))
            }
            Err(e) => {
                debug!(error = %e, "No patterns extracted");
                Ok(None)
            }
        }
    }

    /// Store extracted patterns. Best-effort; returns how many were written.
    pub async fn persist_patterns(&self, set: &PatternSet) -> usize {
        let mut written = 0;
        for extracted in &set.patterns {
            let mut pattern = CodePattern::new(
                extracted.pattern_type.as_str(),
                extracted.code.as_str(),
                extracted.description.as_str(),
            )
            .with_metadata("source", "learning");
            if let Some(complexity) = &extracted.complexity {
                pattern = pattern.with_metadata("complexity", complexity.as_str());
            }

            match self.agent.knowledge().add_pattern(pattern).await {
                Ok(stored) => {
                    written += 1;
                    self.agent.publish(DomainEvent::KnowledgeUpdated {
                        operation: "add_pattern".into(),
                        record_id: stored.id,
                        timestamp: Utc::now(),
                    });
                }
                Err(e) => warn!(error = %e, "Failed to store extracted pattern"),
            }
        }
        written
    }

    /// Numbered suggestions, in the order the model gave them.
    pub async fn suggest_improvements(
        &mut self,
        context: &serde_json::Value,
    ) -> Result<Vec<String>, GatewayError> {
        let recent = serde_json::to_string_pretty(context).unwrap_or_default();
        let prompt = format!(
            "Analyze system performance and suggest improvements:\n\n\
             Total Tasks: {}\nSuccess Rate: {:.1}%\nPatterns Learned: {}\n\n\
             Recent Performance:\n{}\n\n\
             Suggest 3-5 concrete improvements to:\n\
             1. Increase success rate\n\
             2. Better utilize knowledge base\n\
             3. Improve code quality\n\
             4. Speed up execution\n\n\
             Format as a numbered list.",
            self.metrics.total_tasks,
            self.metrics.success_rate() * 100.0,
            self.metrics.patterns_learned,
            truncate_chars(&recent, 1000)
        );
        let reply = self.agent.converse(&prompt, false).await?;
        Ok(extract_numbered_lines(&reply))
    }

    /// Plain-text summary of the session's metrics plus top suggestions.
    pub async fn generate_report(&mut self) -> Result<String, GatewayError> {
        let metrics = self.metrics;
        let rate = metrics.success_rate();
        let health = if rate > 0.7 { "Healthy" } else { "Needs Improvement" };

        let suggestions = self.suggest_improvements(&serde_json::json!({})).await?;
        let recommendations: Vec<String> = suggestions
            .iter()
            .take(5)
            .map(|s| format!("- {s}"))
            .collect();

        Ok(format!(
            "Learning Agent Report\n=====================\n\n\
             Performance Metrics:\n\
             - Total Tasks: {}\n\
             - Successful Tasks: {}\n\
             - Success Rate: {:.1}%\n\
             - Patterns Learned: {}\n\n\
             System Health: {health}\n\n\
             Top Recommendations:\n{}",
            metrics.total_tasks,
            metrics.successful_tasks,
            rate * 100.0,
            metrics.patterns_learned,
            recommendations.join("\n")
        ))
    }

    /// Interpret free-text feedback and keep it as a preference.
    ///
    /// The interpretation is requested with history so later turns can see
    /// it. `applied` reports whether the preference write went through.
    pub async fn improve_from_feedback(
        &mut self,
        feedback: &str,
    ) -> Result<FeedbackRecord, GatewayError> {
        let prompt = format!(
            "Analyze and incorporate this user feedback:\n\n{feedback}\n\n\
             Update system behavior and knowledge base to address feedback.\n\
             Provide:\n\
             1. What was learned\n\
             2. How system will change\n\
             3. Knowledge base updates needed"
        );
        let improvements = self.agent.converse(&prompt, true).await?;

        let preference = UserPreference::new("feedback", feedback)
            .with_metadata("interpretation", improvements.as_str());
        let applied = match self.agent.knowledge().set_preference(preference).await {
            Ok(stored) => {
                info!(id = stored.id, "Feedback stored as preference");
                self.agent.publish(DomainEvent::KnowledgeUpdated {
                    operation: "set_preference".into(),
                    record_id: stored.id,
                    timestamp: Utc::now(),
                });
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to store feedback preference");
                false
            }
        };

        Ok(FeedbackRecord {
            feedback: feedback.to_string(),
            improvements,
            applied,
        })
    }
}
