//! The conversational agent shared by every role.
//!
//! One `Agent` type owns a conversation and talks to the gateway, the tool
//! registry and the knowledge store. A role only changes the directive that
//! leads every request; the post-processing lives in the role wrappers
//! (`PlanningAgent`, `CodingAgent`, `LearningAgent`).

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use forgeloop_core::error::{GatewayError, StoreError};
use forgeloop_core::event::{DomainEvent, EventBus};
use forgeloop_core::gateway::{FragmentStream, Gateway};
use forgeloop_core::knowledge::{KnowledgeStore, PatternQuery};
use forgeloop_core::message::Conversation;
use forgeloop_core::tool::ToolRegistry;
use tracing::{debug, warn};

use crate::plan::KnowledgeHit;

pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Patterns returned by [`Agent::query_knowledge`] unless overridden.
pub const DEFAULT_KNOWLEDGE_LIMIT: usize = 5;

const PLANNING_DIRECTIVE: &str = "You are a Planning Agent for software development tasks.

Your responsibilities:
1. Understand user requirements deeply
2. Search knowledge base for similar past tasks
3. Break down complex tasks into clear, actionable subtasks
4. Identify dependencies between subtasks
5. Estimate complexity for each subtask
6. Identify potential risks and edge cases

Format your plans as:
- Main goal: [clear description]
- Subtasks:
  1. [task description] (complexity: low/medium/high)
  2. [task description] (complexity: low/medium/high)
  ...
- Dependencies: [what must be done first]
- Risks: [potential issues]

Always consider past solutions from knowledge base.";

const CODING_DIRECTIVE: &str = "You are a Coding Agent responsible for implementing software.

Your responsibilities:
1. Understand the task requirements clearly
2. Search knowledge base for relevant code patterns
3. Write clean, maintainable code following best practices
4. Use tools to read, write, and test code
5. Run tests and verify functionality
6. Report results and any issues

Available tools:
- read_file(path): Read file contents
- write_file(path, content): Write content to file
- bash(command): Execute shell commands
- search_files(pattern): Search for files

To create a file, write a line `FILE: <path>` followed by a fenced code block with its full contents.
When using tools, clearly state what you're doing and why.
Always test your changes if possible.
Report success or failure clearly.";

const LEARNING_DIRECTIVE: &str = "You are a Learning Agent focused on system improvement.

Your responsibilities:
1. Analyze execution results to identify patterns
2. Evaluate code quality and effectiveness
3. Identify successful vs unsuccessful approaches
4. Update knowledge base with learned patterns
5. Suggest improvements to system behavior
6. Monitor performance metrics

When analyzing:
- Look for code patterns that consistently succeed
- Identify common failure modes
- Suggest optimizations
- Be specific and actionable";

/// Which directive an agent speaks under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentRole {
    Planning,
    Coding,
    Learning,
}

impl AgentRole {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Planning => "PlanningAgent",
            Self::Coding => "CodingAgent",
            Self::Learning => "LearningAgent",
        }
    }

    pub fn directive(&self) -> &'static str {
        match self {
            Self::Planning => PLANNING_DIRECTIVE,
            Self::Coding => CODING_DIRECTIVE,
            Self::Learning => LEARNING_DIRECTIVE,
        }
    }
}

/// A role-directed conversational capability.
pub struct Agent {
    role: AgentRole,
    gateway: Arc<dyn Gateway>,
    tools: Arc<ToolRegistry>,
    knowledge: Arc<dyn KnowledgeStore>,
    conversation: Conversation,
    temperature: f32,
    knowledge_limit: usize,
    event_bus: Option<Arc<EventBus>>,
}

impl Agent {
    pub fn new(
        role: AgentRole,
        gateway: Arc<dyn Gateway>,
        tools: Arc<ToolRegistry>,
        knowledge: Arc<dyn KnowledgeStore>,
    ) -> Self {
        Self {
            role,
            gateway,
            tools,
            knowledge,
            conversation: Conversation::with_directive(role.directive()),
            temperature: DEFAULT_TEMPERATURE,
            knowledge_limit: DEFAULT_KNOWLEDGE_LIMIT,
            event_bus: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_knowledge_limit(mut self, limit: usize) -> Self {
        self.knowledge_limit = limit;
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.set_event_bus(bus);
        self
    }

    pub fn set_event_bus(&mut self, bus: Arc<EventBus>) {
        self.event_bus = Some(bus);
    }

    pub fn role(&self) -> AgentRole {
        self.role
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn knowledge(&self) -> &Arc<dyn KnowledgeStore> {
        &self.knowledge
    }

    pub(crate) fn publish(&self, event: DomainEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }

    fn publish_response(&self, streamed: bool, chars: usize) {
        self.publish(DomainEvent::ResponseGenerated {
            agent: self.role.name().to_string(),
            model: self.gateway.model().to_string(),
            streamed,
            chars,
            timestamp: Utc::now(),
        });
    }

    /// One gateway call at the agent's default temperature.
    pub async fn converse(
        &mut self,
        input: &str,
        use_history: bool,
    ) -> Result<String, GatewayError> {
        self.converse_at(input, use_history, self.temperature).await
    }

    /// One gateway call.
    ///
    /// With `use_history` the exchange is appended to the conversation on
    /// success. On failure the conversation is left exactly as it was.
    pub async fn converse_at(
        &mut self,
        input: &str,
        use_history: bool,
        temperature: f32,
    ) -> Result<String, GatewayError> {
        let turns = self.conversation.assemble(input, use_history);
        debug!(
            agent = self.role.name(),
            turns = turns.len(),
            use_history,
            "Calling gateway"
        );

        let output = self.gateway.complete(&turns, temperature).await?;

        if use_history {
            self.conversation.commit_exchange(input, output.as_str());
        }
        self.publish_response(false, output.chars().count());
        Ok(output)
    }

    /// Streaming form of [`Agent::converse`].
    ///
    /// The exchange is committed only once the returned stream has been
    /// drained to its end without error.
    pub async fn converse_stream(
        &mut self,
        input: &str,
        use_history: bool,
    ) -> Result<ConverseStream<'_>, GatewayError> {
        let temperature = self.temperature;
        let turns = self.conversation.assemble(input, use_history);
        debug!(agent = self.role.name(), turns = turns.len(), "Opening gateway stream");

        let receiver = self.gateway.complete_streaming(&turns, temperature).await?;

        Ok(ConverseStream {
            agent: self,
            input: input.to_string(),
            use_history,
            receiver,
            collected: String::new(),
            finished: false,
        })
    }

    /// Run a tool. Failure comes back as `(false, diagnostic)`.
    pub async fn invoke_tool(&self, name: &str, arguments: serde_json::Value) -> (bool, String) {
        let start = Instant::now();
        let result = self.tools.execute(name, arguments).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        if !result.success {
            debug!(agent = self.role.name(), tool = name, error = ?result.error, "Tool failed");
        }
        self.publish(DomainEvent::ToolExecuted {
            tool_name: name.to_string(),
            success: result.success,
            duration_ms,
            timestamp: Utc::now(),
        });

        result.into_pair()
    }

    /// Top-ranked stored patterns, best first.
    ///
    /// Ranking belongs to the store; the query text is only logged.
    pub async fn query_knowledge(&self, query: &str) -> Result<Vec<KnowledgeHit>, StoreError> {
        debug!(agent = self.role.name(), query, "Querying knowledge");
        let patterns = self
            .knowledge
            .search_patterns(PatternQuery::new().with_limit(self.knowledge_limit))
            .await?;

        Ok(patterns
            .into_iter()
            .map(|p| KnowledgeHit {
                pattern_id: p.id,
                pattern_type: p.pattern_type,
                body: p.code,
                description: p.description,
                success_rate: p.success_rate,
            })
            .collect())
    }

    /// Clear the rolling conversation. The directive stays.
    pub fn reset_history(&mut self) {
        self.conversation.clear();
    }
}

/// A live streaming exchange.
///
/// Finite and not restartable: after the last fragment or the first error,
/// [`ConverseStream::next`] keeps returning `None`. Dropping it before the
/// end commits nothing.
pub struct ConverseStream<'a> {
    agent: &'a mut Agent,
    input: String,
    use_history: bool,
    receiver: FragmentStream,
    collected: String,
    finished: bool,
}

impl ConverseStream<'_> {
    /// The next fragment, or `None` once the stream has ended.
    pub async fn next(&mut self) -> Option<Result<String, GatewayError>> {
        if self.finished {
            return None;
        }

        match self.receiver.recv().await {
            Some(Ok(fragment)) => {
                self.collected.push_str(&fragment);
                Some(Ok(fragment))
            }
            Some(Err(e)) => {
                self.finished = true;
                warn!(
                    agent = self.agent.role.name(),
                    error = %e,
                    "Stream failed; nothing committed"
                );
                Some(Err(e))
            }
            None => {
                self.finished = true;
                if self.use_history {
                    self.agent
                        .conversation
                        .commit_exchange(self.input.as_str(), self.collected.as_str());
                }
                self.agent
                    .publish_response(true, self.collected.chars().count());
                None
            }
        }
    }

    /// Text received so far.
    pub fn collected(&self) -> &str {
        &self.collected
    }

    /// Drain the stream and return the full text.
    pub async fn collect(mut self) -> Result<String, GatewayError> {
        while let Some(fragment) = self.next().await {
            fragment?;
        }
        Ok(self.collected)
    }
}
