//! Shared test helpers for agent and orchestrator tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use forgeloop_core::error::GatewayError;
use forgeloop_core::gateway::{FragmentStream, Gateway};
use forgeloop_core::message::Turn;
use forgeloop_core::tool::ToolRegistry;
use forgeloop_knowledge::InMemoryKnowledgeStore;
use tokio::sync::mpsc;

use crate::agent::{Agent, AgentRole};

/// A gateway that returns a sequence of scripted replies.
///
/// Each call to `complete` or `complete_streaming` takes the next reply.
/// Panics if more calls are made than replies provided.
pub struct ScriptedGateway {
    responses: Mutex<Vec<Result<String, GatewayError>>>,
    call_count: Mutex<usize>,
    seen: Mutex<Vec<Vec<Turn>>>,
    fragment_size: usize,
    stream_failure_after: Option<usize>,
}

impl ScriptedGateway {
    pub fn new(responses: Vec<Result<String, GatewayError>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            call_count: Mutex::new(0),
            seen: Mutex::new(Vec::new()),
            fragment_size: 0,
            stream_failure_after: None,
        }
    }

    pub fn texts(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| Ok(t.to_string())).collect())
    }

    /// Split streamed replies into fragments of this many chars.
    pub fn with_fragment_size(mut self, size: usize) -> Self {
        self.fragment_size = size;
        self
    }

    /// Streams fail with `StreamInterrupted` after this many fragments.
    pub fn with_stream_failure_after(mut self, fragments: usize) -> Self {
        self.stream_failure_after = Some(fragments);
        self
    }

    pub fn call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }

    /// The turns sent on the most recent call.
    pub fn last_turns(&self) -> Vec<Turn> {
        self.seen.lock().unwrap().last().cloned().unwrap_or_default()
    }

    /// The final user turn of every call, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter_map(|turns| turns.last().map(|t| t.content.clone()))
            .collect()
    }

    fn next_response(&self, turns: &[Turn]) -> Result<String, GatewayError> {
        let mut count = self.call_count.lock().unwrap();
        let responses = self.responses.lock().unwrap();

        if *count >= responses.len() {
            panic!(
                "ScriptedGateway: no more responses (call #{}, have {})",
                *count,
                responses.len()
            );
        }

        self.seen.lock().unwrap().push(turns.to_vec());
        let response = responses[*count].clone();
        *count += 1;
        response
    }
}

#[async_trait]
impl Gateway for ScriptedGateway {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-1"
    }

    async fn complete(&self, turns: &[Turn], _temperature: f32) -> Result<String, GatewayError> {
        self.next_response(turns)
    }

    async fn complete_streaming(
        &self,
        turns: &[Turn],
        _temperature: f32,
    ) -> Result<FragmentStream, GatewayError> {
        let text = self.next_response(turns)?;
        let chars: Vec<char> = text.chars().collect();
        let fragments: Vec<String> = if self.fragment_size == 0 || chars.is_empty() {
            vec![text]
        } else {
            chars
                .chunks(self.fragment_size)
                .map(|c| c.iter().collect())
                .collect()
        };

        let (tx, rx) = mpsc::channel(fragments.len() + 1);
        for (i, fragment) in fragments.into_iter().enumerate() {
            if self.stream_failure_after == Some(i) {
                let _ = tx.try_send(Err(GatewayError::StreamInterrupted("scripted".into())));
                return Ok(rx);
            }
            let _ = tx.try_send(Ok(fragment));
        }
        Ok(rx)
    }
}

pub fn empty_tools() -> ToolRegistry {
    ToolRegistry::new()
}

/// An agent over the scripted gateway, no tools and an empty in-memory store.
pub fn agent_with(role: AgentRole, gateway: Arc<ScriptedGateway>) -> Agent {
    Agent::new(
        role,
        gateway,
        Arc::new(empty_tools()),
        Arc::new(InMemoryKnowledgeStore::new()),
    )
}
