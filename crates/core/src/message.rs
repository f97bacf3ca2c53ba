//! Turn and Conversation domain types.
//!
//! A [`Conversation`] is the rolling dialogue one agent keeps with the model:
//! an optional fixed role directive plus an append-only list of turns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The role of a turn's author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Fixed instructions for the model
    System,
    /// The human, or the orchestrator speaking on their behalf
    User,
    /// The model
    Assistant,
}

/// A single (role, content) turn sent to the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Rolling dialogue state of one agent.
///
/// The directive is never stored among the turns; it is prepended when the
/// request is assembled, so clearing history cannot remove it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    directive: Option<String>,

    turns: Vec<Turn>,

    /// When the last exchange was committed
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create an empty conversation with no directive.
    pub fn new() -> Self {
        Self {
            directive: None,
            turns: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// Create an empty conversation led by a fixed role directive.
    pub fn with_directive(directive: impl Into<String>) -> Self {
        Self {
            directive: Some(directive.into()),
            ..Self::new()
        }
    }

    pub fn directive(&self) -> Option<&str> {
        self.directive.as_deref()
    }

    /// Committed turns, oldest first. Excludes the directive.
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Build the turn list for one gateway call: directive first, then
    /// (optionally) the prior turns, then the new user input.
    pub fn assemble(&self, input: &str, use_history: bool) -> Vec<Turn> {
        let history = if use_history { self.turns.len() } else { 0 };
        let mut turns = Vec::with_capacity(history + 2);
        if let Some(directive) = &self.directive {
            turns.push(Turn::system(directive.clone()));
        }
        if use_history {
            turns.extend(self.turns.iter().cloned());
        }
        turns.push(Turn::user(input));
        turns
    }

    /// Append one completed user/assistant exchange.
    pub fn commit_exchange(&mut self, input: impl Into<String>, output: impl Into<String>) {
        self.turns.push(Turn::user(input));
        self.turns.push(Turn::assistant(output));
        self.updated_at = Utc::now();
    }

    /// Drop every committed turn. The directive stays.
    pub fn clear(&mut self) {
        self.turns.clear();
        self.updated_at = Utc::now();
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}
