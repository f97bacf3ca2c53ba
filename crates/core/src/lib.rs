//! # Forgeloop Core
//!
//! Domain types, traits, and error definitions for the Forgeloop agent
//! orchestration pipeline. Every collaborator the agents talk to (the
//! language-model gateway, the tool executor, the knowledge store) is a
//! trait defined here; implementations live in their own crates and all
//! of them depend inward on this one.

pub mod error;
pub mod message;
pub mod gateway;
pub mod tool;
pub mod knowledge;
pub mod event;

pub use error::{Error, Result, GatewayError, ToolError, StoreError, ParseError};
pub use message::{Conversation, Role, Turn};
pub use gateway::{FragmentStream, Gateway};
pub use tool::{Tool, ToolRegistry, ToolResult};
pub use knowledge::{
    CodePattern, KnowledgeCounts, KnowledgeStore, PatternQuery, Solution, UserPreference,
    running_mean,
};
pub use event::{DomainEvent, EventBus};
