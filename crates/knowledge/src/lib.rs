//! Knowledge store implementations for Forgeloop.

pub mod in_memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemoryKnowledgeStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteKnowledgeStore;
