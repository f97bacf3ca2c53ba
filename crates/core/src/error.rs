//! Error types for the Forgeloop domain.
//!
//! Each bounded context has its own `thiserror` enum; [`Error`] aggregates
//! them for callers that cross context boundaries.

use thiserror::Error;

/// The top-level error type for Forgeloop operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Gateway errors ---
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Knowledge store errors ---
    #[error("Knowledge store error: {0}")]
    Store(#[from] StoreError),

    // --- Structured output ---
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Transport or provider failure from the language-model gateway.
///
/// Always surfaced to the user; the pipeline never retries on its own.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("API request failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Gateway not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Tool missing, unauthorized, rejected, or failed.
///
/// The registry turns these into failed `ToolResult`s so agents never see them as `Err`.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool not authorized: {0}")]
    NotAuthorized(String),

    #[error("Command not allowed: {0}")]
    CommandNotAllowed(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

/// A model response could not be read as the structured data we asked for.
///
/// Always recoverable: callers treat it as "nothing extracted".
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid JSON in model output: {0}")]
    InvalidJson(String),

    #[error("Missing field in model output: {0}")]
    MissingField(String),
}
