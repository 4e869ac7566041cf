//! Error types for the toolrelay domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; the top-level [`Error`]
//! wraps them so a single `?` carries any failure out of a run.

use thiserror::Error;

/// The top-level error type for all toolrelay operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Completion endpoint errors ---
    #[error("Completion request failed: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool registry / dispatch errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Credentials ---
    #[error("No API credential found (checked: {checked})")]
    MissingCredential { checked: String },

    // --- History invariants ---
    #[error("Invalid history: {0}")]
    InvalidHistory(String),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures of a single request/response exchange with the completion endpoint.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Completion reply carried no content")]
    EmptyReply,
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool already registered: {0}")]
    Duplicate(String),

    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid arguments for {tool_name}: {reason}")]
    InvalidArguments { tool_name: String, reason: String },

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },
}

impl Error {
    /// True when the error came from the completion endpoint boundary.
    pub fn is_completion_failure(&self) -> bool {
        matches!(self, Error::Provider(_))
    }
}
