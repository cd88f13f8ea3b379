//! Error types for the agent orchestration core.
//!
//! One `thiserror`-derived enum covers every failure surface named in the
//! error-handling design: tool/cache/checkpoint plumbing errors that
//! propagate as `Result`s, plus `LlmErrorKind` classification for provider
//! errors that get mapped to fixed user-facing templates rather than
//! propagated raw. Parser failures and tool failures are deliberately NOT
//! `Error` variants — per the design, both are reified as values (`None`
//! and `ToolResult{ok:false,..}` respectively), never exceptions.

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of an LLM provider failure, each mapped to a fixed
/// user-facing template (error handling design, item 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    ApiKeyInvalid,
    RateLimit,
    Quota,
    Other,
}

impl LlmErrorKind {
    /// Classify a raw provider error body by the same substring signals the
    /// source implementation keys on (`invalid_api_key`, `rate_limit`,
    /// `insufficient_quota`), falling back to `Other` for anything else,
    /// including transient network errors.
    pub fn classify(body: &str) -> Self {
        let lower = body.to_lowercase();
        if lower.contains("invalid_api_key") || lower.contains("incorrect api key") {
            LlmErrorKind::ApiKeyInvalid
        } else if lower.contains("rate_limit") || lower.contains("rate limit") {
            LlmErrorKind::RateLimit
        } else if lower.contains("insufficient_quota") || lower.contains("quota") {
            LlmErrorKind::Quota
        } else {
            LlmErrorKind::Other
        }
    }

    /// Fixed, user-facing guidance template for this error class.
    pub fn user_message(&self) -> &'static str {
        match self {
            LlmErrorKind::ApiKeyInvalid => {
                "The configured LLM API key was rejected by the provider. Check LLM_API_KEY."
            }
            LlmErrorKind::RateLimit => {
                "The LLM provider is rate-limiting this connection. Please retry shortly."
            }
            LlmErrorKind::Quota => {
                "The LLM provider reports the account has exhausted its quota."
            }
            LlmErrorKind::Other => "The LLM provider returned an unexpected error.",
        }
    }
}

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP transport error talking to the LLM provider or the CRM.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Classified LLM provider error.
    #[error("LLM provider error ({kind:?}): {message}")]
    Llm { kind: LlmErrorKind, message: String },

    /// Streaming error (SSE parsing, channel failure).
    #[error("Streaming error: {0}")]
    Stream(String),

    /// CRM client error, surfaced by the `CrmClient` boundary.
    #[error("CRM error: {0}")]
    Crm(String),

    /// Cache storage error (C2 failure semantics: surfaces as `(none, error)`
    /// to the caller; tools treat it as a miss plus a logged warning).
    #[error("Cache error: {0}")]
    Cache(String),

    /// Checkpoint storage error.
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Invalid input (empty user input, unknown connection id, ...).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Timeout error — step/time budget or per-call deadline exceeded.
    #[error("Request timeout")]
    Timeout,

    /// Unexpected internal error, logged with a correlation id by the
    /// caller before being surfaced generically.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Catch-all for errors that don't fit a more specific variant above.
    #[error("Error: {0}")]
    Other(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub fn llm(kind: LlmErrorKind, message: impl Into<String>) -> Self {
        Error::Llm { kind, message: message.into() }
    }

    pub fn stream(msg: impl Into<String>) -> Self {
        Error::Stream(msg.into())
    }

    pub fn crm(msg: impl Into<String>) -> Self {
        Error::Crm(msg.into())
    }

    pub fn cache(msg: impl Into<String>) -> Self {
        Error::Cache(msg.into())
    }

    pub fn checkpoint(msg: impl Into<String>) -> Self {
        Error::Checkpoint(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    pub fn timeout() -> Self {
        Error::Timeout
    }
}
