//! # CRM Agent Core
//!
//! Orchestration core for a ReAct-style conversational agent over a CRM
//! object model. A turn takes a natural-language request and a
//! `connection_id`, runs an LLM through a loop of proposed tool calls
//! against a fixed set of five CRM tools, and returns a typed structured
//! answer — either all at once (`Orchestrator::invoke`) or as a stream of
//! incremental events (`Orchestrator::invoke_stream`).
//!
//! ## Example
//!
//! ```rust,no_run
//! use crm_agent_core::{Orchestrator, checkpoint::InMemoryCheckpointer};
//! use crm_agent_core::crm::MockCrmClient;
//! use crm_agent_core::llm::MockLlmClient;
//! use crm_agent_core::types::Message;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let orchestrator = Orchestrator::builder()
//!     .crm(Arc::new(MockCrmClient::new()))
//!     .llm(Arc::new(MockLlmClient::new(vec![Message::ai_text(
//!         r#"{"response_type":"clarification_needed","confidence":0.9,"confidence_label":"high","intent_understood":"joke","data_summary":{}}"#,
//!     )])))
//!     .checkpointer(Arc::new(InMemoryCheckpointer::new()))
//!     .build()?;
//!
//! let outcome = orchestrator.invoke("Tell me a joke", "conn_1", None, true).await?;
//! println!("{}", outcome.final_text);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **orchestrator**: the two public entry points, `invoke`/`invoke_stream` (C8)
//! - **executor**: the ReAct control loop alternating LLM calls and tool calls (C6)
//! - **stream**: translates executor events into the wire-facing event vocabulary (C7)
//! - **tools**: the fixed five-tool registry and the JSON-schema-descriptor machinery (C3)
//! - **llm**: the OpenAI-compatible LLM client boundary, streaming and non-streaming
//! - **crm**: the CRM client boundary tools invoke against
//! - **cache**: the TTL'd object-list/metadata cache (C2)
//! - **checkpoint**: durable per-conversation state storage (C5)
//! - **parser**: tolerant JSON extraction from a free-text LLM reply (C4)
//! - **prompt**: the system prompt builder, two presets, one pure function
//! - **types**: the turn container (`WorkflowState`), message vocabulary, cache entry shapes
//! - **response_types**: the `StructuredResponse` contract and confidence-label mapping
//! - **config**: typed, env-sourced runtime configuration
//! - **error**: the crate's error taxonomy and LLM error classification
//! - **context**: opt-in token estimation/truncation utilities for manual history management
//! - **retry**: exponential backoff retry logic with jitter

pub mod cache;
pub mod checkpoint;
pub mod config;
pub mod context;
pub mod crm;
pub mod error;
pub mod executor;
pub mod llm;
pub mod orchestrator;
pub mod parser;
pub mod prompt;
pub mod response_types;
pub mod retry;
pub mod stream;
pub mod tools;
pub mod types;

pub use error::{Error, Result};
pub use orchestrator::{InvokeOutcome, Orchestrator, OrchestratorBuilder};
pub use tools::{tool, Tool, ToolBuilder};

/// Convenience module with the most commonly used types for a typical
/// integration: build an `Orchestrator`, call `invoke`/`invoke_stream`,
/// read back a `StructuredResponse`.
pub mod prelude {
    pub use crate::config::AgentConfig;
    pub use crate::error::{Error, Result};
    pub use crate::orchestrator::{InvokeOutcome, Orchestrator, OrchestratorBuilder};
    pub use crate::response_types::{ResponseType, StructuredResponse};
    pub use crate::stream::StreamEvent;
    pub use crate::types::{Message, WorkflowState};
}
