//! Context management utilities for manual history management.
//!
//! Low-level helpers for estimating token cost and trimming conversation
//! history. These are opt-in utilities — nothing here runs automatically.
//! The executor clears message history at the end of every turn (only
//! `WorkflowState::conversation_summary` carries forward), so in practice
//! these guard a single turn's tool-call/tool-result buildup rather than an
//! open-ended chat history.
//!
//! # Examples
//!
//! ```rust
//! use crm_agent_core::context::estimate_tokens;
//! use crm_agent_core::types::Message;
//!
//! let messages = vec![Message::user("List my accounts")];
//! let tokens = estimate_tokens(&messages);
//! assert!(tokens > 0);
//! ```

use crate::types::Message;

/// Estimate token count for a message list.
///
/// Delegates to [`Message::approx_tokens`] per message plus a small
/// conversation-level overhead. Character-based approximation (roughly 4
/// characters per token) — not a substitute for the provider's own
/// tokenizer, just enough to guard a step/time budget.
pub fn estimate_tokens(messages: &[Message]) -> usize {
    if messages.is_empty() {
        return 0;
    }
    let per_message: usize = messages.iter().map(Message::approx_tokens).sum();
    per_message + 4
}

/// Truncate message history, keeping the most recent `keep` messages.
///
/// Always preserves a leading `Message::System` when `preserve_system` is
/// set. This is a simple truncation — it does not attempt to keep a tool
/// call paired with its tool result, so callers that truncate mid-turn may
/// orphan a `Message::Tool` entry.
pub fn truncate_messages(messages: &[Message], keep: usize, preserve_system: bool) -> Vec<Message> {
    if messages.is_empty() {
        return Vec::new();
    }
    if messages.len() <= keep {
        return messages.to_vec();
    }

    let has_system = preserve_system && matches!(messages[0], Message::System { .. });

    if has_system {
        let mut result = vec![messages[0].clone()];
        if keep > 0 && messages.len() > 1 {
            let start = messages.len().saturating_sub(keep);
            result.extend_from_slice(&messages[start.max(1)..]);
        }
        result
    } else if keep > 0 {
        let start = messages.len().saturating_sub(keep);
        messages[start..].to_vec()
    } else {
        Vec::new()
    }
}

/// Convenience check combining [`estimate_tokens`] with a threshold.
/// Returns `true` once the estimate exceeds `limit * margin`.
pub fn is_approaching_limit(messages: &[Message], limit: usize, margin: f32) -> bool {
    let estimated = estimate_tokens(messages);
    let threshold = (limit as f32 * margin) as usize;
    estimated > threshold
}
