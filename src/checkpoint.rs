//! Checkpointer (C5): durable map from conversation id to latest
//! [`WorkflowState`].
//!
//! `Save` must be atomic with respect to a single conversation id — a
//! concurrent `Load` observes either the pre- or post-state, never a mix —
//! and `messages` is always cleared before persisting, since conversation
//! history lives in `conversation_summary` instead. [`WorkflowState::for_checkpoint`]
//! enforces the latter; per-conversation locking here enforces the former.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::types::WorkflowState;

/// Append-only debug record; not required for correctness, only observed
/// through [`Checkpointer::writes_log`] in tests and diagnostics.
#[derive(Debug, Clone)]
pub struct CheckpointEvent {
    pub conversation_id: String,
    pub description: String,
}

#[async_trait]
pub trait Checkpointer: Send + Sync {
    async fn load(&self, conversation_id: &str) -> Result<Option<WorkflowState>>;
    async fn save(&self, conversation_id: &str, state: &WorkflowState) -> Result<()>;
    /// Optional append-only debug log; not required for correctness.
    async fn writes_log(&self, conversation_id: &str, event: String) -> Result<()>;
    /// Acquire the per-conversation turn lock (spec §5: "hold a
    /// per-conversation lock for the duration of load→run→save"). The
    /// caller holds the returned guard across its own `load`/executor-run/
    /// `save` sequence so two concurrent turns on the same conversation id
    /// serialize instead of both loading the same prior state and racing
    /// on `save`.
    async fn turn_lock(&self, conversation_id: &str) -> tokio::sync::OwnedMutexGuard<()>;
}

/// In-process checkpoint store. One lock per conversation id, held across
/// the read-modify-write of a single `save`, so two concurrent turns on the
/// same conversation serialize rather than interleave; turns on different
/// conversations never block each other. A second, coarser per-conversation
/// lock (`turn_locks`) is what `Orchestrator` holds across the whole
/// load→run→save span of one turn.
pub struct InMemoryCheckpointer {
    states: Mutex<HashMap<String, Arc<Mutex<Option<WorkflowState>>>>>,
    turn_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    log: Mutex<HashMap<String, Vec<CheckpointEvent>>>,
}

impl InMemoryCheckpointer {
    pub fn new() -> Self {
        Self { states: Mutex::new(HashMap::new()), turn_locks: Mutex::new(HashMap::new()), log: Mutex::new(HashMap::new()) }
    }

    async fn slot(&self, conversation_id: &str) -> Arc<Mutex<Option<WorkflowState>>> {
        let mut states = self.states.lock().await;
        states.entry(conversation_id.to_string()).or_insert_with(|| Arc::new(Mutex::new(None))).clone()
    }

    async fn turn_lock_handle(&self, conversation_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.turn_locks.lock().await;
        locks.entry(conversation_id.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }
}

impl Default for InMemoryCheckpointer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Checkpointer for InMemoryCheckpointer {
    async fn load(&self, conversation_id: &str) -> Result<Option<WorkflowState>> {
        let slot = self.slot(conversation_id).await;
        let guard = slot.lock().await;
        Ok(guard.clone())
    }

    async fn save(&self, conversation_id: &str, state: &WorkflowState) -> Result<()> {
        let slot = self.slot(conversation_id).await;
        let mut guard = slot.lock().await;
        *guard = Some(state.for_checkpoint());
        Ok(())
    }

    async fn writes_log(&self, conversation_id: &str, event: String) -> Result<()> {
        let mut log = self.log.lock().await;
        log.entry(conversation_id.to_string())
            .or_default()
            .push(CheckpointEvent { conversation_id: conversation_id.to_string(), description: event });
        Ok(())
    }

    async fn turn_lock(&self, conversation_id: &str) -> tokio::sync::OwnedMutexGuard<()> {
        let handle = self.turn_lock_handle(conversation_id).await;
        handle.lock_owned().await
    }
}

impl InMemoryCheckpointer {
    /// Test/diagnostic accessor for the append-only log.
    pub async fn events_for(&self, conversation_id: &str) -> Vec<CheckpointEvent> {
        self.log.lock().await.get(conversation_id).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConversationSummary, Message};

    #[tokio::test]
    async fn load_on_unknown_conversation_returns_none() {
        let cp = InMemoryCheckpointer::new();
        assert!(cp.load("conv_missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let cp = InMemoryCheckpointer::new();
        let state = WorkflowState::fresh("conv_1", "conn_1", "hello", 0.75, 10);
        cp.save("conv_1", &state).await.unwrap();
        let loaded = cp.load("conv_1").await.unwrap().unwrap();
        assert_eq!(loaded.meta.conversation_id, "conv_1");
    }

    #[tokio::test]
    async fn save_clears_messages_before_persisting() {
        let cp = InMemoryCheckpointer::new();
        let mut state = WorkflowState::fresh("conv_1", "conn_1", "hello", 0.75, 10);
        state.messages.push(Message::user("hello"));
        cp.save("conv_1", &state).await.unwrap();
        let loaded = cp.load("conv_1").await.unwrap().unwrap();
        assert!(loaded.messages.is_empty());
    }

    #[tokio::test]
    async fn failed_turn_leaves_previous_checkpoint_authoritative() {
        let cp = InMemoryCheckpointer::new();
        let mut first = WorkflowState::fresh("conv_1", "conn_1", "first", 0.75, 10);
        first.conversation_summary = Some(ConversationSummary::default());
        cp.save("conv_1", &first).await.unwrap();

        // A turn that fails before calling save() never overwrites the checkpoint.
        let loaded = cp.load("conv_1").await.unwrap().unwrap();
        assert_eq!(loaded.request.user_input, "first");
    }

    #[tokio::test]
    async fn different_conversations_do_not_interfere() {
        let cp = InMemoryCheckpointer::new();
        let a = WorkflowState::fresh("conv_a", "conn_1", "hi a", 0.75, 10);
        let b = WorkflowState::fresh("conv_b", "conn_1", "hi b", 0.75, 10);
        cp.save("conv_a", &a).await.unwrap();
        cp.save("conv_b", &b).await.unwrap();
        assert_eq!(cp.load("conv_a").await.unwrap().unwrap().request.user_input, "hi a");
        assert_eq!(cp.load("conv_b").await.unwrap().unwrap().request.user_input, "hi b");
    }

    #[tokio::test]
    async fn writes_log_is_append_only_and_optional() {
        let cp = InMemoryCheckpointer::new();
        cp.writes_log("conv_1", "turn started".to_string()).await.unwrap();
        cp.writes_log("conv_1", "tool call: search_for_sobjects".to_string()).await.unwrap();
        let events = cp.events_for("conv_1").await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].description, "turn started");
    }
}
