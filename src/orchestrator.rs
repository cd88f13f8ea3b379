//! Orchestrator API (C8): the two public entry points, `invoke` and
//! `invoke_stream`, wiring the CRM client, LLM client, cache, and
//! checkpointer together as explicit dependencies (spec §9: "global
//! singletons → context-passed dependencies" — no process-wide mutable
//! state here, every collaborator is constructor-injected).

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use futures::Stream;

use crate::cache::MetadataCache;
use crate::checkpoint::Checkpointer;
use crate::config::{AgentConfig, PromptPreset};
use crate::crm::CrmClient;
use crate::error::Result;
use crate::executor::{self, ExecutorContext};
use crate::llm::LlmClient;
use crate::response_types::StructuredResponse;
use crate::stream::{spawn_stream, StreamEvent};
use crate::tools::ToolContext;
use crate::types::WorkflowState;

/// Everything `Invoke`/`InvokeStream` need, bundled once at construction.
pub struct Orchestrator {
    crm: Arc<dyn CrmClient>,
    llm: Arc<dyn LlmClient>,
    cache: Arc<MetadataCache>,
    checkpointer: Arc<dyn Checkpointer>,
    config: AgentConfig,
}

pub struct OrchestratorBuilder {
    crm: Option<Arc<dyn CrmClient>>,
    llm: Option<Arc<dyn LlmClient>>,
    cache: Option<Arc<MetadataCache>>,
    checkpointer: Option<Arc<dyn Checkpointer>>,
    config: AgentConfig,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self { crm: None, llm: None, cache: None, checkpointer: None, config: AgentConfig::default() }
    }

    pub fn crm(mut self, crm: Arc<dyn CrmClient>) -> Self {
        self.crm = Some(crm);
        self
    }

    pub fn llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn cache(mut self, cache: Arc<MetadataCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn checkpointer(mut self, checkpointer: Arc<dyn Checkpointer>) -> Self {
        self.checkpointer = Some(checkpointer);
        self
    }

    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> std::result::Result<Orchestrator, crate::error::Error> {
        Ok(Orchestrator {
            crm: self.crm.ok_or_else(|| crate::error::Error::config("crm client is required"))?,
            llm: self.llm.ok_or_else(|| crate::error::Error::config("llm client is required"))?,
            cache: self.cache.unwrap_or_else(|| {
                Arc::new(MetadataCache::new(self.config.sobject_cache_ttl, self.config.metadata_cache_ttl))
            }),
            checkpointer: self
                .checkpointer
                .ok_or_else(|| crate::error::Error::config("checkpointer is required"))?,
            config: self.config,
        })
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// What `Invoke` hands back to the caller.
pub struct InvokeOutcome {
    pub final_text: String,
    pub structured_response: Option<StructuredResponse>,
    pub state: WorkflowState,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// Resolve the conversation id up front, before any lock is taken or
    /// checkpoint touched: missing id or `new_thread=true` allocates
    /// `conv_<uuid>` (per spec §4.7), otherwise the caller-supplied id is
    /// reused verbatim so it can be locked before `load`.
    fn resolve_conversation_id(conversation_id: &Option<String>, new_thread: bool) -> String {
        match (conversation_id, new_thread) {
            (Some(id), false) => id.clone(),
            _ => format!("conv_{}", uuid::Uuid::new_v4()),
        }
    }

    /// Load or seed state for an already-resolved conversation id, per spec
    /// §4.7: an existing checkpoint is reused with the turn-scoped fields
    /// reset; `new_thread=true` or no prior checkpoint starts fresh.
    async fn prepare_state(
        &self,
        user_input: &str,
        connection_id: &str,
        conversation_id: String,
        new_thread: bool,
    ) -> Result<WorkflowState> {
        if !new_thread {
            if let Some(prior) = self.checkpointer.load(&conversation_id).await? {
                return Ok(prior.seed_next_turn(user_input, self.config.ai_react_max_steps));
            }
        }

        Ok(WorkflowState::fresh(
            conversation_id,
            connection_id,
            user_input,
            self.config.ai_react_high_confidence_threshold,
            self.config.ai_react_max_steps,
        ))
    }

    fn executor_context(&self, connection_id: &str, cancel: Arc<AtomicBool>) -> ExecutorContext {
        ExecutorContext {
            llm: self.llm.clone(),
            tool_ctx: ToolContext::new(
                connection_id.to_string(),
                self.crm.clone(),
                self.cache.clone(),
                self.config.metadata_max_objects,
                self.config.metadata_max_fields_per_object,
                self.config.query_default_limit,
            ),
            object_limit: self.config.metadata_max_objects,
            field_limit: self.config.metadata_max_fields_per_object,
            query_limit: self.config.query_default_limit,
            task_timeout: self.config.task_timeout,
            prompt_preset: self.config.prompt_preset,
            cancel,
        }
    }

    pub async fn invoke(
        &self,
        user_input: &str,
        connection_id: &str,
        conversation_id: Option<String>,
        new_thread: bool,
    ) -> Result<InvokeOutcome> {
        self.invoke_cancellable(user_input, connection_id, conversation_id, new_thread, Arc::new(AtomicBool::new(false))).await
    }

    pub async fn invoke_cancellable(
        &self,
        user_input: &str,
        connection_id: &str,
        conversation_id: Option<String>,
        new_thread: bool,
        cancel: Arc<AtomicBool>,
    ) -> Result<InvokeOutcome> {
        let resolved_id = Self::resolve_conversation_id(&conversation_id, new_thread);
        let _turn_guard = self.checkpointer.turn_lock(&resolved_id).await;

        let mut state = self.prepare_state(user_input, connection_id, resolved_id, new_thread).await?;
        let ctx = self.executor_context(connection_id, cancel);

        executor::run(&mut state, &ctx, |_event| {}).await?;

        if !matches!(state.meta.status, crate::types::WorkflowStatus::Cancelled) {
            self.checkpointer.save(&state.meta.conversation_id, &state).await?;
        }

        let final_text = state.response.as_ref().map(|r| r.content.clone()).unwrap_or_default();
        Ok(InvokeOutcome { final_text, structured_response: state.structured_response.clone(), state })
    }

    pub async fn invoke_stream(
        &self,
        user_input: &str,
        connection_id: &str,
        conversation_id: Option<String>,
        new_thread: bool,
        cancel: Arc<AtomicBool>,
    ) -> Result<impl Stream<Item = StreamEvent>> {
        let resolved_id = Self::resolve_conversation_id(&conversation_id, new_thread);
        let turn_guard = self.checkpointer.turn_lock(&resolved_id).await;

        let mut state = self.prepare_state(user_input, connection_id, resolved_id, new_thread).await?;
        let ctx = self.executor_context(connection_id, cancel);
        let thread_id = state.meta.conversation_id.clone();
        let conversation_id = state.meta.conversation_id.clone();

        let (tx, stream) = spawn_stream(64, thread_id, conversation_id);
        let checkpointer = self.checkpointer.clone();

        tokio::spawn(async move {
            let result = executor::run(&mut state, &ctx, |event| {
                let _ = tx.try_send(event);
            })
            .await;

            if result.is_ok() && !matches!(state.meta.status, crate::types::WorkflowStatus::Cancelled) {
                let _ = checkpointer.save(&state.meta.conversation_id, &state).await;
            }

            drop(turn_guard);
        });

        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MetadataCache;
    use crate::checkpoint::InMemoryCheckpointer;
    use crate::crm::MockCrmClient;
    use crate::llm::MockLlmClient;
    use crate::types::Message;
    use async_trait::async_trait;
    use std::time::Duration;

    fn make_orchestrator(script: Vec<Message>) -> Orchestrator {
        Orchestrator::builder()
            .crm(Arc::new(MockCrmClient::new()))
            .llm(Arc::new(MockLlmClient::new(script)))
            .cache(Arc::new(MetadataCache::new(Duration::from_secs(3600), Duration::from_secs(3600))))
            .checkpointer(Arc::new(InMemoryCheckpointer::new()))
            .config(AgentConfig { ai_react_max_steps: 10, ..AgentConfig::default() })
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn invoke_allocates_a_fresh_conversation_id_when_none_given() {
        let final_json = r#"{"response_type":"clarification_needed","confidence":0.9,"confidence_label":"high","intent_understood":"joke","data_summary":{},"clarification":{"type":"out_of_scope","question":"I can only help with CRM data."}}"#;
        let orchestrator = make_orchestrator(vec![Message::ai_text(final_json)]);
        let outcome = orchestrator.invoke("Tell me a joke", "conn_1", None, false).await.unwrap();
        assert!(outcome.state.meta.conversation_id.starts_with("conv_"));
        assert!(outcome.structured_response.is_some());
    }

    #[tokio::test]
    async fn invoke_persists_state_via_checkpointer() {
        let final_json = r#"{"response_type":"clarification_needed","confidence":0.9,"confidence_label":"high","intent_understood":"joke","data_summary":{}}"#;
        let crm = Arc::new(MockCrmClient::new());
        let checkpointer = Arc::new(InMemoryCheckpointer::new());
        let orchestrator = Orchestrator::builder()
            .crm(crm)
            .llm(Arc::new(MockLlmClient::new(vec![Message::ai_text(final_json)])))
            .cache(Arc::new(MetadataCache::new(Duration::from_secs(3600), Duration::from_secs(3600))))
            .checkpointer(checkpointer.clone())
            .build()
            .unwrap();

        let outcome = orchestrator.invoke("Tell me a joke", "conn_1", Some("conv_fixed".to_string()), true).await.unwrap();
        let persisted = checkpointer.load(&outcome.state.meta.conversation_id).await.unwrap();
        assert!(persisted.is_some());
        assert!(persisted.unwrap().messages.is_empty());
    }

    #[tokio::test]
    async fn new_thread_true_ignores_any_prior_checkpoint_for_that_id() {
        let checkpointer = Arc::new(InMemoryCheckpointer::new());
        let mut prior = WorkflowState::fresh("conv_1", "conn_1", "first", 0.8, 10);
        prior.conversation_summary = Some(crate::types::ConversationSummary::default());
        checkpointer.save("conv_1", &prior).await.unwrap();

        let final_json = r#"{"response_type":"clarification_needed","confidence":0.9,"confidence_label":"high","intent_understood":"joke","data_summary":{}}"#;
        let orchestrator = Orchestrator::builder()
            .crm(Arc::new(MockCrmClient::new()))
            .llm(Arc::new(MockLlmClient::new(vec![Message::ai_text(final_json)])))
            .cache(Arc::new(MetadataCache::new(Duration::from_secs(3600), Duration::from_secs(3600))))
            .checkpointer(checkpointer)
            .build()
            .unwrap();

        let outcome = orchestrator.invoke("second", "conn_1", Some("conv_1".to_string()), true).await.unwrap();
        assert_ne!(outcome.state.meta.conversation_id, "conv_1");
    }

    /// An `LlmClient` that sleeps on its first call, so the executor's
    /// load→run→save span is wide enough for a second concurrent `invoke`
    /// on the same conversation id to actually race against it.
    struct SlowFirstCallLlm {
        delay: Duration,
        script: std::sync::Mutex<std::collections::VecDeque<Message>>,
    }

    #[async_trait]
    impl LlmClient for SlowFirstCallLlm {
        async fn chat(&self, _messages: &[Message], _tools: &[serde_json::Value]) -> Result<crate::llm::LlmReply> {
            tokio::time::sleep(self.delay).await;
            let message = self.script.lock().unwrap().pop_front().expect("script exhausted");
            Ok(crate::llm::LlmReply { message })
        }
    }

    #[tokio::test]
    async fn concurrent_invokes_on_same_conversation_serialize_instead_of_clobbering() {
        let checkpointer = Arc::new(InMemoryCheckpointer::new());
        let first_reply = r#"{"response_type":"clarification_needed","confidence":0.9,"confidence_label":"high","intent_understood":"first","data_summary":{}}"#;
        let second_reply = r#"{"response_type":"clarification_needed","confidence":0.9,"confidence_label":"high","intent_understood":"second","data_summary":{}}"#;

        let orchestrator = Arc::new(
            Orchestrator::builder()
                .crm(Arc::new(MockCrmClient::new()))
                .llm(Arc::new(SlowFirstCallLlm {
                    delay: Duration::from_millis(20),
                    script: std::sync::Mutex::new(vec![Message::ai_text(first_reply), Message::ai_text(second_reply)].into()),
                }))
                .cache(Arc::new(MetadataCache::new(Duration::from_secs(3600), Duration::from_secs(3600))))
                .checkpointer(checkpointer.clone())
                .config(AgentConfig { ai_react_max_steps: 10, ..AgentConfig::default() })
                .build()
                .unwrap(),
        );

        let a = orchestrator.clone();
        let b = orchestrator.clone();
        let turn_a = tokio::spawn(async move { a.invoke("first turn", "conn_1", Some("conv_shared".to_string()), true).await });
        // Give the first call time to grab the lock and start its (slow) LLM call first.
        tokio::time::sleep(Duration::from_millis(5)).await;
        let turn_b = tokio::spawn(async move { b.invoke("second turn", "conn_1", Some("conv_shared".to_string()), false).await });

        let (a_result, b_result) = tokio::join!(turn_a, turn_b);
        a_result.unwrap().unwrap();
        b_result.unwrap().unwrap();

        // The checkpoint reflects the second turn, not a racily-overwritten mix: if the lock
        // didn't serialize these, turn B would have loaded state before turn A's save landed.
        let persisted = checkpointer.load("conv_shared").await.unwrap().unwrap();
        assert_eq!(persisted.request.user_input, "second turn");
    }

    #[tokio::test]
    async fn invoke_stream_emits_events_ending_in_complete() {
        use futures::StreamExt;

        let final_json = r#"{"response_type":"clarification_needed","confidence":0.9,"confidence_label":"high","intent_understood":"joke","data_summary":{}}"#;
        let orchestrator = make_orchestrator(vec![Message::ai_text(final_json)]);
        let stream = orchestrator
            .invoke_stream("Tell me a joke", "conn_1", None, true, Arc::new(AtomicBool::new(false)))
            .await
            .unwrap();
        let events: Vec<StreamEvent> = stream.collect().await;
        assert!(matches!(events.last().unwrap(), StreamEvent::Complete { .. }));
    }
}
