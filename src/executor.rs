//! ReAct Executor (C6): the single-threaded cooperative control loop that
//! alternates LLM calls with tool calls until the model produces a final
//! answer, or a step/time budget runs out, or the turn is cancelled.
//!
//! Grounded on the teacher's `auto_execute_loop` control-flow skeleton
//! (seed → call model → run any tool calls → loop) but without the hook
//! system: this crate's tool set is fixed and small, so there is no
//! extension point to hook into. Tool-call dispatch goes straight through
//! `ToolRegistry::invoke` instead of a generic handler map.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::llm::LlmClient;
use crate::parser::parse_response;
use crate::prompt::{build_system_prompt, SystemPromptParams};
use crate::response_types::StructuredResponse;
use crate::tools::{ToolContext, ToolRegistry};
use crate::types::{ErrorDetail, Message, ResponseKind, WorkflowResponse, WorkflowState, WorkflowStatus};

/// One event emitted per significant step of the loop; consumed internally
/// and translated 1:1, in order, by the Stream Emitter (C7).
#[derive(Debug, Clone)]
pub enum ExecutorEvent {
    Start,
    Thought { tool_name: String, args: Value },
    ToolResult { name: String, ok: bool },
    Final { structured: Option<StructuredResponse>, text: String },
    Cancelled,
    Timeout,
    StepBudgetExhausted,
}

/// Everything the loop needs beyond the state it mutates in place.
pub struct ExecutorContext {
    pub llm: Arc<dyn LlmClient>,
    pub tool_ctx: ToolContext,
    pub object_limit: u32,
    pub field_limit: u32,
    pub query_limit: u32,
    pub task_timeout: Duration,
    pub prompt_preset: crate::config::PromptPreset,
    pub cancel: Arc<AtomicBool>,
}

fn content_hash(name: &str, args: &Value) -> String {
    // Canonicalize by sorted-key re-serialization so semantically identical
    // args with different key order hash the same.
    let canonical = canonicalize(args);
    format!("{name}:{}", serde_json::to_string(&canonical).unwrap_or_default())
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: std::collections::BTreeMap<String, Value> =
                map.iter().map(|(k, v)| (k.clone(), canonicalize(v))).collect();
            serde_json::to_value(sorted).unwrap_or(Value::Null)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Run the ReAct loop to completion, mutating `state` in place and
/// emitting one [`ExecutorEvent`] per significant step via `on_event`.
pub async fn run<F>(state: &mut WorkflowState, ctx: &ExecutorContext, mut on_event: F) -> crate::error::Result<()>
where
    F: FnMut(ExecutorEvent),
{
    on_event(ExecutorEvent::Start);
    let deadline = Instant::now() + ctx.task_timeout;

    state.meta.metadata.insert("prompt_preset".to_string(), Value::String(ctx.prompt_preset.as_str().to_string()));

    state.messages.push(Message::user(state.request.user_input.clone()));

    let mut last_ai_text = String::new();
    let mut seen: HashSet<String> = HashSet::new();

    loop {
        if ctx.cancel.load(Ordering::SeqCst) {
            state.meta.status = WorkflowStatus::Cancelled;
            on_event(ExecutorEvent::Cancelled);
            return Ok(());
        }
        if Instant::now() >= deadline {
            finish_on_budget(state, &last_ai_text, "task timeout exceeded");
            on_event(ExecutorEvent::Timeout);
            return Ok(());
        }
        if state.remaining_steps == 0 {
            finish_on_budget(state, &last_ai_text, "step budget exhausted");
            on_event(ExecutorEvent::StepBudgetExhausted);
            return Ok(());
        }

        let system_prompt = build_system_prompt(&SystemPromptParams {
            preset: ctx.prompt_preset,
            confidence_threshold: state.meta.confidence_threshold,
            connection_id: &state.meta.connection_id,
            object_limit: ctx.object_limit,
            field_limit: ctx.field_limit,
            query_limit: ctx.query_limit,
            conversation_summary: state.conversation_summary.as_ref(),
        });

        let mut call_messages = Vec::with_capacity(state.messages.len() + 1);
        call_messages.push(Message::system(system_prompt));
        call_messages.extend(state.messages.iter().cloned());

        let descriptors = ToolRegistry::descriptors();
        let reply = match ctx.llm.chat(&call_messages, &descriptors).await {
            Ok(reply) => reply,
            Err(e) => {
                finish_on_error(state, &e);
                return Ok(());
            }
        };

        let (content, tool_calls) = match &reply.message {
            Message::Ai { content, tool_calls } => (content.clone(), tool_calls.clone()),
            other => (format!("{other:?}"), Vec::new()),
        };
        last_ai_text = content.clone();
        state.messages.push(reply.message.clone());

        if tool_calls.is_empty() {
            let parsed = parse_response(&content);
            if let Some(mut structured) = parsed {
                structured = structured.with_canonical_confidence_label(state.meta.confidence_threshold);
                fold_client_results_into(&mut structured, &state.client_results);
                state.structured_response = Some(structured.clone());
                update_conversation_summary(state, &structured);
                on_event(ExecutorEvent::Final { structured: Some(structured), text: content.clone() });
            } else {
                on_event(ExecutorEvent::Final { structured: None, text: content.clone() });
            }
            state.response = Some(WorkflowResponse { kind: ResponseKind::Success, content, error: None });
            state.meta.status = WorkflowStatus::Completed;
            return Ok(());
        }

        for tool_call in &tool_calls {
            if ctx.cancel.load(Ordering::SeqCst) {
                state.meta.status = WorkflowStatus::Cancelled;
                on_event(ExecutorEvent::Cancelled);
                return Ok(());
            }

            let dedup_key = if tool_call.id.is_empty() {
                content_hash(&tool_call.name, &tool_call.args)
            } else {
                tool_call.id.clone()
            };
            if !seen.insert(dedup_key) {
                continue;
            }

            on_event(ExecutorEvent::Thought { tool_name: tool_call.name.clone(), args: tool_call.args.clone() });

            let result = ToolRegistry::invoke(&tool_call.name, &tool_call.args, &ctx.tool_ctx).await;

            if let Some(payload) = &result.client_payload {
                state.client_results.push(serde_json::json!({
                    "tool": tool_call.name,
                    "result": payload,
                }));
            } else if result.ok {
                state.client_results.push(serde_json::json!({
                    "tool": tool_call.name,
                    "result": result.value.clone().unwrap_or(Value::Null),
                }));
            }

            let lite_view = if result.ok {
                result.value.clone().unwrap_or(Value::Null)
            } else {
                serde_json::json!({ "ok": false, "error": result.error.clone(), "meta": result.meta.clone() })
            };
            state.messages.push(Message::tool(tool_call.id.clone(), tool_call.name.clone(), lite_view));

            on_event(ExecutorEvent::ToolResult { name: tool_call.name.clone(), ok: result.ok });
        }

        state.remaining_steps -= 1;
    }
}

fn finish_on_budget(state: &mut WorkflowState, last_text: &str, reason: &str) {
    state.meta.status = WorkflowStatus::Failed;
    state.response = Some(WorkflowResponse {
        kind: ResponseKind::Partial,
        content: last_text.to_string(),
        error: Some(ErrorDetail { reason: reason.to_string() }),
    });
}

fn finish_on_error(state: &mut WorkflowState, error: &crate::error::Error) {
    state.meta.status = WorkflowStatus::Failed;
    let reason = match error {
        crate::error::Error::Llm { kind, .. } => kind.user_message().to_string(),
        other => other.to_string(),
    };
    state.response = Some(WorkflowResponse {
        kind: ResponseKind::Error,
        content: String::new(),
        error: Some(ErrorDetail { reason }),
    });
}

/// Fold `state.client_results` back into `data_summary` for `data_query`
/// responses: the lite tool message the LLM saw had `records` stripped
/// (spec §4.5 tool redaction); the client-facing payload restores them.
fn fold_client_results_into(structured: &mut StructuredResponse, client_results: &[Value]) {
    if structured.response_type != crate::response_types::ResponseType::DataQuery {
        return;
    }
    let records = client_results
        .iter()
        .filter_map(|entry| entry.get("result").and_then(|r| r.get("records")))
        .flat_map(|r| r.as_array().cloned().unwrap_or_default())
        .collect::<Vec<_>>();
    if records.is_empty() {
        return;
    }
    if let Some(obj) = structured.data_summary.as_object_mut() {
        obj.remove("records_count");
        obj.insert("records".to_string(), Value::Array(records));
    }
}

/// Update `conversation_summary` from a freshly parsed structured response
/// so the next turn's prompt carries forward what objects/fields this turn
/// resolved, without replaying raw message history.
fn update_conversation_summary(state: &mut WorkflowState, structured: &StructuredResponse) {
    let summary = state.conversation_summary.get_or_insert_with(Default::default);

    if let Some(object_name) = structured.data_summary.get("object_name").and_then(|v| v.as_str()) {
        if !summary.object_resolution.api_names.iter().any(|n| n == object_name) {
            summary.object_resolution.api_names.push(object_name.to_string());
        }
    }

    if let Some(children) = structured.data_summary.get("child_relationships").and_then(|v| v.as_array()) {
        for child in children {
            if let Some(name) = child.get("child_object_name").and_then(|v| v.as_str()) {
                if !summary.object_resolution.child_relationships.iter().any(|n| n == name) {
                    summary.object_resolution.child_relationships.push(name.to_string());
                }
            }
        }
    }

    if let Some(lookups) = structured.data_summary.get("lookup_relationships").and_then(|v| v.as_array()) {
        for lookup in lookups {
            if let Some(targets) = lookup.get("reference_to_object_name").and_then(|v| v.as_array()) {
                for target in targets {
                    if let Some(name) = target.as_str() {
                        if !summary.object_resolution.lookup_relationships.iter().any(|n| n == name) {
                            summary.object_resolution.lookup_relationships.push(name.to_string());
                        }
                    }
                }
            }
        }
    }
}
