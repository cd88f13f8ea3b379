//! Stream Emitter (C7): translates [`ExecutorEvent`]s into the wire-facing
//! [`StreamEvent`] vocabulary over a bounded channel.
//!
//! The bounded `tokio::sync::mpsc` channel is the direct analogue of the
//! teacher's `ContentStream` (`Pin<Box<dyn Stream<Item = Result<ContentBlock>> + Send>>`):
//! a full channel backpressures the executor's `send().await` instead of
//! dropping events, satisfying spec §9's "bounded queue, dropping not
//! permitted" design note. Only one mode is ever consumed — `values`-style,
//! one event per executor step — per spec §9's Open Question fix; there is
//! no dual-mode tuple-unpacking anywhere in this crate.

use futures::Stream;
use serde_json::{json, Value};

use crate::executor::ExecutorEvent;
use crate::response_types::StructuredResponse;

#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// `stream_update` carrying a thinking/structured/text payload.
    Update(Value),
    /// Raw chunk passthrough for anything else the executor emits.
    Content(String),
    /// Executor error surfaced mid-stream.
    Error { content: String, error_type: String },
    /// Classified external (LLM provider) error, human-friendly template.
    ErrorMessage(String),
    /// Always the last event absent an `Error`.
    Complete { thread_id: String, conversation_id: String, chunks_processed: usize },
}

/// Per-stream state the emitter carries across `translate` calls: the
/// running chunk counter for `stream_complete`, and the ids it stamps on
/// the terminal event.
pub struct StreamEmitter {
    thread_id: String,
    conversation_id: String,
    chunks_processed: usize,
}

impl StreamEmitter {
    pub fn new(thread_id: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self { thread_id: thread_id.into(), conversation_id: conversation_id.into(), chunks_processed: 0 }
    }

    /// Translate one executor event into zero or more stream events, in
    /// order. Most executor events map to exactly one; `Final`/`Timeout`/
    /// `StepBudgetExhausted`/`Cancelled` additionally emit the terminal
    /// `Complete` event, since each of those ends the loop.
    pub fn translate(&mut self, event: ExecutorEvent) -> Vec<StreamEvent> {
        self.chunks_processed += 1;
        match event {
            ExecutorEvent::Start => Vec::new(),
            ExecutorEvent::Thought { tool_name, args } => vec![StreamEvent::Update(json!({
                "response_type": "thinking",
                "confidence": 0.9,
                "confidence_label": "high",
                "intent_understood": format!("calling {tool_name}"),
                "actions_taken": [tool_name.clone()],
                "data_summary": {},
                "suggestions": [],
                "metadata": {"tool_name": tool_name, "tool_args": args},
            }))],
            ExecutorEvent::ToolResult { .. } => Vec::new(),
            ExecutorEvent::Final { structured, text } => {
                let update = match structured {
                    Some(s) => StreamEvent::Update(structured_to_value(&s)),
                    None if looks_like_internal_tool_chatter(&text) => return vec![self.complete()],
                    None => StreamEvent::Update(json!({ "response_type": "text", "content": text })),
                };
                vec![update, self.complete()]
            }
            ExecutorEvent::Cancelled => vec![self.complete()],
            ExecutorEvent::Timeout => {
                vec![StreamEvent::Error { content: "turn exceeded its time budget".to_string(), error_type: "timeout".to_string() }, self.complete()]
            }
            ExecutorEvent::StepBudgetExhausted => {
                vec![
                    StreamEvent::Error { content: "turn exceeded its step budget".to_string(), error_type: "step_budget".to_string() },
                    self.complete(),
                ]
            }
        }
    }

    fn complete(&self) -> StreamEvent {
        StreamEvent::Complete {
            thread_id: self.thread_id.clone(),
            conversation_id: self.conversation_id.clone(),
            chunks_processed: self.chunks_processed,
        }
    }
}

fn structured_to_value(structured: &StructuredResponse) -> Value {
    serde_json::to_value(structured).unwrap_or(Value::Null)
}

/// A JSON object without `response_type`/`confidence` looks like raw tool
/// output rather than a model reply meant for the client; the emitter
/// suppresses it rather than forwarding internal chatter.
fn looks_like_internal_tool_chatter(text: &str) -> bool {
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(Value::Object(obj)) => !obj.contains_key("response_type") && !obj.contains_key("confidence"),
        _ => false,
    }
}

/// Drive the executor loop, pushing translated events into a bounded
/// channel. Returns the channel's receiving end as a `Stream`.
///
/// Built with `futures::stream::unfold` over a small queue so each `poll`
/// either drains an already-translated event or awaits the next executor
/// event and translates it into zero or more outputs — no `async-stream`
/// dependency needed for what is otherwise a one-in-many-out adapter.
pub fn spawn_stream(
    capacity: usize,
    thread_id: impl Into<String>,
    conversation_id: impl Into<String>,
) -> (tokio::sync::mpsc::Sender<ExecutorEvent>, impl Stream<Item = StreamEvent>) {
    let (tx, rx) = tokio::sync::mpsc::channel::<ExecutorEvent>(capacity);
    let emitter = StreamEmitter::new(thread_id, conversation_id);
    let state = (rx, emitter, std::collections::VecDeque::<StreamEvent>::new());

    let stream = futures::stream::unfold(state, |(mut rx, mut emitter, mut pending)| async move {
        loop {
            if let Some(event) = pending.pop_front() {
                return Some((event, (rx, emitter, pending)));
            }
            match rx.recv().await {
                Some(executor_event) => pending.extend(emitter.translate(executor_event)),
                None => return None,
            }
        }
    });
    (tx, stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response_types::ResponseType;

    fn minimal_structured() -> StructuredResponse {
        StructuredResponse {
            response_type: ResponseType::DataQuery,
            confidence: Some(0.9),
            confidence_label: crate::response_types::ConfidenceLabel::High,
            intent_understood: "list accounts".to_string(),
            actions_taken: vec![],
            data_summary: json!({}),
            suggestions: vec![],
            metadata: serde_json::Map::new(),
            candidate_objects: None,
            clarification: None,
            error: None,
        }
    }

    #[test]
    fn thought_event_becomes_thinking_update() {
        let mut emitter = StreamEmitter::new("thread_1", "conv_1");
        let events = emitter.translate(ExecutorEvent::Thought { tool_name: "search_for_sobjects".to_string(), args: json!({}) });
        assert_eq!(events.len(), 1);
        match &events[0] {
            StreamEvent::Update(v) => assert_eq!(v["response_type"], "thinking"),
            _ => panic!("expected Update"),
        }
    }

    #[test]
    fn final_with_structured_response_emits_update_then_complete() {
        let mut emitter = StreamEmitter::new("thread_1", "conv_1");
        let events = emitter.translate(ExecutorEvent::Final { structured: Some(minimal_structured()), text: "ignored".to_string() });
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], StreamEvent::Update(_)));
        assert!(matches!(events[1], StreamEvent::Complete { .. }));
    }

    #[test]
    fn complete_is_always_last_absent_an_error() {
        let mut emitter = StreamEmitter::new("thread_1", "conv_1");
        let events = emitter.translate(ExecutorEvent::Final { structured: None, text: "plain text answer".to_string() });
        assert!(matches!(events.last().unwrap(), StreamEvent::Complete { .. }));
    }

    #[test]
    fn bare_tool_result_json_is_suppressed_as_internal_chatter() {
        let mut emitter = StreamEmitter::new("thread_1", "conv_1");
        let events = emitter.translate(ExecutorEvent::Final { structured: None, text: r#"{"ok":true,"value":{"foo":1}}"#.to_string() });
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], StreamEvent::Complete { .. }));
    }

    #[test]
    fn timeout_emits_error_then_complete() {
        let mut emitter = StreamEmitter::new("thread_1", "conv_1");
        let events = emitter.translate(ExecutorEvent::Timeout);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], StreamEvent::Error { .. }));
    }

    #[tokio::test]
    async fn spawn_stream_drains_in_executor_order() {
        use futures::StreamExt;

        let (tx, stream) = spawn_stream(8, "thread_1", "conv_1");
        tx.send(ExecutorEvent::Start).await.unwrap();
        tx.send(ExecutorEvent::Thought { tool_name: "search_for_sobjects".to_string(), args: json!({}) }).await.unwrap();
        tx.send(ExecutorEvent::Final { structured: None, text: "done".to_string() }).await.unwrap();
        drop(tx);

        let events: Vec<StreamEvent> = stream.collect().await;
        assert!(matches!(events[0], StreamEvent::Update(_)));
        assert!(matches!(events.last().unwrap(), StreamEvent::Complete { .. }));
    }
}
