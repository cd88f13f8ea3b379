//! The LLM boundary: OpenAI-compatible wire types, SSE parsing, streaming
//! tool-call aggregation, and the `LlmClient` trait the executor drives.
//!
//! The wire format and the SSE/aggregation pipeline are carried over from
//! the source SDK's `utils.rs` almost unchanged — chunk-by-chunk
//! accumulation of text and tool-call deltas is provider plumbing, not
//! CRM-agent logic. What changes is the *output* shape: instead of
//! `ContentBlock`s, the aggregator now emits directly into this crate's
//! `Message::Ai{content, tool_calls}`.

use futures::stream::{Stream, StreamExt};
use std::collections::HashMap;
use std::pin::Pin;
use std::time::Duration;

use crate::error::{Error, LlmErrorKind, Result};
use crate::types::{Message, ToolCall};

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, serde::Serialize)]
pub struct OpenAiMessage {
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<OpenAiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct OpenAiToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: OpenAiFunction,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct OpenAiFunction {
    pub name: String,
    /// OpenAI API quirk: arguments travel as a JSON-encoded string, not a
    /// nested object.
    pub arguments: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct OpenAiRequest {
    pub model: String,
    pub messages: Vec<OpenAiMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct OpenAiChunk {
    #[allow(dead_code)]
    pub id: String,
    pub choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct OpenAiChoice {
    pub delta: OpenAiDelta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct OpenAiDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<OpenAiToolCallDelta>>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct OpenAiToolCallDelta {
    pub index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<OpenAiFunctionDelta>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct OpenAiFunctionDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

// ---------------------------------------------------------------------------
// Streaming tool-call aggregation
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct PartialToolCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// Accumulates streaming deltas into a single `Message::Ai`, emitted only
/// once a `finish_reason` is seen. Mirrors the source SDK's
/// `ToolCallAggregator` with the output type swapped.
pub struct ToolCallAggregator {
    text_buffer: String,
    tool_calls: HashMap<u32, PartialToolCall>,
}

impl ToolCallAggregator {
    pub fn new() -> Self {
        Self { text_buffer: String::new(), tool_calls: HashMap::new() }
    }

    /// Returns `Some(Message::Ai{..})` once a `finish_reason` is observed
    /// in this chunk, `None` while generation is still in progress.
    pub fn process_chunk(&mut self, chunk: OpenAiChunk) -> Result<Option<Message>> {
        for choice in chunk.choices {
            if let Some(content) = choice.delta.content {
                self.text_buffer.push_str(&content);
            }

            if let Some(tool_calls) = choice.delta.tool_calls {
                for delta in tool_calls {
                    let entry = self.tool_calls.entry(delta.index).or_default();
                    if let Some(id) = delta.id {
                        entry.id = Some(id);
                    }
                    if let Some(function) = delta.function {
                        if let Some(name) = function.name {
                            entry.name = Some(name);
                        }
                        if let Some(args) = function.arguments {
                            entry.arguments.push_str(&args);
                        }
                    }
                }
            }

            if choice.finish_reason.is_some() {
                let content = std::mem::take(&mut self.text_buffer);
                let mut tool_calls = Vec::new();
                for (_, partial) in self.tool_calls.drain() {
                    if let (Some(id), Some(name)) = (partial.id, partial.name) {
                        let args: serde_json::Value = if partial.arguments.is_empty() {
                            serde_json::json!({})
                        } else {
                            serde_json::from_str(&partial.arguments).map_err(|e| {
                                Error::stream(format!("failed to parse tool arguments: {e}"))
                            })?
                        };
                        tool_calls.push(ToolCall { id, name, args });
                    }
                }
                return Ok(Some(Message::Ai { content, tool_calls }));
            }
        }
        Ok(None)
    }
}

impl Default for ToolCallAggregator {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses a raw HTTP response body as a Server-Sent Events stream of
/// [`OpenAiChunk`]s. Lines not prefixed with `data: ` (heartbeats,
/// comments) are skipped; the `[DONE]` sentinel ends the stream without
/// producing an item.
pub fn parse_sse_stream(body: reqwest::Response) -> Pin<Box<dyn Stream<Item = Result<OpenAiChunk>> + Send>> {
    let stream = body.bytes_stream().filter_map(move |result| async move {
        let bytes = match result.map_err(Error::Http) {
            Ok(b) => b,
            Err(e) => return Some(Err(e)),
        };
        let text = String::from_utf8_lossy(&bytes);
        for line in text.lines() {
            if let Some(data) = line.strip_prefix("data: ") {
                if data == "[DONE]" {
                    continue;
                }
                let chunk: OpenAiChunk = match serde_json::from_str(data) {
                    Ok(c) => c,
                    Err(e) => return Some(Err(Error::stream(format!("failed to parse chunk: {e}")))),
                };
                return Some(Ok(chunk));
            }
        }
        None
    });
    Box::pin(stream)
}

// ---------------------------------------------------------------------------
// LlmClient boundary
// ---------------------------------------------------------------------------

/// One complete LLM turn's reply: the aggregated assistant message plus
/// the finish reason the provider reported (used to distinguish a normal
/// stop from a tool-call turn).
#[derive(Debug, Clone)]
pub struct LlmReply {
    pub message: Message,
}

/// What the executor asks an LLM binding to do: given the running message
/// history and the tool descriptors available this turn, produce the next
/// assistant message (text and/or tool calls).
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat(&self, messages: &[Message], tools: &[serde_json::Value]) -> Result<LlmReply>;
}

fn message_to_wire(message: &Message) -> OpenAiMessage {
    match message {
        Message::System { content } => OpenAiMessage {
            role: "system".to_string(),
            content: content.clone(),
            tool_calls: None,
            tool_call_id: None,
        },
        Message::User { content } => OpenAiMessage {
            role: "user".to_string(),
            content: content.clone(),
            tool_calls: None,
            tool_call_id: None,
        },
        Message::Ai { content, tool_calls } => OpenAiMessage {
            role: "assistant".to_string(),
            content: content.clone(),
            tool_calls: if tool_calls.is_empty() {
                None
            } else {
                Some(
                    tool_calls
                        .iter()
                        .map(|tc| OpenAiToolCall {
                            id: tc.id.clone(),
                            call_type: "function".to_string(),
                            function: OpenAiFunction {
                                name: tc.name.clone(),
                                arguments: tc.args.to_string(),
                            },
                        })
                        .collect(),
                )
            },
            tool_call_id: None,
        },
        Message::Tool { tool_call_id, name: _, result } => OpenAiMessage {
            role: "tool".to_string(),
            content: result.to_string(),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.clone()),
        },
    }
}

/// An `LlmClient` speaking the OpenAI chat-completions wire protocol over
/// HTTP, shared by the `openai`, `groq`, and (OpenAI-compatible) `ollama`
/// providers — only `base_url`/`api_key`/`model` differ between them.
pub struct OpenAiCompatibleClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
}

impl OpenAiCompatibleClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>, temperature: f64, max_tokens: u32, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build().map_err(Error::Http)?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: temperature as f32,
            max_tokens: Some(max_tokens),
        })
    }
}

#[async_trait::async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn chat(&self, messages: &[Message], tools: &[serde_json::Value]) -> Result<LlmReply> {
        let request = OpenAiRequest {
            model: self.model.clone(),
            messages: messages.iter().map(message_to_wire).collect(),
            stream: true,
            max_tokens: self.max_tokens,
            temperature: Some(self.temperature),
            tools: if tools.is_empty() { None } else { Some(tools.to_vec()) },
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(Error::Http)?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_else(|_| "unknown error".to_string());
            let kind = LlmErrorKind::classify(&body);
            return Err(Error::llm(kind, kind.user_message()));
        }

        let mut stream = parse_sse_stream(response);
        let mut aggregator = ToolCallAggregator::new();
        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result?;
            if let Some(message) = aggregator.process_chunk(chunk)? {
                return Ok(LlmReply { message });
            }
        }
        Ok(LlmReply { message: Message::ai_text("") })
    }
}

/// A scripted `LlmClient` for tests: each call to `chat` pops the next
/// reply off a fixed script, in order.
pub struct MockLlmClient {
    script: std::sync::Mutex<std::collections::VecDeque<Message>>,
}

impl MockLlmClient {
    pub fn new(script: Vec<Message>) -> Self {
        Self { script: std::sync::Mutex::new(script.into()) }
    }
}

#[async_trait::async_trait]
impl LlmClient for MockLlmClient {
    async fn chat(&self, _messages: &[Message], _tools: &[serde_json::Value]) -> Result<LlmReply> {
        let message = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Error::internal("mock LLM script exhausted"))?;
        Ok(LlmReply { message })
    }
}
