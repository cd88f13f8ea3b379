//! Core data model: the turn container (`WorkflowState`), the message
//! vocabulary exchanged with the LLM, the structured prior-turn memory
//! (`ConversationSummary`), and the durable cache entry shapes consumed by
//! the tool registry.
//!
//! Every type here is plain data — construction helpers exist, but no type
//! in this module talks to the network, the cache, or a checkpoint store.
//! That keeps `WorkflowState` itself trivially `Serialize`/`Deserialize` and
//! cheap to clone at turn boundaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status of a turn's execution, mirrored into the persisted checkpoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Turn-invariant bookkeeping: identity, budget seeds, and status.
///
/// `conversation_id` doubles as the checkpoint key and the stream thread id
/// (they are the same string by construction, never two fields kept in
/// sync by hand).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meta {
    pub workflow_id: String,
    pub version: String,
    pub conversation_id: String,
    pub started_at: DateTime<Utc>,
    pub current_node: String,
    pub status: WorkflowStatus,
    pub locale: String,
    pub connection_id: String,
    pub confidence_threshold: f64,
    /// Free-form bag for cross-cutting annotations, e.g. `prompt_preset`.
    pub metadata: serde_json::Map<String, Value>,
}

impl Meta {
    pub fn new(conversation_id: impl Into<String>, connection_id: impl Into<String>, confidence_threshold: f64) -> Self {
        let conversation_id = conversation_id.into();
        Self {
            workflow_id: format!("wf_{}", uuid::Uuid::new_v4()),
            version: "1.0.0".to_string(),
            conversation_id,
            started_at: Utc::now(),
            current_node: "start".to_string(),
            status: WorkflowStatus::Running,
            locale: "en".to_string(),
            connection_id: connection_id.into(),
            confidence_threshold,
            metadata: serde_json::Map::new(),
        }
    }
}

/// The user's input for this turn. Kept as its own struct (rather than a
/// bare `String` field on `WorkflowState`) so future per-turn request
/// metadata (attachments, explicit object hints) has a home without
/// reshaping `WorkflowState`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub user_input: String,
}

/// Tagged union of message kinds exchanged with the LLM during a turn.
///
/// `messages` on `WorkflowState` is a `Vec<Message>`; unlike the cache and
/// checkpoint, this list is scoped to a single turn and is never persisted
/// (history lives exclusively in `ConversationSummary`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    System { content: String },
    User { content: String },
    Ai {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        tool_call_id: String,
        name: String,
        result: Value,
    },
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Message::System { content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Message::User { content: content.into() }
    }

    pub fn ai_text(content: impl Into<String>) -> Self {
        Message::Ai { content: content.into(), tool_calls: Vec::new() }
    }

    pub fn ai_with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Message::Ai { content: content.into(), tool_calls }
    }

    pub fn tool(tool_call_id: impl Into<String>, name: impl Into<String>, result: Value) -> Self {
        Message::Tool { tool_call_id: tool_call_id.into(), name: name.into(), result }
    }

    /// Approximate token cost, used by the executor's budget guard. Same
    /// character-based heuristic as the rest of this crate's token
    /// estimation (see `context::estimate_tokens`): roughly 4 characters
    /// per token, plus a small per-message role overhead.
    pub fn approx_tokens(&self) -> usize {
        let chars = match self {
            Message::System { content } | Message::User { content } => content.len(),
            Message::Ai { content, tool_calls } => {
                content.len()
                    + tool_calls
                        .iter()
                        .map(|c| c.name.len() + c.args.to_string().len())
                        .sum::<usize>()
            }
            Message::Tool { result, name, .. } => name.len() + result.to_string().len(),
        };
        (chars + 8 + 3) / 4
    }
}

/// One tool call proposed by the model inside an `ai` message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub args: Value,
}

/// Structured, compact record of what earlier turns established — the only
/// carrier of inter-turn memory (see `WorkflowState::conversation_summary`
/// invariant (a) in the executor's control loop).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub object_resolution: ObjectResolution,
    pub field_discoveries: Vec<FieldDiscovery>,
    pub technical_context: TechnicalContext,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectResolution {
    pub api_names: Vec<String>,
    pub label_mappings: std::collections::BTreeMap<String, String>,
    pub child_relationships: Vec<String>,
    pub lookup_relationships: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDiscovery {
    pub object: String,
    pub field: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub required: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TechnicalContext {
    pub successful_queries: Vec<String>,
}

/// The terminal disposition of a turn, as recorded on `WorkflowState.response`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    Success,
    Error,
    Clarification,
    Partial,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResponse {
    #[serde(rename = "type")]
    pub kind: ResponseKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub reason: String,
}

/// The result of one tool invocation. Never raised as an exception to the
/// ReAct loop — always reified into a tool `Message`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub meta: serde_json::Map<String, Value>,
    /// Full, un-redacted payload for `state.client_results`. `None` for every
    /// tool except `execute_soql_query`, where `value` carries the lite view
    /// (records stripped) fed back to the LLM and this field carries the full
    /// records so the client can still see them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_payload: Option<Value>,
}

impl ToolResult {
    pub fn ok(value: Value) -> Self {
        Self { ok: true, value: Some(value), error: None, meta: serde_json::Map::new(), client_payload: None }
    }

    pub fn ok_with_client_payload(value: Value, client_payload: Value) -> Self {
        Self { ok: true, value: Some(value), error: None, meta: serde_json::Map::new(), client_payload: Some(client_payload) }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self { ok: false, value: None, error: Some(error.into()), meta: serde_json::Map::new(), client_payload: None }
    }

    pub fn err_with_meta(error: impl Into<String>, source: &str) -> Self {
        let mut meta = serde_json::Map::new();
        meta.insert("source".to_string(), Value::String(source.to_string()));
        Self { ok: false, value: None, error: Some(error.into()), meta, client_payload: None }
    }

    /// The "lite" view fed back to the LLM as the tool message body. For
    /// most tools this is `value` unchanged; `execute_soql_query` overrides
    /// this by constructing its own redacted value up front (see
    /// `tools::query`), so this helper just reifies whatever value the tool
    /// already decided to hand back.
    pub fn as_tool_message_value(&self) -> Value {
        if self.ok {
            self.value.clone().unwrap_or(Value::Null)
        } else {
            serde_json::json!({ "ok": false, "error": self.error, "meta": self.meta })
        }
    }
}

/// The canonical turn container: created fresh or revived from a
/// checkpoint at the start of every `Invoke`/`InvokeStream`, mutated only
/// by the Orchestrator and the ReAct Executor it runs, and persisted at
/// turn end with `messages` cleared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    pub meta: Meta,
    pub request: Request,
    #[serde(default)]
    pub messages: Vec<Message>,
    pub remaining_steps: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_summary: Option<ConversationSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<WorkflowResponse>,
    /// Untruncated tool results retained for the client this turn; never
    /// sent back to the LLM. Append-only within a turn.
    #[serde(default)]
    pub client_results: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_response: Option<crate::response_types::StructuredResponse>,
}

impl WorkflowState {
    pub fn fresh(
        conversation_id: impl Into<String>,
        connection_id: impl Into<String>,
        user_input: impl Into<String>,
        confidence_threshold: f64,
        max_steps: u32,
    ) -> Self {
        Self {
            meta: Meta::new(conversation_id, connection_id, confidence_threshold),
            request: Request { user_input: user_input.into() },
            messages: Vec::new(),
            remaining_steps: max_steps,
            conversation_summary: None,
            response: None,
            client_results: Vec::new(),
            structured_response: None,
        }
    }

    /// Seed a new turn from a revived checkpoint: keep `meta`/
    /// `conversation_summary`, reset everything that is scoped to a turn.
    pub fn seed_next_turn(mut self, user_input: impl Into<String>, max_steps: u32) -> Self {
        self.request.user_input = user_input.into();
        self.messages.clear();
        self.client_results.clear();
        self.remaining_steps = max_steps;
        self.structured_response = None;
        self.response = None;
        self.meta.status = WorkflowStatus::Running;
        self
    }

    /// The copy that the Checkpointer persists: `messages` and
    /// `client_results` cleared, both turn-scoped and rebuilt by
    /// `seed_next_turn` on the next call (spec.md C5 invariant (b)).
    pub fn for_checkpoint(&self) -> Self {
        let mut copy = self.clone();
        copy.messages.clear();
        copy.client_results.clear();
        copy
    }
}

// ---------------------------------------------------------------------------
// Metadata cache entry shapes (durable, see cache.rs)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SObjectSummary {
    pub name: String,
    pub label: String,
    #[serde(rename = "labelPlural")]
    pub label_plural: String,
    #[serde(rename = "keyPrefix")]
    pub key_prefix: Option<String>,
    pub custom: bool,
    pub createable: bool,
    pub deletable: bool,
    pub updateable: bool,
    pub queryable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SObjectListCacheEntry {
    pub connection_id: String,
    pub org_id: String,
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub api_version: String,
    pub total_count: usize,
    pub sobjects: Vec<SObjectSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub nillable: bool,
    pub unique: bool,
    pub createable: bool,
    pub updateable: bool,
    #[serde(default)]
    pub calculated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<u32>,
    #[serde(rename = "referenceTo", default, skip_serializing_if = "Vec::is_empty")]
    pub reference_to: Vec<String>,
    #[serde(rename = "relationshipName", default, skip_serializing_if = "Option::is_none")]
    pub relationship_name: Option<String>,
    #[serde(rename = "picklistValues", default, skip_serializing_if = "Vec::is_empty")]
    pub picklist_values: Vec<PicklistValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PicklistValue {
    pub value: String,
    pub label: String,
    #[serde(rename = "validFor", default, skip_serializing_if = "Option::is_none")]
    pub valid_for: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildRelationshipDescriptor {
    #[serde(rename = "relationshipName")]
    pub relationship_name: Option<String>,
    #[serde(rename = "childSObject")]
    pub child_sobject: String,
    pub field: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SObjectMetadata {
    pub name: String,
    pub label: String,
    pub custom: bool,
    pub createable: bool,
    pub deletable: bool,
    pub updateable: bool,
    pub queryable: bool,
    pub fields: Vec<FieldDescriptor>,
    #[serde(rename = "childRelationships", default)]
    pub child_relationships: Vec<ChildRelationshipDescriptor>,
}

impl SObjectMetadata {
    /// Shallow copy with `child_relationships` stripped, used when a caller
    /// asked `include_child_rels = false` (C2 `GetObjectMetadata`).
    pub fn without_child_relationships(&self) -> Self {
        let mut copy = self.clone();
        copy.child_relationships.clear();
        copy
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SObjectMetadataCacheEntry {
    pub cache_key: String,
    pub connection_id: String,
    pub org_id: String,
    pub sobject_name: String,
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub field_count: usize,
    pub has_picklist_values: bool,
    pub has_calculated_fields: bool,
    pub metadata: SObjectMetadata,
}

impl SObjectMetadataCacheEntry {
    pub fn cache_key(connection_id: &str, sobject_name: &str) -> String {
        format!("{connection_id}|{sobject_name}")
    }

    pub fn new(connection_id: impl Into<String>, org_id: impl Into<String>, metadata: SObjectMetadata, ttl: chrono::Duration) -> Self {
        let connection_id = connection_id.into();
        let sobject_name = metadata.name.clone();
        let cache_key = Self::cache_key(&connection_id, &sobject_name);
        let has_picklist_values = metadata.fields.iter().any(|f| !f.picklist_values.is_empty());
        let has_calculated_fields = metadata.fields.iter().any(|f| f.calculated);
        let field_count = metadata.fields.len();
        let cached_at = Utc::now();
        Self {
            cache_key,
            connection_id,
            org_id: org_id.into(),
            sobject_name,
            cached_at,
            expires_at: cached_at + ttl,
            field_count,
            has_picklist_values,
            has_calculated_fields,
            metadata,
        }
    }
}
