//! The Structured Response contract: the discriminated union the LLM must
//! produce as its final message, and the one function that maps a raw
//! confidence number to a label.
//!
//! The source this crate is modeled on computed `confidence_label` twice —
//! once while building the system prompt's example, once in the final
//! payload assembly — and the two could drift. Centralizing the mapping in
//! [`confidence_label`] is the fix; every caller (prompt builder, executor,
//! stream emitter) goes through this one function.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    MetadataQuery,
    DataQuery,
    RelationshipQuery,
    FieldDetailsQuery,
    ClarificationNeeded,
}

impl ResponseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseType::MetadataQuery => "metadata_query",
            ResponseType::DataQuery => "data_query",
            ResponseType::RelationshipQuery => "relationship_query",
            ResponseType::FieldDetailsQuery => "field_details_query",
            ResponseType::ClarificationNeeded => "clarification_needed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "metadata_query" => ResponseType::MetadataQuery,
            "data_query" => ResponseType::DataQuery,
            "relationship_query" => ResponseType::RelationshipQuery,
            "field_details_query" => ResponseType::FieldDetailsQuery,
            "clarification_needed" => ResponseType::ClarificationNeeded,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLabel {
    High,
    Medium,
    Low,
    Unknown,
}

/// Canonical `confidence` → `confidence_label` mapping (spec.md §9, second
/// Open Question). `threshold` comes from `Meta::confidence_threshold`.
pub fn confidence_label(confidence: Option<f64>, threshold: f64) -> ConfidenceLabel {
    match confidence {
        None => ConfidenceLabel::Unknown,
        Some(c) if c >= threshold => ConfidenceLabel::High,
        Some(c) if c >= threshold - 0.2 => ConfidenceLabel::Medium,
        Some(_) => ConfidenceLabel::Low,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClarificationDetail {
    #[serde(rename = "type")]
    pub kind: String,
    pub question: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detected_object: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// The final answer contract the LLM must produce, as validated by the
/// Response Parser (C4). `data_summary` is kept as a free-form `Value`
/// because its shape is determined by `response_type` (spec.md §6's
/// payload-shapes table) rather than by a single Rust type — tools and the
/// executor build/read it by convention, keyed on `response_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredResponse {
    pub response_type: ResponseType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub confidence_label: ConfidenceLabel,
    pub intent_understood: String,
    #[serde(default)]
    pub actions_taken: Vec<String>,
    #[serde(default)]
    pub data_summary: Value,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate_objects: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clarification: Option<ClarificationDetail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StructuredResponse {
    /// Recompute and overwrite `confidence_label` from `confidence` and the
    /// turn's threshold — called once, right after parsing, so stored
    /// responses never carry a label the model invented itself.
    pub fn with_canonical_confidence_label(mut self, threshold: f64) -> Self {
        self.confidence_label = confidence_label(self.confidence, threshold);
        self
    }
}
