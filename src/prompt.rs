//! System prompt builder: "string-typed prompts with interpolated config"
//! (spec §9) turned into a typed, pure, deterministic function instead of
//! ad hoc string concatenation scattered through the call sites.
//!
//! Two presets are carried forward from the source material — `verbose`
//! and `optimized` — selected once per turn via [`AgentConfig::prompt_preset`]
//! and recorded into `meta.metadata.prompt_preset`. A turn never mixes
//! rules from both.

use crate::config::PromptPreset;
use crate::types::ConversationSummary;

/// Everything [`build_system_prompt`] needs, gathered so the function
/// itself stays a pure `&SystemPromptParams -> String` mapping.
#[derive(Debug, Clone)]
pub struct SystemPromptParams<'a> {
    pub preset: PromptPreset,
    pub confidence_threshold: f64,
    pub connection_id: &'a str,
    pub object_limit: u32,
    pub field_limit: u32,
    pub query_limit: u32,
    pub conversation_summary: Option<&'a ConversationSummary>,
}

pub fn build_system_prompt(params: &SystemPromptParams<'_>) -> String {
    match params.preset {
        PromptPreset::Verbose => build_verbose(params),
        PromptPreset::Optimized => build_optimized(params),
    }
}

fn common_rules(params: &SystemPromptParams<'_>) -> String {
    format!(
        "Rules:\n\
         1. Classify the user's intent into exactly one response_type: metadata_query, data_query, relationship_query, field_details_query, or clarification_needed.\n\
         2. Always resolve object names with search_for_sobjects before calling get_sobject_metadata, get_sobject_relationships, get_field_details, or execute_soql_query.\n\
         3. Never invent a field or object name that has not come back from a tool call.\n\
         4. Every SOQL query you write must include a LIMIT clause, default {query_limit}, never above 10.\n\
         5. Call search_for_sobjects once per set of unknown terms, not once per term.\n\
         6. Your final reply must be a single, complete JSON object matching the StructuredResponse schema — no prose before or after it.",
        query_limit = params.query_limit,
    )
}

fn summary_section(summary: Option<&ConversationSummary>) -> String {
    match summary {
        None => "No prior conversation summary.".to_string(),
        Some(s) => format!(
            "Prior conversation summary:\n\
             - resolved objects: {:?}\n\
             - label mappings: {:?}\n\
             - known child relationships: {:?}\n\
             - field discoveries: {}",
            s.object_resolution.api_names,
            s.object_resolution.label_mappings,
            s.object_resolution.child_relationships,
            s.field_discoveries.len(),
        ),
    }
}

fn build_verbose(params: &SystemPromptParams<'_>) -> String {
    format!(
        "You are a CRM data assistant connected to connection `{connection_id}`.\n\n\
         You help users explore and query Salesforce-style CRM data through a fixed set of five tools: \
         search_for_sobjects, get_sobject_metadata, get_sobject_relationships, get_field_details, and execute_soql_query. \
         You do not have direct database access outside of these tools, and you must never fabricate data.\n\n\
         Your confidence threshold for this turn is {confidence_threshold}. Report confidence as a number between 0 and 1 \
         reflecting how certain you are that you understood the user's intent and resolved the correct objects/fields; \
         the caller derives a confidence_label from this number and the threshold, so just report the number honestly.\n\n\
         Operating limits for this turn: at most {object_limit} objects per metadata/relationship call, at most \
         {field_limit} fields returned per object, and SOQL row limits capped at {query_limit}.\n\n\
         {summary}\n\n\
         {rules}",
        connection_id = params.connection_id,
        confidence_threshold = params.confidence_threshold,
        object_limit = params.object_limit,
        field_limit = params.field_limit,
        query_limit = params.query_limit,
        summary = summary_section(params.conversation_summary),
        rules = common_rules(params),
    )
}

fn build_optimized(params: &SystemPromptParams<'_>) -> String {
    format!(
        "CRM agent for connection `{connection_id}`. threshold={confidence_threshold} object_limit={object_limit} \
         field_limit={field_limit} query_limit={query_limit}\n\
         {summary}\n\
         {rules}",
        connection_id = params.connection_id,
        confidence_threshold = params.confidence_threshold,
        object_limit = params.object_limit,
        field_limit = params.field_limit,
        query_limit = params.query_limit,
        summary = summary_section(params.conversation_summary),
        rules = common_rules(params),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(preset: PromptPreset) -> SystemPromptParams<'static> {
        SystemPromptParams {
            preset,
            confidence_threshold: 0.8,
            connection_id: "conn_1",
            object_limit: 200,
            field_limit: 50,
            query_limit: 5,
            conversation_summary: None,
        }
    }

    #[test]
    fn verbose_and_optimized_presets_both_mention_the_five_tools_rules() {
        for preset in [PromptPreset::Verbose, PromptPreset::Optimized] {
            let prompt = build_system_prompt(&params(preset));
            assert!(prompt.contains("search_for_sobjects"));
            assert!(prompt.contains("LIMIT"));
            assert!(prompt.contains("conn_1"));
        }
    }

    #[test]
    fn presets_produce_different_text() {
        let verbose = build_system_prompt(&params(PromptPreset::Verbose));
        let optimized = build_system_prompt(&params(PromptPreset::Optimized));
        assert_ne!(verbose, optimized);
        assert!(verbose.len() > optimized.len());
    }

    #[test]
    fn build_is_deterministic_for_identical_input() {
        let a = build_system_prompt(&params(PromptPreset::Optimized));
        let b = build_system_prompt(&params(PromptPreset::Optimized));
        assert_eq!(a, b);
    }

    #[test]
    fn conversation_summary_is_interpolated_when_present() {
        let mut p = params(PromptPreset::Optimized);
        let summary = ConversationSummary::default();
        p.conversation_summary = Some(&summary);
        let prompt = build_system_prompt(&p);
        assert!(prompt.contains("resolved objects"));
    }
}
