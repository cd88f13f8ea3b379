//! End-to-end seed scenarios exercising the `Orchestrator` the way a real
//! caller would: natural-language input in, a `StructuredResponse` out,
//! with a scripted LLM standing in for the model and a scripted CRM
//! standing in for the org connection.

use std::sync::Arc;
use std::time::Duration;

use crm_agent_core::cache::MetadataCache;
use crm_agent_core::checkpoint::InMemoryCheckpointer;
use crm_agent_core::config::AgentConfig;
use crm_agent_core::crm::MockCrmClient;
use crm_agent_core::crm::QueryResult;
use crm_agent_core::llm::MockLlmClient;
use crm_agent_core::response_types::ResponseType;
use crm_agent_core::types::{
    ChildRelationshipDescriptor, FieldDescriptor, Message, SObjectMetadata, SObjectSummary, ToolCall,
};
use crm_agent_core::Orchestrator;
use serde_json::json;

fn sobject(name: &str, label: &str) -> SObjectSummary {
    SObjectSummary {
        name: name.to_string(),
        label: label.to_string(),
        label_plural: format!("{label}s"),
        key_prefix: None,
        custom: false,
        createable: true,
        deletable: true,
        updateable: true,
        queryable: true,
    }
}

fn plain_field(name: &str, field_type: &str) -> FieldDescriptor {
    FieldDescriptor {
        name: name.to_string(),
        label: name.to_string(),
        field_type: field_type.to_string(),
        nillable: true,
        unique: false,
        createable: true,
        updateable: true,
        calculated: false,
        formula: None,
        length: None,
        precision: None,
        scale: None,
        reference_to: vec![],
        relationship_name: None,
        picklist_values: vec![],
    }
}

fn metadata(name: &str, fields: Vec<FieldDescriptor>, child_relationships: Vec<ChildRelationshipDescriptor>) -> SObjectMetadata {
    SObjectMetadata {
        name: name.to_string(),
        label: name.to_string(),
        custom: false,
        createable: true,
        deletable: true,
        updateable: true,
        queryable: true,
        fields,
        child_relationships,
    }
}

fn orchestrator(crm: MockCrmClient, script: Vec<Message>) -> Orchestrator {
    Orchestrator::builder()
        .crm(Arc::new(crm))
        .llm(Arc::new(MockLlmClient::new(script)))
        .cache(Arc::new(MetadataCache::new(Duration::from_secs(3600), Duration::from_secs(3600))))
        .checkpointer(Arc::new(InMemoryCheckpointer::new()))
        .config(AgentConfig { ai_react_max_steps: 10, ..AgentConfig::default() })
        .build()
        .unwrap()
}

fn tool_call(name: &str, args: serde_json::Value) -> ToolCall {
    ToolCall { id: format!("call_{name}"), name: name.to_string(), args }
}

/// Scenario 1 (spec §8): "Show me account fields".
#[tokio::test]
async fn metadata_scenario_resolves_object_then_returns_its_fields() {
    let crm = MockCrmClient::new().with_sobject(
        sobject("Account", "Account"),
        metadata("Account", vec![plain_field("Name", "string"), plain_field("Industry", "picklist")], vec![]),
    );

    let final_json = json!({
        "response_type": "metadata_query",
        "confidence": 0.95,
        "confidence_label": "high",
        "intent_understood": "list Account fields",
        "actions_taken": ["search_for_sobjects", "get_sobject_metadata"],
        "data_summary": {"object_name": "Account", "fields": [{"name": "Name"}, {"name": "Industry"}]},
        "suggestions": [],
    })
    .to_string();

    let script = vec![
        Message::ai_with_tool_calls("", vec![tool_call("search_for_sobjects", json!({"search_terms": ["account", "accounts"]}))]),
        Message::ai_with_tool_calls("", vec![tool_call("get_sobject_metadata", json!({"object_names": ["Account"]}))]),
        Message::ai_text(final_json),
    ];

    let outcome = orchestrator(crm, script).invoke("Show me account fields", "conn_1", None, true).await.unwrap();

    let structured = outcome.structured_response.unwrap();
    assert_eq!(structured.response_type, ResponseType::MetadataQuery);
    assert_eq!(structured.data_summary["object_name"], "Account");
    let fields = structured.data_summary["fields"].as_array().unwrap();
    assert!(!fields.is_empty());
    for field in fields {
        assert!(field.get("name").is_some());
    }
}

/// Scenario 2 (spec §8): "Show opportunities closing this month".
#[tokio::test]
async fn data_scenario_folds_client_results_back_into_data_summary() {
    let soql = "SELECT Id, Name, CloseDate FROM Opportunity WHERE CloseDate = THIS_MONTH LIMIT 5";
    let crm = MockCrmClient::new()
        .with_sobject(sobject("Opportunity", "Opportunity"), metadata("Opportunity", vec![plain_field("Name", "string")], vec![]))
        .with_query_result(
            soql,
            QueryResult {
                total_size: 2,
                done: true,
                next_records_url: None,
                records: vec![json!({"Id": "006A", "Name": "Big Deal"}), json!({"Id": "006B", "Name": "Renewal"})],
            },
        );

    let final_json = json!({
        "response_type": "data_query",
        "confidence": 0.9,
        "confidence_label": "high",
        "intent_understood": "opportunities closing this month",
        "actions_taken": ["search_for_sobjects", "get_sobject_metadata", "execute_soql_query"],
        "data_summary": {"query_executed": soql, "records_count": 2},
        "suggestions": [],
    })
    .to_string();

    let script = vec![
        Message::ai_with_tool_calls("", vec![tool_call("search_for_sobjects", json!({"search_terms": ["opportunity", "opportunities"]}))]),
        Message::ai_with_tool_calls("", vec![tool_call("get_sobject_metadata", json!({"object_names": ["Opportunity"]}))]),
        Message::ai_with_tool_calls("", vec![tool_call("execute_soql_query", json!({"query": soql}))]),
        Message::ai_text(final_json),
    ];

    let outcome = orchestrator(crm, script).invoke("Show opportunities closing this month", "conn_1", None, true).await.unwrap();

    let structured = outcome.structured_response.unwrap();
    assert_eq!(structured.response_type, ResponseType::DataQuery);
    assert_eq!(structured.data_summary["query_executed"], soql);
    let records = structured.data_summary["records"].as_array().expect("records folded in from client_results");
    assert_eq!(records.len(), 2);
    assert!(structured.data_summary.get("records_count").is_none());
}

/// Scenario 3 (spec §8): "How are accounts and contacts related?".
#[tokio::test]
async fn relationship_scenario_reports_the_contact_child_relationship() {
    let crm = MockCrmClient::new()
        .with_sobject(
            sobject("Account", "Account"),
            metadata(
                "Account",
                vec![],
                vec![ChildRelationshipDescriptor {
                    relationship_name: Some("Contacts".to_string()),
                    child_sobject: "Contact".to_string(),
                    field: "AccountId".to_string(),
                }],
            ),
        )
        .with_sobject(sobject("Contact", "Contact"), metadata("Contact", vec![], vec![]));

    let final_json = json!({
        "response_type": "relationship_query",
        "confidence": 0.92,
        "confidence_label": "high",
        "intent_understood": "account-contact relationship",
        "actions_taken": ["search_for_sobjects", "get_sobject_relationships"],
        "data_summary": {"child_relationships": [{"relationship_query_name": "Contacts", "child_object_name": "Contact"}]},
        "suggestions": [],
    })
    .to_string();

    let script = vec![
        Message::ai_with_tool_calls("", vec![tool_call("search_for_sobjects", json!({"search_terms": ["account", "contact"]}))]),
        Message::ai_with_tool_calls("", vec![tool_call("get_sobject_relationships", json!({"object_names": ["Account", "Contact"]}))]),
        Message::ai_text(final_json),
    ];

    let outcome = orchestrator(crm, script).invoke("How are accounts and contacts related?", "conn_1", None, true).await.unwrap();

    let structured = outcome.structured_response.unwrap();
    assert_eq!(structured.response_type, ResponseType::RelationshipQuery);
    let children = structured.data_summary["child_relationships"].as_array().unwrap();
    assert!(children.iter().any(|c| c["child_object_name"] == "Contact"));
}

/// Scenario 4 (spec §8): "Tell me a joke" — no tool calls at all.
#[tokio::test]
async fn out_of_scope_scenario_makes_no_tool_calls() {
    let final_json = json!({
        "response_type": "clarification_needed",
        "confidence": 0.99,
        "confidence_label": "high",
        "intent_understood": "off-topic request",
        "actions_taken": [],
        "data_summary": {},
        "suggestions": [],
        "clarification": {"type": "out_of_scope", "question": "I can only help with CRM data."},
    })
    .to_string();

    let outcome = orchestrator(MockCrmClient::new(), vec![Message::ai_text(final_json)])
        .invoke("Tell me a joke", "conn_1", None, true)
        .await
        .unwrap();

    let structured = outcome.structured_response.unwrap();
    assert_eq!(structured.response_type, ResponseType::ClarificationNeeded);
    assert_eq!(structured.clarification.unwrap().kind, "out_of_scope");
    assert_eq!(structured.data_summary, json!({}));
    assert!(outcome.state.messages.is_empty());
}

/// Scenario 5 (spec §8): a reply truncated mid-`fields` array still parses,
/// preserving `response_type`.
#[tokio::test]
async fn truncated_json_reply_is_repaired_and_response_type_survives() {
    let truncated = r#"{"response_type":"metadata_query","confidence":0.8,"confidence_label":"high","intent_understood":"account fields","actions_taken":["search_for_sobjects"],"data_summary":{"object_name":"Account","fields":[{"name":"Name"},{"name":"Industry"}"#;

    let outcome = orchestrator(MockCrmClient::new(), vec![Message::ai_text(truncated)])
        .invoke("Show me account fields", "conn_1", None, true)
        .await
        .unwrap();

    let structured = outcome.structured_response.expect("truncation repair should recover a structured response");
    assert_eq!(structured.response_type, ResponseType::MetadataQuery);
}

/// Scenario 6 (spec §8): repeated `search_for_sobjects` calls for the same
/// connection hit the cache, not the CRM, until the connection is cleared.
#[tokio::test]
async fn cache_scenario_reuses_object_list_until_connection_is_cleared() {
    use async_trait::async_trait;
    use crm_agent_core::crm::CrmClient;
    use crm_agent_core::error::Result;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingCrm {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CrmClient for CountingCrm {
        async fn list_sobjects(&self, _connection_id: &str) -> Result<Vec<SObjectSummary>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![sobject("Account", "Account")])
        }

        async fn describe_sobject(&self, _connection_id: &str, object_name: &str, _include_child_relationships: bool) -> Result<SObjectMetadata> {
            Ok(metadata(object_name, vec![], vec![]))
        }

        async fn run_query(&self, _connection_id: &str, _soql: &str) -> Result<crm_agent_core::crm::QueryResult> {
            Ok(QueryResult { total_size: 0, done: true, next_records_url: None, records: vec![] })
        }
    }

    let crm = Arc::new(CountingCrm { calls: AtomicUsize::new(0) });
    let cache = Arc::new(MetadataCache::new(Duration::from_secs(3600), Duration::from_secs(3600)));
    let ctx = crm_agent_core::tools::ToolContext::new("conn_1", crm.clone(), cache.clone(), 200, 50, 5);
    let args = json!({"search_terms": ["account"]});

    let first = crm_agent_core::tools::ToolRegistry::invoke("search_for_sobjects", &args, &ctx).await;
    assert!(first.ok);
    assert_eq!(crm.calls.load(Ordering::SeqCst), 1);

    let second = crm_agent_core::tools::ToolRegistry::invoke("search_for_sobjects", &args, &ctx).await;
    assert!(second.ok);
    assert_eq!(crm.calls.load(Ordering::SeqCst), 1, "second call must be served from cache");

    cache.clear_connection("conn_1").await;

    let third = crm_agent_core::tools::ToolRegistry::invoke("search_for_sobjects", &args, &ctx).await;
    assert!(third.ok);
    assert_eq!(crm.calls.load(Ordering::SeqCst), 2, "clearing the connection forces a re-hit");
}
