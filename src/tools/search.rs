//! `search_for_sobjects`: resolve loose natural-language object names to
//! canonical API names before any describe/query call touches them.

use serde_json::json;

use crate::types::ToolResult;

use super::{Tool, ToolContext, load_object_list, tool};

const HARD_CAP: usize = 200;

pub(super) fn descriptor() -> Tool {
    tool(
        "search_for_sobjects",
        "Search for Salesforce SObjects by name or label. Call this once per set of unknown terms before describing or querying an object — never guess an API name.",
    )
    .schema(json!({
        "search_terms": {"type": "array", "items": {"type": "string"}, "description": "Words or phrases to match against object names and labels"},
    }))
    .build(|_args| async move { Ok(json!({})) })
}

pub(super) async fn invoke(args: &serde_json::Value, ctx: &ToolContext) -> ToolResult {
    let search_terms: Vec<String> = match args.get("search_terms").and_then(|v| v.as_array()) {
        Some(arr) => arr.iter().filter_map(|v| v.as_str()).map(|s| s.to_string()).collect(),
        None => return ToolResult::err_with_meta("search_terms is required", "tool"),
    };
    if search_terms.is_empty() {
        return ToolResult::ok(json!({
            "_search_metadata": {
                "search_terms_used": search_terms,
                "total_objects_found": 0,
                "objects_returned": 0,
                "pagination": {
                    "total_count": 0,
                    "offset": 0,
                    "limit": HARD_CAP,
                    "has_more": false,
                    "next_offset": Option::<usize>::None,
                },
            },
        }));
    }

    let sobjects = match load_object_list(ctx).await {
        Ok(list) => list,
        Err(e) => return ToolResult::err_with_meta(e.to_string(), "crm"),
    };

    let lowered_terms: Vec<String> = search_terms.iter().map(|t| t.to_lowercase()).collect();

    let mut matched = std::collections::BTreeMap::new();
    for sobject in &sobjects {
        let name_lower = sobject.name.to_lowercase();
        let label_lower = sobject.label.to_lowercase();
        let is_match = lowered_terms.iter().any(|t| name_lower.contains(t.as_str()) || label_lower.contains(t.as_str()));
        if is_match {
            matched.entry(sobject.name.clone()).or_insert_with(|| sobject.label.clone());
        }
    }

    let total_count = matched.len();
    let mut entries: Vec<(String, String)> = matched.into_iter().collect();
    entries.sort_by(|(name_a, _), (name_b, _)| {
        let a_lower = name_a.to_lowercase();
        let b_lower = name_b.to_lowercase();
        let a_exact = lowered_terms.iter().any(|t| a_lower == *t);
        let b_exact = lowered_terms.iter().any(|t| b_lower == *t);
        match (a_exact, b_exact) {
            (true, false) => std::cmp::Ordering::Less,
            (false, true) => std::cmp::Ordering::Greater,
            _ => name_a.cmp(name_b),
        }
    });

    let has_more = entries.len() > HARD_CAP;
    entries.truncate(HARD_CAP);
    let returned = entries.len();

    let mut results = serde_json::Map::new();
    for (name, label) in &entries {
        results.insert(name.clone(), json!({ "name": name, "label": label }));
    }

    results.insert(
        "_search_metadata".to_string(),
        json!({
            "search_terms_used": search_terms,
            "total_objects_found": total_count,
            "objects_returned": returned,
            "pagination": {
                "total_count": total_count,
                "offset": 0,
                "limit": HARD_CAP,
                "has_more": has_more,
                "next_offset": if has_more { Some(HARD_CAP) } else { None },
            },
        }),
    );

    ToolResult::ok(serde_json::Value::Object(results))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MetadataCache;
    use crate::crm::MockCrmClient;
    use crate::types::SObjectSummary;
    use std::sync::Arc;
    use std::time::Duration;

    fn summary(name: &str, label: &str) -> SObjectSummary {
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

    fn ctx_with(sobjects: Vec<SObjectSummary>) -> ToolContext {
        let mut crm = MockCrmClient::new();
        for s in &sobjects {
            crm = crm.with_sobject(
                s.clone(),
                crate::types::SObjectMetadata {
                    name: s.name.clone(),
                    label: s.label.clone(),
                    custom: false,
                    createable: true,
                    deletable: true,
                    updateable: true,
                    queryable: true,
                    fields: vec![],
                    child_relationships: vec![],
                },
            );
        }
        ToolContext::new(
            "conn_1",
            Arc::new(crm),
            Arc::new(MetadataCache::new(Duration::from_secs(3600), Duration::from_secs(3600))),
            200,
            50,
            5,
        )
    }

    #[tokio::test]
    async fn matches_by_name_or_label_case_insensitively() {
        let ctx = ctx_with(vec![summary("Account", "Account"), summary("Contact", "Contact"), summary("Opportunity", "Deal")]);
        let result = invoke(&json!({"search_terms": ["deal"]}), &ctx).await;
        assert!(result.ok);
        let value = result.value.unwrap();
        assert!(value.get("Opportunity").is_some());
        assert!(value.get("Account").is_none());
    }

    #[tokio::test]
    async fn exact_name_match_sorts_first() {
        let ctx = ctx_with(vec![summary("Account", "Account"), summary("AccountHistory", "Account History")]);
        let result = invoke(&json!({"search_terms": ["account"]}), &ctx).await;
        let value = result.value.unwrap();
        let meta = &value["_search_metadata"];
        assert_eq!(meta["total_objects_found"], 2);
    }

    #[tokio::test]
    async fn empty_search_terms_returns_empty_metadata_not_an_error() {
        let ctx = ctx_with(vec![summary("Account", "Account")]);
        let result = invoke(&json!({"search_terms": []}), &ctx).await;
        assert!(result.ok);
        let value = result.value.unwrap();
        let meta = &value["_search_metadata"];
        assert_eq!(meta["objects_returned"], 0);
        assert_eq!(meta["total_objects_found"], 0);
        assert_eq!(value.as_object().unwrap().len(), 1, "no object keys besides _search_metadata");
    }

    #[tokio::test]
    async fn caps_results_at_two_hundred() {
        let sobjects: Vec<_> = (0..250).map(|i| summary(&format!("Custom{i:04}__c"), &format!("Custom {i}"))).collect();
        let ctx = ctx_with(sobjects);
        let result = invoke(&json!({"search_terms": ["custom"]}), &ctx).await;
        let value = result.value.unwrap();
        let meta = &value["_search_metadata"];
        assert_eq!(meta["objects_returned"], 200);
        assert_eq!(meta["pagination"]["has_more"], true);
    }
}
