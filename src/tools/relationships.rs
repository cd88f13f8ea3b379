//! `get_sobject_relationships`: lookup fields and child relationships,
//! optionally filtered down to edges that stay inside the requested set.

use std::collections::HashSet;

use serde_json::json;

use crate::types::ToolResult;

use super::{Tool, ToolContext, load_object_metadata, tool};

pub(super) fn descriptor() -> Tool {
    tool(
        "get_sobject_relationships",
        "Find lookup/master-detail and child relationships for one or more SObjects. Use this before writing a SOQL query that traverses relationships.",
    )
    .schema(json!({
        "object_names": {"type": "array", "items": {"type": "string"}},
        "filter_relationships": {"type": "boolean", "optional": true, "default": true},
    }))
    .build(|_args| async move { Ok(json!({})) })
}

pub(super) async fn invoke(args: &serde_json::Value, ctx: &ToolContext) -> ToolResult {
    let object_names: Vec<String> = match args.get("object_names").and_then(|v| v.as_array()) {
        Some(arr) => arr.iter().filter_map(|v| v.as_str()).map(|s| s.to_string()).collect(),
        None => return ToolResult::err_with_meta("object_names is required", "tool"),
    };
    if object_names.is_empty() {
        return ToolResult::err_with_meta("object_names must not be empty", "tool");
    }
    let filter_relationships = args.get("filter_relationships").and_then(|v| v.as_bool()).unwrap_or(true);

    let requested: HashSet<String> = object_names.iter().cloned().collect();
    let mut per_object = Vec::new();

    for object_name in &object_names {
        let metadata = match load_object_metadata(ctx, object_name, true).await {
            Ok(m) => m,
            Err(e) => {
                per_object.push(json!({ "object_name": object_name, "error": e.to_string() }));
                continue;
            }
        };

        let mut lookup_relationships: Vec<serde_json::Value> = metadata
            .fields
            .iter()
            .filter(|f| f.field_type == "reference" && !f.reference_to.is_empty())
            .filter(|f| {
                !filter_relationships
                    || object_names.len() <= 1
                    || f.reference_to.iter().any(|target| requested.contains(target))
            })
            .map(|f| {
                json!({
                    "field_name": f.name,
                    "reference_to_object_name": f.reference_to,
                })
            })
            .collect();
        lookup_relationships.sort_by(|a, b| a["field_name"].as_str().cmp(&b["field_name"].as_str()));

        let mut child_relationships: Vec<serde_json::Value> = metadata
            .child_relationships
            .iter()
            .filter(|c| c.relationship_name.is_some())
            .filter(|c| !filter_relationships || object_names.len() <= 1 || requested.contains(&c.child_sobject))
            .map(|c| {
                json!({
                    "relationship_query_name": c.relationship_name,
                    "child_object_name": c.child_sobject,
                })
            })
            .collect();
        child_relationships.sort_by(|a, b| a["relationship_query_name"].as_str().cmp(&b["relationship_query_name"].as_str()));

        per_object.push(json!({
            "object_name": object_name,
            "lookup_relationships": lookup_relationships,
            "child_relationships": child_relationships,
        }));
    }

    ToolResult::ok(json!({ "objects": per_object }))
}
