//! `get_field_details`: exact-name field lookup within one object's metadata.

use serde_json::json;

use crate::types::ToolResult;

use super::{Tool, ToolContext, load_object_metadata, tool};

pub(super) fn descriptor() -> Tool {
    tool(
        "get_field_details",
        "Get full details for a single field on an SObject: type, constraints, picklist values.",
    )
    .schema(json!({
        "object_name": {"type": "string"},
        "field_name": {"type": "string"},
    }))
    .build(|_args| async move { Ok(json!({})) })
}

pub(super) async fn invoke(args: &serde_json::Value, ctx: &ToolContext) -> ToolResult {
    let object_name = match args.get("object_name").and_then(|v| v.as_str()) {
        Some(s) => s,
        None => return ToolResult::err_with_meta("object_name is required", "tool"),
    };
    let field_name = match args.get("field_name").and_then(|v| v.as_str()) {
        Some(s) => s,
        None => return ToolResult::err_with_meta("field_name is required", "tool"),
    };

    let metadata = match load_object_metadata(ctx, object_name, false).await {
        Ok(m) => m,
        Err(e) => return ToolResult::err_with_meta(e.to_string(), "crm"),
    };

    let field = match metadata.fields.iter().find(|f| f.name == field_name) {
        Some(f) => f,
        None => return ToolResult::err("field not found"),
    };

    let mut value = json!({
        "object_name": object_name,
        "field_name": field.name,
        "label": field.label,
        "type": field.field_type,
        "required": !field.nillable,
        "unique": field.unique,
        "calculated": field.calculated,
        "length": field.length,
        "precision": field.precision,
        "scale": field.scale,
        "reference_to": field.reference_to,
        "relationship_name": field.relationship_name,
        "formula": field.formula,
        "createable": field.createable,
        "updateable": field.updateable,
        "nillable": field.nillable,
    });

    if !field.picklist_values.is_empty() {
        value["picklist_values"] = json!(field.picklist_values);
    }

    ToolResult::ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MetadataCache;
    use crate::crm::MockCrmClient;
    use crate::types::{FieldDescriptor, PicklistValue, SObjectMetadata, SObjectSummary};
    use std::sync::Arc;
    use std::time::Duration;

    fn ctx_with_field(field: FieldDescriptor) -> ToolContext {
        let metadata = SObjectMetadata {
            name: "Account".into(),
            label: "Account".into(),
            custom: false,
            createable: true,
            deletable: true,
            updateable: true,
            queryable: true,
            fields: vec![field],
            child_relationships: vec![],
        };
        let crm = MockCrmClient::new().with_sobject(
            SObjectSummary {
                name: "Account".into(),
                label: "Account".into(),
                label_plural: "Accounts".into(),
                key_prefix: None,
                custom: false,
                createable: true,
                deletable: true,
                updateable: true,
                queryable: true,
            },
            metadata,
        );
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
    async fn found_field_reports_full_details() {
        let ctx = ctx_with_field(FieldDescriptor {
            name: "Industry".into(),
            label: "Industry".into(),
            field_type: "picklist".into(),
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
            picklist_values: vec![PicklistValue { value: "Tech".into(), label: "Technology".into(), valid_for: None }],
        });
        let result = invoke(&json!({"object_name": "Account", "field_name": "Industry"}), &ctx).await;
        assert!(result.ok);
        let value = result.value.unwrap();
        assert_eq!(value["type"], "picklist");
        assert_eq!(value["picklist_values"][0]["value"], "Tech");
    }

    #[tokio::test]
    async fn missing_field_returns_not_found_error() {
        let ctx = ctx_with_field(FieldDescriptor {
            name: "Name".into(),
            label: "Name".into(),
            field_type: "string".into(),
            nillable: false,
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
        });
        let result = invoke(&json!({"object_name": "Account", "field_name": "Bogus"}), &ctx).await;
        assert!(!result.ok);
        assert_eq!(result.error.as_deref(), Some("field not found"));
    }
}
