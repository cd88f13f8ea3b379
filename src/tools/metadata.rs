//! `get_sobject_metadata`: per-object field lists with filter/pagination
//! applied after the describe, before anything reaches the model.

use serde_json::json;

use crate::types::ToolResult;

use super::{Tool, ToolContext, load_object_metadata, tool};

pub(super) fn descriptor() -> Tool {
    tool(
        "get_sobject_metadata",
        "Describe one or more SObjects: field names, types, and constraints. Requires resolved API names — call search_for_sobjects first if unsure.",
    )
    .schema(json!({
        "object_names": {"type": "array", "items": {"type": "string"}},
        "include_picklist_values": {"type": "boolean", "optional": true, "default": false},
        "include_calculated_fields": {"type": "boolean", "optional": true, "default": false},
        "include_field_properties": {"type": "boolean", "optional": true, "default": false},
        "field_offset": {"type": "integer", "optional": true, "default": 0},
        "field_limit": {"type": "integer", "optional": true, "default": 50},
        "filter_unique": {"type": "boolean", "optional": true, "default": false},
        "filter_nillable": {"type": "boolean", "optional": true, "default": false},
        "filter_updateable": {"type": "boolean", "optional": true, "default": false},
        "filter_required": {"type": "boolean", "optional": true, "default": false},
    }))
    .build(|_args| async move { Ok(json!({})) })
}

fn bool_flag(args: &serde_json::Value, key: &str, default: bool) -> bool {
    args.get(key).and_then(|v| v.as_bool()).unwrap_or(default)
}

pub(super) async fn invoke(args: &serde_json::Value, ctx: &ToolContext) -> ToolResult {
    let object_names: Vec<String> = match args.get("object_names").and_then(|v| v.as_array()) {
        Some(arr) => arr.iter().filter_map(|v| v.as_str()).map(|s| s.to_string()).collect(),
        None => return ToolResult::err_with_meta("object_names is required", "tool"),
    };
    if object_names.is_empty() {
        return ToolResult::err_with_meta("object_names must not be empty", "tool");
    }

    let include_picklist_values = bool_flag(args, "include_picklist_values", false);
    let include_calculated_fields = bool_flag(args, "include_calculated_fields", false);
    let include_field_properties = bool_flag(args, "include_field_properties", false);
    let filter_unique = bool_flag(args, "filter_unique", false);
    let filter_nillable = bool_flag(args, "filter_nillable", false);
    let filter_updateable = bool_flag(args, "filter_updateable", false);
    let filter_required = bool_flag(args, "filter_required", false);
    let field_offset = args.get("field_offset").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
    let field_limit = args
        .get("field_limit")
        .and_then(|v| v.as_u64())
        .unwrap_or(ctx.metadata_max_fields_per_object as u64) as usize;

    let mut per_object = Vec::new();
    for object_name in &object_names {
        let metadata = match load_object_metadata(ctx, object_name, false).await {
            Ok(m) => m,
            Err(e) => {
                per_object.push(json!({ "object_name": object_name, "error": e.to_string() }));
                continue;
            }
        };

        let mut fields: Vec<_> = metadata.fields.clone();
        fields.sort_by_key(|f| f.name.to_lowercase());

        if filter_unique {
            fields.retain(|f| f.unique);
        }
        if filter_nillable {
            fields.retain(|f| f.nillable);
        }
        if filter_updateable {
            fields.retain(|f| f.updateable);
        }
        if filter_required {
            fields.retain(|f| !f.nillable);
        }

        let total_field_count = fields.len();
        let has_more_fields = field_offset + field_limit < total_field_count;
        let page: Vec<_> = fields.into_iter().skip(field_offset).take(field_limit).collect();

        let field_values: Vec<serde_json::Value> = page
            .iter()
            .map(|f| {
                let mut obj = serde_json::Map::new();
                obj.insert("name".to_string(), json!(f.name));
                obj.insert("label".to_string(), json!(f.label));
                obj.insert("type".to_string(), json!(f.field_type));
                obj.insert("required".to_string(), json!(!f.nillable));
                if include_picklist_values && !f.picklist_values.is_empty() {
                    obj.insert("picklistValues".to_string(), json!(f.picklist_values));
                }
                if include_calculated_fields && f.calculated {
                    obj.insert("calculated".to_string(), json!(true));
                    if let Some(formula) = &f.formula {
                        obj.insert("formula".to_string(), json!(formula));
                    }
                }
                if include_field_properties {
                    obj.insert("createable".to_string(), json!(f.createable));
                    obj.insert("updateable".to_string(), json!(f.updateable));
                    obj.insert("nillable".to_string(), json!(f.nillable));
                    obj.insert("unique".to_string(), json!(f.unique));
                }
                serde_json::Value::Object(obj)
            })
            .collect();

        per_object.push(json!({
            "object_name": object_name,
            "label": metadata.label,
            "total_fields": total_field_count,
            "fields": field_values,
            "field_pagination": {
                "total_field_count": total_field_count,
                "field_offset": field_offset,
                "field_limit": field_limit,
                "has_more_fields": has_more_fields,
                "next_field_offset": if has_more_fields { Some(field_offset + field_limit) } else { None },
            },
        }));
    }

    ToolResult::ok(json!({ "objects": per_object }))
}
