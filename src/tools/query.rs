//! `execute_soql_query`: the only tool that talks to the CRM without going
//! through the metadata cache, and the only one whose result is split in
//! two — a lite view for the model, full records for the client.

use serde_json::json;

use crate::types::ToolResult;

use super::{Tool, ToolContext, tool};

pub(super) fn descriptor() -> Tool {
    tool("execute_soql_query", "Run a SOQL query against the CRM and return the result.")
        .schema(json!({
            "query": {"type": "string"},
        }))
        .build(|_args| async move { Ok(json!({})) })
}

pub(super) async fn invoke(args: &serde_json::Value, ctx: &ToolContext) -> ToolResult {
    let query = match args.get("query").and_then(|v| v.as_str()) {
        Some(s) => s,
        None => return ToolResult::err_with_meta("query is required", "tool"),
    };

    let result = match ctx.crm.run_query(&ctx.connection_id, query).await {
        Ok(r) => r,
        Err(e) => return ToolResult::err_with_meta(e.to_string(), "crm"),
    };

    let mut metadata = json!({
        "total_size": result.total_size,
        "done": result.done,
    });
    if let Some(next) = &result.next_records_url {
        metadata["nextRecordsUrl"] = json!(next);
    }

    let lite = json!({
        "metadata": metadata,
        "records_count": result.records.len(),
    });

    let client_payload = json!({
        "metadata": metadata,
        "records": result.records,
    });

    ToolResult::ok_with_client_payload(lite, client_payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MetadataCache;
    use crate::crm::{MockCrmClient, QueryResult};
    use std::sync::Arc;
    use std::time::Duration;

    fn ctx_with(soql: &str, result: QueryResult) -> ToolContext {
        let crm = MockCrmClient::new().with_query_result(soql, result);
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
    async fn lite_value_strips_records_but_client_payload_keeps_them() {
        let ctx = ctx_with(
            "SELECT Id FROM Account",
            QueryResult { total_size: 2, done: true, next_records_url: None, records: vec![json!({"Id": "001"}), json!({"Id": "002"})] },
        );
        let result = invoke(&json!({"query": "SELECT Id FROM Account"}), &ctx).await;
        assert!(result.ok);
        let lite = result.value.unwrap();
        assert_eq!(lite["records_count"], 2);
        assert!(lite.get("records").is_none());

        let full = result.client_payload.unwrap();
        assert_eq!(full["records"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn missing_query_is_an_error() {
        let ctx = ctx_with("x", QueryResult { total_size: 0, done: true, next_records_url: None, records: vec![] });
        let result = invoke(&json!({}), &ctx).await;
        assert!(!result.ok);
    }
}
