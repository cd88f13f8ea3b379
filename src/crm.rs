//! The CRM boundary: an async trait the tool registry dispatches through,
//! plus a scripted mock for tests.
//!
//! No concrete CRM vendor SDK is part of this crate (per scope: the CRM
//! client is an external collaborator). `CrmClient` is the seam a
//! production binary implements against a real CRM; `MockCrmClient` is a
//! reference/test double that returns canned metadata and query results.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::Result;
use crate::types::{SObjectMetadata, SObjectSummary};

/// One page of SOQL query results, as the CRM SDK would hand them back —
/// full records included. Tool redaction (stripping `records` before the
/// LLM sees it) happens in `tools::query`, not here.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct QueryResult {
    pub total_size: usize,
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_records_url: Option<String>,
    pub records: Vec<serde_json::Value>,
}

/// The operations the tool registry needs from a CRM connection. Every
/// method takes `connection_id` explicitly — there is no process-wide
/// default connection.
#[async_trait]
pub trait CrmClient: Send + Sync {
    /// List every SObject visible on this connection (unfiltered, unpaged —
    /// the tool layer applies search/pagination on top of this).
    async fn list_sobjects(&self, connection_id: &str) -> Result<Vec<SObjectSummary>>;

    /// Full object description, including field list and, when
    /// `include_child_relationships` is true, child relationship
    /// descriptors.
    async fn describe_sobject(
        &self,
        connection_id: &str,
        object_name: &str,
        include_child_relationships: bool,
    ) -> Result<SObjectMetadata>;

    /// Run a SOQL query and return the first page of results.
    async fn run_query(&self, connection_id: &str, soql: &str) -> Result<QueryResult>;
}

/// Canned object list + metadata keyed by object name, for local
/// exploration and integration tests. Queries are resolved by a
/// caller-installed closure-free script: a fixed map from SOQL string to
/// `QueryResult`, with a default empty result for anything unscripted.
pub struct MockCrmClient {
    sobjects: Vec<SObjectSummary>,
    metadata: HashMap<String, SObjectMetadata>,
    queries: Mutex<HashMap<String, QueryResult>>,
}

impl MockCrmClient {
    pub fn new() -> Self {
        Self { sobjects: Vec::new(), metadata: HashMap::new(), queries: Mutex::new(HashMap::new()) }
    }

    pub fn with_sobject(mut self, summary: SObjectSummary, metadata: SObjectMetadata) -> Self {
        self.metadata.insert(summary.name.clone(), metadata);
        self.sobjects.push(summary);
        self
    }

    pub fn with_query_result(self, soql: impl Into<String>, result: QueryResult) -> Self {
        self.queries.lock().unwrap().insert(soql.into(), result);
        self
    }
}

impl Default for MockCrmClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CrmClient for MockCrmClient {
    async fn list_sobjects(&self, _connection_id: &str) -> Result<Vec<SObjectSummary>> {
        Ok(self.sobjects.clone())
    }

    async fn describe_sobject(
        &self,
        _connection_id: &str,
        object_name: &str,
        include_child_relationships: bool,
    ) -> Result<SObjectMetadata> {
        let metadata = self
            .metadata
            .get(object_name)
            .cloned()
            .ok_or_else(|| crate::error::Error::crm(format!("unknown SObject: {object_name}")))?;
        Ok(if include_child_relationships {
            metadata
        } else {
            metadata.without_child_relationships()
        })
    }

    async fn run_query(&self, _connection_id: &str, soql: &str) -> Result<QueryResult> {
        Ok(self.queries.lock().unwrap().get(soql).cloned().unwrap_or(QueryResult {
            total_size: 0,
            done: true,
            next_records_url: None,
            records: Vec::new(),
        }))
    }
}
