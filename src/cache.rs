//! TTL'd metadata cache: one object-list entry per connection, one
//! object-metadata entry per `(connection, object)` pair.
//!
//! Backed by two `moka::future::Cache`s (one per entry kind), each with a
//! uniform time-to-live matching its configured TTL constant. moka's sweep
//! runs on its own schedule; `sweep_expired` additionally forces a pass and
//! reports counts for callers (tests, a maintenance endpoint) that need a
//! deterministic number.

use chrono::Utc;
use moka::future::Cache;
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use crate::types::{SObjectListCacheEntry, SObjectMetadataCacheEntry};

pub struct MetadataCache {
    lists: Cache<String, SObjectListCacheEntry>,
    metadata: Cache<String, SObjectMetadataCacheEntry>,
    /// `connection_id -> cache_keys`, maintained alongside `metadata` so
    /// `clear_connection` can delete every metadata entry for a connection
    /// without moka's prefix-invalidation (which it doesn't have).
    connection_index: Mutex<std::collections::HashMap<String, HashSet<String>>>,
    list_ttl: chrono::Duration,
    metadata_ttl: chrono::Duration,
}

impl MetadataCache {
    pub fn new(list_ttl: Duration, metadata_ttl: Duration) -> Self {
        Self {
            lists: Cache::builder().time_to_live(list_ttl).build(),
            metadata: Cache::builder().time_to_live(metadata_ttl).build(),
            connection_index: Mutex::new(std::collections::HashMap::new()),
            list_ttl: chrono::Duration::from_std(list_ttl).unwrap_or(chrono::Duration::hours(24)),
            metadata_ttl: chrono::Duration::from_std(metadata_ttl).unwrap_or(chrono::Duration::hours(24)),
        }
    }

    /// `GetObjectList(connection_id) -> (list | none)`. Defensive
    /// `expires_at` check guards against a slow moka sweep returning an
    /// entry that is logically expired but not yet evicted.
    pub async fn get_object_list(&self, connection_id: &str) -> Option<SObjectListCacheEntry> {
        let entry = self.lists.get(connection_id).await?;
        if entry.expires_at > Utc::now() {
            Some(entry)
        } else {
            self.lists.invalidate(connection_id).await;
            None
        }
    }

    /// `PutObjectList(connection_id, org_id, list)`.
    pub async fn put_object_list(
        &self,
        connection_id: &str,
        org_id: &str,
        sobjects: Vec<crate::types::SObjectSummary>,
        api_version: &str,
    ) {
        let now = Utc::now();
        let entry = SObjectListCacheEntry {
            connection_id: connection_id.to_string(),
            org_id: org_id.to_string(),
            cached_at: now,
            expires_at: now + self.list_ttl,
            api_version: api_version.to_string(),
            total_count: sobjects.len(),
            sobjects,
        };
        self.lists.insert(connection_id.to_string(), entry).await;
    }

    /// `GetObjectMetadata(connection_id, object, include_child_rels) ->
    /// (metadata | none)`.
    pub async fn get_object_metadata(
        &self,
        connection_id: &str,
        object_name: &str,
        include_child_rels: bool,
    ) -> Option<SObjectMetadataCacheEntry> {
        let cache_key = SObjectMetadataCacheEntry::cache_key(connection_id, object_name);
        let entry = self.metadata.get(&cache_key).await?;
        if entry.expires_at <= Utc::now() {
            self.metadata.invalidate(&cache_key).await;
            self.untrack(connection_id, &cache_key);
            return None;
        }
        if include_child_rels {
            Some(entry)
        } else {
            let mut stripped = entry;
            stripped.metadata = stripped.metadata.without_child_relationships();
            Some(stripped)
        }
    }

    /// `PutObjectMetadata(connection_id, org_id, object, metadata)` —
    /// always stores the full metadata including child relationships.
    pub async fn put_object_metadata(
        &self,
        connection_id: &str,
        org_id: &str,
        metadata: crate::types::SObjectMetadata,
    ) {
        let entry = SObjectMetadataCacheEntry::new(connection_id, org_id, metadata, self.metadata_ttl);
        let cache_key = entry.cache_key.clone();
        self.metadata.insert(cache_key.clone(), entry).await;
        self.track(connection_id, cache_key);
    }

    /// `ClearConnection(connection_id)` — delete the list entry and every
    /// metadata entry recorded for that connection.
    pub async fn clear_connection(&self, connection_id: &str) {
        self.lists.invalidate(connection_id).await;
        let keys = self
            .connection_index
            .lock()
            .unwrap()
            .remove(connection_id)
            .unwrap_or_default();
        for key in keys {
            self.metadata.invalidate(&key).await;
        }
    }

    /// `SweepExpired() -> (n_list, n_meta)`. Forces moka's pending-task
    /// queue to run, then counts entries whose `expires_at` has already
    /// passed (moka does not report eviction counts directly).
    pub async fn sweep_expired(&self) -> (u64, u64) {
        self.lists.run_pending_tasks().await;
        self.metadata.run_pending_tasks().await;

        let now = Utc::now();
        let expired_list_keys: Vec<String> = self
            .lists
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(key, _)| (*key).clone())
            .collect();
        let expired_meta_keys: Vec<String> = self
            .metadata
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(key, _)| (*key).clone())
            .collect();
        let n_list = expired_list_keys.len() as u64;
        let n_meta = expired_meta_keys.len() as u64;

        for key in &expired_list_keys {
            self.lists.invalidate(key).await;
        }
        for key in &expired_meta_keys {
            self.metadata.invalidate(key).await;
        }
        if !expired_meta_keys.is_empty() {
            let mut index = self.connection_index.lock().unwrap();
            for keys in index.values_mut() {
                for key in &expired_meta_keys {
                    keys.remove(key);
                }
            }
        }

        (n_list, n_meta)
    }

    fn track(&self, connection_id: &str, cache_key: String) {
        self.connection_index
            .lock()
            .unwrap()
            .entry(connection_id.to_string())
            .or_default()
            .insert(cache_key);
    }

    fn untrack(&self, connection_id: &str, cache_key: &str) {
        if let Some(keys) = self.connection_index.lock().unwrap().get_mut(connection_id) {
            keys.remove(cache_key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChildRelationshipDescriptor, SObjectMetadata, SObjectSummary};

    fn sobject_summary(name: &str) -> SObjectSummary {
        SObjectSummary {
            name: name.to_string(),
            label: name.to_string(),
            label_plural: format!("{name}s"),
            key_prefix: None,
            custom: false,
            createable: true,
            deletable: true,
            updateable: true,
            queryable: true,
        }
    }

    fn account_metadata() -> SObjectMetadata {
        SObjectMetadata {
            name: "Account".into(),
            label: "Account".into(),
            custom: false,
            createable: true,
            deletable: true,
            updateable: true,
            queryable: true,
            fields: vec![],
            child_relationships: vec![ChildRelationshipDescriptor {
                relationship_name: Some("Contacts".into()),
                child_sobject: "Contact".into(),
                field: "AccountId".into(),
            }],
        }
    }

    #[tokio::test]
    async fn put_then_get_object_list_round_trips() {
        let cache = MetadataCache::new(Duration::from_secs(3600), Duration::from_secs(3600));
        assert!(cache.get_object_list("conn_1").await.is_none());
        cache
            .put_object_list("conn_1", "org_1", vec![sobject_summary("Account")], "v59.0")
            .await;
        let entry = cache.get_object_list("conn_1").await.unwrap();
        assert_eq!(entry.total_count, 1);
        assert_eq!(entry.sobjects[0].name, "Account");
    }

    #[tokio::test]
    async fn get_object_metadata_without_child_rels_strips_but_storage_keeps_full() {
        let cache = MetadataCache::new(Duration::from_secs(3600), Duration::from_secs(3600));
        cache.put_object_metadata("conn_1", "org_1", account_metadata()).await;

        let stripped = cache.get_object_metadata("conn_1", "Account", false).await.unwrap();
        assert!(stripped.metadata.child_relationships.is_empty());

        let full = cache.get_object_metadata("conn_1", "Account", true).await.unwrap();
        assert_eq!(full.metadata.child_relationships.len(), 1);
    }

    #[tokio::test]
    async fn cache_key_uses_pipe_separator_between_connection_and_object() {
        let cache = MetadataCache::new(Duration::from_secs(3600), Duration::from_secs(3600));
        cache.put_object_metadata("conn_1", "org_1", account_metadata()).await;
        let entry = cache.get_object_metadata("conn_1", "Account", true).await.unwrap();
        assert_eq!(entry.cache_key, "conn_1|Account");
    }

    #[tokio::test]
    async fn clear_connection_removes_list_and_all_metadata_for_that_connection() {
        let cache = MetadataCache::new(Duration::from_secs(3600), Duration::from_secs(3600));
        cache
            .put_object_list("conn_1", "org_1", vec![sobject_summary("Account")], "v59.0")
            .await;
        cache.put_object_metadata("conn_1", "org_1", account_metadata()).await;

        cache.clear_connection("conn_1").await;

        assert!(cache.get_object_list("conn_1").await.is_none());
        assert!(cache.get_object_metadata("conn_1", "Account", true).await.is_none());
    }

    #[tokio::test]
    async fn expired_entry_is_never_returned() {
        let cache = MetadataCache::new(Duration::from_millis(10), Duration::from_millis(10));
        cache
            .put_object_list("conn_1", "org_1", vec![sobject_summary("Account")], "v59.0")
            .await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(cache.get_object_list("conn_1").await.is_none());
    }

    #[tokio::test]
    async fn sweep_expired_counts_and_evicts_stale_rows() {
        let cache = MetadataCache::new(Duration::from_millis(10), Duration::from_millis(10));
        cache
            .put_object_list("conn_1", "org_1", vec![sobject_summary("Account")], "v59.0")
            .await;
        cache.put_object_metadata("conn_1", "org_1", account_metadata()).await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let (n_list, n_meta) = cache.sweep_expired().await;
        assert_eq!(n_list, 1);
        assert_eq!(n_meta, 1);
    }
}
