// SPDX-License-Identifier: PMPL-1.0-or-later
//! In-memory document store
//!
//! Buckets are fixed at startup. Inside a bucket, documents live in
//! `(scope, collection)` keyspaces that spring into existence on first write.
//! Documents are kept ordered by key so scans and query results are
//! deterministic.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

/// Name of the scope and collection every bucket starts with.
pub const DEFAULT_NAME: &str = "_default";

/// Store errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Document exists: {0}")]
    DocumentExists(String),
}

/// Write semantics for a mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Insert or overwrite
    #[default]
    Upsert,
    /// Fail if the key is present
    Insert,
    /// Fail if the key is absent
    Replace,
}

/// Address of a collection
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Keyspace {
    pub bucket: String,
    pub scope: String,
    pub collection: String,
}

impl Keyspace {
    /// The `_default._default` collection of `bucket`.
    pub fn default_collection(bucket: impl Into<String>) -> Self {
        Self::new(bucket, DEFAULT_NAME, DEFAULT_NAME)
    }

    pub fn new(
        bucket: impl Into<String>,
        scope: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            scope: scope.into(),
            collection: collection.into(),
        }
    }
}

/// A stored document revision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub cas: u64,
    pub value: Value,
}

type CollectionData = BTreeMap<String, StoredDocument>;

#[derive(Debug, Default)]
struct BucketData {
    collections: HashMap<(String, String), CollectionData>,
}

impl BucketData {
    fn item_count(&self) -> u64 {
        self.collections.values().map(|c| c.len() as u64).sum()
    }
}

/// Bucket summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketSummary {
    pub name: String,
    pub item_count: u64,
}

/// Thread-safe in-memory store
#[derive(Debug)]
pub struct DocumentStore {
    buckets: RwLock<HashMap<String, BucketData>>,
    cas: AtomicU64,
}

impl DocumentStore {
    /// Create a store holding the given (empty) buckets
    pub fn new<I, S>(buckets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let buckets = buckets
            .into_iter()
            .map(|name| (name.into(), BucketData::default()))
            .collect();
        Self {
            buckets: RwLock::new(buckets),
            cas: AtomicU64::new(0),
        }
    }

    fn next_cas(&self) -> u64 {
        self.cas.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Summary of a bucket
    pub async fn bucket(&self, name: &str) -> Result<BucketSummary, StoreError> {
        let buckets = self.buckets.read().await;
        let data = buckets
            .get(name)
            .ok_or_else(|| StoreError::BucketNotFound(name.to_string()))?;
        Ok(BucketSummary {
            name: name.to_string(),
            item_count: data.item_count(),
        })
    }

    /// Summaries of all buckets, ordered by name
    pub async fn list_buckets(&self) -> Vec<BucketSummary> {
        let buckets = self.buckets.read().await;
        let mut summaries: Vec<BucketSummary> = buckets
            .iter()
            .map(|(name, data)| BucketSummary {
                name: name.clone(),
                item_count: data.item_count(),
            })
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    /// Write a document, returning the new CAS
    pub async fn write(
        &self,
        keyspace: &Keyspace,
        key: &str,
        value: Value,
        mode: WriteMode,
    ) -> Result<u64, StoreError> {
        let mut buckets = self.buckets.write().await;
        let bucket = buckets
            .get_mut(&keyspace.bucket)
            .ok_or_else(|| StoreError::BucketNotFound(keyspace.bucket.clone()))?;
        let collection = bucket
            .collections
            .entry((keyspace.scope.clone(), keyspace.collection.clone()))
            .or_default();

        match (mode, collection.contains_key(key)) {
            (WriteMode::Insert, true) => {
                return Err(StoreError::DocumentExists(key.to_string()));
            }
            (WriteMode::Replace, false) => {
                return Err(StoreError::DocumentNotFound(key.to_string()));
            }
            _ => {}
        }

        let cas = self.next_cas();
        collection.insert(key.to_string(), StoredDocument { cas, value });
        debug!(bucket = %keyspace.bucket, key, cas, ?mode, "document written");
        Ok(cas)
    }

    /// Read a document
    pub async fn get(&self, keyspace: &Keyspace, key: &str) -> Result<StoredDocument, StoreError> {
        let buckets = self.buckets.read().await;
        let bucket = buckets
            .get(&keyspace.bucket)
            .ok_or_else(|| StoreError::BucketNotFound(keyspace.bucket.clone()))?;
        bucket
            .collections
            .get(&(keyspace.scope.clone(), keyspace.collection.clone()))
            .and_then(|c| c.get(key))
            .cloned()
            .ok_or_else(|| StoreError::DocumentNotFound(key.to_string()))
    }

    /// Remove a document, returning the CAS of the removal
    pub async fn remove(&self, keyspace: &Keyspace, key: &str) -> Result<u64, StoreError> {
        let mut buckets = self.buckets.write().await;
        let bucket = buckets
            .get_mut(&keyspace.bucket)
            .ok_or_else(|| StoreError::BucketNotFound(keyspace.bucket.clone()))?;
        bucket
            .collections
            .get_mut(&(keyspace.scope.clone(), keyspace.collection.clone()))
            .and_then(|c| c.remove(key))
            .ok_or_else(|| StoreError::DocumentNotFound(key.to_string()))?;

        let cas = self.next_cas();
        debug!(bucket = %keyspace.bucket, key, cas, "document removed");
        Ok(cas)
    }

    /// Snapshot of every `(key, value)` in a keyspace, in key order.
    ///
    /// A missing collection inside an existing bucket scans as empty.
    pub async fn scan(&self, keyspace: &Keyspace) -> Result<Vec<(String, Value)>, StoreError> {
        let buckets = self.buckets.read().await;
        let bucket = buckets
            .get(&keyspace.bucket)
            .ok_or_else(|| StoreError::BucketNotFound(keyspace.bucket.clone()))?;
        Ok(bucket
            .collections
            .get(&(keyspace.scope.clone(), keyspace.collection.clone()))
            .map(|c| {
                c.iter()
                    .map(|(k, doc)| (k.clone(), doc.value.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> DocumentStore {
        DocumentStore::new(["default"])
    }

    #[tokio::test]
    async fn test_upsert_then_get() {
        let store = store();
        let ks = Keyspace::default_collection("default");

        let cas = store
            .write(&ks, "k1", json!({"a": 1}), WriteMode::Upsert)
            .await
            .unwrap();
        let doc = store.get(&ks, "k1").await.unwrap();

        assert_eq!(doc.cas, cas);
        assert_eq!(doc.value, json!({"a": 1}));
    }

    #[tokio::test]
    async fn test_upsert_overwrites_and_bumps_cas() {
        let store = store();
        let ks = Keyspace::default_collection("default");

        let first = store.write(&ks, "k", json!(1), WriteMode::Upsert).await.unwrap();
        let second = store.write(&ks, "k", json!(2), WriteMode::Upsert).await.unwrap();

        assert!(second > first);
        assert_eq!(store.get(&ks, "k").await.unwrap().value, json!(2));
    }

    #[tokio::test]
    async fn test_insert_and_replace_modes() {
        let store = store();
        let ks = Keyspace::default_collection("default");

        assert_eq!(
            store.write(&ks, "k", json!(1), WriteMode::Replace).await,
            Err(StoreError::DocumentNotFound("k".to_string()))
        );
        store.write(&ks, "k", json!(1), WriteMode::Insert).await.unwrap();
        assert_eq!(
            store.write(&ks, "k", json!(2), WriteMode::Insert).await,
            Err(StoreError::DocumentExists("k".to_string()))
        );
        store.write(&ks, "k", json!(3), WriteMode::Replace).await.unwrap();
        assert_eq!(store.get(&ks, "k").await.unwrap().value, json!(3));
    }

    #[tokio::test]
    async fn test_remove() {
        let store = store();
        let ks = Keyspace::default_collection("default");

        store.write(&ks, "k", json!(1), WriteMode::Upsert).await.unwrap();
        store.remove(&ks, "k").await.unwrap();

        assert!(matches!(store.get(&ks, "k").await, Err(StoreError::DocumentNotFound(_))));
        assert!(matches!(store.remove(&ks, "k").await, Err(StoreError::DocumentNotFound(_))));
    }

    #[tokio::test]
    async fn test_unknown_bucket() {
        let store = store();
        let ks = Keyspace::default_collection("missing");

        assert!(matches!(store.bucket("missing").await, Err(StoreError::BucketNotFound(_))));
        assert!(matches!(
            store.write(&ks, "k", json!(1), WriteMode::Upsert).await,
            Err(StoreError::BucketNotFound(_))
        ));
        assert!(matches!(store.scan(&ks).await, Err(StoreError::BucketNotFound(_))));
    }

    #[tokio::test]
    async fn test_collections_are_isolated_and_counted() {
        let store = store();
        let default = Keyspace::default_collection("default");
        let other = Keyspace::new("default", "app", "users");

        store.write(&default, "k", json!(1), WriteMode::Upsert).await.unwrap();
        store.write(&other, "k", json!(2), WriteMode::Upsert).await.unwrap();
        store.write(&other, "j", json!(3), WriteMode::Upsert).await.unwrap();

        assert_eq!(store.get(&default, "k").await.unwrap().value, json!(1));
        assert_eq!(store.bucket("default").await.unwrap().item_count, 3);

        let keys: Vec<String> = store.scan(&other).await.unwrap().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["j", "k"]);
        assert!(store.scan(&Keyspace::new("default", "x", "y")).await.unwrap().is_empty());
    }
}
