// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>

//! Key-value document operations on a collection.
//!
//! Every operation addresses a single document through
//! `/pools/default/buckets/{bucket}/scopes/{scope}/collections/{collection}/docs/{key}`.
//! Writes carry the JSON document as a form field; the `mode` field selects
//! upsert, insert-only, or replace-only semantics on the server.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::client::{HttpTransport, Service};
use crate::error::{Error, Result};
use crate::types::{DocumentResponse, GetResult, MutationResult};

/// Longest key the cluster accepts, in bytes.
pub const MAX_KEY_LEN: usize = 250;

/// Write semantics for a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum WriteMode {
    Upsert,
    Insert,
    Replace,
}

/// Form body for mutations.
#[derive(Debug, Serialize)]
struct MutationForm {
    value: String,
    mode: WriteMode,
}

/// A collection handle.
#[derive(Debug, Clone)]
pub struct Collection {
    transport: Arc<HttpTransport>,
    bucket: String,
    scope: String,
    name: String,
}

impl Collection {
    pub(crate) fn new(
        transport: Arc<HttpTransport>,
        bucket: String,
        scope: String,
        name: String,
    ) -> Self {
        Self {
            transport,
            bucket,
            scope,
            name,
        }
    }

    /// The collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the enclosing scope.
    pub fn scope_name(&self) -> &str {
        &self.scope
    }

    /// Name of the enclosing bucket.
    pub fn bucket_name(&self) -> &str {
        &self.bucket
    }

    /// Insert or replace the document stored under `key`.
    ///
    /// Any existing document at `key` is overwritten.
    pub async fn upsert<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<MutationResult> {
        self.mutate(key, value, WriteMode::Upsert).await
    }

    /// Insert a new document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DocumentExists`] if `key` already holds a document.
    pub async fn insert<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<MutationResult> {
        self.mutate(key, value, WriteMode::Insert).await
    }

    /// Replace an existing document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DocumentNotFound`] if `key` holds no document.
    pub async fn replace<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<MutationResult> {
        self.mutate(key, value, WriteMode::Replace).await
    }

    /// Fetch the document stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DocumentNotFound`] if `key` holds no document.
    pub async fn get(&self, key: &str) -> Result<GetResult> {
        let url = self.doc_url(key)?;
        let doc: DocumentResponse = self.transport.get(Service::Management, url).await?;
        debug!(key, cas = doc.meta.cas, "fetched document");
        Ok(doc.into())
    }

    /// Remove the document stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DocumentNotFound`] if `key` holds no document.
    pub async fn remove(&self, key: &str) -> Result<MutationResult> {
        let url = self.doc_url(key)?;
        let result: MutationResult = self.transport.delete(Service::Management, url).await?;
        debug!(key, cas = result.cas, "removed document");
        Ok(result)
    }

    /// Upsert several documents, one after another.
    ///
    /// Every entry is attempted; the outcome for each key is recorded in the
    /// returned [`MultiMutationResult`]. If the same key appears more than
    /// once, the last write wins and only its outcome is kept.
    pub async fn upsert_multi<I, K, T>(&self, documents: I) -> MultiMutationResult
    where
        I: IntoIterator<Item = (K, T)>,
        K: Into<String>,
        T: Serialize,
    {
        let mut results = BTreeMap::new();
        for (key, value) in documents {
            let key = key.into();
            let outcome = self.upsert(&key, &value).await;
            results.insert(key, outcome);
        }
        MultiMutationResult { results }
    }

    async fn mutate<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        mode: WriteMode,
    ) -> Result<MutationResult> {
        let url = self.doc_url(key)?;
        let form = MutationForm {
            value: serde_json::to_string(value)?,
            mode,
        };
        let result: MutationResult = self
            .transport
            .post_form(Service::Management, url, &form)
            .await?;
        debug!(key, ?mode, cas = result.cas, "stored document");
        Ok(result)
    }

    fn doc_url(&self, key: &str) -> Result<Url> {
        validate_segment("bucket name", &self.bucket)?;
        validate_segment("scope name", &self.scope)?;
        validate_segment("collection name", &self.name)?;
        validate_key(key)?;
        self.transport.url(
            Service::Management,
            [
                "pools",
                "default",
                "buckets",
                self.bucket.as_str(),
                "scopes",
                self.scope.as_str(),
                "collections",
                self.name.as_str(),
                "docs",
                key,
            ],
        )
    }
}

/// Reject keys the cluster would refuse, before any request is sent.
fn validate_key(key: &str) -> Result<()> {
    validate_segment("document key", key)?;
    if key.len() > MAX_KEY_LEN {
        return Err(Error::InvalidArgument(format!(
            "document key is {} bytes; the limit is {MAX_KEY_LEN}",
            key.len()
        )));
    }
    Ok(())
}

/// Check a value that travels as one URL path segment.
///
/// `.` and `..` are dot-segments: URL normalization removes them, so the
/// request would address a different resource.
pub(crate) fn validate_segment(what: &str, value: &str) -> Result<()> {
    match value {
        "" => Err(Error::InvalidArgument(format!("{what} must not be empty"))),
        "." | ".." => Err(Error::InvalidArgument(format!(
            "{what} must not be \"{value}\""
        ))),
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// MultiMutationResult
// ---------------------------------------------------------------------------

/// Per-key outcomes of [`Collection::upsert_multi`], ordered by key.
#[derive(Debug, Default)]
pub struct MultiMutationResult {
    results: BTreeMap<String, Result<MutationResult>>,
}

impl MultiMutationResult {
    /// Outcome for a single key.
    pub fn get(&self, key: &str) -> Option<&Result<MutationResult>> {
        self.results.get(key)
    }

    /// Iterate over `(key, outcome)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Result<MutationResult>)> {
        self.results.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of distinct keys attempted.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Whether no keys were attempted.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Whether every key was stored successfully.
    pub fn is_all_ok(&self) -> bool {
        self.results.values().all(|r| r.is_ok())
    }

    /// Collapse into the successful results, or the first error in key order.
    pub fn into_result(self) -> Result<BTreeMap<String, MutationResult>> {
        self.results
            .into_iter()
            .map(|(key, outcome)| outcome.map(|ok| (key, ok)))
            .collect()
    }
}

impl IntoIterator for MultiMutationResult {
    type Item = (String, Result<MutationResult>);
    type IntoIter = std::collections::btree_map::IntoIter<String, Result<MutationResult>>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}
