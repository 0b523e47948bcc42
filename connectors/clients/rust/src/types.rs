// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>

//! Result and wire types for the docstart client SDK.
//!
//! The public result types ([`MutationResult`], [`GetResult`]) are what SDK
//! callers see. The remaining types mirror the JSON bodies of the cluster's
//! HTTP surface and are deserialized transparently by the transport.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Result;

// ---------------------------------------------------------------------------
// Key-value results
// ---------------------------------------------------------------------------

/// Acknowledgement of a successful mutation (upsert, insert, replace, remove).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationResult {
    /// Key of the mutated document.
    #[serde(rename = "id")]
    pub key: String,
    /// CAS value assigned by the cluster to this mutation.
    pub cas: u64,
}

/// A document fetched by key.
#[derive(Debug, Clone, PartialEq)]
pub struct GetResult {
    /// Key of the document.
    pub key: String,
    /// CAS value of the stored revision.
    pub cas: u64,
    /// Raw JSON content.
    pub content: serde_json::Value,
}

impl GetResult {
    /// Decode the document content into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::Serialization`] if the stored JSON does
    /// not match `T`.
    pub fn content_as<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(T::deserialize(&self.content)?)
    }

    /// Consume the result, returning the raw JSON content.
    pub fn into_content(self) -> serde_json::Value {
        self.content
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Structured error body returned by the cluster on non-2xx responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable message.
    pub error: String,
    /// HTTP status code, echoed in the body.
    pub code: u16,
    /// Machine-readable reason (`bucket_not_found`, `document_not_found`, ...).
    #[serde(default)]
    pub reason: Option<String>,
}

/// Body of `GET /pools`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolsInfo {
    /// Version string reported by the cluster.
    pub implementation_version: String,
}

/// Body of `GET /pools/default/buckets/{name}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketInfo {
    /// Bucket name.
    pub name: String,
    /// Number of documents across all collections of the bucket.
    pub item_count: u64,
}

/// Document metadata carried alongside the content on reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct DocumentMeta {
    pub id: String,
    pub cas: u64,
}

/// Body of `GET .../docs/{key}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct DocumentResponse {
    pub meta: DocumentMeta,
    pub json: serde_json::Value,
}

impl From<DocumentResponse> for GetResult {
    fn from(doc: DocumentResponse) -> Self {
        Self {
            key: doc.meta.id,
            cas: doc.meta.cas,
            content: doc.json,
        }
    }
}
