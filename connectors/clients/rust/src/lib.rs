// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>

//! # docstart Client SDK
//!
//! A Rust client library for document-database clusters: connect and
//! authenticate, open buckets and collections, store and fetch JSON documents
//! by key, and run parameterized queries.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docstart_client::{Cluster, ClusterOptions, PasswordAuthenticator, QueryOptions};
//! use serde_json::{json, Value};
//!
//! #[tokio::main]
//! async fn main() -> docstart_client::Result<()> {
//!     let options = ClusterOptions::new(PasswordAuthenticator::new("Administrator", "password"));
//!     let cluster = Cluster::connect("couchbase://localhost", options).await?;
//!     let collection = cluster.bucket("default").await?.default_collection();
//!
//!     collection.upsert("greeting", &json!({"text": "hello", "type": "note"})).await?;
//!     let doc = collection.get("greeting").await?;
//!     println!("{}", doc.content);
//!
//!     let mut result = cluster
//!         .query(
//!             "SELECT * FROM `default` WHERE type = $type",
//!             QueryOptions::new().named_parameter("type", "note"),
//!         )
//!         .await?;
//!     for row in result.rows::<Value>() {
//!         println!("{}", row?);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`cluster`]: Connection, authentication, timeouts, and query entry point.
//! - [`bucket`]: Bucket and scope handles.
//! - [`collection`]: Key-value document operations.
//! - [`query`]: Query options, result rows, and metadata.
//! - [`connstr`]: Connection string parsing.
//! - [`types`]: Result and wire types.
//! - [`error`]: Error types and the crate-level `Result` alias.

pub mod bucket;
mod client;
pub mod cluster;
pub mod collection;
pub mod connstr;
pub mod error;
pub mod query;
pub mod types;

pub use bucket::{Bucket, Scope};
pub use cluster::{Cluster, ClusterOptions, PasswordAuthenticator};
pub use collection::{Collection, MultiMutationResult};
pub use error::{Error, Result};
pub use query::{QueryMetaData, QueryOptions, QueryResult, QueryScanConsistency};
pub use types::{GetResult, MutationResult};
