// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>

//! Error types for the docstart client SDK.
//!
//! All fallible operations in this crate return [`Result<T>`], an alias for
//! `std::result::Result<T, Error>`. The SDK does not retry or recover: every
//! failure reported by the cluster is surfaced to the caller as one of the
//! variants below.

use thiserror::Error;

/// Error type for docstart client operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The cluster rejected the supplied username / password.
    #[error("Authentication failure: {0}")]
    AuthenticationFailure(String),

    /// The named bucket does not exist on the cluster.
    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    /// No document is stored under the requested key.
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    /// An insert targeted a key that already holds a document.
    #[error("Document exists: {0}")]
    DocumentExists(String),

    /// The query service could not parse the statement.
    #[error("Parsing failure: {0}")]
    ParsingFailure(String),

    /// The statement referenced a bucket, scope, or collection that is unknown.
    #[error("Keyspace not found: {0}")]
    KeyspaceNotFound(String),

    /// Any other error reported by the query service.
    #[error("Query error {code}: {message}")]
    Query {
        /// Service-specific error code.
        code: u32,
        /// Human-readable error message.
        message: String,
    },

    /// The request was rejected locally before being sent.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The request exceeded the configured timeout.
    #[error("Timeout after {0}ms")]
    Timeout(u64),

    /// An underlying HTTP / network transport error from `reqwest`.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The cluster answered with an HTTP error status not covered above.
    #[error("Server error ({status}): {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Message extracted from the response body.
        message: String,
    },
}

/// Crate-level result alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
