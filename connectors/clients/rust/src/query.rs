// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>

//! Parameterized query execution.
//!
//! A statement is sent to `POST /query/service` together with its named
//! (`$name`) and positional (`$1`, `$2`, ...) parameters. The response rows
//! are buffered in a [`QueryResult`] and handed out once through
//! [`QueryResult::rows`].

use std::marker::PhantomData;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::client::transport_error;
use crate::error::{Error, Result};

/// Query error code reported for keyspaces that do not exist.
pub const KEYSPACE_NOT_FOUND_CODE: u32 = 12003;

// ---------------------------------------------------------------------------
// QueryOptions
// ---------------------------------------------------------------------------

/// Consistency requirement for index scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryScanConsistency {
    /// Return whatever the indexes hold now.
    #[default]
    NotBounded,
    /// Wait until all mutations made before the request are indexed.
    RequestPlus,
}

/// Options for [`crate::cluster::Cluster::query`].
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    named: Map<String, Value>,
    positional: Vec<Value>,
    client_context_id: Option<String>,
    scan_consistency: Option<QueryScanConsistency>,
    readonly: Option<bool>,
    pub(crate) timeout: Option<Duration>,
    /// First parameter that failed to serialize, reported when the query runs.
    invalid: Option<String>,
}

impl QueryOptions {
    /// Empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a named parameter. The leading `$` is optional.
    pub fn named_parameter<T: Serialize>(mut self, name: &str, value: T) -> Self {
        let name = name.trim_start_matches('$');
        let value = self.encode(name, value);
        self.named.insert(format!("${name}"), value);
        self
    }

    /// Append a positional parameter (`$1`, `$2`, ... in bind order).
    pub fn positional_parameter<T: Serialize>(mut self, value: T) -> Self {
        let label = format!("{}", self.positional.len() + 1);
        let value = self.encode(&label, value);
        self.positional.push(value);
        self
    }

    fn encode<T: Serialize>(&mut self, label: &str, value: T) -> Value {
        serde_json::to_value(value).unwrap_or_else(|e| {
            self.invalid
                .get_or_insert_with(|| format!("parameter ${label} is not valid JSON: {e}"));
            Value::Null
        })
    }

    /// Caller-chosen id echoed back in the response. A UUID is generated
    /// when none is set.
    pub fn client_context_id(mut self, id: impl Into<String>) -> Self {
        self.client_context_id = Some(id.into());
        self
    }

    /// Index scan consistency.
    pub fn scan_consistency(mut self, consistency: QueryScanConsistency) -> Self {
        self.scan_consistency = Some(consistency);
        self
    }

    /// Ask the service to reject statements that would mutate data.
    pub fn readonly(mut self, readonly: bool) -> Self {
        self.readonly = Some(readonly);
        self
    }

    /// Per-request timeout, overriding the cluster's query timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the JSON request body.
    pub(crate) fn into_request_body(self, statement: &str, timeout: Duration) -> Result<Value> {
        if statement.trim().is_empty() {
            return Err(Error::InvalidArgument("query statement must not be empty".to_string()));
        }
        if let Some(invalid) = self.invalid {
            return Err(Error::InvalidArgument(invalid));
        }

        let mut body = self.named;
        body.insert("statement".to_string(), Value::String(statement.to_string()));
        if !self.positional.is_empty() {
            body.insert("args".to_string(), Value::Array(self.positional));
        }
        let context_id = self
            .client_context_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        body.insert("client_context_id".to_string(), Value::String(context_id));
        if let Some(consistency) = self.scan_consistency {
            body.insert("scan_consistency".to_string(), serde_json::to_value(consistency)?);
        }
        if let Some(readonly) = self.readonly {
            body.insert("readonly".to_string(), Value::Bool(readonly));
        }
        body.insert(
            "timeout".to_string(),
            Value::String(format!("{}ms", timeout.as_millis())),
        );
        Ok(Value::Object(body))
    }
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// Overall status of a query request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    /// The statement ran to completion.
    Success,
    /// The statement is still running (streaming responses only).
    Running,
    /// The statement failed with errors.
    Errors,
    /// The service failed to run the statement at all.
    Fatal,
    /// The request timed out on the server.
    Timeout,
    /// The request was stopped.
    Stopped,
    /// Any status this SDK does not know about.
    #[serde(other)]
    Unknown,
}

/// An error or warning reported by the query service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryProblem {
    /// Numeric code.
    pub code: u32,
    /// Message.
    pub msg: String,
}

/// Execution metrics reported by the query service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryMetrics {
    /// Wall-clock time the request took, as formatted by the server.
    pub elapsed_time: String,
    /// Time spent executing the statement.
    pub execution_time: String,
    /// Number of result rows.
    pub result_count: u64,
    /// Size of the result in bytes.
    pub result_size: u64,
    /// Number of errors.
    pub error_count: u64,
    /// Number of warnings.
    pub warning_count: u64,
}

/// Metadata about a completed query.
#[derive(Debug, Clone)]
pub struct QueryMetaData {
    /// Server-assigned request id.
    pub request_id: String,
    /// Client context id echoed from the request.
    pub client_context_id: String,
    /// Final status.
    pub status: QueryStatus,
    /// Execution metrics, when reported.
    pub metrics: Option<QueryMetrics>,
    /// Warnings raised while running the statement.
    pub warnings: Vec<QueryProblem>,
}

/// Wire shape of a query response.
#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(rename = "requestID", default)]
    request_id: String,
    #[serde(rename = "clientContextID", default)]
    client_context_id: String,
    #[serde(default)]
    results: Vec<Value>,
    status: QueryStatus,
    #[serde(default)]
    errors: Vec<QueryProblem>,
    #[serde(default)]
    warnings: Vec<QueryProblem>,
    #[serde(default)]
    metrics: Option<QueryMetrics>,
}

/// The outcome of a successful query.
#[derive(Debug)]
pub struct QueryResult {
    rows: Vec<Value>,
    meta: QueryMetaData,
}

impl QueryResult {
    /// Decode a query-service response, turning reported errors into [`Error`].
    pub(crate) async fn from_response(response: reqwest::Response, timeout: Duration) -> Result<Self> {
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| transport_error(e, timeout))?;

        let parsed: QueryResponse = match serde_json::from_slice(&body) {
            Ok(parsed) => parsed,
            Err(e) if status.is_success() => return Err(Error::Serialization(e)),
            // Not a query-service body: fall back to generic HTTP handling.
            Err(_) => return Err(http_error(status, &body)),
        };

        if let Some(problem) = parsed.errors.first() {
            return Err(problem_to_error(problem));
        }
        if parsed.status != QueryStatus::Success {
            return Err(Error::Query {
                code: 0,
                message: format!("query finished with status {:?}", parsed.status),
            });
        }

        for warning in &parsed.warnings {
            warn!(code = warning.code, msg = %warning.msg, "query warning");
        }
        debug!(
            request_id = %parsed.request_id,
            rows = parsed.results.len(),
            "query completed"
        );

        Ok(Self {
            rows: parsed.results,
            meta: QueryMetaData {
                request_id: parsed.request_id,
                client_context_id: parsed.client_context_id,
                status: parsed.status,
                metrics: parsed.metrics,
                warnings: parsed.warnings,
            },
        })
    }

    /// Drain the result rows, decoding each one into `T`.
    ///
    /// Rows are handed out exactly once: a second call yields an empty
    /// iterator.
    pub fn rows<T: DeserializeOwned>(&mut self) -> QueryRows<T> {
        QueryRows {
            inner: std::mem::take(&mut self.rows).into_iter(),
            _marker: PhantomData,
        }
    }

    /// Metadata about the completed request.
    pub fn meta_data(&self) -> &QueryMetaData {
        &self.meta
    }
}

/// Iterator over decoded query rows.
#[derive(Debug)]
pub struct QueryRows<T> {
    inner: std::vec::IntoIter<Value>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Iterator for QueryRows<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .next()
            .map(|row| serde_json::from_value(row).map_err(Error::from))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T: DeserializeOwned> ExactSizeIterator for QueryRows<T> {}

/// Map a query-service error onto the SDK's error variants.
fn problem_to_error(problem: &QueryProblem) -> Error {
    match problem.code {
        3000..=3999 => Error::ParsingFailure(problem.msg.clone()),
        KEYSPACE_NOT_FOUND_CODE => Error::KeyspaceNotFound(problem.msg.clone()),
        code => Error::Query {
            code,
            message: problem.msg.clone(),
        },
    }
}

fn http_error(status: reqwest::StatusCode, body: &[u8]) -> Error {
    let message = String::from_utf8_lossy(body).into_owned();
    match status.as_u16() {
        401 | 403 => Error::AuthenticationFailure(message),
        code => Error::Server {
            status: code,
            message,
        },
    }
}
