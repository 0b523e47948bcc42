// SPDX-License-Identifier: PMPL-1.0-or-later
//! docstart server
//!
//! In-memory development cluster. Serves the management, key-value and
//! query HTTP surface the docstart client speaks, backed by a
//! [`store::DocumentStore`].

pub mod auth;
pub mod query;
pub mod store;

use axum::{
    extract::{
        rejection::{FormRejection, JsonRejection},
        Path, State,
    },
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{info, instrument, warn};

use crate::auth::{auth_middleware, AuthState};
use crate::query::{Parameters, QueryError};
use crate::store::{BucketSummary, DocumentStore, Keyspace, StoreError, WriteMode};

/// Error code reported when a query request carries no statement.
pub const MISSING_STATEMENT: u32 = 1050;
/// Error code reported when a query exceeds its timeout.
pub const QUERY_TIMEOUT: u32 = 1080;

/// API errors
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BucketNotFound(String),

    #[error("{0}")]
    DocumentNotFound(String),

    #[error("{0}")]
    DocumentExists(String),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let message = err.to_string();
        match err {
            StoreError::BucketNotFound(_) => ApiError::BucketNotFound(message),
            StoreError::DocumentNotFound(_) => ApiError::DocumentNotFound(message),
            StoreError::DocumentExists(_) => ApiError::DocumentExists(message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, reason) = match &self {
            ApiError::BucketNotFound(_) => (StatusCode::NOT_FOUND, "bucket_not_found"),
            ApiError::DocumentNotFound(_) => (StatusCode::NOT_FOUND, "document_not_found"),
            ApiError::DocumentExists(_) => (StatusCode::CONFLICT, "document_exists"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
        };

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: status.as_u16(),
            reason: reason.to_string(),
        });

        (status, body).into_response()
    }
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
    pub reason: String,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port of the management and key-value service
    pub management_port: u16,
    /// Port of the query service
    pub query_port: u16,
    /// Administrator username
    pub username: String,
    /// Administrator password
    #[serde(skip_serializing)]
    pub password: String,
    /// Buckets created at startup
    pub buckets: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            management_port: 8091,
            query_port: 8093,
            username: "Administrator".to_string(),
            password: "password".to_string(),
            buckets: vec!["default".to_string()],
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `DOCSTART_HOST`, `DOCSTART_MANAGEMENT_PORT`,
    /// `DOCSTART_QUERY_PORT`, `DOCSTART_USERNAME`, `DOCSTART_PASSWORD` and
    /// `DOCSTART_BUCKETS` (comma separated).
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(host) = lookup("DOCSTART_HOST") {
            config.host = host;
        }
        for (var, port) in [
            ("DOCSTART_MANAGEMENT_PORT", &mut config.management_port),
            ("DOCSTART_QUERY_PORT", &mut config.query_port),
        ] {
            if let Some(raw) = lookup(var) {
                match raw.parse() {
                    Ok(value) => *port = value,
                    Err(_) => warn!(var, value = %raw, "ignoring invalid port"),
                }
            }
        }
        if let Some(username) = lookup("DOCSTART_USERNAME") {
            config.username = username;
        }
        if let Some(password) = lookup("DOCSTART_PASSWORD") {
            config.password = password;
        }
        if let Some(buckets) = lookup("DOCSTART_BUCKETS") {
            config.buckets = buckets
                .split(',')
                .map(str::trim)
                .filter(|b| !b.is_empty())
                .map(String::from)
                .collect();
        }

        config
    }
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
}

/// `GET /pools` response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolsResponse {
    pub implementation_version: String,
    pub is_admin_creds: bool,
}

/// Stored document as returned by a key-value get
#[derive(Debug, Serialize, Deserialize)]
pub struct DocumentResponse {
    pub meta: DocumentMeta,
    pub json: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub id: String,
    pub cas: u64,
}

/// Form body of a key-value mutation
#[derive(Debug, Deserialize)]
pub struct MutationForm {
    /// Document body as JSON text
    pub value: String,
    #[serde(default)]
    pub mode: WriteMode,
}

/// Query problem entry
#[derive(Debug, Serialize, Deserialize)]
pub struct QueryProblem {
    pub code: u32,
    pub msg: String,
}

/// Query execution metrics
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryMetrics {
    pub elapsed_time: String,
    pub execution_time: String,
    pub result_count: u64,
    pub result_size: u64,
    pub error_count: u64,
    pub warning_count: u64,
}

/// `POST /query/service` response
#[derive(Debug, Serialize, Deserialize)]
pub struct QueryResponse {
    #[serde(rename = "requestID")]
    pub request_id: String,
    #[serde(rename = "clientContextID")]
    pub client_context_id: String,
    pub results: Vec<Value>,
    pub status: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub errors: Vec<QueryProblem>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub warnings: Vec<QueryProblem>,
    pub metrics: QueryMetrics,
}

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<DocumentStore>,
    pub auth: AuthState,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            store: Arc::new(DocumentStore::new(config.buckets.iter().cloned())),
            auth: AuthState::new(&config.username, &config.password),
            start_time: Instant::now(),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(&ServerConfig::default())
    }
}

/// Build the server router
pub fn build_router(state: AppState) -> Router {
    let docs = "/pools/default/buckets/{bucket}/scopes/{scope}/collections/{collection}/docs/{key}";

    Router::new()
        .route("/health", get(health_handler))
        // Management
        .route("/pools", get(pools_handler))
        .route("/pools/default/buckets", get(list_buckets_handler))
        .route("/pools/default/buckets/{bucket}", get(get_bucket_handler))
        // Key-value
        .route(
            docs,
            get(get_document_handler)
                .post(mutate_document_handler)
                .delete(remove_document_handler),
        )
        // Query
        .route("/query/service", post(query_handler))
        .layer(middleware::from_fn_with_state(
            state.auth.clone(),
            auth_middleware,
        ))
        .with_state(state)
}

/// Health check handler
#[instrument(skip(state))]
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

#[instrument]
async fn pools_handler() -> Json<PoolsResponse> {
    Json(PoolsResponse {
        implementation_version: format!("{}-docstart", env!("CARGO_PKG_VERSION")),
        is_admin_creds: true,
    })
}

#[instrument(skip(state))]
async fn list_buckets_handler(State(state): State<AppState>) -> Json<Vec<BucketSummary>> {
    Json(state.store.list_buckets().await)
}

#[instrument(skip(state))]
async fn get_bucket_handler(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
) -> Result<Json<BucketSummary>, ApiError> {
    Ok(Json(state.store.bucket(&bucket).await?))
}

#[instrument(skip(state))]
async fn get_document_handler(
    State(state): State<AppState>,
    Path((bucket, scope, collection, key)): Path<(String, String, String, String)>,
) -> Result<Json<DocumentResponse>, ApiError> {
    let keyspace = Keyspace::new(bucket, scope, collection);
    let doc = state.store.get(&keyspace, &key).await?;

    Ok(Json(DocumentResponse {
        meta: DocumentMeta { id: key, cas: doc.cas },
        json: doc.value,
    }))
}

#[instrument(skip(state, form))]
async fn mutate_document_handler(
    State(state): State<AppState>,
    Path((bucket, scope, collection, key)): Path<(String, String, String, String)>,
    form: Result<Form<MutationForm>, FormRejection>,
) -> Result<Json<DocumentMeta>, ApiError> {
    let Form(form) = form.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let value: Value = serde_json::from_str(&form.value)
        .map_err(|e| ApiError::BadRequest(format!("value is not valid JSON: {e}")))?;

    let keyspace = Keyspace::new(bucket, scope, collection);
    let cas = state.store.write(&keyspace, &key, value, form.mode).await?;

    Ok(Json(DocumentMeta { id: key, cas }))
}

#[instrument(skip(state))]
async fn remove_document_handler(
    State(state): State<AppState>,
    Path((bucket, scope, collection, key)): Path<(String, String, String, String)>,
) -> Result<Json<DocumentMeta>, ApiError> {
    let keyspace = Keyspace::new(bucket, scope, collection);
    let cas = state.store.remove(&keyspace, &key).await?;

    Ok(Json(DocumentMeta { id: key, cas }))
}

/// Query service handler
///
/// Failures are reported in the `errors` array with `status: "errors"`, as
/// well as through the HTTP status.
#[instrument(skip(state, body))]
async fn query_handler(
    State(state): State<AppState>,
    body: Result<Json<Map<String, Value>>, JsonRejection>,
) -> Result<(StatusCode, Json<QueryResponse>), ApiError> {
    let Json(body) = body.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let started = Instant::now();
    let client_context_id = body
        .get("client_context_id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let outcome = match body.get("statement").and_then(Value::as_str) {
        Some(statement) => {
            let params = Parameters::from_request(&body);
            let timeout = body
                .get("timeout")
                .and_then(Value::as_str)
                .and_then(parse_duration);
            info!(%statement, context = %client_context_id, "executing query");
            run_query(&state.store, statement, &params, timeout).await
        }
        None => Err(QueryError {
            code: MISSING_STATEMENT,
            message: "No statement or prepared value".to_string(),
        }),
    };

    let elapsed = format!("{:?}", started.elapsed());
    let (status, results, errors) = match outcome {
        Ok(rows) => (StatusCode::OK, rows, Vec::new()),
        Err(err) => {
            warn!(code = err.code, error = %err.message, "query failed");
            let status = match err.code {
                query::KEYSPACE_NOT_FOUND => StatusCode::NOT_FOUND,
                query::EVALUATION_ERROR | QUERY_TIMEOUT => StatusCode::INTERNAL_SERVER_ERROR,
                _ => StatusCode::BAD_REQUEST,
            };
            let problem = QueryProblem {
                code: err.code,
                msg: err.message,
            };
            (status, Vec::new(), vec![problem])
        }
    };

    let result_size = serde_json::to_vec(&results).map(|v| v.len() as u64).unwrap_or(0);
    let response = QueryResponse {
        request_id: uuid::Uuid::new_v4().to_string(),
        client_context_id,
        status: if errors.is_empty() { "success" } else { "errors" }.to_string(),
        metrics: QueryMetrics {
            elapsed_time: elapsed.clone(),
            execution_time: elapsed,
            result_count: results.len() as u64,
            result_size,
            error_count: errors.len() as u64,
            warning_count: 0,
        },
        results,
        errors,
        warnings: Vec::new(),
    };

    Ok((status, Json(response)))
}

async fn run_query(
    store: &DocumentStore,
    statement: &str,
    params: &Parameters,
    timeout: Option<Duration>,
) -> Result<Vec<Value>, QueryError> {
    with_deadline(query::execute(store, statement, params), timeout).await
}

/// Await `execution`, failing with [`QUERY_TIMEOUT`] once `timeout` elapses.
async fn with_deadline<F>(
    execution: F,
    timeout: Option<Duration>,
) -> Result<Vec<Value>, QueryError>
where
    F: Future<Output = Result<Vec<Value>, QueryError>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, execution)
            .await
            .map_err(|_| QueryError {
                code: QUERY_TIMEOUT,
                message: format!("Timeout {limit:?} exceeded"),
            })?,
        None => execution.await,
    }
}

/// Parse a duration such as `"75000ms"`, `"75s"` or `"1m"`.
fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let split = raw.find(|c: char| !c.is_ascii_digit())?;
    let (amount, unit) = raw.split_at(split);
    let amount: u64 = amount.parse().ok()?;
    match unit {
        "ms" => Some(Duration::from_millis(amount)),
        "s" => Some(Duration::from_secs(amount)),
        "m" => amount.checked_mul(60).map(Duration::from_secs),
        _ => None,
    }
}

/// Serve the router on an already bound listener.
pub async fn serve_listener(listener: TcpListener, state: AppState) -> Result<(), std::io::Error> {
    let app = build_router(state);
    axum::serve(listener, app).await
}

/// Start the server on the management and query ports.
pub async fn serve(config: ServerConfig) -> Result<(), std::io::Error> {
    let state = AppState::new(&config);

    let management_addr = format!("{}:{}", config.host, config.management_port);
    let management = TcpListener::bind(&management_addr).await?;
    info!(addr = %management_addr, buckets = ?config.buckets, "management service listening");

    if config.query_port == config.management_port {
        return serve_listener(management, state).await;
    }

    let query_addr = format!("{}:{}", config.host, config.query_port);
    let query = TcpListener::bind(&query_addr).await?;
    info!(addr = %query_addr, "query service listening");

    tokio::try_join!(
        serve_listener(management, state.clone()),
        serve_listener(query, state),
    )?;
    Ok(())
}
