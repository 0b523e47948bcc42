// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>

//! Cluster connection, authentication, and options.
//!
//! [`Cluster::connect`] is the entry point of the SDK. It resolves the
//! connection string, authenticates once against the management service, and
//! returns a cheap-to-clone handle from which buckets are opened and queries
//! are issued.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use tracing::info;

use crate::bucket::Bucket;
use crate::client::{HttpTransport, Service};
use crate::collection::validate_segment;
use crate::connstr::ConnectionString;
use crate::error::Result;
use crate::query::{QueryOptions, QueryResult};
use crate::types::{BucketInfo, PoolsInfo};

/// Default timeout for key-value and management requests.
pub const DEFAULT_KV_TIMEOUT: Duration = Duration::from_millis(2500);
/// Default timeout for query requests.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(75);
/// Default timeout for establishing a TCP/TLS connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// PasswordAuthenticator
// ---------------------------------------------------------------------------

/// Username / password credentials sent with every request.
#[derive(Clone)]
pub struct PasswordAuthenticator {
    username: String,
    password: String,
}

impl PasswordAuthenticator {
    /// Create an authenticator from a username and password.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// The username.
    pub fn username(&self) -> &str {
        &self.username
    }

    pub(crate) fn password(&self) -> &str {
        &self.password
    }
}

// The password never appears in logs.
impl fmt::Debug for PasswordAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordAuthenticator")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ClusterOptions
// ---------------------------------------------------------------------------

/// Options for [`Cluster::connect`].
#[derive(Debug, Clone)]
pub struct ClusterOptions {
    pub(crate) authenticator: PasswordAuthenticator,
    pub(crate) kv_timeout: Duration,
    pub(crate) query_timeout: Duration,
    pub(crate) connect_timeout: Duration,
}

impl ClusterOptions {
    /// Options with the given credentials and default timeouts.
    pub fn new(authenticator: PasswordAuthenticator) -> Self {
        Self {
            authenticator,
            kv_timeout: DEFAULT_KV_TIMEOUT,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Timeout for key-value and management requests.
    pub fn kv_timeout(mut self, timeout: Duration) -> Self {
        self.kv_timeout = timeout;
        self
    }

    /// Default timeout for query requests.
    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Timeout for establishing connections.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

// ---------------------------------------------------------------------------
// Cluster
// ---------------------------------------------------------------------------

/// A connected, authenticated cluster handle.
///
/// # Examples
///
/// ```rust,no_run
/// use docstart_client::{Cluster, ClusterOptions, PasswordAuthenticator};
///
/// # #[tokio::main]
/// # async fn main() -> docstart_client::Result<()> {
/// let options = ClusterOptions::new(PasswordAuthenticator::new("Administrator", "password"));
/// let cluster = Cluster::connect("couchbase://localhost", options).await?;
/// let bucket = cluster.bucket("default").await?;
/// println!("opened {}", bucket.name());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Cluster {
    transport: Arc<HttpTransport>,
    connstr: ConnectionString,
    version: String,
}

impl Cluster {
    /// Connect and authenticate against the cluster at `connection_string`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`](crate::Error::InvalidArgument) if the connection string is malformed.
    /// - [`Error::AuthenticationFailure`](crate::Error::AuthenticationFailure) if the credentials are rejected.
    /// - [`Error::Network`](crate::Error::Network) / [`Error::Timeout`](crate::Error::Timeout) if the cluster is unreachable.
    pub async fn connect(connection_string: &str, options: ClusterOptions) -> Result<Self> {
        let connstr = ConnectionString::parse(connection_string)?;
        let transport = HttpTransport::new(&connstr, &options)?;

        let url = transport.url(Service::Management, ["pools"])?;
        let pools: PoolsInfo = transport.get(Service::Management, url).await?;

        info!(
            cluster = %connstr,
            user = options.authenticator.username(),
            version = %pools.implementation_version,
            "connected to cluster"
        );

        Ok(Self {
            transport: Arc::new(transport),
            connstr,
            version: pools.implementation_version,
        })
    }

    /// The parsed connection string this cluster was opened with.
    pub fn connection_string(&self) -> &ConnectionString {
        &self.connstr
    }

    /// Version string reported by the cluster during bootstrap.
    pub fn server_version(&self) -> &str {
        &self.version
    }

    /// Open a bucket by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BucketNotFound`](crate::Error::BucketNotFound) if the cluster has no such bucket.
    pub async fn bucket(&self, name: &str) -> Result<Bucket> {
        validate_segment("bucket name", name)?;

        let url = self
            .transport
            .url(Service::Management, ["pools", "default", "buckets", name])?;
        let info: BucketInfo = self.transport.get(Service::Management, url).await?;

        info!(bucket = %info.name, items = info.item_count, "opened bucket");
        Ok(Bucket::new(Arc::clone(&self.transport), info.name))
    }

    /// Execute a query statement.
    ///
    /// The full result set is received before this returns; rows are then
    /// drained with [`QueryResult::rows`].
    ///
    /// # Errors
    ///
    /// - [`Error::ParsingFailure`](crate::Error::ParsingFailure) for a syntactically invalid statement.
    /// - [`Error::KeyspaceNotFound`](crate::Error::KeyspaceNotFound) if the statement names an unknown keyspace.
    /// - [`Error::Query`](crate::Error::Query) for any other failure reported by the query service.
    pub async fn query(&self, statement: &str, options: QueryOptions) -> Result<QueryResult> {
        let timeout = options
            .timeout
            .unwrap_or_else(|| self.transport.timeout_for(Service::Query));
        let body = options.into_request_body(statement, timeout)?;

        let url = self.transport.url(Service::Query, ["query", "service"])?;
        let builder = self
            .transport
            .request(Method::POST, Service::Query, url)
            .timeout(timeout)
            .json(&body);
        let response = self.transport.send(builder, timeout).await?;

        QueryResult::from_response(response, timeout).await
    }
}
