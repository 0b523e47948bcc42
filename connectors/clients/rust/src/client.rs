// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>

//! HTTP transport shared by every handle derived from a cluster.
//!
//! [`HttpTransport`] owns the service endpoints, the pooled `reqwest` client,
//! the credentials, and the per-service timeouts. [`crate::cluster::Cluster`],
//! [`crate::bucket::Bucket`] and [`crate::collection::Collection`] hold it
//! behind an `Arc` and delegate every request to it.

use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::cluster::{ClusterOptions, PasswordAuthenticator};
use crate::connstr::ConnectionString;
use crate::error::{Error, Result};
use crate::types::ErrorResponse;

/// Which service a request is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Service {
    /// Cluster management and key-value document operations.
    Management,
    /// The query service.
    Query,
}

/// Shared HTTP transport.
#[derive(Debug)]
pub(crate) struct HttpTransport {
    /// Base URL of the management / key-value service.
    management: Url,
    /// Base URL of the query service.
    query: Url,
    /// Underlying `reqwest` HTTP client (connection-pooled, TLS-capable).
    http: reqwest::Client,
    /// Credentials attached to every request.
    auth: PasswordAuthenticator,
    kv_timeout: Duration,
    query_timeout: Duration,
}

impl HttpTransport {
    /// Build a transport for the given connection string and options.
    pub(crate) fn new(connstr: &ConnectionString, options: &ClusterOptions) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(options.connect_timeout)
            .build()
            .map_err(Error::Network)?;

        Ok(Self {
            management: connstr.management_endpoint()?,
            query: connstr.query_endpoint()?,
            http,
            auth: options.authenticator.clone(),
            kv_timeout: options.kv_timeout,
            query_timeout: options.query_timeout,
        })
    }

    /// Timeout applied to requests sent to `service`.
    pub(crate) fn timeout_for(&self, service: Service) -> Duration {
        match service {
            Service::Management => self.kv_timeout,
            Service::Query => self.query_timeout,
        }
    }

    /// Build a URL on `service` from raw path segments.
    ///
    /// Each segment is percent-encoded, so document keys containing `/`, `?`
    /// or spaces address exactly one document. The dot-segments `.` and `..`
    /// are rejected by callers, since URL normalization would drop them.
    pub(crate) fn url<I, S>(&self, service: Service, segments: I) -> Result<Url>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut url = match service {
            Service::Management => self.management.clone(),
            Service::Query => self.query.clone(),
        };
        let base = url.to_string();
        url.path_segments_mut()
            .map_err(|()| Error::InvalidArgument(format!("'{base}' cannot be a base URL")))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Start a request with credentials and the per-service timeout applied.
    pub(crate) fn request(&self, method: Method, service: Service, url: Url) -> RequestBuilder {
        debug!(%method, %url, ?service, "sending request");
        self.http
            .request(method, url)
            .basic_auth(self.auth.username(), Some(self.auth.password()))
            .timeout(self.timeout_for(service))
    }

    /// Send a request and deserialize a successful JSON response.
    pub(crate) async fn send_json<T: DeserializeOwned>(
        &self,
        service: Service,
        builder: RequestBuilder,
    ) -> Result<T> {
        let timeout = self.timeout_for(service);
        let response = self.send(builder, timeout).await?;
        let status = response.status();

        if status.is_success() {
            let body = response.text().await.map_err(|e| transport_error(e, timeout))?;
            serde_json::from_str(&body).map_err(Error::Serialization)
        } else {
            Err(self.extract_error(status, response).await)
        }
    }

    /// GET `url` and deserialize the JSON body.
    pub(crate) async fn get<T: DeserializeOwned>(&self, service: Service, url: Url) -> Result<T> {
        let builder = self.request(Method::GET, service, url);
        self.send_json(service, builder).await
    }

    /// POST a form-encoded body and deserialize the JSON response.
    pub(crate) async fn post_form<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        service: Service,
        url: Url,
        body: &B,
    ) -> Result<T> {
        let builder = self.request(Method::POST, service, url).form(body);
        self.send_json(service, builder).await
    }

    /// DELETE `url` and deserialize the JSON response.
    pub(crate) async fn delete<T: DeserializeOwned>(&self, service: Service, url: Url) -> Result<T> {
        let builder = self.request(Method::DELETE, service, url);
        self.send_json(service, builder).await
    }

    /// Send a request, mapping transport failures onto [`Error`].
    ///
    /// `timeout` is the deadline the builder was given; it is reported back in
    /// [`Error::Timeout`] when the request runs out of time.
    pub(crate) async fn send(&self, builder: RequestBuilder, timeout: Duration) -> Result<Response> {
        builder.send().await.map_err(|e| transport_error(e, timeout))
    }

    /// Turn a non-2xx response into the appropriate [`Error`] variant.
    pub(crate) async fn extract_error(&self, status: StatusCode, response: Response) -> Error {
        let code = status.as_u16();

        let body = match response.json::<ErrorResponse>().await {
            Ok(body) => body,
            Err(_) => ErrorResponse {
                error: format!("HTTP {code}"),
                code,
                reason: None,
            },
        };

        match (code, body.reason.as_deref()) {
            (401 | 403, _) => Error::AuthenticationFailure(body.error),
            (_, Some("bucket_not_found")) => Error::BucketNotFound(body.error),
            (_, Some("document_not_found")) => Error::DocumentNotFound(body.error),
            (_, Some("document_exists")) => Error::DocumentExists(body.error),
            (_, Some("bad_request")) => Error::InvalidArgument(body.error),
            _ => Error::Server {
                status: code,
                message: body.error,
            },
        }
    }
}

pub(crate) fn transport_error(err: reqwest::Error, timeout: Duration) -> Error {
    if err.is_timeout() {
        Error::Timeout(timeout.as_millis() as u64)
    } else {
        Error::Network(err)
    }
}
