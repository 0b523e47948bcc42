// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>

//! Connection string parsing.
//!
//! Two families of connection strings are accepted:
//!
//! - `couchbase://host[:port][,host...]` / `couchbases://...`: the
//!   management/key-value service and the query service live on separate
//!   well-known ports of the same host.
//! - `http://host:port` / `https://host:port`: a single endpoint serves every
//!   service, as the development server and HTTP proxies do.

use std::fmt;

use url::Url;

use crate::error::{Error, Result};

/// Default management/KV port for plain connections.
pub const DEFAULT_MANAGEMENT_PORT: u16 = 8091;
/// Default query port for plain connections.
pub const DEFAULT_QUERY_PORT: u16 = 8093;
/// Default management/KV port for TLS connections.
pub const DEFAULT_MANAGEMENT_TLS_PORT: u16 = 18091;
/// Default query port for TLS connections.
pub const DEFAULT_QUERY_TLS_PORT: u16 = 18093;

/// Connection string scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// `couchbase://`
    Couchbase,
    /// `couchbases://`
    CouchbaseTls,
    /// `http://`
    Http,
    /// `https://`
    Https,
}

impl Scheme {
    fn parse(raw: &str) -> Result<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "couchbase" => Ok(Scheme::Couchbase),
            "couchbases" => Ok(Scheme::CouchbaseTls),
            "http" => Ok(Scheme::Http),
            "https" => Ok(Scheme::Https),
            other => Err(Error::InvalidArgument(format!(
                "unsupported connection string scheme '{other}'"
            ))),
        }
    }

    fn is_tls(self) -> bool {
        matches!(self, Scheme::CouchbaseTls | Scheme::Https)
    }

    fn http_scheme(self) -> &'static str {
        if self.is_tls() {
            "https"
        } else {
            "http"
        }
    }
}

/// A single `host[:port]` entry from the connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSpec {
    /// Hostname or IP address (IPv6 addresses keep their brackets).
    pub host: String,
    /// Explicit port, if one was given.
    pub port: Option<u16>,
}

/// A parsed connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionString {
    scheme: Scheme,
    hosts: Vec<HostSpec>,
}

impl ConnectionString {
    /// Parse a connection string such as `couchbase://localhost`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for an unknown scheme, an empty host
    /// list, or a port that is not a valid `u16`.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let (scheme, rest) = input.split_once("://").ok_or_else(|| {
            Error::InvalidArgument(format!("connection string '{input}' has no scheme"))
        })?;
        let scheme = Scheme::parse(scheme)?;

        // Options and paths are not meaningful here; keep only the host list.
        let rest = rest
            .split(['?', '/'])
            .next()
            .unwrap_or_default();

        let hosts = rest
            .split(',')
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(parse_host)
            .collect::<Result<Vec<_>>>()?;

        if hosts.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "connection string '{input}' names no hosts"
            )));
        }

        Ok(Self { scheme, hosts })
    }

    /// The scheme this connection string uses.
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// All hosts named by the connection string, in order.
    pub fn hosts(&self) -> &[HostSpec] {
        &self.hosts
    }

    /// Base URL of the management / key-value service on the bootstrap host.
    pub fn management_endpoint(&self) -> Result<Url> {
        let default = match self.scheme {
            Scheme::Couchbase => DEFAULT_MANAGEMENT_PORT,
            Scheme::CouchbaseTls => DEFAULT_MANAGEMENT_TLS_PORT,
            Scheme::Http => 80,
            Scheme::Https => 443,
        };
        self.endpoint(default, true)
    }

    /// Base URL of the query service on the bootstrap host.
    pub fn query_endpoint(&self) -> Result<Url> {
        match self.scheme {
            Scheme::Couchbase => self.endpoint(DEFAULT_QUERY_PORT, false),
            Scheme::CouchbaseTls => self.endpoint(DEFAULT_QUERY_TLS_PORT, false),
            // A plain HTTP endpoint serves every service.
            Scheme::Http | Scheme::Https => self.management_endpoint(),
        }
    }

    /// Build the endpoint URL for the first host.
    ///
    /// An explicit port in the connection string only ever applies to the
    /// management service of `couchbase://` strings; the query service keeps
    /// its well-known port.
    fn endpoint(&self, default_port: u16, honour_explicit_port: bool) -> Result<Url> {
        let bootstrap = &self.hosts[0];
        let port = if honour_explicit_port {
            bootstrap.port.unwrap_or(default_port)
        } else {
            default_port
        };
        let raw = format!("{}://{}:{}/", self.scheme.http_scheme(), bootstrap.host, port);
        Url::parse(&raw).map_err(|e| Error::InvalidArgument(format!("invalid endpoint '{raw}': {e}")))
    }
}

impl fmt::Display for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = match self.scheme {
            Scheme::Couchbase => "couchbase",
            Scheme::CouchbaseTls => "couchbases",
            Scheme::Http => "http",
            Scheme::Https => "https",
        };
        let hosts: Vec<String> = self
            .hosts
            .iter()
            .map(|h| match h.port {
                Some(port) => format!("{}:{port}", h.host),
                None => h.host.clone(),
            })
            .collect();
        write!(f, "{scheme}://{}", hosts.join(","))
    }
}

/// Split `host[:port]`, keeping bracketed IPv6 literals intact.
fn parse_host(raw: &str) -> Result<HostSpec> {
    let (host, port) = if let Some(stripped) = raw.strip_prefix('[') {
        let end = stripped
            .find(']')
            .ok_or_else(|| Error::InvalidArgument(format!("unterminated IPv6 host '{raw}'")))?;
        let host = format!("[{}]", &stripped[..end]);
        let tail = &stripped[end + 1..];
        let port = match tail.strip_prefix(':') {
            Some(p) => Some(p),
            None if tail.is_empty() => None,
            None => {
                return Err(Error::InvalidArgument(format!("malformed host '{raw}'")));
            }
        };
        (host, port)
    } else {
        match raw.rsplit_once(':') {
            Some((host, port)) => (host.to_string(), Some(port)),
            None => (raw.to_string(), None),
        }
    };

    if host.is_empty() || host == "[]" {
        return Err(Error::InvalidArgument(format!("empty host in '{raw}'")));
    }

    let port = port
        .map(|p| {
            p.parse::<u16>()
                .map_err(|_| Error::InvalidArgument(format!("invalid port '{p}' in '{raw}'")))
        })
        .transpose()?;

    Ok(HostSpec { host, port })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_couchbase_scheme_uses_service_ports() {
        let cs = ConnectionString::parse("couchbase://localhost").unwrap();
        assert_eq!(cs.scheme(), Scheme::Couchbase);
        assert_eq!(cs.management_endpoint().unwrap().as_str(), "http://localhost:8091/");
        assert_eq!(cs.query_endpoint().unwrap().as_str(), "http://localhost:8093/");
    }

    #[test]
    fn test_tls_scheme_uses_tls_ports() {
        let cs = ConnectionString::parse("couchbases://db.example.com").unwrap();
        assert_eq!(cs.management_endpoint().unwrap().as_str(), "https://db.example.com:18091/");
        assert_eq!(cs.query_endpoint().unwrap().as_str(), "https://db.example.com:18093/");
    }

    #[test]
    fn test_http_scheme_serves_everything_from_one_endpoint() {
        let cs = ConnectionString::parse("http://127.0.0.1:4000").unwrap();
        let mgmt = cs.management_endpoint().unwrap();
        assert_eq!(mgmt.as_str(), "http://127.0.0.1:4000/");
        assert_eq!(cs.query_endpoint().unwrap(), mgmt);
    }

    #[test]
    fn test_multiple_hosts_bootstrap_from_first() {
        let cs = ConnectionString::parse("couchbase://node1:9000,node2,node3").unwrap();
        assert_eq!(cs.hosts().len(), 3);
        assert_eq!(cs.management_endpoint().unwrap().as_str(), "http://node1:9000/");
        assert_eq!(cs.query_endpoint().unwrap().as_str(), "http://node1:8093/");
    }

    #[test]
    fn test_ipv6_host() {
        let cs = ConnectionString::parse("couchbase://[::1]:8091").unwrap();
        assert_eq!(cs.hosts()[0].host, "[::1]");
        assert_eq!(cs.hosts()[0].port, Some(8091));
    }

    #[test]
    fn test_options_are_ignored() {
        let cs = ConnectionString::parse("couchbase://localhost?network=external").unwrap();
        assert_eq!(cs.hosts()[0].host, "localhost");
    }

    #[test]
    fn test_rejects_bad_input() {
        for bad in [
            "localhost",
            "redis://localhost",
            "couchbase://",
            "couchbase://,,",
            "couchbase://host:notaport",
            "couchbase://host:70000",
            "couchbase://[::1",
        ] {
            assert!(
                matches!(ConnectionString::parse(bad), Err(Error::InvalidArgument(_))),
                "expected InvalidArgument for {bad}"
            );
        }
    }

    #[test]
    fn test_display_round_trips() {
        let cs = ConnectionString::parse("couchbase://a:1,b").unwrap();
        assert_eq!(cs.to_string(), "couchbase://a:1,b");
    }

    proptest! {
        #[test]
        fn test_host_and_port_survive_parsing(
            host in "[a-z][a-z0-9-]{0,20}",
            port in 1u16..,
        ) {
            let cs = ConnectionString::parse(&format!("couchbase://{host}:{port}")).unwrap();
            prop_assert_eq!(&cs.hosts()[0].host, &host);
            prop_assert_eq!(cs.hosts()[0].port, Some(port));
            let mgmt = cs.management_endpoint().unwrap();
            prop_assert_eq!(mgmt.port_or_known_default(), Some(port));
        }
    }
}
