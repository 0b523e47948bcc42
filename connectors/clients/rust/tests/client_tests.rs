// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>

//! End-to-end SDK tests against an in-process docstart server.

use docstart_client::{
    Cluster, ClusterOptions, Collection, Error, PasswordAuthenticator, QueryOptions,
    QueryScanConsistency,
};
use docstart_server::{AppState, ServerConfig};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Airline {
    name: String,
    country: String,
    #[serde(rename = "type")]
    kind: String,
}

fn airline(name: &str, country: &str) -> Airline {
    Airline {
        name: name.to_string(),
        country: country.to_string(),
        kind: "airline".to_string(),
    }
}

/// Start a server with `default` and `travel` buckets on an ephemeral port.
async fn start_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let config = ServerConfig {
        buckets: vec!["default".to_string(), "travel".to_string()],
        ..ServerConfig::default()
    };
    tokio::spawn(docstart_server::serve_listener(listener, AppState::new(&config)));
    format!("http://{addr}")
}

/// Start a listener that accepts connections and never answers, except for
/// `GET /pools` when `answer_bootstrap` is set.
async fn start_stalled_server(answer_bootstrap: bool) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let mut buf = vec![0u8; 4096];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                if answer_bootstrap && buf[..n].starts_with(b"GET /pools ") {
                    let body = r#"{"implementationVersion":"0.0.0-stalled"}"#;
                    let response = format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\n\
                         content-length: {}\r\nconnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                } else {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                }
            });
        }
    });
    format!("http://{addr}")
}

fn admin() -> ClusterOptions {
    ClusterOptions::new(PasswordAuthenticator::new("Administrator", "password"))
}

async fn connect() -> Cluster {
    Cluster::connect(&start_server().await, admin()).await.unwrap()
}

async fn default_collection(cluster: &Cluster) -> Collection {
    cluster.bucket("default").await.unwrap().default_collection()
}

#[tokio::test]
async fn test_connect_reports_server_version() {
    let cluster = connect().await;
    assert!(cluster.server_version().ends_with("-docstart"));
}

#[tokio::test]
async fn test_wrong_password_is_authentication_failure() {
    let connstr = start_server().await;
    let options = ClusterOptions::new(PasswordAuthenticator::new("Administrator", "nope"));

    let err = Cluster::connect(&connstr, options).await.unwrap_err();
    assert!(matches!(err, Error::AuthenticationFailure(_)), "got {err:?}");
}

#[tokio::test]
async fn test_unknown_bucket() {
    let cluster = connect().await;
    let err = cluster.bucket("missing").await.unwrap_err();
    assert!(matches!(err, Error::BucketNotFound(_)), "got {err:?}");
}

#[tokio::test]
async fn test_upsert_then_get_roundtrip() {
    let cluster = connect().await;
    let collection = default_collection(&cluster).await;
    let doc = airline("Gemini Air", "United Kingdom");

    let stored = collection.upsert("airline_1", &doc).await.unwrap();
    let fetched = collection.get("airline_1").await.unwrap();

    assert_eq!(fetched.key, "airline_1");
    assert_eq!(fetched.cas, stored.cas);
    assert_eq!(fetched.content_as::<Airline>().unwrap(), doc);
}

#[tokio::test]
async fn test_upsert_overwrites() {
    let cluster = connect().await;
    let collection = default_collection(&cluster).await;

    let first = collection.upsert("k", &json!({"v": 1})).await.unwrap();
    let second = collection.upsert("k", &json!({"v": 2})).await.unwrap();

    assert!(second.cas > first.cas);
    assert_eq!(collection.get("k").await.unwrap().content, json!({"v": 2}));
}

#[tokio::test]
async fn test_insert_replace_remove() {
    let cluster = connect().await;
    let collection = default_collection(&cluster).await;

    let err = collection.replace("doc", &json!({"v": 0})).await.unwrap_err();
    assert!(matches!(err, Error::DocumentNotFound(_)), "got {err:?}");

    collection.insert("doc", &json!({"v": 1})).await.unwrap();
    let err = collection.insert("doc", &json!({"v": 2})).await.unwrap_err();
    assert!(matches!(err, Error::DocumentExists(_)), "got {err:?}");

    collection.replace("doc", &json!({"v": 3})).await.unwrap();
    assert_eq!(collection.get("doc").await.unwrap().content, json!({"v": 3}));

    collection.remove("doc").await.unwrap();
    let err = collection.get("doc").await.unwrap_err();
    assert!(matches!(err, Error::DocumentNotFound(_)), "got {err:?}");
}

#[tokio::test]
async fn test_keys_with_reserved_characters() {
    let cluster = connect().await;
    let collection = default_collection(&cluster).await;

    for key in ["user/1", "a b?c", "100%", "ключ"] {
        collection.upsert(key, &json!({"key": key})).await.unwrap();
        let fetched = collection.get(key).await.unwrap();
        assert_eq!(fetched.key, key);
        assert_eq!(fetched.content["key"], key);
    }
}

#[tokio::test]
async fn test_dot_segment_keys_are_invalid_arguments() {
    let cluster = connect().await;
    let collection = default_collection(&cluster).await;

    let err = collection.upsert(".", &json!({})).await.unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)), "got {err:?}");
    let err = collection.get("..").await.unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)), "got {err:?}");

    // Only the exact dot-segments are special.
    for key in ["...", ".a", "a.."] {
        collection.upsert(key, &json!({"key": key})).await.unwrap();
        assert_eq!(collection.get(key).await.unwrap().key, key);
    }
}

#[tokio::test]
async fn test_dot_segment_names_are_invalid_arguments() {
    let cluster = connect().await;
    let err = cluster.bucket("..").await.unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)), "got {err:?}");

    let bucket = cluster.bucket("default").await.unwrap();
    let err = bucket
        .scope(".")
        .collection("c")
        .upsert("k", &json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)), "got {err:?}");
    let err = bucket.scope("s").collection("..").get("k").await.unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)), "got {err:?}");
}

#[tokio::test]
async fn test_named_scope_and_collection() {
    let cluster = connect().await;
    let bucket = cluster.bucket("travel").await.unwrap();
    let routes = bucket.scope("inventory").collection("routes");

    routes.upsert("r1", &json!({"from": "LHR"})).await.unwrap();

    assert!(routes.get("r1").await.is_ok());
    let err = bucket.default_collection().get("r1").await.unwrap_err();
    assert!(matches!(err, Error::DocumentNotFound(_)), "got {err:?}");
}

#[tokio::test]
async fn test_upsert_multi_reports_each_key() {
    let cluster = connect().await;
    let collection = default_collection(&cluster).await;

    let results = collection
        .upsert_multi([
            ("a1", airline("Air One", "France")),
            ("a2", airline("Air Two", "Spain")),
        ])
        .await;

    assert_eq!(results.len(), 2);
    assert!(results.is_all_ok());
    let acks = results.into_result().unwrap();
    assert_ne!(acks["a1"].cas, acks["a2"].cas);
    assert_eq!(
        collection.get("a2").await.unwrap().content_as::<Airline>().unwrap().country,
        "Spain"
    );
}

#[tokio::test]
async fn test_upsert_multi_continues_past_invalid_key() {
    let cluster = connect().await;
    let collection = default_collection(&cluster).await;

    let results = collection
        .upsert_multi([("".to_string(), json!({})), ("ok".to_string(), json!({}))])
        .await;

    assert!(!results.is_all_ok());
    assert!(matches!(results.get(""), Some(Err(Error::InvalidArgument(_)))));
    assert!(matches!(results.get("ok"), Some(Ok(_))));
    assert!(results.into_result().is_err());
}

#[tokio::test]
async fn test_query_with_named_parameter() {
    let cluster = connect().await;
    let collection = default_collection(&cluster).await;
    collection.upsert("u1", &json!({"email": "perry.mason@acme.com"})).await.unwrap();
    collection.upsert("u2", &json!({"email": "someone@else.org"})).await.unwrap();

    let mut result = cluster
        .query(
            "SELECT * FROM `default` WHERE email LIKE $email",
            QueryOptions::new()
                .named_parameter("email", "%@acme.com")
                .client_context_id("quick-start")
                .scan_consistency(QueryScanConsistency::RequestPlus),
        )
        .await
        .unwrap();

    let rows: Vec<Value> = result.rows::<Value>().collect::<Result<_, _>>().unwrap();
    assert_eq!(rows, vec![json!({"default": {"email": "perry.mason@acme.com"}})]);

    let meta = result.meta_data();
    assert_eq!(meta.client_context_id, "quick-start");
    assert_eq!(meta.metrics.as_ref().map(|m| m.result_count), Some(1));
}

#[tokio::test]
async fn test_query_with_positional_parameter_and_projection() {
    let cluster = connect().await;
    let collection = default_collection(&cluster).await;
    collection
        .upsert_multi([
            ("a1", airline("Air One", "France")),
            ("a2", airline("Air Two", "Spain")),
            ("a3", airline("Air Three", "France")),
        ])
        .await
        .into_result()
        .unwrap();

    #[derive(Debug, Deserialize)]
    struct NameRow {
        name: String,
    }

    let mut result = cluster
        .query(
            "SELECT name FROM `default` WHERE country = $1 AND type = 'airline'",
            QueryOptions::new().positional_parameter("France"),
        )
        .await
        .unwrap();
    let names: Vec<String> = result
        .rows::<NameRow>()
        .map(|row| row.map(|r| r.name))
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(names, ["Air One", "Air Three"]);
}

#[tokio::test]
async fn test_query_rows_are_not_restartable() {
    let cluster = connect().await;
    let collection = default_collection(&cluster).await;
    collection.upsert("x", &json!({"n": 1})).await.unwrap();

    let mut result = cluster
        .query("SELECT * FROM `default`", QueryOptions::new())
        .await
        .unwrap();

    assert_eq!(result.rows::<Value>().count(), 1);
    assert_eq!(result.rows::<Value>().count(), 0);
}

#[tokio::test]
async fn test_query_syntax_error() {
    let cluster = connect().await;
    let err = cluster
        .query("SELEKT * FROM `default`", QueryOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ParsingFailure(_)), "got {err:?}");
}

#[tokio::test]
async fn test_query_unknown_keyspace() {
    let cluster = connect().await;
    let err = cluster
        .query("SELECT * FROM `nowhere`", QueryOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::KeyspaceNotFound(_)), "got {err:?}");
}

#[tokio::test]
async fn test_query_missing_parameter() {
    let cluster = connect().await;
    let err = cluster
        .query("SELECT * FROM `default` WHERE email = $email", QueryOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Query { code: 4040, .. }), "got {err:?}");
}

#[tokio::test]
async fn test_connect_timeout_reports_kv_timeout() {
    let connstr = start_stalled_server(false).await;
    let options = admin().kv_timeout(Duration::from_millis(50));

    let err = Cluster::connect(&connstr, options).await.unwrap_err();
    assert!(matches!(err, Error::Timeout(50)), "got {err:?}");
}

#[tokio::test]
async fn test_query_timeout_reports_per_query_override() {
    let connstr = start_stalled_server(true).await;
    let cluster = Cluster::connect(&connstr, admin()).await.unwrap();

    let err = cluster
        .query(
            "SELECT * FROM `default`",
            QueryOptions::new().timeout(Duration::from_millis(75)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout(75)), "got {err:?}");
}

#[tokio::test]
async fn test_query_timeout_reports_cluster_default() {
    let connstr = start_stalled_server(true).await;
    let options = admin().query_timeout(Duration::from_millis(60));
    let cluster = Cluster::connect(&connstr, options).await.unwrap();

    let err = cluster
        .query("SELECT * FROM `default`", QueryOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout(60)), "got {err:?}");
}
