// SPDX-License-Identifier: PMPL-1.0-or-later
//! End-to-end quick-start runs against an in-process dev server

use docstart_client::Error;
use docstart_quickstart::{run, QuickstartConfig};
use docstart_server::{AppState, ServerConfig};
use tokio::net::TcpListener;

/// Start a dev server on an ephemeral port and return a config pointing at it.
async fn start_server() -> QuickstartConfig {
    start_server_with(ServerConfig::default()).await
}

async fn start_server_with(server: ServerConfig) -> QuickstartConfig {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = AppState::new(&server);
    tokio::spawn(docstart_server::serve_listener(listener, state));

    QuickstartConfig {
        connection_string: format!("http://{addr}"),
        ..QuickstartConfig::default()
    }
}

#[tokio::test]
async fn test_quickstart_runs_every_step() {
    let config = start_server().await;

    let report = run(&config).await.unwrap();

    assert_eq!(report.single.key, "newDoc");
    let batch_keys: Vec<_> = report.batch.keys().cloned().collect();
    assert_eq!(batch_keys, ["newDoc2", "newDoc3"]);
    assert!(report.batch["newDoc3"].cas > report.single.cas);

    assert_eq!(report.fetched.first_name, "Major");
    assert_eq!(report.fetched.last_name, "Tom");
    assert_eq!(report.fetched.kind, "user");

    let emails: Vec<_> = report
        .rows
        .iter()
        .map(|row| row["default"]["email"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(
        emails,
        [
            "perry.mason@acme.com",
            "major.tom@acme.com",
            "jerry.wasaracecardriver@acme.com",
        ]
    );
}

#[tokio::test]
async fn test_quickstart_is_repeatable() {
    let config = start_server().await;

    let first = run(&config).await.unwrap();
    let second = run(&config).await.unwrap();

    assert!(second.single.cas > first.single.cas);
    assert_eq!(second.rows.len(), 3);
}

#[tokio::test]
async fn test_quickstart_custom_pattern() {
    let config = QuickstartConfig {
        email_pattern: "perry%".to_string(),
        ..start_server().await
    };

    let report = run(&config).await.unwrap();

    assert_eq!(report.rows.len(), 1);
    assert_eq!(report.rows[0]["default"]["firstName"], "Perry");
}

#[tokio::test]
async fn test_quickstart_wrong_password() {
    let config = QuickstartConfig {
        password: "wrong".to_string(),
        ..start_server().await
    };

    let err = run(&config).await.unwrap_err();
    assert!(matches!(err, Error::AuthenticationFailure(_)), "got {err:?}");
}

#[tokio::test]
async fn test_quickstart_unknown_bucket() {
    let config = QuickstartConfig {
        bucket: "travel-sample".to_string(),
        ..start_server().await
    };

    let err = run(&config).await.unwrap_err();
    assert!(matches!(err, Error::BucketNotFound(_)), "got {err:?}");
}

#[tokio::test]
async fn test_quickstart_bucket_name_with_backtick() {
    let server = ServerConfig {
        buckets: vec!["odd`name".to_string()],
        ..ServerConfig::default()
    };
    let config = QuickstartConfig {
        bucket: "odd`name".to_string(),
        ..start_server_with(server).await
    };

    let report = run(&config).await.unwrap();

    assert_eq!(report.rows.len(), 3);
    assert!(report.rows.iter().all(|row| row["odd`name"]["type"] == "user"));
}
