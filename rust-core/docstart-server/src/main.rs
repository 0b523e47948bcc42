// SPDX-License-Identifier: PMPL-1.0-or-later
//! docstart development server binary
//!
//! Starts the in-memory cluster on the management and query ports.

use anyhow::Context;
use clap::Parser;
use docstart_server::ServerConfig;

/// In-memory docstart development cluster
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Host to bind to
    #[arg(long)]
    host: Option<String>,

    /// Port of the management and key-value service
    #[arg(long)]
    management_port: Option<u16>,

    /// Port of the query service
    #[arg(long)]
    query_port: Option<u16>,

    /// Administrator username
    #[arg(long)]
    username: Option<String>,

    /// Administrator password
    #[arg(long)]
    password: Option<String>,

    /// Bucket to create at startup (repeatable)
    #[arg(long = "bucket")]
    buckets: Vec<String>,
}

impl Args {
    /// Command-line flags take precedence over `DOCSTART_*` variables.
    fn into_config(self) -> ServerConfig {
        let mut config = ServerConfig::from_env();
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.management_port {
            config.management_port = port;
        }
        if let Some(port) = self.query_port {
            config.query_port = port;
        }
        if let Some(username) = self.username {
            config.username = username;
        }
        if let Some(password) = self.password {
            config.password = password;
        }
        if !self.buckets.is_empty() {
            config.buckets = self.buckets;
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Args::parse().into_config();

    tracing::info!(
        "Starting docstart server on {} (management {}, query {})",
        config.host,
        config.management_port,
        config.query_port
    );

    docstart_server::serve(config)
        .await
        .context("docstart server stopped")?;

    Ok(())
}
