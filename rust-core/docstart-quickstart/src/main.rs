// SPDX-License-Identifier: PMPL-1.0-or-later
//! docstart quick-start binary
//!
//! Runs the quick start and prints each step's result as JSON.

use anyhow::Context;
use clap::Parser;
use docstart_quickstart::QuickstartConfig;

/// Connect to a cluster, store three users, and query them by email
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Cluster connection string
    #[arg(long, env = "DOCSTART_CONNSTR", default_value = "couchbase://localhost")]
    connection_string: String,

    #[arg(long, env = "DOCSTART_USERNAME", default_value = "Administrator")]
    username: String,

    #[arg(long, env = "DOCSTART_PASSWORD", default_value = "password", hide_env_values = true)]
    password: String,

    /// Bucket to store the users in
    #[arg(long, env = "DOCSTART_BUCKET", default_value = "default")]
    bucket: String,

    /// LIKE pattern matched against user emails
    #[arg(long, env = "DOCSTART_EMAIL_PATTERN", default_value = "%@acme.com")]
    email_pattern: String,
}

impl From<Args> for QuickstartConfig {
    fn from(args: Args) -> Self {
        Self {
            connection_string: args.connection_string,
            username: args.username,
            password: args.password,
            bucket: args.bucket,
            email_pattern: args.email_pattern,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = QuickstartConfig::from(Args::parse());
    let report = docstart_quickstart::run(&config)
        .await
        .with_context(|| format!("quick start against {} failed", config.connection_string))?;

    println!("{}", serde_json::to_string_pretty(&report.single)?);
    println!("{}", serde_json::to_string_pretty(&report.batch)?);
    println!("{}", serde_json::to_string_pretty(&report.fetched)?);
    for row in &report.rows {
        println!("{row}");
    }

    Ok(())
}
