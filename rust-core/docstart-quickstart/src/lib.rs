// SPDX-License-Identifier: PMPL-1.0-or-later
//! docstart quick start
//!
//! Connects to a cluster, stores three users, fetches one back by key and
//! finds every user whose email matches a pattern.

use std::collections::BTreeMap;

use docstart_client::{
    Cluster, ClusterOptions, MutationResult, PasswordAuthenticator, QueryOptions, Result,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

/// Connection and query settings for [`run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuickstartConfig {
    pub connection_string: String,
    pub username: String,
    pub password: String,
    pub bucket: String,
    /// LIKE pattern bound to `$email`
    pub email_pattern: String,
}

impl Default for QuickstartConfig {
    fn default() -> Self {
        Self {
            connection_string: "couchbase://localhost".to_string(),
            username: "Administrator".to_string(),
            password: "password".to_string(),
            bucket: "default".to_string(),
            email_pattern: "%@acme.com".to_string(),
        }
    }
}

/// A user document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "firstName")]
    pub first_name: String,
    #[serde(rename = "lastName")]
    pub last_name: String,
    pub email: String,
    #[serde(rename = "tagLine")]
    pub tag_line: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl User {
    pub fn new(first_name: &str, last_name: &str, email: &str, tag_line: &str) -> Self {
        Self {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: email.to_string(),
            tag_line: tag_line.to_string(),
            kind: "user".to_string(),
        }
    }
}

/// The quick-start users, keyed by document key.
pub fn sample_users() -> [(&'static str, User); 3] {
    [
        (
            "newDoc",
            User::new("Perry", "Mason", "perry.mason@acme.com", "Who can we get on the case?"),
        ),
        (
            "newDoc2",
            User::new("Major", "Tom", "major.tom@acme.com", "Send me up a drink"),
        ),
        (
            "newDoc3",
            User::new(
                "Jerry",
                "Wasaracecardriver",
                "jerry.wasaracecardriver@acme.com",
                "el sob number one",
            ),
        ),
    ]
}

/// Everything [`run`] produced, in step order.
#[derive(Debug, Clone, Serialize)]
pub struct QuickstartReport {
    /// Upsert of `newDoc`
    pub single: MutationResult,
    /// Batch upsert of `newDoc2` and `newDoc3`
    pub batch: BTreeMap<String, MutationResult>,
    /// `newDoc2` read back by key
    pub fetched: User,
    /// Rows of the email query
    pub rows: Vec<Value>,
}

/// Run the quick start against the cluster described by `config`.
///
/// Steps run in order and the first failure is returned unchanged.
pub async fn run(config: &QuickstartConfig) -> Result<QuickstartReport> {
    let options =
        ClusterOptions::new(PasswordAuthenticator::new(&config.username, &config.password));
    let cluster = Cluster::connect(&config.connection_string, options).await?;

    let bucket = cluster.bucket(&config.bucket).await?;
    let collection = bucket.default_collection();

    let [(first_key, first), second, third] = sample_users();

    let single = collection.upsert(first_key, &first).await?;
    info!(key = %single.key, cas = single.cas, "upserted single document");

    let batch = collection.upsert_multi([second, third]).await.into_result()?;
    info!(keys = ?batch.keys().collect::<Vec<_>>(), "upserted batch");

    let fetched = collection.get("newDoc2").await?.content_as::<User>()?;
    info!(email = %fetched.email, "fetched newDoc2");

    let mut result = cluster
        .query(
            &email_query(&config.bucket),
            QueryOptions::new().named_parameter("email", &config.email_pattern),
        )
        .await?;
    let rows = result.rows::<Value>().collect::<Result<Vec<_>>>()?;
    info!(rows = rows.len(), "query complete");

    Ok(QuickstartReport {
        single,
        batch,
        fetched,
        rows,
    })
}

/// Statement selecting every document in `bucket` whose email matches `$email`.
fn email_query(bucket: &str) -> String {
    format!("SELECT * FROM {} WHERE email LIKE $email", quote_identifier(bucket))
}

/// Wrap `name` in backticks, escaping backslashes and embedded backticks.
fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('\\', "\\\\").replace('`', "``"))
}
