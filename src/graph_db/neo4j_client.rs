use super::{COUNT_NODES, GraphStore, SCHEMA_STATEMENTS, UPSERT_CODE_NODE};
use crate::config::GraphDbConfig;
use crate::types::ChunkKind;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;

/// Graph store speaking the Neo4j HTTP transactional API
///
/// Each call is one auto-committed transaction:
/// `POST {uri}/db/{database}/tx/commit`.
pub struct Neo4jGraphStore {
    client: reqwest::Client,
    endpoint: String,
    user: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct Statement<'a> {
    statement: &'a str,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct TxResponse {
    #[serde(default)]
    results: Vec<TxResult>,
    #[serde(default)]
    errors: Vec<TxError>,
}

#[derive(Debug, Deserialize)]
struct TxResult {
    #[serde(default)]
    data: Vec<TxRow>,
}

#[derive(Debug, Deserialize)]
struct TxRow {
    #[serde(default)]
    row: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct TxError {
    code: String,
    message: String,
}

impl Neo4jGraphStore {
    pub fn new(config: &GraphDbConfig) -> Result<Self> {
        tracing::info!("Connecting to Neo4j at {}", config.uri);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            endpoint: commit_endpoint(&config.uri, &config.database),
            user: config.user.clone(),
            password: config.password.clone(),
        })
    }

    /// Run statements in one transaction and return their results
    async fn run(&self, statements: &[Statement<'_>]) -> Result<Vec<TxResult>> {
        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.user, Some(&self.password))
            .json(&json!({ "statements": statements }))
            .send()
            .await
            .context("Neo4j request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Neo4j returned HTTP {}: {}", status, body);
        }

        let body: TxResponse = response
            .json()
            .await
            .context("Invalid Neo4j response body")?;
        check_errors(body)
    }
}

fn commit_endpoint(uri: &str, database: &str) -> String {
    format!("{}/db/{}/tx/commit", uri.trim_end_matches('/'), database)
}

/// Neo4j reports Cypher failures inside a 200 response
fn check_errors(response: TxResponse) -> Result<Vec<TxResult>> {
    if let Some(first) = response.errors.first() {
        let others = response.errors.len() - 1;
        if others > 0 {
            bail!("{}: {} (and {} more)", first.code, first.message, others);
        }
        bail!("{}: {}", first.code, first.message);
    }
    Ok(response.results)
}

#[async_trait::async_trait]
impl GraphStore for Neo4jGraphStore {
    async fn ensure_schema(&self) -> Result<()> {
        let statements: Vec<Statement> = SCHEMA_STATEMENTS
            .iter()
            .map(|&statement| Statement {
                statement,
                parameters: json!({}),
            })
            .collect();

        self.run(&statements)
            .await
            .context("Failed to create graph constraints")?;
        tracing::debug!("Graph constraints in place");
        Ok(())
    }

    async fn upsert_code_node(
        &self,
        id: &str,
        path: &str,
        symbol: &str,
        kind: ChunkKind,
    ) -> Result<()> {
        let statement = Statement {
            statement: UPSERT_CODE_NODE,
            parameters: json!({
                "id": id,
                "path": path,
                "symbol": symbol,
                "kind": kind.as_str(),
            }),
        };

        self.run(std::slice::from_ref(&statement))
            .await
            .with_context(|| format!("Failed to merge code node {} ({})", id, path))?;
        Ok(())
    }

    async fn node_count(&self) -> Result<u64> {
        let results = self
            .run(&[Statement {
                statement: COUNT_NODES,
                parameters: json!({}),
            }])
            .await?;

        results
            .first()
            .and_then(|r| r.data.first())
            .and_then(|row| row.row.first())
            .and_then(Value::as_u64)
            .context("Node count missing from Neo4j response")
    }
}
