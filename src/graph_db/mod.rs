mod memory;
mod neo4j_client;

pub use memory::{CodeNode, InMemoryGraphStore};
pub use neo4j_client::Neo4jGraphStore;

use crate::types::ChunkKind;
use anyhow::Result;

/// Trait for the structural side of ingestion: `File` and `Code` nodes joined
/// by `CONTAINS` edges
///
/// Every operation has merge semantics, so repeating a call with the same
/// arguments leaves the graph unchanged.
#[async_trait::async_trait]
pub trait GraphStore: Send + Sync {
    /// Create uniqueness constraints on `File.path` and `Code.id` if missing
    async fn ensure_schema(&self) -> Result<()>;

    /// Merge `File{path}`, `Code{id}` (setting `symbol` and `kind`) and the
    /// `CONTAINS` edge between them
    async fn upsert_code_node(
        &self,
        id: &str,
        path: &str,
        symbol: &str,
        kind: ChunkKind,
    ) -> Result<()>;

    /// Number of `File` plus `Code` nodes
    async fn node_count(&self) -> Result<u64>;
}

/// Cypher run by [`GraphStore::ensure_schema`]
pub const SCHEMA_STATEMENTS: [&str; 2] = [
    "CREATE CONSTRAINT IF NOT EXISTS FOR (f:File) REQUIRE f.path IS UNIQUE",
    "CREATE CONSTRAINT IF NOT EXISTS FOR (c:Code) REQUIRE c.id IS UNIQUE",
];

/// Cypher run by [`GraphStore::upsert_code_node`]
pub const UPSERT_CODE_NODE: &str = "MERGE (f:File {path: $path}) \
     MERGE (n:Code {id: $id}) SET n.symbol = $symbol, n.kind = $kind \
     MERGE (f)-[:CONTAINS]->(n)";

/// Cypher run by [`GraphStore::node_count`]
pub const COUNT_NODES: &str = "MATCH (n) WHERE n:File OR n:Code RETURN count(n) AS count";
