use super::GraphStore;
use crate::types::ChunkKind;
use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// A merged `Code` node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeNode {
    pub symbol: String,
    pub kind: ChunkKind,
}

#[derive(Debug, Default)]
struct Graph {
    files: BTreeSet<String>,
    code: BTreeMap<String, CodeNode>,
    /// (file path, code id)
    contains: BTreeSet<(String, String)>,
}

/// Process-local graph store with Cypher `MERGE` semantics
#[derive(Debug, Default)]
pub struct InMemoryGraphStore {
    graph: Mutex<Graph>,
    schema_ready: AtomicBool,
    upsert_calls: AtomicUsize,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schema_ready(&self) -> bool {
        self.schema_ready.load(Ordering::SeqCst)
    }

    /// Number of `upsert_code_node` calls issued so far
    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    pub fn code_node(&self, id: &str) -> Option<CodeNode> {
        self.graph.lock().ok()?.code.get(id).cloned()
    }

    /// Code ids contained in the file at `path`
    pub fn contained_in(&self, path: &str) -> Vec<String> {
        let Ok(graph) = self.graph.lock() else {
            return Vec::new();
        };
        graph
            .contains
            .iter()
            .filter(|(file, _)| file == path)
            .map(|(_, id)| id.clone())
            .collect()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.lock().map(|g| g.contains.len()).unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn ensure_schema(&self) -> Result<()> {
        self.schema_ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn upsert_code_node(
        &self,
        id: &str,
        path: &str,
        symbol: &str,
        kind: ChunkKind,
    ) -> Result<()> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);

        let mut graph = self
            .graph
            .lock()
            .map_err(|e| anyhow::anyhow!("Graph lock poisoned: {}", e))?;
        graph.files.insert(path.to_string());
        graph.code.insert(
            id.to_string(),
            CodeNode {
                symbol: symbol.to_string(),
                kind,
            },
        );
        graph.contains.insert((path.to_string(), id.to_string()));
        Ok(())
    }

    async fn node_count(&self) -> Result<u64> {
        let graph = self
            .graph
            .lock()
            .map_err(|e| anyhow::anyhow!("Graph lock poisoned: {}", e))?;
        Ok((graph.files.len() + graph.code.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = InMemoryGraphStore::new();
        for _ in 0..3 {
            store
                .upsert_code_node("0123456789abcdef", "main.py", "main", ChunkKind::File)
                .await
                .unwrap();
        }

        assert_eq!(store.node_count().await.unwrap(), 2);
        assert_eq!(store.edge_count(), 1);
        assert_eq!(store.upsert_calls(), 3);
    }

    #[tokio::test]
    async fn test_set_overwrites_symbol_and_kind() {
        let store = InMemoryGraphStore::new();
        store
            .upsert_code_node("0123456789abcdef", "a.py", "old", ChunkKind::File)
            .await
            .unwrap();
        store
            .upsert_code_node("0123456789abcdef", "a.py", "new", ChunkKind::Function)
            .await
            .unwrap();

        assert_eq!(
            store.code_node("0123456789abcdef"),
            Some(CodeNode {
                symbol: "new".to_string(),
                kind: ChunkKind::Function
            })
        );
    }

    #[tokio::test]
    async fn test_file_contains_multiple_code_nodes() {
        let store = InMemoryGraphStore::new();
        store
            .upsert_code_node("aaaaaaaaaaaaaaaa", "lib.rs", "a", ChunkKind::Function)
            .await
            .unwrap();
        store
            .upsert_code_node("bbbbbbbbbbbbbbbb", "lib.rs", "b", ChunkKind::Function)
            .await
            .unwrap();

        assert_eq!(store.node_count().await.unwrap(), 3);
        assert_eq!(
            store.contained_in("lib.rs"),
            vec!["aaaaaaaaaaaaaaaa".to_string(), "bbbbbbbbbbbbbbbb".to_string()]
        );
    }

    #[tokio::test]
    async fn test_ensure_schema() {
        let store = InMemoryGraphStore::new();
        assert!(!store.schema_ready());
        store.ensure_schema().await.unwrap();
        store.ensure_schema().await.unwrap();
        assert!(store.schema_ready());
    }
}
