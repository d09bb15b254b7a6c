//! In-memory knowledge store
//!
//! Same contract as the Neo4j backend, backed by dashmaps and a cosine
//! scan instead of a vector index. Used for tests and `--memory` runs.

use crate::{KnowledgeStore, Label, Neighbor, NodeFields, Rel, StoreResult};
use async_trait::async_trait;
use dashmap::DashMap;
use noema_core::cosine;

type EdgeKey = (Label, String, Rel, Label, String);

#[derive(Default)]
pub struct MemoryStore {
    nodes: DashMap<(Label, String), NodeFields>,
    edges: DashMap<EdgeKey, ()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}

#[async_trait]
impl KnowledgeStore for MemoryStore {
    async fn create_node(&self, label: Label, name: &str, fields: &NodeFields) -> StoreResult<()> {
        self.nodes
            .entry((label, name.to_string()))
            .or_insert_with(|| fields.clone());
        Ok(())
    }

    async fn update_node(&self, label: Label, name: &str, fields: &NodeFields) -> StoreResult<()> {
        self.nodes.insert((label, name.to_string()), fields.clone());
        Ok(())
    }

    async fn node_exists(&self, label: Label, name: &str) -> StoreResult<bool> {
        Ok(self.nodes.contains_key(&(label, name.to_string())))
    }

    async fn node_description(&self, label: Label, name: &str) -> StoreResult<Option<String>> {
        Ok(self
            .nodes
            .get(&(label, name.to_string()))
            .map(|f| f.description.clone()))
    }

    async fn nearest_by_embedding(
        &self,
        label: Label,
        embedding: &[f32],
        k: usize,
    ) -> StoreResult<Vec<Neighbor>> {
        let mut hits: Vec<Neighbor> = self
            .nodes
            .iter()
            .filter(|entry| entry.key().0 == label)
            .map(|entry| Neighbor {
                name: entry.key().1.clone(),
                score: cosine(embedding, &entry.value().embedding),
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        Ok(hits)
    }

    async fn linked_nodes(&self, label: Label, name: &str, rel: Rel) -> StoreResult<Vec<String>> {
        let mut out = Vec::new();
        for entry in self.edges.iter() {
            let (from_label, from_name, edge_rel, to_label, to_name) = entry.key();
            if *edge_rel != rel {
                continue;
            }
            if *from_label == label && from_name == name {
                out.push(to_name.clone());
            } else if *to_label == label && to_name == name {
                out.push(from_name.clone());
            }
        }
        out.sort();
        out.dedup();
        Ok(out)
    }

    async fn create_relationship(
        &self,
        from: (Label, &str),
        to: (Label, &str),
        rel: Rel,
    ) -> StoreResult<()> {
        self.edges.insert(
            (from.0, from.1.to_string(), rel, to.0, to.1.to_string()),
            (),
        );
        Ok(())
    }

    async fn delete_relationship(
        &self,
        from: (Label, &str),
        to: (Label, &str),
        rel: Rel,
    ) -> StoreResult<()> {
        self.edges
            .remove(&(from.0, from.1.to_string(), rel, to.0, to.1.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(desc: &str, embedding: Vec<f32>) -> NodeFields {
        NodeFields::new(desc, embedding)
    }

    #[tokio::test]
    async fn create_is_idempotent() {
        let store = MemoryStore::new();
        let f = fields("the result", vec![1.0, 0.0]);
        store.create_node(Label::Value, "result", &f).await.unwrap();
        store.create_node(Label::Value, "result", &f).await.unwrap();
        assert_eq!(store.node_count(), 1);
        assert!(store.node_exists(Label::Value, "result").await.unwrap());
        assert!(!store.node_exists(Label::Operation, "result").await.unwrap());
    }

    #[tokio::test]
    async fn update_replaces_description() {
        let store = MemoryStore::new();
        store
            .create_node(Label::Value, "slot", &fields("old", vec![1.0]))
            .await
            .unwrap();
        store
            .update_node(Label::Value, "slot", &fields("new", vec![1.0]))
            .await
            .unwrap();
        assert_eq!(
            store.node_description(Label::Value, "slot").await.unwrap().as_deref(),
            Some("new")
        );
    }

    #[tokio::test]
    async fn nearest_orders_by_score() {
        let store = MemoryStore::new();
        store
            .create_node(Label::Value, "close", &fields("a", vec![1.0, 0.0]))
            .await
            .unwrap();
        store
            .create_node(Label::Value, "far", &fields("b", vec![0.0, 1.0]))
            .await
            .unwrap();
        let hits = store
            .nearest_by_embedding(Label::Value, &[1.0, 0.0], 2)
            .await
            .unwrap();
        assert_eq!(hits[0].name, "close");
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn relationships_match_either_direction() {
        let store = MemoryStore::new();
        store
            .create_relationship((Label::Operation, "calc"), (Label::Value, "result"), Rel::Output)
            .await
            .unwrap();
        // idempotent
        store
            .create_relationship((Label::Operation, "calc"), (Label::Value, "result"), Rel::Output)
            .await
            .unwrap();
        assert_eq!(store.edge_count(), 1);

        let producers = store
            .linked_nodes(Label::Value, "result", Rel::Output)
            .await
            .unwrap();
        assert_eq!(producers, vec!["calc"]);

        let outputs = store
            .linked_nodes(Label::Operation, "calc", Rel::Output)
            .await
            .unwrap();
        assert_eq!(outputs, vec!["result"]);

        store
            .delete_relationship((Label::Operation, "calc"), (Label::Value, "result"), Rel::Output)
            .await
            .unwrap();
        assert!(store
            .linked_nodes(Label::Value, "result", Rel::Output)
            .await
            .unwrap()
            .is_empty());
    }
}
