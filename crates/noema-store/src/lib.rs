//! noema-store — knowledge-store contract and backends
//!
//! Kinds and their input/output relationships persist here across
//! questions. The contract is deliberately narrow: named typed nodes,
//! nearest-neighbor search over the embedded description, and directed
//! relationships queried without regard to direction.

pub mod memory;
pub mod neo4j;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use memory::MemoryStore;
pub use neo4j::Neo4jStore;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("query failed: {0}")]
    Query(String),

    #[error("node not found: {0}")]
    NotFound(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl From<StoreError> for noema_core::Error {
    fn from(e: StoreError) -> Self {
        noema_core::Error::Store(e.to_string())
    }
}

/// Node label — the two persistent kind families.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    Value,
    Operation,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Value => "Value",
            Self::Operation => "Operation",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Relationship between an operation and a value slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rel {
    Input,
    Output,
}

impl Rel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Input => "INPUT",
            Self::Output => "OUTPUT",
        }
    }
}

impl fmt::Display for Rel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Persisted fields of a kind node.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NodeFields {
    pub description: String,
    pub embedding: Vec<f32>,
    pub expected_type: Option<String>,
    pub default: Option<String>,
    pub example: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl NodeFields {
    pub fn new(description: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            description: description.into(),
            embedding,
            created_at: Some(Utc::now()),
            ..Default::default()
        }
    }
}

/// A nearest-neighbor search hit.
#[derive(Clone, Debug)]
pub struct Neighbor {
    pub name: String,
    pub score: f32,
}

/// Knowledge store contract. All queries are keyed by unique node name
/// within a label. `create_relationship` is idempotent; `linked_nodes`
/// matches edges in either direction and returns the other endpoint.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    async fn create_node(&self, label: Label, name: &str, fields: &NodeFields) -> StoreResult<()>;

    async fn update_node(&self, label: Label, name: &str, fields: &NodeFields) -> StoreResult<()>;

    async fn node_exists(&self, label: Label, name: &str) -> StoreResult<bool>;

    async fn node_description(&self, label: Label, name: &str) -> StoreResult<Option<String>>;

    /// Top-k nodes under `label` by cosine score against `embedding`,
    /// best first.
    async fn nearest_by_embedding(
        &self,
        label: Label,
        embedding: &[f32],
        k: usize,
    ) -> StoreResult<Vec<Neighbor>>;

    async fn linked_nodes(&self, label: Label, name: &str, rel: Rel) -> StoreResult<Vec<String>>;

    async fn create_relationship(
        &self,
        from: (Label, &str),
        to: (Label, &str),
        rel: Rel,
    ) -> StoreResult<()>;

    async fn delete_relationship(
        &self,
        from: (Label, &str),
        to: (Label, &str),
        rel: Rel,
    ) -> StoreResult<()>;
}
