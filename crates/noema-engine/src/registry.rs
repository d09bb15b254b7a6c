//! Kind registry
//!
//! Kinds are the persistent definitions behind graph nodes: a `ValueKind`
//! declares a named, typed data slot, an `OperationKind` a named function
//! over slots. The registry is an explicit object owned by the resolver,
//! append-only, idempotent by name, and mirrors every registration into
//! the knowledge store.

use noema_core::{coerce, Error, Result, TypedValue, ValueType};
use noema_oracle::{cosine, Embedder};
use noema_store::{KnowledgeStore, Label, NodeFields};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

pub type NativeFn = Arc<dyn Fn(&[TypedValue]) -> Result<TypedValue> + Send + Sync>;

/// Executable behavior of an operation, held as data. Script bodies carry
/// the history of sources already rejected at run time, which feeds back
/// into regeneration prompts.
#[derive(Clone)]
pub enum Body {
    Native(NativeFn),
    Script { source: String, rejected: Vec<String> },
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native(_) => write!(f, "Body::Native"),
            Self::Script { source, rejected } => f
                .debug_struct("Body::Script")
                .field("source", source)
                .field("rejected", &rejected.len())
                .finish(),
        }
    }
}

/// Data-slot definition. Holds type and converter metadata only; runtime
/// values live on graph nodes.
#[derive(Clone, Debug)]
pub struct ValueKind {
    pub name: String,
    pub description: String,
    /// `None` until the type has been learned (oracle guess or declaration).
    pub expected_type: Option<ValueType>,
    pub default: Option<TypedValue>,
    pub example: Option<String>,
}

impl ValueKind {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            expected_type: None,
            default: None,
            example: None,
        }
    }

    pub fn with_type(mut self, ty: ValueType) -> Self {
        self.expected_type = Some(ty);
        self
    }

    pub fn with_default(mut self, value: TypedValue) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_example(mut self, example: impl Into<String>) -> Self {
        self.example = Some(example.into());
        self
    }

    /// Coerce raw text into this kind's declared type. Coercion failure
    /// falls back to the declared default; an unknown type reads as text.
    pub fn supply(&self, raw: &str) -> Option<TypedValue> {
        let ty = self.expected_type.unwrap_or(ValueType::Text);
        match coerce(raw, ty) {
            Ok(value) => Some(value),
            Err(_) => {
                debug!(kind = %self.name, raw, "coercion failed, using default");
                self.default.clone()
            }
        }
    }

    /// Description with the example appended, for prompting.
    pub fn full_description(&self) -> String {
        match &self.example {
            Some(example) => format!("{} (for example: {})", self.description, example),
            None => self.description.clone(),
        }
    }
}

/// Operation definition. Input and output arity and order are fixed at
/// registration and must match the body's expectations.
#[derive(Clone, Debug)]
pub struct OperationKind {
    pub name: String,
    pub description: String,
    /// ValueKind names, in the order the body consumes them.
    pub inputs: Vec<String>,
    /// ValueKind names the body produces.
    pub outputs: Vec<String>,
    pub body: Body,
}

impl OperationKind {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        inputs: Vec<String>,
        outputs: Vec<String>,
        body: Body,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            inputs,
            outputs,
            body,
        }
    }
}

/// Append-only catalog of kinds, shared between the resolver and the
/// execution graph. Registration embeds the description and persists the
/// kind to the knowledge store.
pub struct Registry {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn KnowledgeStore>,
    values: RwLock<HashMap<String, Arc<ValueKind>>>,
    operations: RwLock<HashMap<String, Arc<OperationKind>>>,
    op_order: RwLock<Vec<String>>,
    embeddings: RwLock<HashMap<(Label, String), Vec<f32>>>,
}

impl Registry {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn KnowledgeStore>) -> Self {
        Self {
            embedder,
            store,
            values: RwLock::new(HashMap::new()),
            operations: RwLock::new(HashMap::new()),
            op_order: RwLock::new(Vec::new()),
            embeddings: RwLock::new(HashMap::new()),
        }
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub fn store(&self) -> &Arc<dyn KnowledgeStore> {
        &self.store
    }

    pub fn value(&self, name: &str) -> Option<Arc<ValueKind>> {
        self.values.read().unwrap().get(name).cloned()
    }

    pub fn operation(&self, name: &str) -> Option<Arc<OperationKind>> {
        self.operations.read().unwrap().get(name).cloned()
    }

    /// Register a data-slot kind. Registering an already-known name returns
    /// the existing handle unchanged.
    pub async fn register_value(&self, kind: ValueKind) -> Result<Arc<ValueKind>> {
        if let Some(existing) = self.value(&kind.name) {
            return Ok(existing);
        }
        if kind.description.trim().is_empty() {
            return Err(Error::MissingDescription(kind.name));
        }
        let embedding = self.embedder.embed(&kind.description).await.map_err(Error::from)?;
        self.persist(
            Label::Value,
            &kind.name,
            &kind.description,
            &embedding,
            kind.expected_type,
            kind.default.as_ref(),
            kind.example.clone(),
        )
        .await?;
        info!(kind = %kind.name, "registered value kind");
        let name = kind.name.clone();
        let handle = Arc::new(kind);
        self.embeddings
            .write()
            .unwrap()
            .insert((Label::Value, name.clone()), embedding);
        self.values.write().unwrap().insert(name, handle.clone());
        Ok(handle)
    }

    /// Register an operation kind, idempotent by name.
    pub async fn register_operation(&self, kind: OperationKind) -> Result<Arc<OperationKind>> {
        if let Some(existing) = self.operation(&kind.name) {
            return Ok(existing);
        }
        if kind.description.trim().is_empty() {
            return Err(Error::MissingDescription(kind.name));
        }
        let embedding = self.embedder.embed(&kind.description).await.map_err(Error::from)?;
        self.persist(
            Label::Operation,
            &kind.name,
            &kind.description,
            &embedding,
            None,
            None,
            None,
        )
        .await?;
        info!(kind = %kind.name, "registered operation kind");
        let name = kind.name.clone();
        let handle = Arc::new(kind);
        self.embeddings
            .write()
            .unwrap()
            .insert((Label::Operation, name.clone()), embedding);
        self.operations.write().unwrap().insert(name.clone(), handle.clone());
        self.op_order.write().unwrap().push(name);
        Ok(handle)
    }

    /// Registered operations ranked by cosine similarity to `embedding`,
    /// best first, ties broken by registration order.
    pub fn k_similar_operations(&self, embedding: &[f32], k: usize) -> Vec<Arc<OperationKind>> {
        let order = self.op_order.read().unwrap();
        let embeddings = self.embeddings.read().unwrap();
        let operations = self.operations.read().unwrap();
        let mut scored: Vec<(f32, Arc<OperationKind>)> = order
            .iter()
            .filter_map(|name| {
                let op = operations.get(name)?.clone();
                let emb = embeddings.get(&(Label::Operation, name.clone()))?;
                Some((cosine(embedding, emb), op))
            })
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().take(k).map(|(_, op)| op).collect()
    }

    /// Swap in a regenerated script body, pushing the old source onto the
    /// rejected history.
    pub fn replace_body(&self, name: &str, new_source: impl Into<String>) -> Result<Arc<OperationKind>> {
        let mut operations = self.operations.write().unwrap();
        let current = operations
            .get(name)
            .ok_or_else(|| Error::UnknownKind(name.to_string()))?;
        let mut updated = (**current).clone();
        match &mut updated.body {
            Body::Script { source, rejected } => {
                let old = std::mem::replace(source, new_source.into());
                rejected.push(old);
            }
            Body::Native(_) => {
                return Err(Error::operation_runtime(name, "native body cannot be regenerated"))
            }
        }
        let handle = Arc::new(updated);
        operations.insert(name.to_string(), handle.clone());
        Ok(handle)
    }

    /// Learn a value kind's type once it becomes known. A kind whose type is
    /// already declared is left untouched.
    pub fn set_value_type(&self, name: &str, ty: ValueType) -> Result<Arc<ValueKind>> {
        let mut values = self.values.write().unwrap();
        let current = values
            .get(name)
            .ok_or_else(|| Error::UnknownKind(name.to_string()))?;
        if current.expected_type.is_some() {
            return Ok(current.clone());
        }
        let mut updated = (**current).clone();
        updated.expected_type = Some(ty);
        let handle = Arc::new(updated);
        values.insert(name.to_string(), handle.clone());
        Ok(handle)
    }

    /// The embedding recorded for a registered kind.
    pub fn embedding(&self, label: Label, name: &str) -> Option<Vec<f32>> {
        self.embeddings
            .read()
            .unwrap()
            .get(&(label, name.to_string()))
            .cloned()
    }

    async fn persist(
        &self,
        label: Label,
        name: &str,
        description: &str,
        embedding: &[f32],
        expected_type: Option<ValueType>,
        default: Option<&TypedValue>,
        example: Option<String>,
    ) -> Result<()> {
        let mut fields = NodeFields::new(description, embedding.to_vec());
        fields.expected_type = expected_type.map(|t| t.as_str().to_string());
        fields.default = default.map(|v| v.to_string());
        fields.example = example;
        match self.store.node_description(label, name).await.map_err(Error::from)? {
            Some(existing) if existing == description => {}
            Some(_) => self.store.update_node(label, name, &fields).await.map_err(Error::from)?,
            None => self.store.create_node(label, name, &fields).await.map_err(Error::from)?,
        }
        Ok(())
    }
}
