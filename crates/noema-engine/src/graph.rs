//! Execution graph
//!
//! Per-question occurrences of registered kinds, wired parent-to-child
//! from the target slot down to terminal leaves. Values live in a
//! per-node store on the graph, never on the kind. Execution is an
//! iterative post-order walk; failures travel back as data so the
//! resolver can repair and re-run.

use crate::registry::{Body, Registry, ValueKind};
use crate::script::ScriptRunner;
use async_trait::async_trait;
use noema_core::{Result, TypedValue};
use std::collections::HashMap;
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Slot(String),
    Op(String),
}

#[derive(Debug)]
struct Node {
    kind: NodeKind,
    children: Vec<NodeId>,
    parents: Vec<NodeId>,
}

/// Outcome of one execution pass.
#[derive(Clone, Debug, PartialEq)]
pub enum RunOutcome {
    Value(TypedValue),
    Empty,
    Failing(NodeId),
    Cycle,
}

/// Supplies values for leaf slots whose information the problem statement
/// carries directly.
#[async_trait]
pub trait TerminalSource: Send + Sync {
    async fn terminal_value(&self, question: &str, kind: &ValueKind) -> Result<String>;
}

pub struct ExecutionGraph {
    question: String,
    head: Option<NodeId>,
    nodes: Vec<Node>,
    values: HashMap<NodeId, TypedValue>,
    run_order: Vec<NodeId>,
}

impl ExecutionGraph {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            head: None,
            nodes: Vec::new(),
            values: HashMap::new(),
            run_order: Vec::new(),
        }
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn set_head(&mut self, id: NodeId) {
        self.head = Some(id);
    }

    pub fn head(&self) -> Option<NodeId> {
        self.head
    }

    pub fn node_kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    pub fn value_of(&self, id: NodeId) -> Option<&TypedValue> {
        self.values.get(&id)
    }

    /// Order in which nodes were finalized on the last run.
    pub fn run_order(&self) -> &[NodeId] {
        &self.run_order
    }

    pub fn find_slot(&self, name: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|n| matches!(&n.kind, NodeKind::Slot(s) if s == name))
            .map(NodeId)
    }

    pub fn find_op(&self, name: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|n| matches!(&n.kind, NodeKind::Op(o) if o == name))
            .map(NodeId)
    }

    /// One node per kind per run: return the existing occurrence or create it.
    pub fn ensure_slot(&mut self, name: &str) -> NodeId {
        self.find_slot(name)
            .unwrap_or_else(|| self.push(NodeKind::Slot(name.to_string())))
    }

    pub fn ensure_op(&mut self, name: &str) -> NodeId {
        self.find_op(name)
            .unwrap_or_else(|| self.push(NodeKind::Op(name.to_string())))
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        self.nodes.push(Node { kind, children: Vec::new(), parents: Vec::new() });
        NodeId(self.nodes.len() - 1)
    }

    /// Symmetric edge maintenance: the child also records the parent.
    pub fn insert_child(&mut self, parent: NodeId, child: NodeId) {
        if !self.nodes[parent.0].children.contains(&child) {
            self.nodes[parent.0].children.push(child);
        }
        if !self.nodes[child.0].parents.contains(&parent) {
            self.nodes[child.0].parents.push(parent);
        }
    }

    pub fn insert_children(&mut self, parent: NodeId, children: &[NodeId]) {
        for &child in children {
            self.insert_child(parent, child);
        }
    }

    pub fn insert_parent(&mut self, child: NodeId, parent: NodeId) {
        self.insert_child(parent, child);
    }

    /// True iff a back-edge is reachable from the head. Iterative DFS with
    /// an explicit stack; a child found in the in-progress state is a cycle.
    pub fn detect_cycle(&self) -> bool {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            White,
            Gray,
            Black,
        }
        let Some(head) = self.head else { return false };
        let mut color = vec![Color::White; self.nodes.len()];
        let mut stack: Vec<(NodeId, usize)> = vec![(head, 0)];
        color[head.0] = Color::Gray;
        while let Some((node, next_child)) = stack.last_mut() {
            let node = *node;
            if *next_child < self.nodes[node.0].children.len() {
                let child = self.nodes[node.0].children[*next_child];
                *next_child += 1;
                match color[child.0] {
                    Color::White => {
                        color[child.0] = Color::Gray;
                        stack.push((child, 0));
                    }
                    Color::Gray => return true,
                    Color::Black => {}
                }
            } else {
                color[node.0] = Color::Black;
                stack.pop();
            }
        }
        false
    }

    /// Execute the graph post-order from the head. Children are finalized
    /// before their parents; operation failures and cycles come back as
    /// data, never as errors.
    pub async fn run(
        &mut self,
        registry: &Registry,
        terminal: &dyn TerminalSource,
        runner: &dyn ScriptRunner,
    ) -> RunOutcome {
        if self.detect_cycle() {
            warn!("cycle reachable from head, refusing to execute");
            return RunOutcome::Cycle;
        }
        let Some(head) = self.head else { return RunOutcome::Empty };

        self.run_order.clear();
        let mut expanded = vec![false; self.nodes.len()];
        let mut done = vec![false; self.nodes.len()];
        let mut stack = vec![head];
        while let Some(&top) = stack.last() {
            if done[top.0] {
                stack.pop();
                continue;
            }
            if !expanded[top.0] {
                expanded[top.0] = true;
                let children = self.nodes[top.0].children.clone();
                for child in children.into_iter().rev() {
                    if !done[child.0] && !expanded[child.0] {
                        stack.push(child);
                    }
                }
                continue;
            }
            stack.pop();
            done[top.0] = true;
            self.run_order.push(top);
            if let Err(failing) = self.finalize(top, registry, terminal, runner).await {
                return RunOutcome::Failing(failing);
            }
        }

        match self.values.get(&head) {
            Some(value) => RunOutcome::Value(value.clone()),
            None => {
                let default = match self.nodes[head.0].kind.clone() {
                    NodeKind::Slot(name) => registry.value(&name).and_then(|k| k.default.clone()),
                    NodeKind::Op(_) => None,
                };
                match default {
                    Some(value) => RunOutcome::Value(value),
                    None => RunOutcome::Empty,
                }
            }
        }
    }

    async fn finalize(
        &mut self,
        id: NodeId,
        registry: &Registry,
        terminal: &dyn TerminalSource,
        runner: &dyn ScriptRunner,
    ) -> std::result::Result<(), NodeId> {
        match self.nodes[id.0].kind.clone() {
            NodeKind::Slot(name) => {
                // A slot with children takes whatever its child operation
                // deposited; only childless slots go through the terminal path.
                if self.values.contains_key(&id) || !self.nodes[id.0].children.is_empty() {
                    return Ok(());
                }
                let Some(kind) = registry.value(&name) else {
                    warn!(slot = %name, "unknown value kind");
                    return Err(id);
                };
                let raw = match terminal.terminal_value(&self.question, &kind).await {
                    Ok(raw) => raw,
                    Err(e) => {
                        warn!(slot = %name, error = %e, "terminal value unavailable");
                        return Err(id);
                    }
                };
                if let Some(value) = kind.supply(&raw) {
                    debug!(slot = %name, %value, "terminal slot resolved");
                    self.values.insert(id, value);
                }
                Ok(())
            }
            NodeKind::Op(name) => {
                let Some(op) = registry.operation(&name) else {
                    warn!(op = %name, "unknown operation kind");
                    return Err(id);
                };
                let mut inputs: Vec<(String, TypedValue)> = Vec::new();
                for input_name in &op.inputs {
                    let child = self.nodes[id.0]
                        .children
                        .iter()
                        .copied()
                        .find(|c| matches!(&self.nodes[c.0].kind, NodeKind::Slot(s) if s == input_name));
                    let value = child
                        .and_then(|c| self.values.get(&c).cloned())
                        .or_else(|| registry.value(input_name).and_then(|k| k.default.clone()));
                    match value {
                        Some(v) => inputs.push((input_name.clone(), v)),
                        None => {
                            warn!(op = %name, input = %input_name, "input slot has no value");
                            return Err(id);
                        }
                    }
                }

                let produced = match &op.body {
                    Body::Native(f) => {
                        let args: Vec<TypedValue> = inputs.iter().map(|(_, v)| v.clone()).collect();
                        f(&args)
                    }
                    Body::Script { source, .. } => {
                        match runner.run(&op, source, &inputs).await {
                            Ok(raw) => {
                                let out_kind =
                                    op.outputs.first().and_then(|n| registry.value(n));
                                match out_kind.as_ref().and_then(|k| k.supply(&raw)) {
                                    Some(v) => Ok(v),
                                    None => Err(noema_core::Error::operation_runtime(
                                        &op.name,
                                        format!("output {:?} not convertible", raw),
                                    )),
                                }
                            }
                            Err(e) => Err(e),
                        }
                    }
                };
                let value = match produced {
                    Ok(v) => v,
                    Err(e) => {
                        warn!(op = %name, error = %e, "operation failed");
                        return Err(id);
                    }
                };

                debug!(op = %name, %value, "operation produced");
                let parents = self.nodes[id.0].parents.clone();
                for parent in parents {
                    if matches!(&self.nodes[parent.0].kind,
                        NodeKind::Slot(s) if op.outputs.iter().any(|o| o == s))
                    {
                        self.values.insert(parent, value.clone());
                    }
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Body, NativeFn, OperationKind};
    use noema_core::ValueType;
    use noema_oracle::HashEmbedder;
    use noema_store::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FixedTerminal {
        slot: String,
        raw: String,
        asks: AtomicUsize,
    }

    #[async_trait]
    impl TerminalSource for FixedTerminal {
        async fn terminal_value(&self, _question: &str, kind: &ValueKind) -> Result<String> {
            self.asks.fetch_add(1, Ordering::SeqCst);
            if kind.name == self.slot {
                Ok(self.raw.clone())
            } else {
                Err(noema_core::Error::Oracle(format!("no terminal value for {}", kind.name)))
            }
        }
    }

    struct NoScript;

    #[async_trait]
    impl ScriptRunner for NoScript {
        async fn run(
            &self,
            op: &OperationKind,
            _source: &str,
            _inputs: &[(String, TypedValue)],
        ) -> Result<String> {
            Err(noema_core::Error::operation_runtime(&op.name, "no script runner"))
        }
    }

    async fn chain_registry() -> Registry {
        let registry = Registry::new(
            Arc::new(HashEmbedder::new(32)),
            Arc::new(MemoryStore::new()),
        );
        registry
            .register_value(ValueKind::new("leaf", "the starting number").with_type(ValueType::Number))
            .await
            .unwrap();
        registry
            .register_value(ValueKind::new("result", "the doubled number").with_type(ValueType::Number))
            .await
            .unwrap();
        let double: NativeFn = Arc::new(|args| {
            let n = args
                .first()
                .and_then(TypedValue::as_number)
                .ok_or_else(|| noema_core::Error::operation_runtime("double", "missing input"))?;
            Ok(TypedValue::Number(n * 2.0))
        });
        registry
            .register_operation(OperationKind::new(
                "double",
                "double a number",
                vec!["leaf".into()],
                vec!["result".into()],
                Body::Native(double),
            ))
            .await
            .unwrap();
        registry
    }

    fn chain_graph() -> (ExecutionGraph, NodeId, NodeId, NodeId) {
        let mut graph = ExecutionGraph::new("double the starting number");
        let head = graph.ensure_slot("result");
        let op = graph.ensure_op("double");
        let leaf = graph.ensure_slot("leaf");
        graph.set_head(head);
        graph.insert_child(head, op);
        graph.insert_child(op, leaf);
        (graph, head, op, leaf)
    }

    #[tokio::test]
    async fn chain_runs_leaf_first() {
        let registry = chain_registry().await;
        let (mut graph, head, op, leaf) = chain_graph();
        let terminal = FixedTerminal {
            slot: "leaf".into(),
            raw: "21".into(),
            asks: AtomicUsize::new(0),
        };
        let outcome = graph.run(&registry, &terminal, &NoScript).await;
        assert_eq!(outcome, RunOutcome::Value(TypedValue::Number(42.0)));
        assert_eq!(graph.run_order(), &[leaf, op, head]);
        assert_eq!(terminal.asks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cycle_detected_and_never_executed() {
        let registry = chain_registry().await;
        let (mut graph, head, op, leaf) = chain_graph();
        // back-edge from the leaf up to the head
        graph.insert_child(leaf, head);
        assert!(graph.detect_cycle());
        let terminal = FixedTerminal {
            slot: "leaf".into(),
            raw: "21".into(),
            asks: AtomicUsize::new(0),
        };
        let outcome = graph.run(&registry, &terminal, &NoScript).await;
        assert_eq!(outcome, RunOutcome::Cycle);
        assert_eq!(terminal.asks.load(Ordering::SeqCst), 0);
        let _ = op;
    }

    #[tokio::test]
    async fn acyclic_chain_has_no_cycle() {
        let (graph, ..) = chain_graph();
        assert!(!graph.detect_cycle());
    }

    #[tokio::test]
    async fn failing_operation_comes_back_as_data() {
        let registry = chain_registry().await;
        let (mut graph, _, op, _) = chain_graph();
        // terminal source refuses the leaf, so the op is missing its input
        let terminal = FixedTerminal {
            slot: "other".into(),
            raw: String::new(),
            asks: AtomicUsize::new(0),
        };
        let outcome = graph.run(&registry, &terminal, &NoScript).await;
        match outcome {
            RunOutcome::Failing(node) => {
                // leaf itself fails first
                assert!(node == graph.find_slot("leaf").unwrap() || node == op);
            }
            other => panic!("expected failing node, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn shared_leaf_finalized_once() {
        let registry = chain_registry().await;
        // diamond: head <- op, op <- leaf twice via two parents is the same
        // node, so the terminal ask happens once
        let mut graph = ExecutionGraph::new("q");
        let head = graph.ensure_slot("result");
        let op = graph.ensure_op("double");
        let leaf_a = graph.ensure_slot("leaf");
        let leaf_b = graph.ensure_slot("leaf");
        assert_eq!(leaf_a, leaf_b);
        graph.set_head(head);
        graph.insert_child(head, op);
        graph.insert_children(op, &[leaf_a, leaf_b]);
        let terminal = FixedTerminal {
            slot: "leaf".into(),
            raw: "5".into(),
            asks: AtomicUsize::new(0),
        };
        let outcome = graph.run(&registry, &terminal, &NoScript).await;
        assert_eq!(outcome, RunOutcome::Value(TypedValue::Number(10.0)));
        assert_eq!(terminal.asks.load(Ordering::SeqCst), 1);
    }
}
