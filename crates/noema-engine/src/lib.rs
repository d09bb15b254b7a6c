//! noema-engine — registry, execution graph, and resolution engine
//!
//! The engine answers a question by growing a task graph on demand: the
//! oracle proposes steps, the knowledge store supplies already-known
//! operations, and anything missing is synthesized on the spot. The graph
//! then runs post-order, with bounded repair on failure.

pub mod graph;
pub mod ops;
pub mod prompts;
pub mod registry;
pub mod resolver;
pub mod script;

pub use graph::{ExecutionGraph, NodeId, NodeKind, RunOutcome, TerminalSource};
pub use ops::{eval_formula, install_builtins, solve_linear_system};
pub use registry::{Body, NativeFn, OperationKind, Registry, ValueKind};
pub use resolver::{Resolution, Resolver};
pub use script::{OracleScriptRunner, ScriptRunner};
