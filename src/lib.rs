//! noema — answer natural-language problems with a demand-driven task graph
//!
//! The crates divide along the engine's seams: `noema-core` holds values,
//! coercion, errors, and config; `noema-oracle` the reasoning-oracle and
//! embedding providers; `noema-store` the knowledge-store backends; and
//! `noema-engine` the registry, execution graph, and resolver. This root
//! crate wires them together behind one `resolve` call and the CLI.

pub use noema_core::{EngineConfig, Error, Result, TypedValue, ValueType};
pub use noema_engine::{
    install_builtins, ExecutionGraph, OracleScriptRunner, Registry, Resolution, Resolver,
};
pub use noema_oracle::{AnthropicOracle, Embedder, HashEmbedder, HttpEmbedder, Oracle, Sampling};
pub use noema_store::{KnowledgeStore, MemoryStore, Neo4jStore};

use std::sync::Arc;

/// Resolve a question with default configuration: the Anthropic oracle
/// (`ANTHROPIC_API_KEY`), a local hash embedder, and the in-memory store
/// seeded with the builtin operations.
pub async fn resolve(question: &str) -> Result<String> {
    let config = EngineConfig::default();
    let api_key = std::env::var("ANTHROPIC_API_KEY")
        .map_err(|_| Error::Oracle("ANTHROPIC_API_KEY is not set".to_string()))?;
    let oracle: Arc<dyn Oracle> = Arc::new(AnthropicOracle::new(api_key, &config.oracle.model));
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(config.search.embed_dim));
    let store: Arc<dyn KnowledgeStore> = Arc::new(MemoryStore::new());

    let registry = Arc::new(Registry::new(embedder, store));
    install_builtins(&registry).await?;

    let sampling = Sampling {
        temperature: config.oracle.temperature,
        max_tokens: config.oracle.max_tokens,
    };
    let runner = Arc::new(OracleScriptRunner::new(
        oracle.clone(),
        sampling,
        config.retries.oracle_retries,
    ));
    let resolver = Resolver::new(registry, oracle, runner, config);
    let resolution = resolver.resolve(question).await?;
    Ok(resolution.answer)
}
