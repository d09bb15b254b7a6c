//! noema CLI — resolve a question from the command line

use anyhow::{Context, Result};
use clap::Parser;
use noema::{
    install_builtins, AnthropicOracle, Embedder, EngineConfig, HashEmbedder, HttpEmbedder,
    KnowledgeStore, MemoryStore, Neo4jStore, Oracle, OracleScriptRunner, Registry, Resolver,
    Sampling,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "noema", about = "Answer a problem with a demand-driven task graph")]
struct Cli {
    /// The question to resolve
    question: Vec<String>,

    /// Use the in-memory knowledge store instead of Neo4j
    #[arg(long)]
    memory: bool,

    /// Config file path
    #[arg(long, default_value = "noema.toml")]
    config: PathBuf,

    /// Override the oracle model
    #[arg(long)]
    model: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let question = cli.question.join(" ");
    if question.trim().is_empty() {
        anyhow::bail!("no question given");
    }

    let mut config = EngineConfig::load(&cli.config);
    if let Some(model) = cli.model {
        config.oracle.model = model;
    }

    let api_key = std::env::var("ANTHROPIC_API_KEY").context("ANTHROPIC_API_KEY is not set")?;
    let oracle: Arc<dyn Oracle> = Arc::new(AnthropicOracle::new(api_key, &config.oracle.model));

    // real embeddings when a key is available, local feature hashing otherwise
    let embedder: Arc<dyn Embedder> = match std::env::var("OPENAI_API_KEY") {
        Ok(key) => Arc::new(HttpEmbedder::new(
            key,
            "text-embedding-3-small",
            config.search.embed_dim,
        )),
        Err(_) => Arc::new(HashEmbedder::new(config.search.embed_dim)),
    };

    let store: Arc<dyn KnowledgeStore> = if cli.memory {
        Arc::new(MemoryStore::new())
    } else {
        let neo4j = Neo4jStore::from_env();
        neo4j
            .ensure_vector_indexes(config.search.embed_dim)
            .await
            .context("failed to prepare Neo4j vector indexes")?;
        Arc::new(neo4j)
    };

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

    let resolution = resolver.resolve(&question).await?;
    println!("{}", resolution.answer);
    Ok(())
}
