//! Engine configuration
//!
//! All tunable parameters in one place. Loaded from TOML at startup,
//! falls back to defaults if no config file exists.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Oracle sampling parameters.
    pub oracle: OracleConfig,
    /// Embedding search parameters.
    pub search: SearchConfig,
    /// Answer validation gate.
    pub validation: ValidationConfig,
    /// Retry ceilings for the repair state machine.
    pub retries: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Model identifier passed to the oracle provider.
    pub model: String,
    /// Sampling temperature for every ask.
    pub temperature: f64,
    /// Max output tokens per ask.
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Cosine similarity at or above which a stored data-slot kind is
    /// reused instead of registering a new one.
    pub similarity_threshold: f64,
    /// How many similar operations to offer the oracle for disambiguation.
    pub similar_candidates: usize,
    /// Embedding dimension (must match the configured embedder).
    pub embed_dim: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Independent yes/no votes per produced answer.
    pub votes: usize,
    /// Fraction of yes votes required to accept.
    pub threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Body regenerations / slot re-expansions per execution before giving up.
    pub max_repairs: usize,
    /// Cycle rollbacks before giving up.
    pub max_cycle_fixes: usize,
    /// Full restarts after a rejected validation before giving up.
    pub max_restarts: usize,
    /// Re-asks after a malformed (bracketless) oracle response.
    pub oracle_retries: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            oracle: OracleConfig::default(),
            search: SearchConfig::default(),
            validation: ValidationConfig::default(),
            retries: RetryConfig::default(),
        }
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            model: "claude-opus-4-6".into(),
            temperature: 0.5,
            max_tokens: 1024,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.9,
            similar_candidates: 5,
            embed_dim: 256,
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self { votes: 10, threshold: 0.8 }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_repairs: 3,
            max_cycle_fixes: 2,
            max_restarts: 3,
            oracle_retries: 1,
        }
    }
}

impl EngineConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {} — using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!("No config at {} — using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write the current config as TOML (for generating a default config file).
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}
