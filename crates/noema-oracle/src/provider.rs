//! Oracle trait — a blocking ask/answer round-trip

use async_trait::async_trait;

/// Result type for oracle operations
pub type OracleResult<T> = Result<T, OracleError>;

/// Oracle error types
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("rate limited: retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl From<OracleError> for noema_core::Error {
    fn from(e: OracleError) -> Self {
        noema_core::Error::Oracle(e.to_string())
    }
}

/// Sampling parameters for a single ask.
#[derive(Clone, Debug)]
pub struct Sampling {
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Default for Sampling {
    fn default() -> Self {
        Self { temperature: 0.5, max_tokens: 1024 }
    }
}

/// Reasoning oracle contract. Every call is a single blocking round-trip;
/// the engine never streams and never parallelizes asks.
#[async_trait]
pub trait Oracle: Send + Sync {
    fn name(&self) -> &str;

    async fn ask(&self, prompt: &str, sampling: &Sampling) -> OracleResult<String>;
}
