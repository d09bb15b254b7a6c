//! Script bodies
//!
//! Synthesized operations carry their behavior as a natural-language
//! procedure; a `ScriptRunner` carries it out against concrete inputs.
//! The default runner hands the procedure back to the oracle.

use crate::prompts;
use crate::registry::OperationKind;
use async_trait::async_trait;
use noema_core::{Result, TypedValue};
use noema_oracle::{ask_bracketed, Oracle, Sampling};
use std::sync::Arc;
use tracing::debug;

#[async_trait]
pub trait ScriptRunner: Send + Sync {
    /// Execute `source` with named inputs and return the raw result text.
    async fn run(
        &self,
        op: &OperationKind,
        source: &str,
        inputs: &[(String, TypedValue)],
    ) -> Result<String>;
}

pub struct OracleScriptRunner {
    oracle: Arc<dyn Oracle>,
    sampling: Sampling,
    retries: usize,
}

impl OracleScriptRunner {
    pub fn new(oracle: Arc<dyn Oracle>, sampling: Sampling, retries: usize) -> Self {
        Self { oracle, sampling, retries }
    }
}

#[async_trait]
impl ScriptRunner for OracleScriptRunner {
    async fn run(
        &self,
        op: &OperationKind,
        source: &str,
        inputs: &[(String, TypedValue)],
    ) -> Result<String> {
        let prompt = prompts::run_script(op, source, inputs);
        let mut spans =
            ask_bracketed(self.oracle.as_ref(), &prompt, &self.sampling, self.retries).await?;
        let result = spans.remove(0);
        debug!(op = %op.name, result, "script body executed");
        Ok(result)
    }
}
