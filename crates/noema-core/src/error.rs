//! Error taxonomy for noema
//!
//! Graph-internal failures (a failing node, a cycle) travel as data through
//! `RunOutcome` so the resolver can branch on them; only ceiling-exceeded
//! conditions and genuinely fatal registration problems surface as `Err`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("conversion failed: cannot coerce {raw:?} to {target}")]
    Conversion { raw: String, target: String },

    #[error("missing description: kind {0:?} must carry a non-empty description")]
    MissingDescription(String),

    #[error("oracle format: no bracket-quoted answer in {0:?}")]
    OracleFormat(String),

    #[error("cycle in execution graph: {0}")]
    Cycle(String),

    #[error("operation runtime failure: {name} - {message}")]
    OperationRuntime { name: String, message: String },

    #[error("resolution exhausted after {attempts} attempts: {question}")]
    ResolutionExhausted { question: String, attempts: usize },

    #[error("unknown kind: {0}")]
    UnknownKind(String),

    #[error("oracle error: {0}")]
    Oracle(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn conversion(raw: impl Into<String>, target: impl std::fmt::Display) -> Self {
        Self::Conversion {
            raw: raw.into(),
            target: target.to_string(),
        }
    }

    pub fn operation_runtime(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::OperationRuntime {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn exhausted(question: impl Into<String>, attempts: usize) -> Self {
        Self::ResolutionExhausted {
            question: question.into(),
            attempts,
        }
    }
}
