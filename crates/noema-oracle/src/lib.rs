//! noema-oracle — reasoning-oracle contract and providers
//!
//! The engine treats the oracle as a black box: one prompt in, free text
//! out. Structure is recovered afterwards from bracket-quoted spans.

pub mod anthropic;
pub mod embed;
pub mod extract;
pub mod provider;
pub mod scripted;

pub use anthropic::AnthropicOracle;
pub use embed::{cosine, Embedder, HashEmbedder, HttpEmbedder};
pub use extract::{ask_bracketed, bracketed, first_bracketed};
pub use provider::{Oracle, OracleError, OracleResult, Sampling};
pub use scripted::ScriptedOracle;
