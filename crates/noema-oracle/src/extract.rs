//! Bracket-quoted answer extraction
//!
//! Oracle responses are free text; the structured answer is whatever sits
//! inside `[ ]`. A bracketless response is re-asked a bounded number of
//! times and then surfaces as `Error::OracleFormat`.

use crate::provider::{Oracle, Sampling};
use noema_core::{Error, Result};
use regex::Regex;
use std::sync::OnceLock;
use tracing::warn;

fn bracket_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[([^\[\]]*)\]").expect("static regex"))
}

/// All bracket-quoted spans in order of appearance.
pub fn bracketed(text: &str) -> Vec<String> {
    bracket_re()
        .captures_iter(text)
        .map(|c| c[1].trim().to_string())
        .collect()
}

/// The first bracket-quoted span, if any.
pub fn first_bracketed(text: &str) -> Option<String> {
    bracketed(text).into_iter().next()
}

/// Ask the oracle and return the bracketed spans of its answer, re-asking
/// up to `retries` times when the response carries no brackets.
pub async fn ask_bracketed(
    oracle: &dyn Oracle,
    prompt: &str,
    sampling: &Sampling,
    retries: usize,
) -> Result<Vec<String>> {
    let mut last = String::new();
    for attempt in 0..=retries {
        let text = oracle.ask(prompt, sampling).await.map_err(Error::from)?;
        let spans = bracketed(&text);
        if !spans.is_empty() {
            return Ok(spans);
        }
        warn!(attempt, "oracle answer had no bracketed span, re-asking");
        last = text;
    }
    Err(Error::OracleFormat(truncate(&last, 200)))
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    // back off to a char boundary so multi-byte text never panics the slice
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}
