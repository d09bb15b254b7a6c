//! ScriptedOracle — deterministic oracle responses for testing
//!
//! Routes are matched by prompt substring; each route holds a queue of
//! responses consumed in order, with the last response sticky once the
//! queue runs dry. Every prompt is recorded in a transcript so tests can
//! assert on what the engine actually asked.

use crate::provider::{Oracle, OracleResult, Sampling};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

struct Route {
    needle: String,
    queue: VecDeque<String>,
    last: String,
}

pub struct ScriptedOracle {
    routes: Mutex<Vec<Route>>,
    fallback: String,
    transcript: Mutex<Vec<String>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self {
            routes: Mutex::new(Vec::new()),
            fallback: "[no]".to_string(),
            transcript: Mutex::new(Vec::new()),
        }
    }

    /// Add a response for prompts containing `needle`. Repeated calls with
    /// the same needle enqueue responses consumed in order.
    pub fn route(self, needle: impl Into<String>, response: impl Into<String>) -> Self {
        let needle = needle.into();
        let response = response.into();
        {
            let mut routes = self.routes.lock().unwrap();
            if let Some(route) = routes.iter_mut().find(|r| r.needle == needle) {
                route.queue.push_back(response.clone());
                route.last = response;
            } else {
                let mut queue = VecDeque::new();
                queue.push_back(response.clone());
                routes.push(Route { needle, queue, last: response });
            }
        }
        self
    }

    /// Response for prompts matching no route.
    pub fn fallback(mut self, response: impl Into<String>) -> Self {
        self.fallback = response.into();
        self
    }

    /// Every prompt asked so far, in order.
    pub fn transcript(&self) -> Vec<String> {
        self.transcript.lock().unwrap().clone()
    }

    /// How many asked prompts contained `needle`.
    pub fn asks_containing(&self, needle: &str) -> usize {
        self.transcript
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.contains(needle))
            .count()
    }
}

impl Default for ScriptedOracle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn ask(&self, prompt: &str, _sampling: &Sampling) -> OracleResult<String> {
        self.transcript.lock().unwrap().push(prompt.to_string());
        let mut routes = self.routes.lock().unwrap();
        for route in routes.iter_mut() {
            if prompt.contains(&route.needle) {
                return Ok(route.queue.pop_front().unwrap_or_else(|| route.last.clone()));
            }
        }
        Ok(self.fallback.clone())
    }
}
