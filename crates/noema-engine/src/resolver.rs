//! Resolution engine
//!
//! Demand-driven graph construction: ask what the final answer looks
//! like, then repeatedly find or synthesize an operation for every
//! pending slot until only terminal leaves remain. Execution, repair,
//! cycle rollback, and validation are explicit bounded loops; running
//! out of budget is the only error that crosses this boundary.

use crate::graph::{ExecutionGraph, NodeId, NodeKind, RunOutcome, TerminalSource};
use crate::prompts;
use crate::registry::{Body, OperationKind, Registry, ValueKind};
use crate::script::ScriptRunner;
use async_trait::async_trait;
use noema_core::{EngineConfig, Error, Result, TypedValue, ValueType};
use noema_oracle::{ask_bracketed, Embedder, Oracle, Sampling};
use noema_store::{KnowledgeStore, Label, Rel};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// An accepted answer: the refined text plus the raw head value.
#[derive(Clone, Debug)]
pub struct Resolution {
    pub answer: String,
    pub value: TypedValue,
}

type Link = ((Label, String), (Label, String), Rel);

/// One construction attempt: the graph under assembly, the worklist of
/// slots still needing a producer, the downstream chain for prompting
/// context, and the store links created so far (undone on a cycle).
struct Attempt {
    graph: ExecutionGraph,
    pending: VecDeque<(String, NodeId)>,
    chain: Vec<String>,
    links: Vec<Link>,
}

pub struct Resolver {
    registry: Arc<Registry>,
    oracle: Arc<dyn Oracle>,
    runner: Arc<dyn ScriptRunner>,
    config: EngineConfig,
    sampling: Sampling,
}

impl Resolver {
    pub fn new(
        registry: Arc<Registry>,
        oracle: Arc<dyn Oracle>,
        runner: Arc<dyn ScriptRunner>,
        config: EngineConfig,
    ) -> Self {
        let sampling = Sampling {
            temperature: config.oracle.temperature,
            max_tokens: config.oracle.max_tokens,
        };
        Self { registry, oracle, runner, config, sampling }
    }

    /// Resolve a question to a validated answer.
    pub async fn resolve(&self, question: &str) -> Result<Resolution> {
        let mut cycle_fixes = 0;
        let mut restarts = 0;
        let mut attempts = 0;
        loop {
            attempts += 1;
            info!(attempts, question, "building execution graph");
            let mut attempt = self.build(question).await?;
            let outcome = self.execute(question, &mut attempt).await?;
            match outcome {
                RunOutcome::Cycle => {
                    self.rollback(&attempt.links).await?;
                    cycle_fixes += 1;
                    if cycle_fixes > self.config.retries.max_cycle_fixes {
                        return Err(Error::Cycle(question.to_string()));
                    }
                    info!(cycle_fixes, "cycle detected, links rolled back, rebuilding");
                }
                RunOutcome::Failing(node) => {
                    warn!(?node, "repair budget spent on failing node");
                    return Err(Error::exhausted(question, attempts));
                }
                RunOutcome::Empty => {
                    restarts += 1;
                    if restarts > self.config.retries.max_restarts {
                        return Err(Error::exhausted(question, attempts));
                    }
                    info!(restarts, "head produced no value, restarting");
                }
                RunOutcome::Value(value) => {
                    if self.validate(question, &value).await? {
                        let answer = self.refine(question, &value).await?;
                        info!(%answer, "answer accepted");
                        return Ok(Resolution { answer, value });
                    }
                    restarts += 1;
                    if restarts > self.config.retries.max_restarts {
                        return Err(Error::exhausted(question, attempts));
                    }
                    info!(restarts, "answer rejected by validation, restarting");
                }
            }
        }
    }

    /// SeekOutput, then drain the pending queue into a wired graph.
    async fn build(&self, question: &str) -> Result<Attempt> {
        let head_kind = self.seek_output(question).await?;
        let mut graph = ExecutionGraph::new(question);
        let head = graph.ensure_slot(&head_kind.name);
        graph.set_head(head);
        let mut attempt = Attempt {
            graph,
            pending: VecDeque::from([(head_kind.name.clone(), head)]),
            chain: Vec::new(),
            links: Vec::new(),
        };
        self.filter_pending(question, &mut attempt).await?;
        self.drain_pending(question, &mut attempt).await?;
        Ok(attempt)
    }

    async fn drain_pending(&self, question: &str, attempt: &mut Attempt) -> Result<()> {
        while let Some((name, node)) = attempt.pending.pop_front() {
            self.expand_slot(question, attempt, &name, node).await?;
            self.filter_pending(question, attempt).await?;
        }
        Ok(())
    }

    /// What kind of final answer the question calls for; reuse a stored
    /// slot kind when one is similar enough, register a new one otherwise.
    async fn seek_output(&self, question: &str) -> Result<Arc<ValueKind>> {
        let description = self.ask_first(prompts::seek_output(question)).await?;
        let embedding = self
            .registry
            .embedder()
            .embed(&description)
            .await
            .map_err(Error::from)?;
        let hits = self
            .registry
            .store()
            .nearest_by_embedding(Label::Value, &embedding, 1)
            .await
            .map_err(Error::from)?;
        if let Some(hit) = hits.first() {
            if hit.score as f64 >= self.config.search.similarity_threshold {
                if let Some(kind) = self.registry.value(&hit.name) {
                    info!(kind = %hit.name, score = hit.score, "reusing stored output kind");
                    return Ok(kind);
                }
            }
        }
        self.registry
            .register_value(ValueKind::new(kind_name(&description), description))
            .await
    }

    /// Drop pending slots the problem statement supplies directly; they
    /// resolve as terminal leaves at execution time.
    async fn filter_pending(&self, question: &str, attempt: &mut Attempt) -> Result<()> {
        let mut kept = VecDeque::new();
        while let Some((name, node)) = attempt.pending.pop_front() {
            let description = self
                .registry
                .value(&name)
                .map(|k| prompts::describe_slot(&k))
                .unwrap_or_else(|| name.clone());
            let verdict = self
                .ask_first(prompts::information_match(question, &description))
                .await?;
            if is_yes(&verdict) {
                debug!(slot = %name, "directly supplied, resolved at execution time");
            } else {
                kept.push_back((name, node));
            }
        }
        attempt.pending = kept;
        Ok(())
    }

    /// Find or synthesize the operation producing one pending slot, and
    /// wire it plus its inputs into the graph.
    async fn expand_slot(
        &self,
        question: &str,
        attempt: &mut Attempt,
        name: &str,
        node: NodeId,
    ) -> Result<()> {
        let target = self
            .registry
            .value(name)
            .ok_or_else(|| Error::UnknownKind(name.to_string()))?;

        let spans = self
            .ask(prompts::propose_step(question, &target.description, &attempt.chain))
            .await?;
        let proposed_op = spans.first().cloned().unwrap_or_default();
        let proposed_inputs = spans.get(1).map(|s| split_inputs(s)).unwrap_or_default();
        debug!(slot = %name, %proposed_op, ?proposed_inputs, "oracle proposed next step");

        let linked = self
            .registry
            .store()
            .linked_nodes(Label::Value, name, Rel::Output)
            .await
            .map_err(Error::from)?;
        let mut candidates: Vec<Arc<OperationKind>> = linked
            .iter()
            .filter_map(|n| self.registry.operation(n))
            .collect();
        if candidates.is_empty() {
            let embedding = self
                .registry
                .embedder()
                .embed(&proposed_op)
                .await
                .map_err(Error::from)?;
            candidates = self
                .registry
                .k_similar_operations(&embedding, self.config.search.similar_candidates);
        }

        let chosen = if candidates.is_empty() {
            None
        } else {
            self.direct_match(&proposed_op, &target.description, &candidates)
                .await?
        };

        let op = match chosen {
            Some(op) => {
                if !linked.contains(&op.name) {
                    let link: Link = (
                        (Label::Operation, op.name.clone()),
                        (Label::Value, name.to_string()),
                        Rel::Output,
                    );
                    self.registry
                        .store()
                        .create_relationship(
                            (link.0 .0, &link.0 .1),
                            (link.1 .0, &link.1 .1),
                            link.2,
                        )
                        .await
                        .map_err(Error::from)?;
                    attempt.links.push(link);
                }
                info!(op = %op.name, slot = %name, "matched existing operation");
                op
            }
            None => {
                self.synthesize(attempt, &target, &proposed_op, &proposed_inputs)
                    .await?
            }
        };

        let op_node = attempt.graph.ensure_op(&op.name);
        attempt.graph.insert_child(node, op_node);
        for input in &op.inputs {
            let known = attempt.graph.find_slot(input).is_some();
            let input_node = attempt.graph.ensure_slot(input);
            attempt.graph.insert_child(op_node, input_node);
            if !known && !attempt.pending.iter().any(|(n, _)| n == input) {
                attempt.pending.push_back((input.clone(), input_node));
            }
        }
        attempt.chain.push(op.description.clone());
        Ok(())
    }

    /// Which of the candidate operations, if any, already does the job.
    async fn direct_match(
        &self,
        purpose: &str,
        output_description: &str,
        candidates: &[Arc<OperationKind>],
    ) -> Result<Option<Arc<OperationKind>>> {
        let listing: Vec<(String, String)> = candidates
            .iter()
            .map(|op| (op.name.clone(), op.description.clone()))
            .collect();
        let verdict = self
            .ask_first(prompts::direct_match(purpose, output_description, &listing))
            .await?;
        let verdict = verdict.trim();
        if verdict.eq_ignore_ascii_case("no") || verdict == "0" {
            return Ok(None);
        }
        match verdict.parse::<usize>() {
            Ok(index) if index >= 1 && index <= candidates.len() => {
                Ok(Some(candidates[index - 1].clone()))
            }
            _ => Ok(None),
        }
    }

    /// Build a brand-new operation for `target`: guess missing types,
    /// register one input kind per proposed description (reusing stored
    /// kinds that are similar enough), generate a script body, and record
    /// the store links.
    async fn synthesize(
        &self,
        attempt: &mut Attempt,
        target: &Arc<ValueKind>,
        proposed_op: &str,
        proposed_inputs: &[String],
    ) -> Result<Arc<OperationKind>> {
        let target = if target.expected_type.is_none() {
            let guess = self.ask_first(prompts::guess_type(&target.description)).await?;
            self.registry
                .set_value_type(&target.name, ValueType::guess(&guess))?
        } else {
            target.clone()
        };

        let mut input_names = Vec::new();
        for description in proposed_inputs {
            let embedding = self
                .registry
                .embedder()
                .embed(description)
                .await
                .map_err(Error::from)?;
            let hits = self
                .registry
                .store()
                .nearest_by_embedding(Label::Value, &embedding, 1)
                .await
                .map_err(Error::from)?;
            let reused = hits.first().and_then(|hit| {
                (hit.score as f64 >= self.config.search.similarity_threshold)
                    .then(|| self.registry.value(&hit.name))
                    .flatten()
            });
            let input_name = match reused {
                Some(kind) => {
                    debug!(kind = %kind.name, "reusing stored input kind");
                    kind.name.clone()
                }
                None => {
                    let guess = self.ask_first(prompts::guess_type(description)).await?;
                    let ty = ValueType::guess(&guess);
                    let example = self
                        .ask_first(prompts::example_value(description, ty.as_str()))
                        .await?;
                    let kind = self
                        .registry
                        .register_value(
                            ValueKind::new(kind_name(description), description.clone())
                                .with_type(ty)
                                .with_example(example),
                        )
                        .await?;
                    kind.name.clone()
                }
            };
            input_names.push(input_name);
        }

        let inputs_meta = self.inputs_meta(&input_names);
        let source = self
            .ask_first(prompts::generate_body(
                proposed_op,
                &inputs_meta,
                &target.description,
                &[],
            ))
            .await?;

        let op = self
            .registry
            .register_operation(OperationKind::new(
                kind_name(proposed_op),
                proposed_op,
                input_names.clone(),
                vec![target.name.clone()],
                Body::Script { source, rejected: Vec::new() },
            ))
            .await?;
        info!(op = %op.name, "synthesized new operation");

        let store = self.registry.store();
        for input in &input_names {
            let link: Link = (
                (Label::Operation, op.name.clone()),
                (Label::Value, input.clone()),
                Rel::Input,
            );
            store
                .create_relationship((link.0 .0, &link.0 .1), (link.1 .0, &link.1 .1), link.2)
                .await
                .map_err(Error::from)?;
            attempt.links.push(link);
        }
        let link: Link = (
            (Label::Operation, op.name.clone()),
            (Label::Value, target.name.clone()),
            Rel::Output,
        );
        store
            .create_relationship((link.0 .0, &link.0 .1), (link.1 .0, &link.1 .1), link.2)
            .await
            .map_err(Error::from)?;
        attempt.links.push(link);

        Ok(op)
    }

    /// Run the graph, repairing failing nodes within the repair budget.
    async fn execute(&self, question: &str, attempt: &mut Attempt) -> Result<RunOutcome> {
        let terminal = OracleTerminal {
            oracle: self.oracle.clone(),
            sampling: self.sampling.clone(),
            retries: self.config.retries.oracle_retries,
        };
        let mut repairs = 0;
        loop {
            let outcome = attempt
                .graph
                .run(&self.registry, &terminal, self.runner.as_ref())
                .await;
            let RunOutcome::Failing(node) = outcome else {
                return Ok(outcome);
            };
            repairs += 1;
            if repairs > self.config.retries.max_repairs {
                return Ok(RunOutcome::Failing(node));
            }
            match attempt.graph.node_kind(node).clone() {
                NodeKind::Op(name) => {
                    info!(op = %name, repairs, "regenerating failed operation body");
                    self.regenerate_body(&name).await?;
                }
                NodeKind::Slot(name) => {
                    info!(slot = %name, repairs, "failing slot, seeking a producer for it");
                    self.expand_slot(question, attempt, &name, node).await?;
                    self.filter_pending(question, attempt).await?;
                    self.drain_pending(question, attempt).await?;
                }
            }
        }
    }

    /// Regenerate a script body, feeding every rejected source back into
    /// the prompt so it is not proposed again.
    async fn regenerate_body(&self, name: &str) -> Result<()> {
        let op = self
            .registry
            .operation(name)
            .ok_or_else(|| Error::UnknownKind(name.to_string()))?;
        let Body::Script { source, rejected } = &op.body else {
            return Err(Error::operation_runtime(name, "native body cannot be regenerated"));
        };
        let mut history = rejected.clone();
        history.push(source.clone());

        let output_description = op
            .outputs
            .first()
            .and_then(|n| self.registry.value(n))
            .map(|k| k.description.clone())
            .unwrap_or_default();
        let inputs_meta = self.inputs_meta(&op.inputs);
        let new_source = self
            .ask_first(prompts::generate_body(
                &op.description,
                &inputs_meta,
                &output_description,
                &history,
            ))
            .await?;
        self.registry.replace_body(name, new_source)?;
        Ok(())
    }

    /// Sequential yes/no votes on the produced answer.
    async fn validate(&self, question: &str, value: &TypedValue) -> Result<bool> {
        let answer = value.to_string();
        let votes = self.config.validation.votes.max(1);
        let mut yes = 0;
        for _ in 0..votes {
            let verdict = self.ask_first(prompts::validate(question, &answer)).await?;
            if is_yes(&verdict) {
                yes += 1;
            }
        }
        let fraction = yes as f64 / votes as f64;
        info!(yes, votes, fraction, "validation votes counted");
        Ok(fraction >= self.config.validation.threshold)
    }

    /// Strip everything the question's literal ask does not require.
    async fn refine(&self, question: &str, value: &TypedValue) -> Result<String> {
        self.ask_first(prompts::refine(question, &value.to_string()))
            .await
    }

    async fn rollback(&self, links: &[Link]) -> Result<()> {
        let store = self.registry.store();
        for (from, to, rel) in links {
            store
                .delete_relationship((from.0, &from.1), (to.0, &to.1), *rel)
                .await
                .map_err(Error::from)?;
        }
        Ok(())
    }

    fn inputs_meta(&self, input_names: &[String]) -> Vec<(String, String, String)> {
        input_names
            .iter()
            .map(|name| {
                let kind = self.registry.value(name);
                let ty = kind
                    .as_ref()
                    .and_then(|k| k.expected_type)
                    .unwrap_or(ValueType::Text);
                let description = kind
                    .map(|k| k.full_description())
                    .unwrap_or_else(|| name.clone());
                (name.clone(), ty.as_str().to_string(), description)
            })
            .collect()
    }

    async fn ask(&self, prompt: String) -> Result<Vec<String>> {
        ask_bracketed(
            self.oracle.as_ref(),
            &prompt,
            &self.sampling,
            self.config.retries.oracle_retries,
        )
        .await
    }

    async fn ask_first(&self, prompt: String) -> Result<String> {
        let mut spans = self.ask(prompt).await?;
        Ok(spans.remove(0))
    }
}

fn is_yes(verdict: &str) -> bool {
    let v = verdict.trim();
    v == "1" || v.eq_ignore_ascii_case("yes")
}

/// Comma-separated input descriptions; `none` means the operation needs
/// no inputs at all.
fn split_inputs(span: &str) -> Vec<String> {
    span.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("none"))
        .map(str::to_string)
        .collect()
}

/// Stable slug plus a short random suffix so synthesized kinds never
/// collide by name.
fn kind_name(description: &str) -> String {
    let slug: String = description
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let slug: Vec<&str> = slug.split('-').filter(|s| !s.is_empty()).take(5).collect();
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", slug.join("-"), &suffix[..8])
}

/// Terminal-input path: ask the oracle to read the slot's value straight
/// out of the problem statement.
struct OracleTerminal {
    oracle: Arc<dyn Oracle>,
    sampling: Sampling,
    retries: usize,
}

#[async_trait]
impl TerminalSource for OracleTerminal {
    async fn terminal_value(&self, question: &str, kind: &ValueKind) -> Result<String> {
        let prompt = prompts::extract_input(question, &kind.full_description());
        let mut spans =
            ask_bracketed(self.oracle.as_ref(), &prompt, &self.sampling, self.retries).await?;
        let raw = spans.remove(0);
        if raw.trim().eq_ignore_ascii_case("none") {
            return Err(Error::Oracle(format!(
                "problem text does not state {}",
                kind.description
            )));
        }
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_are_sluggy_and_unique() {
        let a = kind_name("Solve the system of linear equations!");
        let b = kind_name("Solve the system of linear equations!");
        assert!(a.starts_with("solve-the-system-of-linear-"));
        assert_ne!(a, b);
    }

    #[test]
    fn yes_verdicts() {
        assert!(is_yes("1"));
        assert!(is_yes(" yes "));
        assert!(!is_yes("0"));
        assert!(!is_yes("no"));
    }

    #[test]
    fn input_descriptions_split_on_commas_only() {
        assert_eq!(
            split_inputs("a list of linear equations"),
            vec!["a list of linear equations"]
        );
        assert_eq!(
            split_inputs("the problem text, a list of hints"),
            vec!["the problem text", "a list of hints"]
        );
        assert!(split_inputs("none").is_empty());
        assert!(split_inputs("").is_empty());
    }
}
