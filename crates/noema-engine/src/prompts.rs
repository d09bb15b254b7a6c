//! Prompt templates
//!
//! Every ask follows the same convention: the structured part of the
//! answer goes inside square brackets, everything else is ignored.

use crate::registry::{OperationKind, ValueKind};
use noema_core::TypedValue;

/// What kind of final answer does the question call for.
pub fn seek_output(question: &str) -> String {
    format!(
        "You are planning how to solve a problem by working backwards from \
         its answer.\n\
         Problem: {question}\n\
         What kind of information should the final outputs of the solution \
         be? Describe the final outputs in one short phrase inside square \
         brackets, for example [the total price in dollars]."
    )
}

/// Yes/no: does the problem statement supply this information directly.
pub fn information_match(question: &str, slot_description: &str) -> String {
    format!(
        "Let's play a matching game. I give you a problem and a piece of \
         required information; you judge whether the problem statement \
         ALREADY states that information directly, with no derivation or \
         calculation allowed.\n\
         Problem: {question}\n\
         Required information: {slot_description}\n\
         Answer [1] if it is stated directly, [0] if it would have to be \
         derived."
    )
}

/// Propose the next operation producing `target`, with the downstream
/// chain as context once one exists.
pub fn propose_step(question: &str, target_description: &str, chain: &[String]) -> String {
    let context = if chain.is_empty() {
        String::new()
    } else {
        format!(
            "We have already planned these later steps, closest to the \
             answer first: {}.\n",
            chain.join("; ")
        )
    };
    format!(
        "We are planning backwards from the answer of a problem.\n\
         Problem: {question}\n\
         {context}\
         We now need to produce: {target_description}.\n\
         What is the next operation that would produce it in a single step? \
         Answer with two bracketed parts: the next operation as a short \
         imperative phrase, then the information it needs as input, for \
         example [solve the equations] [a list of equations]. Separate \
         several inputs with commas inside the second bracket."
    )
}

/// Disambiguate among candidate operations; `0` means none match.
pub fn direct_match(
    purpose: &str,
    output_description: &str,
    candidates: &[(String, String)],
) -> String {
    let listing: Vec<String> = candidates
        .iter()
        .enumerate()
        .map(|(i, (name, description))| format!("{}. {} — {}", i + 1, name, description))
        .collect();
    format!(
        "We need an operation whose purpose is: {purpose}, producing: \
         {output_description}.\n\
         Here are existing operations:\n{}\n\
         Tell me which ONE of them, if any, already does exactly this. \
         Answer with its number in brackets, for example [1], or [0] if \
         none of them matches.",
        listing.join("\n")
    )
}

/// Guess a concrete data type for a described piece of information.
pub fn guess_type(description: &str) -> String {
    format!(
        "What data type best fits this information: {description}?\n\
         Choose one of: number, integer, boolean, text, list, number list, \
         map. Answer inside brackets, for example [number]."
    )
}

/// One plausible example value for a described input.
pub fn example_value(description: &str, type_name: &str) -> String {
    format!(
        "Give one plausible example value for: {description} (type: \
         {type_name}). Answer inside brackets, for example [42]."
    )
}

/// Generate (or regenerate) a script body. Rejected sources are listed so
/// the oracle does not repeat them.
pub fn generate_body(
    description: &str,
    inputs: &[(String, String, String)],
    output_description: &str,
    rejected: &[String],
) -> String {
    let listing: Vec<String> = inputs
        .iter()
        .map(|(name, ty, desc)| format!("- {} ({}): {}", name, ty, desc))
        .collect();
    let history = if rejected.is_empty() {
        String::new()
    } else {
        let failed: Vec<String> = rejected.iter().map(|r| format!("- {}", r)).collect();
        format!(
            "\nThese procedures were previously rejected because they failed \
             at run time; write a different one:\n{}",
            failed.join("\n")
        )
    };
    format!(
        "Write the procedure for an operation.\n\
         Operation: {description}\n\
         Inputs:\n{}\n\
         Output: {output_description}\n\
         State the exact procedure that computes the output from the \
         inputs, inside one pair of square brackets.{history}",
        listing.join("\n")
    )
}

/// Read a terminal value straight out of the problem statement.
pub fn extract_input(question: &str, slot_description: &str) -> String {
    format!(
        "Problem: {question}\n\
         Give the value of: {slot_description}, taken directly from the \
         problem text with no derivation. Answer inside brackets; if the \
         problem does not state it, answer [none]."
    )
}

/// Carry out a script body against concrete inputs.
pub fn run_script(op: &OperationKind, source: &str, inputs: &[(String, TypedValue)]) -> String {
    let listing: Vec<String> = inputs
        .iter()
        .map(|(name, value)| format!("- {} = {}", name, value))
        .collect();
    format!(
        "Carry out the following procedure exactly and report only its \
         final result.\n\
         Operation: {}\n\
         Procedure: {source}\n\
         Inputs:\n{}\n\
         Answer with the result inside one pair of square brackets.",
        op.description,
        listing.join("\n")
    )
}

/// One validation vote on a produced answer.
pub fn validate(question: &str, answer: &str) -> String {
    format!(
        "Problem: {question}\n\
         Proposed answer: {answer}\n\
         Is this the correct final answer to the problem? Answer [1] for \
         yes, [0] for no."
    )
}

/// Strip answer content the question did not ask for.
pub fn refine(question: &str, answer: &str) -> String {
    format!(
        "Problem: {question}\n\
         Full answer: {answer}\n\
         Rewrite the answer keeping only what the question's literal ask \
         requires, inside one pair of square brackets."
    )
}

/// Full prompting description of a value kind, example included.
pub fn describe_slot(kind: &ValueKind) -> String {
    kind.full_description()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_prompt_carries_rejected_history() {
        let prompt = generate_body(
            "solve the equations",
            &[("eqs".into(), "list".into(), "a list of equations".into())],
            "the solution map",
            &["use trial and error".into()],
        );
        assert!(prompt.contains("previously rejected"));
        assert!(prompt.contains("use trial and error"));
        let fresh = generate_body("solve the equations", &[], "the solution map", &[]);
        assert!(!fresh.contains("previously rejected"));
    }

    #[test]
    fn candidates_are_numbered_from_one() {
        let prompt = direct_match(
            "calculate a formula",
            "a number",
            &[("calc".into(), "calculate stuff".into())],
        );
        assert!(prompt.contains("1. calc"));
        assert!(prompt.contains("[0]"));
    }
}
