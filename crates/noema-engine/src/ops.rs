//! Builtin leaf operations
//!
//! Concrete evaluation lives here, outside the resolution engine: an
//! arithmetic evaluator, a linear-system solver, and a script-bodied
//! text-to-equations extractor. `install_builtins` registers them with
//! their input/output slots and store links.

use crate::registry::{Body, NativeFn, OperationKind, Registry, ValueKind};
use noema_core::convert::split_list;
use noema_core::{Error, Result, TypedValue, ValueType};
use noema_store::{KnowledgeStore, Label, Rel};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Evaluate an arithmetic expression: `+ - * / ^`, parentheses, unary
/// minus. Shunting-yard into RPN, then a single evaluation pass.
pub fn eval_formula(text: &str) -> Result<f64> {
    let tokens = tokenize(text)?;
    let rpn = to_rpn(text, &tokens)?;
    eval_rpn(text, &rpn)
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Token {
    Num(f64),
    Op(char),
    LParen,
    RParen,
}

fn tokenize(text: &str) -> Result<Vec<Token>> {
    let normalized = text.replace('\u{2212}', "-");
    let chars: Vec<char> = normalized.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '+' | '*' | '/' | '^' => {
                tokens.push(Token::Op(c));
                i += 1;
            }
            '-' => {
                // unary at expression start, after an operator, or after '('
                let unary = matches!(
                    tokens.last(),
                    None | Some(Token::Op(_)) | Some(Token::LParen)
                );
                tokens.push(Token::Op(if unary { '~' } else { '-' }));
                i += 1;
            }
            d if d.is_ascii_digit() || d == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                let n = literal
                    .parse::<f64>()
                    .map_err(|_| Error::conversion(text, ValueType::Number))?;
                tokens.push(Token::Num(n));
            }
            _ => return Err(Error::conversion(text, ValueType::Number)),
        }
    }
    Ok(tokens)
}

fn precedence(op: char) -> u8 {
    match op {
        '~' => 4,
        '^' => 3,
        '*' | '/' => 2,
        _ => 1,
    }
}

fn right_associative(op: char) -> bool {
    matches!(op, '~' | '^')
}

fn to_rpn(text: &str, tokens: &[Token]) -> Result<Vec<Token>> {
    let mut output = Vec::new();
    let mut ops: Vec<Token> = Vec::new();
    for &token in tokens {
        match token {
            Token::Num(_) => output.push(token),
            Token::LParen => ops.push(token),
            Token::RParen => loop {
                match ops.pop() {
                    Some(Token::LParen) => break,
                    Some(op) => output.push(op),
                    None => return Err(Error::conversion(text, ValueType::Number)),
                }
            },
            Token::Op(op) => {
                while let Some(&Token::Op(top)) = ops.last() {
                    let tighter = precedence(top) > precedence(op)
                        || (precedence(top) == precedence(op) && !right_associative(op));
                    if tighter {
                        output.push(ops.pop().unwrap());
                    } else {
                        break;
                    }
                }
                ops.push(token);
            }
        }
    }
    while let Some(op) = ops.pop() {
        if op == Token::LParen {
            return Err(Error::conversion(text, ValueType::Number));
        }
        output.push(op);
    }
    Ok(output)
}

fn eval_rpn(text: &str, rpn: &[Token]) -> Result<f64> {
    let mut stack: Vec<f64> = Vec::new();
    for &token in rpn {
        match token {
            Token::Num(n) => stack.push(n),
            Token::Op('~') => {
                let a = stack.pop().ok_or_else(|| Error::conversion(text, ValueType::Number))?;
                stack.push(-a);
            }
            Token::Op(op) => {
                let b = stack.pop().ok_or_else(|| Error::conversion(text, ValueType::Number))?;
                let a = stack.pop().ok_or_else(|| Error::conversion(text, ValueType::Number))?;
                let r = match op {
                    '+' => a + b,
                    '-' => a - b,
                    '*' => a * b,
                    '/' => a / b,
                    '^' => a.powf(b),
                    _ => return Err(Error::conversion(text, ValueType::Number)),
                };
                stack.push(r);
            }
            _ => return Err(Error::conversion(text, ValueType::Number)),
        }
    }
    match stack.as_slice() {
        [result] => Ok(*result),
        _ => Err(Error::conversion(text, ValueType::Number)),
    }
}

/// Solve a system of linear equations given as strings like
/// `"2x + y = 5"`. Gaussian elimination with partial pivoting; variables
/// are ordered alphabetically.
pub fn solve_linear_system(equations: &[String]) -> Result<BTreeMap<String, f64>> {
    let parsed: Vec<(BTreeMap<String, f64>, f64)> = equations
        .iter()
        .map(|eq| parse_equation(eq))
        .collect::<Result<_>>()?;

    let mut variables: Vec<String> = Vec::new();
    for (coeffs, _) in &parsed {
        for var in coeffs.keys() {
            if !variables.contains(var) {
                variables.push(var.clone());
            }
        }
    }
    variables.sort();
    let n = variables.len();
    if n == 0 || parsed.len() < n {
        return Err(Error::operation_runtime(
            "solve-linear-system",
            format!("{} equations for {} unknowns", parsed.len(), n),
        ));
    }

    // augmented matrix, first n equations
    let mut m: Vec<Vec<f64>> = parsed
        .iter()
        .take(n)
        .map(|(coeffs, rhs)| {
            let mut row: Vec<f64> = variables
                .iter()
                .map(|v| coeffs.get(v).copied().unwrap_or(0.0))
                .collect();
            row.push(*rhs);
            row
        })
        .collect();

    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&a, &b| {
                m[a][col]
                    .abs()
                    .partial_cmp(&m[b][col].abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or(col);
        if m[pivot][col].abs() < 1e-12 {
            return Err(Error::operation_runtime("solve-linear-system", "singular system"));
        }
        m.swap(col, pivot);
        for row in 0..n {
            if row != col {
                let factor = m[row][col] / m[col][col];
                for k in col..=n {
                    m[row][k] -= factor * m[col][k];
                }
            }
        }
    }

    Ok(variables
        .into_iter()
        .enumerate()
        .map(|(i, var)| (var, m[i][n] / m[i][i]))
        .collect())
}

/// Parse one linear equation into variable coefficients and a constant
/// right-hand side.
fn parse_equation(equation: &str) -> Result<(BTreeMap<String, f64>, f64)> {
    let normalized = equation.replace('\u{2212}', "-").replace('*', "");
    let (lhs, rhs) = normalized
        .split_once('=')
        .ok_or_else(|| Error::operation_runtime("solve-linear-system", format!("no '=' in {:?}", equation)))?;

    let mut coeffs: BTreeMap<String, f64> = BTreeMap::new();
    let mut constant = 0.0;
    for (side, sign) in [(lhs, 1.0), (rhs, -1.0)] {
        for (var, coeff) in parse_terms(side)? {
            match var {
                Some(name) => *coeffs.entry(name).or_insert(0.0) += sign * coeff,
                None => constant -= sign * coeff,
            }
        }
    }
    Ok((coeffs, constant))
}

fn parse_terms(side: &str) -> Result<Vec<(Option<String>, f64)>> {
    let chars: Vec<char> = side.chars().collect();
    let mut terms = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            ' ' | '\t' => {
                i += 1;
                continue;
            }
            '+' => {
                i += 1;
                continue;
            }
            _ => {}
        }
        let mut sign = 1.0;
        while i < chars.len() && (chars[i] == '-' || chars[i] == ' ') {
            if chars[i] == '-' {
                sign = -sign;
            }
            i += 1;
        }
        let start = i;
        while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
            i += 1;
        }
        let coeff = if start == i {
            1.0
        } else {
            chars[start..i]
                .iter()
                .collect::<String>()
                .parse::<f64>()
                .map_err(|_| Error::operation_runtime("solve-linear-system", format!("bad term in {:?}", side)))?
        };
        while i < chars.len() && chars[i] == ' ' {
            i += 1;
        }
        let var_start = i;
        while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
            i += 1;
        }
        let var = if var_start == i {
            None
        } else {
            Some(chars[var_start..i].iter().collect::<String>())
        };
        if var.is_none() && start == var_start && start == i {
            // neither digits nor a variable name: unparseable character
            return Err(Error::operation_runtime("solve-linear-system", format!("bad term in {:?}", side)));
        }
        terms.push((var, sign * coeff));
    }
    Ok(terms)
}

/// Register the builtin kinds, operations, and their store links.
pub async fn install_builtins(registry: &Registry) -> Result<()> {
    registry
        .register_value(
            ValueKind::new("arithmetic-formula", "an arithmetic question to be calculated")
                .with_type(ValueType::Text)
                .with_example("1 + 2 * 3"),
        )
        .await?;
    registry
        .register_value(
            ValueKind::new("calculation-result", "calculation result of an arithmetic question")
                .with_type(ValueType::Number),
        )
        .await?;
    registry
        .register_value(
            ValueKind::new("problem-text", "the original problem text")
                .with_type(ValueType::Text),
        )
        .await?;
    registry
        .register_value(
            ValueKind::new("equation-list", "a list of linear equations extracted from a problem")
                .with_type(ValueType::List)
                .with_example("x + y = 3, x - y = 1"),
        )
        .await?;
    registry
        .register_value(
            ValueKind::new(
                "solution-map",
                "solution of a system of linear equations, from variable name to value",
            )
            .with_type(ValueType::Map),
        )
        .await?;

    let calculate: NativeFn = Arc::new(|args| {
        let formula = args
            .first()
            .map(TypedValue::as_text)
            .ok_or_else(|| Error::operation_runtime("calculate-formula", "missing formula"))?;
        eval_formula(&formula).map(TypedValue::Number)
    });
    registry
        .register_operation(OperationKind::new(
            "calculate-formula",
            "calculate the result of an arithmetic formula",
            vec!["arithmetic-formula".into()],
            vec!["calculation-result".into()],
            Body::Native(calculate),
        ))
        .await?;
    link(registry, "calculate-formula", &["arithmetic-formula"], "calculation-result").await?;

    let solve: NativeFn = Arc::new(|args| {
        let equations: Vec<String> = match args.first() {
            Some(TypedValue::List(items)) => items.clone(),
            Some(other) => split_list(&other.as_text()),
            None => return Err(Error::operation_runtime("solve-linear-system", "missing equations")),
        };
        solve_linear_system(&equations).map(TypedValue::Map)
    });
    registry
        .register_operation(OperationKind::new(
            "solve-linear-system",
            "solve a system of linear equations for its variables",
            vec!["equation-list".into()],
            vec!["solution-map".into()],
            Body::Native(solve),
        ))
        .await?;
    link(registry, "solve-linear-system", &["equation-list"], "solution-map").await?;

    registry
        .register_operation(OperationKind::new(
            "text-to-equations",
            "translate a word problem into a list of linear equations",
            vec!["problem-text".into()],
            vec!["equation-list".into()],
            Body::Script {
                source: "Read the problem text, introduce one variable per unknown \
                         quantity, and write one linear equation per stated \
                         relationship between them."
                    .into(),
                rejected: Vec::new(),
            },
        ))
        .await?;
    link(registry, "text-to-equations", &["problem-text"], "equation-list").await?;

    Ok(())
}

async fn link(registry: &Registry, op: &str, inputs: &[&str], output: &str) -> Result<()> {
    let store = registry.store();
    for input in inputs {
        store
            .create_relationship((Label::Operation, op), (Label::Value, input), Rel::Input)
            .await
            .map_err(Error::from)?;
    }
    store
        .create_relationship((Label::Operation, op), (Label::Value, output), Rel::Output)
        .await
        .map_err(Error::from)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use noema_oracle::HashEmbedder;
    use noema_store::MemoryStore;

    #[test]
    fn arithmetic_basics() {
        assert_eq!(eval_formula("1+1").unwrap(), 2.0);
        assert_eq!(eval_formula("2 + 3 * 4").unwrap(), 14.0);
        assert_eq!(eval_formula("(2 + 3) * 4").unwrap(), 20.0);
        assert_eq!(eval_formula("2 ^ 3 ^ 2").unwrap(), 512.0);
        assert_eq!(eval_formula("-3 + 5").unwrap(), 2.0);
        assert_eq!(eval_formula("10 / 4").unwrap(), 2.5);
        assert_eq!(eval_formula("-(2 + 1)").unwrap(), -3.0);
    }

    #[test]
    fn arithmetic_rejects_garbage() {
        assert!(eval_formula("hello").is_err());
        assert!(eval_formula("(1 + 2").is_err());
        assert!(eval_formula("1 +").is_err());
        assert!(eval_formula("").is_err());
    }

    #[test]
    fn linear_system_two_unknowns() {
        let solution = solve_linear_system(&[
            "x + y = 11".to_string(),
            "x - y = 10".to_string(),
        ])
        .unwrap();
        assert!((solution["x"] - 10.5).abs() < 1e-9);
        assert!((solution["y"] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn linear_system_coefficients_and_sides() {
        let solution = solve_linear_system(&[
            "2x + 3y = 12".to_string(),
            "4 = x - y".to_string(),
        ])
        .unwrap();
        assert!((solution["x"] - 4.8).abs() < 1e-9);
        assert!((solution["y"] - 0.8).abs() < 1e-9);
    }

    #[test]
    fn linear_system_unicode_minus() {
        let solution = solve_linear_system(&[
            "x \u{2212} y = 1".to_string(),
            "x + y = 3".to_string(),
        ])
        .unwrap();
        assert!((solution["x"] - 2.0).abs() < 1e-9);
        assert!((solution["y"] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn linear_system_failures() {
        assert!(solve_linear_system(&["x + y = 1".to_string()]).is_err());
        assert!(solve_linear_system(&[
            "x + y = 1".to_string(),
            "2x + 2y = 2".to_string(),
        ])
        .is_err());
        assert!(solve_linear_system(&["no equals sign".to_string(), "x = 1".to_string()]).is_err());
    }

    #[tokio::test]
    async fn builtins_register_and_link() {
        let store = Arc::new(MemoryStore::new());
        let registry = Registry::new(Arc::new(HashEmbedder::new(64)), store.clone());
        install_builtins(&registry).await.unwrap();
        // second install is a no-op
        install_builtins(&registry).await.unwrap();

        assert!(registry.operation("calculate-formula").is_some());
        let producers = store
            .linked_nodes(Label::Value, "calculation-result", Rel::Output)
            .await
            .unwrap();
        assert_eq!(producers, vec!["calculate-formula"]);
        let consumers = store
            .linked_nodes(Label::Operation, "text-to-equations", Rel::Input)
            .await
            .unwrap();
        assert_eq!(consumers, vec!["problem-text"]);
    }
}
