//! End-to-end resolution against a scripted oracle.

use async_trait::async_trait;
use noema_core::{EngineConfig, Error, Result, TypedValue};
use noema_engine::{
    install_builtins, OperationKind, OracleScriptRunner, Registry, Resolver, ScriptRunner,
};
use noema_oracle::{HashEmbedder, Sampling, ScriptedOracle};
use noema_store::MemoryStore;
use std::collections::BTreeMap;
use std::sync::Arc;

async fn resolver_with(
    oracle: ScriptedOracle,
    runner: Option<Arc<dyn ScriptRunner>>,
    config: EngineConfig,
    builtins: bool,
) -> (Resolver, Arc<ScriptedOracle>) {
    let oracle = Arc::new(oracle);
    let registry = Arc::new(Registry::new(
        Arc::new(HashEmbedder::new(64)),
        Arc::new(MemoryStore::new()),
    ));
    if builtins {
        install_builtins(&registry).await.unwrap();
    }
    let runner = runner.unwrap_or_else(|| {
        Arc::new(OracleScriptRunner::new(oracle.clone(), Sampling::default(), 1))
    });
    let resolver = Resolver::new(registry, oracle.clone(), runner, config);
    (resolver, oracle)
}

#[tokio::test]
async fn scenario_one_reuses_registered_operation() {
    let oracle = ScriptedOracle::new()
        .route("final outputs", "[calculation result of an arithmetic question]")
        .route("matching game", "[0]")
        .route("matching game", "[1]")
        .route(
            "next operation",
            "[calculate the arithmetic formula] [an arithmetic question to be calculated]",
        )
        .route("which ONE", "[1]")
        .route("Give the value", "[1+1]")
        .route("correct final answer", "[1]")
        .route("literal ask", "[2]");

    let (resolver, oracle) = resolver_with(oracle, None, EngineConfig::default(), true).await;
    let resolution = resolver.resolve("1+1").await.unwrap();

    assert_eq!(resolution.value, TypedValue::Number(2.0));
    assert_eq!(resolution.answer, "2");
    // the stored output kind and operation were reused, nothing synthesized
    assert_eq!(oracle.asks_containing("final outputs"), 1);
    assert_eq!(oracle.asks_containing("Write the procedure"), 0);
    assert_eq!(oracle.asks_containing("Carry out"), 0);
    assert_eq!(oracle.asks_containing("correct final answer"), 10);
}

#[tokio::test]
async fn scenario_two_synthesizes_a_two_step_chain() {
    let oracle = ScriptedOracle::new()
        .route("final outputs", "[a mapping from each variable name to its numeric value]")
        .route("matching game", "[0]")
        .route("matching game", "[0]")
        .route("matching game", "[1]")
        .route(
            "next operation",
            "[solve the system of linear equations] [a list of linear equations]",
        )
        .route(
            "next operation",
            "[translate the problem text into linear equations] [the original text of the problem]",
        )
        .route("which ONE", "[0]")
        .route("data type", "[map]")
        .route("data type", "[list]")
        .route("data type", "[text]")
        .route("example value", "[x + y = 3, x - y = 1]")
        .route("example value", "[a short word problem]")
        .route("Write the procedure", "[set up the augmented matrix and eliminate]")
        .route(
            "Write the procedure",
            "[introduce a variable per unknown and write one equation per relation]",
        )
        .route("Give the value", "[the sum of x and y is 11 and their difference is 10]")
        .route("Carry out", "[x + y = 11, x - y = 10]")
        .route("Carry out", "[{x: 10.5, y: 0.5}]")
        .route("correct final answer", "[1]")
        .route("literal ask", "[x = 10.5, y = 0.5]");

    let (resolver, oracle) = resolver_with(oracle, None, EngineConfig::default(), false).await;
    let question = "The sum of two numbers x and y is 11 and their difference is 10. \
                    What are x and y?";
    let resolution = resolver.resolve(question).await.unwrap();

    let mut expected = BTreeMap::new();
    expected.insert("x".to_string(), 10.5);
    expected.insert("y".to_string(), 0.5);
    assert_eq!(resolution.value, TypedValue::Map(expected));
    assert_eq!(resolution.answer, "x = 10.5, y = 0.5");

    // two operations were synthesized and both script bodies executed
    assert_eq!(oracle.asks_containing("Write the procedure"), 2);
    assert_eq!(oracle.asks_containing("Carry out"), 2);
    // the second proposal saw the first step as downstream-chain context
    let chained = oracle.transcript().iter().any(|p| {
        p.contains("next operation")
            && p.contains("already planned")
            && p.contains("solve the system of linear equations")
    });
    assert!(chained);
}

struct FlakyRunner;

#[async_trait]
impl ScriptRunner for FlakyRunner {
    async fn run(
        &self,
        op: &OperationKind,
        source: &str,
        _inputs: &[(String, TypedValue)],
    ) -> Result<String> {
        if source.contains("BAD") {
            Err(Error::operation_runtime(&op.name, "body rejected at run time"))
        } else {
            Ok("7".to_string())
        }
    }
}

#[tokio::test]
async fn failed_body_is_regenerated_with_history() {
    let oracle = ScriptedOracle::new()
        .route("final outputs", "[the mystery number]")
        .route("matching game", "[0]")
        .route("matching game", "[1]")
        .route(
            "next operation",
            "[compute the mystery number from the hint] [the hint in the problem]",
        )
        .route("data type", "[number]")
        .route("data type", "[text]")
        .route("example value", "[a short hint]")
        .route("Write the procedure", "[BAD guess blindly]")
        .route("Write the procedure", "[read the hint and count]")
        .route("Give the value", "[seven]")
        .route("correct final answer", "[1]")
        .route("literal ask", "[7]");

    let (resolver, oracle) =
        resolver_with(oracle, Some(Arc::new(FlakyRunner)), EngineConfig::default(), false).await;
    let resolution = resolver.resolve("What is the mystery number?").await.unwrap();

    assert_eq!(resolution.value, TypedValue::Number(7.0));
    assert_eq!(oracle.asks_containing("Write the procedure"), 2);
    // the regeneration prompt carries the first body as rejected history
    let regenerated = oracle
        .transcript()
        .iter()
        .any(|p| p.contains("previously rejected") && p.contains("BAD guess blindly"));
    assert!(regenerated);
}

fn arithmetic_routes(oracle: ScriptedOracle) -> ScriptedOracle {
    oracle
        .route("final outputs", "[calculation result of an arithmetic question]")
        .route(
            "next operation",
            "[calculate the arithmetic formula] [an arithmetic question to be calculated]",
        )
        .route("which ONE", "[1]")
        .route("Give the value", "[1+1]")
        .route("literal ask", "[2]")
}

#[tokio::test]
async fn validation_accepts_nine_of_ten() {
    let mut oracle = arithmetic_routes(ScriptedOracle::new())
        .route("matching game", "[0]")
        .route("matching game", "[1]");
    for _ in 0..9 {
        oracle = oracle.route("correct final answer", "[1]");
    }
    oracle = oracle.route("correct final answer", "[0]");

    let (resolver, oracle) = resolver_with(oracle, None, EngineConfig::default(), true).await;
    let resolution = resolver.resolve("1+1").await.unwrap();
    assert_eq!(resolution.value, TypedValue::Number(2.0));
    assert_eq!(oracle.asks_containing("final outputs"), 1);
}

#[tokio::test]
async fn validation_restarts_on_seven_of_ten() {
    let mut oracle = arithmetic_routes(ScriptedOracle::new())
        .route("matching game", "[0]")
        .route("matching game", "[1]")
        .route("matching game", "[0]")
        .route("matching game", "[1]");
    // first round: 7 yes, 3 no; second round: all yes via the sticky last
    for _ in 0..7 {
        oracle = oracle.route("correct final answer", "[1]");
    }
    for _ in 0..3 {
        oracle = oracle.route("correct final answer", "[0]");
    }
    oracle = oracle.route("correct final answer", "[1]");

    let (resolver, oracle) = resolver_with(oracle, None, EngineConfig::default(), true).await;
    let resolution = resolver.resolve("1+1").await.unwrap();
    assert_eq!(resolution.value, TypedValue::Number(2.0));
    // the rejected first answer forced a full rebuild
    assert_eq!(oracle.asks_containing("final outputs"), 2);
    assert_eq!(oracle.asks_containing("correct final answer"), 20);
}

#[tokio::test]
async fn self_dependent_operation_exhausts_cycle_budget() {
    // the proposed input reuses the head kind, so the synthesized
    // operation feeds on its own output
    let oracle = ScriptedOracle::new()
        .route("final outputs", "[the result number]")
        .route("matching game", "[0]")
        .route(
            "next operation",
            "[compute the result number from itself] [the result number]",
        )
        .route("data type", "[number]")
        .route("Write the procedure", "[take the number and return it]");

    let mut config = EngineConfig::default();
    config.retries.max_cycle_fixes = 0;

    let (resolver, oracle) = resolver_with(oracle, None, config, false).await;
    let err = resolver
        .resolve("What number equals itself?")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cycle(_)));
    // the cyclic graph never executed, so no terminal value was extracted
    assert_eq!(oracle.asks_containing("Give the value"), 0);
}

#[tokio::test]
async fn persistent_rejection_exhausts_restart_budget() {
    let oracle = arithmetic_routes(ScriptedOracle::new())
        .route("matching game", "[0]")
        .route("matching game", "[1]")
        .route("matching game", "[0]")
        .route("matching game", "[1]")
        .route("correct final answer", "[0]");

    let mut config = EngineConfig::default();
    config.retries.max_restarts = 1;
    config.validation.votes = 2;
    config.validation.threshold = 1.0;

    let (resolver, _) = resolver_with(oracle, None, config, true).await;
    let err = resolver.resolve("1+1").await.unwrap_err();
    assert!(matches!(err, Error::ResolutionExhausted { .. }));
}
