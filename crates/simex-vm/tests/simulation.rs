//! End-to-end runs of the example generator over the bundled contracts.

use simex_abi::ValueDomain;
use simex_mc::{
    simulation_examples, transitions, Backend, ExampleSet, ExploreConfig, InvocationGenerator,
    LimiterFactory, SimError, Trace,
};
use simex_vm::VmBackend;
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

fn contracts_dir() -> PathBuf {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    PathBuf::from(manifest_dir)
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("contracts")
}

fn load(name: &str) -> VmBackend {
    let source = fs::read_to_string(contracts_dir().join(name)).unwrap();
    VmBackend::from_json(&source).unwrap()
}

fn config(max_states: usize) -> ExploreConfig {
    ExploreConfig {
        max_states,
        ..Default::default()
    }
}

fn examples(source: &VmBackend, target: &VmBackend, cfg: &ExploreConfig) -> Result<ExampleSet, SimError> {
    let (s, t) = (source.metadata(), target.metadata());
    ExampleSet::collect(simulation_examples(&s, &t, source, target, cfg)?)
}

fn explored_traces(backend: &VmBackend, cfg: &ExploreConfig) -> HashSet<Trace> {
    let meta = backend.metadata();
    let generator = InvocationGenerator::new(meta.all_methods(), ValueDomain::new(backend.accounts().to_vec()))
        .with_payments(cfg.payments.clone());
    transitions(&meta, &generator, backend, cfg.limiter(), cfg.parallel)
        .unwrap()
        .map(|t| t.unwrap().post.trace)
        .collect()
}

#[test]
fn test_diverging_counters_raise_counterexample() {
    let s = load("counter_s.json");
    let t = load("counter_t.json");
    let err = examples(&s, &t, &config(3)).unwrap_err();
    let cex = err.as_counter_example().expect("expected a counterexample");

    let calls: Vec<String> = cex.source.trace.invocations().iter().map(|i| i.to_string()).collect();
    assert_eq!(calls, vec!["constructor()", "inc()"]);
    assert_eq!(cex.source.trace, cex.target.trace);
    assert!(!cex.source.observation.consistent_with(&cex.target.observation));
    assert!(err.to_string().contains("counterexample"));
}

/// `counter_s.json` with `inc` made payable.
fn payable_counter() -> VmBackend {
    let source = fs::read_to_string(contracts_dir().join("counter_s.json")).unwrap();
    let source = source.replacen(r#""name": "inc","#, r#""name": "inc", "mutability": "payable","#, 1);
    VmBackend::from_json(&source).unwrap()
}

#[test]
fn test_payable_counter_simulated_by_nonpayable_counter() {
    let s = payable_counter();
    let t = load("counter_s.json");
    let cfg = config(3);
    let mut stream = simulation_examples(&s.metadata(), &t.metadata(), &s, &t, &cfg).unwrap();
    let set = ExampleSet::collect(stream.by_ref()).unwrap();
    let stats = stream.stats();
    assert_eq!(stats.target_states, 3);
    assert_eq!(set.positive.len(), 3);
    for ex in &set.positive {
        assert_eq!(ex.source.trace, ex.target.trace);
    }
}

#[test]
fn test_payable_counter_diverging_from_nonpayable_counter() {
    let s = payable_counter();
    let t = load("counter_t.json");
    let err = examples(&s, &t, &config(3)).unwrap_err();
    assert!(err.as_counter_example().is_some());
}

#[test]
fn test_identical_contracts_only_positive_on_equal_traces() {
    let s = load("store.json");
    let t = load("store.json");
    let set = examples(&s, &t, &config(5)).unwrap();

    // one positive per explored target state: the root plus five grants
    assert_eq!(set.positive.len(), 6);
    for ex in &set.positive {
        assert_eq!(ex.source.trace, ex.target.trace);
        assert!(ex.source.observation.consistent_with(&ex.target.observation));
    }
    for ex in &set.negative {
        assert_ne!(ex.source.trace, ex.target.trace);
    }
}

#[test]
fn test_unobserved_field_is_consistent() {
    let s = load("store_shadow.json");
    let t = load("store.json");
    let set = examples(&s, &t, &config(5)).unwrap();
    assert_eq!(set.positive.len(), 6);
}

#[test]
fn test_constructor_with_address_argument() {
    let s = load("vault.json");
    let t = load("vault.json");
    let set = examples(&s, &t, &config(8)).unwrap();
    // both owners are roots
    let roots = set.positive.iter().filter(|ex| ex.target.trace.len() == 1).count();
    assert_eq!(roots, 2);
}

#[test]
fn test_reverted_calls_never_enter_the_graph() {
    let vault = load("vault.json");
    for trace in explored_traces(&vault, &config(30)) {
        assert!(trace.operations().iter().all(|op| !op.outcome.is_error()), "{}", trace);
    }
}

#[test]
fn test_exploration_is_deterministic() {
    let vault = load("vault.json");
    let cfg = config(20);
    assert_eq!(explored_traces(&vault, &cfg), explored_traces(&vault, &cfg));

    let sequential = ExploreConfig {
        parallel: false,
        ..cfg.clone()
    };
    assert_eq!(explored_traces(&vault, &cfg), explored_traces(&vault, &sequential));
}

#[test]
fn test_example_set_serializes() {
    let s = load("store.json");
    let set = examples(&s, &s, &config(2)).unwrap();
    let json = serde_json::to_value(&set).unwrap();
    assert!(json["positive"].is_array());
    assert!(json["negative"].is_array());
    assert_eq!(json["positive"][0]["kind"], "positive");
}

#[test]
fn test_independent_budgets() {
    let s = load("counter_s.json");
    let cfg = config(4);
    let mut stream = simulation_examples(&s.metadata(), &s.metadata(), &s, &s, &cfg).unwrap();
    let set = ExampleSet::collect(stream.by_ref()).unwrap();
    let stats = stream.stats();
    assert_eq!(stats.source_states, 5);
    assert_eq!(stats.target_states, 5);
    assert_eq!(set.positive.len(), 5);
}
