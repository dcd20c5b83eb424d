//! The suite and routes shipped in `demos/` run clean offline

use std::path::{Path, PathBuf};
use std::sync::Arc;

use apicheck_core::{InMemoryPatternStore, Method, PatternStore, TestSuite};
use apicheck_runner::{BatchOptions, Orchestrator, SimulatedTransport};

fn demo(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../../demos")
        .join(name)
}

#[test]
fn demo_suite_passes_against_demo_routes() {
    let suite = TestSuite::load(&demo("users.yaml")).unwrap();
    let transport = SimulatedTransport::load(&demo("routes.yaml")).unwrap();
    let store = Arc::new(InMemoryPatternStore::new());
    let orchestrator = Orchestrator::new(transport)
        .with_variables(suite.variables.clone())
        .with_patterns(store.clone());

    let report = orchestrator.run_batch(&suite.tests, &BatchOptions::sequential());

    assert_eq!(suite.name, "users");
    assert_eq!(report.summary.total, 3);
    assert_eq!(report.summary.passed, 3, "{:#?}", report.results);
    assert_eq!(report.summary.exit_code(), 0);
    let learned = store
        .lookup(Method::Get, "http://localhost:8080/users/7")
        .unwrap();
    assert_eq!(learned.assertions.len(), 4);
}
