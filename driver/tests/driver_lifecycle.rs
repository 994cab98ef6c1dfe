//! End-to-end driver scenarios over a tempdir workspace with scripted tests.
//!
//! Each test plays the agent by writing the response artifact and signalling
//! the driver, the way an external watcher would.

use std::fs;

use tdd_driver::core::types::{NodeOutcome, Phase, PhaseSet, RunMode, RunStatus};
use tdd_driver::events::DriverEvent;
use tdd_driver::test_support::{Harness, chain_workspace, failing, feature};
use tdd_driver::workspace::{NodeStatus, Workspace};

fn respond(harness: &Harness, driver: &mut tdd_driver::machine::Driver, text: &str) -> RunStatus {
    harness.respond(text);
    driver.on_external_signal()
}

#[test]
fn chain_of_passing_nodes_runs_in_dependency_order() {
    let harness = Harness::new(chain_workspace(&["a", "b", "c"])).expect("harness");
    for _ in 0..3 {
        harness.tests.push_pass();
    }
    let mut driver = harness.driver();
    assert_eq!(driver.start(RunMode::Backlog), RunStatus::Running);

    for _ in 0..3 {
        assert_eq!(driver.state().phase, Phase::Bdd);
        respond(&harness, &mut driver, "DONE");
        assert_eq!(driver.state().phase, Phase::Generating);
        respond(&harness, &mut driver, "DONE: wrote tests and code");
        assert_eq!(driver.state().fix_attempts.len(), 0);
    }

    assert_eq!(driver.state().run_status, RunStatus::Completed);
    assert_eq!(driver.state().phase, Phase::Done);
    assert_eq!(harness.events.completed(), vec!["a", "b", "c"]);
    assert_eq!(harness.tests.calls(), vec!["a", "b", "c"]);
    assert_eq!(harness.status(), "COMPLETE: 3/3 passed\n");
    assert!(driver.channel().load_state().is_none());
    for id in ["a", "b", "c"] {
        assert_eq!(harness.node(id).status, NodeStatus::Passed);
    }
}

#[test]
fn always_failing_node_is_forced_to_fail_after_max_retries() {
    let harness = Harness::new(chain_workspace(&["a"])).expect("harness");
    for attempt in 0..4 {
        harness.tests.push_fail(&format!("assertion failed #{attempt}"));
    }
    let mut driver = harness.driver();
    driver.start(RunMode::Backlog);
    respond(&harness, &mut driver, "DONE");
    respond(&harness, &mut driver, "DONE");

    for retry in 1..=3 {
        assert_eq!(driver.state().phase, Phase::Fixing);
        assert_eq!(driver.state().current_retry, retry);
        respond(&harness, &mut driver, &format!("DONE: approach {retry}"));
    }

    let state = driver.state();
    assert_eq!(state.run_status, RunStatus::Completed);
    assert_eq!(state.current_retry, state.max_retries);
    assert_eq!(state.failed_node_ids, vec!["a".to_string()]);
    assert!(state.fix_attempts.is_empty());
    assert_eq!(harness.tests.remaining(), 0);
    // bdd, generating, three fixes; nothing after the forced failure.
    assert_eq!(harness.events.tasks_written(), 5);

    let node = harness.node("a");
    assert_eq!(node.status, NodeStatus::Failed);
    assert!(node.failure_reason.is_some());
    assert_eq!(harness.status(), "COMPLETE: 0/1 passed (failed: a)\n");
}

#[test]
fn stuck_response_fails_node_immediately_without_ledger() {
    let harness = Harness::new(chain_workspace(&["a", "b"])).expect("harness");
    harness.tests.push_pass();
    let mut driver = harness.driver();
    driver.start(RunMode::Backlog);
    respond(&harness, &mut driver, "DONE");
    respond(&harness, &mut driver, "STUCK: missing credentials");

    assert_eq!(harness.tests.calls(), Vec::<String>::new());
    assert_eq!(driver.state().failed_node_ids, vec!["a".to_string()]);
    assert!(driver.state().fix_attempts.is_empty());
    let node = harness.node("a");
    assert_eq!(node.status, NodeStatus::Failed);
    assert_eq!(
        node.failure_reason.as_deref(),
        Some("agent stuck: missing credentials")
    );

    // A failed dependency is processed, so its dependant still runs.
    assert_eq!(driver.state().current_node_id.as_deref(), Some("b"));
    assert_eq!(driver.state().phase, Phase::Bdd);
}

#[test]
fn unprefixed_response_counts_as_done() {
    let harness = Harness::new(chain_workspace(&["a"])).expect("harness");
    harness.tests.push_pass();
    let mut driver = harness.driver();
    driver.start(RunMode::Backlog);
    respond(&harness, &mut driver, "specs written, see file");
    assert_eq!(driver.state().phase, Phase::Generating);
    respond(&harness, &mut driver, "all good");
    assert_eq!(driver.state().run_status, RunStatus::Completed);
}

#[test]
fn blank_response_is_not_a_response() {
    let harness = Harness::new(chain_workspace(&["a"])).expect("harness");
    let mut driver = harness.driver();
    driver.start(RunMode::Backlog);
    respond(&harness, &mut driver, "  \n");
    assert_eq!(driver.state().phase, Phase::Bdd);
}

#[test]
fn fix_approach_is_recorded_and_ledger_cleared_on_pass() {
    let harness = Harness::new(chain_workspace(&["a"])).expect("harness");
    harness.tests.push_fail("expected 2, got 3");
    harness.tests.push_pass();
    let mut driver = harness.driver();
    driver.start(RunMode::Backlog);
    respond(&harness, &mut driver, "DONE");
    respond(&harness, &mut driver, "DONE");
    assert!(harness.task().contains("expected 2, got 3"));
    respond(&harness, &mut driver, "DONE: fixed off-by-one");

    assert_eq!(driver.state().run_status, RunStatus::Completed);
    assert!(driver.state().fix_attempts.is_empty());
    let fixed = harness
        .events
        .events()
        .into_iter()
        .any(|event| matches!(event, DriverEvent::NodeCompleted { outcome: NodeOutcome::Passed, .. }));
    assert!(fixed);
}

#[test]
fn empty_workspace_requests_blueprint_then_runs_new_nodes() {
    let harness = Harness::new(Workspace::default()).expect("harness");
    let mut driver = harness.driver();
    driver.start(RunMode::Backlog);
    assert_eq!(driver.state().phase, Phase::Blueprint);
    assert!(harness.task().contains("blueprint the backlog"));

    let blueprint = serde_json::to_string(&chain_workspace(&["x", "y"])).expect("json");
    fs::write(&harness.paths().workspace_path, blueprint).expect("write workspace");
    respond(&harness, &mut driver, "DONE");

    assert!(harness
        .events
        .events()
        .contains(&DriverEvent::BlueprintComplete { node_count: 2 }));
    assert_eq!(driver.state().current_node_id.as_deref(), Some("x"));
    assert_eq!(driver.state().phase, Phase::Bdd);
}

#[test]
fn blueprint_done_is_replayed_when_first_node_cannot_start() {
    let harness = Harness::new(Workspace::default()).expect("harness");
    let mut driver = harness.driver();
    driver.start(RunMode::Backlog);

    let mut node = feature("x");
    node.spec_file = Some("blocker/x.feature".into());
    let blueprint = Workspace {
        nodes: vec![node],
        edges: Vec::new(),
    };
    fs::write(
        &harness.paths().workspace_path,
        serde_json::to_string(&blueprint).expect("json"),
    )
    .expect("write workspace");
    let blocker = harness.root().join("blocker");
    fs::write(&blocker, "a file where a directory should be").expect("write blocker");

    assert_eq!(respond(&harness, &mut driver, "DONE"), RunStatus::Error);
    assert!(!harness.paths().response_path.exists());

    fs::remove_file(&blocker).expect("remove blocker");
    let mut resumed = harness.driver();
    assert_eq!(resumed.resume(), RunStatus::Running);
    assert_eq!(resumed.state().phase, Phase::Bdd);
    assert_eq!(resumed.state().current_node_id.as_deref(), Some("x"));
    assert!(harness.root().join("blocker/x.feature").is_file());
}

#[test]
fn blueprint_that_adds_nothing_completes_empty_run() {
    let harness = Harness::new(Workspace::default()).expect("harness");
    let mut driver = harness.driver();
    driver.start(RunMode::Backlog);
    respond(&harness, &mut driver, "DONE");
    assert_eq!(driver.state().run_status, RunStatus::Completed);
    assert_eq!(harness.status(), "COMPLETE: 0/0 passed\n");
}

#[test]
fn single_node_ignores_dependencies() {
    let harness = Harness::new(chain_workspace(&["a", "b"])).expect("harness");
    harness.tests.push_pass();
    let mut driver = harness.driver();
    driver.start(RunMode::Single {
        node_id: "b".to_string(),
        phases: PhaseSet::ALL,
    });
    assert_eq!(driver.state().current_node_id.as_deref(), Some("b"));
    respond(&harness, &mut driver, "DONE");
    respond(&harness, &mut driver, "DONE");

    assert_eq!(driver.state().run_status, RunStatus::Completed);
    assert_eq!(harness.node("b").status, NodeStatus::Passed);
    assert_eq!(harness.node("a").status, NodeStatus::Pending);
}

#[test]
fn bdd_only_run_finishes_unverified() {
    let harness = Harness::new(chain_workspace(&["a"])).expect("harness");
    let mut driver = harness.driver();
    driver.start(RunMode::Single {
        node_id: "a".to_string(),
        phases: PhaseSet {
            bdd: true,
            test: false,
            fix: false,
        },
    });
    respond(&harness, &mut driver, "DONE");

    assert_eq!(driver.state().run_status, RunStatus::Completed);
    assert_eq!(driver.state().processed_node_ids, vec!["a".to_string()]);
    assert_eq!(driver.state().unverified_node_ids, vec!["a".to_string()]);
    assert_eq!(harness.node("a").status, NodeStatus::Pending);
    assert_eq!(harness.status(), "COMPLETE: 0/1 passed (unverified: a)\n");
    assert!(!harness.root().join("tests/a.rs").exists());
    assert!(harness.tests.calls().is_empty());
}

#[test]
fn test_only_run_scaffolds_and_generates_without_executing() {
    let harness = Harness::new(chain_workspace(&["a"])).expect("harness");
    let mut driver = harness.driver();
    driver.start(RunMode::Single {
        node_id: "a".to_string(),
        phases: PhaseSet {
            bdd: false,
            test: true,
            fix: false,
        },
    });
    assert_eq!(driver.state().phase, Phase::Generating);
    assert!(harness.root().join("tests/a.rs").exists());
    respond(&harness, &mut driver, "DONE");

    assert_eq!(driver.state().run_status, RunStatus::Completed);
    assert!(harness.tests.calls().is_empty());
    assert_eq!(harness.status(), "COMPLETE: 0/1 passed (unverified: a)\n");
}

#[test]
fn empty_phase_set_is_rejected() {
    let harness = Harness::new(chain_workspace(&["a"])).expect("harness");
    let mut driver = harness.driver();
    let status = driver.start(RunMode::Single {
        node_id: "a".to_string(),
        phases: PhaseSet {
            bdd: false,
            test: false,
            fix: false,
        },
    });
    assert_eq!(status, RunStatus::Error);
    assert_eq!(harness.events.tasks_written(), 0);
}

#[test]
fn cyclic_backlog_completes_without_processing_anything() {
    let mut workspace = chain_workspace(&["a", "b"]);
    workspace.edges.push(tdd_driver::workspace::DependencyEdge {
        source: "b".to_string(),
        target: "a".to_string(),
    });
    let harness = Harness::new(workspace).expect("harness");
    let mut driver = harness.driver();
    assert_eq!(driver.start(RunMode::Backlog), RunStatus::Completed);
    assert_eq!(harness.status(), "COMPLETE: 0/0 passed\n");
}

#[test]
fn run_survives_process_restart_between_every_step() {
    let harness = Harness::new(chain_workspace(&["a"])).expect("harness");
    harness.tests.push_fail("nope");
    harness.tests.push_pass();
    harness.driver().start(RunMode::Backlog);

    for text in ["DONE", "DONE", "DONE: second try"] {
        harness.respond(text);
        harness.driver().resume();
    }

    let status = harness.status();
    assert_eq!(status, "COMPLETE: 1/1 passed\n");
    assert!(harness.channel().load_state().is_none());
    assert_eq!(harness.node("a").last_test_results.map(|r| r.len()), Some(1));
}

#[test]
fn failing_results_are_cached_on_the_node() {
    let harness = Harness::new(chain_workspace(&["a"])).expect("harness");
    harness.tests.push(vec![failing("rejects empty cart", "panicked")]);
    let mut driver = harness.driver();
    driver.start(RunMode::Single {
        node_id: "a".to_string(),
        phases: PhaseSet {
            bdd: false,
            test: false,
            fix: true,
        },
    });
    let cached = harness.node("a").last_test_results.expect("cached results");
    assert_eq!(cached[0].title, "rejects empty cart");
    assert!(harness.task().contains("[FAIL] rejects empty cart"));
}
