//! Test verdicts and run summaries.

use crate::core::types::DriverState;
use crate::workspace::TestResult;

/// A node passes iff at least one test ran and every executed test passed.
pub fn tests_passed(results: &[TestResult]) -> bool {
    !results.is_empty() && results.iter().all(|result| result.passed)
}

/// One-line run summary, e.g. `3/3 passed`.
pub fn run_summary(state: &DriverState) -> String {
    let mut summary = format!(
        "{}/{} passed",
        state.passed_count(),
        state.processed_node_ids.len()
    );
    let mut notes = Vec::new();
    if !state.failed_node_ids.is_empty() {
        notes.push(format!("failed: {}", state.failed_node_ids.join(", ")));
    }
    if !state.unverified_node_ids.is_empty() {
        notes.push(format!("unverified: {}", state.unverified_node_ids.join(", ")));
    }
    if !notes.is_empty() {
        summary.push_str(&format!(" ({})", notes.join("; ")));
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::RunMode;

    fn result(passed: bool) -> TestResult {
        TestResult {
            title: "t".to_string(),
            passed,
            error: None,
        }
    }

    #[test]
    fn empty_results_do_not_pass() {
        assert!(!tests_passed(&[]));
    }

    #[test]
    fn any_failure_fails() {
        assert!(tests_passed(&[result(true), result(true)]));
        assert!(!tests_passed(&[result(true), result(false)]));
    }

    #[test]
    fn summary_counts_processed_and_lists_failures() {
        let mut state = DriverState::new(RunMode::Backlog, 3);
        state.processed_node_ids = vec!["a".into(), "b".into(), "c".into()];
        assert_eq!(run_summary(&state), "3/3 passed");
        state.failed_node_ids = vec!["b".into()];
        assert_eq!(run_summary(&state), "2/3 passed (failed: b)");
    }

    #[test]
    fn summary_lists_unverified_nodes_separately() {
        let mut state = DriverState::new(RunMode::Backlog, 3);
        state.processed_node_ids = vec!["a".into()];
        state.unverified_node_ids = vec!["a".into()];
        assert_eq!(run_summary(&state), "0/1 passed (unverified: a)");
        state.processed_node_ids.push("b".into());
        state.failed_node_ids = vec!["b".into()];
        assert_eq!(run_summary(&state), "0/2 passed (failed: b; unverified: a)");
    }

    #[test]
    fn empty_run_summary() {
        let state = DriverState::new(RunMode::Backlog, 3);
        assert_eq!(run_summary(&state), "0/0 passed");
    }
}
