//! Per-node fix-attempt ledger and retry bound checks.

use chrono::{DateTime, Utc};

use crate::core::types::{DriverState, FixAttempt};

/// Append a fix attempt for the current node.
///
/// Only recorded once an attempt has actually happened (`current_retry > 0`)
/// and the agent described what it tried. Returns whether an entry was added.
pub fn record_attempt(state: &mut DriverState, approach: Option<&str>, at: DateTime<Utc>) -> bool {
    if state.current_retry == 0 {
        return false;
    }
    let Some(approach) = approach.map(str::trim).filter(|text| !text.is_empty()) else {
        return false;
    };
    state.fix_attempts.push(FixAttempt {
        attempt_number: state.current_retry,
        approach_description: approach.to_string(),
        timestamp: at,
    });
    true
}

/// True once `max_retries` fix cycles have been spent.
pub fn retries_exhausted(state: &DriverState) -> bool {
    state.current_retry >= state.max_retries
}

/// Reset per-node retry bookkeeping when a node reaches a terminal state.
pub fn clear(state: &mut DriverState) {
    state.fix_attempts.clear();
}

/// Render previous attempts for embedding in a fix request.
pub fn render_attempts(attempts: &[FixAttempt]) -> String {
    attempts
        .iter()
        .map(|attempt| {
            format!(
                "- Attempt {} ({}): {}",
                attempt.attempt_number,
                attempt.timestamp.to_rfc3339(),
                attempt.approach_description
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
