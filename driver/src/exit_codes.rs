//! Stable exit codes for driver CLI commands.

/// Command succeeded, or the run is still in progress.
pub const OK: i32 = 0;
/// Invalid layout/config/workspace/arguments or other errors.
pub const INVALID: i32 = 1;
/// The run finished, or `select` found no eligible node.
pub const COMPLETE: i32 = 2;
/// The run halted on an error; persisted state is left for `signal` to resume.
pub const ERROR: i32 = 3;
