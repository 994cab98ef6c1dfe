//! File-protocol driver that walks a backlog of features through a TDD loop
//! with an external coding agent.
//!
//! The driver never talks to the agent directly. It writes one task at a
//! time into `.tdd/channel/task.md`, the agent answers in `response.md`, and
//! whatever watches the channel calls back into [`machine::Driver`].
//!
//! - **[`core`]**: Pure, deterministic logic (selection, response parsing,
//!   retry ledger, verdicts). No I/O.
//! - **[`io`]**: Channel, persisted state, configuration, and the default
//!   collaborators (templates, scaffolding, test execution, node store).
//! - **[`machine`]**: The phase state machine coordinating both.

pub mod core;
pub mod events;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod machine;
pub mod select;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod workspace;
