//! Deterministic, pure logic shared by the driver.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod response;
pub mod retry;
pub mod selector;
pub mod types;
pub mod verdict;
