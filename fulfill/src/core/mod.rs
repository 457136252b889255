//! Deterministic, pure logic shared by the fulfillment loop.
//!
//! Core modules must be free of I/O and async. They operate on in-memory
//! node sequences and return deterministic outputs suitable for tests.

pub mod context;
pub mod registry;
pub mod substitute;
pub mod task;
