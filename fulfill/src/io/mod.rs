//! Side-effecting helpers for the `fulfill` binary.

pub mod config;
