//! Stable exit codes for `fulfill` CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid arguments, config, context or template markup.
pub const INVALID: i32 = 1;
/// A handler failed or the tick limit was exceeded.
pub const FAILED: i32 = 2;
