//! Recursive tag-fulfillment engine.
//!
//! A template is parsed into a flat sequence of nodes. Every top-level element
//! whose tag name is registered in [`Actions`] becomes a task; each task's
//! controller produces a response that is substituted back into the sequence
//! according to the action's [`Replace`] policy. The sequence is re-rendered,
//! re-parsed and scanned again until no registered tag remains.
//!
//! - **[`core`]**: Pure, deterministic logic (registry, task building,
//!   substitution). No I/O and no async.
//! - **[`markup`]**: The parser and serializer the engine relies on.
//! - **[`io`]**: Side-effecting helpers for the binary (TOML config).
//!
//! Orchestration modules ([`controller`], [`fulfillment`]) drive controllers
//! and the tick loop on top of the core.
//!
//! ```no_run
//! use fulfill::{ActionSpec, Actions, FulfillOptions, fulfill};
//!
//! # async fn demo() -> Result<(), fulfill::FulfillError> {
//! let actions = Actions::new().with(
//!     "hi",
//!     ActionSpec::sync(|params| Ok(format!("hi {}", params.content()))),
//! );
//! let text = fulfill(&actions, FulfillOptions::new(), "<hi>bob</hi>").await?;
//! assert_eq!(text, "hi bob");
//! # Ok(())
//! # }
//! ```

pub mod controller;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod fulfillment;
mod invoke;
pub mod io;
pub mod logging;
pub mod markup;
mod schedule;
pub mod templated;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use crate::controller::{Continuation, Controller, Outcome, Reply};
pub use crate::core::context::Context;
pub use crate::core::registry::{ActionSpec, Actions, Replace};
pub use crate::core::task::{Params, Task};
pub use crate::error::{FulfillError, HandlerErrorKind};
pub use crate::fulfillment::{FulfillOptions, Fulfilled, Fulfiller, fulfill, fulfill_blocking};
