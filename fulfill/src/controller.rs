//! Controller contract: what a handler receives and how it reports back.
//!
//! A controller is called with the task's [`Params`] and a [`Continuation`].
//! It completes in exactly one of three ways:
//!
//! - returns [`Reply::Value`] (direct return),
//! - returns [`Reply::Pending`] and later settles the continuation (callback),
//! - returns [`Reply::Future`] (future-style).
//!
//! The continuation doubles as the "next" handle: [`Continuation::outcome`]
//! resolves once the whole fulfillment call finishes, not when this task does.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use futures::channel::oneshot;
use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::debug;

use crate::core::task::Params;
use crate::error::{FulfillError, HandlerErrorKind};

/// Final result of one fulfillment call, shared by every continuation issued
/// during that call. Resolves exactly once.
pub type Outcome = Shared<BoxFuture<'static, Result<String, FulfillError>>>;

pub(crate) type Settlement = Result<String, FulfillError>;

/// Handler bound to an action name.
///
/// Returning `Err` (or panicking) is reported as a [`HandlerErrorKind::Throw`]
/// failure through the same asynchronous path as every other completion.
pub trait Controller: Send + Sync {
    fn call(&self, params: Params, next: Continuation) -> anyhow::Result<Reply>;
}

impl<F> Controller for F
where
    F: Fn(Params, Continuation) -> anyhow::Result<Reply> + Send + Sync,
{
    fn call(&self, params: Params, next: Continuation) -> anyhow::Result<Reply> {
        self(params, next)
    }
}

pub enum Reply {
    /// Final value. Delivered on the next scheduling turn, never synchronously.
    Value(String),
    /// Future-style completion; `Err` is reported as a rejection.
    Future(BoxFuture<'static, anyhow::Result<String>>),
    /// The controller settles its [`Continuation`] itself.
    Pending,
}

impl Reply {
    pub fn future<F>(future: F) -> Self
    where
        F: Future<Output = anyhow::Result<String>> + Send + 'static,
    {
        Reply::Future(future.boxed())
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Reply::Future(_) => f.write_str("Future(..)"),
            Reply::Pending => f.write_str("Pending"),
        }
    }
}

impl From<String> for Reply {
    fn from(value: String) -> Self {
        Reply::Value(value)
    }
}

impl From<&str> for Reply {
    fn from(value: &str) -> Self {
        Reply::Value(value.to_string())
    }
}

// Zero is falsy and becomes the empty response, like an absent value.
macro_rules! reply_from_integer {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Reply {
                fn from(value: $ty) -> Self {
                    if value == 0 {
                        return Reply::Value(String::new());
                    }
                    Reply::Value(value.to_string())
                }
            }
        )*
    };
}

reply_from_integer!(i32, i64, u32, u64, usize);

impl From<f64> for Reply {
    fn from(value: f64) -> Self {
        if value == 0.0 || value.is_nan() {
            return Reply::Value(String::new());
        }
        Reply::Value(value.to_string())
    }
}

/// Per-task completion handle plus access to the overall outcome.
///
/// Clones share the same completion slot: the first settlement wins and later
/// ones are ignored. Dropping every clone of a pending continuation without
/// settling it fails the task with [`FulfillError::Abandoned`].
#[derive(Clone)]
pub struct Continuation {
    action: Arc<str>,
    slot: Arc<Mutex<Option<oneshot::Sender<Settlement>>>>,
    outcome: Outcome,
}

impl Continuation {
    pub(crate) fn new(
        action: &str,
        sender: oneshot::Sender<Settlement>,
        outcome: Outcome,
    ) -> Self {
        Self {
            action: Arc::from(action),
            slot: Arc::new(Mutex::new(Some(sender))),
            outcome,
        }
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    /// Complete the task with `value` and return the overall outcome.
    pub fn resolve(&self, value: impl Into<String>) -> Outcome {
        self.settle(Ok(value.into()));
        self.outcome()
    }

    /// Fail the task with `error` and return the overall outcome.
    pub fn reject(&self, error: impl fmt::Display) -> Outcome {
        self.settle(Err(FulfillError::handler(
            self.action.as_ref(),
            HandlerErrorKind::Callback,
            error,
        )));
        self.outcome()
    }

    /// Callback form: `Ok` resolves, `Err` rejects.
    pub fn complete<T, E>(&self, result: Result<T, E>) -> Outcome
    where
        T: Into<String>,
        E: fmt::Display,
    {
        match result {
            Ok(value) => self.resolve(value),
            Err(error) => self.reject(error),
        }
    }

    /// The "next" handle: resolves with the final text (or error) once the
    /// whole fulfillment call reaches a terminal state.
    pub fn outcome(&self) -> Outcome {
        self.outcome.clone()
    }

    pub fn is_settled(&self) -> bool {
        self.lock_slot().is_none()
    }

    /// Returns false if the task was already settled.
    pub(crate) fn settle(&self, settlement: Settlement) -> bool {
        let sender = self.lock_slot().take();
        match sender {
            Some(sender) => {
                // The receiver only disappears if the fulfillment future was dropped.
                let _ = sender.send(settlement);
                true
            }
            None => {
                debug!(action = %self.action, "ignoring repeated completion");
                false
            }
        }
    }

    fn lock_slot(&self) -> std::sync::MutexGuard<'_, Option<oneshot::Sender<Settlement>>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Continuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Continuation")
            .field("action", &self.action)
            .field("settled", &self.is_settled())
            .finish()
    }
}

/// Create the once-per-call outcome: the loop keeps the sender, every
/// continuation gets a clone of the shared receiver.
pub(crate) fn outcome_channel() -> (oneshot::Sender<Settlement>, Outcome) {
    let (sender, receiver) = oneshot::channel();
    let outcome = receiver
        .map(|received| received.unwrap_or(Err(FulfillError::Interrupted)))
        .boxed()
        .shared();
    (sender, outcome)
}
