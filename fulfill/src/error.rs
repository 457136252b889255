//! Errors surfaced by a fulfillment call.
//!
//! Every failure is normalized into one [`FulfillError`] value. It is `Clone`
//! because the same terminal error is delivered to the caller and to every
//! outstanding continuation.

use std::any::Any;
use std::fmt;

use crate::markup::ParseError;

/// How a controller reported its failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerErrorKind {
    /// The controller returned `Err` or panicked while being called, or its
    /// future panicked.
    Throw,
    /// The controller rejected through its continuation.
    Callback,
    /// The future returned by the controller resolved to `Err`.
    Rejection,
}

impl fmt::Display for HandlerErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            HandlerErrorKind::Throw => "throw",
            HandlerErrorKind::Callback => "callback",
            HandlerErrorKind::Rejection => "rejection",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FulfillError {
    /// Displays as the bare handler message.
    #[error("{message}")]
    Handler {
        action: String,
        kind: HandlerErrorKind,
        message: String,
    },
    #[error("action `{action}` dropped its continuation without completing")]
    Abandoned { action: String },
    #[error("parse markup: {0}")]
    Parse(#[from] ParseError),
    #[error("tick limit of {max_ticks} exceeded before reaching a fixed point")]
    TickLimitExceeded { max_ticks: u32 },
    #[error("fulfillment was dropped before it finished")]
    Interrupted,
}

impl FulfillError {
    pub fn handler(action: impl Into<String>, kind: HandlerErrorKind, message: impl fmt::Display) -> Self {
        FulfillError::Handler {
            action: action.into(),
            kind,
            message: message.to_string(),
        }
    }

    /// Error from a controller that returned `Err`, using the full anyhow chain.
    pub fn thrown(action: impl Into<String>, err: &anyhow::Error) -> Self {
        Self::handler(action, HandlerErrorKind::Throw, format!("{err:#}"))
    }

    /// Error from a controller that panicked.
    pub fn panicked(action: impl Into<String>, payload: Box<dyn Any + Send>) -> Self {
        Self::handler(action, HandlerErrorKind::Throw, panic_message(payload.as_ref()))
    }

    /// Human-readable message; the handler's own text for handler failures.
    pub fn message(&self) -> String {
        self.to_string()
    }

    pub fn action(&self) -> Option<&str> {
        match self {
            FulfillError::Handler { action, .. } | FulfillError::Abandoned { action } => {
                Some(action)
            }
            _ => None,
        }
    }

    pub fn handler_kind(&self) -> Option<HandlerErrorKind> {
        match self {
            FulfillError::Handler { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "controller panicked".to_string()
    }
}
