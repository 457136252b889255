//! Handler invocation: three calling conventions, one completion.

use std::panic::{self, AssertUnwindSafe};
use std::pin::pin;

use futures::channel::oneshot;
use futures::future::{self, Either, FutureExt};
use tracing::{debug, trace};

use crate::controller::{Continuation, Outcome, Reply, Settlement};
use crate::core::registry::ActionSpec;
use crate::core::task::Task;
use crate::error::{FulfillError, HandlerErrorKind};

/// Call the task's controller and wait for its single completion.
///
/// Direct returns and synchronous failures are delivered on the next
/// scheduling turn. When a controller both returns a future and settles its
/// continuation, whichever settles first wins.
pub(crate) async fn invoke(spec: &ActionSpec, task: &Task, outcome: &Outcome) -> Settlement {
    let (sender, receiver) = oneshot::channel();
    let next = Continuation::new(&task.name, sender, outcome.clone());

    let called = panic::catch_unwind(AssertUnwindSafe(|| {
        spec.controller.call(task.params.clone(), next.clone())
    }));

    let immediate = match called {
        Ok(Ok(Reply::Future(reply))) => {
            debug!(action = %task.name, index = task.index, "controller returned a future");
            let driven = AssertUnwindSafe(reply).catch_unwind().map(|result| match result {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(err)) => Err(FulfillError::handler(
                    task.name.as_str(),
                    HandlerErrorKind::Rejection,
                    format!("{err:#}"),
                )),
                Err(payload) => Err(FulfillError::panicked(task.name.as_str(), payload)),
            });
            return match future::select(receiver, pin!(driven)).await {
                Either::Left((settled, _)) => settled.unwrap_or_else(|_| abandoned(task)),
                Either::Right((settlement, _)) => {
                    next.settle(settlement.clone());
                    settlement
                }
            };
        }
        Ok(Ok(Reply::Value(value))) => {
            debug!(action = %task.name, index = task.index, "controller returned a value");
            Some(Ok(value))
        }
        Ok(Ok(Reply::Pending)) => {
            debug!(action = %task.name, index = task.index, "controller completes via callback");
            None
        }
        Ok(Err(err)) => Some(Err(FulfillError::thrown(task.name.as_str(), &err))),
        Err(payload) => Some(Err(FulfillError::panicked(task.name.as_str(), payload))),
    };

    if let Some(settlement) = immediate {
        tokio::task::yield_now().await;
        if !next.settle(settlement) {
            trace!(action = %task.name, "continuation settled before the direct return");
        }
    }
    drop(next);
    receiver.await.unwrap_or_else(|_| abandoned(task))
}

fn abandoned(task: &Task) -> Settlement {
    Err(FulfillError::Abandoned {
        action: task.name.clone(),
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::controller::outcome_channel;
    use crate::core::context::Context;
    use crate::core::registry::Actions;
    use crate::core::task::build_tasks;
    use crate::markup::parse;

    async fn run(spec: ActionSpec) -> Settlement {
        let actions = Actions::new().with("hi", spec);
        let tree = parse("<hi />").expect("parse");
        let tasks = build_tasks(&tree, &actions, &Context::new());
        let (_outcome_tx, outcome) = outcome_channel();
        let spec = actions.get("hi").expect("registered");
        invoke(spec, &tasks[0], &outcome).await
    }

    #[tokio::test]
    async fn direct_value() {
        assert_eq!(run(ActionSpec::sync(|_| Ok("hello"))).await, Ok("hello".into()));
    }

    #[tokio::test]
    async fn callback_value_after_delay() {
        let spec = ActionSpec::callback(|_, next| {
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(1)).await;
                let _ = next.resolve("late");
            });
        });
        assert_eq!(run(spec).await, Ok("late".into()));
    }

    #[tokio::test]
    async fn future_value() {
        let spec = ActionSpec::future(|_| async { anyhow::Ok("promised".to_string()) });
        assert_eq!(run(spec).await, Ok("promised".into()));
    }

    #[tokio::test]
    async fn errors_are_tagged_with_their_convention() {
        let thrown = run(ActionSpec::sync(|_| Err::<String, _>(anyhow::anyhow!("hi!"))))
            .await
            .expect_err("thrown");
        assert_eq!(thrown.to_string(), "hi!");
        assert_eq!(thrown.handler_kind(), Some(HandlerErrorKind::Throw));

        let rejected = run(ActionSpec::future(|_| async { Err::<String, _>(anyhow::anyhow!("hi!")) }))
            .await
            .expect_err("rejected");
        assert_eq!(rejected.handler_kind(), Some(HandlerErrorKind::Rejection));

        let called_back = run(ActionSpec::callback(|_, next| {
            let _ = next.reject("hi!");
        }))
        .await
        .expect_err("callback");
        assert_eq!(called_back.to_string(), "hi!");
        assert_eq!(called_back.handler_kind(), Some(HandlerErrorKind::Callback));
    }

    #[tokio::test]
    async fn panics_are_reported_as_throws() {
        let err = run(ActionSpec::sync(|_| -> anyhow::Result<String> { panic!("boom") }))
            .await
            .expect_err("panicked");
        assert_eq!(err.to_string(), "boom");
        assert_eq!(err.handler_kind(), Some(HandlerErrorKind::Throw));
    }

    #[tokio::test]
    async fn dropping_the_continuation_abandons_the_task() {
        let err = run(ActionSpec::callback(|_, next| drop(next)))
            .await
            .expect_err("abandoned");
        assert_eq!(
            err,
            FulfillError::Abandoned {
                action: "hi".to_string()
            }
        );
    }

    #[tokio::test]
    async fn callback_settled_before_direct_return_wins() {
        let spec = ActionSpec::from_fn(|_, next| {
            let _ = next.resolve("callback");
            Ok(Reply::from("returned"))
        });
        assert_eq!(run(spec).await, Ok("callback".into()));
    }

    #[tokio::test]
    async fn callback_settled_before_future_wins() {
        let spec = ActionSpec::from_fn(|_, next| {
            let _ = next.resolve("callback");
            Ok(Reply::future(async { anyhow::Ok("future".to_string()) }))
        });
        assert_eq!(run(spec).await, Ok("callback".into()));
    }

    #[tokio::test]
    async fn direct_return_is_not_delivered_synchronously() {
        let first_poll = run(ActionSpec::sync(|_| Ok("value"))).now_or_never();
        assert!(first_poll.is_none());
    }
}
