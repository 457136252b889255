//! The fulfillment loop: scan, tick, repeat until no registered tag remains.

use std::sync::{Mutex, PoisonError};

use anyhow::Context as _;
use tracing::{debug, instrument};

use crate::controller::{Outcome, outcome_channel};
use crate::core::context::Context;
use crate::core::registry::Actions;
use crate::core::task::build_tasks;
use crate::error::FulfillError;
use crate::markup::{parse, render};
use crate::schedule::run_tick;

/// Per-call options.
#[derive(Debug, Clone, Default)]
pub struct FulfillOptions {
    /// Shared state handed to every task of every tick. Defaults to empty.
    pub context: Option<Context>,
    /// Fail with [`FulfillError::TickLimitExceeded`] instead of looping forever.
    /// `None` means unbounded.
    pub max_ticks: Option<u32>,
}

impl FulfillOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_max_ticks(mut self, max_ticks: u32) -> Self {
        self.max_ticks = Some(max_ticks);
        self
    }
}

/// Result of a successful call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fulfilled {
    pub text: String,
    /// Ticks executed before the fixed point was reached.
    pub ticks: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct Fulfiller<'a> {
    actions: &'a Actions,
}

impl<'a> Fulfiller<'a> {
    pub fn new(actions: &'a Actions) -> Self {
        Self { actions }
    }

    /// Expand `template` to its fixed point.
    ///
    /// The returned value is also delivered to every [`Outcome`] handed out
    /// during the call. If this future is dropped first, those outcomes
    /// resolve to [`FulfillError::Interrupted`].
    #[instrument(skip_all, fields(actions = self.actions.len(), template_len = template.len()))]
    pub async fn run(
        &self,
        options: FulfillOptions,
        template: &str,
    ) -> Result<Fulfilled, FulfillError> {
        let (outcome_tx, outcome) = outcome_channel();
        let result = self.expand(options, template, &outcome).await;
        match &result {
            Ok(fulfilled) => debug!(ticks = fulfilled.ticks, "fulfilled"),
            Err(err) => debug!(error = %err, "fulfillment failed"),
        }
        // Nobody may be listening; that is fine.
        let _ = outcome_tx.send(
            result
                .as_ref()
                .map(|fulfilled| fulfilled.text.clone())
                .map_err(Clone::clone),
        );
        result
    }

    async fn expand(
        &self,
        options: FulfillOptions,
        template: &str,
        outcome: &Outcome,
    ) -> Result<Fulfilled, FulfillError> {
        let context = options.context.unwrap_or_default();
        let mut tree = parse(template)?;
        let mut ticks = 0u32;

        while self.actions.has_pending(&tree) {
            if let Some(max_ticks) = options.max_ticks.filter(|&max| ticks >= max) {
                return Err(FulfillError::TickLimitExceeded { max_ticks });
            }
            ticks += 1;
            let tasks = build_tasks(&tree, self.actions, &context);
            debug!(
                tick = ticks,
                tasks = tasks.len(),
                pending = ?self.actions.pending_names(&tree),
                "starting tick"
            );

            let shared = Mutex::new(tree);
            run_tick(self.actions, tasks, &shared, outcome).await?;
            let ticked = shared.into_inner().unwrap_or_else(PoisonError::into_inner);

            // Responses may contain markup that only becomes visible once re-parsed.
            tree = parse(&render(&ticked))?;
        }

        Ok(Fulfilled {
            text: render(&tree),
            ticks,
        })
    }
}

/// Expand `template` with `actions`; the single completion of the call.
pub async fn fulfill(
    actions: &Actions,
    options: FulfillOptions,
    template: &str,
) -> Result<String, FulfillError> {
    Fulfiller::new(actions)
        .run(options, template)
        .await
        .map(|fulfilled| fulfilled.text)
}

/// Run a fulfillment call to completion on a fresh current-thread runtime.
///
/// Must not be called from within an async context.
pub fn fulfill_blocking(
    actions: &Actions,
    options: FulfillOptions,
    template: &str,
) -> anyhow::Result<Fulfilled> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("build tokio runtime")?;
    let fulfilled = runtime.block_on(Fulfiller::new(actions).run(options, template))?;
    Ok(fulfilled)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use futures::channel::oneshot;

    use super::*;
    use crate::controller::Continuation;
    use crate::core::registry::{ActionSpec, Replace};

    async fn run(actions: &Actions, template: &str) -> Result<Fulfilled, FulfillError> {
        Fulfiller::new(actions)
            .run(FulfillOptions::new(), template)
            .await
    }

    #[tokio::test]
    async fn no_registered_tags_means_no_ticks() {
        let actions = Actions::new().with("hi", ActionSpec::sync(|_| Ok("x")));
        let fulfilled = run(&actions, "plain <notYourTag a=\"1\"/> text")
            .await
            .expect("fulfill");
        assert_eq!(fulfilled.ticks, 0);
        assert_eq!(fulfilled.text, "plain <notYourTag a=\"1\"></notYourTag> text");
    }

    #[tokio::test]
    async fn markup_in_responses_is_expanded_in_the_next_tick() {
        let actions = Actions::new()
            .with("foo", ActionSpec::sync(|_| Ok("<bar />")))
            .with("bar", ActionSpec::sync(|_| Ok("finally")));
        let fulfilled = run(&actions, "<foo />").await.expect("fulfill");
        assert_eq!(fulfilled.text, "finally");
        assert_eq!(fulfilled.ticks, 2);
    }

    #[tokio::test]
    async fn output_is_a_fixed_point() {
        let actions = Actions::new()
            .with("foo", ActionSpec::sync(|_| Ok("<i><bar /></i>")))
            .with("bar", ActionSpec::sync(|_| Ok("unused")));
        let first = run(&actions, "a <foo/> b").await.expect("first");
        let second = run(&actions, &first.text).await.expect("second");
        assert_eq!(second.ticks, 0);
        assert_eq!(second.text, first.text);
    }

    #[tokio::test]
    async fn tick_limit_stops_runaway_recursion() {
        let actions = Actions::new().with("loop", ActionSpec::sync(|_| Ok("<loop/>")));
        let err = Fulfiller::new(&actions)
            .run(FulfillOptions::new().with_max_ticks(3), "<loop/>")
            .await
            .expect_err("limit");
        assert_eq!(err, FulfillError::TickLimitExceeded { max_ticks: 3 });
    }

    #[tokio::test]
    async fn tick_limit_is_not_hit_when_fixed_point_arrives_in_time() {
        let actions = Actions::new()
            .with("foo", ActionSpec::sync(|_| Ok("<bar />")))
            .with("bar", ActionSpec::sync(|_| Ok("done")));
        let fulfilled = Fulfiller::new(&actions)
            .run(FulfillOptions::new().with_max_ticks(2), "<foo/>")
            .await
            .expect("fulfill");
        assert_eq!(fulfilled.text, "done");
    }

    #[tokio::test]
    async fn context_persists_across_ticks() {
        let context = Context::new();
        context.set("greeting", "hello");
        let actions = Actions::new()
            .with(
                "first",
                ActionSpec::sync(|params| {
                    params.context().set("name", "bob");
                    Ok("<second/>")
                }),
            )
            .with(
                "second",
                ActionSpec::sync(|params| {
                    let context = params.context();
                    let greeting = context.get("greeting").unwrap_or_default();
                    let name = context.get("name").unwrap_or_default();
                    Ok(format!(
                        "{} {}",
                        greeting.as_str().unwrap_or_default(),
                        name.as_str().unwrap_or_default()
                    ))
                }),
            );
        let text = fulfill(
            &actions,
            FulfillOptions::new().with_context(context.clone()),
            "<first/>",
        )
        .await
        .expect("fulfill");
        assert_eq!(text, "hello bob");
        assert_eq!(context.get("name"), Some("bob".into()));
    }

    #[tokio::test]
    async fn all_replacement_discards_later_substitutions() {
        let actions = Actions::new()
            .with("swallow", ActionSpec::sync(|_| Ok("swallowed")).replace(Replace::All))
            .with(
                "late",
                ActionSpec::callback(|_, next| {
                    tokio::spawn(async move {
                        tokio::time::sleep(Duration::from_millis(1)).await;
                        let _ = next.resolve("late");
                    });
                }),
            );
        let text = fulfill(&actions, FulfillOptions::new(), "<late/> x <swallow/> <late/>")
            .await
            .expect("fulfill");
        assert_eq!(text, "swallowed");
    }

    #[tokio::test]
    async fn next_resolves_with_the_final_text() {
        let (seen_tx, seen_rx) = oneshot::channel();
        let seen_tx = Arc::new(Mutex::new(Some(seen_tx)));
        let actions = Actions::new()
            .with(
                "early",
                ActionSpec::callback(move |_, next| {
                    let seen_tx = Arc::clone(&seen_tx);
                    let outcome = next.resolve("<later/>");
                    tokio::spawn(async move {
                        let final_text = outcome.await;
                        if let Some(tx) = seen_tx.lock().expect("lock").take() {
                            let _ = tx.send(final_text);
                        }
                    });
                }),
            )
            .with("later", ActionSpec::sync(|_| Ok("done")));
        let text = fulfill(&actions, FulfillOptions::new(), "<early/>!")
            .await
            .expect("fulfill");
        assert_eq!(text, "done!");
        assert_eq!(seen_rx.await.expect("seen"), Ok("done!".to_string()));
    }

    #[tokio::test]
    async fn next_rejects_with_the_terminal_error() {
        let (seen_tx, seen_rx) = oneshot::channel();
        let seen_tx = Arc::new(Mutex::new(Some(seen_tx)));
        let actions = Actions::new()
            .with(
                "ok",
                ActionSpec::callback(move |_, next| {
                    let outcome = next.outcome();
                    let seen_tx = Arc::clone(&seen_tx);
                    tokio::spawn(async move {
                        let final_result = outcome.await;
                        if let Some(tx) = seen_tx.lock().expect("lock").take() {
                            let _ = tx.send(final_result);
                        }
                    });
                    let _ = next.resolve("fine");
                }),
            )
            .with("boom", ActionSpec::sync(|_| Err::<String, _>(anyhow::anyhow!("hi!"))));
        let err = fulfill(&actions, FulfillOptions::new(), "<ok/><boom/>")
            .await
            .expect_err("failed");
        assert_eq!(err.to_string(), "hi!");
        let seen = seen_rx.await.expect("seen").expect_err("rejected");
        assert_eq!(seen, err);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_call_interrupts_outstanding_continuations() {
        let parked: Arc<Mutex<Option<Continuation>>> = Arc::default();
        let park = Arc::clone(&parked);
        let actions = Actions::new().with(
            "never",
            ActionSpec::callback(move |_, next| {
                *park.lock().expect("lock") = Some(next);
            }),
        );
        let call = fulfill(&actions, FulfillOptions::new(), "<never/>");
        let timed_out = tokio::time::timeout(Duration::from_secs(1), call).await;
        assert!(timed_out.is_err());

        let next = parked.lock().expect("lock").take().expect("parked");
        assert_eq!(next.outcome().await, Err(FulfillError::Interrupted));
    }

    #[test]
    fn blocking_entry_point_drives_timers() {
        let actions = Actions::new().with(
            "slow",
            ActionSpec::future(|_| async {
                tokio::time::sleep(Duration::from_millis(1)).await;
                anyhow::Ok("slept".to_string())
            }),
        );
        let fulfilled =
            fulfill_blocking(&actions, FulfillOptions::new(), "<slow/>").expect("fulfill");
        assert_eq!(fulfilled.text, "slept");
        assert_eq!(fulfilled.ticks, 1);
    }

    #[tokio::test]
    async fn parse_errors_are_terminal() {
        let err = run(&Actions::new(), r#"hi <how a="are you?"#)
            .await
            .expect_err("parse");
        assert!(matches!(err, FulfillError::Parse(_)));
    }
}
