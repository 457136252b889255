//! One tick: the series group and the parallel group, run side by side.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use futures::future;
use tracing::{debug, warn};

use crate::controller::Outcome;
use crate::core::registry::{Actions, Replace};
use crate::core::substitute::substitute;
use crate::core::task::Task;
use crate::error::FulfillError;
use crate::invoke::invoke;
use crate::markup::Node;

/// Execute one tick's tasks against `tree`.
///
/// Series tasks run one at a time in snapshot order, each starting only once
/// the previous one has completed and been substituted. Parallel tasks are all
/// started together. On failure, tasks already in flight are allowed to
/// finish but their responses are discarded, no further series task starts,
/// and the first failure becomes the tick's result.
///
/// Once a [`Replace::All`] substitution lands, the snapshot the other tasks
/// were indexed against is gone, so their responses are discarded.
pub(crate) async fn run_tick(
    actions: &Actions,
    tasks: Vec<Task>,
    tree: &Mutex<Vec<Node>>,
    outcome: &Outcome,
) -> Result<(), FulfillError> {
    let (series, parallel): (Vec<Task>, Vec<Task>) = tasks
        .into_iter()
        .partition(|task| actions.get(&task.name).is_some_and(|spec| spec.series));
    debug!(
        series = series.len(),
        parallel = parallel.len(),
        "scheduling tick"
    );

    let tick = Tick {
        actions,
        tree,
        outcome,
        failure: Mutex::new(None),
        replaced_all: AtomicBool::new(false),
    };

    let series_group = async {
        for task in series {
            if tick.has_failed() {
                debug!(action = %task.name, index = task.index, "skipping series task after failure");
                break;
            }
            tick.run_task(task).await;
        }
    };
    let parallel_group = future::join_all(parallel.into_iter().map(|task| tick.run_task(task)));
    future::join(series_group, parallel_group).await;

    match tick.failure.into_inner().unwrap_or_else(PoisonError::into_inner) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

struct Tick<'a> {
    actions: &'a Actions,
    tree: &'a Mutex<Vec<Node>>,
    outcome: &'a Outcome,
    failure: Mutex<Option<FulfillError>>,
    // Only read or written while holding the `tree` lock.
    replaced_all: AtomicBool,
}

impl Tick<'_> {
    async fn run_task(&self, mut task: Task) {
        let Some(spec) = self.actions.get(&task.name) else {
            return;
        };
        match invoke(spec, &task, self.outcome).await {
            Ok(response) => {
                if self.has_failed() {
                    debug!(action = %task.name, index = task.index, "discarding response after failure");
                    return;
                }
                debug!(action = %task.name, index = task.index, response = %response, "task completed");
                task.response = response;
                let mut tree = lock(self.tree);
                if self.replaced_all.load(Ordering::Relaxed) {
                    debug!(action = %task.name, index = task.index, "discarding response after tree was replaced");
                    return;
                }
                if matches!(spec.replace, Replace::All) {
                    self.replaced_all.store(true, Ordering::Relaxed);
                }
                if !substitute(&mut tree, &task, &spec.replace) {
                    debug!(
                        action = %task.name,
                        index = task.index,
                        len = tree.len(),
                        "substitution target no longer exists"
                    );
                }
            }
            Err(err) => {
                warn!(action = %task.name, index = task.index, error = %err, "task failed");
                let mut failure = lock(&self.failure);
                if failure.is_none() {
                    *failure = Some(err);
                }
            }
        }
    }

    fn has_failed(&self) -> bool {
        lock(&self.failure).is_some()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
