//! Writing a completed task's response back into the tree.

use std::ops::Range;

use crate::core::registry::Replace;
use crate::core::task::Task;
use crate::markup::Node;

/// Apply `replace` for a completed task, mutating `tree` in place.
///
/// Cleared positions become empty text nodes instead of being removed, so the
/// indices of other tasks from the same snapshot stay valid. Returns false
/// when the task's position no longer exists (e.g. after [`Replace::All`]).
pub fn substitute(tree: &mut Vec<Node>, task: &Task, replace: &Replace) -> bool {
    match replace {
        Replace::Custom(replacer) => {
            replacer(tree, task);
            true
        }
        Replace::All => {
            *tree = vec![Node::text(task.response.as_str())];
            true
        }
        Replace::Node => set_slot(tree, task),
        Replace::Before => {
            clear(tree, 0..task.index);
            set_slot(tree, task)
        }
        Replace::After => {
            let len = tree.len();
            clear(tree, task.index + 1..len);
            set_slot(tree, task)
        }
    }
}

fn set_slot(tree: &mut [Node], task: &Task) -> bool {
    match tree.get_mut(task.index) {
        Some(slot) => {
            *slot = Node::text(task.response.as_str());
            true
        }
        None => false,
    }
}

fn clear(tree: &mut [Node], range: Range<usize>) {
    let end = range.end.min(tree.len());
    let start = range.start.min(end);
    for slot in &mut tree[start..end] {
        *slot = Node::empty();
    }
}
