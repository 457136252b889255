//! Task construction: one task per matched top-level node per tick.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use crate::core::context::Context;
use crate::core::registry::Actions;
use crate::markup::{Node, render, render_node};

/// One invocation of an action's controller against one matched node.
#[derive(Debug, Clone)]
pub struct Task {
    /// Action name, i.e. the matched tag name.
    pub name: String,
    /// Position of the matched node in the snapshot this task was built from.
    pub index: usize,
    pub params: Params,
    /// Controller output; empty until the task completes.
    pub response: String,
}

impl Task {
    /// The matched node as it was when the task was built.
    pub fn node(&self) -> &Node {
        self.params.node()
    }
}

/// Parameters handed to a controller.
///
/// The text views are rendered lazily from an immutable snapshot of the
/// tick's tree and memoized, so they never observe substitutions made by
/// other tasks of the same tick. Clones share the snapshot and the memos.
#[derive(Debug, Clone)]
pub struct Params {
    inner: Arc<ParamsInner>,
}

#[derive(Debug)]
struct ParamsInner {
    snapshot: Arc<[Node]>,
    index: usize,
    attributes: BTreeMap<String, String>,
    context: Context,
    tag: OnceLock<String>,
    content: OnceLock<String>,
    before: OnceLock<String>,
    after: OnceLock<String>,
    all: OnceLock<String>,
}

impl Params {
    /// `index` must be a valid position in `snapshot`.
    fn new(snapshot: Arc<[Node]>, index: usize, context: Context) -> Self {
        let attributes = snapshot[index].attribute_map();
        Self {
            inner: Arc::new(ParamsInner {
                snapshot,
                index,
                attributes,
                context,
                tag: OnceLock::new(),
                content: OnceLock::new(),
                before: OnceLock::new(),
                after: OnceLock::new(),
                all: OnceLock::new(),
            }),
        }
    }

    pub fn index(&self) -> usize {
        self.inner.index
    }

    /// Always present; empty when the tag has no attributes.
    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.inner.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.inner.attributes.get(name).map(String::as_str)
    }

    pub fn context(&self) -> &Context {
        &self.inner.context
    }

    pub fn node(&self) -> &Node {
        &self.inner.snapshot[self.inner.index]
    }

    /// The whole matched element.
    pub fn tag(&self) -> &str {
        self.inner.tag.get_or_init(|| render_node(self.node()))
    }

    /// The matched element's children.
    pub fn content(&self) -> &str {
        self.inner
            .content
            .get_or_init(|| render(self.node().children()))
    }

    /// Every sibling before the matched element.
    pub fn before(&self) -> &str {
        self.inner
            .before
            .get_or_init(|| render(&self.inner.snapshot[..self.inner.index]))
    }

    /// Every sibling after the matched element.
    pub fn after(&self) -> &str {
        self.inner
            .after
            .get_or_init(|| render(&self.inner.snapshot[self.inner.index + 1..]))
    }

    /// The whole snapshot with the matched element removed.
    pub fn all(&self) -> &str {
        self.inner
            .all
            .get_or_init(|| format!("{}{}", self.before(), self.after()))
    }
}

/// Build this tick's tasks, in snapshot order. Does not mutate anything.
pub fn build_tasks(tree: &[Node], actions: &Actions, context: &Context) -> Vec<Task> {
    let snapshot: Arc<[Node]> = Arc::from(tree);
    tree.iter()
        .enumerate()
        .filter_map(|(index, node)| {
            let name = node.tag_name()?;
            actions.get(name)?;
            Some(Task {
                name: name.to_string(),
                index,
                params: Params::new(Arc::clone(&snapshot), index, context.clone()),
                response: String::new(),
            })
        })
        .collect()
}
