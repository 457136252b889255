//! Action registry: tag name -> controller and policies.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::controller::{Continuation, Controller, Reply};
use crate::core::task::{Params, Task};
use crate::markup::Node;

/// Caller-supplied tree mutation for [`Replace::Custom`].
pub type Replacer = Arc<dyn Fn(&mut Vec<Node>, &Task) + Send + Sync>;

/// How a completed task's response is written back into the tree.
#[derive(Clone, Default)]
pub enum Replace {
    /// Replace only the matched node.
    #[default]
    Node,
    /// Clear every node before the matched one, then replace it.
    Before,
    /// Clear every node after the matched one, then replace it.
    After,
    /// Replace the whole tree with the response.
    All,
    Custom(Replacer),
}

impl Replace {
    pub fn custom<F>(replacer: F) -> Self
    where
        F: Fn(&mut Vec<Node>, &Task) + Send + Sync + 'static,
    {
        Replace::Custom(Arc::new(replacer))
    }
}

impl fmt::Debug for Replace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Replace::Node => f.write_str("Node"),
            Replace::Before => f.write_str("Before"),
            Replace::After => f.write_str("After"),
            Replace::All => f.write_str("All"),
            Replace::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

#[derive(Clone)]
pub struct ActionSpec {
    pub controller: Arc<dyn Controller>,
    pub replace: Replace,
    /// Run one after another (in tag order) instead of concurrently.
    pub series: bool,
}

impl ActionSpec {
    pub fn new(controller: impl Controller + 'static) -> Self {
        Self {
            controller: Arc::new(controller),
            replace: Replace::default(),
            series: false,
        }
    }

    /// Controller with access to both the params and the continuation.
    pub fn from_fn<F>(controller: F) -> Self
    where
        F: Fn(Params, Continuation) -> anyhow::Result<Reply> + Send + Sync + 'static,
    {
        Self::new(controller)
    }

    /// Direct-return controller.
    pub fn sync<F, R>(controller: F) -> Self
    where
        F: Fn(&Params) -> anyhow::Result<R> + Send + Sync + 'static,
        R: Into<Reply>,
    {
        Self::new(
            move |params: Params, _next: Continuation| -> anyhow::Result<Reply> {
                controller(&params).map(Into::into)
            },
        )
    }

    /// Future-style controller.
    pub fn future<F, Fut>(controller: F) -> Self
    where
        F: Fn(Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<String>> + Send + 'static,
    {
        Self::new(
            move |params: Params, _next: Continuation| -> anyhow::Result<Reply> {
                Ok(Reply::future(controller(params)))
            },
        )
    }

    /// Callback-style controller: it must eventually settle the continuation.
    pub fn callback<F>(controller: F) -> Self
    where
        F: Fn(Params, Continuation) + Send + Sync + 'static,
    {
        Self::new(
            move |params: Params, next: Continuation| -> anyhow::Result<Reply> {
                controller(params, next);
                Ok(Reply::Pending)
            },
        )
    }

    pub fn replace(mut self, replace: Replace) -> Self {
        self.replace = replace;
        self
    }

    pub fn series(self) -> Self {
        self.in_series(true)
    }

    pub fn in_series(mut self, series: bool) -> Self {
        self.series = series;
        self
    }
}

impl fmt::Debug for ActionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionSpec")
            .field("replace", &self.replace)
            .field("series", &self.series)
            .finish_non_exhaustive()
    }
}

/// Registered actions keyed by the tag name they match.
///
/// Built from a map or an ordered list of `(name, spec)` pairs; a later entry
/// with the same name replaces the earlier one.
#[derive(Clone, Debug, Default)]
pub struct Actions {
    specs: BTreeMap<String, ActionSpec>,
}

impl Actions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, spec: ActionSpec) -> Self {
        self.insert(name, spec);
        self
    }

    /// Returns the spec previously registered under `name`, if any.
    pub fn insert(&mut self, name: impl Into<String>, spec: ActionSpec) -> Option<ActionSpec> {
        self.specs.insert(name.into(), spec)
    }

    pub fn get(&self, name: &str) -> Option<&ActionSpec> {
        self.specs.get(name)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.specs.keys().map(String::as_str)
    }

    /// True iff any top-level node is a registered tag.
    pub fn has_pending(&self, tree: &[Node]) -> bool {
        tree.iter().any(|node| self.matches(node))
    }

    /// Registered names with at least one top-level match, sorted.
    pub fn pending_names(&self, tree: &[Node]) -> Vec<&str> {
        self.names()
            .filter(|name| tree.iter().any(|node| node.tag_name() == Some(*name)))
            .collect()
    }

    fn matches(&self, node: &Node) -> bool {
        node.tag_name().is_some_and(|name| self.specs.contains_key(name))
    }
}

impl<K: Into<String>> FromIterator<(K, ActionSpec)> for Actions {
    fn from_iter<I: IntoIterator<Item = (K, ActionSpec)>>(iter: I) -> Self {
        let mut actions = Actions::new();
        for (name, spec) in iter {
            actions.insert(name, spec);
        }
        actions
    }
}
