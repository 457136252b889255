//! Markup collaborator: text to a flat sequence of nodes and back.
//!
//! The engine only relies on "name + attributes + children" and on the
//! serializer round-tripping anything it does not replace. Self-closing
//! elements are normalized to an explicit `<name></name>` pair on output.

mod node;
mod parse;
mod render;

pub use node::{Attribute, Node, is_void};
pub use parse::{ParseError, is_tag_name, parse};
pub use render::{render, render_node};
