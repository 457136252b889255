use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// HTML elements that never take children and render without a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    /// `None` for a bare attribute such as `<input disabled>`.
    pub value: Option<String>,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }

    pub fn bare(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Node {
    Element {
        name: String,
        attributes: Vec<Attribute>,
        children: Vec<Node>,
    },
    Text(String),
}

impl Node {
    pub fn text(value: impl Into<String>) -> Self {
        Node::Text(value.into())
    }

    /// An empty text slot. Used when clearing positions so indices stay stable.
    pub fn empty() -> Self {
        Node::Text(String::new())
    }

    pub fn element(name: impl Into<String>, attributes: Vec<Attribute>, children: Vec<Node>) -> Self {
        Node::Element {
            name: name.into(),
            attributes,
            children,
        }
    }

    /// Tag name for elements, `None` for text.
    pub fn tag_name(&self) -> Option<&str> {
        match self {
            Node::Element { name, .. } => Some(name),
            Node::Text(_) => None,
        }
    }

    pub fn children(&self) -> &[Node] {
        match self {
            Node::Element { children, .. } => children,
            Node::Text(_) => &[],
        }
    }

    /// Attributes as a name -> value mapping. Bare attributes map to `""`;
    /// on duplicate names the last occurrence wins.
    pub fn attribute_map(&self) -> BTreeMap<String, String> {
        match self {
            Node::Element { attributes, .. } => attributes
                .iter()
                .map(|attr| (attr.name.clone(), attr.value.clone().unwrap_or_default()))
                .collect(),
            Node::Text(_) => BTreeMap::new(),
        }
    }
}

pub fn is_void(name: &str) -> bool {
    VOID_ELEMENTS
        .iter()
        .any(|void| void.eq_ignore_ascii_case(name))
}
