//! Source and clean document trees
//!
//! The sanitizer reads a [`SourceDocument`] produced by an inert parser and
//! writes a separate tree of [`CleanNode`]s. Nothing from the source tree is
//! reused in the output: every clean element is freshly built from a tag name
//! the sanitizer decided on and attribute values that passed a policy.
//!
//! Source nodes are plain data reached through fields and statically
//! dispatched methods, so a hostile child named like a property (for example
//! `<form><input name="attributes"></form>`) cannot shadow anything.

use html5ever::serialize::{Serialize, SerializeOpts, Serializer, TraversalScope, serialize};
use html5ever::{LocalName, Namespace, QualName};
use std::collections::VecDeque;
use std::fmt;
use std::io;

/// Namespace of every element the sanitizer emits.
const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// An inert parsed document: the top-level nodes of the input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceDocument {
    /// Top-level nodes, in document order
    pub children: Vec<SourceNode>,
}

impl SourceDocument {
    /// Document with the given top-level nodes.
    pub fn new(children: Vec<SourceNode>) -> Self {
        Self { children }
    }
}

/// A node of the inert source tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceNode {
    /// Character data
    Text(String),
    /// Element
    Element(SourceElement),
    /// Comment
    Comment(String),
    /// Doctype declaration
    Doctype(String),
}

impl SourceNode {
    /// Text node.
    pub fn text(text: impl Into<String>) -> Self {
        SourceNode::Text(text.into())
    }
}

impl From<SourceElement> for SourceNode {
    fn from(element: SourceElement) -> Self {
        SourceNode::Element(element)
    }
}

/// An element of the inert source tree.
///
/// `deferred_markup` holds the raw contents of template-like elements. They
/// are not part of `children` because the markup must not take effect merely
/// by having been parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceElement {
    /// Tag name
    pub name: String,
    /// Attributes in source order; duplicates are possible
    pub attributes: Vec<(String, String)>,
    /// Child nodes
    pub children: Vec<SourceNode>,
    /// Raw markup of deferred content
    pub deferred_markup: Option<String>,
}

impl SourceElement {
    /// Element with no attributes and no children.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
            deferred_markup: None,
        }
    }

    /// Add an attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    /// Append a child node.
    pub fn with_child(mut self, child: impl Into<SourceNode>) -> Self {
        self.children.push(child.into());
        self
    }

    /// Attach deferred markup.
    pub fn with_deferred_markup(mut self, markup: impl Into<String>) -> Self {
        self.deferred_markup = Some(markup.into());
        self
    }
}

/// A node of the sanitized output tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanNode {
    /// Element built by the sanitizer
    Element(CleanElement),
    /// Character data
    Text(String),
}

impl CleanNode {
    /// The element, if this node is one.
    pub fn as_element(&self) -> Option<&CleanElement> {
        match self {
            CleanNode::Element(element) => Some(element),
            CleanNode::Text(_) => None,
        }
    }

    /// Concatenated text content of this node and its descendants.
    pub fn text_content(&self) -> String {
        let mut text = String::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            match node {
                CleanNode::Text(t) => text.push_str(t),
                CleanNode::Element(element) => stack.extend(element.children.iter().rev()),
            }
        }
        text
    }

    /// Serialize the node's children.
    pub fn inner_html(&self) -> String {
        self.to_markup(TraversalScope::ChildrenOnly(None))
    }

    /// Serialize the node itself, including its own tag.
    pub fn outer_html(&self) -> String {
        self.to_markup(TraversalScope::IncludeNode)
    }

    fn to_markup(&self, traversal_scope: TraversalScope) -> String {
        let mut buf = Vec::new();
        let opts = SerializeOpts {
            traversal_scope,
            ..Default::default()
        };
        // Writing into a Vec cannot fail.
        if serialize(&mut buf, self, opts).is_err() {
            return String::new();
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

/// An attribute on a clean element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanAttribute {
    name: QualName,
    value: String,
}

impl CleanAttribute {
    /// Attribute name
    pub fn name(&self) -> &str {
        &self.name.local
    }

    /// Sanitized value
    pub fn value(&self) -> &str {
        &self.value
    }
}

/// An element of the sanitized output tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanElement {
    name: QualName,
    attributes: Vec<CleanAttribute>,
    children: Vec<CleanNode>,
}

impl CleanElement {
    pub(crate) fn new(tag_name: &str) -> Self {
        Self {
            name: html_name(tag_name),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Set an attribute, replacing any earlier value of the same name.
    pub(crate) fn set_attribute(&mut self, name: &str, value: String) {
        if let Some(existing) = self.attributes.iter_mut().find(|a| a.name() == name) {
            existing.value = value;
            return;
        }
        self.attributes.push(CleanAttribute {
            name: QualName::new(None, Namespace::from(""), LocalName::from(name)),
            value,
        });
    }

    pub(crate) fn set_children(&mut self, children: Vec<CleanNode>) {
        self.children = children;
    }

    pub(crate) fn take_children(&mut self) -> Vec<CleanNode> {
        std::mem::take(&mut self.children)
    }

    /// Tag name, lowercase
    pub fn tag_name(&self) -> &str {
        &self.name.local
    }

    /// Value of the named attribute
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name() == name)
            .map(CleanAttribute::value)
    }

    /// Attributes in output order
    pub fn attributes(&self) -> &[CleanAttribute] {
        &self.attributes
    }

    /// Child nodes
    pub fn children(&self) -> &[CleanNode] {
        &self.children
    }
}

fn html_name(tag_name: &str) -> QualName {
    QualName::new(
        None,
        Namespace::from(HTML_NAMESPACE),
        LocalName::from(tag_name),
    )
}

enum SerializeOp<'a> {
    Open(&'a CleanNode),
    Close(&'a QualName),
}

impl Serialize for CleanNode {
    fn serialize<S>(&self, serializer: &mut S, traversal_scope: TraversalScope) -> io::Result<()>
    where
        S: Serializer,
    {
        let mut ops = VecDeque::new();
        match traversal_scope {
            TraversalScope::IncludeNode => ops.push_back(SerializeOp::Open(self)),
            TraversalScope::ChildrenOnly(_) => {
                if let CleanNode::Element(element) = self {
                    ops.extend(element.children.iter().map(SerializeOp::Open));
                }
            }
        }

        while let Some(op) = ops.pop_front() {
            match op {
                SerializeOp::Open(CleanNode::Text(text)) => serializer.write_text(text)?,
                SerializeOp::Open(CleanNode::Element(element)) => {
                    serializer.start_elem(
                        element.name.clone(),
                        element
                            .attributes
                            .iter()
                            .map(|a| (&a.name, a.value.as_str())),
                    )?;
                    ops.push_front(SerializeOp::Close(&element.name));
                    for child in element.children.iter().rev() {
                        ops.push_front(SerializeOp::Open(child));
                    }
                }
                SerializeOp::Close(name) => serializer.end_elem(name.clone())?,
            }
        }

        Ok(())
    }
}

/// Sanitized markup.
///
/// Values are only produced by the sanitizer, so holding a `SafeHtml` means
/// the markup went through a sanitizer configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SafeHtml(String);

impl SafeHtml {
    pub(crate) fn from_sanitized(markup: String) -> Self {
        Self(markup)
    }

    /// The sanitized markup
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if nothing survived sanitization.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Take ownership of the markup
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for SafeHtml {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SafeHtml {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
