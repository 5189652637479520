//! Inert HTML parsing using html5ever
//!
//! The sanitizer never looks at markup text directly. Input is handed to an
//! [`InertParser`], which must build a tree without executing scripts,
//! fetching resources or running event handlers. The result is converted to
//! a plain-data [`SourceDocument`] that the rewriter walks.
//!
//! # Overview
//!
//! The default [`Html5everParser`] uses Mozilla's html5ever, which implements
//! the WHATWG parsing algorithm, so malformed markup is recovered the same way
//! a browser would recover it. Parsing happens into an `RcDom` with
//! html5ever's default options, which treat scripting as enabled, so
//! `<noscript>` content arrives as raw text. Nothing in the tree is live.
//!
//! # Document shape
//!
//! Input is parsed as a full document and then flattened: the children of
//! `<head>` followed by the children of `<body>` become the top-level nodes.
//! A `<frameset>` that replaces the body is kept as a top-level element.
//!
//! # Deferred content
//!
//! html5ever places `<template>` contents in a separate fragment. That
//! fragment, including the contents of any template nested inside it, is
//! serialized back to markup and stored as
//! [`SourceElement::deferred_markup`] instead of becoming children, so it can
//! only ever reach the output by being sanitized on its own.
//!
//! # Examples
//!
//! ```rust
//! use markup_guard::parser::{Html5everParser, InertParser};
//! use markup_guard::tree::SourceNode;
//!
//! let doc = Html5everParser.parse("<p>Hello<script>alert(1)</script>");
//! assert_eq!(doc.children.len(), 1);
//! match &doc.children[0] {
//!     SourceNode::Element(p) => assert_eq!(p.name, "p"),
//!     other => panic!("unexpected node {other:?}"),
//! }
//! ```

use html5ever::serialize::{Serialize, SerializeOpts, Serializer, TraversalScope, serialize};
use html5ever::tendril::TendrilSink;
use html5ever::{QualName, parse_document};
use markup5ever_rcdom::{Handle, NodeData, RcDom};
use std::collections::VecDeque;
use std::fmt;
use std::io;
use tracing::debug;

use crate::charset::decode_to_utf8;
use crate::error::SanitizerError;
use crate::tree::{SourceDocument, SourceElement, SourceNode};

/// Maximum element nesting depth kept from a parsed document.
///
/// Elements nested deeper are dropped together with their content.
pub const MAX_NESTING_DEPTH: usize = 1000;

/// A parser that builds an inert tree from markup.
///
/// Implementations must not execute scripts or fetch resources, and must
/// expose template-like contents only through
/// [`SourceElement::deferred_markup`].
pub trait InertParser: Send + Sync {
    /// Parse `markup` into its top-level nodes.
    fn parse(&self, markup: &str) -> SourceDocument;
}

impl fmt::Debug for dyn InertParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("InertParser(..)")
    }
}

/// The default parser, backed by html5ever.
#[derive(Debug, Clone, Copy, Default)]
pub struct Html5everParser;

impl InertParser for Html5everParser {
    fn parse(&self, markup: &str) -> SourceDocument {
        let dom = parse_document(RcDom::default(), Default::default()).one(markup);
        flatten_document(&dom.document)
    }
}

/// Decode `html` with charset detection and parse it.
///
/// # Arguments
///
/// * `html` - Raw markup bytes
/// * `content_type` - Optional Content-Type header value (e.g. "text/html; charset=UTF-8")
/// * `parser` - Parser used for the decoded text
///
/// # Errors
///
/// - `SanitizerError::InvalidInput` if `html` is empty
/// - `SanitizerError::EncodingError` if the bytes do not decode
pub fn parse_bytes(
    html: &[u8],
    content_type: Option<&str>,
    parser: &dyn InertParser,
) -> Result<SourceDocument, SanitizerError> {
    let text = decode_to_utf8(html, content_type)?;
    Ok(parser.parse(&text))
}

/// Collect the top-level nodes of a parsed document.
fn flatten_document(document: &Handle) -> SourceDocument {
    let mut head = Vec::new();
    let mut body = Vec::new();

    for child in document.children.borrow().iter() {
        let NodeData::Element { name, .. } = &child.data else {
            continue;
        };
        if &*name.local != "html" {
            head.extend(convert_node(child, 1));
            continue;
        }
        for section in child.children.borrow().iter() {
            match &section.data {
                NodeData::Element { name, .. } if &*name.local == "head" => {
                    head.extend(convert_children(section, 2));
                }
                NodeData::Element { name, .. } if &*name.local == "body" => {
                    body.extend(convert_children(section, 2));
                }
                _ => body.extend(convert_node(section, 2)),
            }
        }
    }

    head.append(&mut body);
    SourceDocument::new(head)
}

fn convert_children(parent: &Handle, depth: usize) -> Vec<SourceNode> {
    parent
        .children
        .borrow()
        .iter()
        .filter_map(|child| convert_node(child, depth))
        .collect()
}

fn convert_node(node: &Handle, depth: usize) -> Option<SourceNode> {
    match &node.data {
        NodeData::Text { contents } => Some(SourceNode::Text(contents.borrow().to_string())),
        NodeData::Comment { contents } => Some(SourceNode::Comment(contents.to_string())),
        NodeData::Doctype { name, .. } => Some(SourceNode::Doctype(name.to_string())),
        NodeData::Element {
            name,
            attrs,
            template_contents,
            ..
        } => {
            if depth > MAX_NESTING_DEPTH {
                debug!(tag = %name.local, depth, "dropping element nested too deeply");
                return None;
            }

            let attributes = attrs
                .borrow()
                .iter()
                .map(|attr| {
                    let local = attr.name.local.to_ascii_lowercase().to_string();
                    let key = match &attr.name.prefix {
                        Some(prefix) => format!("{}:{}", prefix, local),
                        None => local,
                    };
                    (key, attr.value.to_string())
                })
                .collect();

            let deferred_markup = template_contents
                .borrow()
                .as_ref()
                .map(serialize_fragment);

            Some(SourceNode::Element(SourceElement {
                name: name.local.to_ascii_lowercase().to_string(),
                attributes,
                children: convert_children(node, depth + 1),
                deferred_markup,
            }))
        }
        NodeData::Document | NodeData::ProcessingInstruction { .. } => None,
    }
}

/// A template fragment whose nested templates serialize with their contents.
///
/// rcdom's own `Serialize` only writes `children`, which is always empty for
/// a `<template>`.
struct DeferredFragment(Handle);

enum FragmentOp {
    Open(Handle),
    Close(QualName),
}

impl Serialize for DeferredFragment {
    fn serialize<S>(&self, serializer: &mut S, _scope: TraversalScope) -> io::Result<()>
    where
        S: Serializer,
    {
        let mut ops: VecDeque<FragmentOp> = self
            .0
            .children
            .borrow()
            .iter()
            .map(|child| FragmentOp::Open(child.clone()))
            .collect();

        while let Some(op) = ops.pop_front() {
            match op {
                FragmentOp::Open(handle) => match &handle.data {
                    NodeData::Element {
                        name,
                        attrs,
                        template_contents,
                        ..
                    } => {
                        serializer.start_elem(
                            name.clone(),
                            attrs.borrow().iter().map(|at| (&at.name, &at.value[..])),
                        )?;
                        ops.push_front(FragmentOp::Close(name.clone()));

                        let contents = template_contents.borrow();
                        let parent = contents.as_ref().unwrap_or(&handle);
                        for child in parent.children.borrow().iter().rev() {
                            ops.push_front(FragmentOp::Open(child.clone()));
                        }
                    }
                    NodeData::Text { contents } => serializer.write_text(&contents.borrow())?,
                    NodeData::Comment { contents } => serializer.write_comment(contents)?,
                    NodeData::Document
                    | NodeData::Doctype { .. }
                    | NodeData::ProcessingInstruction { .. } => {}
                },
                FragmentOp::Close(name) => serializer.end_elem(name)?,
            }
        }

        Ok(())
    }
}

/// Serialize the children of a template fragment back to markup.
fn serialize_fragment(fragment: &Handle) -> String {
    let opts = SerializeOpts {
        traversal_scope: TraversalScope::ChildrenOnly(None),
        ..Default::default()
    };
    let mut buf = Vec::new();
    if serialize(&mut buf, &DeferredFragment(fragment.clone()), opts).is_err() {
        return String::new();
    }
    String::from_utf8(buf).unwrap_or_default()
}
