//! Single-pass tree rewriter
//!
//! Walks a [`SourceDocument`] in document order and builds a fresh output
//! tree. Every source element is classified once:
//!
//! - kept elements get a new element with the same tag name
//! - unknown elements get a new `span`
//! - blacklisted elements get a placeholder that is never attached, so
//!   everything that hangs off it disappears with it. Their descendants are
//!   still visited and mapped to the placeholder, which keeps preorder ids
//!   identical to the source document.
//!
//! Source ids are preorder positions. A per-call bookkeeping map records, for
//! every mapped source element, the arena slot of its output element; each new
//! node is attached to the slot of its nearest mapped source ancestor, or to
//! the root `span` when there is none. Comments and doctypes are not mapped
//! and produce no output.
//!
//! Deferred content (template contents) is parsed and rewritten as an
//! independent document with its own map and arena, and attached only once
//! it is complete.

use std::collections::HashMap;
use tracing::debug;

use crate::policy::{INTERNAL_ATTRIBUTE_PREFIX, ORIGINAL_TAG_ATTRIBUTE};
use crate::sanitizer::HtmlSanitizer;
use crate::tags::{INERT_CONTAINER_TAG, TagClass, is_deferred_content_tag};
use crate::tree::{CleanElement, CleanNode, SourceDocument, SourceElement, SourceNode};

/// Arena slot of the output root.
const ROOT_SLOT: usize = 0;

/// Deferred content nested deeper than this is emptied.
const MAX_DEFERRED_NESTING: usize = 16;

enum SlotChild {
    Slot(usize),
    Text(String),
    Built(CleanNode),
}

struct Slot {
    element: CleanElement,
    children: Vec<SlotChild>,
}

/// Per-call rewriting state. Nothing here outlives one call.
struct Rewrite<'a> {
    sanitizer: &'a HtmlSanitizer,
    deferred_nesting: usize,
    slots: Vec<Slot>,
    /// Source preorder id to arena slot; `None` for dropped elements
    mapped: HashMap<usize, Option<usize>>,
    /// Source preorder id to parent source id
    parents: Vec<Option<usize>>,
}

/// Rewrite `document` under the configuration of `sanitizer`.
///
/// Returns the root `span` holding the sanitized top-level nodes.
pub(crate) fn rewrite(sanitizer: &HtmlSanitizer, document: &SourceDocument) -> CleanNode {
    Rewrite::new(sanitizer, 0).run(document)
}

impl<'a> Rewrite<'a> {
    fn new(sanitizer: &'a HtmlSanitizer, deferred_nesting: usize) -> Self {
        Self {
            sanitizer,
            deferred_nesting,
            slots: vec![Slot {
                element: CleanElement::new(INERT_CONTAINER_TAG),
                children: Vec::new(),
            }],
            mapped: HashMap::new(),
            parents: Vec::new(),
        }
    }

    fn run(mut self, document: &SourceDocument) -> CleanNode {
        self.walk(document);
        self.assemble()
    }

    /// Visit every source node once, in document order.
    fn walk(&mut self, document: &SourceDocument) {
        // Explicit stack of (node, parent id), pushed in reverse so nodes are
        // visited in document order.
        let mut stack: Vec<(&SourceNode, Option<usize>)> =
            document.children.iter().rev().map(|n| (n, None)).collect();

        while let Some((node, parent)) = stack.pop() {
            let id = self.parents.len();
            self.parents.push(parent);

            match node {
                SourceNode::Text(text) => {
                    let target = self.attachment_slot(parent);
                    if let Some(slot) = target {
                        self.slots[slot].children.push(SlotChild::Text(text.clone()));
                    }
                }
                SourceNode::Element(element) => {
                    self.visit_element(id, parent, element);
                    stack.extend(element.children.iter().rev().map(|c| (c, Some(id))));
                }
                SourceNode::Comment(_) | SourceNode::Doctype(_) => {}
            }
        }
    }

    /// Slot that content under source `parent` attaches to.
    ///
    /// Returns `None` when the nearest mapped ancestor was dropped.
    fn attachment_slot(&self, mut parent: Option<usize>) -> Option<usize> {
        while let Some(id) = parent {
            if let Some(slot) = self.mapped.get(&id) {
                return *slot;
            }
            parent = self.parents[id];
        }
        Some(ROOT_SLOT)
    }

    /// Classify and map one element.
    ///
    /// Dropped elements map to `None`; so does everything below them, since
    /// their nearest mapped ancestor is the dropped one.
    fn visit_element(&mut self, id: usize, parent: Option<usize>, source: &SourceElement) {
        let class = self.sanitizer.tags.classify(&source.name);

        let tag_name = match class {
            TagClass::Blacklisted => {
                debug!(tag = %source.name, "dropping blacklisted element and its subtree");
                self.mapped.insert(id, None);
                return;
            }
            TagClass::Keep => source.name.to_ascii_lowercase(),
            TagClass::Unknown => {
                debug!(tag = %source.name, "converting unknown element to span");
                INERT_CONTAINER_TAG.to_string()
            }
        };

        let Some(target) = self.attachment_slot(parent) else {
            self.mapped.insert(id, None);
            return;
        };

        let mut element = CleanElement::new(&tag_name);
        self.copy_attributes(&tag_name, source, &mut element);
        if class == TagClass::Unknown && self.sanitizer.add_original_tag_names {
            element.set_attribute(ORIGINAL_TAG_ATTRIBUTE, source.name.clone());
        }

        let mut children = Vec::new();
        if class == TagClass::Keep && is_deferred_content_tag(&tag_name) {
            children.extend(self.deferred_children(source).into_iter().map(SlotChild::Built));
        }

        let slot = self.slots.len();
        self.slots.push(Slot { element, children });
        self.slots[target].children.push(SlotChild::Slot(slot));
        self.mapped.insert(id, Some(slot));
    }

    /// Evaluate every attribute of `source` against the policy registry.
    ///
    /// Duplicate names resolve to the last occurrence.
    fn copy_attributes(&self, tag_name: &str, source: &SourceElement, element: &mut CleanElement) {
        let mut deduped: Vec<(String, &str)> = Vec::with_capacity(source.attributes.len());
        for (name, value) in &source.attributes {
            let name = name.to_ascii_lowercase();
            match deduped.iter_mut().find(|(seen, _)| *seen == name) {
                Some(entry) => entry.1 = value.as_str(),
                None => deduped.push((name, value.as_str())),
            }
        }

        for (name, value) in deduped {
            if name.starts_with(INTERNAL_ATTRIBUTE_PREFIX) {
                debug!(tag = tag_name, attribute = %name, "dropping reserved attribute");
                continue;
            }
            if let Some(clean) = self.sanitizer.sanitize_attribute(tag_name, &name, value) {
                element.set_attribute(&name, clean);
            }
        }
    }

    /// Sanitize deferred markup as an independent document.
    fn deferred_children(&self, source: &SourceElement) -> Vec<CleanNode> {
        let Some(markup) = source.deferred_markup.as_deref() else {
            return Vec::new();
        };
        if !self.sanitizer.sanitize_template_contents {
            return Vec::new();
        }
        if self.deferred_nesting >= MAX_DEFERRED_NESTING {
            debug!(tag = %source.name, "emptying deferred content nested too deeply");
            return Vec::new();
        }

        let document = self.sanitizer.parser.parse(markup);
        match Rewrite::new(self.sanitizer, self.deferred_nesting + 1).run(&document) {
            CleanNode::Element(mut root) => root.take_children(),
            CleanNode::Text(_) => Vec::new(),
        }
    }

    /// Build the output tree bottom-up.
    ///
    /// A child's slot index is always greater than its parent's, so visiting
    /// slots in descending order sees every child before its parent.
    fn assemble(self) -> CleanNode {
        let mut built: Vec<Option<CleanNode>> = Vec::with_capacity(self.slots.len());
        built.resize_with(self.slots.len(), || None);

        for (index, slot) in self.slots.into_iter().enumerate().rev() {
            let Slot {
                mut element,
                children,
            } = slot;
            let children = children
                .into_iter()
                .filter_map(|child| match child {
                    SlotChild::Slot(child_index) => built[child_index].take(),
                    SlotChild::Text(text) => Some(CleanNode::Text(text)),
                    SlotChild::Built(node) => Some(node),
                })
                .collect();
            element.set_children(children);
            built[index] = Some(CleanNode::Element(element));
        }

        built
            .into_iter()
            .next()
            .flatten()
            .unwrap_or_else(|| CleanNode::Element(CleanElement::new(INERT_CONTAINER_TAG)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document() -> SourceDocument {
        // 0 object, 1 p, 2 "inside", 3 em, 4 "after"
        SourceDocument::new(vec![
            SourceElement::new("object")
                .with_child(SourceElement::new("p").with_child(SourceNode::text("inside")))
                .into(),
            SourceElement::new("em")
                .with_child(SourceNode::text("after"))
                .into(),
        ])
    }

    #[test]
    fn test_blacklisted_descendants_are_visited_and_dropped() {
        let sanitizer = HtmlSanitizer::default();
        let mut rewrite = Rewrite::new(&sanitizer, 0);
        rewrite.walk(&document());

        assert_eq!(rewrite.parents, vec![None, Some(0), Some(1), None, Some(3)]);
        assert_eq!(rewrite.mapped.get(&0), Some(&None));
        assert_eq!(rewrite.mapped.get(&1), Some(&None));
        assert_eq!(rewrite.attachment_slot(Some(1)), None);
        assert_eq!(rewrite.mapped.get(&3), Some(&Some(1)));
    }

    #[test]
    fn test_blacklisted_subtree_is_unreachable_from_root() {
        let sanitizer = HtmlSanitizer::default();
        let root = rewrite(&sanitizer, &document());

        assert_eq!(root.inner_html(), "<em>after</em>");
    }

    #[test]
    fn test_deferred_content_nesting_is_capped() {
        let sanitizer = HtmlSanitizer {
            tags: {
                let mut tags = crate::tags::TagTable::new();
                tags.widen(&["template".to_string()]);
                tags
            },
            ..HtmlSanitizer::default()
        };
        let depth = MAX_DEFERRED_NESTING + 4;
        let markup = format!(
            "{}<p>deep</p>{}",
            "<template>".repeat(depth),
            "</template>".repeat(depth)
        );

        let html = sanitizer.sanitize(&markup);

        assert_eq!(html.as_str().matches("<template>").count(), MAX_DEFERRED_NESTING + 1);
        assert!(!html.as_str().contains("deep"));
    }
}
