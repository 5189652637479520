//! Tag classification
//!
//! Every element is sorted into one of three classes:
//!
//! - **Keep**: whitelisted, emitted with its own tag name
//! - **Blacklisted**: dropped together with its entire subtree
//! - **Unknown**: neither; converted to an inert `span` that keeps its children
//!
//! Unknown tags are converted rather than deleted so that text inside custom
//! or exotic elements survives, while tags that are actively dangerous
//! (`script`, `iframe`, `svg`, ...) take their contents with them.
//!
//! The default tables are frozen statics; a configured [`TagTable`] is an
//! owned copy, so configuring one sanitizer never affects another.

use std::collections::HashSet;

/// Tags structurally preserved by default.
pub const DEFAULT_WHITELIST: &[&str] = &[
    "a", "abbr", "acronym", "address", "area", "article", "aside", "b", "bdi", "bdo", "big",
    "blockquote", "br", "button", "caption", "center", "cite", "code", "col", "colgroup", "data",
    "datalist", "dd", "del", "details", "dfn", "dialog", "dir", "div", "dl", "dt", "em",
    "fieldset", "figcaption", "figure", "font", "footer", "form", "h1", "h2", "h3", "h4", "h5",
    "h6", "header", "hgroup", "hr", "i", "img", "input", "ins", "kbd", "label", "legend", "li",
    "main", "map", "mark", "menu", "meter", "nav", "ol", "optgroup", "option", "output", "p",
    "pre", "progress", "q", "s", "samp", "section", "select", "small", "source", "span",
    "strike", "strong", "sub", "summary", "sup", "table", "tbody", "td", "textarea", "tfoot",
    "th", "thead", "time", "tr", "tt", "u", "ul", "var", "wbr",
];

/// Tags dropped together with their subtree by default.
///
/// `form` is also whitelisted; it is kept only once `allow_form_tag` removes
/// it from this list.
pub const DEFAULT_BLACKLIST: &[&str] = &[
    "applet", "audio", "base", "basefont", "bgsound", "embed", "form", "frame", "frameset",
    "iframe", "isindex", "keygen", "layer", "link", "math", "meta", "noembed", "noframes",
    "object", "param", "plaintext", "script", "style", "svg", "template", "video", "xmp",
];

/// Tags whose content is deferred markup that must not take effect merely by
/// being parsed.
pub const DEFERRED_CONTENT_TAGS: &[&str] = &["template"];

/// Tag used for unknown elements and for the output root.
pub const INERT_CONTAINER_TAG: &str = "span";

/// Result of classifying a tag name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagClass {
    /// Keep the element with its own tag name
    Keep,
    /// Drop the element and everything below it
    Blacklisted,
    /// Convert the element to an inert container
    Unknown,
}

/// Returns true if `tag` holds deferred content.
pub fn is_deferred_content_tag(tag: &str) -> bool {
    DEFERRED_CONTENT_TAGS.contains(&tag)
}

/// Configured whitelist and blacklist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagTable {
    whitelist: HashSet<String>,
    blacklist: HashSet<String>,
    deferred_content_allowed: bool,
}

impl TagTable {
    /// Build the default tables.
    pub fn new() -> Self {
        Self {
            whitelist: DEFAULT_WHITELIST.iter().map(|t| t.to_string()).collect(),
            blacklist: DEFAULT_BLACKLIST.iter().map(|t| t.to_string()).collect(),
            deferred_content_allowed: false,
        }
    }

    /// Classify a tag name.
    ///
    /// Deferred-content tags are blacklisted unless they were re-allowed
    /// through the unchecked extension path.
    ///
    /// # Examples
    ///
    /// ```
    /// use markup_guard::tags::{TagClass, TagTable};
    ///
    /// let table = TagTable::new();
    /// assert_eq!(table.classify("DIV"), TagClass::Keep);
    /// assert_eq!(table.classify("script"), TagClass::Blacklisted);
    /// assert_eq!(table.classify("form"), TagClass::Blacklisted);
    /// assert_eq!(table.classify("my-widget"), TagClass::Unknown);
    /// ```
    pub fn classify(&self, tag: &str) -> TagClass {
        let tag = tag.to_ascii_lowercase();
        if is_deferred_content_tag(&tag) && !self.deferred_content_allowed {
            return TagClass::Blacklisted;
        }
        if self.blacklist.contains(&tag) {
            TagClass::Blacklisted
        } else if self.whitelist.contains(&tag) {
            TagClass::Keep
        } else {
            TagClass::Unknown
        }
    }

    /// Returns true if `tag` is currently whitelisted.
    pub fn is_whitelisted(&self, tag: &str) -> bool {
        self.whitelist.contains(tag)
    }

    /// Returns true if deferred-content tags are kept.
    pub fn deferred_content_allowed(&self) -> bool {
        self.deferred_content_allowed
    }

    /// Stop blacklisting `form`.
    pub(crate) fn allow_form(&mut self) {
        self.blacklist.remove("form");
    }

    /// Restrict the whitelist to `tags`.
    ///
    /// Fails with the first tag that is not currently whitelisted; the table
    /// is left untouched in that case.
    pub(crate) fn narrow(&mut self, tags: &[String]) -> Result<(), String> {
        if let Some(missing) = tags.iter().find(|tag| !self.whitelist.contains(*tag)) {
            return Err(missing.clone());
        }
        self.whitelist = tags.iter().cloned().collect();
        Ok(())
    }

    /// Whitelist `tags`, removing them from the blacklist.
    pub(crate) fn widen(&mut self, tags: &[String]) {
        for tag in tags {
            self.blacklist.remove(tag);
            self.whitelist.insert(tag.clone());
            if is_deferred_content_tag(tag) {
                self.deferred_content_allowed = true;
            }
        }
    }
}

impl Default for TagTable {
    fn default() -> Self {
        Self::new()
    }
}
