//! Attribute policy registry
//!
//! Maps `(tag | *, attribute)` to the policy that sanitizes the attribute's
//! value. Lookup tries the exact tag first and falls back to the wildcard
//! entry; an attribute with neither is dropped. Whitelisting is therefore
//! opt-in per attribute name.
//!
//! Entries are a tagged union rather than opaque closures so that the
//! registry can be narrowed and inspected at configuration time, and so that
//! caller-supplied policies are always layered over a built-in base policy.

use std::collections::HashMap;
use std::fmt;

use crate::policy::Policy;

/// Attributes with no trust implications: trimmed and passed through.
const GENERIC_ATTRIBUTES: &[&str] = &[
    "abbr",
    "align",
    "alt",
    "aria-activedescendant",
    "aria-atomic",
    "aria-autocomplete",
    "aria-busy",
    "aria-checked",
    "aria-colcount",
    "aria-colindex",
    "aria-colspan",
    "aria-controls",
    "aria-current",
    "aria-describedby",
    "aria-details",
    "aria-disabled",
    "aria-dropeffect",
    "aria-errormessage",
    "aria-expanded",
    "aria-flowto",
    "aria-grabbed",
    "aria-haspopup",
    "aria-hidden",
    "aria-invalid",
    "aria-keyshortcuts",
    "aria-label",
    "aria-labelledby",
    "aria-level",
    "aria-live",
    "aria-modal",
    "aria-multiline",
    "aria-multiselectable",
    "aria-orientation",
    "aria-owns",
    "aria-placeholder",
    "aria-posinset",
    "aria-pressed",
    "aria-readonly",
    "aria-relevant",
    "aria-required",
    "aria-roledescription",
    "aria-rowcount",
    "aria-rowindex",
    "aria-rowspan",
    "aria-selected",
    "aria-setsize",
    "aria-sort",
    "aria-valuemax",
    "aria-valuemin",
    "aria-valuenow",
    "aria-valuetext",
    "autocomplete",
    "axis",
    "bgcolor",
    "border",
    "cellpadding",
    "cellspacing",
    "checked",
    "clear",
    "color",
    "cols",
    "colspan",
    "compact",
    "coords",
    "datetime",
    "dir",
    "disabled",
    "face",
    "height",
    "hreflang",
    "hspace",
    "ismap",
    "label",
    "lang",
    "max",
    "maxlength",
    "min",
    "method",
    "multiple",
    "nohref",
    "noshade",
    "nowrap",
    "open",
    "readonly",
    "required",
    "rel",
    "rev",
    "role",
    "rows",
    "rowspan",
    "rules",
    "scope",
    "selected",
    "shape",
    "size",
    "span",
    "start",
    "summary",
    "tabindex",
    "title",
    "type",
    "valign",
    "value",
    "vspace",
    "width",
];

/// Values accepted for `a target`.
pub const ALLOWED_TARGETS: &[&str] = &["_blank", "_self"];

/// Tag scope of a registry entry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TagScope {
    /// Any tag (`*`)
    Any,
    /// One specific tag, lowercase
    Tag(String),
}

impl fmt::Display for TagScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagScope::Any => f.write_str("*"),
            TagScope::Tag(tag) => f.write_str(tag),
        }
    }
}

/// Registry key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttributeKey {
    /// Tag scope
    pub tag: TagScope,
    /// Attribute name, lowercase
    pub attribute: String,
}

impl AttributeKey {
    /// Key for `attribute` on any tag.
    pub fn any_tag(attribute: &str) -> Self {
        Self {
            tag: TagScope::Any,
            attribute: attribute.to_ascii_lowercase(),
        }
    }

    /// Key for `attribute` on `tag`. A tag of `*` means any tag.
    pub fn on_tag(tag: &str, attribute: &str) -> Self {
        let tag = tag.to_ascii_lowercase();
        Self {
            tag: if tag == "*" {
                TagScope::Any
            } else {
                TagScope::Tag(tag)
            },
            attribute: attribute.to_ascii_lowercase(),
        }
    }
}

/// Policy attached to a registry entry
#[derive(Debug, Clone)]
pub enum AttributePolicy {
    /// Trim and pass through
    Generic,
    /// Non-network URL (`href`, `action`, `cite`)
    Url,
    /// URL that triggers a fetch (`src`, `longdesc`, `link href`)
    NetworkUrl,
    /// `#`-prefixed fragment only (`usemap`)
    UrlFragment,
    /// Name that could clobber DOM properties (`name`, `for`, `headers`)
    Name,
    /// Whitespace-separated class tokens
    ClassTokens,
    /// Single id token
    IdToken,
    /// One of a fixed list of literal values
    AllowedValues(&'static [&'static str]),
    /// Inline style, handled by the CSS sanitizer
    Style,
    /// Caller policy whose output is re-validated by `base`
    Narrowed {
        /// Caller-supplied policy, applied first
        custom: Policy,
        /// Policy the caller's output must still satisfy
        base: Box<AttributePolicy>,
    },
    /// Caller policy installed through the unchecked extension path
    Unchecked(Policy),
}

impl AttributePolicy {
    /// Layer `custom` over this policy.
    pub fn narrowed_by(self, custom: Policy) -> Self {
        AttributePolicy::Narrowed {
            custom,
            base: Box::new(self),
        }
    }
}

/// The attribute policy registry.
#[derive(Debug, Clone)]
pub struct AttributeRegistry {
    entries: HashMap<AttributeKey, AttributePolicy>,
}

impl AttributeRegistry {
    /// Registry holding the default policies.
    pub fn new() -> Self {
        let mut entries = HashMap::new();

        for attribute in GENERIC_ATTRIBUTES {
            entries.insert(AttributeKey::any_tag(attribute), AttributePolicy::Generic);
        }
        for attribute in ["action", "cite", "href"] {
            entries.insert(AttributeKey::any_tag(attribute), AttributePolicy::Url);
        }
        for attribute in ["longdesc", "src"] {
            entries.insert(AttributeKey::any_tag(attribute), AttributePolicy::NetworkUrl);
        }
        entries.insert(
            AttributeKey::on_tag("link", "href"),
            AttributePolicy::NetworkUrl,
        );
        entries.insert(
            AttributeKey::any_tag("usemap"),
            AttributePolicy::UrlFragment,
        );
        for attribute in ["for", "headers", "name"] {
            entries.insert(AttributeKey::any_tag(attribute), AttributePolicy::Name);
        }
        entries.insert(
            AttributeKey::on_tag("a", "target"),
            AttributePolicy::AllowedValues(ALLOWED_TARGETS),
        );
        entries.insert(AttributeKey::any_tag("class"), AttributePolicy::ClassTokens);
        entries.insert(AttributeKey::any_tag("id"), AttributePolicy::IdToken);
        entries.insert(AttributeKey::any_tag("style"), AttributePolicy::Style);

        Self { entries }
    }

    /// Resolve the policy for `attribute` on `tag`.
    ///
    /// # Examples
    ///
    /// ```
    /// use markup_guard::attributes::{AttributePolicy, AttributeRegistry};
    ///
    /// let registry = AttributeRegistry::new();
    /// assert!(matches!(registry.resolve("a", "target"), Some(AttributePolicy::AllowedValues(_))));
    /// assert!(matches!(registry.resolve("div", "href"), Some(AttributePolicy::Url)));
    /// assert!(matches!(registry.resolve("link", "href"), Some(AttributePolicy::NetworkUrl)));
    /// assert!(registry.resolve("div", "onclick").is_none());
    /// assert!(registry.resolve("div", "target").is_none());
    /// ```
    pub fn resolve(&self, tag: &str, attribute: &str) -> Option<&AttributePolicy> {
        self.entries
            .get(&AttributeKey::on_tag(tag, attribute))
            .or_else(|| self.entries.get(&AttributeKey::any_tag(attribute)))
    }

    /// Look up the entry stored under exactly `key`.
    pub fn get(&self, key: &AttributeKey) -> Option<&AttributePolicy> {
        self.entries.get(key)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is whitelisted.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keep only the listed entries, optionally layering a caller policy over
    /// each.
    ///
    /// A tag-specific request may be granted by a wildcard entry; it then gets
    /// its own entry that starts from the wildcard's policy. Requests with no
    /// granting entry fail with the offending key and leave the registry
    /// untouched.
    pub(crate) fn narrow(
        &mut self,
        requests: Vec<(AttributeKey, Option<Policy>)>,
    ) -> Result<(), AttributeKey> {
        let mut narrowed = HashMap::with_capacity(requests.len());

        for (key, custom) in requests {
            let base = self
                .entries
                .get(&key)
                .or_else(|| self.entries.get(&AttributeKey::any_tag(&key.attribute)))
                .cloned()
                .ok_or_else(|| key.clone())?;
            let policy = match custom {
                Some(custom) => base.narrowed_by(custom),
                None => base,
            };
            narrowed.insert(key, policy);
        }

        self.entries = narrowed;
        Ok(())
    }

    /// Insert or replace an entry without any base policy.
    pub(crate) fn insert(&mut self, key: AttributeKey, policy: AttributePolicy) {
        self.entries.insert(key, policy);
    }
}

impl Default for AttributeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
