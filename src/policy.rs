//! Policy primitives
//!
//! A policy maps a raw attribute value, plus read-only hints about where the
//! value came from, to either an accepted value or a rejection (`None`).
//! Built-in and caller-supplied policies share one call signature so they can
//! be composed by plain function wrapping.
//!
//! The functions in this module are the engine's own defaults and final
//! validators. They are pure: the same input always yields the same output and
//! nothing is read from or written to the environment.

use regex::Regex;
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::css::StyleDeclaration;

/// Prefix of attributes the sanitizer writes for its own bookkeeping.
///
/// Callers can never allow an attribute with this prefix, so a marker seen in
/// the output was always produced by the sanitizer.
pub const INTERNAL_ATTRIBUTE_PREFIX: &str = "data-sanitizer-";

/// Marker attribute recording the original name of a converted unknown tag.
pub const ORIGINAL_TAG_ATTRIBUTE: &str = "data-sanitizer-original-tag";

/// Read-only context passed to every policy call.
///
/// All names are lowercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyHints<'a> {
    /// Tag name of the output element
    pub tag_name: &'a str,
    /// Attribute being sanitized
    pub attribute_name: &'a str,
    /// CSS property, set only when the value is a URL inside a style declaration
    pub css_property: Option<&'a str>,
}

impl<'a> PolicyHints<'a> {
    /// Hints for an attribute value.
    pub fn new(tag_name: &'a str, attribute_name: &'a str) -> Self {
        Self {
            tag_name,
            attribute_name,
            css_property: None,
        }
    }

    /// Hints for a URL found in the given CSS property.
    pub fn with_css_property(self, property: &'a str) -> Self {
        Self {
            css_property: Some(property),
            ..self
        }
    }
}

/// Extra context available to policies.
///
/// `css_style` is only present while the `style` attribute is being
/// sanitized, and holds the already parsed declaration block.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyContext<'a> {
    /// Parsed inline style declaration
    pub css_style: Option<&'a StyleDeclaration>,
}

impl<'a> PolicyContext<'a> {
    /// Context for a `style` attribute.
    pub fn with_style(style: &'a StyleDeclaration) -> Self {
        Self {
            css_style: Some(style),
        }
    }
}

type PolicyFn = dyn Fn(&str, &PolicyHints<'_>, &PolicyContext<'_>) -> Option<String> + Send + Sync;

/// A shareable policy function.
///
/// Returning `None` rejects the value and the attribute is dropped.
#[derive(Clone)]
pub struct Policy(Arc<PolicyFn>);

impl Policy {
    /// Wrap a closure as a policy.
    ///
    /// # Examples
    ///
    /// ```
    /// use markup_guard::policy::{Policy, PolicyContext, PolicyHints};
    ///
    /// let upper = Policy::new(|value, _hints, _ctx| Some(value.to_uppercase()));
    /// let hints = PolicyHints::new("p", "title");
    /// assert_eq!(upper.apply("hi", &hints, &PolicyContext::default()), Some("HI".to_string()));
    /// ```
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&str, &PolicyHints<'_>, &PolicyContext<'_>) -> Option<String> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Invoke the policy.
    pub fn apply(
        &self,
        value: &str,
        hints: &PolicyHints<'_>,
        ctx: &PolicyContext<'_>,
    ) -> Option<String> {
        (self.0)(value, hints, ctx)
    }

    /// Compose `self` with a validator that re-checks every accepted value.
    ///
    /// The result can only reject more than `self`, never accept more than
    /// `validator`.
    pub fn then(&self, validator: Policy) -> Policy {
        let custom = self.clone();
        Policy::new(move |value, hints, ctx| {
            let narrowed = custom.apply(value, hints, ctx)?;
            validator.apply(&narrowed, hints, ctx)
        })
    }
}

impl fmt::Debug for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Policy(..)")
    }
}

/// Generic cleanup: trim surrounding whitespace and pass the value through.
pub fn trim_value(value: &str) -> Option<String> {
    Some(value.trim().to_string())
}

/// Policy that rejects every value.
pub fn reject_all(_value: &str) -> Option<String> {
    None
}

/// Default URL policy.
///
/// Accepts relative URLs and absolute `http`, `https`, `mailto` and `ftp`
/// URLs. Everything else, including `javascript:` and `data:`, is rejected.
/// ASCII tab and newline characters are ignored for the scheme check, the way
/// browsers ignore them when resolving the URL.
///
/// # Examples
///
/// ```
/// use markup_guard::policy::sanitize_url;
///
/// assert_eq!(sanitize_url(" https://example.com/a "), Some("https://example.com/a".to_string()));
/// assert_eq!(sanitize_url("/relative#frag"), Some("/relative#frag".to_string()));
/// assert_eq!(sanitize_url("javascript:alert(1)"), None);
/// assert_eq!(sanitize_url("java\tscript:alert(1)"), None);
/// ```
pub fn sanitize_url(value: &str) -> Option<String> {
    static SAFE_URL_REGEX: OnceLock<Option<Regex>> = OnceLock::new();
    let regex = SAFE_URL_REGEX
        .get_or_init(|| Regex::new(r"(?i)^(?:(?:https?|mailto|ftp):|[^:/?#]*(?:[/?#]|$))").ok());
    let regex = regex.as_ref()?;

    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    let stripped: String = trimmed
        .chars()
        .filter(|c| !matches!(c, '\t' | '\n' | '\r'))
        .collect();
    if regex.is_match(&stripped) {
        Some(trimmed.to_string())
    } else {
        None
    }
}

/// URL-fragment policy: only values starting with `#` are accepted.
///
/// The value is never handed to the general URL policy, so a fragment-only
/// attribute cannot be used to carry a full URL.
pub fn sanitize_url_fragment(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.starts_with('#') && trimmed.len() > 1 {
        Some(trimmed.to_string())
    } else {
        None
    }
}

/// Final validation for names and tokens produced by a caller policy.
///
/// A valid token is non-empty, contains no whitespace or control characters
/// and does not use the reserved bookkeeping prefix.
pub fn validate_token(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty()
        || trimmed
            .chars()
            .any(|c| c.is_whitespace() || c.is_control())
        || trimmed
            .to_ascii_lowercase()
            .starts_with(INTERNAL_ATTRIBUTE_PREFIX)
    {
        return None;
    }
    Some(trimmed.to_string())
}

/// Apply `per_token` to every whitespace-separated token of `value`.
///
/// Surviving tokens are joined with single spaces. If no token survives the
/// whole value is rejected.
///
/// # Examples
///
/// ```
/// use markup_guard::policy::sanitize_token_list;
///
/// let kept = sanitize_token_list(" a  bad b ", |t| (t != "bad").then(|| t.to_string()));
/// assert_eq!(kept, Some("a b".to_string()));
/// assert_eq!(sanitize_token_list("bad", |_| None), None);
/// ```
pub fn sanitize_token_list<F>(value: &str, mut per_token: F) -> Option<String>
where
    F: FnMut(&str) -> Option<String>,
{
    let kept: Vec<String> = value
        .split_whitespace()
        .filter_map(&mut per_token)
        .collect();
    if kept.is_empty() {
        None
    } else {
        Some(kept.join(" "))
    }
}

/// Enumerated-value policy: accept only one of `allowed` (ASCII case-insensitive).
///
/// The accepted value is returned in the casing of the allow-list entry.
pub fn allowed_value(value: &str, allowed: &[&str]) -> Option<String> {
    let trimmed = value.trim();
    allowed
        .iter()
        .find(|candidate| candidate.eq_ignore_ascii_case(trimmed))
        .map(|candidate| candidate.to_string())
}
