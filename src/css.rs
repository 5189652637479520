//! Inline style sanitization
//!
//! Only `style` attribute declaration blocks are handled; style sheets are
//! removed wholesale by tag classification.
//!
//! # Reading
//!
//! [`StyleDeclaration::parse`] turns raw attribute text into an ordered list of
//! `property: value` pairs. Comments are stripped, declarations are split on
//! top-level `;`, and any declaration that is not a plain identifier followed
//! by a balanced value is skipped. Backslash escapes are refused outright so
//! that `\75 rl(` style tricks never reach the value checks.
//!
//! # Sanitizing
//!
//! [`sanitize_style`] walks every declaration:
//!
//! 1. Custom properties (`--x`, `var...`) are rejected
//! 2. Vendor prefixes are stripped before the whitelist lookup and never re-emitted
//! 3. Whole-value `url(...)` references go through the caller's URL policy
//! 4. Function values are accepted only for whitelisted functions with a single
//!    parenthesis pair
//! 5. Everything else is kept after trimming
//!
//! Accepted declarations are written into a fresh [`StyleDeclaration`] and the
//! result is read back with [`StyleDeclaration::css_text`], so the output can
//! never contain text that was not evaluated as a single declaration.

use regex::Regex;
use std::sync::OnceLock;
use tracing::trace;

/// CSS properties that survive sanitization.
const ALLOWED_PROPERTIES: &[&str] = &[
    // Colors and backgrounds
    "background",
    "background-attachment",
    "background-color",
    "background-image",
    "background-position",
    "background-repeat",
    "background-size",
    "color",
    "opacity",
    // Borders
    "border",
    "border-bottom",
    "border-bottom-color",
    "border-bottom-left-radius",
    "border-bottom-right-radius",
    "border-bottom-style",
    "border-bottom-width",
    "border-collapse",
    "border-color",
    "border-left",
    "border-left-color",
    "border-left-style",
    "border-left-width",
    "border-radius",
    "border-right",
    "border-right-color",
    "border-right-style",
    "border-right-width",
    "border-spacing",
    "border-style",
    "border-top",
    "border-top-color",
    "border-top-left-radius",
    "border-top-right-radius",
    "border-top-style",
    "border-top-width",
    "border-width",
    "box-shadow",
    "outline",
    "outline-color",
    "outline-style",
    "outline-width",
    // Box model
    "box-sizing",
    "height",
    "margin",
    "margin-bottom",
    "margin-left",
    "margin-right",
    "margin-top",
    "max-height",
    "max-width",
    "min-height",
    "min-width",
    "padding",
    "padding-bottom",
    "padding-left",
    "padding-right",
    "padding-top",
    "width",
    // Layout
    "align-content",
    "align-items",
    "align-self",
    "caption-side",
    "clear",
    "display",
    "empty-cells",
    "flex",
    "flex-basis",
    "flex-direction",
    "flex-flow",
    "flex-grow",
    "flex-shrink",
    "flex-wrap",
    "float",
    "justify-content",
    "order",
    "overflow",
    "overflow-x",
    "overflow-y",
    "table-layout",
    "vertical-align",
    "visibility",
    // Typography
    "direction",
    "font",
    "font-family",
    "font-size",
    "font-stretch",
    "font-style",
    "font-variant",
    "font-weight",
    "letter-spacing",
    "line-height",
    "list-style",
    "list-style-position",
    "list-style-type",
    "quotes",
    "text-align",
    "text-decoration",
    "text-decoration-color",
    "text-decoration-line",
    "text-decoration-style",
    "text-indent",
    "text-overflow",
    "text-shadow",
    "text-transform",
    "unicode-bidi",
    "white-space",
    "word-break",
    "word-spacing",
    "word-wrap",
    // Transforms
    "transform",
    "transform-origin",
];

/// Functions allowed inside property values.
const ALLOWED_FUNCTIONS: &[&str] = &[
    "hsl",
    "hsla",
    "linear-gradient",
    "radial-gradient",
    "repeating-linear-gradient",
    "repeating-radial-gradient",
    "rgb",
    "rgba",
    "rotate",
    "scale",
    "translate",
    "translatex",
    "translatey",
];

/// A parsed inline style declaration block.
///
/// Property names are lowercase. Setting an existing property replaces it,
/// and the last declaration of a property wins when parsing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyleDeclaration {
    properties: Vec<(String, String)>,
}

impl StyleDeclaration {
    /// Create an empty declaration block.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the text of a `style` attribute.
    ///
    /// Malformed declarations are skipped; parsing never fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use markup_guard::css::StyleDeclaration;
    ///
    /// let decl = StyleDeclaration::parse("COLOR: red; /* note */ width:10px !important; junk");
    /// assert_eq!(decl.property_value("color"), Some("red"));
    /// assert_eq!(decl.property_value("width"), Some("10px"));
    /// assert_eq!(decl.len(), 2);
    /// ```
    pub fn parse(css_text: &str) -> Self {
        let mut declaration = Self::new();
        let without_comments = strip_comments(css_text);

        for chunk in split_top_level(&without_comments, ';') {
            let Some((name, value)) = chunk.split_once(':') else {
                continue;
            };
            let name = name.trim().to_ascii_lowercase();
            if !is_property_name(&name) {
                continue;
            }
            let value = strip_priority(value.trim());
            if value.is_empty() || !is_well_formed_value(value) {
                trace!(property = %name, "skipping malformed declaration");
                continue;
            }
            declaration.set_property(&name, &collapse_whitespace(value));
        }

        declaration
    }

    /// Value of `name`, if declared.
    pub fn property_value(&self, name: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(property, _)| property == name)
            .map(|(_, value)| value.as_str())
    }

    /// Set `name` to `value`, replacing any previous declaration of `name`.
    pub fn set_property(&mut self, name: &str, value: &str) {
        self.remove_property(name);
        self.properties.push((name.to_string(), value.to_string()));
    }

    /// Remove `name` and return its value.
    pub fn remove_property(&mut self, name: &str) -> Option<String> {
        let index = self
            .properties
            .iter()
            .position(|(property, _)| property == name)?;
        Some(self.properties.remove(index).1)
    }

    /// Declared `(property, value)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.properties
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Number of declarations.
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Returns true if no property is declared.
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Canonical serialization: `name: value;` pairs joined by single spaces.
    pub fn css_text(&self) -> String {
        self.properties
            .iter()
            .map(|(name, value)| format!("{}: {};", name, value))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Sanitize a parsed declaration block and return the clean `cssText`.
///
/// `url_policy` receives `(url, property)` for every `url(...)` value; when it
/// is absent every URL-valued declaration is rejected.
///
/// # Examples
///
/// ```
/// use markup_guard::css::{sanitize_style, StyleDeclaration};
///
/// let decl = StyleDeclaration::parse("color: rgb(1,2,3); width: calc(1px + 2px); --x: 1");
/// assert_eq!(sanitize_style(&decl, None), "color: rgb(1,2,3);");
/// ```
pub fn sanitize_style(
    style: &StyleDeclaration,
    url_policy: Option<&dyn Fn(&str, &str) -> Option<String>>,
) -> String {
    let mut clean = StyleDeclaration::new();

    for (name, value) in style.iter() {
        if is_custom_property(name) {
            trace!(property = %name, "rejecting custom property");
            continue;
        }
        let property = strip_vendor_prefix(name);
        if !ALLOWED_PROPERTIES.contains(&property) {
            trace!(property = %name, "rejecting property outside whitelist");
            continue;
        }
        match sanitize_property_value(property, value, url_policy) {
            Some(sanitized) => clean.set_property(property, &sanitized),
            None => trace!(property = %property, "rejecting property value"),
        }
    }

    clean.css_text()
}

/// Sanitize a single property value.
///
/// Returns `None` if the value must be dropped.
pub fn sanitize_property_value(
    property: &str,
    value: &str,
    url_policy: Option<&dyn Fn(&str, &str) -> Option<String>>,
) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    let lowered = value.to_ascii_lowercase();
    if lowered.contains("url(") {
        let url = extract_url(value)?;
        let policy = url_policy?;
        let accepted = policy(&url, property)?;
        return Some(format!("url(\"{}\")", encode_css_url(&accepted)));
    }

    if value.contains('(') || value.contains(')') {
        return sanitize_function_value(value);
    }

    Some(value.to_string())
}

/// Returns true for custom properties, which cannot be value-checked generically.
pub fn is_custom_property(name: &str) -> bool {
    name.starts_with("--") || name.starts_with("var")
}

/// Remove a leading vendor prefix such as `-webkit-` or `-moz-`.
///
/// # Examples
///
/// ```
/// use markup_guard::css::strip_vendor_prefix;
///
/// assert_eq!(strip_vendor_prefix("-webkit-border-radius"), "border-radius");
/// assert_eq!(strip_vendor_prefix("color"), "color");
/// ```
pub fn strip_vendor_prefix(name: &str) -> &str {
    static VENDOR_PREFIX_REGEX: OnceLock<Option<Regex>> = OnceLock::new();
    let regex = VENDOR_PREFIX_REGEX.get_or_init(|| Regex::new(r"^-[a-z]+-").ok());
    match regex.as_ref().and_then(|r| r.find(name)) {
        Some(m) => &name[m.end()..],
        None => name,
    }
}

/// Extract the unquoted URL of a value that is exactly one `url(...)`.
fn extract_url(value: &str) -> Option<String> {
    static URL_REGEX: OnceLock<Option<Regex>> = OnceLock::new();
    let regex = URL_REGEX.get_or_init(|| {
        Regex::new(r#"(?is)^url\(\s*(?:"([^"]*)"|'([^']*)'|([^'"\s()]*))\s*\)$"#).ok()
    });
    let caps = regex.as_ref()?.captures(value)?;
    let url = caps
        .get(1)
        .or_else(|| caps.get(2))
        .or_else(|| caps.get(3))?
        .as_str()
        .trim();
    if url.is_empty() {
        None
    } else {
        Some(url.to_string())
    }
}

/// Accept `value` only if it holds one whitelisted function call and nothing
/// nested inside it.
fn sanitize_function_value(value: &str) -> Option<String> {
    static FUNCTION_REGEX: OnceLock<Option<Regex>> = OnceLock::new();
    let regex = FUNCTION_REGEX
        .get_or_init(|| Regex::new(r"(?i)^([^()]*?)([a-z-]+)\(([^()]*)\)([^()]*)$").ok());
    let caps = regex.as_ref()?.captures(value)?;

    let prefix = caps.get(1).map_or("", |m| m.as_str());
    if !prefix.is_empty() && !prefix.ends_with(char::is_whitespace) {
        return None;
    }
    let function = caps.get(2)?.as_str().to_ascii_lowercase();
    if !ALLOWED_FUNCTIONS.contains(&function.as_str()) {
        return None;
    }
    Some(value.to_string())
}

/// Percent-encode characters that could close the quoted `url("...")` context.
fn encode_css_url(url: &str) -> String {
    let mut encoded = String::with_capacity(url.len());
    for ch in url.chars() {
        match ch {
            '\u{0}'..='\u{20}' | '\u{7f}' | '"' | '\'' | '<' | '>' | '\\' | '(' | ')' => {
                encoded.push_str(&format!("%{:02X}", ch as u32));
            }
            _ => encoded.push(ch),
        }
    }
    encoded
}

fn strip_comments(css: &str) -> String {
    let mut out = String::with_capacity(css.len());
    let mut rest = css;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        out.push(' ');
        match rest[start + 2..].find("*/") {
            Some(end) => rest = &rest[start + 2 + end + 2..],
            None => return out,
        }
    }
    out.push_str(rest);
    out
}

/// Split on `separator` outside quotes and parentheses.
fn split_top_level(text: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (index, ch) in text.char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(ch),
            (None, '(') => depth += 1,
            (None, ')') => depth = depth.saturating_sub(1),
            (None, c) if c == separator && depth == 0 => {
                parts.push(&text[start..index]);
                start = index + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

fn is_property_name(name: &str) -> bool {
    static NAME_REGEX: OnceLock<Option<Regex>> = OnceLock::new();
    let regex = NAME_REGEX.get_or_init(|| Regex::new(r"^-{0,2}[a-z_][a-z0-9_-]*$").ok());
    regex.as_ref().is_some_and(|r| r.is_match(name))
}

fn strip_priority(value: &str) -> &str {
    static PRIORITY_REGEX: OnceLock<Option<Regex>> = OnceLock::new();
    let regex = PRIORITY_REGEX.get_or_init(|| Regex::new(r"(?i)\s*!\s*important\s*$").ok());
    match regex.as_ref().and_then(|r| r.find(value)) {
        Some(m) => value[..m.start()].trim_end(),
        None => value,
    }
}

/// Reject values a single declaration could not legitimately contain.
fn is_well_formed_value(value: &str) -> bool {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    for ch in value.chars() {
        if ch.is_control() && !ch.is_whitespace() {
            return false;
        }
        match (quote, ch) {
            (_, '\\' | '{' | '}' | '<' | '>') => return false,
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, ';' | '!') => return false,
            (None, '"' | '\'') => quote = Some(ch),
            (None, '(') => depth += 1,
            (None, ')') => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    quote.is_none() && depth == 0
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn allow_https(url: &str, _property: &str) -> Option<String> {
        url.starts_with("https://").then(|| url.to_string())
    }

    #[test]
    fn test_parse_basic_declarations() {
        let decl = StyleDeclaration::parse("color: red; background-color: blue");
        assert_eq!(decl.len(), 2);
        assert_eq!(decl.property_value("color"), Some("red"));
        assert_eq!(decl.property_value("background-color"), Some("blue"));
    }

    #[test]
    fn test_parse_last_declaration_wins() {
        let decl = StyleDeclaration::parse("color: red; width: 1px; color: blue");
        assert_eq!(decl.css_text(), "width: 1px; color: blue;");
    }

    #[test]
    fn test_parse_respects_quotes_and_parens() {
        let decl = StyleDeclaration::parse(r#"font-family: "a;b"; background: url("x;y")"#);
        assert_eq!(decl.property_value("font-family"), Some("\"a;b\""));
        assert_eq!(decl.property_value("background"), Some("url(\"x;y\")"));
    }

    #[test]
    fn test_parse_allows_punctuation_inside_quotes() {
        let decl = StyleDeclaration::parse(r#"content: "wow!"; font-family: 'x;y', serif"#);
        assert_eq!(decl.property_value("content"), Some("\"wow!\""));
        assert_eq!(decl.property_value("font-family"), Some("'x;y', serif"));

        let bare = StyleDeclaration::parse("color: red !ie; width: 1px");
        assert_eq!(bare.property_value("color"), None);
        assert_eq!(bare.property_value("width"), Some("1px"));
    }

    #[test]
    fn test_parse_rejects_escapes_and_braces() {
        let decl = StyleDeclaration::parse(r"background: \75 rl(x); color: red} a{color: blue");
        assert_eq!(decl.property_value("background"), None);
        assert!(decl.property_value("color").is_none());
    }

    #[test]
    fn test_parse_strips_comments() {
        let decl = StyleDeclaration::parse("col/**/or: red; width: /* x */ 1px");
        assert_eq!(decl.property_value("color"), None);
        assert_eq!(decl.property_value("width"), Some("1px"));
    }

    #[test]
    fn test_parse_unterminated_comment_drops_rest() {
        let decl = StyleDeclaration::parse("width: 1px; /* color: red");
        assert_eq!(decl.css_text(), "width: 1px;");
    }

    #[test]
    fn test_sanitize_keeps_plain_values() {
        let decl = StyleDeclaration::parse("color:   red ; margin: 0   auto");
        assert_eq!(sanitize_style(&decl, None), "color: red; margin: 0 auto;");
    }

    #[test]
    fn test_sanitize_rejects_custom_properties() {
        let decl = StyleDeclaration::parse("--main: red; color: var(--main)");
        assert_eq!(sanitize_style(&decl, None), "");
    }

    #[test]
    fn test_sanitize_strips_vendor_prefix() {
        let decl = StyleDeclaration::parse("-webkit-border-radius: 4px; -moz-binding: none");
        assert_eq!(sanitize_style(&decl, None), "border-radius: 4px;");
    }

    #[test]
    fn test_sanitize_rejects_unlisted_properties() {
        let decl = StyleDeclaration::parse("behavior: url(x.htc); position: fixed; color: red");
        assert_eq!(sanitize_style(&decl, None), "color: red;");
    }

    #[test]
    fn test_sanitize_url_without_policy_is_rejected() {
        let decl = StyleDeclaration::parse("background-image: url(https://example.com/a.png)");
        assert_eq!(sanitize_style(&decl, None), "");
    }

    #[test]
    fn test_sanitize_url_with_policy() {
        let decl = StyleDeclaration::parse("background-image: url('https://example.com/a b.png')");
        assert_eq!(
            sanitize_style(&decl, Some(&allow_https)),
            "background-image: url(\"https://example.com/a%20b.png\");"
        );
    }

    #[test]
    fn test_sanitize_url_policy_sees_property() {
        let seen = std::cell::RefCell::new(Vec::new());
        let policy = |url: &str, property: &str| {
            seen.borrow_mut().push(property.to_string());
            Some(url.to_string())
        };
        let decl = StyleDeclaration::parse("background: url(a.png)");
        assert_eq!(
            sanitize_style(&decl, Some(&policy)),
            "background: url(\"a.png\");"
        );
        assert_eq!(seen.borrow().as_slice(), ["background"]);
    }

    #[test]
    fn test_sanitize_url_policy_rejection() {
        let decl = StyleDeclaration::parse("background-image: url(http://evil.example/)");
        assert_eq!(sanitize_style(&decl, Some(&allow_https)), "");
    }

    #[test]
    fn test_sanitize_url_mixed_with_other_tokens_is_rejected() {
        let decl = StyleDeclaration::parse("background: url(https://a.example/x.png) no-repeat");
        assert_eq!(sanitize_style(&decl, Some(&allow_https)), "");
    }

    #[test]
    fn test_encode_css_url_escapes_context_breakers() {
        assert_eq!(encode_css_url("a\"b<c>d\\e"), "a%22b%3Cc%3Ed%5Ce");
        assert_eq!(encode_css_url("x\ny"), "x%0Ay");
    }

    #[test]
    fn test_sanitize_function_whitelist() {
        let decl = StyleDeclaration::parse(
            "color: RGB(1, 2, 3); width: calc(1px + 2px); background: expression(alert(1))",
        );
        assert_eq!(sanitize_style(&decl, None), "color: RGB(1, 2, 3);");
    }

    #[test]
    fn test_sanitize_nested_functions_rejected() {
        let decl = StyleDeclaration::parse(
            "background-image: linear-gradient(rgb(1,2,3), red); color: rgba(0,0,0,0.5)",
        );
        assert_eq!(sanitize_style(&decl, None), "color: rgba(0,0,0,0.5);");
    }

    #[test]
    fn test_sanitize_function_with_surrounding_tokens() {
        let decl = StyleDeclaration::parse("border: 1px solid rgb(0,0,0)");
        assert_eq!(sanitize_style(&decl, None), "border: 1px solid rgb(0,0,0);");
    }

    #[test]
    fn test_sanitize_drops_priority() {
        let decl = StyleDeclaration::parse("color: red !important");
        assert_eq!(sanitize_style(&decl, None), "color: red;");
    }

    #[test]
    fn test_strip_vendor_prefix_leaves_custom_alone() {
        assert_eq!(strip_vendor_prefix("--x"), "--x");
        assert_eq!(strip_vendor_prefix("-ms-filter"), "filter");
    }

    proptest! {
        /// Sanitized CSS text parses back to the same declarations
        #[test]
        fn prop_sanitized_css_is_stable(
            property in prop::sample::select(vec!["color", "width", "margin", "-webkit-transform", "font-family"]),
            value in "[a-z0-9 #.,%]{1,20}",
        ) {
            let input = format!("{property}: {value}");
            let first = sanitize_style(&StyleDeclaration::parse(&input), None);
            let second = sanitize_style(&StyleDeclaration::parse(&first), None);
            prop_assert_eq!(first, second);
        }

        /// No declaration is ever emitted under a vendor-prefixed name
        #[test]
        fn prop_no_vendor_prefixed_output(
            prefix in prop::sample::select(vec!["-webkit-", "-moz-", "-ms-", "-o-"]),
            property in prop::sample::select(vec!["transform", "border-radius", "box-shadow"]),
        ) {
            let decl = StyleDeclaration::parse(&format!("{prefix}{property}: none"));
            let css = sanitize_style(&decl, None);
            prop_assert!(!css.contains(prefix), "vendor prefix leaked: {}", css);
        }
    }
}
