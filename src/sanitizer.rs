//! The built sanitizer
//!
//! An [`HtmlSanitizer`] is an immutable configuration: tag tables, the
//! attribute policy registry, caller policies and flags. It holds no
//! per-call state, so one instance can be shared freely across threads.

use std::sync::Arc;
use tracing::trace;

use crate::attributes::{AttributePolicy, AttributeRegistry};
use crate::css::{StyleDeclaration, sanitize_style};
use crate::error::SanitizerError;
use crate::parser::{Html5everParser, InertParser, parse_bytes};
use crate::policy::{
    Policy, PolicyContext, PolicyHints, allowed_value, sanitize_token_list, sanitize_url,
    sanitize_url_fragment, trim_value, validate_token,
};
use crate::rewriter::rewrite;
use crate::tags::TagTable;
use crate::tree::{CleanNode, SafeHtml, SourceDocument};

/// Caller policies installed through the builder.
///
/// Each is layered under a built-in validator; none can widen what the
/// engine accepts.
#[derive(Debug, Clone, Default)]
pub(crate) struct CustomPolicies {
    pub(crate) url: Option<Policy>,
    pub(crate) network_url: Option<Policy>,
    pub(crate) name: Option<Policy>,
    pub(crate) token: Option<Policy>,
}

/// An immutable, thread-safe sanitizer configuration.
///
/// Build one with [`crate::Builder`], or use [`HtmlSanitizer::default`] for
/// the default policy.
///
/// # Examples
///
/// ```
/// use markup_guard::HtmlSanitizer;
///
/// let sanitizer = HtmlSanitizer::default();
/// let html = sanitizer.sanitize("<p onclick=\"evil()\">Hi<script>alert(1)</script></p>");
/// assert_eq!(html.as_str(), "<p>Hi</p>");
/// ```
#[derive(Debug, Clone)]
pub struct HtmlSanitizer {
    pub(crate) tags: TagTable,
    pub(crate) attributes: AttributeRegistry,
    pub(crate) custom: CustomPolicies,
    pub(crate) allow_css_styles: bool,
    pub(crate) add_original_tag_names: bool,
    pub(crate) sanitize_template_contents: bool,
    pub(crate) parser: Arc<dyn InertParser>,
}

impl Default for HtmlSanitizer {
    fn default() -> Self {
        Self {
            tags: TagTable::new(),
            attributes: AttributeRegistry::new(),
            custom: CustomPolicies::default(),
            allow_css_styles: false,
            add_original_tag_names: false,
            sanitize_template_contents: true,
            parser: Arc::new(Html5everParser),
        }
    }
}

impl HtmlSanitizer {
    /// Sanitize markup and serialize the result.
    ///
    /// Never fails: anything the configuration does not allow is left out.
    pub fn sanitize(&self, markup: &str) -> SafeHtml {
        SafeHtml::from_sanitized(self.sanitize_to_tree(markup).inner_html())
    }

    /// Sanitize markup and return the clean tree.
    ///
    /// The returned node is a `span` wrapping the sanitized top-level nodes.
    pub fn sanitize_to_tree(&self, markup: &str) -> CleanNode {
        let document = self.parser.parse(markup);
        self.sanitize_document(&document)
    }

    /// Sanitize an already parsed document.
    pub fn sanitize_document(&self, document: &SourceDocument) -> CleanNode {
        rewrite(self, document)
    }

    /// Decode raw bytes, then sanitize.
    ///
    /// The encoding comes from the Content-Type header if given, then from a
    /// `<meta>` declaration, and defaults to UTF-8.
    ///
    /// # Errors
    ///
    /// - `SanitizerError::InvalidInput` if `html` is empty
    /// - `SanitizerError::EncodingError` if the bytes do not decode
    pub fn sanitize_bytes(
        &self,
        html: &[u8],
        content_type: Option<&str>,
    ) -> Result<SafeHtml, SanitizerError> {
        let document = parse_bytes(html, content_type, self.parser.as_ref())?;
        Ok(SafeHtml::from_sanitized(
            self.sanitize_document(&document).inner_html(),
        ))
    }

    /// The configured tag tables
    pub fn tag_table(&self) -> &TagTable {
        &self.tags
    }

    /// The configured attribute registry
    pub fn attribute_registry(&self) -> &AttributeRegistry {
        &self.attributes
    }

    /// Whether `style` attributes are sanitized rather than dropped
    pub fn allows_css_styles(&self) -> bool {
        self.allow_css_styles
    }

    /// Run the registry policy for one attribute.
    ///
    /// `tag_name` is the output tag name; `attribute` is lowercase. Returns
    /// `None` when the attribute must be dropped. Values taken from a clean
    /// tree come back unchanged.
    ///
    /// # Examples
    ///
    /// ```
    /// use markup_guard::HtmlSanitizer;
    ///
    /// let sanitizer = HtmlSanitizer::default();
    /// assert_eq!(sanitizer.sanitize_attribute("a", "href", " /docs "), Some("/docs".to_string()));
    /// assert_eq!(sanitizer.sanitize_attribute("a", "href", "javascript:x"), None);
    /// ```
    pub fn sanitize_attribute(
        &self,
        tag_name: &str,
        attribute: &str,
        value: &str,
    ) -> Option<String> {
        let Some(policy) = self.attributes.resolve(tag_name, attribute) else {
            trace!(tag = tag_name, attribute, "dropping attribute outside whitelist");
            return None;
        };

        let hints = PolicyHints::new(tag_name, attribute);
        let result = self.evaluate(policy, value, &hints);
        if result.is_none() {
            trace!(tag = tag_name, attribute, "rejecting attribute value");
        }
        result
    }

    fn evaluate(
        &self,
        policy: &AttributePolicy,
        value: &str,
        hints: &PolicyHints<'_>,
    ) -> Option<String> {
        match policy {
            AttributePolicy::Generic => trim_value(value),
            AttributePolicy::Url => self.apply_url(value, hints),
            AttributePolicy::NetworkUrl => self.apply_network_url(value, hints),
            AttributePolicy::UrlFragment => sanitize_url_fragment(value),
            AttributePolicy::Name => self.apply_name(value, hints),
            AttributePolicy::ClassTokens => {
                sanitize_token_list(value, |token| self.apply_token(token, hints))
            }
            AttributePolicy::IdToken => self.apply_token(value, hints),
            AttributePolicy::AllowedValues(allowed) => allowed_value(value, allowed),
            AttributePolicy::Style => self.apply_style(value, hints),
            AttributePolicy::Narrowed { custom, base } => {
                let narrowed = if matches!(**base, AttributePolicy::Style) {
                    let declaration = StyleDeclaration::parse(value);
                    custom.apply(value, hints, &PolicyContext::with_style(&declaration))?
                } else {
                    custom.apply(value, hints, &PolicyContext::default())?
                };
                self.evaluate(base, &narrowed, hints)
            }
            AttributePolicy::Unchecked(policy) => {
                policy.apply(value, hints, &PolicyContext::default())
            }
        }
    }

    fn apply_url(&self, value: &str, hints: &PolicyHints<'_>) -> Option<String> {
        match &self.custom.url {
            Some(custom) => {
                let narrowed = custom.apply(value, hints, &PolicyContext::default())?;
                sanitize_url(&narrowed)
            }
            None => sanitize_url(value),
        }
    }

    /// URLs that trigger a fetch are rejected unless the caller decided how
    /// to handle them.
    fn apply_network_url(&self, value: &str, hints: &PolicyHints<'_>) -> Option<String> {
        let custom = self.custom.network_url.as_ref()?;
        let narrowed = custom.apply(value, hints, &PolicyContext::default())?;
        sanitize_url(&narrowed)
    }

    fn apply_name(&self, value: &str, hints: &PolicyHints<'_>) -> Option<String> {
        let custom = self.custom.name.as_ref()?;
        let narrowed = custom.apply(value, hints, &PolicyContext::default())?;
        validate_token(&narrowed)
    }

    fn apply_token(&self, value: &str, hints: &PolicyHints<'_>) -> Option<String> {
        let custom = self.custom.token.as_ref()?;
        let narrowed = custom.apply(value, hints, &PolicyContext::default())?;
        validate_token(&narrowed)
    }

    fn apply_style(&self, value: &str, hints: &PolicyHints<'_>) -> Option<String> {
        if !self.allow_css_styles {
            return None;
        }

        let declaration = StyleDeclaration::parse(value);
        let url_policy: &dyn Fn(&str, &str) -> Option<String> = &|url, property| {
            self.apply_network_url(url, &hints.with_css_property(property))
        };
        let clean = sanitize_style(&declaration, Some(url_policy));
        (!clean.is_empty()).then_some(clean)
    }
}
