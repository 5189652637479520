//! Sanitizer configuration
//!
//! [`Builder`] starts from the default policy and can only make it stricter:
//! tags and attributes can be narrowed to a subset of what is already
//! whitelisted, and caller policies are layered under the built-in
//! validators. Widening is only possible through the [`unchecked`] module,
//! which requires a written [`unchecked::Justification`].
//!
//! Builder calls never panic. The first misuse is recorded and returned by
//! [`Builder::build`].
//!
//! # Examples
//!
//! ```
//! use markup_guard::{AttributeSpec, Builder};
//!
//! let sanitizer = Builder::new()
//!     .only_allow_tags(&["p", "a"])
//!     .only_allow_attributes([AttributeSpec::on_tag("a", "href")])
//!     .build()
//!     .expect("valid configuration");
//!
//! let html = sanitizer.sanitize("<p><a href=\"/x\" title=\"t\">x</a><b>y</b></p>");
//! assert_eq!(html.as_str(), "<p><a href=\"/x\">x</a><span>y</span></p>");
//! ```

use std::mem;
use std::sync::Arc;
use tracing::debug;

use crate::attributes::{AttributeKey, AttributePolicy, AttributeRegistry};
use crate::error::SanitizerError;
use crate::parser::{Html5everParser, InertParser};
use crate::policy::{INTERNAL_ATTRIBUTE_PREFIX, Policy, PolicyContext, PolicyHints};
use crate::sanitizer::{CustomPolicies, HtmlSanitizer};
use crate::tags::TagTable;

/// One attribute named for narrowing or unchecked extension.
///
/// The tag defaults to `*` (any tag). An optional policy is applied before
/// the registry's own policy for the attribute.
#[derive(Debug, Clone)]
pub struct AttributeSpec {
    tag: String,
    attribute: String,
    policy: Option<Policy>,
}

impl AttributeSpec {
    /// `attribute` on any tag.
    pub fn new(attribute: &str) -> Self {
        Self::on_tag("*", attribute)
    }

    /// `attribute` on `tag` only.
    pub fn on_tag(tag: &str, attribute: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attribute: attribute.to_ascii_lowercase(),
            policy: None,
        }
    }

    /// Apply `policy` to the value before the registry policy.
    pub fn with_policy<F>(mut self, policy: F) -> Self
    where
        F: Fn(&str, &PolicyHints<'_>, &PolicyContext<'_>) -> Option<String> + Send + Sync + 'static,
    {
        self.policy = Some(Policy::new(policy));
        self
    }

    fn key(&self) -> AttributeKey {
        AttributeKey::on_tag(&self.tag, &self.attribute)
    }
}

impl From<&str> for AttributeSpec {
    fn from(attribute: &str) -> Self {
        AttributeSpec::new(attribute)
    }
}

impl From<(&str, &str)> for AttributeSpec {
    fn from((tag, attribute): (&str, &str)) -> Self {
        AttributeSpec::on_tag(tag, attribute)
    }
}

/// Plain-data sanitizer options
///
/// Mirrors the builder for callers that load configuration from elsewhere.
#[derive(Debug, Clone)]
pub struct SanitizerOptions {
    /// Keep `<form>` elements
    pub allow_form_tag: bool,
    /// Sanitize `style` attributes instead of dropping them
    pub allow_css_styles: bool,
    /// Record the original name of converted unknown tags
    pub add_original_tag_names: bool,
    /// Sanitize the contents of allowed template-like elements
    pub sanitize_template_contents: bool,
    /// Narrow the tag whitelist to these tags
    pub allowed_tags: Option<Vec<String>>,
    /// Narrow the attribute registry to these attributes (any tag)
    pub allowed_attributes: Option<Vec<String>>,
    /// Extra `data-*` attributes to allow
    pub data_attributes: Vec<String>,
}

impl Default for SanitizerOptions {
    fn default() -> Self {
        Self {
            allow_form_tag: false,
            allow_css_styles: false,
            add_original_tag_names: false,
            sanitize_template_contents: true,
            allowed_tags: None,
            allowed_attributes: None,
            data_attributes: Vec::new(),
        }
    }
}

/// Builds an [`HtmlSanitizer`].
pub struct Builder {
    tags: TagTable,
    attributes: AttributeRegistry,
    custom: CustomPolicies,
    allow_css_styles: bool,
    add_original_tag_names: bool,
    sanitize_template_contents: bool,
    parser: Arc<dyn InertParser>,
    error: Option<SanitizerError>,
    built: bool,
}

impl Builder {
    /// Builder holding the default policy.
    pub fn new() -> Self {
        Self {
            tags: TagTable::new(),
            attributes: AttributeRegistry::new(),
            custom: CustomPolicies::default(),
            allow_css_styles: false,
            add_original_tag_names: false,
            sanitize_template_contents: true,
            parser: Arc::new(Html5everParser),
            error: None,
            built: false,
        }
    }

    /// Builder configured from `options`.
    ///
    /// Invalid options are reported by [`Builder::build`].
    pub fn from_options(options: &SanitizerOptions) -> Self {
        let mut builder = Self::new();
        if options.allow_form_tag {
            builder.allow_form_tag();
        }
        if options.allow_css_styles {
            builder.allow_css_styles();
        }
        if options.add_original_tag_names {
            builder.add_original_tag_names();
        }
        if !options.sanitize_template_contents {
            builder.skip_template_contents();
        }
        if !options.data_attributes.is_empty() {
            let names: Vec<&str> = options.data_attributes.iter().map(String::as_str).collect();
            builder.allow_data_attributes(&names);
        }
        if let Some(tags) = &options.allowed_tags {
            let tags: Vec<&str> = tags.iter().map(String::as_str).collect();
            builder.only_allow_tags(&tags);
        }
        if let Some(attributes) = &options.allowed_attributes {
            builder.only_allow_attributes(attributes.iter().map(|a| AttributeSpec::new(a)));
        }
        builder
    }

    /// Keep `<form>` elements.
    pub fn allow_form_tag(&mut self) -> &mut Self {
        if self.usable() {
            self.tags.allow_form();
        }
        self
    }

    /// Restrict kept tags to `tags`, which must all be whitelisted already.
    pub fn only_allow_tags(&mut self, tags: &[&str]) -> &mut Self {
        if !self.usable() {
            return self;
        }
        let tags: Vec<String> = tags.iter().map(|t| t.to_ascii_lowercase()).collect();
        let result = self
            .tags
            .narrow(&tags)
            .map_err(SanitizerError::TagNotWhitelisted);
        self.record(result)
    }

    /// Restrict kept attributes to `specs`.
    ///
    /// Every spec must be granted by an existing exact or wildcard entry. A
    /// spec's policy runs before the registry policy it narrows.
    pub fn only_allow_attributes<I>(&mut self, specs: I) -> &mut Self
    where
        I: IntoIterator,
        I::Item: Into<AttributeSpec>,
    {
        if !self.usable() {
            return self;
        }

        let mut requests = Vec::new();
        for spec in specs.into_iter().map(Into::into) {
            if spec.attribute.starts_with(INTERNAL_ATTRIBUTE_PREFIX) {
                return self.record(Err(SanitizerError::ReservedAttribute(spec.attribute)));
            }
            let key = spec.key();
            requests.push((key, spec.policy));
        }

        let result = self.attributes.narrow(requests).map_err(|key| {
            SanitizerError::AttributeNotWhitelisted {
                tag: key.tag.to_string(),
                attribute: key.attribute,
            }
        });
        self.record(result)
    }

    /// Install a policy applied to non-network URLs before the built-in URL
    /// policy.
    pub fn with_custom_url_policy<F>(&mut self, policy: F) -> &mut Self
    where
        F: Fn(&str, &PolicyHints<'_>, &PolicyContext<'_>) -> Option<String> + Send + Sync + 'static,
    {
        if self.usable() {
            self.custom.url = Some(Policy::new(policy));
        }
        self
    }

    /// Install the policy for URLs that trigger a fetch (`src`, CSS `url()`).
    ///
    /// Without one, such URLs are always dropped.
    pub fn with_custom_network_request_url_policy<F>(&mut self, policy: F) -> &mut Self
    where
        F: Fn(&str, &PolicyHints<'_>, &PolicyContext<'_>) -> Option<String> + Send + Sync + 'static,
    {
        if self.usable() {
            self.custom.network_url = Some(Policy::new(policy));
        }
        self
    }

    /// Install the policy for `name`, `for` and `headers`.
    pub fn with_custom_name_policy<F>(&mut self, policy: F) -> &mut Self
    where
        F: Fn(&str, &PolicyHints<'_>, &PolicyContext<'_>) -> Option<String> + Send + Sync + 'static,
    {
        if self.usable() {
            self.custom.name = Some(Policy::new(policy));
        }
        self
    }

    /// Install the policy for `id` and each `class` token.
    pub fn with_custom_token_policy<F>(&mut self, policy: F) -> &mut Self
    where
        F: Fn(&str, &PolicyHints<'_>, &PolicyContext<'_>) -> Option<String> + Send + Sync + 'static,
    {
        if self.usable() {
            self.custom.token = Some(Policy::new(policy));
        }
        self
    }

    /// Sanitize `style` attributes instead of dropping them.
    pub fn allow_css_styles(&mut self) -> &mut Self {
        if self.usable() {
            self.allow_css_styles = true;
        }
        self
    }

    /// Mark converted unknown tags with their original name.
    pub fn add_original_tag_names(&mut self) -> &mut Self {
        if self.usable() {
            self.add_original_tag_names = true;
        }
        self
    }

    /// Allow the given `data-*` attributes on every tag.
    pub fn allow_data_attributes(&mut self, names: &[&str]) -> &mut Self {
        if !self.usable() {
            return self;
        }
        for name in names {
            let name = name.to_ascii_lowercase();
            if name.starts_with(INTERNAL_ATTRIBUTE_PREFIX) {
                return self.record(Err(SanitizerError::ReservedAttribute(name)));
            }
            if !name.starts_with("data-") || name.len() == "data-".len() {
                return self.record(Err(SanitizerError::InvalidDataAttribute(name)));
            }
            self.attributes
                .insert(AttributeKey::any_tag(&name), AttributePolicy::Generic);
        }
        self
    }

    /// Use `parser` for input and for deferred content.
    pub fn with_parser<P>(&mut self, parser: P) -> &mut Self
    where
        P: InertParser + 'static,
    {
        if self.usable() {
            self.parser = Arc::new(parser);
        }
        self
    }

    /// Empty allowed template-like elements instead of sanitizing their
    /// contents.
    pub fn skip_template_contents(&mut self) -> &mut Self {
        if self.usable() {
            self.sanitize_template_contents = false;
        }
        self
    }

    /// Finish configuration.
    ///
    /// # Errors
    ///
    /// Returns the first error recorded by an earlier call, or
    /// `SanitizerError::AlreadyBuilt` if the builder was already consumed.
    pub fn build(&mut self) -> Result<HtmlSanitizer, SanitizerError> {
        if self.built {
            return Err(SanitizerError::AlreadyBuilt);
        }
        self.built = true;
        if let Some(error) = self.error.take() {
            return Err(error);
        }

        Ok(HtmlSanitizer {
            tags: mem::take(&mut self.tags),
            attributes: mem::take(&mut self.attributes),
            custom: mem::take(&mut self.custom),
            allow_css_styles: self.allow_css_styles,
            add_original_tag_names: self.add_original_tag_names,
            sanitize_template_contents: self.sanitize_template_contents,
            parser: Arc::clone(&self.parser),
        })
    }

    /// Returns false, recording the misuse, once the builder has been built.
    fn usable(&mut self) -> bool {
        if self.built {
            self.record(Err(SanitizerError::AlreadyBuilt));
            return false;
        }
        true
    }

    fn record(&mut self, result: Result<(), SanitizerError>) -> &mut Self {
        if let Err(error) = result {
            debug!(code = error.code(), %error, "sanitizer configuration error");
            self.error.get_or_insert(error);
        }
        self
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

/// Widening the default policy.
///
/// Everything here can let dangerous markup through. Each call takes a
/// [`Justification`] so the reason is written down next to the call site.
pub mod unchecked {
    use super::*;

    /// Why an unchecked extension is safe for this caller.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Justification(String);

    impl Justification {
        /// Record a justification. Blank text is rejected at use.
        pub fn new(reason: impl Into<String>) -> Self {
            Self(reason.into())
        }

        /// The justification text
        pub fn as_str(&self) -> &str {
            &self.0
        }

        fn is_blank(&self) -> bool {
            self.0.trim().is_empty()
        }
    }

    /// Whitelist `tags`, taking them off the blacklist if needed.
    ///
    /// Allowing `template` also enables sanitization of its contents.
    pub fn also_allow_tags<'b>(
        justification: &Justification,
        builder: &'b mut Builder,
        tags: &[&str],
    ) -> &'b mut Builder {
        if !builder.usable() {
            return builder;
        }
        if justification.is_blank() {
            return builder.record(Err(SanitizerError::MissingJustification));
        }

        let tags: Vec<String> = tags.iter().map(|t| t.to_ascii_lowercase()).collect();
        debug!(?tags, justification = justification.as_str(), "widening tag whitelist");
        builder.tags.widen(&tags);
        builder
    }

    /// Add attribute entries that no default entry grants.
    ///
    /// A spec without a policy gets generic cleanup. Its policy is otherwise
    /// used as-is with no built-in validation after it. `style` and the
    /// reserved `data-sanitizer-` prefix cannot be added this way.
    pub fn also_allow_attributes<'b, I>(
        justification: &Justification,
        builder: &'b mut Builder,
        specs: I,
    ) -> &'b mut Builder
    where
        I: IntoIterator,
        I::Item: Into<AttributeSpec>,
    {
        if !builder.usable() {
            return builder;
        }
        if justification.is_blank() {
            return builder.record(Err(SanitizerError::MissingJustification));
        }

        for spec in specs.into_iter().map(Into::into) {
            if spec.attribute.starts_with(INTERNAL_ATTRIBUTE_PREFIX) {
                return builder.record(Err(SanitizerError::ReservedAttribute(spec.attribute)));
            }
            if spec.attribute == "style" {
                return builder.record(Err(SanitizerError::StyleRequiresCssOption));
            }
            debug!(
                tag = %spec.tag,
                attribute = %spec.attribute,
                justification = justification.as_str(),
                "widening attribute whitelist"
            );
            let key = spec.key();
            let policy = match spec.policy {
                Some(policy) => AttributePolicy::Unchecked(policy),
                None => AttributePolicy::Generic,
            };
            builder.attributes.insert(key, policy);
        }
        builder
    }
}

#[cfg(test)]
mod tests {
    use super::unchecked::{Justification, also_allow_attributes, also_allow_tags};
    use super::*;

    #[test]
    fn test_default_build_succeeds() {
        let sanitizer = Builder::new().build().expect("default configuration");
        assert_eq!(sanitizer.sanitize("<b>x</b>").as_str(), "<b>x</b>");
    }

    #[test]
    fn test_narrowing_to_non_whitelisted_tag_fails() {
        let result = Builder::new().only_allow_tags(&["p", "script"]).build();
        assert_eq!(
            result.err(),
            Some(SanitizerError::TagNotWhitelisted("script".to_string()))
        );
    }

    #[test]
    fn test_narrowing_to_unknown_attribute_fails() {
        let result = Builder::new()
            .only_allow_attributes(["title", "onclick"])
            .build();
        assert_eq!(
            result.err(),
            Some(SanitizerError::AttributeNotWhitelisted {
                tag: "*".to_string(),
                attribute: "onclick".to_string()
            })
        );
    }

    #[test]
    fn test_first_error_wins() {
        let result = Builder::new()
            .only_allow_tags(&["script"])
            .allow_data_attributes(&["onclick"])
            .build();
        assert_eq!(
            result.err(),
            Some(SanitizerError::TagNotWhitelisted("script".to_string()))
        );
    }

    #[test]
    fn test_build_twice_fails() {
        let mut builder = Builder::new();
        assert!(builder.build().is_ok());
        assert_eq!(builder.build().err(), Some(SanitizerError::AlreadyBuilt));
    }

    #[test]
    fn test_use_after_build_fails() {
        let mut builder = Builder::new();
        assert!(builder.build().is_ok());
        builder.allow_css_styles();
        assert_eq!(builder.build().err(), Some(SanitizerError::AlreadyBuilt));
    }

    #[test]
    fn test_data_attribute_validation() {
        let invalid = Builder::new().allow_data_attributes(&["title"]).build();
        assert_eq!(
            invalid.err(),
            Some(SanitizerError::InvalidDataAttribute("title".to_string()))
        );

        let reserved = Builder::new()
            .allow_data_attributes(&["data-sanitizer-original-tag"])
            .build();
        assert!(matches!(reserved, Err(SanitizerError::ReservedAttribute(_))));

        let bare = Builder::new().allow_data_attributes(&["data-"]).build();
        assert!(matches!(bare, Err(SanitizerError::InvalidDataAttribute(_))));
    }

    #[test]
    fn test_data_attributes_are_kept() {
        let sanitizer = Builder::new()
            .allow_data_attributes(&["data-id"])
            .build()
            .expect("valid configuration");
        assert_eq!(
            sanitizer.sanitize("<p data-id=\" 7 \" data-other=\"x\">x</p>").as_str(),
            "<p data-id=\"7\">x</p>"
        );
    }

    #[test]
    fn test_unchecked_requires_justification() {
        let mut builder = Builder::new();
        also_allow_tags(&Justification::new("  "), &mut builder, &["video"]);
        assert_eq!(builder.build().err(), Some(SanitizerError::MissingJustification));
    }

    #[test]
    fn test_unchecked_style_is_rejected() {
        let mut builder = Builder::new();
        also_allow_attributes(&Justification::new("needed"), &mut builder, ["style"]);
        assert_eq!(builder.build().err(), Some(SanitizerError::StyleRequiresCssOption));
    }

    #[test]
    fn test_unchecked_reserved_attribute_is_rejected() {
        let mut builder = Builder::new();
        also_allow_attributes(
            &Justification::new("needed"),
            &mut builder,
            ["data-sanitizer-original-tag"],
        );
        assert!(matches!(
            builder.build(),
            Err(SanitizerError::ReservedAttribute(_))
        ));
    }

    #[test]
    fn test_unchecked_attribute_policy_is_used_verbatim() {
        let mut builder = Builder::new();
        also_allow_attributes(
            &Justification::new("legacy widgets carry a static marker"),
            &mut builder,
            [AttributeSpec::on_tag("div", "data-widget")
                .with_policy(|value, _, _| Some(value.to_uppercase()))],
        );
        let sanitizer = builder.build().expect("valid configuration");
        assert_eq!(
            sanitizer.sanitize("<div data-widget=\"chart\">x</div>").as_str(),
            "<div data-widget=\"CHART\">x</div>"
        );
    }

    #[test]
    fn test_from_options() {
        let options = SanitizerOptions {
            allow_form_tag: true,
            allowed_attributes: Some(vec!["action".to_string()]),
            ..SanitizerOptions::default()
        };
        let sanitizer = Builder::from_options(&options)
            .build()
            .expect("valid options");
        assert_eq!(
            sanitizer
                .sanitize("<form action=\"/go\" method=\"post\">x</form>")
                .as_str(),
            "<form action=\"/go\">x</form>"
        );
    }

    #[test]
    fn test_from_options_reports_errors() {
        let options = SanitizerOptions {
            allowed_tags: Some(vec!["iframe".to_string()]),
            ..SanitizerOptions::default()
        };
        assert!(matches!(
            Builder::from_options(&options).build(),
            Err(SanitizerError::TagNotWhitelisted(_))
        ));
    }
}
