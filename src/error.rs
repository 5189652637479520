//! Error types for sanitizer configuration and input decoding

use std::fmt;

/// Errors raised while configuring a sanitizer or decoding raw input bytes.
///
/// Hostile markup never produces an error: rejected tags, attributes and
/// declarations are simply left out of the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SanitizerError {
    /// A tag was named for narrowing that the current whitelist does not contain
    TagNotWhitelisted(String),
    /// An attribute was named for narrowing that no registry entry grants
    AttributeNotWhitelisted {
        /// Tag scope of the request (`*` for any tag)
        tag: String,
        /// Attribute name
        attribute: String,
    },
    /// An unchecked extension was requested without a justification
    MissingJustification,
    /// A name passed to `allow_data_attributes` is not a `data-*` attribute
    InvalidDataAttribute(String),
    /// The attribute name collides with the sanitizer's own bookkeeping prefix
    ReservedAttribute(String),
    /// `style` must be enabled through `allow_css_styles`
    StyleRequiresCssOption,
    /// The builder was used after `build()`
    AlreadyBuilt,
    /// Invalid input data
    InvalidInput(String),
    /// Character encoding error
    EncodingError(String),
}

impl SanitizerError {
    /// Get numeric error code
    pub fn code(&self) -> u32 {
        match self {
            SanitizerError::TagNotWhitelisted(_) => 1,
            SanitizerError::AttributeNotWhitelisted { .. } => 2,
            SanitizerError::MissingJustification => 3,
            SanitizerError::InvalidDataAttribute(_) => 4,
            SanitizerError::ReservedAttribute(_) => 5,
            SanitizerError::StyleRequiresCssOption => 6,
            SanitizerError::AlreadyBuilt => 7,
            SanitizerError::InvalidInput(_) => 8,
            SanitizerError::EncodingError(_) => 9,
        }
    }

    /// Returns true for errors raised by builder misuse rather than input decoding.
    pub fn is_configuration_error(&self) -> bool {
        !matches!(
            self,
            SanitizerError::InvalidInput(_) | SanitizerError::EncodingError(_)
        )
    }
}

impl fmt::Display for SanitizerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SanitizerError::TagNotWhitelisted(tag) => {
                write!(f, "Tag '{}' is not whitelisted and cannot be allowed", tag)
            }
            SanitizerError::AttributeNotWhitelisted { tag, attribute } => write!(
                f,
                "Attribute '{}' on '{}' is not whitelisted and cannot be allowed",
                attribute, tag
            ),
            SanitizerError::MissingJustification => {
                write!(f, "Unchecked extensions require a non-empty justification")
            }
            SanitizerError::InvalidDataAttribute(name) => {
                write!(f, "Only data-* attributes can be allowed, got '{}'", name)
            }
            SanitizerError::ReservedAttribute(name) => {
                write!(f, "Attribute '{}' uses a reserved name", name)
            }
            SanitizerError::StyleRequiresCssOption => {
                write!(f, "The style attribute can only be enabled with allow_css_styles")
            }
            SanitizerError::AlreadyBuilt => write!(f, "Builder has already been built"),
            SanitizerError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            SanitizerError::EncodingError(msg) => write!(f, "Encoding error: {}", msg),
        }
    }
}

impl std::error::Error for SanitizerError {}
