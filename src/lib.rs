//! markup-guard - policy-driven HTML sanitizer
//!
//! Turns untrusted HTML into markup that is safe to insert into a page. Input
//! is parsed by an inert parser into a plain-data tree, rewritten into a
//! fresh tree under a whitelist policy, and serialized with html5ever.
//!
//! # Architecture
//!
//! The library is structured into several modules:
//! - `policy`: policy call signature and the built-in value policies
//! - `tags`: tag whitelist/blacklist and classification
//! - `attributes`: attribute policy registry
//! - `css`: inline style parsing and sanitization
//! - `tree`: source and clean document trees, serialization
//! - `charset`: encoding detection for raw input bytes
//! - `parser`: inert parsing with html5ever
//! - `rewriter`: the tree rewriter
//! - `builder`: configuration, including the `unchecked` escape hatch
//! - `sanitizer`: the built, shareable sanitizer
//!
//! # Policy model
//!
//! Configuration can only make the default policy stricter. Caller-supplied
//! policies run first and their output is re-validated by the built-in
//! policy for the attribute. Widening the policy requires the
//! [`unchecked`] functions and a written justification.
//!
//! # Examples
//!
//! ```
//! let html = markup_guard::sanitize("<a href=\"javascript:alert(1)\">x</a><img src=x onerror=alert(1)>");
//! assert_eq!(html.as_str(), "<a>x</a><img>");
//! ```

// Module declarations
pub mod attributes;
pub mod builder;
pub mod charset;
pub mod css;
pub mod error;
pub mod parser;
pub mod policy;
mod rewriter;
pub mod sanitizer;
pub mod tags;
pub mod tree;

use std::sync::OnceLock;

// Re-export main types for convenience
pub use builder::{AttributeSpec, Builder, SanitizerOptions, unchecked};
pub use error::SanitizerError;
pub use parser::{Html5everParser, InertParser};
pub use policy::{Policy, PolicyContext, PolicyHints};
pub use sanitizer::HtmlSanitizer;
pub use tree::{CleanElement, CleanNode, SafeHtml, SourceDocument, SourceElement, SourceNode};

/// Sanitize `markup` with the default policy.
pub fn sanitize(markup: &str) -> SafeHtml {
    static DEFAULT_SANITIZER: OnceLock<HtmlSanitizer> = OnceLock::new();
    DEFAULT_SANITIZER
        .get_or_init(HtmlSanitizer::default)
        .sanitize(markup)
}
