//! Character encoding detection and decoding of raw input bytes
//!
//! Bytes handed to [`crate::HtmlSanitizer::sanitize_bytes`] are decoded to
//! UTF-8 before parsing. The encoding is resolved with a three-level cascade:
//!
//! 1. The `charset` parameter of a Content-Type header, if one is supplied
//! 2. A `<meta charset>` or `<meta http-equiv="Content-Type">` declaration in
//!    the first 1024 bytes
//! 3. UTF-8
//!
//! A byte order mark overrides all three.
//!
//! # Examples
//!
//! ```rust
//! use markup_guard::charset::{detect_encoding, CharsetSource};
//!
//! let (encoding, source) = detect_encoding(Some("text/html; charset=ISO-8859-1"), b"<p>x</p>");
//! assert_eq!(encoding.name(), "windows-1252");
//! assert_eq!(source, CharsetSource::ContentType);
//!
//! let (encoding, source) = detect_encoding(None, b"<p>no declaration</p>");
//! assert_eq!(encoding.name(), "UTF-8");
//! assert_eq!(source, CharsetSource::Default);
//! ```

use encoding_rs::{Encoding, UTF_8};
use regex::Regex;
use std::borrow::Cow;
use std::sync::OnceLock;
use tracing::debug;

use crate::error::SanitizerError;

/// Maximum bytes to scan for meta charset declarations
const META_SCAN_LIMIT: usize = 1024;

/// Where the encoding decision came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharsetSource {
    /// Byte order mark at the start of the input
    ByteOrderMark,
    /// `charset` parameter of the Content-Type header
    ContentType,
    /// `<meta>` declaration inside the markup
    MetaTag,
    /// Nothing declared
    Default,
}

/// Extract the `charset` parameter from a Content-Type header value.
///
/// # Examples
///
/// ```rust
/// use markup_guard::charset::charset_from_content_type;
///
/// assert_eq!(charset_from_content_type("text/html; charset=\"UTF-8\""), Some("UTF-8".to_string()));
/// assert_eq!(charset_from_content_type("text/html"), None);
/// ```
pub fn charset_from_content_type(content_type: &str) -> Option<String> {
    static CHARSET_PARAM: OnceLock<Option<Regex>> = OnceLock::new();
    let regex = CHARSET_PARAM
        .get_or_init(|| Regex::new(r#"(?i)charset\s*=\s*"?([^";,\s]+)"?"#).ok())
        .as_ref()?;

    regex
        .captures(content_type)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Extract a charset declared by a `<meta>` tag near the start of the markup.
///
/// Both the HTML5 `<meta charset>` form and the older `http-equiv` form are
/// recognized. Only the first 1024 bytes are scanned.
pub fn charset_from_meta(html: &[u8]) -> Option<String> {
    let prefix = &html[..html.len().min(META_SCAN_LIMIT)];
    let text = String::from_utf8_lossy(prefix);

    static META_CHARSET: OnceLock<Option<Regex>> = OnceLock::new();
    static META_HTTP_EQUIV: OnceLock<Option<Regex>> = OnceLock::new();

    let patterns = [
        META_CHARSET
            .get_or_init(|| Regex::new(r#"(?i)<meta\s+charset\s*=\s*["']?([^"';>\s/]+)"#).ok()),
        META_HTTP_EQUIV.get_or_init(|| {
            Regex::new(
                r#"(?i)<meta\s+http-equiv\s*=\s*["']?content-type["']?\s+content\s*=\s*["']?[^"'>]*charset\s*=\s*([^"';>\s]+)"#,
            )
            .ok()
        }),
    ];

    patterns
        .into_iter()
        .flatten()
        .find_map(|regex| regex.captures(&text)?.get(1).map(|m| m.as_str().to_string()))
}

/// Resolve the encoding of `html`.
///
/// Unknown labels are skipped so the cascade falls through to the next level
/// instead of failing outright.
pub fn detect_encoding(
    content_type: Option<&str>,
    html: &[u8],
) -> (&'static Encoding, CharsetSource) {
    if let Some((encoding, _)) = Encoding::for_bom(html) {
        return (encoding, CharsetSource::ByteOrderMark);
    }

    if let Some(label) = content_type.and_then(charset_from_content_type)
        && let Some(encoding) = Encoding::for_label(label.as_bytes())
    {
        return (encoding, CharsetSource::ContentType);
    }

    if let Some(label) = charset_from_meta(html)
        && let Some(encoding) = Encoding::for_label(label.as_bytes())
    {
        return (encoding, CharsetSource::MetaTag);
    }

    (UTF_8, CharsetSource::Default)
}

/// Decode `html` to UTF-8 using the detected encoding.
///
/// Malformed byte sequences are an error rather than being replaced, so a
/// mislabeled document is reported to the caller instead of being silently
/// altered.
///
/// # Errors
///
/// - `SanitizerError::InvalidInput` if `html` is empty
/// - `SanitizerError::EncodingError` if the bytes are invalid for the
///   detected encoding
pub fn decode_to_utf8<'a>(
    html: &'a [u8],
    content_type: Option<&str>,
) -> Result<Cow<'a, str>, SanitizerError> {
    if html.is_empty() {
        return Err(SanitizerError::InvalidInput(
            "HTML input is empty".to_string(),
        ));
    }

    let (encoding, source) = detect_encoding(content_type, html);
    debug!(encoding = encoding.name(), ?source, "decoding input bytes");

    let body = match source {
        CharsetSource::ByteOrderMark => {
            let (_, bom_length) = Encoding::for_bom(html).unwrap_or((encoding, 0));
            &html[bom_length..]
        }
        _ => html,
    };

    if encoding == UTF_8 {
        return std::str::from_utf8(body).map(Cow::Borrowed).map_err(|e| {
            SanitizerError::EncodingError(format!(
                "Invalid UTF-8 at byte position {}: {}",
                e.valid_up_to(),
                e
            ))
        });
    }

    encoding
        .decode_without_bom_handling_and_without_replacement(body)
        .ok_or_else(|| {
            SanitizerError::EncodingError(format!(
                "Invalid byte sequence for charset '{}'",
                encoding.name()
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // ============================================================================
    // Content-Type extraction
    // ============================================================================

    #[test]
    fn test_content_type_forms() {
        for (header, expected) in [
            ("text/html; charset=UTF-8", Some("UTF-8")),
            ("text/html;charset=utf-8", Some("utf-8")),
            ("text/html; charset=\"ISO-8859-1\"", Some("ISO-8859-1")),
            ("text/html; CHARSET=windows-1252; q=1", Some("windows-1252")),
            ("text/html", None),
            ("", None),
        ] {
            assert_eq!(
                charset_from_content_type(header).as_deref(),
                expected,
                "{header}"
            );
        }
    }

    // ============================================================================
    // Meta extraction
    // ============================================================================

    #[test]
    fn test_meta_charset_html5() {
        let html = b"<html><head><meta charset=\"Shift_JIS\"></head></html>";
        assert_eq!(charset_from_meta(html), Some("Shift_JIS".to_string()));
    }

    #[test]
    fn test_meta_charset_http_equiv() {
        let html =
            b"<meta http-equiv=\"Content-Type\" content=\"text/html; charset=ISO-8859-1\">";
        assert_eq!(charset_from_meta(html), Some("ISO-8859-1".to_string()));
    }

    #[test]
    fn test_meta_beyond_scan_limit_is_ignored() {
        let mut html = vec![b' '; META_SCAN_LIMIT];
        html.extend_from_slice(b"<meta charset=\"ISO-8859-1\">");
        assert_eq!(charset_from_meta(&html), None);
    }

    // ============================================================================
    // Cascade
    // ============================================================================

    #[test]
    fn test_content_type_beats_meta() {
        let html = b"<meta charset=\"ISO-8859-1\"><p>x</p>";
        let (encoding, source) = detect_encoding(Some("text/html; charset=UTF-8"), html);
        assert_eq!(encoding, UTF_8);
        assert_eq!(source, CharsetSource::ContentType);
    }

    #[test]
    fn test_unknown_label_falls_through() {
        let html = b"<meta charset=\"ISO-8859-1\"><p>x</p>";
        let (encoding, source) =
            detect_encoding(Some("text/html; charset=x-unknown-test"), html);
        assert_eq!(encoding.name(), "windows-1252");
        assert_eq!(source, CharsetSource::MetaTag);
    }

    #[test]
    fn test_bom_overrides_everything() {
        let html = b"\xEF\xBB\xBF<p>x</p>";
        let (encoding, source) = detect_encoding(Some("text/html; charset=ISO-8859-1"), html);
        assert_eq!(encoding, UTF_8);
        assert_eq!(source, CharsetSource::ByteOrderMark);
    }

    // ============================================================================
    // Decoding
    // ============================================================================

    #[test]
    fn test_decode_utf8_borrows() {
        let decoded = decode_to_utf8(b"<p>ok</p>", None).expect("valid UTF-8");
        assert!(matches!(decoded, Cow::Borrowed(_)));
    }

    #[test]
    fn test_decode_strips_bom() {
        let decoded = decode_to_utf8(b"\xEF\xBB\xBF<p>ok</p>", None).expect("valid UTF-8");
        assert_eq!(decoded, "<p>ok</p>");
    }

    #[test]
    fn test_decode_latin1_transcodes() {
        let decoded = decode_to_utf8(b"<p>Caf\xE9</p>", Some("text/html; charset=ISO-8859-1"))
            .expect("latin-1 input");
        assert_eq!(decoded, "<p>Café</p>");
    }

    #[test]
    fn test_decode_windows_1252_from_meta() {
        let html = b"<meta charset=\"windows-1252\"><p>\x80 10</p>";
        let decoded = decode_to_utf8(html, None).expect("windows-1252 input");
        assert!(decoded.contains('€'));
    }

    #[test]
    fn test_decode_invalid_utf8_is_error() {
        let result = decode_to_utf8(b"<p>\xFF\xFE</p>", None);
        assert!(matches!(result, Err(SanitizerError::EncodingError(_))));
    }

    #[test]
    fn test_decode_empty_is_invalid_input() {
        assert!(matches!(
            decode_to_utf8(b"", None),
            Err(SanitizerError::InvalidInput(_))
        ));
    }

    proptest! {
        /// Valid UTF-8 without declarations decodes to itself
        #[test]
        fn prop_utf8_roundtrip(text in "[^\u{feff}]{1,200}") {
            let decoded = decode_to_utf8(text.as_bytes(), None);
            prop_assert!(decoded.is_ok());
            if let Ok(decoded) = decoded {
                prop_assert_eq!(decoded.as_ref(), text.as_str());
            }
        }
    }
}
