//! Configuration tests
//!
//! Covers narrowing, caller policy composition, the unchecked extension path
//! and the alternative entry points (trees, pre-parsed documents, raw bytes).

use markup_guard::unchecked::{Justification, also_allow_attributes, also_allow_tags};
use markup_guard::{
    AttributeSpec, Builder, HtmlSanitizer, InertParser, SanitizerError,
    SanitizerOptions, SourceDocument, SourceElement, SourceNode,
};

/// Test that narrowing tags turns removed tags into spans, not into text
#[test]
fn test_only_allow_tags_converts_the_rest() {
    let sanitizer = Builder::new()
        .only_allow_tags(&["p"])
        .build()
        .expect("valid configuration");

    assert_eq!(
        sanitizer.sanitize("<p><b>bold</b></p><script>x</script>").as_str(),
        "<p><span>bold</span></p>"
    );
}

/// Test that a narrowing policy runs before the built-in URL policy
#[test]
fn test_attribute_policy_narrows_url() {
    let sanitizer = Builder::new()
        .only_allow_attributes([AttributeSpec::on_tag("a", "href").with_policy(
            |value, hints, _| {
                assert_eq!(hints.tag_name, "a");
                assert_eq!(hints.attribute_name, "href");
                value.starts_with("https://").then(|| value.to_string())
            },
        )])
        .build()
        .expect("valid configuration");

    assert_eq!(
        sanitizer
            .sanitize(r#"<a href="https://example.com" title="x">a</a><a href="/local">b</a>"#)
            .as_str(),
        r#"<a href="https://example.com">a</a><a>b</a>"#
    );
}

/// Test that a narrowing policy cannot widen what the base policy accepts
#[test]
fn test_attribute_policy_cannot_widen() {
    let sanitizer = Builder::new()
        .only_allow_attributes([
            AttributeSpec::new("href").with_policy(|_, _, _| Some("javascript:alert(1)".to_string()))
        ])
        .build()
        .expect("valid configuration");

    assert_eq!(
        sanitizer.sanitize(r#"<a href="https://example.com">a</a>"#).as_str(),
        "<a>a</a>"
    );
}

/// Test that id and class need a token policy and are re-validated
#[test]
fn test_token_policy_for_id_and_class() {
    let sanitizer = Builder::new()
        .with_custom_token_policy(|token, _, _| Some(format!("user-{token}")))
        .build()
        .expect("valid configuration");

    assert_eq!(
        sanitizer
            .sanitize(r#"<p id="intro" class="a  b">x</p>"#)
            .as_str(),
        r#"<p id="user-intro" class="user-a user-b">x</p>"#
    );

    let widening = Builder::new()
        .with_custom_token_policy(|_, _, _| Some("two words".to_string()))
        .build()
        .expect("valid configuration");
    assert_eq!(widening.sanitize(r#"<p id="x">x</p>"#).as_str(), "<p>x</p>");
}

/// Test that the style narrowing policy receives the parsed declaration
#[test]
fn test_style_policy_sees_parsed_declaration() {
    let sanitizer = Builder::new()
        .allow_css_styles()
        .only_allow_attributes([AttributeSpec::new("style").with_policy(|_, _, ctx| {
            let style = ctx.css_style?;
            style.property_value("color").map(|color| format!("color: {color}"))
        })])
        .build()
        .expect("valid configuration");

    assert_eq!(
        sanitizer
            .sanitize(r#"<p style="margin: 0; COLOR: blue">x</p>"#)
            .as_str(),
        r#"<p style="color: blue;">x</p>"#
    );
}

/// Test that unchecked tag widening keeps a normally blacklisted tag
#[test]
fn test_unchecked_tag_widening() {
    let mut builder = Builder::new();
    also_allow_tags(
        &Justification::new("media is hosted on our own CDN"),
        &mut builder,
        &["video"],
    );
    let sanitizer = builder.build().expect("valid configuration");

    assert_eq!(
        sanitizer.sanitize("<video>fallback</video>").as_str(),
        "<video>fallback</video>"
    );
}

/// Test that unchecked attribute widening without a policy trims the value
#[test]
fn test_unchecked_attribute_without_policy() {
    let mut builder = Builder::new();
    also_allow_attributes(
        &Justification::new("microdata is rendered by a trusted template"),
        &mut builder,
        [("div", "itemprop")],
    );
    let sanitizer = builder.build().expect("valid configuration");

    assert_eq!(
        sanitizer
            .sanitize(r#"<div itemprop=" name ">x</div><p itemprop="name">y</p>"#)
            .as_str(),
        r#"<div itemprop="name">x</div><p>y</p>"#
    );
}

/// Test that options map onto the same configuration as the builder
#[test]
fn test_options_match_builder() {
    let options = SanitizerOptions {
        allow_css_styles: true,
        add_original_tag_names: true,
        allowed_tags: Some(vec!["p".to_string(), "span".to_string()]),
        data_attributes: vec!["data-x".to_string()],
        ..SanitizerOptions::default()
    };
    let from_options = Builder::from_options(&options)
        .build()
        .expect("valid options");
    let from_builder = Builder::new()
        .allow_css_styles()
        .add_original_tag_names()
        .allow_data_attributes(&["data-x"])
        .only_allow_tags(&["p", "span"])
        .build()
        .expect("valid configuration");

    let html = r#"<p style="color: red" data-x="1"><em>x</em></p>"#;
    assert_eq!(from_options.sanitize(html), from_builder.sanitize(html));
    assert_eq!(
        from_options.sanitize(html).as_str(),
        r#"<p style="color: red;" data-x="1"><span data-sanitizer-original-tag="em">x</span></p>"#
    );
}

/// Test that configuration errors carry distinct codes
#[test]
fn test_configuration_error_codes() {
    let err = Builder::new()
        .only_allow_attributes([("a", "onclick")])
        .build()
        .expect_err("onclick is never whitelisted");

    assert_eq!(err.code(), 2);
    assert!(err.is_configuration_error());
    assert_eq!(
        err,
        SanitizerError::AttributeNotWhitelisted {
            tag: "a".to_string(),
            attribute: "onclick".to_string()
        }
    );
}

/// Test that the clean tree exposes structure and attributes
#[test]
fn test_sanitize_to_tree() {
    let sanitizer = HtmlSanitizer::default();
    let tree = sanitizer.sanitize_to_tree(r#"<p title="t">a<b>b</b></p>"#);

    let root = tree.as_element().expect("root element");
    assert_eq!(root.tag_name(), "span");
    let p = root.children()[0].as_element().expect("paragraph");
    assert_eq!(p.tag_name(), "p");
    assert_eq!(p.attribute("title"), Some("t"));
    assert_eq!(tree.text_content(), "ab");
    assert_eq!(tree.inner_html(), r#"<p title="t">a<b>b</b></p>"#);
}

/// Test that a hand-built document is sanitized like parsed input
#[test]
fn test_sanitize_document() {
    let document = SourceDocument::new(vec![
        SourceElement::new("p")
            .with_attribute("onclick", "x()")
            .with_attribute("title", "first")
            .with_attribute("title", "last")
            .with_child(SourceNode::text("hello"))
            .with_child(SourceElement::new("script").with_child(SourceNode::text("bad()")))
            .into(),
        SourceNode::Comment("c".to_string()),
    ]);

    let tree = HtmlSanitizer::default().sanitize_document(&document);

    assert_eq!(tree.inner_html(), r#"<p title="last">hello</p>"#);
}

/// Test that raw bytes are decoded with the declared charset
#[test]
fn test_sanitize_bytes() {
    let sanitizer = HtmlSanitizer::default();

    let html = sanitizer
        .sanitize_bytes(
            b"<meta charset=\"windows-1252\"><p>\x80 5<script>x</script></p>",
            None,
        )
        .expect("decodable input");
    assert_eq!(html.as_str(), "<p>€ 5</p>");

    assert!(matches!(
        sanitizer.sanitize_bytes(b"", None),
        Err(SanitizerError::InvalidInput(_))
    ));
    assert!(matches!(
        sanitizer.sanitize_bytes(b"<p>\xFF</p>", None),
        Err(SanitizerError::EncodingError(_))
    ));
}

/// Test that a caller-supplied parser is used
#[test]
fn test_custom_parser() {
    struct FixedParser;

    impl InertParser for FixedParser {
        fn parse(&self, _markup: &str) -> SourceDocument {
            SourceDocument::new(vec![
                SourceElement::new("em")
                    .with_child(SourceNode::text("fixed"))
                    .into(),
            ])
        }
    }

    let sanitizer = Builder::new()
        .with_parser(FixedParser)
        .build()
        .expect("valid configuration");

    assert_eq!(sanitizer.sanitize("<p>ignored</p>").as_str(), "<em>fixed</em>");
    assert!(matches!(
        sanitizer.sanitize_to_tree("").as_element().map(|e| e.children().len()),
        Some(1)
    ));
}
