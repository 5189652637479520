//! Narrowing the default policy with caller-supplied policies

use markup_guard::unchecked::{Justification, also_allow_tags};
use markup_guard::{AttributeSpec, Builder};

fn main() {
    println!("=== markup-guard - Custom Policies ===\n");

    let sanitizer = Builder::new()
        .allow_css_styles()
        .add_original_tag_names()
        .with_custom_network_request_url_policy(|url, hints, _| {
            println!("  network url on <{}>: {}", hints.tag_name, url);
            url.starts_with("https://images.example.com/")
                .then(|| url.to_string())
        })
        .with_custom_token_policy(|token, _, _| Some(format!("user-content-{token}")))
        .only_allow_attributes([
            AttributeSpec::new("href"),
            AttributeSpec::new("src"),
            AttributeSpec::new("style"),
            AttributeSpec::new("id"),
            AttributeSpec::on_tag("a", "title").with_policy(|value, _, _| {
                (value.len() <= 40).then(|| value.to_string())
            }),
        ])
        .build()
        .expect("valid configuration");

    let html = concat!(
        r#"<h2 id="intro">Intro</h2>"#,
        r#"<p style="color: navy; position: fixed">Styled <mark>text</mark></p>"#,
        r#"<img src="https://images.example.com/a.png"><img src="https://tracker.example.net/p.gif">"#,
        r#"<a href="/docs" title="Documentation">docs</a>"#,
    );
    println!("Input HTML:\n{}\n", html);
    println!("Sanitized HTML:\n{}\n", sanitizer.sanitize(html));

    let mut builder = Builder::new();
    also_allow_tags(
        &Justification::new("video sources are served from our own media host"),
        &mut builder,
        &["video"],
    );
    match builder.build() {
        Ok(sanitizer) => println!(
            "With <video> allowed:\n{}",
            sanitizer.sanitize("<video>Your browser has no video support</video>")
        ),
        Err(err) => eprintln!("configuration error: {}", err),
    }
}
