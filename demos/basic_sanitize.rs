//! Basic sanitization examples with the default policy

use markup_guard::{HtmlSanitizer, sanitize};

fn show(title: &str, input: &str, output: &str) {
    println!("{}", title);
    println!("Input HTML:");
    println!("{}\n", input);
    println!("Sanitized HTML:");
    println!("{}", output);
    println!("---\n");
}

fn main() {
    println!("=== markup-guard - Basic Examples ===\n");

    // Example 1: Script and event handler removal
    let html = r#"<p onclick="steal()">Hello<script>steal()</script></p>"#;
    show("Example 1: Scripts and handlers", html, sanitize(html).as_str());

    // Example 2: URL schemes
    let html = r#"<a href="javascript:alert(1)">bad</a> <a href="https://example.com/">good</a>"#;
    show("Example 2: URL schemes", html, sanitize(html).as_str());

    // Example 3: Unknown tags keep their text inside an inert span
    let html = "<custom-card><b>Title</b> body</custom-card>";
    show("Example 3: Unknown tags", html, sanitize(html).as_str());

    // Example 4: Raw bytes with a legacy charset
    let bytes = b"<meta charset=\"windows-1252\"><p>\x93quoted\x94</p>";
    match HtmlSanitizer::default().sanitize_bytes(bytes, None) {
        Ok(html) => show(
            "Example 4: windows-1252 input",
            &String::from_utf8_lossy(bytes),
            html.as_str(),
        ),
        Err(err) => eprintln!("Example 4 failed: {} (code {})", err, err.code()),
    }
}
