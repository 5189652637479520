#![no_main]

use libfuzzer_sys::fuzz_target;
use markup_guard::{Builder, HtmlSanitizer};
use std::sync::OnceLock;

fn permissive() -> &'static HtmlSanitizer {
    static SANITIZER: OnceLock<HtmlSanitizer> = OnceLock::new();
    SANITIZER.get_or_init(|| {
        Builder::new()
            .allow_css_styles()
            .allow_form_tag()
            .with_custom_network_request_url_policy(|url, _, _| Some(url.to_string()))
            .build()
            .expect("valid configuration")
    })
}

fuzz_target!(|data: &[u8]| {
    let Ok(markup) = std::str::from_utf8(data) else {
        return;
    };

    let once = permissive().sanitize(markup);
    assert!(!once.as_str().contains("<script"), "script survived: {once}");
    assert_eq!(permissive().sanitize(once.as_str()), once);
});
