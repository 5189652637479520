#![no_main]

use libfuzzer_sys::fuzz_target;
use markup_guard::HtmlSanitizer;

fuzz_target!(|data: &[u8]| {
    let sanitizer = HtmlSanitizer::default();
    let _ = sanitizer.sanitize_bytes(data, Some("text/html; charset=windows-1252"));
    let _ = sanitizer.sanitize_bytes(data, None);
});
