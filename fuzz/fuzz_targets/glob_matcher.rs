#![no_main]

use libfuzzer_sys::fuzz_target;
use memoria::pattern::text_matches_pattern;

fuzz_target!(|data: &[u8]| {
    // Split arbitrary bytes into (text, pattern) and match both case modes;
    // the matcher must terminate without panicking on any input
    if let Ok(input) = std::str::from_utf8(data) {
        if let Some((text, pattern)) = input.split_once('\n') {
            let _ = text_matches_pattern(text, pattern, false);
            let _ = text_matches_pattern(text, pattern, true);
        }
    }
});
