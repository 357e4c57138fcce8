#![no_main]

use libfuzzer_sys::fuzz_target;
use memoria::suppress::{Provenance, SuppressionCatalog};

fuzz_target!(|data: &[u8]| {
    // Convert arbitrary bytes to UTF-8 string (lossy conversion)
    if let Ok(input) = std::str::from_utf8(data) {
        // Malformed policy must be a clean error, never a panic
        let mut catalog = SuppressionCatalog::new();
        let _ = catalog.load_str(input, Provenance::User, 20);
    }
});
