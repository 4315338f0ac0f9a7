#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(source) = std::str::from_utf8(data) {
        // Lexing and parsing arbitrary text should never panic.
        let _ = tileasm_parser::parse(source);
    }
});
