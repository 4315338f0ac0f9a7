#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = tileasm_host::parse_host_spec(text);
        let _ = tileasm_host::infer_host_spec(text);
    }
});
