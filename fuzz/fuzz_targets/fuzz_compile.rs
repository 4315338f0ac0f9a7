#![no_main]

use libfuzzer_sys::fuzz_target;
use tileasm_frontend::{CompileOptions, compile_function};

fuzz_target!(|data: &[u8]| {
    if let Ok(source) = std::str::from_utf8(data) {
        let Ok(unit) = tileasm_parser::parse(source) else {
            return;
        };
        // Every function either compiles or fails with an error.
        let options = CompileOptions::default();
        for func in &unit.functions {
            let _ = compile_function(func, &options);
        }
    }
});
