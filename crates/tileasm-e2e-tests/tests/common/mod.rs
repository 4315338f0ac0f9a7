use tileasm_frontend::{CompileOptions, KernelSpec, compile_kernel, default_host_spec};
use tileasm_host::prepend_host_spec;

#[allow(dead_code)]
pub const ADD16: &str = include_str!("../../../../demos/add16.py");
#[allow(dead_code)]
pub const GEMM16: &str = include_str!("../../../../demos/gemm16.py");
#[allow(dead_code)]
pub const BGEMM: &str = include_str!("../../../../demos/bgemm.py");
#[allow(dead_code)]
pub const PIPELINED_COPY: &str = include_str!("../../../../demos/pipelined_copy.py");

/// Compile with default options, panicking on failure.
#[allow(dead_code)]
pub fn compile(source: &str) -> KernelSpec {
    compile_kernel(source, &CompileOptions::default()).expect("compilation failed")
}

/// Compile and prepend the derived host spec sidecar, as the CLI does.
#[allow(dead_code)]
pub fn compile_with_sidecar(source: &str, options: &CompileOptions) -> (KernelSpec, String) {
    let kernel = compile_kernel(source, options).expect("compilation failed");
    let spec = default_host_spec(&kernel).expect("host spec derivation failed");
    let text = prepend_host_spec(&kernel.text, &spec).expect("sidecar encoding failed");
    (kernel, text)
}

/// Trimmed body lines whose text contains `needle`.
#[allow(dead_code)]
pub fn lines_with<'a>(text: &'a str, needle: &str) -> Vec<&'a str> {
    text.lines()
        .map(str::trim)
        .filter(|l| l.contains(needle))
        .collect()
}
