mod common;

use std::thread;

use tileasm_frontend::{CompileOptions, compile_function, compile_kernel};
use tileasm_host::{Role, infer_host_spec, parse_host_spec};
use tileasm_ir::DType;

#[test]
fn add16_sidecar_round_trip() {
    let (kernel, text) = common::compile_with_sidecar(common::ADD16, &CompileOptions::default());
    assert!(text.starts_with("// PTO_HOST_SPEC_BEGIN v1\n"));
    assert!(text.ends_with(&kernel.text));

    let spec = parse_host_spec(&text).unwrap().expect("sidecar present");
    assert_eq!(spec.kernel_name, "add16");
    assert_eq!(spec.block_dim, 1);
    assert_eq!(spec.output_indices(), vec![2]);
    for arg in &spec.args {
        assert_eq!(arg.dtype, DType::F16);
        assert_eq!(arg.shape, [16, 16]);
        assert_eq!(arg.stride, None);
        assert_eq!(arg.nbytes(), 512);
    }

    // Inference over the same module agrees on every argument.
    assert_eq!(infer_host_spec(&text).unwrap().args, spec.args);
}

#[test]
fn gemm16_roles_and_types() {
    let (_, text) = common::compile_with_sidecar(common::GEMM16, &CompileOptions::default());
    let spec = parse_host_spec(&text).unwrap().unwrap();
    assert_eq!(spec.kernel_name, "gemm16");
    let dtypes: Vec<DType> = spec.args.iter().map(|a| a.dtype).collect();
    assert_eq!(dtypes, [DType::F16, DType::F16, DType::F32]);
    let roles: Vec<Role> = spec.args.iter().map(|a| a.role).collect();
    assert_eq!(roles, [Role::In, Role::In, Role::Out]);

    assert_eq!(common::lines_with(&text, "pto.tmov ").len(), 2);
    assert_eq!(common::lines_with(&text, "pto.tmatmul ").len(), 1);
}

#[test]
fn bgemm_with_injected_constant() {
    let options = CompileOptions::default().with_const("K_TILES", 4_i64);
    let (kernel, text) = common::compile_with_sidecar(common::BGEMM, &options);
    assert_eq!(kernel.name, "bgemm_f16");
    // Tensor slots start after the task id.
    let slots: Vec<u32> = kernel.tensor_args.iter().map(|a| a.slot).collect();
    assert_eq!(slots, [1, 2, 3]);
    assert!(text.contains("func.func @bgemm_f16(%arg0: index, "));

    let spec = parse_host_spec(&text).unwrap().unwrap();
    assert_eq!(spec.args.len(), 3);
    assert_eq!(spec.args[2].shape, [64, 16]);
    assert_eq!(spec.output_indices(), vec![2]);

    // Without the constant the loop bound is an unknown name.
    assert!(compile_kernel(common::BGEMM, &CompileOptions::default()).is_err());
}

#[test]
fn pipelined_copy_regions() {
    let kernel = common::compile(common::PIPELINED_COPY);
    let text = &kernel.text;
    assert_eq!(common::lines_with(text, "scf.if ").len(), 1);
    assert_eq!(common::lines_with(text, "} else {").len(), 1);
    assert_eq!(common::lines_with(text, "// idle block").len(), 1);
    assert_eq!(common::lines_with(text, "pto.get_block_idx").len(), 1);

    let names: Vec<&str> = kernel.tensor_args.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, ["src", "dst"]);
    assert_eq!(kernel.tensor_args[1].role, Some(Role::Out));
}

#[test]
fn independent_compilations_in_parallel() {
    let source = format!("{}\n{}", common::ADD16, common::PIPELINED_COPY);
    let unit = tileasm_parser::parse(&source).unwrap();
    let options = &CompileOptions::default();

    let sequential: Vec<String> = unit
        .functions
        .iter()
        .map(|f| compile_function(f, options).unwrap().text)
        .collect();
    let parallel: Vec<String> = thread::scope(|s| {
        let handles: Vec<_> = unit
            .functions
            .iter()
            .map(|f| s.spawn(move || compile_function(f, options).unwrap().text))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert_eq!(sequential, parallel);
}

#[test]
fn listing_matches_selection() {
    let source = format!("{}\n{}", common::ADD16, common::GEMM16);
    let names = tileasm_parser::list_kernel_functions(&source).unwrap();
    assert_eq!(names, ["add16", "gemm16"]);
    for name in &names {
        let kernel = compile_kernel(&source, &CompileOptions::default().with_kernel(name.as_str()))
            .unwrap();
        assert_eq!(&kernel.name, name);
    }
}
