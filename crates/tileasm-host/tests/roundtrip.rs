//! Sidecar encode/decode behaviour across the public API.

use tileasm_host::{
    HostSpec, HostTensorArg, Role, encode_host_spec, infer_host_spec, parse_host_spec,
    prepend_host_spec,
};
use tileasm_ir::{DType, TensorLayout};

fn gemm_spec() -> HostSpec {
    let mut b = HostTensorArg::new(DType::F16, [16, 32], Role::In);
    b.layout = TensorLayout::Dn.to_string();
    b.stride = Some([1, 16]);
    HostSpec {
        args: vec![
            HostTensorArg::new(DType::F16, [16, 16], Role::In),
            b,
            HostTensorArg::new(DType::F32, [16, 32], Role::Inout),
        ],
        seed: 42,
        block_dim: 8,
        kernel_name: "gemm".into(),
    }
}

#[test]
fn decode_inverts_encode() {
    let spec = gemm_spec();
    let text = encode_host_spec(&spec).unwrap();
    assert_eq!(parse_host_spec(&text).unwrap(), Some(spec));
}

#[test]
fn stride_presence_survives_round_trip() {
    let mut spec = gemm_spec();
    spec.args[1].stride = None;
    let decoded = parse_host_spec(&encode_host_spec(&spec).unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(decoded.args[1].stride, None);
    assert_eq!(decoded.args[1].layout, "DN");
    assert_eq!(decoded, spec);
}

#[test]
fn empty_argument_list_round_trips() {
    let spec = HostSpec::new("noop", Vec::new());
    let text = encode_host_spec(&spec).unwrap();
    assert!(text.contains("\"args\": []"));
    assert_eq!(parse_host_spec(&text).unwrap(), Some(spec));
}

#[test]
fn embedded_spec_wins_over_inference() {
    let module = "module attributes {\"pto.device-spec\" = \"Ascend910B1\"} {\n  func.func @gemm() {\n    return\n  }\n}\n";
    let text = prepend_host_spec(module, &gemm_spec()).unwrap();
    assert!(text.ends_with(module));
    let spec = parse_host_spec(&text).unwrap().expect("sidecar present");
    assert_eq!(spec.kernel_name, "gemm");
    assert_eq!(spec.output_indices(), vec![2]);

    // No views in the module body, so inference has nothing to work with.
    assert!(infer_host_spec(module).is_err());
}
