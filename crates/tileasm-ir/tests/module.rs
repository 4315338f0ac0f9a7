//! Building complete module texts through the public API.

use tileasm_ir::{
    AsmProgram, CompileError, DEFAULT_DEVICE_SPEC, DType, Emitter, FuncParam, FuncSignature,
    Location, TensorType, TileType, wrap_module,
};

#[test]
fn structured_module_layout() {
    let mut body = Emitter::new();
    body.line("%c0 = arith.constant 0 : index");
    body.open("scf.for %i = %c0 to %c4 step %c1");
    body.line("pto.tsync");
    body.close().unwrap();

    let sig = FuncSignature {
        name: "copy".into(),
        params: vec![
            FuncParam::Tensor {
                slot: 1,
                dtype: DType::F16,
            },
            FuncParam::TaskId,
        ],
    };
    let text = wrap_module(DEFAULT_DEVICE_SPEC, &sig, &body).unwrap();
    assert_eq!(
        text,
        "module attributes {\"pto.device-spec\" = \"Ascend910B1\"} {\n\
         \x20 func.func @copy(%arg0: index, %arg1: !pto.ptr<f16>) {\n\
         \x20   %c0 = arith.constant 0 : index\n\
         \x20   scf.for %i = %c0 to %c4 step %c1 {\n\
         \x20     pto.tsync\n\
         \x20   }\n\
         \x20   return\n\
         \x20 }\n\
         }\n"
    );
}

#[test]
fn open_region_blocks_wrapping() {
    let mut body = Emitter::new();
    body.open("scf.if %t1");
    let sig = FuncSignature {
        name: "k".into(),
        params: Vec::new(),
    };
    let err = wrap_module(DEFAULT_DEVICE_SPEC, &sig, &body).unwrap_err();
    assert!(matches!(err, CompileError::Symbol(ref m) if m.contains("@k")));
}

#[test]
fn flat_program() {
    let mut p = AsmProgram::new();
    let tile = TileType::for_location(Location::Vec, DType::F32, 8, 8);
    p.comment("scale")
        .prologue()
        .make_tensor_view("%x", 0, &TensorType::new(DType::F32, [8, 8]))
        .unwrap()
        .alloc_tile("%t", &tile, None)
        .unwrap()
        .assign("%t", "tload", &["%x[0, 0]"], None)
        .unwrap()
        .op("tstore", &["%x[0, 0]", "%t"], None)
        .epilogue();
    let lines: Vec<String> = p.emit().lines().map(str::to_string).collect();
    assert_eq!(lines[0], "; scale");
    assert_eq!(
        lines[2],
        "%x = pto.make_tensor_view %arg0, dtype=f32, shape=[8,8] strides=[8,1], layout=ND"
    );
    assert!(lines[3].starts_with("%t = pto.alloc_tile : !pto.tile_buf<loc=ub, dtype=f32, rows=8, cols=8"));
    assert_eq!(lines[4], "%t = pto.tload %x[0, 0]");
    assert_eq!(lines[5], "pto.tstore %x[0, 0], %t");
    assert_eq!(lines[6], "epilogue");

    assert!(p.alloc_tile("t", &tile, None).is_err());
}

#[test]
fn location_defaults_in_tile_text() {
    let acc = TileType::for_location(Location::Acc, DType::F32, 16, 16).to_string();
    assert!(acc.contains("loc=acc") && acc.contains("blayout=col_major, slayout=row_major"));
    let right = TileType::for_location(Location::Right, DType::F16, 16, 16).to_string();
    assert!(right.contains("loc=right") && right.contains("slayout=col_major"));
}
