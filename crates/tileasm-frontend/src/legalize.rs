//! Expansion of surface operations into primitive tile assembly.
//!
//! Memory operations go through an explicit `pto.subview` of the tensor
//! view, sized to the tile; everything else is emitted destination-last in
//! `ins(...) outs(...)` form with each operand's type attached.

use tileasm_ir::{
    CompileError, Emitter, Location, Result, TensorType, TileType, ValidShape, tensor_view_type,
    tile_view_type,
};

use crate::env::{Env, Operand};
use crate::opcodes::Opcode;

/// `%view = pto.make_tensor_view %argN, ...` in the rank-5 `1x1x1xRxC` form.
pub(crate) fn tensor_view(
    env: &mut Env,
    body: &mut Emitter,
    ssa: &str,
    slot: u32,
    ty: &TensorType,
) {
    let c1 = env.index_const(1);
    let h = env.index_const(i64::from(ty.rows()));
    let w = env.index_const(i64::from(ty.cols()));
    let [s0, s1] = ty.strides();
    let s0 = env.index_const(i64::from(s0));
    let s1 = env.index_const(i64::from(s1));
    body.line(format!(
        "{ssa} = pto.make_tensor_view %arg{slot}, shape = [{c1}, {c1}, {c1}, {h}, {w}] \
         strides = [{c1}, {c1}, {c1}, {s0}, {s1}] : {}",
        tensor_view_type(ty.dtype)
    ));
}

/// `%tile = pto.alloc_tile ...`.
///
/// A dynamic valid shape passes its runtime operands and the address as
/// named options; a static tile takes the address positionally.
pub(crate) fn alloc_tile(
    body: &mut Emitter,
    ssa: &str,
    ty: &TileType,
    addr: Option<u64>,
    valid_row: Option<&str>,
    valid_col: Option<&str>,
) {
    if let ValidShape::Dynamic { .. } = ty.valid {
        let mut opts = Vec::new();
        if let Some(addr) = addr {
            opts.push(format!("addr={addr}"));
        }
        if let Some(v) = valid_row {
            opts.push(format!("valid_row={v}"));
        }
        if let Some(v) = valid_col {
            opts.push(format!("valid_col={v}"));
        }
        body.line(format!("{ssa} = pto.alloc_tile {} : {ty}", opts.join(" ")));
        return;
    }
    match addr {
        Some(addr) => body.line(format!("{ssa} = pto.alloc_tile {addr} : {ty}")),
        None => body.line(format!("{ssa} = pto.alloc_tile : {ty}")),
    }
}

/// Emits a subview of `tensor` at `(row, col)` sized `rows x cols`.
/// Returns the subview's SSA name and type.
fn subview(
    env: &mut Env,
    body: &mut Emitter,
    tensor: &Operand,
    offset: Option<(&Operand, &Operand)>,
    rows: u32,
    cols: u32,
) -> Result<(String, String)> {
    let ty = tensor.tensor("subview source")?;
    let c0 = env.index_const(0);
    let (row, col) = match offset {
        Some((r, c)) => (r.index("row offset")?.to_string(), c.index("column offset")?.to_string()),
        None => (c0.clone(), c0.clone()),
    };
    let c1 = env.index_const(1);
    let c_rows = env.index_const(i64::from(rows));
    let c_cols = env.index_const(i64::from(cols));
    let view_ty = tile_view_type(rows, cols, ty.dtype);
    let sub = env.temp();
    body.line(format!(
        "{sub} = pto.subview {}, offsets = [{c0}, {c0}, {c0}, {row}, {col}], \
         sizes = [{c1}, {c1}, {c1}, {c_rows}, {c_cols}] : {} -> {view_ty}",
        tensor.ssa(),
        tensor_view_type(ty.dtype)
    ));
    Ok((sub, view_ty))
}

/// `dst = load(src[, row, col])`.
pub(crate) fn load(
    env: &mut Env,
    body: &mut Emitter,
    dst: &Operand,
    src: &Operand,
    offset: Option<(&Operand, &Operand)>,
) -> Result<()> {
    let dst_ty = dst.tile("tload destination")?;
    let src_ty = src.tensor("tload source")?;
    if dst_ty.dtype != src_ty.dtype {
        return Err(CompileError::Type(format!(
            "tload dtype mismatch: tile {} is {}, tensor {} is {}",
            dst.ssa(),
            dst_ty.dtype,
            src.ssa(),
            src_ty.dtype
        )));
    }
    let (sub, view_ty) = subview(env, body, src, offset, dst_ty.rows, dst_ty.cols)?;
    body.line(format!(
        "pto.tload ins({sub} : {view_ty}) outs({} : {dst_ty})",
        dst.ssa()
    ));
    Ok(())
}

/// `store(dst[, row, col], src)`.
pub(crate) fn store(
    env: &mut Env,
    body: &mut Emitter,
    dst: &Operand,
    src: &Operand,
    offset: Option<(&Operand, &Operand)>,
) -> Result<()> {
    let dst_ty = dst.tensor("tstore destination")?;
    let src_ty = src.tile("tstore source")?;
    if dst_ty.dtype != src_ty.dtype {
        return Err(CompileError::Type(format!(
            "tstore dtype mismatch: tile {} is {}, tensor {} is {}",
            src.ssa(),
            src_ty.dtype,
            dst.ssa(),
            dst_ty.dtype
        )));
    }
    let (sub, view_ty) = subview(env, body, dst, offset, src_ty.rows, src_ty.cols)?;
    body.line(format!(
        "pto.tstore ins({} : {src_ty}) outs({sub} : {view_ty})",
        src.ssa()
    ));
    Ok(())
}

/// Tile-to-tile move. Differing shapes are legal here.
pub(crate) fn mov(body: &mut Emitter, dst: &Operand, src: &Operand) -> Result<()> {
    let dst_ty = dst.tile("tmov destination")?;
    let src_ty = src.tile("tmov source")?;
    if dst_ty.shape() != src_ty.shape() {
        log::warn!(
            "tmov from {} ({}x{}) to {} ({}x{}) changes the tile shape",
            src.ssa(),
            src_ty.rows,
            src_ty.cols,
            dst.ssa(),
            dst_ty.rows,
            dst_ty.cols
        );
    }
    body.line(format!(
        "pto.tmov ins({} : {src_ty}) outs({} : {dst_ty})",
        src.ssa(),
        dst.ssa()
    ));
    Ok(())
}

fn require_loc(operand: &Operand, role: &str, loc: Location) -> Result<()> {
    let ty = operand.tile(role)?;
    if ty.loc != loc {
        return Err(CompileError::Type(format!(
            "{role} must be a {loc} tile, got {} tile {}",
            ty.loc,
            operand.ssa()
        )));
    }
    Ok(())
}

pub(crate) fn matmul(body: &mut Emitter, dst: &Operand, lhs: &Operand, rhs: &Operand) -> Result<()> {
    require_loc(dst, "tmatmul destination", Location::Acc)?;
    require_loc(lhs, "tmatmul lhs", Location::Left)?;
    require_loc(rhs, "tmatmul rhs", Location::Right)?;
    body.line(format!(
        "pto.tmatmul ins({}, {} : {}, {}) outs({} : {})",
        lhs.ssa(),
        rhs.ssa(),
        lhs.type_text(),
        rhs.type_text(),
        dst.ssa(),
        dst.type_text()
    ));
    Ok(())
}

/// `dst = matmul_acc(acc, lhs, rhs)`; `acc` must agree with `dst` in shape and dtype.
pub(crate) fn matmul_acc(
    body: &mut Emitter,
    dst: &Operand,
    acc: &Operand,
    lhs: &Operand,
    rhs: &Operand,
) -> Result<()> {
    require_loc(dst, "tmatmul.acc destination", Location::Acc)?;
    require_loc(acc, "tmatmul.acc accumulator", Location::Acc)?;
    require_loc(lhs, "tmatmul.acc lhs", Location::Left)?;
    require_loc(rhs, "tmatmul.acc rhs", Location::Right)?;
    let dst_ty = dst.tile("tmatmul.acc destination")?;
    let acc_ty = acc.tile("tmatmul.acc accumulator")?;
    if acc_ty.shape() != dst_ty.shape() {
        return Err(CompileError::Type(format!(
            "tmatmul.acc accumulator {} has shape {}x{} but destination {} has shape {}x{}",
            acc.ssa(),
            acc_ty.rows,
            acc_ty.cols,
            dst.ssa(),
            dst_ty.rows,
            dst_ty.cols
        )));
    }
    if acc_ty.dtype != dst_ty.dtype {
        return Err(CompileError::Type(format!(
            "tmatmul.acc accumulator {} is {} but destination {} is {}",
            acc.ssa(),
            acc_ty.dtype,
            dst.ssa(),
            dst_ty.dtype
        )));
    }
    body.line(format!(
        "pto.tmatmul.acc ins({}, {}, {} : {acc_ty}, {}, {}) outs({} : {dst_ty})",
        acc.ssa(),
        lhs.ssa(),
        rhs.ssa(),
        lhs.type_text(),
        rhs.type_text(),
        dst.ssa()
    ));
    Ok(())
}

/// Any other tile instruction: `pto.<mnemonic> ins(...) outs(dst)`.
pub(crate) fn generic(body: &mut Emitter, mnemonic: &str, dst: &Operand, ins: &[Operand]) -> Result<()> {
    let dst_ty = dst.tile(&format!("{mnemonic} destination"))?;
    let outs = format!("outs({} : {dst_ty})", dst.ssa());
    if ins.is_empty() {
        body.line(format!("pto.{mnemonic} {outs}"));
        return Ok(());
    }
    let names: Vec<&str> = ins.iter().map(Operand::ssa).collect();
    let types: Vec<String> = ins.iter().map(Operand::type_text).collect();
    body.line(format!(
        "pto.{mnemonic} ins({} : {}) {outs}",
        names.join(", "),
        types.join(", ")
    ));
    Ok(())
}

/// `record_event` / `wait_event`.
pub(crate) fn event(
    body: &mut Emitter,
    op: Opcode,
    src_op: &str,
    dst_op: &str,
    token: &Operand,
) -> Result<()> {
    for (field, value) in [("src_op", src_op), ("dst_op", dst_op)] {
        if value.is_empty() || !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(CompileError::Config(format!(
                "{}({field}=...) must name a pipeline op like \"TLOAD\", got {value:?}",
                op.mnemonic()
            )));
        }
    }
    body.line(format!(
        "pto.{} {{src_op=#op<{src_op}>, dst_op=#op<{dst_op}>, token={}}}",
        op.mnemonic(),
        token.ssa()
    ));
    Ok(())
}

/// Pipe selectors accepted by a single-pipe barrier on this hardware generation.
const SYNC_PIPES: &[&str] = &["V"];

pub(crate) fn sync(body: &mut Emitter, pipe: Option<&str>) -> Result<()> {
    match pipe {
        None => body.line("pto.tsync"),
        Some(pipe) if SYNC_PIPES.contains(&pipe) => {
            body.line(format!("pto.tsync {{pipe=\"{pipe}\"}}"));
        }
        Some(pipe) => {
            return Err(CompileError::Config(format!(
                "tsync(pipe=...) does not accept pipe {pipe:?}; only \"V\" is supported"
            )));
        }
    }
    Ok(())
}

pub(crate) fn push(body: &mut Emitter, dst: &Operand, src: &Operand, token: &Operand) -> Result<()> {
    dst.tensor("tpush destination")?;
    src.tile("tpush source")?;
    body.line(format!(
        "pto.tpush {}, {}, {}",
        dst.ssa(),
        src.ssa(),
        token.ssa()
    ));
    Ok(())
}

pub(crate) fn print(body: &mut Emitter, src: &Operand) -> Result<()> {
    src.tile("tprint source")?;
    body.line(format!(
        "pto.tprint ins({} : {})",
        src.ssa(),
        src.type_text()
    ));
    Ok(())
}
