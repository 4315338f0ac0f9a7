//! Export of a [`LegacyProgram`] as flat tile assembly.
//!
//! Tiles that take part in a matmul are split by role. A left operand `a`
//! becomes `%a_mat` (load target) plus `%a_left`, a right operand `b`
//! becomes `%b_mat` plus `%b_right`, and a result or accumulator `c`
//! becomes `%c_acc`. Each matmul re-stages its operands with a pair of
//! `tmov`s before the primitive instruction.

use std::collections::{HashMap, HashSet};

use tileasm_ir::{AsmProgram, CompileError, Location, Result, TensorType, TileType};

use crate::model::{Instruction, LegacyProgram, Operand, TileDecl};
use crate::shape::infer_memref_shapes;

/// Concrete tile names bound to one logical tile.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct TileBinding {
    mat: Option<String>,
    left: Option<String>,
    right: Option<String>,
    acc: Option<String>,
}

impl TileBinding {
    fn is_matmul(&self) -> bool {
        self.mat.is_some() || self.acc.is_some()
    }
}

#[derive(Debug, Default)]
struct Bindings {
    tiles: HashMap<String, TileBinding>,
}

impl Bindings {
    /// Classifies every matmul tile by role in one scan.
    fn classify(program: &LegacyProgram) -> Result<Self> {
        let mut lhs = HashSet::new();
        let mut rhs = HashSet::new();
        let mut dst = HashSet::new();
        for ins in &program.instructions {
            if let Some((a, b, d, acc)) = ins.matmul_tiles() {
                lhs.insert(a);
                rhs.insert(b);
                dst.insert(d);
                dst.extend(acc);
            }
        }
        for name in lhs.iter().chain(&rhs).chain(&dst) {
            program.tile_decl(name)?;
        }

        let mut tiles = HashMap::new();
        for decl in &program.tiles {
            let name = decl.name.as_str();
            let mut binding = TileBinding::default();
            if lhs.contains(name) && rhs.contains(name) {
                return Err(CompileError::Type(format!(
                    "tile {name} used as both matmul left and right operand"
                )));
            }
            if lhs.contains(name) {
                binding.mat = Some(format!("%{name}_mat"));
                binding.left = Some(format!("%{name}_left"));
            }
            if rhs.contains(name) {
                binding.mat = Some(format!("%{name}_mat"));
                binding.right = Some(format!("%{name}_right"));
            }
            if dst.contains(name) {
                binding.acc = Some(format!("%{name}_acc"));
            }
            if binding.is_matmul() {
                log::debug!("legacy tile {name} classified as {binding:?}");
                tiles.insert(name.to_string(), binding);
            }
        }
        Ok(Self { tiles })
    }

    fn get(&self, name: &str) -> Option<&TileBinding> {
        self.tiles.get(name)
    }

    fn for_load(&self, name: &str) -> String {
        self.get(name)
            .and_then(|b| b.mat.clone())
            .unwrap_or_else(|| format!("%{name}"))
    }

    fn for_store(&self, name: &str) -> String {
        self.get(name)
            .and_then(|b| b.acc.clone())
            .unwrap_or_else(|| format!("%{name}"))
    }

    /// The most specific binding: accumulator, left, right, stage, plain.
    fn for_operand(&self, name: &str) -> String {
        self.get(name)
            .and_then(|b| {
                b.acc
                    .clone()
                    .or_else(|| b.left.clone())
                    .or_else(|| b.right.clone())
                    .or_else(|| b.mat.clone())
            })
            .unwrap_or_else(|| format!("%{name}"))
    }

    fn staged(&self, name: &str, left: bool) -> Result<(String, String)> {
        let binding = self.get(name);
        let stage = binding.and_then(|b| b.mat.clone());
        let operand = binding.and_then(|b| if left { b.left.clone() } else { b.right.clone() });
        match (stage, operand) {
            (Some(stage), Some(operand)) => Ok((stage, operand)),
            _ => Err(CompileError::Symbol(format!(
                "tile {name} has no matmul staging buffers"
            ))),
        }
    }

    fn acc(&self, name: &str) -> Result<String> {
        self.get(name)
            .and_then(|b| b.acc.clone())
            .ok_or_else(|| CompileError::Symbol(format!("tile {name} has no accumulator buffer")))
    }
}

fn tile_type(decl: &TileDecl, loc: Location) -> TileType {
    TileType::for_location(loc, decl.dtype, decl.rows, decl.cols)
}

fn operand(bindings: &Bindings, op: &Operand) -> String {
    match op {
        Operand::Tile(name) => bindings.for_operand(name),
        Operand::MemRef(name) | Operand::Scalar(name) | Operand::Index(name) => format!("%{name}"),
        Operand::Imm(v) => v.to_string(),
    }
}

/// Emits the two staging moves and the matmul-family instruction itself.
fn matmul(
    out: &mut AsmProgram,
    bindings: &Bindings,
    mnemonic: &str,
    dst: &str,
    acc: Option<&str>,
    (a, b): (&str, &str),
    bias: Option<&str>,
) -> Result<()> {
    let (a_mat, a_left) = bindings.staged(a, true)?;
    let (b_mat, b_right) = bindings.staged(b, false)?;
    out.assign(&a_left, "tmov", &[a_mat], None)?;
    out.assign(&b_right, "tmov", &[b_mat], None)?;
    let mut ops = Vec::new();
    if let Some(acc) = acc {
        ops.push(bindings.acc(acc)?);
    }
    ops.push(a_left);
    ops.push(b_right);
    if let Some(bias) = bias {
        ops.push(bindings.for_operand(bias));
    }
    out.assign(&bindings.acc(dst)?, mnemonic, &ops, None)?;
    Ok(())
}

/// Lowers `program` to flat tile assembly text.
pub fn export_program(program: &LegacyProgram) -> Result<String> {
    if program.memrefs.is_empty() {
        return Err(CompileError::Config(format!(
            "legacy program {} has no memref declarations",
            program.name
        )));
    }
    let shapes = infer_memref_shapes(program)?;
    let bindings = Bindings::classify(program)?;

    let mut out = AsmProgram::new();
    out.comment(&format!("Generated from legacy program: {}", program.name));
    out.prologue();

    for (slot, decl) in program.memrefs.iter().enumerate() {
        let shape = shapes
            .get(&decl.name)
            .copied()
            .ok_or_else(|| CompileError::ShapeInference {
                memref: decl.name.clone(),
            })?;
        let slot = u32::try_from(slot)
            .map_err(|_| CompileError::Config("too many memref declarations".into()))?;
        out.make_tensor_view(&format!("%{}", decl.name), slot, &TensorType::new(decl.dtype, shape))?;
    }

    // Plain tiles first, then matmul buffers grouped by role.
    for decl in program.tiles.iter().filter(|d| bindings.get(&d.name).is_none()) {
        out.alloc_tile(&format!("%{}", decl.name), &tile_type(decl, Location::Vec), None)?;
    }
    let roles: [(Location, fn(&TileBinding) -> Option<&String>); 4] = [
        (Location::Mat, |b| b.mat.as_ref()),
        (Location::Left, |b| b.left.as_ref()),
        (Location::Right, |b| b.right.as_ref()),
        (Location::Acc, |b| b.acc.as_ref()),
    ];
    for (loc, pick) in roles {
        for decl in &program.tiles {
            if let Some(name) = bindings.get(&decl.name).and_then(pick) {
                out.alloc_tile(name, &tile_type(decl, loc), None)?;
            }
        }
    }

    for ins in &program.instructions {
        match ins {
            Instruction::Load { dst, src, row, col } => {
                program.tile_decl(dst)?;
                out.assign(
                    &bindings.for_load(dst),
                    "tload",
                    &[format!("%{src}[{row}, {col}]")],
                    None,
                )?;
            }
            Instruction::Store { dst, src, row, col } => {
                program.tile_decl(src)?;
                out.op(
                    "tstore",
                    &[format!("%{dst}[{row}, {col}]"), bindings.for_store(src)],
                    None,
                );
            }
            Instruction::Mov { dst, src } => {
                out.assign(&bindings.for_operand(dst), "tmov", &[bindings.for_operand(src)], None)?;
            }
            Instruction::Matmul { dst, a, b } => {
                matmul(&mut out, &bindings, "tmatmul", dst, None, (a.as_str(), b.as_str()), None)?;
            }
            Instruction::MatmulAcc { dst, acc, a, b } => {
                let operands = (a.as_str(), b.as_str());
                matmul(&mut out, &bindings, "tmatmul_acc", dst, Some(acc.as_str()), operands, None)?;
            }
            Instruction::MatmulBias { dst, a, b, bias } => {
                let operands = (a.as_str(), b.as_str());
                matmul(&mut out, &bindings, "tmatmul_bias", dst, None, operands, Some(bias.as_str()))?;
            }
            Instruction::Generic {
                mnemonic,
                dst,
                operands,
                attrs,
            } => {
                if let Some((field, value)) = attrs.first() {
                    return Err(CompileError::UnsupportedField {
                        instruction: mnemonic.to_uppercase(),
                        field: format!("{field}={value}"),
                    });
                }
                let ops: Vec<String> = operands.iter().map(|op| operand(&bindings, op)).collect();
                out.assign(&bindings.for_operand(dst), &mnemonic.to_lowercase(), &ops, None)?;
            }
        }
    }

    out.epilogue();
    Ok(out.emit())
}

#[cfg(test)]
mod tests {
    use tileasm_ir::DType;

    use super::*;
    use crate::model::{Attr, Index};

    fn gemm() -> LegacyProgram {
        let mut p = LegacyProgram::new("gemm16");
        p.memref("a", DType::F16, None).unwrap();
        p.memref("b", DType::F16, None).unwrap();
        p.memref("c", DType::F32, None).unwrap();
        p.tile("a", DType::F16, 16, 16).unwrap();
        p.tile("b", DType::F16, 16, 16).unwrap();
        p.tile("c", DType::F32, 16, 16).unwrap();
        p.push(Instruction::Load {
            dst: "a".into(),
            src: "a".into(),
            row: Index::Imm(0),
            col: Index::Imm(0),
        })
        .push(Instruction::Load {
            dst: "b".into(),
            src: "b".into(),
            row: Index::Imm(0),
            col: Index::Imm(0),
        })
        .push(Instruction::Matmul {
            dst: "c".into(),
            a: "a".into(),
            b: "b".into(),
        })
        .push(Instruction::Store {
            dst: "c".into(),
            src: "c".into(),
            row: Index::Imm(0),
            col: Index::Imm(0),
        });
        p
    }

    #[test]
    fn matmul_lowering() {
        let text = export_program(&gemm()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "; Generated from legacy program: gemm16");
        assert_eq!(lines[1], "prologue");
        assert_eq!(
            lines[2],
            "%a = pto.make_tensor_view %arg0, dtype=f16, shape=[16,16] strides=[16,1], layout=ND"
        );
        assert!(lines[4].starts_with("%c = pto.make_tensor_view %arg2, dtype=f32"));
        let allocs: Vec<&str> = lines
            .iter()
            .filter(|l| l.contains("pto.alloc_tile"))
            .map(|l| l.split(' ').next().unwrap_or(""))
            .collect();
        assert_eq!(allocs, ["%a_mat", "%b_mat", "%a_left", "%b_right", "%c_acc"]);
        let body: Vec<&str> = lines[10..].to_vec();
        assert_eq!(
            body,
            [
                "%a_mat = pto.tload %a[0, 0]",
                "%b_mat = pto.tload %b[0, 0]",
                "%a_left = pto.tmov %a_mat",
                "%b_right = pto.tmov %b_mat",
                "%c_acc = pto.tmatmul %a_left, %b_right",
                "pto.tstore %c[0, 0], %c_acc",
                "epilogue",
            ]
        );
    }

    #[test]
    fn layouts_follow_location_defaults() {
        let text = export_program(&gemm()).unwrap();
        let left = text.lines().find(|l| l.starts_with("%a_left =")).unwrap();
        assert!(left.contains("loc=left") && left.contains("blayout=row_major, slayout=row_major"));
        let acc = text.lines().find(|l| l.starts_with("%c_acc =")).unwrap();
        assert!(acc.contains("loc=acc") && acc.contains("fractal=1024"));
    }

    #[test]
    fn role_conflict() {
        let mut p = gemm();
        p.push(Instruction::Matmul {
            dst: "c".into(),
            a: "b".into(),
            b: "a".into(),
        });
        let err = export_program(&p).unwrap_err();
        assert!(matches!(err, CompileError::Type(ref m) if m.contains("both matmul left and right")));
    }

    #[test]
    fn generic_ops_and_attrs() {
        let mut p = LegacyProgram::new("k");
        p.memref("x", DType::F32, Some([8, 8])).unwrap();
        p.tile("t", DType::F32, 8, 8).unwrap();
        p.tile("m", DType::F32, 8, 1).unwrap();
        p.push(Instruction::generic(
            "TROWMAX",
            "m",
            vec![Operand::Tile("t".into()), Operand::Imm(0)],
        ));
        let text = export_program(&p).unwrap();
        assert!(text.contains("%m = pto.trowmax %t, 0\n"));

        p.push(Instruction::Generic {
            mnemonic: "TCMPS".into(),
            dst: "t".into(),
            operands: vec![Operand::Tile("t".into())],
            attrs: vec![("mode".into(), Attr::Str("GT".into()))],
        });
        assert_eq!(
            export_program(&p).unwrap_err(),
            CompileError::UnsupportedField {
                instruction: "TCMPS".into(),
                field: "mode=\"GT\"".into(),
            }
        );
    }

    #[test]
    fn empty_program_rejected() {
        assert!(matches!(
            export_program(&LegacyProgram::new("k")),
            Err(CompileError::Config(_))
        ));
    }
}
