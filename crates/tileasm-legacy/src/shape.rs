//! Memory reference shape inference.
//!
//! A memref without a declared shape gets the smallest 2-D extent that
//! covers every load and store with literal offsets. Accesses through
//! runtime offsets contribute nothing.

use std::collections::HashMap;

use tileasm_ir::{CompileError, Result};

use crate::model::{Index, Instruction, LegacyProgram};

/// Resolved `[rows, cols]` per memref name.
pub type ShapeMap = HashMap<String, [u32; 2]>;

fn extent(offset: &Index, size: u32, memref: &str) -> Result<Option<u32>> {
    let Some(offset) = offset.as_imm() else {
        return Ok(None);
    };
    let end = u32::try_from(offset)
        .ok()
        .and_then(|o| o.checked_add(size))
        .ok_or_else(|| {
            CompileError::Config(format!("memref {memref}: offset {offset} out of range"))
        })?;
    Ok(Some(end))
}

/// Resolves the shape of every declared memref.
///
/// Fails with [`CompileError::ShapeInference`] for a memref that has no
/// declared shape and no access with literal offsets.
pub fn infer_memref_shapes(program: &LegacyProgram) -> Result<ShapeMap> {
    let mut inferred: ShapeMap = HashMap::new();

    for ins in &program.instructions {
        let (memref, tile, row, col) = match ins {
            Instruction::Load { dst, src, row, col } => (src, dst, row, col),
            Instruction::Store { dst, src, row, col } => (dst, src, row, col),
            _ => continue,
        };
        let decl = program.memref_decl(memref)?;
        if decl.shape.is_some() {
            continue;
        }
        let tile = program.tile_decl(tile)?;
        let (Some(rows), Some(cols)) = (
            extent(row, tile.rows, memref)?,
            extent(col, tile.cols, memref)?,
        ) else {
            continue;
        };
        let entry = inferred.entry(memref.clone()).or_insert([0, 0]);
        entry[0] = entry[0].max(rows);
        entry[1] = entry[1].max(cols);
    }

    let mut shapes = ShapeMap::new();
    for decl in &program.memrefs {
        let shape = match decl.shape {
            Some(shape) => shape,
            None => *inferred.get(&decl.name).ok_or_else(|| CompileError::ShapeInference {
                memref: decl.name.clone(),
            })?,
        };
        log::debug!("memref {} shape {}x{}", decl.name, shape[0], shape[1]);
        shapes.insert(decl.name.clone(), shape);
    }
    Ok(shapes)
}

#[cfg(test)]
mod tests {
    use tileasm_ir::DType;

    use super::*;

    fn load(dst: &str, src: &str, row: Index, col: Index) -> Instruction {
        Instruction::Load {
            dst: dst.into(),
            src: src.into(),
            row,
            col,
        }
    }

    #[test]
    fn union_of_literal_accesses() {
        let mut p = LegacyProgram::new("k");
        p.memref("a", DType::F16, None).unwrap();
        p.tile("t", DType::F16, 16, 16).unwrap();
        p.push(load("t", "a", Index::Imm(0), Index::Imm(0)));
        p.push(load("t", "a", Index::Imm(16), Index::Imm(0)));
        p.push(load("t", "a", Index::Imm(0), Index::Imm(32)));
        p.push(load("t", "a", "r".into(), Index::Imm(64)));
        let shapes = infer_memref_shapes(&p).unwrap();
        assert_eq!(shapes["a"], [32, 48]);
    }

    #[test]
    fn declared_shape_wins() {
        let mut p = LegacyProgram::new("k");
        p.memref("a", DType::F16, Some([64, 64])).unwrap();
        p.tile("t", DType::F16, 16, 16).unwrap();
        p.push(load("t", "a", Index::Imm(0), Index::Imm(0)));
        assert_eq!(infer_memref_shapes(&p).unwrap()["a"], [64, 64]);
    }

    #[test]
    fn runtime_offsets_only_fail() {
        let mut p = LegacyProgram::new("k");
        p.memref("a", DType::F16, None).unwrap();
        p.tile("t", DType::F16, 16, 16).unwrap();
        p.push(load("t", "a", "r".into(), Index::Imm(0)));
        assert_eq!(
            infer_memref_shapes(&p).unwrap_err(),
            CompileError::ShapeInference { memref: "a".into() }
        );
    }

    #[test]
    fn negative_offset_rejected() {
        let mut p = LegacyProgram::new("k");
        p.memref("a", DType::F16, None).unwrap();
        p.tile("t", DType::F16, 16, 16).unwrap();
        p.push(load("t", "a", Index::Imm(-1), Index::Imm(0)));
        assert!(matches!(
            infer_memref_shapes(&p),
            Err(CompileError::Config(_))
        ));
    }
}
