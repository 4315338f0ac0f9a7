//! Lowering of the legacy instruction-list IR.
//!
//! A [`LegacyProgram`] is a straight-line list of tile instructions over
//! named memory references and tiles. [`export_program`] turns it into the
//! flat tile assembly format, inferring missing memref shapes from literal
//! access offsets and splitting matmul tiles into per-role buffers.

mod lower;
mod model;
mod shape;

pub use lower::export_program;
pub use model::{Attr, Index, Instruction, LegacyProgram, MemRefDecl, Operand, TileDecl};
pub use shape::{ShapeMap, infer_memref_shapes};
