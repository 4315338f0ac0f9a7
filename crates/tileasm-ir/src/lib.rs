//! tileasm intermediate representation support.
//!
//! Holds the pieces every other tileasm crate shares: the tile/tensor type
//! registry ([`TensorType`], [`TileType`]), the single [`CompileError`] type,
//! and the text emitters that produce tile assembly ([`Emitter`] for
//! structured module bodies, [`AsmProgram`] for the flat line format).

mod asm;
mod display;
mod emitter;
mod error;
mod types;

pub use asm::AsmProgram;
pub use emitter::{DEFAULT_DEVICE_SPEC, Emitter, FuncParam, FuncSignature, wrap_module};
pub use error::{CompileError, Result};
pub use types::{
    BLayout, DType, Location, Pad, SLayout, TensorLayout, TensorType, TileType, ValidShape,
    tensor_view_type, tile_view_type,
};
