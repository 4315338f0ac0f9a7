//! The legacy program representation.
//!
//! Instructions are flat records naming tiles and memory references by
//! string; declarations live in separate tables on [`LegacyProgram`].

use std::fmt;

use tileasm_ir::{CompileError, DType, Result};

/// A row or column offset of a memory operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Index {
    /// A literal offset.
    Imm(i64),
    /// A runtime index value, by name.
    Var(String),
}

impl Index {
    pub fn as_imm(&self) -> Option<i64> {
        match self {
            Self::Imm(v) => Some(*v),
            Self::Var(_) => None,
        }
    }
}

impl From<i64> for Index {
    fn from(v: i64) -> Self {
        Self::Imm(v)
    }
}

impl From<&str> for Index {
    fn from(name: &str) -> Self {
        Self::Var(name.to_string())
    }
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Imm(v) => write!(f, "{v}"),
            Self::Var(name) => write!(f, "%{name}"),
        }
    }
}

/// A source operand of a generic instruction.
#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    Tile(String),
    MemRef(String),
    /// A scalar already defined as an SSA value.
    Scalar(String),
    Index(String),
    Imm(i64),
}

/// A non-operand field (mode flag, scalar immediate, ...).
#[derive(Clone, Debug, PartialEq)]
pub enum Attr {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl fmt::Display for Attr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v:?}"),
            Self::Str(v) => write!(f, "{v:?}"),
        }
    }
}

/// One legacy instruction.
#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    /// `dst <- src[row.., col..]`.
    Load {
        dst: String,
        src: String,
        row: Index,
        col: Index,
    },
    /// `dst[row.., col..] <- src`.
    Store {
        dst: String,
        src: String,
        row: Index,
        col: Index,
    },
    Mov {
        dst: String,
        src: String,
    },
    Matmul {
        dst: String,
        a: String,
        b: String,
    },
    MatmulAcc {
        dst: String,
        acc: String,
        a: String,
        b: String,
    },
    MatmulBias {
        dst: String,
        a: String,
        b: String,
        bias: String,
    },
    /// Any other destination-first tile instruction.
    Generic {
        mnemonic: String,
        dst: String,
        operands: Vec<Operand>,
        attrs: Vec<(String, Attr)>,
    },
}

impl Instruction {
    /// A generic instruction with plain operands only.
    pub fn generic(mnemonic: &str, dst: &str, operands: Vec<Operand>) -> Self {
        Self::Generic {
            mnemonic: mnemonic.to_string(),
            dst: dst.to_string(),
            operands,
            attrs: Vec::new(),
        }
    }

    /// `(a, b, dst, acc)` tile names of a matmul-family instruction.
    pub(crate) fn matmul_tiles(&self) -> Option<(&str, &str, &str, Option<&str>)> {
        match self {
            Self::Matmul { dst, a, b } | Self::MatmulBias { dst, a, b, .. } => {
                Some((a.as_str(), b.as_str(), dst.as_str(), None))
            }
            Self::MatmulAcc { dst, acc, a, b } => {
                Some((a.as_str(), b.as_str(), dst.as_str(), Some(acc.as_str())))
            }
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemRefDecl {
    pub name: String,
    pub dtype: DType,
    /// `None` when the shape is left to inference.
    pub shape: Option<[u32; 2]>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TileDecl {
    pub name: String,
    pub dtype: DType,
    pub rows: u32,
    pub cols: u32,
}

/// A straight-line legacy program.
///
/// Memory references become kernel arguments in declaration order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LegacyProgram {
    pub name: String,
    pub memrefs: Vec<MemRefDecl>,
    pub tiles: Vec<TileDecl>,
    pub instructions: Vec<Instruction>,
}

impl LegacyProgram {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Declares a memory reference.
    ///
    /// Repeating a declaration is allowed only with the same element type
    /// and shape; a missing shape may be filled in later.
    pub fn memref(&mut self, name: &str, dtype: DType, shape: Option<[u32; 2]>) -> Result<&mut Self> {
        match self.memrefs.iter().position(|m| m.name == name) {
            Some(i) => {
                let existing = &mut self.memrefs[i];
                if existing.dtype != dtype {
                    return Err(CompileError::Type(format!(
                        "memref {name} redeclared as {dtype}, previously {}",
                        existing.dtype
                    )));
                }
                match (existing.shape, shape) {
                    (Some(old), Some(new)) if old != new => {
                        return Err(CompileError::Type(format!(
                            "memref {name} redeclared with shape {}x{}, previously {}x{}",
                            new[0], new[1], old[0], old[1]
                        )));
                    }
                    (None, Some(new)) => existing.shape = Some(new),
                    _ => {}
                }
            }
            None => self.memrefs.push(MemRefDecl {
                name: name.to_string(),
                dtype,
                shape,
            }),
        }
        Ok(self)
    }

    /// Declares a tile buffer.
    pub fn tile(&mut self, name: &str, dtype: DType, rows: u32, cols: u32) -> Result<&mut Self> {
        let decl = TileDecl {
            name: name.to_string(),
            dtype,
            rows,
            cols,
        };
        if let Some(existing) = self.tiles.iter().find(|t| t.name == name) {
            if *existing != decl {
                return Err(CompileError::Type(format!(
                    "tile {name} redeclared as {dtype} {rows}x{cols}, previously {} {}x{}",
                    existing.dtype, existing.rows, existing.cols
                )));
            }
            return Ok(self);
        }
        self.tiles.push(decl);
        Ok(self)
    }

    pub fn push(&mut self, instruction: Instruction) -> &mut Self {
        self.instructions.push(instruction);
        self
    }

    pub fn tile_decl(&self, name: &str) -> Result<&TileDecl> {
        self.tiles
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| CompileError::Symbol(format!("unknown tile {name}")))
    }

    pub fn memref_decl(&self, name: &str) -> Result<&MemRefDecl> {
        self.memrefs
            .iter()
            .find(|m| m.name == name)
            .ok_or_else(|| CompileError::Symbol(format!("unknown memref {name}")))
    }
}
