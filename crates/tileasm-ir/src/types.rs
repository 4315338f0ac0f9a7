//! Type registry: off-chip tensor views and on-chip tile buffers.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CompileError;

/// Element type of a tensor or tile.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    F16,
    Bf16,
    F32,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
}

impl DType {
    /// Size of one element in bytes.
    pub fn size_bytes(self) -> u32 {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::F16 | Self::Bf16 | Self::I16 | Self::U16 => 2,
            Self::F32 | Self::I32 | Self::U32 => 4,
            Self::I64 | Self::U64 => 8,
        }
    }

    /// Canonical lowercase spelling (`f16`, `bf16`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::F16 => "f16",
            Self::Bf16 => "bf16",
            Self::F32 => "f32",
            Self::I8 => "i8",
            Self::U8 => "u8",
            Self::I16 => "i16",
            Self::U16 => "u16",
            Self::I32 => "i32",
            Self::U32 => "u32",
            Self::I64 => "i64",
            Self::U64 => "u64",
        }
    }
}

impl FromStr for DType {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "f16" => Self::F16,
            "bf16" => Self::Bf16,
            "f32" => Self::F32,
            "i8" => Self::I8,
            "u8" => Self::U8,
            "i16" => Self::I16,
            "u16" => Self::U16,
            "i32" => Self::I32,
            "u32" => Self::U32,
            "i64" => Self::I64,
            "u64" => Self::U64,
            other => return Err(CompileError::Config(format!("unknown dtype '{other}'"))),
        })
    }
}

/// Physical arrangement of an off-chip tensor.
#[derive(Clone, Copy, Debug, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TensorLayout {
    /// Row-major canonical layout.
    #[default]
    Nd,
    /// Physically transposed (column-major) layout.
    Dn,
    /// Fractal/packed layout.
    Nz,
}

impl FromStr for TensorLayout {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ND" => Ok(Self::Nd),
            "DN" => Ok(Self::Dn),
            "NZ" => Ok(Self::Nz),
            other => Err(CompileError::Config(format!(
                "unknown tensor layout '{other}' (expected ND, DN or NZ)"
            ))),
        }
    }
}

/// An off-chip tensor view: element type, 2-D shape, optional stride and layout.
///
/// Identity is structural; two declarations of the same argument slot must
/// compare equal.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct TensorType {
    pub dtype: DType,
    /// `[rows, cols]`.
    pub shape: [u32; 2],
    /// Explicit stride; `None` means row-major contiguous.
    pub stride: Option<[u32; 2]>,
    pub layout: TensorLayout,
}

impl TensorType {
    /// A row-major contiguous tensor of the given shape.
    pub fn new(dtype: DType, shape: [u32; 2]) -> Self {
        Self {
            dtype,
            shape,
            stride: None,
            layout: TensorLayout::Nd,
        }
    }

    pub fn with_stride(mut self, stride: [u32; 2]) -> Self {
        self.stride = Some(stride);
        self
    }

    pub fn with_layout(mut self, layout: TensorLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn rows(&self) -> u32 {
        self.shape[0]
    }

    pub fn cols(&self) -> u32 {
        self.shape[1]
    }

    /// The effective stride: the explicit one, or `(cols, 1)`.
    pub fn strides(&self) -> [u32; 2] {
        self.stride.unwrap_or([self.shape[1], 1])
    }
}

/// On-chip buffer class.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum Location {
    /// Vector unit buffer.
    Vec,
    /// Matrix staging buffer.
    Mat,
    /// Matmul left operand buffer.
    Left,
    /// Matmul right operand buffer.
    Right,
    /// Matmul accumulator.
    Acc,
}

impl Location {
    /// Address-space tag used in the rendered tile type.
    pub fn address_space(self) -> &'static str {
        match self {
            Self::Vec => "ub",
            Self::Mat => "mat",
            Self::Left => "left",
            Self::Right => "right",
            Self::Acc => "acc",
        }
    }

    /// Default alignment granularity for this location.
    pub fn default_fractal(self) -> u32 {
        match self {
            Self::Acc => 1024,
            _ => 512,
        }
    }

    /// Block and storage layout a matmul pipeline expects for this location.
    pub fn default_layouts(self) -> (BLayout, SLayout) {
        match self {
            Self::Vec => (BLayout::RowMajor, SLayout::NoneBox),
            Self::Mat => (BLayout::ColMajor, SLayout::RowMajor),
            Self::Left => (BLayout::RowMajor, SLayout::RowMajor),
            Self::Right => (BLayout::RowMajor, SLayout::ColMajor),
            Self::Acc => (BLayout::ColMajor, SLayout::RowMajor),
        }
    }
}

impl FromStr for Location {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Vec" | "UB" | "vec" | "ub" => Ok(Self::Vec),
            "Mat" | "mat" => Ok(Self::Mat),
            "Left" | "left" => Ok(Self::Left),
            "Right" | "right" => Ok(Self::Right),
            "Acc" | "acc" => Ok(Self::Acc),
            other => Err(CompileError::Config(format!(
                "unknown tile location '{other}' (expected Vec, Mat, Left, Right or Acc)"
            ))),
        }
    }
}

/// Block layout of a tile.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum BLayout {
    RowMajor,
    ColMajor,
}

impl BLayout {
    pub fn spelling(self) -> &'static str {
        match self {
            Self::RowMajor => "row_major",
            Self::ColMajor => "col_major",
        }
    }
}

impl FromStr for BLayout {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RowMajor" | "row_major" => Ok(Self::RowMajor),
            "ColMajor" | "col_major" => Ok(Self::ColMajor),
            other => Err(CompileError::Config(format!("unknown blayout '{other}'"))),
        }
    }
}

/// Storage (fractal box) layout of a tile.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum SLayout {
    NoneBox,
    RowMajor,
    ColMajor,
}

impl SLayout {
    pub fn spelling(self) -> &'static str {
        match self {
            Self::NoneBox => "none_box",
            Self::RowMajor => "row_major",
            Self::ColMajor => "col_major",
        }
    }
}

impl FromStr for SLayout {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NoneBox" | "none_box" => Ok(Self::NoneBox),
            "RowMajor" | "row_major" => Ok(Self::RowMajor),
            "ColMajor" | "col_major" => Ok(Self::ColMajor),
            other => Err(CompileError::Config(format!("unknown slayout '{other}'"))),
        }
    }
}

/// Padding policy for the invalid region of a tile.
#[derive(Clone, Copy, Debug, Default, Hash, Eq, PartialEq)]
pub enum Pad {
    #[default]
    Null,
    Zero,
    Max,
    Min,
}

impl Pad {
    /// Integer code expected by the tile type parser.
    pub fn code(self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Zero => 1,
            Self::Max => 2,
            Self::Min => 3,
        }
    }

    pub fn from_code(code: i64) -> Result<Self, CompileError> {
        match code {
            0 => Ok(Self::Null),
            1 => Ok(Self::Zero),
            2 => Ok(Self::Max),
            3 => Ok(Self::Min),
            other => Err(CompileError::Config(format!(
                "pad code {other} out of range (expected 0..=3)"
            ))),
        }
    }
}

impl FromStr for Pad {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Null" | "null" => Ok(Self::Null),
            "Zero" | "zero" => Ok(Self::Zero),
            "Max" | "max" => Ok(Self::Max),
            "Min" | "min" => Ok(Self::Min),
            other => Err(CompileError::Config(format!("unknown pad policy '{other}'"))),
        }
    }
}

/// The valid (meaningful) region of a tile.
///
/// A static sub-shape and runtime-determined dimensions are mutually
/// exclusive, which the enum encodes directly.
#[derive(Clone, Copy, Debug, Default, Hash, Eq, PartialEq)]
pub enum ValidShape {
    /// The whole allocation is valid.
    #[default]
    Full,
    /// A fixed sub-shape.
    Static { rows: u32, cols: u32 },
    /// Dimensions flagged `true` are supplied at runtime by an index value.
    Dynamic { rows: bool, cols: bool },
}

/// An on-chip tile buffer.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct TileType {
    pub loc: Location,
    pub dtype: DType,
    pub rows: u32,
    pub cols: u32,
    pub valid: ValidShape,
    pub blayout: BLayout,
    pub slayout: SLayout,
    /// Alignment granularity; `None` uses the location default.
    pub fractal: Option<u32>,
    pub pad: Pad,
}

impl TileType {
    /// A tile with row-major blocks and no storage boxing.
    pub fn new(loc: Location, dtype: DType, rows: u32, cols: u32) -> Self {
        Self {
            loc,
            dtype,
            rows,
            cols,
            valid: ValidShape::Full,
            blayout: BLayout::RowMajor,
            slayout: SLayout::NoneBox,
            fractal: None,
            pad: Pad::Null,
        }
    }

    /// A tile using the layouts [`Location::default_layouts`] picks for `loc`.
    pub fn for_location(loc: Location, dtype: DType, rows: u32, cols: u32) -> Self {
        let (blayout, slayout) = loc.default_layouts();
        Self {
            blayout,
            slayout,
            ..Self::new(loc, dtype, rows, cols)
        }
    }

    pub fn shape(&self) -> [u32; 2] {
        [self.rows, self.cols]
    }

    pub fn fractal_size(&self) -> u32 {
        self.fractal.unwrap_or_else(|| self.loc.default_fractal())
    }
}

/// Type of a materialized tensor view (5-D `1x1x1xRxC` convention).
pub fn tensor_view_type(dtype: DType) -> String {
    format!("!pto.tensor_view<5x{dtype}>")
}

/// Type of a subview sized to a tile.
pub fn tile_view_type(rows: u32, cols: u32, dtype: DType) -> String {
    format!("!pto.tile_view<1x1x1x{rows}x{cols}x{dtype}>")
}
