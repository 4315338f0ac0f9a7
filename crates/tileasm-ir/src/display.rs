//! Textual rendering of registry types.

use std::fmt;

use crate::types::{DType, Location, TensorLayout, TensorType, TileType, ValidShape};

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for TensorLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Nd => "ND",
            Self::Dn => "DN",
            Self::Nz => "NZ",
        })
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Vec => "Vec",
            Self::Mat => "Mat",
            Self::Left => "Left",
            Self::Right => "Right",
            Self::Acc => "Acc",
        })
    }
}

/// Debug-style summary; not tile assembly syntax.
impl fmt::Display for TensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [s0, s1] = self.strides();
        write!(
            f,
            "TensorType(dtype={}, shape=({},{}), stride=({s0},{s1}), layout={})",
            self.dtype, self.shape[0], self.shape[1], self.layout
        )
    }
}

/// Tile buffer type as the downstream parser expects it.
impl fmt::Display for TileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (v_row, v_col) = match self.valid {
            ValidShape::Full => (self.rows.to_string(), self.cols.to_string()),
            ValidShape::Static { rows, cols } => (rows.to_string(), cols.to_string()),
            ValidShape::Dynamic { rows, cols } => (
                if rows { "?".into() } else { self.rows.to_string() },
                if cols { "?".into() } else { self.cols.to_string() },
            ),
        };
        write!(
            f,
            "!pto.tile_buf<loc={}, dtype={}, rows={}, cols={}, v_row={v_row}, v_col={v_col}, \
             blayout={}, slayout={}, fractal={}, pad={}>",
            self.loc.address_space(),
            self.dtype,
            self.rows,
            self.cols,
            self.blayout.spelling(),
            self.slayout.spelling(),
            self.fractal_size(),
            self.pad.code(),
        )
    }
}

#[cfg(test)]
mod tests {
    use crate::types::{BLayout, Pad, SLayout, tensor_view_type, tile_view_type};

    use super::*;

    #[test]
    fn vec_tile_rendering() {
        let t = TileType::new(Location::Vec, DType::F16, 16, 16);
        assert_eq!(
            t.to_string(),
            "!pto.tile_buf<loc=ub, dtype=f16, rows=16, cols=16, v_row=16, v_col=16, \
             blayout=row_major, slayout=none_box, fractal=512, pad=0>"
        );
    }

    #[test]
    fn acc_tile_rendering_with_valid_shape() {
        let mut t = TileType::new(Location::Acc, DType::F32, 32, 32);
        t.valid = ValidShape::Static { rows: 16, cols: 8 };
        t.blayout = BLayout::ColMajor;
        t.slayout = SLayout::RowMajor;
        t.pad = Pad::Min;
        let s = t.to_string();
        assert!(s.contains("loc=acc"));
        assert!(s.contains("v_row=16, v_col=8"));
        assert!(s.contains("blayout=col_major, slayout=row_major"));
        assert!(s.contains("fractal=1024, pad=3"));
    }

    #[test]
    fn dynamic_valid_dims_render_as_wildcards() {
        let mut t = TileType::new(Location::Vec, DType::F32, 16, 64);
        t.valid = ValidShape::Dynamic {
            rows: false,
            cols: true,
        };
        assert!(t.to_string().contains("v_row=16, v_col=?"));
    }

    #[test]
    fn view_types() {
        assert_eq!(tensor_view_type(DType::F16), "!pto.tensor_view<5xf16>");
        assert_eq!(
            tile_view_type(16, 32, DType::F32),
            "!pto.tile_view<1x1x1x16x32xf32>"
        );
    }

    #[test]
    fn tensor_type_summary() {
        let t = TensorType::new(DType::F16, [4, 8]);
        assert_eq!(
            t.to_string(),
            "TensorType(dtype=f16, shape=(4,8), stride=(8,1), layout=ND)"
        );
    }
}
