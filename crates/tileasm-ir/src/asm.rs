//! Flat, line-oriented tile assembly builder.
//!
//! Produces the compact form where operands carry their offsets inline:
//!
//! ```text
//! %x = pto.make_tensor_view %arg0, dtype=f16, shape=[16,16] strides=[16,1], layout=ND
//! %tx = pto.alloc_tile : !pto.tile_buf<...>
//! %tx = pto.tload %x[0, 0]
//! pto.tstore %z[0, 0], %tz
//! ```

use crate::{CompileError, Emitter, Result, TensorType, TileType};

/// Builder for the flat assembly form.
#[derive(Clone, Debug, Default)]
pub struct AsmProgram {
    text: Emitter,
}

fn require_ssa(what: &str, name: &str) -> Result<()> {
    if name.starts_with('%') {
        Ok(())
    } else {
        Err(CompileError::Symbol(format!("{what} must start with %: {name}")))
    }
}

impl AsmProgram {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `; ` comment lines, one per line of `text`.
    pub fn comment(&mut self, text: &str) -> &mut Self {
        for line in text.lines() {
            if line.is_empty() {
                self.text.line(";");
            } else {
                self.text.line(format!("; {line}"));
            }
        }
        self
    }

    pub fn line(&mut self, text: &str) -> &mut Self {
        self.text.line(text);
        self
    }

    pub fn prologue(&mut self) -> &mut Self {
        self.line("prologue")
    }

    pub fn epilogue(&mut self) -> &mut Self {
        self.line("epilogue")
    }

    /// Binds `view` to kernel argument `arg_index`.
    pub fn make_tensor_view(&mut self, view: &str, arg_index: u32, ty: &TensorType) -> Result<&mut Self> {
        require_ssa("view", view)?;
        let [s0, s1] = ty.strides();
        self.text.line(format!(
            "{view} = pto.make_tensor_view %arg{arg_index}, dtype={}, shape=[{},{}] strides=[{s0},{s1}], layout={}",
            ty.dtype, ty.shape[0], ty.shape[1], ty.layout
        ));
        Ok(self)
    }

    pub fn alloc_tile(&mut self, name: &str, ty: &TileType, addr: Option<&str>) -> Result<&mut Self> {
        require_ssa("tile name", name)?;
        match addr {
            Some(addr) => self.text.line(format!("{name} = pto.alloc_tile {addr} : {ty}")),
            None => self.text.line(format!("{name} = pto.alloc_tile : {ty}")),
        }
        Ok(self)
    }

    /// `%dst = pto.<opcode> operands [: typesig]`.
    pub fn assign<S: AsRef<str>>(
        &mut self,
        dst: &str,
        opcode: &str,
        operands: &[S],
        typesig: Option<&str>,
    ) -> Result<&mut Self> {
        require_ssa("dst", dst)?;
        let body = format!("{dst} = pto.{opcode} {}", join(operands));
        self.push_with_sig(body, typesig);
        Ok(self)
    }

    /// `pto.<opcode> operands [: typesig]`.
    pub fn op<S: AsRef<str>>(&mut self, opcode: &str, operands: &[S], typesig: Option<&str>) -> &mut Self {
        let body = format!("pto.{opcode} {}", join(operands));
        self.push_with_sig(body, typesig);
        self
    }

    fn push_with_sig(&mut self, body: String, typesig: Option<&str>) {
        let mut text = body.trim_end().to_string();
        if let Some(sig) = typesig {
            text.push_str(&format!(" : {sig}"));
        }
        self.text.line(text);
    }

    pub fn emit(&self) -> String {
        self.text.emit()
    }
}

fn join<S: AsRef<str>>(items: &[S]) -> String {
    items.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(", ")
}
