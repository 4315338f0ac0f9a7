//! Structured text builder and the module wrapper.

use crate::{CompileError, DType, Result};

/// Device attribute written into the module header unless overridden.
pub const DEFAULT_DEVICE_SPEC: &str = "Ascend910B1";

/// Line accumulator with an indentation stack for structured regions.
#[derive(Clone, Debug, Default)]
pub struct Emitter {
    lines: Vec<String>,
    depth: usize,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one line at the current depth.
    pub fn line(&mut self, text: impl AsRef<str>) {
        let text = text.as_ref();
        self.lines.push(format!("{}{text}", "  ".repeat(self.depth)));
    }

    /// Emits `header {` and enters a nested region.
    pub fn open(&mut self, header: impl AsRef<str>) {
        self.line(format!("{} {{", header.as_ref()));
        self.depth += 1;
    }

    /// Emits `} else {` continuing the innermost region.
    pub fn else_open(&mut self) -> Result<()> {
        if self.depth == 0 {
            return Err(CompileError::Symbol("else without open block".into()));
        }
        self.depth -= 1;
        self.line("} else {");
        self.depth += 1;
        Ok(())
    }

    /// Emits `}` and leaves the innermost region.
    pub fn close(&mut self) -> Result<()> {
        if self.depth == 0 {
            return Err(CompileError::Symbol("unbalanced close()".into()));
        }
        self.depth -= 1;
        self.line("}");
        Ok(())
    }

    /// Number of regions currently open.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Inserts the lines of `head` before everything emitted so far.
    pub fn prepend(&mut self, head: &Emitter) {
        self.lines.splice(0..0, head.lines.iter().cloned());
    }

    /// Joins every line; the result always ends with a single newline.
    pub fn emit(&self) -> String {
        let mut text = self.lines.join("\n").trim().to_string();
        text.push('\n');
        text
    }
}

/// One entry of a kernel function signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FuncParam {
    /// The implicit task identifier, always slot 0.
    TaskId,
    /// A tensor argument pointer.
    Tensor { slot: u32, dtype: DType },
}

impl FuncParam {
    pub fn slot(self) -> u32 {
        match self {
            Self::TaskId => 0,
            Self::Tensor { slot, .. } => slot,
        }
    }

    fn render(self) -> String {
        match self {
            Self::TaskId => "%arg0: index".into(),
            Self::Tensor { slot, dtype } => format!("%arg{slot}: !pto.ptr<{dtype}>"),
        }
    }
}

/// Name and parameters of the single function in a module.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FuncSignature {
    pub name: String,
    pub params: Vec<FuncParam>,
}

/// Wraps a finished body in the module and function envelope.
///
/// Parameters are rendered in ascending slot order. The body must have no
/// open regions left.
pub fn wrap_module(device_spec: &str, signature: &FuncSignature, body: &Emitter) -> Result<String> {
    if body.depth() != 0 {
        return Err(CompileError::Symbol(format!(
            "unterminated block at end of function @{} ({} region(s) still open)",
            signature.name,
            body.depth()
        )));
    }

    let mut params = signature.params.clone();
    params.sort_by_key(|p| p.slot());
    let params: Vec<String> = params.into_iter().map(FuncParam::render).collect();

    let mut out = String::new();
    out.push_str(&format!(
        "module attributes {{\"pto.device-spec\" = \"{device_spec}\"}} {{\n"
    ));
    out.push_str(&format!(
        "  func.func @{}({}) {{\n",
        signature.name,
        params.join(", ")
    ));
    if !body.is_empty() {
        for line in body.emit().lines() {
            if line.is_empty() {
                out.push('\n');
            } else {
                out.push_str(&format!("    {line}\n"));
            }
        }
    }
    out.push_str("    return\n");
    out.push_str("  }\n");
    out.push_str("}\n");
    Ok(out)
}
