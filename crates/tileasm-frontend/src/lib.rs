//! Surface compiler for tileasm kernels.
//!
//! Takes kernel source (see `tileasm-parser`), selects one function and
//! translates it statement by statement into a tile assembly module. The
//! pipeline per function binds symbols and constants, folds compile-time
//! expressions, expands each operation into primitive instructions
//! (legalization) and finally wraps the body in the module envelope.
//!
//! ```text
//! source ──parse──▶ SourceUnit ──select──▶ FunctionDef ──compile──▶ KernelSpec
//!                                                                     │
//!                                          default_host_spec ◀────────┘
//! ```

mod compiler;
mod env;
mod eval;
mod kernel;
mod legalize;
mod opcodes;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use tileasm_host::Role;
use tileasm_ir::{DEFAULT_DEVICE_SPEC, Result, TensorType};
use tileasm_parser::FunctionDef;

pub use kernel::{default_host_spec, select_kernel};

/// A compile-time constant supplied from outside the kernel source.
#[derive(Clone, Debug, PartialEq)]
pub enum ConstValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v:?}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Str(v) => f.write_str(v),
        }
    }
}

/// Command-line style parsing: booleans, then integers, then floats;
/// anything else is kept as a string.
impl FromStr for ConstValue {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        Ok(match s {
            "true" | "True" => Self::Bool(true),
            "false" | "False" => Self::Bool(false),
            _ => {
                if let Ok(v) = s.parse::<i64>() {
                    Self::Int(v)
                } else if let Ok(v) = s.parse::<f64>() {
                    Self::Float(v)
                } else {
                    Self::Str(s.to_string())
                }
            }
        })
    }
}

impl From<i64> for ConstValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for ConstValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for ConstValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for ConstValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for ConstValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

/// Options for [`compile_kernel`].
#[derive(Clone, Debug)]
pub struct CompileOptions {
    /// Function to compile; required when the source holds several.
    pub kernel: Option<String>,
    /// Names visible to the kernel as compile-time constants.
    pub consts: BTreeMap<String, ConstValue>,
    /// Written into the module's `pto.device-spec` attribute.
    pub device_spec: String,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            kernel: None,
            consts: BTreeMap::new(),
            device_spec: DEFAULT_DEVICE_SPEC.to_string(),
        }
    }
}

impl CompileOptions {
    pub fn with_kernel(mut self, name: impl Into<String>) -> Self {
        self.kernel = Some(name.into());
        self
    }

    pub fn with_const(mut self, name: impl Into<String>, value: impl Into<ConstValue>) -> Self {
        self.consts.insert(name.into(), value.into());
        self
    }

    pub fn with_device_spec(mut self, spec: impl Into<String>) -> Self {
        self.device_spec = spec.into();
        self
    }
}

/// A tensor argument of a compiled kernel.
#[derive(Clone, Debug, PartialEq)]
pub struct TensorArg {
    /// Surface name the argument was declared under.
    pub name: String,
    /// Position in the function signature (`%argN`).
    pub slot: u32,
    pub ty: TensorType,
    /// `None` when the source never stated a role.
    pub role: Option<Role>,
}

/// Result of compiling one kernel.
#[derive(Clone, Debug, PartialEq)]
pub struct KernelSpec {
    pub name: String,
    /// Complete tile assembly module text.
    pub text: String,
    /// Tensor arguments in ascending slot order.
    pub tensor_args: Vec<TensorArg>,
}

/// Parses `source`, selects a kernel and compiles it.
pub fn compile_kernel(source: &str, options: &CompileOptions) -> Result<KernelSpec> {
    let unit = tileasm_parser::parse(source)?;
    let func = select_kernel(&unit, options.kernel.as_deref())?;
    compile_function(func, options)
}

/// Compiles an already parsed function.
pub fn compile_function(func: &FunctionDef, options: &CompileOptions) -> Result<KernelSpec> {
    log::info!("compiling kernel function {}", func.name);
    compiler::FunctionCompiler::new(options)?.compile(func)
}
