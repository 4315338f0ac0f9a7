//! Host-side metadata for tile assembly modules.
//!
//! A [`HostSpec`] describes the kernel arguments a harness must allocate
//! (element type, shape, role, layout, optional stride) plus the launch
//! block count and PRNG seed. It travels inside the module text as a block
//! of `//` comment lines between fixed markers so a single `.pto` file can
//! drive both a reference run and a device run.

mod infer;
mod sidecar;

use serde::{Deserialize, Serialize};
use tileasm_ir::{DType, TensorLayout};

pub use infer::infer_host_spec;
pub use sidecar::{HOST_SPEC_BEGIN, HOST_SPEC_END, encode_host_spec, parse_host_spec, prepend_host_spec};

/// Data direction of a kernel argument.
#[derive(Clone, Copy, Debug, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    In,
    Out,
    Inout,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::In => "in",
            Self::Out => "out",
            Self::Inout => "inout",
        }
    }

    /// Whether the harness must read this argument back after the run.
    pub fn is_output(self) -> bool {
        matches!(self, Self::Out | Self::Inout)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = tileasm_ir::CompileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in" => Ok(Self::In),
            "out" => Ok(Self::Out),
            "inout" => Ok(Self::Inout),
            other => Err(tileasm_ir::CompileError::Config(format!(
                "role must be one of in, out, inout (got '{other}')"
            ))),
        }
    }
}

/// One kernel argument; position in [`HostSpec::args`] is the argument order.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct HostTensorArg {
    pub dtype: DType,
    pub shape: [u32; 2],
    #[serde(default)]
    pub role: Role,
    /// Layout tag as the harness spells it, `ND` unless stated.
    #[serde(default = "default_layout")]
    pub layout: String,
    /// `None` means a contiguous row-major buffer.
    #[serde(default)]
    pub stride: Option<[u32; 2]>,
}

impl HostTensorArg {
    pub fn new(dtype: DType, shape: [u32; 2], role: Role) -> Self {
        Self {
            dtype,
            shape,
            role,
            layout: default_layout(),
            stride: None,
        }
    }

    /// Size of the logical buffer in bytes.
    pub fn nbytes(&self) -> u64 {
        u64::from(self.shape[0]) * u64::from(self.shape[1]) * u64::from(self.dtype.size_bytes())
    }
}

fn default_layout() -> String {
    TensorLayout::Nd.to_string()
}

fn default_block_dim() -> u32 {
    1
}

fn default_kernel_name() -> String {
    DEFAULT_KERNEL_NAME.to_string()
}

/// Kernel name used when a sidecar omits one.
pub const DEFAULT_KERNEL_NAME: &str = "pto_kernel";

/// Harness metadata for one kernel.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct HostSpec {
    #[serde(default)]
    pub args: Vec<HostTensorArg>,
    #[serde(default)]
    pub seed: u64,
    #[serde(default = "default_block_dim")]
    pub block_dim: u32,
    #[serde(default = "default_kernel_name")]
    pub kernel_name: String,
}

impl HostSpec {
    pub fn new(kernel_name: impl Into<String>, args: Vec<HostTensorArg>) -> Self {
        Self {
            args,
            seed: 0,
            block_dim: 1,
            kernel_name: kernel_name.into(),
        }
    }

    /// Positions of `out`/`inout` arguments.
    pub fn output_indices(&self) -> Vec<usize> {
        self.args
            .iter()
            .enumerate()
            .filter(|(_, a)| a.role.is_output())
            .map(|(i, _)| i)
            .collect()
    }
}
