//! Description of the downstream assembler invocation.
//!
//! The compiler never runs the assembler itself; it only knows how the
//! command line and the generated-source preamble look for a given
//! configuration.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tileasm_ir::CompileError;

/// Memory model preset the assembler's device headers are built for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MemoryModel {
    #[default]
    MemoryBase,
    RegisterBase,
}

impl MemoryModel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MemoryBase => "MEMORY_BASE",
            Self::RegisterBase => "REGISTER_BASE",
        }
    }
}

impl fmt::Display for MemoryModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryModel {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MEMORY_BASE" => Ok(Self::MemoryBase),
            "REGISTER_BASE" => Ok(Self::RegisterBase),
            other => Err(CompileError::Config(format!(
                "unsupported memory model '{other}' (expected MEMORY_BASE or REGISTER_BASE)"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolchainConfig {
    pub memory_model: MemoryModel,
    pub enable_insert_sync: bool,
    /// Assembler executable.
    pub tool: PathBuf,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            memory_model: MemoryModel::default(),
            enable_insert_sync: true,
            tool: PathBuf::from("ptoas"),
        }
    }
}

impl ToolchainConfig {
    /// Argument vector turning `module` into generated source at `output`.
    pub fn command(&self, module: &Path, output: &Path) -> Vec<String> {
        let mut args = vec![self.tool.display().to_string()];
        if self.enable_insert_sync {
            args.push("--enable-insert-sync".into());
        }
        args.push("-o".into());
        args.push(output.display().to_string());
        args.push(module.display().to_string());
        args
    }

    /// Lines the generated source needs ahead of its first include.
    pub fn source_preamble(&self) -> Vec<String> {
        vec![
            "#if defined(__CCE__)".into(),
            format!("#define {}", self.memory_model),
            "#endif".into(),
            "#include \"kernel_operator.h\"".into(),
            "#include <cstdint>".into(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_model_selector() {
        assert_eq!("REGISTER_BASE".parse::<MemoryModel>().unwrap(), MemoryModel::RegisterBase);
        let err = "FLAT".parse::<MemoryModel>().unwrap_err();
        assert!(matches!(err, CompileError::Config(ref m) if m.contains("'FLAT'")));
    }

    #[test]
    fn command_line() {
        let cfg = ToolchainConfig::default();
        assert_eq!(
            cfg.command(Path::new("k.pto"), Path::new("k.cpp")),
            ["ptoas", "--enable-insert-sync", "-o", "k.cpp", "k.pto"]
        );
        let cfg = ToolchainConfig {
            enable_insert_sync: false,
            tool: PathBuf::from("bin/ptoas"),
            ..cfg
        };
        assert_eq!(
            cfg.command(Path::new("k.pto"), Path::new("k.cpp")).join(" "),
            "bin/ptoas -o k.cpp k.pto"
        );
    }

    #[test]
    fn preamble_defines_memory_model() {
        let cfg = ToolchainConfig {
            memory_model: MemoryModel::RegisterBase,
            ..ToolchainConfig::default()
        };
        assert_eq!(cfg.source_preamble()[1], "#define REGISTER_BASE");
    }
}
