use tileasm_host::{HostSpec, HostTensorArg, Role};
use tileasm_ir::{CompileError, Result, TensorLayout};
use tileasm_parser::{FunctionDef, SourceUnit};

use crate::KernelSpec;

fn names(unit: &SourceUnit) -> String {
    unit.functions
        .iter()
        .map(|f| f.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Picks the function to compile.
///
/// With an explicit `name` exactly one function must carry it. Without one
/// the source must define exactly one function.
pub fn select_kernel<'a>(unit: &'a SourceUnit, name: Option<&str>) -> Result<&'a FunctionDef> {
    let selected = match name {
        Some(name) => {
            let mut matches = unit.functions.iter().filter(|f| f.name == name);
            match (matches.next(), matches.next()) {
                (Some(func), None) => func,
                (Some(_), Some(_)) => {
                    return Err(CompileError::Config(format!(
                        "ambiguous function '{name}': defined more than once"
                    )));
                }
                (None, _) => {
                    return Err(CompileError::Config(format!(
                        "function not found: {name} (available: {})",
                        names(unit)
                    )));
                }
            }
        }
        None => match unit.functions.as_slice() {
            [] => return Err(CompileError::Config("no kernel functions found".into())),
            [func] => func,
            _ => {
                return Err(CompileError::Config(format!(
                    "multiple kernel functions found ({}); choose one explicitly",
                    names(unit)
                )));
            }
        },
    };
    log::debug!("selected kernel function {} (line {})", selected.name, selected.line);
    Ok(selected)
}

/// Derives harness metadata from a compiled kernel.
///
/// Declared roles are kept and undeclared ones become `in`. When no argument
/// ends up writable the last one is made `out`.
pub fn default_host_spec(kernel: &KernelSpec) -> Result<HostSpec> {
    if kernel.tensor_args.is_empty() {
        return Err(CompileError::Config(format!(
            "kernel {} has no tensor arguments; cannot derive a host spec",
            kernel.name
        )));
    }

    let mut args: Vec<HostTensorArg> = kernel
        .tensor_args
        .iter()
        .map(|arg| {
            let ty = &arg.ty;
            let mut host = HostTensorArg::new(ty.dtype, ty.shape, arg.role.unwrap_or_default());
            host.layout = ty.layout.to_string();
            if ty.layout != TensorLayout::Nd || ty.stride.is_some() {
                host.stride = Some(ty.strides());
            }
            host
        })
        .collect();

    if !args.iter().any(|a| a.role.is_output()) {
        if let Some(last) = args.last_mut() {
            log::warn!(
                "kernel {} declares no output argument; treating the last one as out",
                kernel.name
            );
            last.role = Role::Out;
        }
    }

    Ok(HostSpec::new(kernel.name.clone(), args))
}
