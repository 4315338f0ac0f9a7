//! Best-effort host spec recovery from module text without a sidecar.

use std::collections::BTreeMap;

use regex::Regex;
use tileasm_ir::{CompileError, DType, Result};

use crate::{HostSpec, HostTensorArg, Role};

const CONST_PATTERN: &str =
    r"^(%[A-Za-z_][A-Za-z0-9_]*)\s*=\s*arith\.constant\s+(-?\d+)\s*:\s*index$";

const VIEW_PATTERN: &str = concat!(
    r"^(%[A-Za-z_][A-Za-z0-9_]*)\s*=\s*pto\.make_tensor_view\s+%arg(\d+)\s*,\s*",
    r"shape\s*=\s*\[(.*?)\]\s*",
    r"strides\s*=\s*\[(.*?)\]\s*:\s*",
    r"!pto\.tensor_view<(\d+)x([^>]+)>$",
);

fn failure(message: impl std::fmt::Display) -> CompileError {
    CompileError::HostSpec(format!("failed to infer host args: {message}"))
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(failure)
}

fn split_operands(list: &str) -> Vec<&str> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Resolves one shape/stride operand to a non-negative constant.
fn resolve(operand: &str, consts: &BTreeMap<String, i64>, view: &str) -> Result<u32> {
    let value = match consts.get(operand) {
        Some(&v) => v,
        None => operand.parse::<i64>().map_err(|_| {
            failure(format!(
                "operand {operand} of {view} is not traceable to an index constant"
            ))
        })?,
    };
    u32::try_from(value).map_err(|_| failure(format!("operand {operand} of {view} is {value}")))
}

/// Reconstructs a [`HostSpec`] from `pto.make_tensor_view` lines.
///
/// Rank-2 views carry shape and stride directly. Rank-5 views follow the
/// `1x1x1xRxC` convention: the three leading dimensions must be 1 and only
/// the last two are used. The highest argument becomes `out`, the rest `in`.
pub fn infer_host_spec(text: &str) -> Result<HostSpec> {
    let const_re = compile(CONST_PATTERN)?;
    let view_re = compile(VIEW_PATTERN)?;

    let mut consts = BTreeMap::new();
    for line in text.lines() {
        if let Some(caps) = const_re.captures(line.trim()) {
            if let Ok(v) = caps[2].parse::<i64>() {
                consts.insert(caps[1].to_string(), v);
            }
        }
    }

    let mut found: BTreeMap<u32, HostTensorArg> = BTreeMap::new();
    for line in text.lines() {
        let Some(caps) = view_re.captures(line.trim()) else {
            continue;
        };
        let view = &caps[1];
        let index: u32 = caps[2]
            .parse()
            .map_err(|_| failure(format!("bad argument index in {view}")))?;
        let shape_ops = split_operands(&caps[3]);
        let stride_ops = split_operands(&caps[4]);
        let rank: usize = caps[5]
            .parse()
            .map_err(|_| failure(format!("bad rank in {view}")))?;
        let dtype: DType = caps[6].trim().parse().map_err(failure)?;

        if shape_ops.len() != rank || stride_ops.len() != rank {
            return Err(failure(format!(
                "{view}: shape/stride operand count does not match tensor_view rank {rank}"
            )));
        }
        let lead = match rank {
            2 => 0,
            5 => 3,
            other => {
                return Err(failure(format!(
                    "{view}: unsupported tensor_view rank {other}"
                )));
            }
        };
        for op in shape_ops[..lead].iter().chain(&stride_ops[..lead]) {
            if resolve(op, &consts, view)? != 1 {
                return Err(failure(format!(
                    "{view}: leading dimension {op} of a rank-5 view must be 1"
                )));
            }
        }

        let h = resolve(shape_ops[lead], &consts, view)?;
        let w = resolve(shape_ops[lead + 1], &consts, view)?;
        let s0 = resolve(stride_ops[lead], &consts, view)?;
        let s1 = resolve(stride_ops[lead + 1], &consts, view)?;
        let mut arg = HostTensorArg::new(dtype, [h, w], Role::In);
        if [s0, s1] != [w, 1] {
            arg.stride = Some([s0, s1]);
        }
        found.insert(index, arg);
    }

    if found.is_empty() {
        return Err(failure("no pto.make_tensor_view %argN found"));
    }
    let mut args: Vec<HostTensorArg> = found.into_values().collect();
    if let Some(last) = args.last_mut() {
        last.role = Role::Out;
    }
    log::debug!("inferred {} host argument(s)", args.len());
    Ok(HostSpec::new(crate::DEFAULT_KERNEL_NAME, args))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODULE: &str = r#"module attributes {"pto.device-spec" = "Ascend910B1"} {
  func.func @add16(%arg0: !pto.ptr<f16>, %arg1: !pto.ptr<f16>) {
    %c1 = arith.constant 1 : index
    %c16 = arith.constant 16 : index
    %c32 = arith.constant 32 : index
    %x = pto.make_tensor_view %arg0, shape = [%c1, %c1, %c1, %c16, %c16] strides = [%c1, %c1, %c1, %c16, %c1] : !pto.tensor_view<5xf16>
    %z = pto.make_tensor_view %arg1, shape = [%c1, %c1, %c1, %c16, %c16] strides = [%c1, %c1, %c1, %c32, %c1] : !pto.tensor_view<5xf16>
    return
  }
}
"#;

    #[test]
    fn rank_five_views() {
        let spec = infer_host_spec(MODULE).unwrap();
        assert_eq!(spec.kernel_name, "pto_kernel");
        assert_eq!(spec.args.len(), 2);
        assert_eq!(spec.args[0].shape, [16, 16]);
        assert_eq!(spec.args[0].stride, None);
        assert_eq!(spec.args[0].role, Role::In);
        assert_eq!(spec.args[1].stride, Some([32, 1]));
        assert_eq!(spec.args[1].role, Role::Out);
    }

    #[test]
    fn rank_two_with_literal_operands() {
        let text = "%c8 = arith.constant 8 : index\n\
                    %a = pto.make_tensor_view %arg0, shape=[4, %c8] strides=[%c8, 1] : !pto.tensor_view<2xf32>\n";
        let spec = infer_host_spec(text).unwrap();
        assert_eq!(spec.args[0].shape, [4, 8]);
        assert_eq!(spec.args[0].dtype, DType::F32);
        assert_eq!(spec.args[0].role, Role::Out);
    }

    #[test]
    fn untraceable_operand_fails() {
        let text = "%a = pto.make_tensor_view %arg0, shape=[%n, %c8] strides=[%c8, 1] : !pto.tensor_view<2xf32>\n";
        let err = infer_host_spec(text).unwrap_err();
        assert!(err.to_string().contains("%n"), "{err}");
    }

    #[test]
    fn no_views_fails() {
        assert!(infer_host_spec("module {}\n").is_err());
    }

    #[test]
    fn leading_dims_must_be_one() {
        let text = "%c2 = arith.constant 2 : index\n\
                    %c1 = arith.constant 1 : index\n\
                    %x = pto.make_tensor_view %arg0, shape = [%c2, %c1, %c1, %c1, %c1] strides = [%c1, %c1, %c1, %c1, %c1] : !pto.tensor_view<5xf16>\n";
        assert!(infer_host_spec(text).is_err());
    }
}
