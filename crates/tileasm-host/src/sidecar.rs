//! Comment-delimited JSON sidecar.
//!
//! ```text
//! // PTO_HOST_SPEC_BEGIN v1
//! // {
//! //   "args": [ ... ],
//! //   "block_dim": 1,
//! //   "kernel_name": "add16",
//! //   "seed": 0
//! // }
//! // PTO_HOST_SPEC_END
//! ```

use tileasm_ir::{CompileError, Result};

use crate::HostSpec;

pub const HOST_SPEC_BEGIN: &str = "// PTO_HOST_SPEC_BEGIN v1";
pub const HOST_SPEC_END: &str = "// PTO_HOST_SPEC_END";

/// Renders `spec` as the sidecar block, keys sorted, ending with an empty line.
pub fn encode_host_spec(spec: &HostSpec) -> Result<String> {
    // Going through `Value` sorts object keys.
    let value = serde_json::to_value(spec)
        .map_err(|e| CompileError::HostSpec(format!("failed to serialize: {e}")))?;
    let body = serde_json::to_string_pretty(&value)
        .map_err(|e| CompileError::HostSpec(format!("failed to serialize: {e}")))?;

    let mut out = String::with_capacity(body.len() * 2);
    out.push_str(HOST_SPEC_BEGIN);
    out.push('\n');
    for line in body.lines() {
        out.push_str("// ");
        out.push_str(line);
        out.push('\n');
    }
    out.push_str(HOST_SPEC_END);
    out.push('\n');
    Ok(out)
}

/// Puts the sidecar in front of module text.
pub fn prepend_host_spec(module_text: &str, spec: &HostSpec) -> Result<String> {
    let mut out = encode_host_spec(spec)?;
    out.push_str(module_text.trim_start());
    Ok(out)
}

/// Extracts the first embedded sidecar; `Ok(None)` when there is none.
pub fn parse_host_spec(text: &str) -> Result<Option<HostSpec>> {
    let lines: Vec<&str> = text.lines().collect();
    let Some(begin) = lines.iter().position(|l| l.trim() == HOST_SPEC_BEGIN) else {
        return Ok(None);
    };
    let Some(end) = lines[begin + 1..]
        .iter()
        .position(|l| l.trim() == HOST_SPEC_END)
        .map(|i| begin + 1 + i)
    else {
        return Ok(None);
    };

    let payload: Vec<&str> = lines[begin + 1..end]
        .iter()
        .filter_map(|l| l.trim().strip_prefix("//"))
        .map(str::trim_start)
        .collect();
    let spec = serde_json::from_str(&payload.join("\n")).map_err(|e| {
        CompileError::HostSpec(format!("malformed host spec at line {}: {e}", begin + 1))
    })?;
    Ok(Some(spec))
}
