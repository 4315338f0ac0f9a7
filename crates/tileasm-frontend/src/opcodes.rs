//! Static opcode table.
//!
//! Operation names are resolved in two steps: the alias table first, then the
//! canonical set (builtins plus tile ISA mnemonics). A name `X` also resolves
//! to `tX` when `tX` is an ISA mnemonic. Anything else is an error.

use tileasm_ir::{CompileError, Result};

/// A resolved operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Opcode {
    Load,
    Store,
    Mov,
    Matmul,
    MatmulAcc,
    Push,
    Print,
    RecordEvent,
    WaitEvent,
    Sync,
    TaskId,
    BlockIdx,
    BlockNum,
    Prologue,
    Epilogue,
    Program,
    Comment,
    KernelName,
    /// Explicit address assignment; superseded by `addr=` on tile declarations.
    Assign,
    /// Any other tile ISA instruction, emitted destination-first.
    Generic(&'static str),
}

impl Opcode {
    /// Mnemonic as written in the emitted instruction (without `pto.`).
    pub(crate) fn mnemonic(self) -> &'static str {
        match self {
            Self::Load => "tload",
            Self::Store => "tstore",
            Self::Mov => "tmov",
            Self::Matmul => "tmatmul",
            Self::MatmulAcc => "tmatmul.acc",
            Self::Push => "tpush",
            Self::Print => "tprint",
            Self::RecordEvent => "record_event",
            Self::WaitEvent => "wait_event",
            Self::Sync => "tsync",
            Self::TaskId => "get_task_id",
            Self::BlockIdx => "get_block_idx",
            Self::BlockNum => "get_block_num",
            Self::Prologue => "prologue",
            Self::Epilogue => "epilogue",
            Self::Program => "program",
            Self::Comment => "comment",
            Self::KernelName => "kernel",
            Self::Assign => "tassign",
            Self::Generic(m) => m,
        }
    }

    /// Operations that never produce a value.
    pub(crate) fn is_statement_only(self) -> bool {
        matches!(
            self,
            Self::Store
                | Self::Push
                | Self::Print
                | Self::RecordEvent
                | Self::WaitEvent
                | Self::Sync
                | Self::Prologue
                | Self::Epilogue
                | Self::Program
                | Self::Comment
                | Self::KernelName
        )
    }
}

const ALIASES: &[(&str, &str)] = &[
    ("mov", "tmov"),
    ("load", "tload"),
    ("store", "tstore"),
    ("print", "tprint"),
    ("rowmax", "trowmax"),
    ("matmul", "tmatmul"),
    ("matmul_acc", "tmatmul.acc"),
    ("tmatmul_acc", "tmatmul.acc"),
    ("sync", "tsync"),
    ("block_idx", "get_block_idx"),
    ("block_num", "get_block_num"),
    ("kernel_name", "kernel"),
];

const BUILTINS: &[(&str, Opcode)] = &[
    ("tload", Opcode::Load),
    ("tstore", Opcode::Store),
    ("tmov", Opcode::Mov),
    ("tmatmul", Opcode::Matmul),
    ("tmatmul.acc", Opcode::MatmulAcc),
    ("tpush", Opcode::Push),
    ("tprint", Opcode::Print),
    ("record_event", Opcode::RecordEvent),
    ("wait_event", Opcode::WaitEvent),
    ("tsync", Opcode::Sync),
    ("get_task_id", Opcode::TaskId),
    ("get_block_idx", Opcode::BlockIdx),
    ("get_block_num", Opcode::BlockNum),
    ("prologue", Opcode::Prologue),
    ("epilogue", Opcode::Epilogue),
    ("program", Opcode::Program),
    ("comment", Opcode::Comment),
    ("kernel", Opcode::KernelName),
    ("tassign", Opcode::Assign),
];

/// Tile ISA mnemonics accepted as generic instructions.
const ISA_OPS: &[&str] = &[
    "tassign", "tadd", "tabs", "tand", "tor", "tsub", "tmul", "tmin", "tmax", "texpands",
    "tload", "tpush", "tpop", "tprefetch", "tcmps", "tcmp", "tdiv", "tshl", "tshr", "txor",
    "tlog", "tdivs", "tprelu", "tprint", "taddc", "tsubc", "tmatmul_mx", "tmatmul",
    "tmatmul_acc", "tmatmul_bias", "tneg", "tmrgsort", "textract", "tinsert", "tfillpad",
    "tfillpad_inplace", "tfillpad_expand", "tsort32", "tgather", "tscatter", "trem",
    "tpartadd", "tpartmax", "tpartmin", "mgather", "mscatter", "tcvt", "tmov", "trowsum",
    "tcolsum", "tcolmax", "tcolexpand", "tcolexpanddiv", "tcolexpandmul", "tcolexpandsub",
    "tcolexpandexpdif", "trowmax", "treshape", "trowmin", "tsels", "tsel", "ttrans", "tmins",
    "trowexpand", "trowexpanddiv", "trowexpandmul", "trowexpandsub", "trowexpandadd",
    "trowexpandmax", "trowexpandmin", "trowexpandexpdif", "trsqrt", "tsqrt", "texp", "tnot",
    "trelu", "tgatherb", "tadds", "tsubs", "tmuls", "trems", "tmaxs", "tands", "tors", "tshls",
    "tshrs", "txors", "tlrelu", "taddsc", "tsubsc", "tcolmin",
];

fn canonical(name: &str) -> Option<&'static str> {
    if let Some((_, to)) = ALIASES.iter().find(|(from, _)| *from == name) {
        return Some(*to);
    }
    if let Some((known, _)) = BUILTINS.iter().find(|(b, _)| *b == name) {
        return Some(*known);
    }
    if let Some(op) = ISA_OPS.iter().find(|op| **op == name) {
        return Some(*op);
    }
    ISA_OPS
        .iter()
        .find(|op| op.strip_prefix('t') == Some(name))
        .copied()
}

/// Resolves a surface operation name to its [`Opcode`].
pub(crate) fn lookup(name: &str) -> Result<Opcode> {
    let canonical = canonical(name)
        .ok_or_else(|| CompileError::Unsupported(format!("unknown operation '{name}'")))?;
    Ok(BUILTINS
        .iter()
        .find(|(b, _)| *b == canonical)
        .map(|(_, op)| *op)
        .unwrap_or(Opcode::Generic(canonical)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_resolve_before_dispatch() {
        assert_eq!(lookup("load").unwrap(), Opcode::Load);
        assert_eq!(lookup("matmul_acc").unwrap(), Opcode::MatmulAcc);
        assert_eq!(lookup("tmatmul_acc").unwrap(), Opcode::MatmulAcc);
        assert_eq!(lookup("rowmax").unwrap(), Opcode::Generic("trowmax"));
        assert_eq!(lookup("sync").unwrap(), Opcode::Sync);
    }

    #[test]
    fn prefix_stripped_names() {
        assert_eq!(lookup("add").unwrap(), Opcode::Generic("tadd"));
        assert_eq!(lookup("rowexpandmul").unwrap(), Opcode::Generic("trowexpandmul"));
        assert_eq!(lookup("push").unwrap(), Opcode::Push);
        assert_eq!(lookup("tadd").unwrap().mnemonic(), "tadd");
    }

    #[test]
    fn unknown_names_fail() {
        let err = lookup("frobnicate").unwrap_err();
        assert_eq!(
            err,
            CompileError::Unsupported("unknown operation 'frobnicate'".into())
        );
        // only a single leading 't' is implied
        assert!(lookup("dd").is_err());
    }

    #[test]
    fn statement_only_ops() {
        assert!(lookup("store").unwrap().is_statement_only());
        assert!(lookup("record_event").unwrap().is_statement_only());
        assert!(!lookup("mov").unwrap().is_statement_only());
        assert_eq!(lookup("tassign").unwrap(), Opcode::Assign);
    }
}
