//! Surface syntax parser for tileasm kernels.
//!
//! Kernels are written as plain function definitions in an indentation-based
//! syntax; [`parse`] turns a whole source file into a [`SourceUnit`] holding
//! every module-level `def`. Anything else at module level (imports,
//! decorators, helper assignments, classes) is skipped without being
//! interpreted, so kernel files can stay importable by other tools.

pub mod ast;
mod lexer;
mod parser;

pub use ast::{
    BinOp, BoolOpKind, CmpOp, Expr, ExprKind, FunctionDef, Keyword, SourceUnit, Stmt, StmtKind,
    UnaryOp,
};
pub use lexer::{Token, TokenKind, tokenize};
use tileasm_ir::Result;

/// Parse kernel source text into its function definitions.
pub fn parse(source: &str) -> Result<SourceUnit> {
    let tokens = lexer::tokenize(source)?;
    let unit = parser::Parser::new(tokens).source_unit()?;
    log::debug!("parsed {} function(s)", unit.functions.len());
    Ok(unit)
}

/// Names of the module-level functions in `source`, in source order.
pub fn list_kernel_functions(source: &str) -> Result<Vec<String>> {
    Ok(parse(source)?
        .functions
        .into_iter()
        .map(|f| f.name)
        .collect())
}
