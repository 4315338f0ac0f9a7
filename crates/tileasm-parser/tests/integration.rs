//! Integration tests for the surface parser.

use tileasm_ir::CompileError;
use tileasm_parser::{CmpOp, ExprKind, StmtKind, list_kernel_functions, parse};

#[test]
fn parse_call_style_kernel() {
    let source = r#"
import math

def add16():
    """Vector add."""
    prologue()
    bid = get_block_idx()
    r0 = bid * 16
    x = tensor(dtype="f16", shape=(16, 16))
    tx = tile(loc="Vec", dtype="f16", rows=16, cols=16)
    tload(tx, x, r0, 0)
    epilogue()
"#;
    let unit = parse(source).expect("kernel should parse");
    assert_eq!(unit.functions.len(), 1);
    let f = &unit.functions[0];
    assert_eq!(f.name, "add16");
    assert_eq!(f.line, 4);
    assert_eq!(f.body.len(), 8);

    // Docstring is kept as a bare string expression.
    assert!(matches!(
        f.body[0].kind,
        StmtKind::Expr(ref e) if matches!(e.kind, ExprKind::Str(_))
    ));

    let StmtKind::Assign { targets, value } = &f.body[4].kind else {
        panic!("expected assignment, got {:?}", f.body[4].kind);
    };
    assert_eq!(targets[0].as_name(), Some("x"));
    let ExprKind::Call { keywords, .. } = &value.kind else {
        panic!("expected call");
    };
    assert_eq!(keywords.len(), 2);
    assert_eq!(f.body[4].line, 9);
}

#[test]
fn parse_control_flow() {
    let source = r#"
def k():
    for i in range(0, 4, 1):
        if i < 2:
            pass
        elif i == 3:
            pass
        else:
            pass
"#;
    let unit = parse(source).unwrap();
    let body = &unit.functions[0].body;
    let StmtKind::For { target, body, .. } = &body[0].kind else {
        panic!("expected for");
    };
    assert_eq!(target.as_name(), Some("i"));
    let StmtKind::If { test, orelse, .. } = &body[0].kind else {
        panic!("expected if");
    };
    assert!(matches!(test.kind, ExprKind::Compare { ref ops, .. } if ops == &[CmpOp::Lt]));
    // elif arrives as a nested if in the else branch
    assert!(matches!(orelse[0].kind, StmtKind::If { ref orelse, .. } if orelse.len() == 1));
}

#[test]
fn list_functions_in_order() {
    let source = r#"
@decorator(level=2)
def first():
    pass

VALUE = 3

class Helper:
    def method(self):
        pass

def second(a, b=1, *rest, **kw) -> None:
    return
"#;
    let names = list_kernel_functions(source).unwrap();
    assert_eq!(names, vec!["first".to_string(), "second".to_string()]);
}

#[test]
fn indented_source_is_accepted() {
    let source = "
        def k():
            x = 1
    ";
    let unit = parse(source).unwrap();
    assert_eq!(unit.functions[0].name, "k");
}

#[test]
fn unsupported_statements_are_recorded() {
    let source = r#"
def k():
    with ctx():
        x = 1
    import os
    x += 1
"#;
    let unit = parse(source).unwrap();
    let body = &unit.functions[0].body;
    assert_eq!(body.len(), 3);
    assert!(matches!(body[0].kind, StmtKind::Unsupported(ref kw) if kw == "with"));
    assert!(matches!(body[1].kind, StmtKind::Unsupported(ref kw) if kw == "import"));
    assert!(matches!(body[2].kind, StmtKind::AugAssign { .. }));
}

#[test]
fn syntax_errors_carry_lines() {
    let err = parse("def k():\n    x = (1,\n").unwrap_err();
    assert!(matches!(err, CompileError::Syntax { .. }), "{err}");

    let err = parse("def k():\n    x = {}\n").unwrap_err();
    let CompileError::Syntax { line, message } = err else {
        panic!("expected syntax error");
    };
    assert_eq!(line, 2);
    assert!(message.contains("dict"));
}

#[test]
fn semicolon_separated_statements() {
    let unit = parse("def k():\n    a = 1; b = 2\n").unwrap();
    assert_eq!(unit.functions[0].body.len(), 2);
}
