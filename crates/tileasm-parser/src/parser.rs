//! Recursive-descent parser over the token stream.

use tileasm_ir::{CompileError, Result};

use crate::ast::{
    BinOp, BoolOpKind, CmpOp, Expr, ExprKind, FunctionDef, Keyword, SourceUnit, Stmt, StmtKind,
    UnaryOp,
};
use crate::lexer::{Token, TokenKind};

const KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if",
    "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try",
    "while", "with", "yield",
];

/// Block statements that are skipped whole and reported as unsupported.
const SKIPPED_BLOCKS: &[&str] = &[
    "with", "try", "except", "finally", "class", "async", "else", "elif",
];

/// Simple statements that are skipped to end of line and reported as unsupported.
const SKIPPED_SIMPLE: &[&str] = &[
    "import", "from", "global", "nonlocal", "del", "assert", "raise", "yield",
];

const AUG_OPS: &[(&str, BinOp)] = &[
    ("+=", BinOp::Add),
    ("-=", BinOp::Sub),
    ("*=", BinOp::Mul),
    ("/=", BinOp::Div),
    ("//=", BinOp::FloorDiv),
    ("%=", BinOp::Mod),
    ("**=", BinOp::Pow),
    ("@=", BinOp::MatMul),
    ("<<=", BinOp::LShift),
    (">>=", BinOp::RShift),
    ("&=", BinOp::BitAnd),
    ("|=", BinOp::BitOr),
    ("^=", BinOp::BitXor),
];

pub(crate) struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Name(n) => format!("'{n}'"),
        TokenKind::Int(v) => format!("integer {v}"),
        TokenKind::Float(v) => format!("float {v}"),
        TokenKind::Str(_) => "string literal".into(),
        TokenKind::Op(op) => format!("'{op}'"),
        TokenKind::Newline => "end of line".into(),
        TokenKind::Indent => "indent".into(),
        TokenKind::Dedent => "dedent".into(),
        TokenKind::Eof => "end of input".into(),
    }
}

impl Parser {
    pub(crate) fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    // ---- token helpers ------------------------------------------------

    fn peek(&self) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.pos.min(last)]
    }

    fn peek_kind_at(&self, offset: usize) -> Option<&TokenKind> {
        self.tokens.get(self.pos + offset).map(|t| &t.kind)
    }

    fn line(&self) -> usize {
        self.peek().line
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn check_op(&self, op: &str) -> bool {
        matches!(self.peek().kind, TokenKind::Op(o) if o == op)
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if self.check_op(op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: &str) -> Result<()> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{op}'")))
        }
    }

    fn check_keyword(&self, kw: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Name(n) if n == kw)
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.check_keyword(kw) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, kw: &str) -> Result<()> {
        if self.eat_keyword(kw) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{kw}'")))
        }
    }

    fn expect_identifier(&mut self) -> Result<String> {
        match &self.peek().kind {
            TokenKind::Name(n) if !KEYWORDS.contains(&n.as_str()) => {
                let n = n.clone();
                self.pos += 1;
                Ok(n)
            }
            _ => Err(self.unexpected("an identifier")),
        }
    }

    fn error_at(&self, line: usize, message: impl Into<String>) -> CompileError {
        CompileError::Syntax {
            line,
            message: message.into(),
        }
    }

    fn unexpected(&self, wanted: &str) -> CompileError {
        let tok = self.peek();
        self.error_at(
            tok.line,
            format!("expected {wanted}, found {}", describe(&tok.kind)),
        )
    }

    fn expect_newline(&mut self) -> Result<()> {
        match self.peek().kind {
            TokenKind::Newline => {
                self.pos += 1;
                Ok(())
            }
            TokenKind::Eof | TokenKind::Dedent => Ok(()),
            _ => Err(self.unexpected("end of line")),
        }
    }

    /// Skips the rest of the logical line and any block nested under it.
    fn skip_statement(&mut self) {
        while !matches!(self.peek().kind, TokenKind::Newline | TokenKind::Eof) {
            self.advance();
        }
        if matches!(self.peek().kind, TokenKind::Newline) {
            self.advance();
        }
        if !matches!(self.peek().kind, TokenKind::Indent) {
            return;
        }
        let mut depth = 0usize;
        loop {
            match self.advance().kind {
                TokenKind::Indent => depth += 1,
                TokenKind::Dedent => {
                    depth -= 1;
                    if depth == 0 {
                        return;
                    }
                }
                TokenKind::Eof => return,
                _ => {}
            }
        }
    }

    // ---- statements ---------------------------------------------------

    pub(crate) fn source_unit(&mut self) -> Result<SourceUnit> {
        let mut unit = SourceUnit::default();
        while !self.at_eof() {
            if matches!(self.peek().kind, TokenKind::Newline | TokenKind::Dedent) {
                self.advance();
            } else if self.check_keyword("def") {
                unit.functions.push(self.function_def()?);
            } else {
                self.skip_statement();
            }
        }
        Ok(unit)
    }

    fn function_def(&mut self) -> Result<FunctionDef> {
        let line = self.line();
        self.expect_keyword("def")?;
        let name = self.expect_identifier()?;
        self.expect_op("(")?;
        let mut params = Vec::new();
        while !self.check_op(")") {
            if self.eat_op("/") {
                // positional-only marker
            } else if self.eat_op("*") || self.eat_op("**") {
                if !self.check_op(",") && !self.check_op(")") {
                    params.push(self.expect_identifier()?);
                }
            } else {
                params.push(self.expect_identifier()?);
            }
            if self.eat_op(":") {
                self.test()?;
            }
            if self.eat_op("=") {
                self.test()?;
            }
            if !self.eat_op(",") {
                break;
            }
        }
        self.expect_op(")")?;
        if self.eat_op("->") {
            self.test()?;
        }
        self.expect_op(":")?;
        let body = self.suite()?;
        Ok(FunctionDef {
            name,
            params,
            body,
            line,
        })
    }

    fn suite(&mut self) -> Result<Vec<Stmt>> {
        if !matches!(self.peek().kind, TokenKind::Newline) {
            return self.simple_statement();
        }
        self.advance();
        if !matches!(self.peek().kind, TokenKind::Indent) {
            return Err(self.unexpected("an indented block"));
        }
        self.advance();
        let mut body = Vec::new();
        loop {
            match self.peek().kind {
                TokenKind::Dedent => {
                    self.advance();
                    break;
                }
                TokenKind::Eof => break,
                TokenKind::Newline => {
                    self.advance();
                }
                _ => body.extend(self.statement()?),
            }
        }
        Ok(body)
    }

    fn statement(&mut self) -> Result<Vec<Stmt>> {
        let line = self.line();
        if self.check_keyword("for") {
            return Ok(vec![self.for_statement()?]);
        }
        if self.check_keyword("if") {
            return Ok(vec![self.if_statement()?]);
        }
        if self.check_keyword("while") {
            return Ok(vec![self.while_statement()?]);
        }
        if self.check_keyword("def") {
            self.function_def()?;
            return Ok(vec![Stmt {
                kind: StmtKind::Unsupported("def".into()),
                line,
            }]);
        }
        if self.check_op("@") {
            self.skip_statement();
            return Ok(vec![Stmt {
                kind: StmtKind::Unsupported("decorator".into()),
                line,
            }]);
        }
        let skipped = match &self.peek().kind {
            TokenKind::Name(kw) if SKIPPED_BLOCKS.contains(&kw.as_str()) => Some(kw.clone()),
            _ => None,
        };
        if let Some(kw) = skipped {
            self.skip_statement();
            return Ok(vec![Stmt {
                kind: StmtKind::Unsupported(kw),
                line,
            }]);
        }
        self.simple_statement()
    }

    fn simple_statement(&mut self) -> Result<Vec<Stmt>> {
        let mut stmts = vec![self.small_statement()?];
        while self.eat_op(";") {
            if matches!(self.peek().kind, TokenKind::Newline | TokenKind::Eof) {
                break;
            }
            stmts.push(self.small_statement()?);
        }
        self.expect_newline()?;
        Ok(stmts)
    }

    fn small_statement(&mut self) -> Result<Stmt> {
        let line = self.line();
        let stmt = |kind| Stmt { kind, line };

        if self.eat_keyword("pass") {
            return Ok(stmt(StmtKind::Pass));
        }
        if self.eat_keyword("break") {
            return Ok(stmt(StmtKind::Break));
        }
        if self.eat_keyword("continue") {
            return Ok(stmt(StmtKind::Continue));
        }
        if self.eat_keyword("return") {
            let value = if matches!(self.peek().kind, TokenKind::Newline | TokenKind::Eof)
                || self.check_op(";")
            {
                None
            } else {
                Some(self.testlist()?)
            };
            return Ok(stmt(StmtKind::Return(value)));
        }
        let skipped = match &self.peek().kind {
            TokenKind::Name(kw) if SKIPPED_SIMPLE.contains(&kw.as_str()) => Some(kw.clone()),
            _ => None,
        };
        if let Some(kw) = skipped {
            while !matches!(self.peek().kind, TokenKind::Newline | TokenKind::Eof) {
                self.advance();
            }
            return Ok(stmt(StmtKind::Unsupported(kw)));
        }

        let first = self.testlist()?;
        if self.check_op("=") {
            let mut exprs = vec![first];
            while self.eat_op("=") {
                exprs.push(self.testlist()?);
            }
            let value = exprs.pop().ok_or_else(|| self.unexpected("a value"))?;
            return Ok(stmt(StmtKind::Assign {
                targets: exprs,
                value,
            }));
        }
        let augmented = match &self.peek().kind {
            TokenKind::Op(op) => AUG_OPS.iter().find(|(o, _)| o == op).map(|&(_, bin)| bin),
            _ => None,
        };
        if let Some(bin) = augmented {
            self.advance();
            let value = self.testlist()?;
            return Ok(stmt(StmtKind::AugAssign {
                target: first,
                op: bin,
                value,
            }));
        }
        if self.eat_op(":") {
            // Annotated assignment; the annotation is dropped.
            self.test()?;
            if self.eat_op("=") {
                let value = self.testlist()?;
                return Ok(stmt(StmtKind::Assign {
                    targets: vec![first],
                    value,
                }));
            }
            return Ok(stmt(StmtKind::Unsupported("annotation".into())));
        }
        Ok(stmt(StmtKind::Expr(first)))
    }

    fn for_statement(&mut self) -> Result<Stmt> {
        let line = self.line();
        self.expect_keyword("for")?;
        let target = self.target_list()?;
        self.expect_keyword("in")?;
        let iter = self.testlist()?;
        self.expect_op(":")?;
        let body = self.suite()?;
        let orelse = self.else_suite()?;
        Ok(Stmt {
            kind: StmtKind::For {
                target,
                iter,
                body,
                orelse,
            },
            line,
        })
    }

    fn if_statement(&mut self) -> Result<Stmt> {
        let line = self.line();
        if !self.eat_keyword("if") {
            self.expect_keyword("elif")?;
        }
        let test = self.test()?;
        self.expect_op(":")?;
        let body = self.suite()?;
        let orelse = if self.check_keyword("elif") {
            vec![self.if_statement()?]
        } else {
            self.else_suite()?
        };
        Ok(Stmt {
            kind: StmtKind::If { test, body, orelse },
            line,
        })
    }

    fn while_statement(&mut self) -> Result<Stmt> {
        let line = self.line();
        self.expect_keyword("while")?;
        let test = self.test()?;
        self.expect_op(":")?;
        let body = self.suite()?;
        let orelse = self.else_suite()?;
        Ok(Stmt {
            kind: StmtKind::While { test, body, orelse },
            line,
        })
    }

    fn else_suite(&mut self) -> Result<Vec<Stmt>> {
        if self.eat_keyword("else") {
            self.expect_op(":")?;
            self.suite()
        } else {
            Ok(Vec::new())
        }
    }

    // ---- expressions --------------------------------------------------

    /// Comma-separated loop targets; stops before `in`.
    fn target_list(&mut self) -> Result<Expr> {
        let line = self.line();
        let first = self.bit_or()?;
        if !self.check_op(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.check_keyword("in") {
                break;
            }
            items.push(self.bit_or()?);
        }
        Ok(Expr::new(ExprKind::Tuple(items), line))
    }

    fn testlist(&mut self) -> Result<Expr> {
        let line = self.line();
        let first = self.test()?;
        if !self.check_op(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.ends_expression_list() {
                break;
            }
            items.push(self.test()?);
        }
        Ok(Expr::new(ExprKind::Tuple(items), line))
    }

    fn ends_expression_list(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Newline | TokenKind::Eof)
            || ["=", ")", "]", ";", ":"].iter().any(|op| self.check_op(op))
    }

    fn test(&mut self) -> Result<Expr> {
        if self.check_keyword("lambda") {
            return Err(self.error_at(self.line(), "lambda expressions are not supported"));
        }
        let expr = self.or_test()?;
        if self.check_keyword("if") {
            return Err(self.error_at(self.line(), "conditional expressions are not supported"));
        }
        Ok(expr)
    }

    fn or_test(&mut self) -> Result<Expr> {
        self.bool_chain("or", BoolOpKind::Or, Self::and_test)
    }

    fn and_test(&mut self) -> Result<Expr> {
        self.bool_chain("and", BoolOpKind::And, Self::not_test)
    }

    fn bool_chain(
        &mut self,
        kw: &str,
        op: BoolOpKind,
        next: fn(&mut Self) -> Result<Expr>,
    ) -> Result<Expr> {
        let line = self.line();
        let first = next(self)?;
        if !self.check_keyword(kw) {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat_keyword(kw) {
            values.push(next(self)?);
        }
        Ok(Expr::new(ExprKind::BoolOp { op, values }, line))
    }

    fn not_test(&mut self) -> Result<Expr> {
        let line = self.line();
        if self.eat_keyword("not") {
            let operand = self.not_test()?;
            return Ok(Expr::new(
                ExprKind::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                },
                line,
            ));
        }
        self.comparison()
    }

    fn comparison_op(&mut self) -> Option<CmpOp> {
        let op = match self.peek().kind.clone() {
            TokenKind::Op("==") => CmpOp::Eq,
            TokenKind::Op("!=") => CmpOp::NotEq,
            TokenKind::Op("<") => CmpOp::Lt,
            TokenKind::Op("<=") => CmpOp::LtE,
            TokenKind::Op(">") => CmpOp::Gt,
            TokenKind::Op(">=") => CmpOp::GtE,
            TokenKind::Name(n) if n == "in" => CmpOp::In,
            TokenKind::Name(n) if n == "is" => {
                self.advance();
                return Some(if self.eat_keyword("not") {
                    CmpOp::IsNot
                } else {
                    CmpOp::Is
                });
            }
            TokenKind::Name(n)
                if n == "not"
                    && matches!(self.peek_kind_at(1), Some(TokenKind::Name(m)) if m == "in") =>
            {
                self.advance();
                self.advance();
                return Some(CmpOp::NotIn);
            }
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    fn comparison(&mut self) -> Result<Expr> {
        let line = self.line();
        let left = self.bit_or()?;
        let mut ops = Vec::new();
        let mut comparators = Vec::new();
        while let Some(op) = self.comparison_op() {
            ops.push(op);
            comparators.push(self.bit_or()?);
        }
        if ops.is_empty() {
            return Ok(left);
        }
        Ok(Expr::new(
            ExprKind::Compare {
                left: Box::new(left),
                ops,
                comparators,
            },
            line,
        ))
    }

    /// One left-associative binary precedence level.
    fn binary_level(
        &mut self,
        table: &[(&str, BinOp)],
        next: fn(&mut Self) -> Result<Expr>,
    ) -> Result<Expr> {
        let mut left = next(self)?;
        loop {
            let Some(&(_, op)) = table.iter().find(|(sym, _)| self.check_op(sym)) else {
                return Ok(left);
            };
            let line = self.line();
            self.advance();
            let right = next(self)?;
            left = Expr::new(
                ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                line,
            );
        }
    }

    fn bit_or(&mut self) -> Result<Expr> {
        self.binary_level(&[("|", BinOp::BitOr)], Self::bit_xor)
    }

    fn bit_xor(&mut self) -> Result<Expr> {
        self.binary_level(&[("^", BinOp::BitXor)], Self::bit_and)
    }

    fn bit_and(&mut self) -> Result<Expr> {
        self.binary_level(&[("&", BinOp::BitAnd)], Self::shift)
    }

    fn shift(&mut self) -> Result<Expr> {
        self.binary_level(
            &[("<<", BinOp::LShift), (">>", BinOp::RShift)],
            Self::arith,
        )
    }

    fn arith(&mut self) -> Result<Expr> {
        self.binary_level(&[("+", BinOp::Add), ("-", BinOp::Sub)], Self::term)
    }

    fn term(&mut self) -> Result<Expr> {
        self.binary_level(
            &[
                ("*", BinOp::Mul),
                ("/", BinOp::Div),
                ("//", BinOp::FloorDiv),
                ("%", BinOp::Mod),
                ("@", BinOp::MatMul),
            ],
            Self::factor,
        )
    }

    fn factor(&mut self) -> Result<Expr> {
        let line = self.line();
        let op = if self.eat_op("+") {
            UnaryOp::Plus
        } else if self.eat_op("-") {
            UnaryOp::Minus
        } else if self.eat_op("~") {
            UnaryOp::Invert
        } else {
            return self.power();
        };
        let operand = self.factor()?;
        Ok(Expr::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            line,
        ))
    }

    fn power(&mut self) -> Result<Expr> {
        let base = self.primary()?;
        if !self.check_op("**") {
            return Ok(base);
        }
        let line = self.line();
        self.advance();
        let exponent = self.factor()?;
        Ok(Expr::new(
            ExprKind::Binary {
                op: BinOp::Pow,
                left: Box::new(base),
                right: Box::new(exponent),
            },
            line,
        ))
    }

    fn primary(&mut self) -> Result<Expr> {
        let mut expr = self.atom()?;
        loop {
            let line = self.line();
            if self.eat_op("(") {
                let (args, keywords) = self.call_arguments()?;
                expr = Expr::new(
                    ExprKind::Call {
                        func: Box::new(expr),
                        args,
                        keywords,
                    },
                    line,
                );
            } else if self.eat_op("[") {
                let index = self.testlist()?;
                if self.check_op(":") {
                    return Err(self.error_at(line, "slices are not supported"));
                }
                self.expect_op("]")?;
                expr = Expr::new(
                    ExprKind::Subscript {
                        value: Box::new(expr),
                        index: Box::new(index),
                    },
                    line,
                );
            } else if self.eat_op(".") {
                let attr = match self.advance().kind {
                    TokenKind::Name(n) => n,
                    other => {
                        return Err(self.error_at(
                            line,
                            format!("expected attribute name, found {}", describe(&other)),
                        ));
                    }
                };
                expr = Expr::new(
                    ExprKind::Attribute {
                        value: Box::new(expr),
                        attr,
                    },
                    line,
                );
            } else {
                return Ok(expr);
            }
        }
    }

    fn call_arguments(&mut self) -> Result<(Vec<Expr>, Vec<Keyword>)> {
        let mut args = Vec::new();
        let mut keywords: Vec<Keyword> = Vec::new();
        while !self.check_op(")") {
            if self.check_op("*") || self.check_op("**") {
                return Err(self.error_at(self.line(), "star arguments are not supported"));
            }
            let is_keyword = matches!(self.peek().kind, TokenKind::Name(_))
                && matches!(self.peek_kind_at(1), Some(TokenKind::Op("=")));
            if is_keyword {
                let line = self.line();
                let name = self.expect_identifier()?;
                self.expect_op("=")?;
                if keywords.iter().any(|k| k.name == name) {
                    return Err(self.error_at(line, format!("keyword argument repeated: {name}")));
                }
                let value = self.test()?;
                keywords.push(Keyword { name, value });
            } else {
                if !keywords.is_empty() {
                    return Err(self.error_at(
                        self.line(),
                        "positional argument follows keyword argument",
                    ));
                }
                args.push(self.test()?);
            }
            if self.check_keyword("for") {
                return Err(self.error_at(self.line(), "generator expressions are not supported"));
            }
            if !self.eat_op(",") {
                break;
            }
        }
        self.expect_op(")")?;
        Ok((args, keywords))
    }

    fn sequence_items(&mut self, close: &str) -> Result<Vec<Expr>> {
        let mut items = Vec::new();
        while !self.check_op(close) {
            items.push(self.test()?);
            if self.check_keyword("for") {
                return Err(self.error_at(self.line(), "comprehensions are not supported"));
            }
            if !self.eat_op(",") {
                break;
            }
        }
        self.expect_op(close)?;
        Ok(items)
    }

    fn atom(&mut self) -> Result<Expr> {
        let tok = self.advance();
        let line = tok.line;
        let kind = match tok.kind {
            TokenKind::Int(v) => ExprKind::Int(v),
            TokenKind::Float(v) => ExprKind::Float(v),
            TokenKind::Str(mut s) => {
                while let TokenKind::Str(next) = &self.peek().kind {
                    s.push_str(next);
                    self.advance();
                }
                ExprKind::Str(s)
            }
            TokenKind::Name(n) => match n.as_str() {
                "True" => ExprKind::Bool(true),
                "False" => ExprKind::Bool(false),
                "None" => ExprKind::None,
                kw if KEYWORDS.contains(&kw) => {
                    return Err(self.error_at(line, format!("unexpected keyword '{kw}'")));
                }
                _ => ExprKind::Name(n),
            },
            TokenKind::Op("(") => {
                if self.eat_op(")") {
                    ExprKind::Tuple(Vec::new())
                } else {
                    let first = self.test()?;
                    if self.check_keyword("for") {
                        return Err(
                            self.error_at(self.line(), "generator expressions are not supported")
                        );
                    }
                    if self.eat_op(")") {
                        return Ok(first);
                    }
                    self.expect_op(",")?;
                    let mut items = vec![first];
                    items.extend(self.sequence_items(")")?);
                    ExprKind::Tuple(items)
                }
            }
            TokenKind::Op("[") => ExprKind::List(self.sequence_items("]")?),
            TokenKind::Op("{") => {
                return Err(self.error_at(line, "dict and set displays are not supported"));
            }
            other => {
                return Err(self.error_at(
                    line,
                    format!("expected an expression, found {}", describe(&other)),
                ));
            }
        };
        Ok(Expr::new(kind, line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn expr(src: &str) -> Expr {
        let mut p = Parser::new(tokenize(src).unwrap());
        p.testlist().unwrap()
    }

    #[test]
    fn precedence() {
        let e = expr("a + b * c");
        let ExprKind::Binary { op, right, .. } = e.kind else {
            panic!("expected binary");
        };
        assert_eq!(op, BinOp::Add);
        assert!(matches!(right.kind, ExprKind::Binary { op: BinOp::Mul, .. }));
    }

    #[test]
    fn unary_binds_tighter_than_floor_div() {
        let e = expr("-n // 2");
        let ExprKind::Binary { op, left, .. } = e.kind else {
            panic!("expected binary");
        };
        assert_eq!(op, BinOp::FloorDiv);
        assert!(matches!(left.kind, ExprKind::Unary { op: UnaryOp::Minus, .. }));
    }

    #[test]
    fn call_with_keywords_and_attribute() {
        let e = expr("pto.tensor(\"x\", (16, 16), dtype=\"f16\")");
        let ExprKind::Call {
            func,
            args,
            keywords,
        } = e.kind
        else {
            panic!("expected call");
        };
        assert!(matches!(func.kind, ExprKind::Attribute { ref attr, .. } if attr == "tensor"));
        assert_eq!(args.len(), 2);
        assert!(matches!(args[1].kind, ExprKind::Tuple(ref items) if items.len() == 2));
        assert_eq!(keywords[0].name, "dtype");
        assert_eq!(keywords[0].value.as_str(), Some("f16"));
    }

    #[test]
    fn chained_and_negated_comparisons() {
        let e = expr("a < b <= c");
        assert!(matches!(e.kind, ExprKind::Compare { ref ops, .. } if ops.len() == 2));
        let e = expr("a not in b");
        assert!(matches!(e.kind, ExprKind::Compare { ref ops, .. } if ops == &[CmpOp::NotIn]));
    }

    #[test]
    fn adjacent_strings_concatenate() {
        assert_eq!(expr("'ab' \"cd\"").as_str(), Some("abcd"));
    }

    #[test]
    fn parenthesized_and_tuples() {
        assert!(matches!(expr("(a)").kind, ExprKind::Name(_)));
        assert!(matches!(expr("(a,)").kind, ExprKind::Tuple(ref v) if v.len() == 1));
        assert!(matches!(expr("()").kind, ExprKind::Tuple(ref v) if v.is_empty()));
        assert!(matches!(expr("a, b").kind, ExprKind::Tuple(ref v) if v.len() == 2));
    }

    #[test]
    fn positional_after_keyword_is_rejected() {
        let mut p = Parser::new(tokenize("f(a=1, b)").unwrap());
        assert!(p.testlist().is_err());
    }
}
