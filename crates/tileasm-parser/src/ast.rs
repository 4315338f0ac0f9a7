//! Owned syntax tree for kernel sources.

/// A parsed source file: the module-level function definitions in order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SourceUnit {
    pub functions: Vec<FunctionDef>,
}

impl SourceUnit {
    /// Looks up a function by name.
    pub fn function(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.iter().find(|f| f.name == name)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
    /// Line of the `def` keyword.
    pub line: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub line: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub enum StmtKind {
    /// `a = b = value`; one entry in `targets` per `=`.
    Assign { targets: Vec<Expr>, value: Expr },
    AugAssign {
        target: Expr,
        op: BinOp,
        value: Expr,
    },
    Expr(Expr),
    For {
        target: Expr,
        iter: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    /// `elif` chains arrive as a nested `If` in `orelse`.
    If {
        test: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    While {
        test: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    Return(Option<Expr>),
    Pass,
    Break,
    Continue,
    /// A statement the parser recognized but does not model; holds its keyword.
    Unsupported(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub line: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    Name(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    None,
    Tuple(Vec<Expr>),
    List(Vec<Expr>),
    Attribute {
        value: Box<Expr>,
        attr: String,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        keywords: Vec<Keyword>,
    },
    Subscript {
        value: Box<Expr>,
        index: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `left ops[0] comparators[0] ops[1] comparators[1] ...`
    Compare {
        left: Box<Expr>,
        ops: Vec<CmpOp>,
        comparators: Vec<Expr>,
    },
    BoolOp {
        op: BoolOpKind,
        values: Vec<Expr>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Keyword {
    pub name: String,
    pub value: Expr,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
    Invert,
    Not,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    MatMul,
    LShift,
    RShift,
    BitAnd,
    BitOr,
    BitXor,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::FloorDiv => "//",
            Self::Mod => "%",
            Self::Pow => "**",
            Self::MatMul => "@",
            Self::LShift => "<<",
            Self::RShift => ">>",
            Self::BitAnd => "&",
            Self::BitOr => "|",
            Self::BitXor => "^",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    In,
    NotIn,
    Is,
    IsNot,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoolOpKind {
    And,
    Or,
}

impl Expr {
    pub fn new(kind: ExprKind, line: usize) -> Self {
        Self { kind, line }
    }

    /// The identifier if this is a bare name.
    pub fn as_name(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Name(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Short human-readable description of the expression form.
    pub fn describe(&self) -> String {
        match &self.kind {
            ExprKind::Name(n) => format!("name '{n}'"),
            ExprKind::Int(v) => format!("integer {v}"),
            ExprKind::Float(v) => format!("float {v}"),
            ExprKind::Bool(v) => format!("boolean {}", if *v { "True" } else { "False" }),
            ExprKind::Str(s) => format!("string {s:?}"),
            ExprKind::None => "None".into(),
            ExprKind::Tuple(_) => "tuple".into(),
            ExprKind::List(_) => "list".into(),
            ExprKind::Attribute { value, attr } => match value.as_name() {
                Some(base) => format!("attribute '{base}.{attr}'"),
                None => format!("attribute '.{attr}'"),
            },
            ExprKind::Call { func, .. } => match func.as_name() {
                Some(name) => format!("call to '{name}'"),
                None => "call".into(),
            },
            ExprKind::Subscript { .. } => "subscript".into(),
            ExprKind::Unary { op, .. } => format!("unary {op:?}"),
            ExprKind::Binary { op, .. } => format!("binary '{}'", op.symbol()),
            ExprKind::Compare { .. } => "comparison".into(),
            ExprKind::BoolOp { op, .. } => format!("boolean {op:?}"),
        }
    }
}

impl Stmt {
    pub fn describe(&self) -> String {
        match &self.kind {
            StmtKind::Assign { .. } => "assignment".into(),
            StmtKind::AugAssign { op, .. } => format!("augmented assignment '{}='", op.symbol()),
            StmtKind::Expr(e) => format!("expression statement ({})", e.describe()),
            StmtKind::For { .. } => "for loop".into(),
            StmtKind::If { .. } => "if statement".into(),
            StmtKind::While { .. } => "while loop".into(),
            StmtKind::Return(_) => "return".into(),
            StmtKind::Pass => "pass".into(),
            StmtKind::Break => "break".into(),
            StmtKind::Continue => "continue".into(),
            StmtKind::Unsupported(kw) => format!("'{kw}' statement"),
        }
    }
}
