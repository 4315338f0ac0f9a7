//! Compile-time evaluation of declaration arguments.
//!
//! Shapes, strides, dtype strings and similar fields must be known while the
//! kernel is compiled. They may use literals, compile-time constants,
//! tuples/lists, unary `+`/`-`, the arithmetic operators and a few pure
//! functions (`sqrt`, `int`, `float`, `abs`, `min`, `max`, `scalar`).

use std::fmt;

use tileasm_ir::{CompileError, Result};
use tileasm_parser::{BinOp, Expr, ExprKind, UnaryOp};

use crate::ConstValue;
use crate::env::Env;

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Tuple(Vec<Value>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v:?}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Tuple(items) => {
                let items: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "({})", items.join(", "))
            }
        }
    }
}

impl From<&ConstValue> for Value {
    fn from(value: &ConstValue) -> Self {
        match value {
            ConstValue::Int(v) => Self::Int(*v),
            ConstValue::Float(v) => Self::Float(*v),
            ConstValue::Bool(v) => Self::Bool(*v),
            ConstValue::Str(s) => Self::Str(s.clone()),
        }
    }
}

impl Value {
    pub(crate) fn into_const(self, what: &str) -> Result<ConstValue> {
        match self {
            Self::Int(v) => Ok(ConstValue::Int(v)),
            Self::Float(v) => Ok(ConstValue::Float(v)),
            Self::Bool(v) => Ok(ConstValue::Bool(v)),
            Self::Str(s) => Ok(ConstValue::Str(s)),
            other @ Self::Tuple(_) => Err(CompileError::Type(format!(
                "{what} must be a scalar, got {other}"
            ))),
        }
    }

    pub(crate) fn into_string(self, what: &str) -> Result<String> {
        match self {
            Self::Str(s) => Ok(s),
            other => Err(CompileError::Type(format!(
                "{what} must be a string, got {other}"
            ))),
        }
    }

    pub(crate) fn as_i64(&self, what: &str) -> Result<i64> {
        match *self {
            Self::Int(v) => Ok(v),
            Self::Float(v) if v.fract() == 0.0 && v.abs() < 9.0e15 => Ok(v as i64),
            _ => Err(CompileError::Type(format!(
                "{what} must be an integer, got {self}"
            ))),
        }
    }

    pub(crate) fn as_u32(&self, what: &str) -> Result<u32> {
        let v = self.as_i64(what)?;
        u32::try_from(v).map_err(|_| {
            CompileError::Type(format!("{what} must be a non-negative integer, got {v}"))
        })
    }

    /// A two-element tuple of non-negative integers.
    pub(crate) fn as_pair(&self, what: &str) -> Result<[u32; 2]> {
        match self {
            Self::Tuple(items) if items.len() == 2 => {
                Ok([items[0].as_u32(what)?, items[1].as_u32(what)?])
            }
            other => Err(CompileError::Type(format!(
                "{what} must be a pair like (16, 16), got {other}"
            ))),
        }
    }

    fn as_f64(&self, what: &str) -> Result<f64> {
        match *self {
            Self::Int(v) => Ok(v as f64),
            Self::Float(v) => Ok(v),
            _ => Err(CompileError::Type(format!(
                "{what} must be a number, got {self}"
            ))),
        }
    }
}

fn overflow(op: BinOp) -> CompileError {
    CompileError::Type(format!(
        "integer overflow in compile-time '{}'",
        op.symbol()
    ))
}

fn zero_division() -> CompileError {
    CompileError::Type("division by zero in compile-time expression".into())
}

fn binary(op: BinOp, lhs: Value, rhs: Value) -> Result<Value> {
    if let (Value::Int(a), Value::Int(b)) = (&lhs, &rhs) {
        let (a, b) = (*a, *b);
        let v = match op {
            BinOp::Add => a.checked_add(b),
            BinOp::Sub => a.checked_sub(b),
            BinOp::Mul => a.checked_mul(b),
            BinOp::FloorDiv | BinOp::Mod if b == 0 => return Err(zero_division()),
            BinOp::FloorDiv => a.checked_div_euclid(b).map(|q| {
                // floor semantics for a negative divisor
                if b < 0 && a.rem_euclid(b) != 0 { q - 1 } else { q }
            }),
            BinOp::Mod => a.checked_rem_euclid(b).map(|r| if b < 0 && r != 0 { r + b } else { r }),
            BinOp::Div => {
                return if b == 0 {
                    Err(zero_division())
                } else {
                    Ok(Value::Float(a as f64 / b as f64))
                };
            }
            other => {
                return Err(CompileError::Unsupported(format!(
                    "operator '{}' in compile-time expression",
                    other.symbol()
                )));
            }
        };
        return v.map(Value::Int).ok_or_else(|| overflow(op));
    }

    let what = format!("operand of '{}'", op.symbol());
    let (a, b) = (lhs.as_f64(&what)?, rhs.as_f64(&what)?);
    let v = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div | BinOp::FloorDiv | BinOp::Mod if b == 0.0 => return Err(zero_division()),
        BinOp::Div => a / b,
        BinOp::FloorDiv => (a / b).floor(),
        BinOp::Mod => a - (a / b).floor() * b,
        other => {
            return Err(CompileError::Unsupported(format!(
                "operator '{}' in compile-time expression",
                other.symbol()
            )));
        }
    };
    Ok(Value::Float(v))
}

fn call(name: &str, mut args: Vec<Value>) -> Result<Value> {
    let arity = |n: usize, args: &[Value]| {
        if args.len() == n {
            Ok(())
        } else {
            Err(CompileError::Type(format!(
                "{name}(...) expects {n} argument(s), got {}",
                args.len()
            )))
        }
    };
    match name {
        "sqrt" | "math.sqrt" => {
            arity(1, &args)?;
            let v = args[0].as_f64("sqrt argument")?;
            if v < 0.0 {
                return Err(CompileError::Type(format!("sqrt of negative value {v}")));
            }
            Ok(Value::Float(v.sqrt()))
        }
        "int" => {
            arity(1, &args)?;
            match args[0] {
                Value::Float(v) => Value::Float(v.trunc())
                    .as_i64("int argument")
                    .map(Value::Int)
                    .map_err(|_| {
                        CompileError::Type(format!("int() argument {v} is out of integer range"))
                    }),
                _ => Ok(Value::Int(args[0].as_i64("int argument")?)),
            }
        }
        "float" => {
            arity(1, &args)?;
            Ok(Value::Float(args[0].as_f64("float argument")?))
        }
        "abs" => {
            arity(1, &args)?;
            match args[0] {
                Value::Int(v) => v
                    .checked_abs()
                    .map(Value::Int)
                    .ok_or_else(|| CompileError::Type("integer overflow in abs()".into())),
                _ => Ok(Value::Float(args[0].as_f64("abs argument")?.abs())),
            }
        }
        "min" | "max" => {
            if args.len() < 2 {
                return Err(CompileError::Type(format!(
                    "{name}(...) expects at least 2 arguments"
                )));
            }
            let pick_max = name == "max";
            let mut best = args.remove(0);
            for next in args {
                let take = match (&best, &next) {
                    (Value::Int(a), Value::Int(b)) => (b > a) == pick_max && b != a,
                    _ => {
                        let a = best.as_f64(name)?;
                        let b = next.as_f64(name)?;
                        (b > a) == pick_max && b != a
                    }
                };
                if take {
                    best = next;
                }
            }
            Ok(best)
        }
        "scalar" => {
            arity(1, &args)?;
            match args.pop() {
                Some(Value::Str(ty)) => Ok(Value::Str(ty)),
                _ => Err(CompileError::Type(
                    "scalar(...) expects one string argument like scalar(\"f32\")".into(),
                )),
            }
        }
        other => Err(CompileError::Unsupported(format!(
            "function '{other}' in compile-time expression"
        ))),
    }
}

fn callee_name(func: &Expr) -> Option<String> {
    match &func.kind {
        ExprKind::Name(n) => Some(n.clone()),
        ExprKind::Attribute { value, attr } => value.as_name().map(|base| format!("{base}.{attr}")),
        _ => None,
    }
}

/// Evaluates `expr` against the compile-time constants bound in `env`.
pub(crate) fn eval(expr: &Expr, env: &Env) -> Result<Value> {
    match &expr.kind {
        ExprKind::Int(v) => Ok(Value::Int(*v)),
        ExprKind::Float(v) => Ok(Value::Float(*v)),
        ExprKind::Bool(v) => Ok(Value::Bool(*v)),
        ExprKind::Str(s) => Ok(Value::Str(s.clone())),
        ExprKind::Name(name) => env.const_value(name).map(Value::from).ok_or_else(|| {
            CompileError::Symbol(format!("'{name}' is not a compile-time constant"))
        }),
        ExprKind::Tuple(items) | ExprKind::List(items) => items
            .iter()
            .map(|e| eval(e, env))
            .collect::<Result<Vec<_>>>()
            .map(Value::Tuple),
        ExprKind::Unary { op, operand } => {
            let v = eval(operand, env)?;
            match (op, v) {
                (UnaryOp::Plus, v @ (Value::Int(_) | Value::Float(_))) => Ok(v),
                (UnaryOp::Minus, Value::Int(i)) => i
                    .checked_neg()
                    .map(Value::Int)
                    .ok_or_else(|| CompileError::Type("integer overflow in negation".into())),
                (UnaryOp::Minus, Value::Float(f)) => Ok(Value::Float(-f)),
                (op, v) => Err(CompileError::Unsupported(format!(
                    "unary {op:?} on {v} in compile-time expression"
                ))),
            }
        }
        ExprKind::Binary { op, left, right } => binary(*op, eval(left, env)?, eval(right, env)?),
        ExprKind::Call {
            func,
            args,
            keywords,
        } => {
            let name = callee_name(func).ok_or_else(|| {
                CompileError::Unsupported(format!(
                    "compile-time call through {}",
                    func.describe()
                ))
            })?;
            if !keywords.is_empty() {
                return Err(CompileError::Unsupported(format!(
                    "keyword arguments to {name}(...) in compile-time expression"
                )));
            }
            let args = args
                .iter()
                .map(|a| eval(a, env))
                .collect::<Result<Vec<_>>>()?;
            call(&name, args)
        }
        _ => Err(CompileError::Unsupported(format!(
            "compile-time expression: {}",
            expr.describe()
        ))),
    }
}
