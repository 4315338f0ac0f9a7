//! Statement-level translation of one kernel function.

use tileasm_host::Role;
use tileasm_ir::{
    BLayout, CompileError, DType, Emitter, FuncParam, FuncSignature, Location, Pad, Result,
    SLayout, TensorLayout, TensorType, TileType, ValidShape, wrap_module,
};
use tileasm_parser::{BinOp, CmpOp, Expr, ExprKind, FunctionDef, Keyword, Stmt, StmtKind};

use crate::env::{Binding, Env, Operand};
use crate::eval::{Value, eval};
use crate::legalize;
use crate::opcodes::{self, Opcode};
use crate::{CompileOptions, KernelSpec, TensorArg};

/// Declaration helpers, recognized before the opcode table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Decl {
    Tensor,
    Tile,
    Sugar(Location),
    Const,
    Program,
}

impl Decl {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "tensor" => Self::Tensor,
            "tile" => Self::Tile,
            "vec" | "vec_tile" => Self::Sugar(Location::Vec),
            "mat" | "mat_tile" => Self::Sugar(Location::Mat),
            "left" | "left_tile" => Self::Sugar(Location::Left),
            "right" | "right_tile" => Self::Sugar(Location::Right),
            "acc" | "acc_tile" => Self::Sugar(Location::Acc),
            "const" => Self::Const,
            "PTO" => Self::Program,
            _ => return None,
        })
    }
}

/// `f(...)` or `<name>.f(...)`; the receiver is not interpreted.
fn call_name(func: &Expr) -> Result<&str> {
    match &func.kind {
        ExprKind::Name(name) => Ok(name),
        ExprKind::Attribute { value, attr } if value.as_name().is_some() => Ok(attr),
        _ => Err(CompileError::Unsupported(format!(
            "call through {}",
            func.describe()
        ))),
    }
}

fn no_keywords(what: &str, keywords: &[Keyword]) -> Result<()> {
    match keywords.first() {
        Some(kw) => Err(CompileError::Unsupported(format!(
            "{what}(...) does not accept keyword argument '{}'",
            kw.name
        ))),
        None => Ok(()),
    }
}

fn arity_error(mnemonic: &str, expected: &str) -> CompileError {
    CompileError::Config(format!("{mnemonic} expects {expected}"))
}

/// Fields shared by `tile(...)` and the per-location helpers.
struct TileFields {
    loc: Option<Location>,
    dtype: Option<DType>,
    rows: Option<u32>,
    cols: Option<u32>,
    blayout: BLayout,
    slayout: SLayout,
    valid: Option<String>,
    valid_row: Option<Operand>,
    valid_col: Option<Operand>,
    fractal: Option<u32>,
    pad: Pad,
    addr: Option<u64>,
}

impl TileFields {
    fn new(loc: Option<Location>) -> Self {
        let (blayout, slayout) = match loc {
            Some(loc) => loc.default_layouts(),
            None => (BLayout::RowMajor, SLayout::NoneBox),
        };
        Self {
            loc,
            dtype: None,
            rows: None,
            cols: None,
            blayout,
            slayout,
            valid: None,
            valid_row: None,
            valid_col: None,
            fractal: None,
            pad: Pad::Null,
            addr: None,
        }
    }
}

pub(crate) struct FunctionCompiler<'a> {
    options: &'a CompileOptions,
    env: Env,
    body: Emitter,
    kernel_name: Option<String>,
}

impl<'a> FunctionCompiler<'a> {
    pub(crate) fn new(options: &'a CompileOptions) -> Result<Self> {
        Ok(Self {
            options,
            env: Env::new(&options.consts)?,
            body: Emitter::new(),
            kernel_name: None,
        })
    }

    pub(crate) fn compile(mut self, func: &FunctionDef) -> Result<KernelSpec> {
        self.block(&func.body)?;

        if self.env.uses_task_id() && self.env.args().contains_key(&0) {
            return Err(CompileError::Config(
                "kernel uses get_task_id(), so %arg0 is reserved (tensors must start at %arg1)"
                    .into(),
            )
            .at(func.line));
        }

        let name = self.kernel_name.take().unwrap_or_else(|| func.name.clone());
        let mut params = Vec::new();
        if self.env.uses_task_id() {
            params.push(FuncParam::TaskId);
        }
        let mut tensor_args = Vec::new();
        for (&slot, arg) in self.env.args() {
            params.push(FuncParam::Tensor {
                slot,
                dtype: arg.ty.dtype,
            });
            tensor_args.push(TensorArg {
                name: arg.name.clone(),
                slot,
                ty: arg.ty.clone(),
                role: arg.role,
            });
        }

        let mut body = self.body;
        body.prepend(self.env.prelude());
        let signature = FuncSignature {
            name: name.clone(),
            params,
        };
        let text = wrap_module(&self.options.device_spec, &signature, &body)?;
        log::debug!(
            "compiled kernel {name}: {} tensor argument(s), {} constant(s), task id {}",
            tensor_args.len(),
            self.env.constant_count(),
            if self.env.uses_task_id() { "used" } else { "unused" }
        );
        Ok(KernelSpec {
            name,
            text,
            tensor_args,
        })
    }

    fn block(&mut self, stmts: &[Stmt]) -> Result<()> {
        for stmt in stmts {
            self.stmt(stmt).map_err(|e| e.at(stmt.line))?;
        }
        Ok(())
    }

    /// Compiles `stmts` as a structured region; its bindings end with it.
    fn region(&mut self, stmts: &[Stmt]) -> Result<()> {
        self.env.push_scope();
        let result = self.block(stmts);
        self.env.pop_scope();
        result
    }

    fn stmt(&mut self, stmt: &Stmt) -> Result<()> {
        match &stmt.kind {
            StmtKind::Assign { targets, value } => {
                let [target] = targets.as_slice() else {
                    return Err(CompileError::Unsupported(
                        "chained assignment (a = b = ...)".into(),
                    ));
                };
                let Some(name) = target.as_name() else {
                    return Err(CompileError::Unsupported(format!(
                        "assignment to {}; targets must be plain names",
                        target.describe()
                    )));
                };
                self.assign(name, value)
            }
            StmtKind::Expr(expr) => match &expr.kind {
                ExprKind::Call {
                    func,
                    args,
                    keywords,
                } => self.call_stmt(call_name(func)?, args, keywords),
                // docstrings
                ExprKind::Str(_) => Ok(()),
                _ => Err(CompileError::Unsupported(stmt.describe())),
            },
            StmtKind::For {
                target,
                iter,
                body,
                orelse,
            } => self.for_loop(target, iter, body, orelse),
            StmtKind::If { test, body, orelse } => self.if_stmt(test, body, orelse),
            StmtKind::Return(_) | StmtKind::Pass => Ok(()),
            StmtKind::AugAssign { .. }
            | StmtKind::While { .. }
            | StmtKind::Break
            | StmtKind::Continue
            | StmtKind::Unsupported(_) => Err(CompileError::Unsupported(format!(
                "{} in a kernel",
                stmt.describe()
            ))),
        }
    }

    // ---- assignments ----

    fn assign(&mut self, target: &str, value: &Expr) -> Result<()> {
        match &value.kind {
            ExprKind::Call {
                func,
                args,
                keywords,
            } => {
                let name = call_name(func)?;
                if let Some(decl) = Decl::from_name(name) {
                    return self.declare(target, name, decl, args, keywords);
                }
                let op = opcodes::lookup(name)?;
                self.assign_op(target, op, args, keywords)
            }
            ExprKind::Int(_) | ExprKind::Float(_) | ExprKind::Bool(_) | ExprKind::Str(_) => {
                self.bind_literal(target, value, None)
            }
            ExprKind::Unary { operand, .. }
                if matches!(operand.kind, ExprKind::Int(_) | ExprKind::Float(_)) =>
            {
                self.bind_literal(target, value, None)
            }
            ExprKind::Binary { op, left, right } => self.scalar_assign(target, *op, left, right),
            _ => Err(CompileError::Unsupported(format!(
                "assigning {} to '{target}'",
                value.describe()
            ))),
        }
    }

    fn bind_literal(&mut self, target: &str, value: &Expr, scalar: Option<String>) -> Result<()> {
        let value = eval(value, &self.env)?.into_const(&format!("constant '{target}'"))?;
        self.env.bind(target, Binding::Literal { value, scalar })
    }

    fn scalar_assign(&mut self, target: &str, op: BinOp, left: &Expr, right: &Expr) -> Result<()> {
        let mnemonic = match op {
            BinOp::Add => "addi",
            BinOp::Sub => "subi",
            BinOp::Mul => "muli",
            BinOp::FloorDiv => "divsi",
            BinOp::Mod => "remsi",
            BinOp::Div => {
                return Err(CompileError::Unsupported(
                    "'/' on index values; use '//' for integer division".into(),
                ));
            }
            other => {
                return Err(CompileError::Unsupported(format!(
                    "operator '{}' in scalar arithmetic",
                    other.symbol()
                )));
            }
        };
        self.env.ensure_unbound(target)?;
        let lhs = self.env.resolve(left)?;
        let rhs = self.env.resolve(right)?;
        let (lhs, rhs) = (lhs.index("left operand")?, rhs.index("right operand")?);
        let ssa = self.env.ssa_name(target);
        self.body
            .line(format!("{ssa} = arith.{mnemonic} {lhs}, {rhs} : index"));
        self.env.bind(target, Binding::Index { ssa })
    }

    fn assign_op(&mut self, target: &str, op: Opcode, args: &[Expr], keywords: &[Keyword]) -> Result<()> {
        let mnemonic = op.mnemonic();
        match op {
            Opcode::TaskId | Opcode::BlockIdx | Opcode::BlockNum => {
                if !args.is_empty() || !keywords.is_empty() {
                    return Err(arity_error(mnemonic, "no arguments"));
                }
                if op == Opcode::TaskId {
                    self.env.mark_task_id();
                    return self.env.bind(
                        target,
                        Binding::Index {
                            ssa: "%arg0".into(),
                        },
                    );
                }
                self.env.ensure_unbound(target)?;
                let ssa = self.env.ssa_name(target);
                self.body.line(format!("{ssa} = pto.{mnemonic} : index"));
                self.env.bind(target, Binding::Index { ssa })
            }
            Opcode::Assign => Err(tassign_error()),
            op if op.is_statement_only() => Err(CompileError::Unsupported(format!(
                "{mnemonic}(...) produces no value; call it as a statement"
            ))),
            _ => {
                no_keywords(mnemonic, keywords)?;
                let dst = match self.env.lookup(target) {
                    Ok(Binding::Tile { ssa, ty }) => Operand::Tile {
                        ssa: ssa.clone(),
                        ty: ty.clone(),
                    },
                    Ok(_) => {
                        return Err(CompileError::Type(format!(
                            "'{target}' is not a tile buffer and cannot receive {mnemonic}(...)"
                        )));
                    }
                    Err(_) => {
                        return Err(CompileError::Symbol(format!(
                            "'{target}' must be declared as a tile before {mnemonic}(...) writes to it"
                        )));
                    }
                };
                let operands = self.operands(args)?;
                self.dst_op(op, &dst, &operands)
            }
        }
    }

    fn operands(&mut self, args: &[Expr]) -> Result<Vec<Operand>> {
        args.iter().map(|a| self.env.resolve(a)).collect()
    }

    /// Destination-first tile operations; `rest` excludes the destination.
    fn dst_op(&mut self, op: Opcode, dst: &Operand, rest: &[Operand]) -> Result<()> {
        let mnemonic = op.mnemonic();
        match (op, rest) {
            (Opcode::Load, [src]) => legalize::load(&mut self.env, &mut self.body, dst, src, None),
            (Opcode::Load, [src, row, col]) => {
                legalize::load(&mut self.env, &mut self.body, dst, src, Some((row, col)))
            }
            (Opcode::Load, _) => Err(arity_error(mnemonic, "a source tensor and an optional (row, col) offset")),
            (Opcode::Mov, [src]) => legalize::mov(&mut self.body, dst, src),
            (Opcode::Mov, _) => Err(arity_error(mnemonic, "exactly one source tile")),
            (Opcode::Matmul, [lhs, rhs]) => legalize::matmul(&mut self.body, dst, lhs, rhs),
            (Opcode::Matmul, _) => Err(arity_error(mnemonic, "(lhs, rhs)")),
            (Opcode::MatmulAcc, [acc, lhs, rhs]) => {
                legalize::matmul_acc(&mut self.body, dst, acc, lhs, rhs)
            }
            (Opcode::MatmulAcc, _) => Err(arity_error(mnemonic, "(acc, lhs, rhs)")),
            (Opcode::Generic(m), ins) => legalize::generic(&mut self.body, m, dst, ins),
            _ => Err(CompileError::Unsupported(format!(
                "{mnemonic}(...) has no destination operand"
            ))),
        }
    }

    // ---- statement-form calls ----

    fn call_stmt(&mut self, name: &str, args: &[Expr], keywords: &[Keyword]) -> Result<()> {
        if Decl::from_name(name).is_some() {
            return Err(CompileError::Unsupported(format!(
                "{name}(...) declares a value; assign it to a name"
            )));
        }
        let op = opcodes::lookup(name)?;
        let mnemonic = op.mnemonic();
        match op {
            Opcode::Prologue | Opcode::Epilogue | Opcode::Program => Ok(()),
            Opcode::Comment => {
                no_keywords(mnemonic, keywords)?;
                let [text] = args else {
                    return Err(arity_error(mnemonic, "one string argument"));
                };
                let text = eval(text, &self.env)?.into_string("comment text")?;
                for line in text.lines() {
                    if line.is_empty() {
                        self.body.line("//");
                    } else {
                        self.body.line(format!("// {line}"));
                    }
                }
                Ok(())
            }
            Opcode::KernelName => {
                no_keywords(mnemonic, keywords)?;
                let [text] = args else {
                    return Err(arity_error(mnemonic, "one string argument"));
                };
                self.set_kernel_name(eval(text, &self.env)?.into_string("kernel name")?)
            }
            Opcode::Assign => Err(tassign_error()),
            Opcode::TaskId | Opcode::BlockIdx | Opcode::BlockNum => Err(CompileError::Unsupported(
                format!("{mnemonic}() must be assigned to a name"),
            )),
            Opcode::Store => {
                no_keywords(mnemonic, keywords)?;
                let operands = self.operands(args)?;
                match operands.as_slice() {
                    [dst, src] => legalize::store(&mut self.env, &mut self.body, dst, src, None),
                    [dst, row, col, src] => legalize::store(
                        &mut self.env,
                        &mut self.body,
                        dst,
                        src,
                        Some((row, col)),
                    ),
                    _ => Err(arity_error(mnemonic, "(dst_tensor, [row, col,] src_tile)")),
                }
            }
            Opcode::Push => {
                no_keywords(mnemonic, keywords)?;
                match self.operands(args)?.as_slice() {
                    [dst, src, token] => legalize::push(&mut self.body, dst, src, token),
                    _ => Err(arity_error(mnemonic, "(dst_tensor, src_tile, token)")),
                }
            }
            Opcode::Print => {
                no_keywords(mnemonic, keywords)?;
                match self.operands(args)?.as_slice() {
                    [src] => legalize::print(&mut self.body, src),
                    _ => Err(arity_error(mnemonic, "one source tile")),
                }
            }
            Opcode::RecordEvent | Opcode::WaitEvent => self.event(op, args, keywords),
            Opcode::Sync => {
                if !args.is_empty() {
                    return Err(arity_error(mnemonic, "only the keyword argument pipe=..."));
                }
                match keywords {
                    [] => legalize::sync(&mut self.body, None),
                    [kw] if kw.name == "pipe" => {
                        let pipe = eval(&kw.value, &self.env)?.into_string("pipe")?;
                        legalize::sync(&mut self.body, Some(&pipe))
                    }
                    _ => Err(arity_error(mnemonic, "only the keyword argument pipe=...")),
                }
            }
            Opcode::Load | Opcode::Mov | Opcode::Matmul | Opcode::MatmulAcc | Opcode::Generic(_) => {
                no_keywords(mnemonic, keywords)?;
                let operands = self.operands(args)?;
                let Some((dst, rest)) = operands.split_first() else {
                    return Err(arity_error(mnemonic, "a destination tile as first argument"));
                };
                dst.tile(&format!("{mnemonic} destination"))?;
                self.dst_op(op, dst, rest)
            }
        }
    }

    fn event(&mut self, op: Opcode, args: &[Expr], keywords: &[Keyword]) -> Result<()> {
        let mnemonic = op.mnemonic();
        let usage = "only the keyword arguments src_op, dst_op and token";
        if !args.is_empty() {
            return Err(arity_error(mnemonic, usage));
        }
        let find = |name: &str| keywords.iter().find(|kw| kw.name == name);
        let (Some(src_op), Some(dst_op), Some(token)) = (find("src_op"), find("dst_op"), find("token"))
        else {
            return Err(arity_error(mnemonic, usage));
        };
        if keywords.len() != 3 {
            return Err(arity_error(mnemonic, usage));
        }
        let src_op = eval(&src_op.value, &self.env)?.into_string("src_op")?;
        let dst_op = eval(&dst_op.value, &self.env)?.into_string("dst_op")?;
        let token = self.env.resolve(&token.value)?;
        legalize::event(&mut self.body, op, &src_op, &dst_op, &token)
    }

    fn set_kernel_name(&mut self, name: String) -> Result<()> {
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(CompileError::Config(format!(
                "kernel name {name:?} must be a non-empty identifier"
            )));
        }
        self.kernel_name = Some(name);
        Ok(())
    }

    // ---- declarations ----

    fn declare(
        &mut self,
        target: &str,
        helper: &str,
        decl: Decl,
        args: &[Expr],
        keywords: &[Keyword],
    ) -> Result<()> {
        self.env.ensure_unbound(target)?;
        match decl {
            Decl::Tensor => self.declare_tensor(target, args, keywords),
            Decl::Tile => {
                let fields = self.tile_fields(args, keywords)?;
                self.finish_tile(target, helper, None, fields)
            }
            Decl::Sugar(loc) => {
                let (name, fields) = self.sugar_fields(helper, loc, args, keywords)?;
                self.finish_tile(target, helper, name, fields)
            }
            Decl::Const => {
                no_keywords(helper, keywords)?;
                let (value, scalar) = match args {
                    [_, value] => (value, None),
                    [_, value, ty] => (value, Some(eval(ty, &self.env)?.into_string("const type")?)),
                    _ => return Err(arity_error("const", "(name, value[, scalar(\"type\")])")),
                };
                if args[0].as_str().is_none() {
                    return Err(arity_error("const", "a string name as first argument"));
                }
                self.bind_literal(target, value, scalar)
            }
            Decl::Program => {
                no_keywords(helper, keywords)?;
                match args {
                    [] => {}
                    [name] => {
                        let name = eval(name, &self.env)?.into_string("program name")?;
                        self.set_kernel_name(name)?;
                    }
                    _ => return Err(arity_error("PTO", "at most one name argument")),
                }
                // The receiver of `pto.op(...)` calls; never an operand.
                self.env.bind(
                    target,
                    Binding::Literal {
                        value: crate::ConstValue::Str(helper.to_string()),
                        scalar: None,
                    },
                )
            }
        }
    }

    fn declare_tensor(&mut self, target: &str, args: &[Expr], keywords: &[Keyword]) -> Result<()> {
        let mut dtype: Option<DType> = None;
        let mut shape: Option<[u32; 2]> = None;
        let mut stride: Option<[u32; 2]> = None;
        let mut layout = TensorLayout::Nd;
        let mut role: Option<Role> = None;
        let mut slot: Option<u32> = None;
        let mut declared_name: Option<&str> = None;

        let has_dtype_kw = keywords.iter().any(|kw| kw.name == "dtype");
        let named = has_dtype_kw && args.first().and_then(Expr::as_str).is_some();
        if named {
            // tensor("name", (H, W), dtype=...)
            declared_name = args[0].as_str();
            match &args[1..] {
                [] => {}
                [s] => shape = Some(eval(s, &self.env)?.as_pair("tensor shape")?),
                _ => return Err(arity_error("tensor", "(\"name\", shape, dtype=...)")),
            }
        } else {
            // tensor(dtype, shape[, stride[, layout]])
            if args.len() > 4 {
                return Err(arity_error("tensor", "at most (dtype, shape, stride, layout)"));
            }
            for (i, arg) in args.iter().enumerate() {
                let v = eval(arg, &self.env)?;
                match i {
                    0 => dtype = Some(v.into_string("tensor dtype")?.parse()?),
                    1 => shape = Some(v.as_pair("tensor shape")?),
                    2 => stride = Some(v.as_pair("tensor stride")?),
                    _ => layout = v.into_string("tensor layout")?.parse()?,
                }
            }
        }

        for kw in keywords {
            let v = eval(&kw.value, &self.env)?;
            match kw.name.as_str() {
                "dtype" => dtype = Some(v.into_string("tensor dtype")?.parse()?),
                "shape" => shape = Some(v.as_pair("tensor shape")?),
                "stride" => stride = Some(v.as_pair("tensor stride")?),
                "layout" => layout = v.into_string("tensor layout")?.parse()?,
                "role" => role = Some(v.into_string("tensor role")?.parse()?),
                "arg" | "arg_index" => slot = Some(v.as_u32("tensor argument index")?),
                other => {
                    return Err(CompileError::Config(format!(
                        "unknown tensor(...) keyword '{other}'"
                    )));
                }
            }
        }

        let (Some(dtype), Some(shape)) = (dtype, shape) else {
            return Err(CompileError::Config("tensor(...) requires dtype and shape".into()));
        };
        let mut ty = TensorType::new(dtype, shape).with_layout(layout);
        if let Some(stride) = stride {
            if stride != [shape[1], 1] {
                ty = ty.with_stride(stride);
            }
        }

        let name = declared_name.unwrap_or(target);
        let slot = self.env.declare_arg(name, slot, &ty, role)?;
        let ssa = self.env.ssa_name(name);
        legalize::tensor_view(&mut self.env, &mut self.body, &ssa, slot, &ty);
        log::debug!("bound {name} to %arg{slot}: {ty}");
        self.env.bind(target, Binding::Tensor { ssa, ty })
    }

    fn tile_fields(&mut self, args: &[Expr], keywords: &[Keyword]) -> Result<TileFields> {
        let mut fields = TileFields::new(None);
        if args.len() > 4 {
            return Err(arity_error("tile", "at most (loc, dtype, rows, cols)"));
        }
        for (i, arg) in args.iter().enumerate() {
            let v = eval(arg, &self.env)?;
            match i {
                0 => fields.loc = Some(v.into_string("tile loc")?.parse()?),
                1 => fields.dtype = Some(v.into_string("tile dtype")?.parse()?),
                2 => fields.rows = Some(v.as_u32("tile rows")?),
                _ => fields.cols = Some(v.as_u32("tile cols")?),
            }
        }
        for kw in keywords {
            match kw.name.as_str() {
                "loc" => {
                    let v = eval(&kw.value, &self.env)?;
                    fields.loc = Some(v.into_string("tile loc")?.parse()?);
                }
                "rows" => fields.rows = Some(eval(&kw.value, &self.env)?.as_u32("tile rows")?),
                "cols" => fields.cols = Some(eval(&kw.value, &self.env)?.as_u32("tile cols")?),
                _ => self.tile_option("tile", kw, &mut fields)?,
            }
        }
        Ok(fields)
    }

    fn sugar_fields(
        &mut self,
        helper: &str,
        loc: Location,
        args: &[Expr],
        keywords: &[Keyword],
    ) -> Result<(Option<String>, TileFields)> {
        let mut fields = TileFields::new(Some(loc));
        let name = match args {
            [] => None,
            [name] => match name.as_str() {
                Some(s) => Some(s.to_string()),
                None => return Err(arity_error(helper, "an optional string name and keyword fields")),
            },
            _ => return Err(arity_error(helper, "an optional string name and keyword fields")),
        };
        for kw in keywords {
            match kw.name.as_str() {
                "shape" => {
                    let [rows, cols] = eval(&kw.value, &self.env)?.as_pair("tile shape")?;
                    fields.rows = Some(rows);
                    fields.cols = Some(cols);
                }
                // broadcast-axis annotation; not part of the tile type
                "b" => {}
                _ => self.tile_option(helper, kw, &mut fields)?,
            }
        }
        Ok((name, fields))
    }

    /// Keywords common to every tile declaration form.
    fn tile_option(&mut self, helper: &str, kw: &Keyword, fields: &mut TileFields) -> Result<()> {
        match kw.name.as_str() {
            "valid_row" => fields.valid_row = Some(self.env.resolve(&kw.value)?),
            "valid_col" => fields.valid_col = Some(self.env.resolve(&kw.value)?),
            name => {
                let v = eval(&kw.value, &self.env)?;
                match name {
                    "dtype" => fields.dtype = Some(v.into_string("tile dtype")?.parse()?),
                    "blayout" => fields.blayout = v.into_string("blayout")?.parse()?,
                    "slayout" => fields.slayout = v.into_string("slayout")?.parse()?,
                    "valid" => fields.valid = Some(v.into_string("valid")?),
                    "fractal" => fields.fractal = Some(v.as_u32("fractal")?),
                    "pad" => {
                        fields.pad = match v {
                            Value::Str(s) => s.parse()?,
                            other => Pad::from_code(other.as_i64("pad")?)?,
                        }
                    }
                    "addr" => {
                        let addr = v.as_i64("addr")?;
                        fields.addr = Some(u64::try_from(addr).map_err(|_| {
                            CompileError::Config(format!("tile addr must be non-negative, got {addr}"))
                        })?);
                    }
                    other => {
                        return Err(CompileError::Config(format!(
                            "unknown {helper}(...) keyword '{other}'"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn finish_tile(
        &mut self,
        target: &str,
        helper: &str,
        declared_name: Option<String>,
        fields: TileFields,
    ) -> Result<()> {
        let (Some(loc), Some(dtype), Some(rows), Some(cols)) =
            (fields.loc, fields.dtype, fields.rows, fields.cols)
        else {
            return Err(CompileError::Config(if helper == "tile" {
                "tile(...) requires loc, dtype, rows and cols".into()
            } else {
                format!("{helper}(...) requires dtype=... and shape=(rows, cols)")
            }));
        };
        if rows == 0 || cols == 0 {
            return Err(CompileError::Config(format!(
                "{helper}(...) shape must be positive, got {rows}x{cols}"
            )));
        }

        let dynamic = fields.valid_row.is_some() || fields.valid_col.is_some();
        let valid = match (&fields.valid, dynamic) {
            (Some(_), true) => {
                return Err(CompileError::Config(format!(
                    "{helper}(...) cannot combine valid=... with valid_row=/valid_col="
                )));
            }
            (Some(text), false) => {
                let parsed = text
                    .split_once('x')
                    .and_then(|(r, c)| Some((r.trim().parse::<u32>().ok()?, c.trim().parse::<u32>().ok()?)));
                let Some((v_rows, v_cols)) = parsed else {
                    return Err(CompileError::Config(format!(
                        "{helper}(..., valid=...) must look like \"16x16\", got {text:?}"
                    )));
                };
                if v_rows > rows || v_cols > cols {
                    return Err(CompileError::Config(format!(
                        "valid shape {v_rows}x{v_cols} exceeds the allocated {rows}x{cols}"
                    )));
                }
                ValidShape::Static {
                    rows: v_rows,
                    cols: v_cols,
                }
            }
            (None, true) => ValidShape::Dynamic {
                rows: fields.valid_row.is_some(),
                cols: fields.valid_col.is_some(),
            },
            (None, false) => ValidShape::Full,
        };
        let valid_row = match &fields.valid_row {
            Some(op) => Some(op.index("valid_row")?.to_string()),
            None => None,
        };
        let valid_col = match &fields.valid_col {
            Some(op) => Some(op.index("valid_col")?.to_string()),
            None => None,
        };

        let ty = TileType {
            loc,
            dtype,
            rows,
            cols,
            valid,
            blayout: fields.blayout,
            slayout: fields.slayout,
            fractal: fields.fractal,
            pad: fields.pad,
        };
        let ssa = self
            .env
            .ssa_name(declared_name.as_deref().unwrap_or(target));
        legalize::alloc_tile(
            &mut self.body,
            &ssa,
            &ty,
            fields.addr,
            valid_row.as_deref(),
            valid_col.as_deref(),
        );
        self.env.bind(target, Binding::Tile { ssa, ty })
    }

    // ---- control flow ----

    fn for_loop(&mut self, target: &Expr, iter: &Expr, body: &[Stmt], orelse: &[Stmt]) -> Result<()> {
        if !orelse.is_empty() {
            return Err(CompileError::Unsupported("for ... else".into()));
        }
        let Some(var) = target.as_name() else {
            return Err(CompileError::Unsupported(format!(
                "loop target {}; use a single name",
                target.describe()
            )));
        };
        let ExprKind::Call {
            func,
            args,
            keywords,
        } = &iter.kind
        else {
            return Err(CompileError::Unsupported(format!(
                "iterating over {}; only range(...) loops are supported",
                iter.describe()
            )));
        };
        if func.as_name() != Some("range") {
            return Err(CompileError::Unsupported(format!(
                "iterating over {}; only range(...) loops are supported",
                iter.describe()
            )));
        }
        no_keywords("range", keywords)?;

        let zero = Expr::new(ExprKind::Int(0), iter.line);
        let one = Expr::new(ExprKind::Int(1), iter.line);
        let (lb, ub, step) = match args.as_slice() {
            [ub] => (&zero, ub, &one),
            [lb, ub] => (lb, ub, &one),
            [lb, ub, step] => (lb, ub, step),
            _ => return Err(arity_error("range", "1 to 3 arguments")),
        };
        let lb = self.env.resolve(lb)?.index("loop lower bound")?.to_string();
        let ub = self.env.resolve(ub)?.index("loop upper bound")?.to_string();
        let step = self.env.resolve(step)?.index("loop step")?.to_string();

        self.env.ensure_unbound(var)?;
        let iv = self.env.ssa_name(var);
        self.body
            .open(format!("scf.for {iv} = {lb} to {ub} step {step}"));
        self.env.push_scope();
        self.env.bind(var, Binding::Index { ssa: iv })?;
        let result = self.block(body);
        self.env.pop_scope();
        result?;
        self.body.close()
    }

    fn if_stmt(&mut self, test: &Expr, body: &[Stmt], orelse: &[Stmt]) -> Result<()> {
        let ExprKind::Compare {
            left,
            ops,
            comparators,
        } = &test.kind
        else {
            return Err(CompileError::Unsupported(format!(
                "if condition {}; use a single comparison",
                test.describe()
            )));
        };
        let ([op], [right]) = (ops.as_slice(), comparators.as_slice()) else {
            return Err(CompileError::Unsupported(
                "chained comparison in if condition".into(),
            ));
        };
        let predicate = match op {
            CmpOp::Eq => "eq",
            CmpOp::NotEq => "ne",
            CmpOp::Lt => "slt",
            CmpOp::LtE => "sle",
            CmpOp::Gt => "sgt",
            CmpOp::GtE => "sge",
            other => {
                return Err(CompileError::Unsupported(format!(
                    "comparison operator {other:?} in if condition"
                )));
            }
        };
        let lhs = self.env.resolve(left)?.index("comparison operand")?.to_string();
        let rhs = self.env.resolve(right)?.index("comparison operand")?.to_string();
        let cond = self.env.temp();
        self.body
            .line(format!("{cond} = arith.cmpi {predicate}, {lhs}, {rhs} : index"));
        self.body.open(format!("scf.if {cond}"));
        self.region(body)?;
        if !orelse.is_empty() {
            self.body.else_open()?;
            self.region(orelse)?;
        }
        self.body.close()
    }
}

fn tassign_error() -> CompileError {
    CompileError::Unsupported(
        "tassign(...); give the tile an address with addr=... in its declaration instead".into(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(src: &str) -> Result<KernelSpec> {
        let unit = tileasm_parser::parse(src)?;
        FunctionCompiler::new(&CompileOptions::default())?.compile(&unit.functions[0])
    }

    fn body_lines(spec: &KernelSpec) -> Vec<String> {
        spec.text
            .lines()
            .filter(|l| l.starts_with("    ") && l.trim() != "return")
            .map(|l| l.trim().to_string())
            .collect()
    }

    #[test]
    fn constants_hoisted_and_deduplicated() {
        let spec = compile(
            "def k():\n\
             \x20   x = tensor(dtype=\"f32\", shape=(16, 16))\n\
             \x20   t = tile(\"Vec\", \"f32\", 16, 16)\n\
             \x20   for i in range(4):\n\
             \x20       load(t, x, i, 16)\n",
        )
        .unwrap();
        let lines = body_lines(&spec);
        let c16: Vec<_> = lines
            .iter()
            .filter(|l| l.starts_with("%c16 = arith.constant"))
            .collect();
        assert_eq!(c16.len(), 1);
        // every constant precedes the first non-constant line
        let first_op = lines
            .iter()
            .position(|l| !l.contains("arith.constant"))
            .unwrap();
        assert!(lines[first_op..].iter().all(|l| !l.contains("arith.constant")));
        assert!(lines.iter().any(|l| l.starts_with("scf.for %i = %c0 to %c4 step %c1 {")));
    }

    #[test]
    fn region_names_cannot_be_rebound_later() {
        let after_loop = "def k():\n\
                          \x20   for i in range(2):\n\
                          \x20       x = vec(dtype=\"f16\", shape=(16, 16))\n\
                          \x20   x = vec(dtype=\"f16\", shape=(16, 16))\n";
        let err = compile(after_loop).unwrap_err();
        assert_eq!(err.line(), Some(4));
        assert!(
            matches!(err.root(), CompileError::Symbol(m) if m.contains("rebinding is not allowed")),
            "{err}"
        );

        let after_branch = "def k():\n\
                            \x20   n = get_block_idx()\n\
                            \x20   if n == 1:\n\
                            \x20       y = tensor(dtype=\"f16\", shape=(16, 16))\n\
                            \x20   y = vec(dtype=\"f16\", shape=(16, 16))\n";
        let err = compile(after_branch).unwrap_err();
        assert_eq!(err.line(), Some(5));
        assert!(matches!(err.root(), CompileError::Symbol(_)), "{err}");

        let second_loop = "def k():\n\
                           \x20   for i in range(2):\n\
                           \x20       pass\n\
                           \x20   for i in range(3):\n\
                           \x20       pass\n";
        assert_eq!(compile(second_loop).unwrap_err().line(), Some(4));
    }

    #[test]
    fn region_names_are_not_visible_after_it() {
        let src = "def k():\n\
                   \x20   for i in range(2):\n\
                   \x20       j = i + 1\n\
                   \x20   m = j * 2\n";
        let err = compile(src).unwrap_err();
        assert_eq!(err.line(), Some(4));
        assert!(
            matches!(err.root(), CompileError::Symbol(m) if m.contains("not visible outside")),
            "{err}"
        );
    }

    #[test]
    fn outer_names_cannot_be_shadowed() {
        let src = "def k():\n\
                   \x20   n = 4\n\
                   \x20   for i in range(n):\n\
                   \x20       n = 5\n";
        let err = compile(src).unwrap_err();
        assert_eq!(err.line(), Some(4));
        assert!(matches!(err.root(), CompileError::Symbol(_)));
    }

    #[test]
    fn if_else_lowering() {
        let src = "def k():\n\
                   \x20   b = get_block_idx()\n\
                   \x20   if b < 2:\n\
                   \x20       comment(\"low\")\n\
                   \x20   else:\n\
                   \x20       sync(pipe=\"V\")\n";
        let lines = body_lines(&compile(src).unwrap());
        assert!(lines.contains(&"%b = pto.get_block_idx : index".to_string()));
        assert!(lines.contains(&"%t1 = arith.cmpi slt, %b, %c2 : index".to_string()));
        let at = lines.iter().position(|l| l == "scf.if %t1 {").unwrap();
        assert_eq!(lines[at + 1], "// low");
        assert_eq!(lines[at + 2], "} else {");
        assert_eq!(lines[at + 3], "pto.tsync {pipe=\"V\"}");
        assert_eq!(lines[at + 4], "}");
    }

    #[test]
    fn chained_comparison_rejected() {
        let src = "def k():\n    b = get_block_idx()\n    if 0 < b < 2:\n        pass\n";
        let err = compile(src).unwrap_err();
        assert!(matches!(err.root(), CompileError::Unsupported(_)));
    }

    #[test]
    fn tile_declarations() {
        let src = "def k():\n\
                   \x20   n = get_block_num()\n\
                   \x20   a = tile(\"Vec\", \"f16\", 16, 32, valid=\"8x16\", pad=\"Max\")\n\
                   \x20   b = vec(\"named\", dtype=\"f32\", shape=(16, 64), valid_col=n, addr=0x100)\n\
                   \x20   c = acc(dtype=\"f32\", shape=(16, 16), fractal=512, b=\"row\")\n";
        let lines = body_lines(&compile(src).unwrap());
        assert!(lines.iter().any(|l| l.starts_with("%a = pto.alloc_tile : ")
            && l.contains("v_row=8, v_col=16")
            && l.contains("pad=2")));
        assert!(lines.iter().any(|l| l.starts_with("%named = pto.alloc_tile addr=256 valid_col=%n : ")
            && l.contains("v_row=16, v_col=?")));
        assert!(lines.iter().any(|l| l.starts_with("%c = pto.alloc_tile : ")
            && l.contains("blayout=col_major, slayout=row_major, fractal=512")));
    }

    #[test]
    fn tile_declaration_errors() {
        let cases = [
            "    a = tile(\"Vec\", \"f16\", 16, 16, valid=\"32x8\")\n",
            "    a = vec(dtype=\"f16\", shape=(16, 16), valid=\"8x8\", valid_row=4)\n",
            "    a = vec(dtype=\"f16\")\n",
            "    a = vec(dtype=\"f16\", shape=(16, 16), colour=1)\n",
            "    a = tile(\"Vec\", \"f16\", 0, 16)\n",
        ];
        for case in cases {
            let err = compile(&format!("def k():\n{case}")).unwrap_err();
            assert!(matches!(err.root(), CompileError::Config(_)), "{case}: {err}");
        }
    }

    #[test]
    fn explicit_kernel_name_and_object_style() {
        let src = "def k():\n\
                   \x20   pto = PTO(\"renamed\")\n\
                   \x20   x = pto.tensor(\"inp\", (8, 8), dtype=\"f32\")\n\
                   \x20   t = pto.vec(dtype=\"f32\", shape=(8, 8))\n\
                   \x20   t = pto.load(x)\n\
                   \x20   return pto.program()\n";
        let spec = compile(src).unwrap();
        assert_eq!(spec.name, "renamed");
        assert_eq!(spec.tensor_args[0].name, "inp");
        assert!(spec.text.contains("%inp = pto.make_tensor_view %arg0"));
        assert!(spec.text.contains("func.func @renamed(%arg0: !pto.ptr<f32>)"));
    }

    #[test]
    fn assignment_needs_declared_destination() {
        let src = "def k():\n    x = tensor(\"f32\", (8, 8))\n    t = load(x)\n";
        let err = compile(src).unwrap_err();
        assert!(matches!(err.root(), CompileError::Symbol(_)));
        let src = "def k():\n    x = tensor(\"f32\", (8, 8))\n    store(x)\n";
        assert!(matches!(
            compile(src).unwrap_err().root(),
            CompileError::Config(_)
        ));
    }

    #[test]
    fn events_need_exact_keywords() {
        let ok = "def k():\n    record_event(src_op=\"TLOAD\", dst_op=\"TADD\", token=0)\n";
        let lines = body_lines(&compile(ok).unwrap());
        assert!(lines.contains(
            &"pto.record_event {src_op=#op<TLOAD>, dst_op=#op<TADD>, token=%c0}".to_string()
        ));
        let missing = "def k():\n    wait_event(src_op=\"TLOAD\", token=0)\n";
        assert!(compile(missing).is_err());
        let extra =
            "def k():\n    wait_event(src_op=\"A\", dst_op=\"B\", token=0, pipe=\"V\")\n";
        assert!(compile(extra).is_err());
    }

    #[test]
    fn unsupported_statements_carry_lines() {
        let src = "def k():\n    pass\n    while True:\n        pass\n";
        let err = compile(src).unwrap_err();
        assert_eq!(err.line(), Some(3));
        let src = "def k():\n    x = 1\n    x += 1\n";
        assert!(matches!(
            compile(src).unwrap_err().root(),
            CompileError::Unsupported(_)
        ));
        let src = "def k():\n    tassign(x, 0)\n";
        assert!(compile(src).is_err());
    }

    #[test]
    fn scalar_arithmetic_needs_index_operands() {
        let src = "def k():\n    b = get_block_idx()\n    c = b // 2\n    d = c % 3\n";
        let lines = body_lines(&compile(src).unwrap());
        assert!(lines.contains(&"%c = arith.divsi %b, %c2 : index".to_string()));
        assert!(lines.contains(&"%d = arith.remsi %c, %c3 : index".to_string()));
        let src = "def k():\n    b = get_block_idx()\n    c = b / 2\n";
        assert!(compile(src).is_err());
        let src = "def k():\n    b = get_block_idx()\n    c = b + 1.5\n";
        assert!(matches!(
            compile(src).unwrap_err().root(),
            CompileError::Type(_)
        ));
    }
}
