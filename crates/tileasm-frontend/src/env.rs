//! Per-function compiler state.
//!
//! [`Env`] owns everything one compilation accumulates besides the body
//! text: surface-name bindings, the SSA name allocator, the deduplicated
//! constant pools and the kernel argument table. Constants are written to a
//! separate prelude that is spliced in front of the body, so a constant first
//! needed inside a loop still dominates every later use.

use std::collections::{BTreeMap, HashMap, HashSet};

use tileasm_host::Role;
use tileasm_ir::{CompileError, Emitter, Result, TensorType, TileType, tensor_view_type};
use tileasm_parser::{Expr, ExprKind, UnaryOp};

use crate::ConstValue;

/// What a surface name refers to.
#[derive(Clone, Debug)]
pub(crate) enum Binding {
    Tensor { ssa: String, ty: TensorType },
    Tile { ssa: String, ty: TileType },
    /// A runtime `index` value: loop variable, accessor result or arithmetic.
    Index { ssa: String },
    /// A compile-time constant; materialized only when used as an operand.
    Literal {
        value: ConstValue,
        scalar: Option<String>,
    },
}

impl Binding {
    fn kind(&self) -> &'static str {
        match self {
            Self::Tensor { .. } => "tensor view",
            Self::Tile { .. } => "tile buffer",
            Self::Index { .. } => "index value",
            Self::Literal { .. } => "compile-time constant",
        }
    }
}

/// A resolved instruction operand.
#[derive(Clone, Debug)]
pub(crate) enum Operand {
    Tensor { ssa: String, ty: TensorType },
    Tile { ssa: String, ty: TileType },
    Scalar { ssa: String, ty: String },
}

impl Operand {
    pub(crate) fn ssa(&self) -> &str {
        match self {
            Self::Tensor { ssa, .. } | Self::Tile { ssa, .. } | Self::Scalar { ssa, .. } => ssa,
        }
    }

    /// Type annotation written next to the operand.
    pub(crate) fn type_text(&self) -> String {
        match self {
            Self::Tensor { ty, .. } => tensor_view_type(ty.dtype),
            Self::Tile { ty, .. } => ty.to_string(),
            Self::Scalar { ty, .. } => ty.clone(),
        }
    }

    fn kind(&self) -> String {
        match self {
            Self::Tensor { .. } => "tensor view".into(),
            Self::Tile { ty, .. } => format!("{} tile", ty.loc),
            Self::Scalar { ty, .. } => format!("{ty} scalar"),
        }
    }

    pub(crate) fn tile(&self, role: &str) -> Result<&TileType> {
        match self {
            Self::Tile { ty, .. } => Ok(ty),
            other => Err(CompileError::Type(format!(
                "{role} must be a tile buffer, got {} {}",
                other.kind(),
                other.ssa()
            ))),
        }
    }

    pub(crate) fn tensor(&self, role: &str) -> Result<&TensorType> {
        match self {
            Self::Tensor { ty, .. } => Ok(ty),
            other => Err(CompileError::Type(format!(
                "{role} must be a tensor view, got {} {}",
                other.kind(),
                other.ssa()
            ))),
        }
    }

    /// The SSA name of an `index` value.
    pub(crate) fn index(&self, role: &str) -> Result<&str> {
        match self {
            Self::Scalar { ssa, ty } if ty == "index" => Ok(ssa),
            other => Err(CompileError::Type(format!(
                "{role} must be an index value, got {} {}",
                other.kind(),
                other.ssa()
            ))),
        }
    }
}

/// One entry of the kernel argument table.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ArgEntry {
    pub name: String,
    pub ty: TensorType,
    pub role: Option<Role>,
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// `argN` names belong to function parameters.
fn is_reserved(name: &str) -> bool {
    name.strip_prefix("arg")
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

fn float_text(value: f64) -> Result<String> {
    if !value.is_finite() {
        return Err(CompileError::Type(format!(
            "float constant {value} is not finite"
        )));
    }
    let mut text = format!("{value:?}");
    if !text.contains('.') {
        match text.find('e') {
            Some(pos) => text.insert_str(pos, ".0"),
            None => text.push_str(".0"),
        }
    }
    Ok(text)
}

#[derive(Debug, Default)]
pub(crate) struct Env {
    bindings: HashMap<String, Binding>,
    /// Names bound inside each open region, innermost last.
    scopes: Vec<Vec<String>>,
    /// Names whose region has closed, with the kind they were bound as.
    retired: HashMap<String, &'static str>,
    ssa_names: HashSet<String>,
    temps: usize,
    index_pool: BTreeMap<i64, String>,
    bool_pool: BTreeMap<bool, String>,
    typed_pool: BTreeMap<(String, String), String>,
    prelude: Emitter,
    args: BTreeMap<u32, ArgEntry>,
    next_slot: u32,
    uses_task_id: bool,
}

impl Env {
    /// A fresh environment with `consts` bound as compile-time constants.
    pub(crate) fn new(consts: &BTreeMap<String, ConstValue>) -> Result<Self> {
        let mut env = Self::default();
        for (name, value) in consts {
            if !is_identifier(name) {
                return Err(CompileError::Config(format!(
                    "constant name '{name}' is not a valid identifier"
                )));
            }
            env.bind(
                name,
                Binding::Literal {
                    value: value.clone(),
                    scalar: None,
                },
            )?;
        }
        Ok(env)
    }

    // ---- bindings ----

    pub(crate) fn ensure_unbound(&self, name: &str) -> Result<()> {
        let kind = match self.bindings.get(name) {
            Some(existing) => Some(existing.kind()),
            None => self.retired.get(name).copied(),
        };
        match kind {
            Some(kind) => Err(CompileError::Symbol(format!(
                "'{name}' is already bound to a {kind}; rebinding is not allowed"
            ))),
            None => Ok(()),
        }
    }

    pub(crate) fn bind(&mut self, name: &str, binding: Binding) -> Result<()> {
        self.ensure_unbound(name)?;
        if let Some(scope) = self.scopes.last_mut() {
            scope.push(name.to_string());
        }
        self.bindings.insert(name.to_string(), binding);
        Ok(())
    }

    pub(crate) fn lookup(&self, name: &str) -> Result<&Binding> {
        if let Some(binding) = self.bindings.get(name) {
            return Ok(binding);
        }
        Err(CompileError::Symbol(match self.retired.get(name) {
            Some(kind) => format!("{kind} '{name}' is not visible outside the region that bound it"),
            None => format!("unknown symbol '{name}'"),
        }))
    }

    pub(crate) fn const_value(&self, name: &str) -> Option<&ConstValue> {
        match self.bindings.get(name) {
            Some(Binding::Literal { value, .. }) => Some(value),
            _ => None,
        }
    }

    /// Enters a structured region.
    pub(crate) fn push_scope(&mut self) {
        self.scopes.push(Vec::new());
    }

    /// Leaves the innermost region. Its names can no longer be referenced
    /// and stay taken for the rest of the function.
    pub(crate) fn pop_scope(&mut self) {
        for name in self.scopes.pop().unwrap_or_default() {
            if let Some(binding) = self.bindings.remove(&name) {
                self.retired.insert(name, binding.kind());
            }
        }
    }

    // ---- SSA names ----

    /// Allocates `%base`, or `%base_N` for the first free `N`.
    pub(crate) fn ssa_name(&mut self, base: &str) -> String {
        let mut name = base.to_string();
        let mut suffix = 0;
        while is_reserved(&name) || self.ssa_names.contains(&name) {
            suffix += 1;
            name = format!("{base}_{suffix}");
        }
        self.ssa_names.insert(name.clone());
        format!("%{name}")
    }

    /// A compiler temporary `%tN`.
    pub(crate) fn temp(&mut self) -> String {
        loop {
            self.temps += 1;
            let name = format!("t{}", self.temps);
            if self.ssa_names.insert(name.clone()) {
                return format!("%{name}");
            }
        }
    }

    // ---- constant pools ----

    pub(crate) fn index_const(&mut self, value: i64) -> String {
        if let Some(ssa) = self.index_pool.get(&value) {
            return ssa.clone();
        }
        let base = if value < 0 {
            format!("cneg{}", value.unsigned_abs())
        } else {
            format!("c{value}")
        };
        let ssa = self.ssa_name(&base);
        self.prelude
            .line(format!("{ssa} = arith.constant {value} : index"));
        self.index_pool.insert(value, ssa.clone());
        ssa
    }

    pub(crate) fn bool_const(&mut self, value: bool) -> String {
        if let Some(ssa) = self.bool_pool.get(&value) {
            return ssa.clone();
        }
        let ssa = self.ssa_name(if value { "true" } else { "false" });
        self.prelude
            .line(format!("{ssa} = arith.constant {value} : i1"));
        self.bool_pool.insert(value, ssa.clone());
        ssa
    }

    fn typed_const(&mut self, text: String, ty: &str, base: &str) -> String {
        let key = (text, ty.to_string());
        if let Some(ssa) = self.typed_pool.get(&key) {
            return ssa.clone();
        }
        let ssa = self.ssa_name(base);
        self.prelude
            .line(format!("{ssa} = arith.constant {} : {ty}", key.0));
        self.typed_pool.insert(key, ssa.clone());
        ssa
    }

    pub(crate) fn float_const(&mut self, value: f64, ty: &str) -> Result<String> {
        let text = float_text(value)?;
        Ok(self.typed_const(text, ty, "cst"))
    }

    /// Number of distinct constants materialized so far.
    pub(crate) fn constant_count(&self) -> usize {
        self.index_pool.len() + self.bool_pool.len() + self.typed_pool.len()
    }

    pub(crate) fn prelude(&self) -> &Emitter {
        &self.prelude
    }

    fn index_operand(&mut self, value: i64) -> Operand {
        Operand::Scalar {
            ssa: self.index_const(value),
            ty: "index".into(),
        }
    }

    fn float_operand(&mut self, value: f64, ty: &str) -> Result<Operand> {
        Ok(Operand::Scalar {
            ssa: self.float_const(value, ty)?,
            ty: ty.to_string(),
        })
    }

    fn literal_operand(
        &mut self,
        name: &str,
        value: &ConstValue,
        scalar: Option<&str>,
    ) -> Result<Operand> {
        match (value, scalar) {
            (ConstValue::Int(v), None | Some("index")) => Ok(self.index_operand(*v)),
            (ConstValue::Int(v), Some(ty)) if ty.starts_with('f') || ty == "bf16" => {
                self.float_operand(*v as f64, ty)
            }
            (ConstValue::Int(v), Some(ty)) => {
                let base = if *v < 0 {
                    format!("cneg{}_{ty}", v.unsigned_abs())
                } else {
                    format!("c{v}_{ty}")
                };
                let ssa = self.typed_const(v.to_string(), ty, &base);
                Ok(Operand::Scalar {
                    ssa,
                    ty: ty.to_string(),
                })
            }
            (ConstValue::Float(v), ty) => self.float_operand(*v, ty.unwrap_or("f32")),
            (ConstValue::Bool(v), _) => Ok(Operand::Scalar {
                ssa: self.bool_const(*v),
                ty: "i1".into(),
            }),
            (ConstValue::Str(_), _) => Err(CompileError::Type(format!(
                "string constant '{name}' cannot be used as an operand"
            ))),
        }
    }

    /// Resolves an operand expression to an SSA value.
    ///
    /// Names resolve to their bindings; integer, boolean and float literals
    /// go through the constant pools.
    pub(crate) fn resolve(&mut self, expr: &Expr) -> Result<Operand> {
        match &expr.kind {
            ExprKind::Name(name) => match self.lookup(name)?.clone() {
                Binding::Tensor { ssa, ty } => Ok(Operand::Tensor { ssa, ty }),
                Binding::Tile { ssa, ty } => Ok(Operand::Tile { ssa, ty }),
                Binding::Index { ssa } => Ok(Operand::Scalar {
                    ssa,
                    ty: "index".into(),
                }),
                Binding::Literal { value, scalar } => {
                    self.literal_operand(name, &value, scalar.as_deref())
                }
            },
            ExprKind::Int(v) => Ok(self.index_operand(*v)),
            ExprKind::Bool(v) => Ok(Operand::Scalar {
                ssa: self.bool_const(*v),
                ty: "i1".into(),
            }),
            ExprKind::Float(v) => self.float_operand(*v, "f32"),
            ExprKind::Unary {
                op: op @ (UnaryOp::Minus | UnaryOp::Plus),
                operand,
            } => {
                let negate = *op == UnaryOp::Minus;
                match operand.kind {
                    ExprKind::Int(v) if negate => {
                        let v = v.checked_neg().ok_or_else(|| {
                            CompileError::Type(format!("integer literal -{v} out of range"))
                        })?;
                        Ok(self.index_operand(v))
                    }
                    ExprKind::Int(v) => Ok(self.index_operand(v)),
                    ExprKind::Float(v) => self.float_operand(if negate { -v } else { v }, "f32"),
                    _ => Err(CompileError::Unsupported(format!(
                        "operand form {}",
                        expr.describe()
                    ))),
                }
            }
            _ => Err(CompileError::Unsupported(format!(
                "operand form {}",
                expr.describe()
            ))),
        }
    }

    // ---- kernel arguments ----

    /// Records a tensor argument and returns its slot.
    ///
    /// Without an explicit slot the lowest free slot at or above the running
    /// counter is taken. Redeclaring a slot must repeat the same type; roles
    /// may be filled in later but never changed.
    pub(crate) fn declare_arg(
        &mut self,
        name: &str,
        slot: Option<u32>,
        ty: &TensorType,
        role: Option<Role>,
    ) -> Result<u32> {
        let slot = match slot {
            Some(slot) => slot,
            None => {
                while self.args.contains_key(&self.next_slot) {
                    self.next_slot += 1;
                }
                self.next_slot += 1;
                self.next_slot - 1
            }
        };
        match self.args.get_mut(&slot) {
            Some(entry) => {
                if entry.ty != *ty {
                    return Err(CompileError::Type(format!(
                        "argument slot {slot} redeclared as {ty}, previously {}",
                        entry.ty
                    )));
                }
                match (entry.role, role) {
                    (Some(old), Some(new)) if old != new => {
                        return Err(CompileError::Type(format!(
                            "argument slot {slot} redeclared with role {new}, previously {old}"
                        )));
                    }
                    (None, Some(new)) => entry.role = Some(new),
                    _ => {}
                }
            }
            None => {
                self.args.insert(
                    slot,
                    ArgEntry {
                        name: name.to_string(),
                        ty: ty.clone(),
                        role,
                    },
                );
            }
        }
        Ok(slot)
    }

    /// Notes a task-id request; automatic slots start at 1 from now on.
    pub(crate) fn mark_task_id(&mut self) {
        self.uses_task_id = true;
        self.next_slot = self.next_slot.max(1);
    }

    pub(crate) fn uses_task_id(&self) -> bool {
        self.uses_task_id
    }

    pub(crate) fn args(&self) -> &BTreeMap<u32, ArgEntry> {
        &self.args
    }
}

#[cfg(test)]
mod tests {
    use tileasm_ir::{DType, Location};

    use super::*;

    fn int(v: i64) -> Expr {
        Expr::new(ExprKind::Int(v), 1)
    }

    #[test]
    fn index_constants_are_pooled() {
        let mut env = Env::default();
        let a = env.resolve(&int(16)).unwrap();
        let b = env.resolve(&int(16)).unwrap();
        assert_eq!(a.ssa(), "%c16");
        assert_eq!(a.ssa(), b.ssa());
        assert_eq!(env.index_const(-3), "%cneg3");
        assert_eq!(env.constant_count(), 2);
        assert_eq!(env.prelude().lines().len(), 2);
    }

    #[test]
    fn generated_names_avoid_user_names() {
        let mut env = Env::default();
        assert_eq!(env.ssa_name("c5"), "%c5");
        assert_eq!(env.index_const(5), "%c5_1");
        assert_eq!(env.ssa_name("arg0"), "%arg0_1");
        assert_eq!(env.ssa_name("true"), "%true");
        assert_eq!(env.bool_const(true), "%true_1");
    }

    #[test]
    fn float_constants_render_with_a_point() {
        let mut env = Env::default();
        assert_eq!(env.float_const(1.0, "f32").unwrap(), "%cst");
        assert_eq!(env.float_const(1.0, "f32").unwrap(), "%cst");
        assert_eq!(env.float_const(0.5, "f16").unwrap(), "%cst_1");
        assert_eq!(env.prelude().lines()[0], "%cst = arith.constant 1.0 : f32");
        assert_eq!(float_text(1e20).unwrap(), "1.0e20");
        assert!(float_text(f64::NAN).is_err());
    }

    #[test]
    fn rebinding_fails() {
        let mut env = Env::default();
        let tile = TileType::new(Location::Vec, DType::F16, 16, 16);
        env.bind(
            "x",
            Binding::Tile {
                ssa: "%x".into(),
                ty: tile.clone(),
            },
        )
        .unwrap();
        let err = env
            .bind(
                "x",
                Binding::Tile {
                    ssa: "%x".into(),
                    ty: tile,
                },
            )
            .unwrap_err();
        assert!(matches!(err, CompileError::Symbol(_)));
    }

    #[test]
    fn region_names_stay_taken() {
        let mut env = Env::default();
        env.push_scope();
        env.bind("i", Binding::Index { ssa: "%i".into() }).unwrap();
        assert!(env.lookup("i").is_ok());
        env.pop_scope();
        let err = env.lookup("i").unwrap_err();
        assert!(err.to_string().contains("not visible outside"), "{err}");
        let err = env
            .bind("i", Binding::Index { ssa: "%i_1".into() })
            .unwrap_err();
        assert_eq!(
            err,
            CompileError::Symbol(
                "'i' is already bound to a index value; rebinding is not allowed".into()
            )
        );
    }

    #[test]
    fn auto_slots_skip_taken_ones() {
        let mut env = Env::default();
        let ty = TensorType::new(DType::F32, [8, 8]);
        assert_eq!(env.declare_arg("a", Some(0), &ty, None).unwrap(), 0);
        assert_eq!(env.declare_arg("b", None, &ty, None).unwrap(), 1);
        env.mark_task_id();
        assert_eq!(env.declare_arg("c", None, &ty, None).unwrap(), 2);
    }

    #[test]
    fn conflicting_slot_redeclaration() {
        let mut env = Env::default();
        let ty = TensorType::new(DType::F32, [8, 8]);
        env.declare_arg("a", Some(1), &ty, None).unwrap();
        env.declare_arg("a2", Some(1), &ty, Some(Role::Out)).unwrap();
        assert_eq!(env.args()[&1].role, Some(Role::Out));
        assert!(env.declare_arg("a3", Some(1), &ty, Some(Role::In)).is_err());
        let other = TensorType::new(DType::F16, [8, 8]);
        assert!(matches!(
            env.declare_arg("a4", Some(1), &other, None),
            Err(CompileError::Type(_))
        ));
    }

    #[test]
    fn string_constants_are_not_operands() {
        let mut consts = BTreeMap::new();
        consts.insert("mode".to_string(), ConstValue::Str("fast".into()));
        consts.insert("flag".to_string(), ConstValue::Bool(false));
        let mut env = Env::new(&consts).unwrap();
        let name = |n: &str| Expr::new(ExprKind::Name(n.into()), 1);
        assert!(matches!(
            env.resolve(&name("mode")),
            Err(CompileError::Type(_))
        ));
        assert_eq!(env.resolve(&name("flag")).unwrap().type_text(), "i1");
        assert!(Env::new(&BTreeMap::from([("1x".to_string(), ConstValue::Int(1))])).is_err());
    }
}
