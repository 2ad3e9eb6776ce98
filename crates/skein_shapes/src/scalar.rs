//! Symbolic scalar values: thin, environment-bound expression wrappers.

use std::fmt;

use skein_algebra::{floor_div, int_mod, Poly, Rel, RelOp};

use crate::dispatch::{active_mode, dispatch_via, SymOp, SymScalar};
use crate::env::ShapeEnv;
use crate::error::ShapeError;

/// A symbolic integer: an expression plus the environment that owns its
/// symbols, with an optional constant fast path set when the expression is
/// known at construction time to equal a literal.
///
/// Value semantics: every operator produces a new scalar bound to the same
/// environment. There is deliberately no plain conversion to `i64` — see
/// [`SymInt::guard_int`].
#[derive(Clone)]
pub struct SymInt {
    expr: Poly,
    env: ShapeEnv,
    constant: Option<i64>,
}

impl SymInt {
    pub(crate) fn new(expr: Poly, env: ShapeEnv) -> SymInt {
        SymInt {
            expr,
            env,
            constant: None,
        }
    }

    /// Wrap a literal in the given environment.
    pub fn wrap(env: &ShapeEnv, value: i64) -> SymInt {
        SymInt {
            expr: Poly::int(value),
            env: env.clone(),
            constant: Some(value),
        }
    }

    pub fn expr(&self) -> &Poly {
        &self.expr
    }

    pub fn env(&self) -> &ShapeEnv {
        &self.env
    }

    pub fn constant(&self) -> Option<i64> {
        self.constant
    }

    /// Force a concrete value through the guard-aware evaluator. This is
    /// the only sanctioned way to turn a symbolic integer concrete; the
    /// evaluation records a guard unless the value follows from known
    /// structure alone.
    pub fn guard_int(&self) -> Result<i64, ShapeError> {
        self.env.evaluate_int(&self.expr)
    }

    /// The concrete value under the sizes tracing started from. Heuristic
    /// only; records no guard.
    pub fn hint(&self) -> Result<i64, ShapeError> {
        self.env.size_hint_int(&self.expr)
    }

    /// Boolean coercion: forces the expression and tests it against zero.
    /// Guard-producing like any other forced evaluation.
    pub fn guard_bool(&self) -> Result<bool, ShapeError> {
        Ok(self.guard_int()? != 0)
    }

    pub fn floor_div(&self, other: impl IntoOperand) -> SymInt {
        let rhs = other.into_operand(&self.env);
        int_binary(SymOp::FloorDiv, self, &rhs)
    }

    pub fn sym_eq(&self, other: impl IntoOperand) -> SymBool {
        self.compare(SymOp::Eq, other)
    }

    pub fn sym_lt(&self, other: impl IntoOperand) -> SymBool {
        self.compare(SymOp::Lt, other)
    }

    pub fn sym_le(&self, other: impl IntoOperand) -> SymBool {
        self.compare(SymOp::Le, other)
    }

    pub fn sym_gt(&self, other: impl IntoOperand) -> SymBool {
        self.compare(SymOp::Gt, other)
    }

    pub fn sym_ge(&self, other: impl IntoOperand) -> SymBool {
        self.compare(SymOp::Ge, other)
    }

    fn compare(&self, op: SymOp, other: impl IntoOperand) -> SymBool {
        let rhs = other.into_operand(&self.env);
        if let Some(mode) = active_mode() {
            let out = dispatch_via(
                &mode,
                op,
                &[SymScalar::Int(self.clone()), SymScalar::Int(rhs)],
            );
            return expect_bool(out, op);
        }
        let rel_op = match op {
            SymOp::Eq => RelOp::Eq,
            SymOp::Lt => RelOp::Lt,
            SymOp::Le => RelOp::Le,
            SymOp::Gt => RelOp::Gt,
            SymOp::Ge => RelOp::Ge,
            _ => unreachable!("{} is not a comparison", op),
        };
        SymBool {
            rel: Rel::new(rel_op, self.expr.clone(), rhs.expr.clone()),
            env: self.env.clone(),
        }
    }

    /// Promote to a symbolic float (dispatch-aware).
    pub fn to_sym_float(&self) -> SymFloat {
        if let Some(mode) = active_mode() {
            let out = dispatch_via(&mode, SymOp::Float, &[SymScalar::Int(self.clone())]);
            return expect_float(out, SymOp::Float);
        }
        SymFloat {
            expr: self.expr.clone(),
            env: self.env.clone(),
            constant: self.constant.map(|c| c as f64),
        }
    }
}

/// Plain coercion is a footgun: it would decouple the compiled artifact
/// from the guards recorded for it, so it always fails.
impl TryFrom<&SymInt> for i64 {
    type Error = ShapeError;

    fn try_from(_: &SymInt) -> Result<i64, ShapeError> {
        Err(ShapeError::DirectIntExtraction)
    }
}

impl fmt::Display for SymInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)
    }
}

impl fmt::Debug for SymInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)
    }
}

/// A symbolic float. Thin: it exists so float-typed positions in a traced
/// program can carry a dimension-derived expression without forcing it.
#[derive(Clone)]
pub struct SymFloat {
    expr: Poly,
    env: ShapeEnv,
    constant: Option<f64>,
}

impl SymFloat {
    pub fn expr(&self) -> &Poly {
        &self.expr
    }

    pub fn env(&self) -> &ShapeEnv {
        &self.env
    }

    pub fn constant(&self) -> Option<f64> {
        self.constant
    }
}

impl fmt::Display for SymFloat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)
    }
}

/// A symbolic boolean produced by comparing symbolic integers. Coercing it
/// to a concrete `bool` routes through the environment's evaluator and is
/// guard-producing.
#[derive(Clone)]
pub struct SymBool {
    rel: Rel,
    env: ShapeEnv,
}

impl SymBool {
    pub fn rel(&self) -> &Rel {
        &self.rel
    }

    pub fn env(&self) -> &ShapeEnv {
        &self.env
    }

    pub fn guard_bool(&self) -> Result<bool, ShapeError> {
        self.env.evaluate_bool(&self.rel)
    }
}

impl fmt::Display for SymBool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.rel)
    }
}

/// One tensor dimension: a degenerate literal (0/1 sizes are never made
/// symbolic) or a symbolic integer.
#[derive(Clone)]
pub enum SymSize {
    Static(i64),
    Symbolic(SymInt),
}

impl SymSize {
    pub fn as_static(&self) -> Option<i64> {
        match self {
            SymSize::Static(value) => Some(*value),
            SymSize::Symbolic(_) => None,
        }
    }

    pub fn guard_int(&self) -> Result<i64, ShapeError> {
        match self {
            SymSize::Static(value) => Ok(*value),
            SymSize::Symbolic(value) => value.guard_int(),
        }
    }

    pub fn hint(&self) -> Result<i64, ShapeError> {
        match self {
            SymSize::Static(value) => Ok(*value),
            SymSize::Symbolic(value) => value.hint(),
        }
    }
}

impl fmt::Display for SymSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymSize::Static(value) => write!(f, "{}", value),
            SymSize::Symbolic(value) => write!(f, "{}", value),
        }
    }
}

impl fmt::Debug for SymSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Right-hand (or mirrored left-hand) operand of a symbolic operation.
pub trait IntoOperand {
    fn into_operand(self, env: &ShapeEnv) -> SymInt;
}

impl IntoOperand for &SymInt {
    fn into_operand(self, _env: &ShapeEnv) -> SymInt {
        self.clone()
    }
}

impl IntoOperand for i64 {
    fn into_operand(self, env: &ShapeEnv) -> SymInt {
        SymInt::wrap(env, self)
    }
}

fn int_binary(op: SymOp, lhs: &SymInt, rhs: &SymInt) -> SymInt {
    if let Some(mode) = active_mode() {
        let out = dispatch_via(
            &mode,
            op,
            &[SymScalar::Int(lhs.clone()), SymScalar::Int(rhs.clone())],
        );
        return expect_int(out, op);
    }
    let expr = match op {
        SymOp::Add => &lhs.expr + &rhs.expr,
        SymOp::Sub => &lhs.expr - &rhs.expr,
        SymOp::Mul => &lhs.expr * &rhs.expr,
        SymOp::Mod => int_mod(lhs.expr.clone(), rhs.expr.clone()),
        SymOp::FloorDiv => floor_div(lhs.expr.clone(), rhs.expr.clone()),
        _ => unreachable!("{} is not an arithmetic operator", op),
    };
    SymInt::new(expr, lhs.env.clone())
}

fn expect_int(out: SymScalar, op: SymOp) -> SymInt {
    match out {
        SymScalar::Int(value) => value,
        other => panic!("dispatch handler returned {} for {}", other.kind(), op),
    }
}

fn expect_bool(out: SymScalar, op: SymOp) -> SymBool {
    match out {
        SymScalar::Bool(value) => value,
        other => panic!("dispatch handler returned {} for {}", other.kind(), op),
    }
}

fn expect_float(out: SymScalar, op: SymOp) -> SymFloat {
    match out {
        SymScalar::Float(value) => value,
        other => panic!("dispatch handler returned {} for {}", other.kind(), op),
    }
}

// The arithmetic operator surface. Each reflectable operator works with a
// symbolic or plain integer on either side; `/` and `%` follow floor
// semantics to stay consistent with the floor-division atom.
macro_rules! impl_int_binary {
    ($op_trait:ident, $method:ident, $op:expr) => {
        impl std::ops::$op_trait<&SymInt> for &SymInt {
            type Output = SymInt;

            fn $method(self, rhs: &SymInt) -> SymInt {
                int_binary($op, self, rhs)
            }
        }

        impl std::ops::$op_trait<SymInt> for SymInt {
            type Output = SymInt;

            fn $method(self, rhs: SymInt) -> SymInt {
                int_binary($op, &self, &rhs)
            }
        }

        impl std::ops::$op_trait<i64> for &SymInt {
            type Output = SymInt;

            fn $method(self, rhs: i64) -> SymInt {
                int_binary($op, self, &SymInt::wrap(self.env(), rhs))
            }
        }

        impl std::ops::$op_trait<i64> for SymInt {
            type Output = SymInt;

            fn $method(self, rhs: i64) -> SymInt {
                int_binary($op, &self, &SymInt::wrap(self.env(), rhs))
            }
        }

        impl std::ops::$op_trait<&SymInt> for i64 {
            type Output = SymInt;

            fn $method(self, rhs: &SymInt) -> SymInt {
                int_binary($op, &SymInt::wrap(rhs.env(), self), rhs)
            }
        }

        impl std::ops::$op_trait<SymInt> for i64 {
            type Output = SymInt;

            fn $method(self, rhs: SymInt) -> SymInt {
                int_binary($op, &SymInt::wrap(rhs.env(), self), &rhs)
            }
        }
    };
}

impl_int_binary!(Add, add, SymOp::Add);
impl_int_binary!(Sub, sub, SymOp::Sub);
impl_int_binary!(Mul, mul, SymOp::Mul);
impl_int_binary!(Rem, rem, SymOp::Mod);
impl_int_binary!(Div, div, SymOp::FloorDiv);
