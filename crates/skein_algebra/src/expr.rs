use std::collections::BTreeSet;
use std::fmt;

use num_rational::Rational64;

use crate::poly::{EvalError, Poly};
use crate::symbol::Sym;

/// Comparison operator kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum RelOp {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl RelOp {
    pub fn apply(self, lhs: Rational64, rhs: Rational64) -> bool {
        match self {
            RelOp::Eq => lhs == rhs,
            RelOp::Lt => lhs < rhs,
            RelOp::Le => lhs <= rhs,
            RelOp::Gt => lhs > rhs,
            RelOp::Ge => lhs >= rhs,
        }
    }
}

impl fmt::Display for RelOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RelOp::Eq => "==",
            RelOp::Lt => "<",
            RelOp::Le => "<=",
            RelOp::Gt => ">",
            RelOp::Ge => ">=",
        };
        write!(f, "{}", text)
    }
}

/// A comparison between two polynomial sides.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Rel {
    pub op: RelOp,
    pub lhs: Poly,
    pub rhs: Poly,
}

impl Rel {
    pub fn new(op: RelOp, lhs: Poly, rhs: Poly) -> Rel {
        Rel { op, lhs, rhs }
    }

    pub fn free_syms(&self) -> BTreeSet<Sym> {
        let mut out = self.lhs.free_syms();
        out.extend(self.rhs.free_syms());
        out
    }

    pub fn eval(&self, lookup: &dyn Fn(&Sym) -> Option<i64>) -> Result<bool, EvalError> {
        Ok(self.op.apply(self.lhs.eval(lookup)?, self.rhs.eval(lookup)?))
    }
}

impl fmt::Display for Rel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.lhs, self.op, self.rhs)
    }
}

/// The expression type guards and the evaluator traffic in: either an
/// integer-valued polynomial or a boolean-valued comparison.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Expr {
    Int(Poly),
    Rel(Rel),
}

impl Expr {
    pub fn free_syms(&self) -> BTreeSet<Sym> {
        match self {
            Expr::Int(poly) => poly.free_syms(),
            Expr::Rel(rel) => rel.free_syms(),
        }
    }

    /// Evaluate to a concrete value. An integer expression producing a
    /// fractional result is reported as an error; the caller treats it as
    /// an internal invariant violation.
    pub fn eval(&self, lookup: &dyn Fn(&Sym) -> Option<i64>) -> Result<Val, EvalError> {
        match self {
            Expr::Int(poly) => {
                let value = poly.eval(lookup)?;
                if !value.is_integer() {
                    return Err(EvalError::NonInteger(value));
                }
                Ok(Val::Int(value.to_integer()))
            }
            Expr::Rel(rel) => Ok(Val::Bool(rel.eval(lookup)?)),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Int(poly) => write!(f, "{}", poly),
            Expr::Rel(rel) => write!(f, "{}", rel),
        }
    }
}

/// A concrete evaluation result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Val {
    Int(i64),
    Bool(bool),
}

impl Val {
    pub fn as_int(self) -> Option<i64> {
        match self {
            Val::Int(value) => Some(value),
            Val::Bool(_) => None,
        }
    }

    pub fn as_bool(self) -> Option<bool> {
        match self {
            Val::Bool(value) => Some(value),
            Val::Int(_) => None,
        }
    }
}

impl fmt::Display for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Val::Int(value) => write!(f, "{}", value),
            Val::Bool(value) => write!(f, "{}", value),
        }
    }
}
