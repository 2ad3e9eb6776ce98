//! The shape environment: variable bindings, proven substitutions,
//! divisibility facts, the guard log, and the evaluator.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

use id_collections::{id_type, IdVec};
use num_rational::Rational64;
use num_traits::Zero;
use skein_algebra::{
    divide_exact, floor_div, solve_for, solve_for_mod, Atom, EvalError, Expr, Poly, Rel, RelOp,
    SolveUnsupported, Sym, Val,
};
use tracing::debug;

use crate::cache::{Version, VersionCache};
use crate::error::ShapeError;
use crate::scalar::{SymInt, SymSize};

#[id_type]
pub struct GuardId(pub usize);

/// One condition the compiled artifact's validity depends on: an
/// expression paired with the concrete value it had during tracing.
#[derive(Clone, Debug)]
pub struct Guard {
    pub expr: Expr,
    pub value: Val,
}

impl fmt::Display for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} => {}", self.expr, self.value)
    }
}

/// The owning environment for one traced program.
///
/// Handles are cheap clones sharing the same state; symbolic scalars hold
/// one, so they never outlive it. Exactly one environment is live per
/// tracing attempt, and all of its mutable fact sets only ever grow.
#[derive(Clone)]
pub struct ShapeEnv {
    state: Rc<RefCell<EnvState>>,
}

struct EnvState {
    var_to_val: BTreeMap<Sym, i64>,
    replacements: BTreeMap<Sym, Poly>,
    divisible: BTreeSet<(Poly, Poly)>,
    guards: IdVec<GuardId, Guard>,
    simplify_cache: VersionCache<Expr, Expr>,
    static_cache: VersionCache<Expr, Option<Val>>,
    divisible_version: Option<Version>,
}

impl ShapeEnv {
    pub fn new() -> ShapeEnv {
        ShapeEnv {
            state: Rc::new(RefCell::new(EnvState {
                var_to_val: BTreeMap::new(),
                replacements: BTreeMap::new(),
                divisible: BTreeSet::new(),
                guards: IdVec::new(),
                simplify_cache: VersionCache::new(),
                static_cache: VersionCache::new(),
                divisible_version: None,
            })),
        }
    }

    /// Mint a symbolic integer for one dimension of concrete size `value`.
    ///
    /// Sizes 0 and 1 come back as literals: their broadcasting behavior
    /// differs from the general case, so making them symbolic would invite
    /// incorrect simplifications.
    pub fn create_symint(&self, name: &str, value: i64) -> SymSize {
        if value == 0 || value == 1 {
            return SymSize::Static(value);
        }
        let sym = Sym::new(name);
        self.state
            .borrow_mut()
            .var_to_val
            .insert(sym.clone(), value);
        debug!(symbol = %sym, value, "minted symbolic size");
        SymSize::Symbolic(SymInt::new(Poly::sym(sym), self.clone()))
    }

    /// The guard log, in the order guards were recorded.
    pub fn guards(&self) -> Vec<Guard> {
        let state = self.state.borrow();
        let mut out = Vec::with_capacity(state.guards.len());
        for (_, guard) in &state.guards {
            out.push(guard.clone());
        }
        out
    }

    pub fn guard_count(&self) -> usize {
        self.state.borrow().guards.len()
    }

    /// The single entry point every comparison and coercion routes
    /// through.
    pub fn evaluate_expr(&self, expr: &Expr) -> Result<Val, ShapeError> {
        self.state.borrow_mut().evaluate_expr(expr)
    }

    pub(crate) fn evaluate_int(&self, poly: &Poly) -> Result<i64, ShapeError> {
        match self.evaluate_expr(&Expr::Int(poly.clone()))? {
            Val::Int(value) => Ok(value),
            Val::Bool(_) => Err(self.kind_mismatch(poly)),
        }
    }

    pub(crate) fn evaluate_bool(&self, rel: &Rel) -> Result<bool, ShapeError> {
        match self.evaluate_expr(&Expr::Rel(rel.clone()))? {
            Val::Bool(value) => Ok(value),
            Val::Int(_) => Err(self.kind_mismatch(rel)),
        }
    }

    /// Concrete value under the sizes tracing started from. Heuristic
    /// only: no guard is recorded.
    pub fn size_hint(&self, expr: &Expr) -> Result<Val, ShapeError> {
        self.state.borrow().size_hint(expr)
    }

    pub(crate) fn size_hint_int(&self, poly: &Poly) -> Result<i64, ShapeError> {
        match self.size_hint(&Expr::Int(poly.clone()))? {
            Val::Int(value) => Ok(value),
            Val::Bool(_) => Err(self.kind_mismatch(poly)),
        }
    }

    /// Substitute proven equalities and divisibility facts into `expr`.
    pub fn simplify(&self, expr: &Expr) -> Expr {
        self.state.borrow_mut().simplify(expr)
    }

    /// The canonical representative for `sym` under the proven
    /// equalities, with path compression.
    pub fn find(&self, sym: &Sym) -> Poly {
        self.state.borrow_mut().find(sym)
    }

    fn kind_mismatch(&self, expr: &dyn fmt::Display) -> ShapeError {
        ShapeError::Internal {
            expr: expr.to_string(),
            guards: self.guard_count(),
            message: "evaluation produced a value of the wrong kind".to_string(),
        }
    }
}

impl Default for ShapeEnv {
    fn default() -> ShapeEnv {
        ShapeEnv::new()
    }
}

impl EnvState {
    fn version(&self) -> Version {
        (self.replacements.len(), self.divisible.len())
    }

    fn internal(&self, expr: &dyn fmt::Display, err: EvalError) -> ShapeError {
        ShapeError::Internal {
            expr: expr.to_string(),
            guards: self.guards.len(),
            message: err.to_string(),
        }
    }

    fn push_guard(&mut self, expr: Expr, value: Val) {
        debug!(guard = %expr, %value, "recorded guard");
        let _ = self.guards.push(Guard { expr, value });
    }

    fn size_hint(&self, expr: &Expr) -> Result<Val, ShapeError> {
        let vals = &self.var_to_val;
        expr.eval(&|sym| vals.get(sym).copied())
            .map_err(|err| self.internal(expr, err))
    }

    fn find(&mut self, sym: &Sym) -> Poly {
        let mut visited = Vec::new();
        let mut cursor = sym.clone();
        let root = loop {
            match self.replacements.get(&cursor) {
                None => break Poly::sym(cursor.clone()),
                Some(next) => {
                    visited.push(cursor.clone());
                    match next.as_sym() {
                        Some(next_sym) => cursor = next_sym,
                        None => break next.clone(),
                    }
                }
            }
        };
        // path compression: every key on the walked chain ends up pointing
        // directly at the representative
        for stale in visited {
            self.replacements.insert(stale, root.clone());
        }
        root
    }

    fn replace_all(&mut self, poly: &Poly) -> Poly {
        let mut map = BTreeMap::new();
        for sym in poly.free_syms() {
            let repr = self.find(&sym);
            if repr.as_sym().as_ref() != Some(&sym) {
                map.insert(sym, repr);
            }
        }
        poly.subst(&map)
    }

    fn simplify(&mut self, expr: &Expr) -> Expr {
        let version = self.version();
        if let Some(hit) = self.simplify_cache.get(version, expr) {
            return hit;
        }
        let out = match expr {
            Expr::Int(poly) => Expr::Int(self.simplify_poly(poly)),
            Expr::Rel(rel) => Expr::Rel(Rel::new(
                rel.op,
                self.simplify_poly(&rel.lhs),
                self.simplify_poly(&rel.rhs),
            )),
        };
        let version = self.version();
        self.simplify_cache.insert(version, expr.clone(), out.clone());
        out
    }

    fn simplify_poly(&mut self, poly: &Poly) -> Poly {
        let replaced = self.replace_all(poly);
        if !has_floor_div(&replaced) {
            return replaced;
        }
        self.update_divisible();
        let divisible = self.divisible.clone();
        replaced.rebuild(&|_| None, &|base, divisor| {
            if divisible.contains(&(base.clone(), divisor.clone())) {
                divide_exact(base, divisor)
            } else {
                None
            }
        })
    }

    // Re-simplify every recorded divisibility fact under the current
    // replacements, dropping facts that became fully concrete.
    fn update_divisible(&mut self) {
        let version = self.version();
        if self.divisible_version == Some(version) {
            return;
        }
        let old = std::mem::take(&mut self.divisible);
        let mut fresh = BTreeSet::new();
        for (base, divisor) in old {
            let base = self.replace_all(&base);
            let divisor = self.replace_all(&divisor);
            let rebuilt = floor_div(base, divisor);
            if rebuilt.free_syms().is_empty() {
                continue;
            }
            if let Some(pair) = rebuilt.as_floor_div() {
                fresh.insert(pair);
            }
        }
        self.divisible = fresh;
        self.divisible_version = Some(self.version());
    }

    /// Guard-free static evaluation: replace every free symbol with a
    /// fresh placeholder known only to be some integer greater than 1. If
    /// the result still collapses to a concrete value, that conclusion
    /// held without the real sizes, so no guard is needed.
    fn maybe_evaluate_static(&mut self, expr: &Expr) -> Option<Val> {
        let version = self.version();
        if let Some(hit) = self.static_cache.get(version, expr) {
            return hit;
        }
        let placeholders: BTreeMap<Sym, Poly> = expr
            .free_syms()
            .into_iter()
            .enumerate()
            .map(|(idx, sym)| {
                (sym, Poly::sym(Sym::new(format!("p{}", idx))) + Poly::one())
            })
            .collect();
        let result = match expr {
            Expr::Int(poly) => poly.subst(&placeholders).as_int_constant().map(Val::Int),
            Expr::Rel(rel) => {
                let diff = rel.lhs.subst(&placeholders) - rel.rhs.subst(&placeholders);
                diff.as_constant()
                    .map(|c| Val::Bool(rel.op.apply(c, Rational64::zero())))
            }
        };
        if result.is_some() {
            debug!(expr = %expr, "resolved statically without a guard");
        }
        let version = self.version();
        self.static_cache.insert(version, expr.clone(), result);
        result
    }

    fn evaluate_expr(&mut self, expr: &Expr) -> Result<Val, ShapeError> {
        if expr.free_syms().is_empty() {
            return expr.eval(&|_| None).map_err(|err| self.internal(expr, err));
        }
        let simplified = self.simplify(expr);
        if let Some(value) = self.maybe_evaluate_static(&simplified) {
            return Ok(value);
        }
        if let Expr::Rel(rel) = &simplified {
            if rel.op == RelOp::Eq {
                let rel = rel.clone();
                return self.evaluate_eq(&rel).map(Val::Bool);
            }
        }
        let value = self.size_hint(&simplified)?;
        self.push_guard(simplified, value);
        Ok(value)
    }

    fn evaluate_eq(&mut self, rel: &Rel) -> Result<bool, ShapeError> {
        let vals = &self.var_to_val;
        let value = rel
            .eval(&|sym| vals.get(sym).copied())
            .map_err(|err| self.internal(rel, err))?;
        // equalities are always guard-producing, even when resolved
        // structurally
        self.push_guard(Expr::Rel(rel.clone()), Val::Bool(value));
        if !value {
            return Ok(false);
        }

        let free: Vec<Sym> = rel.free_syms().into_iter().collect();
        if (1..=3).contains(&free.len()) {
            let mut keyed = Vec::with_capacity(free.len());
            for sym in free {
                let hint = self
                    .var_to_val
                    .get(&sym)
                    .copied()
                    .ok_or_else(|| self.internal(&sym, EvalError::UnboundSymbol(sym.clone())))?;
                keyed.push((hint, sym));
            }
            // eliminate the symbol with the largest size hint; ties broken
            // by name for determinism
            keyed.sort_by(|(lh, ls), (rh, rs)| rh.cmp(lh).then_with(|| ls.cmp(rs)));
            if let Some((_, target)) = keyed.into_iter().next() {
                self.try_learn(rel, target);
            }
        }
        Ok(value)
    }

    // A proven-true equality can sometimes be exploited beyond its guard:
    // a unique closed-form solution becomes a replacement, and an
    // unsolvable single-modulo equation becomes a divisibility fact.
    // Anything else stays guard-only.
    fn try_learn(&mut self, rel: &Rel, target: Sym) {
        let diff = &rel.lhs - &rel.rhs;
        match solve_for(&diff, &target) {
            Ok(Some(solution)) => {
                let canonical = match solution.as_sym() {
                    Some(sym) => self.find(&sym),
                    None => solution,
                };
                debug!(symbol = %target, replacement = %canonical, "learned replacement");
                self.replacements.insert(target, canonical);
            }
            Ok(None) => {}
            Err(SolveUnsupported) => {
                if let Some((base, divisor)) = solve_for_mod(&diff) {
                    let canonical = floor_div(base, divisor);
                    if let Some((b, d)) = canonical.as_floor_div() {
                        debug!(base = %b, divisor = %d, "learned divisibility fact");
                        self.divisible.insert((b, d));
                    }
                }
            }
        }
    }
}

fn has_floor_div(poly: &Poly) -> bool {
    poly.atoms().any(|atom| match atom {
        Atom::FloorDiv(_, _) => true,
        Atom::Mod(base, divisor) => has_floor_div(base) || has_floor_div(divisor),
        Atom::Sym(_) => false,
    })
}
