use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};
use std::rc::Rc;

use num_rational::Rational64;
use num_traits::{One, Signed, Zero};

use crate::div::{floor_div, int_mod};
use crate::symbol::Sym;

#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
pub enum EvalError {
    #[error("no binding for symbol {0}")]
    UnboundSymbol(Sym),
    #[error("division by zero while evaluating a floor-division term")]
    DivisionByZero,
    #[error("expression evaluated to the non-integer value {0}")]
    NonInteger(Rational64),
}

/// An indivisible factor of a monomial.
///
/// Floor-division and modulo cannot be expressed as polynomial operations,
/// so they appear as opaque function atoms whose arguments are themselves
/// polynomials. Atoms are compared structurally.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Atom {
    Sym(Sym),
    FloorDiv(Rc<Poly>, Rc<Poly>),
    Mod(Rc<Poly>, Rc<Poly>),
}

/// A product of atoms raised to positive powers, sorted by atom.
///
/// Invariant: nonempty, every power is at least 1. A constant is not a
/// monomial; it lives in the polynomial's constant term.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Monomial {
    pub(crate) factors: Vec<(Atom, u32)>,
}

impl Monomial {
    pub(crate) fn atom(atom: Atom) -> Monomial {
        Monomial {
            factors: vec![(atom, 1)],
        }
    }

    pub(crate) fn from_map(factors: BTreeMap<Atom, u32>) -> Option<Monomial> {
        let factors: Vec<(Atom, u32)> =
            factors.into_iter().filter(|(_, pow)| *pow > 0).collect();
        if factors.is_empty() {
            None
        } else {
            Some(Monomial { factors })
        }
    }

    pub fn factors(&self) -> &[(Atom, u32)] {
        &self.factors
    }

    fn mul(&self, other: &Monomial) -> Monomial {
        let mut merged: BTreeMap<Atom, u32> = self.factors.iter().cloned().collect();
        for (atom, pow) in &other.factors {
            *merged.entry(atom.clone()).or_insert(0) += pow;
        }
        Monomial {
            factors: merged.into_iter().collect(),
        }
    }
}

/// A multivariate polynomial over atoms with exact rational coefficients,
/// kept permanently expanded: a map from monomial to nonzero coefficient
/// plus a constant term. Addition and multiplication preserve the form, so
/// structurally equal values are algebraically equal.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Poly {
    pub(crate) terms: BTreeMap<Monomial, Rational64>,
    pub(crate) constant: Rational64,
}

impl Poly {
    pub fn zero() -> Poly {
        Poly {
            terms: BTreeMap::new(),
            constant: Rational64::zero(),
        }
    }

    pub fn one() -> Poly {
        Poly::int(1)
    }

    pub fn int(value: i64) -> Poly {
        Poly::rat(Rational64::from_integer(value))
    }

    pub fn rat(value: Rational64) -> Poly {
        Poly {
            terms: BTreeMap::new(),
            constant: value,
        }
    }

    pub fn sym(sym: Sym) -> Poly {
        Poly::atom(Atom::Sym(sym))
    }

    pub fn atom(atom: Atom) -> Poly {
        let mut terms = BTreeMap::new();
        terms.insert(Monomial::atom(atom), Rational64::one());
        Poly {
            terms,
            constant: Rational64::zero(),
        }
    }

    pub(crate) fn add_term(&mut self, mono: Monomial, coeff: Rational64) {
        if coeff.is_zero() {
            return;
        }
        match self.terms.entry(mono) {
            Entry::Occupied(mut occ) => {
                let merged = *occ.get() + coeff;
                if merged.is_zero() {
                    occ.remove();
                } else {
                    *occ.get_mut() = merged;
                }
            }
            Entry::Vacant(vac) => {
                vac.insert(coeff);
            }
        }
    }

    pub fn is_zero(&self) -> bool {
        self.terms.is_empty() && self.constant.is_zero()
    }

    pub fn terms(&self) -> impl Iterator<Item = (&Monomial, Rational64)> {
        self.terms.iter().map(|(m, c)| (m, *c))
    }

    pub fn constant(&self) -> Rational64 {
        self.constant
    }

    /// The value of this polynomial if it has no symbolic part.
    pub fn as_constant(&self) -> Option<Rational64> {
        if self.terms.is_empty() {
            Some(self.constant)
        } else {
            None
        }
    }

    pub fn as_int_constant(&self) -> Option<i64> {
        self.as_constant()
            .filter(|c| c.is_integer())
            .map(|c| c.to_integer())
    }

    /// `Some(s)` if this polynomial is exactly the bare symbol `s`.
    pub fn as_sym(&self) -> Option<Sym> {
        let (mono, coeff) = self.single_unit_term()?;
        match mono.factors.as_slice() {
            [(Atom::Sym(s), 1)] if coeff.is_one() => Some(s.clone()),
            _ => None,
        }
    }

    /// `Some((base, divisor))` if this polynomial is exactly one
    /// floor-division atom.
    pub fn as_floor_div(&self) -> Option<(Poly, Poly)> {
        let (mono, coeff) = self.single_unit_term()?;
        match mono.factors.as_slice() {
            [(Atom::FloorDiv(b, d), 1)] if coeff.is_one() => {
                Some(((**b).clone(), (**d).clone()))
            }
            _ => None,
        }
    }

    fn single_unit_term(&self) -> Option<(&Monomial, Rational64)> {
        if !self.constant.is_zero() || self.terms.len() != 1 {
            return None;
        }
        self.terms.iter().next().map(|(m, c)| (m, *c))
    }

    /// True when the constant and every coefficient is a whole integer.
    pub fn is_integral(&self) -> bool {
        self.constant.is_integer() && self.terms.values().all(|c| c.is_integer())
    }

    /// All atoms appearing directly in this polynomial's monomials (not
    /// inside atom arguments).
    pub fn atoms(&self) -> impl Iterator<Item = &Atom> {
        self.terms
            .keys()
            .flat_map(|m| m.factors.iter().map(|(a, _)| a))
    }

    pub fn free_syms(&self) -> BTreeSet<Sym> {
        let mut out = BTreeSet::new();
        for atom in self.atoms() {
            collect_syms(atom, &mut out);
        }
        out
    }

    pub fn contains_sym(&self, sym: &Sym) -> bool {
        self.free_syms().contains(sym)
    }

    pub fn pow(&self, exp: u32) -> Poly {
        let mut out = Poly::one();
        for _ in 0..exp {
            out = out * self.clone();
        }
        out
    }

    pub fn scale(&self, factor: Rational64) -> Poly {
        if factor.is_zero() {
            return Poly::zero();
        }
        Poly {
            terms: self.terms.iter().map(|(m, c)| (m.clone(), *c * factor)).collect(),
            constant: self.constant * factor,
        }
    }

    /// Rebuild bottom-up, mapping symbol atoms through `sym_map` and
    /// canonicalized floor-division atoms through `div_map`. Every
    /// `FloorDiv`/`Mod` node passes back through its smart constructor, so
    /// substitutions that make an argument concrete fold the node away and
    /// the result is re-expanded by construction.
    pub fn rebuild(
        &self,
        sym_map: &dyn Fn(&Sym) -> Option<Poly>,
        div_map: &dyn Fn(&Poly, &Poly) -> Option<Poly>,
    ) -> Poly {
        let mut out = Poly::rat(self.constant);
        for (mono, coeff) in &self.terms {
            let mut term = Poly::rat(*coeff);
            for (atom, pow) in &mono.factors {
                let factor = match atom {
                    Atom::Sym(s) => match sym_map(s) {
                        Some(replacement) => replacement,
                        None => Poly::sym(s.clone()),
                    },
                    Atom::FloorDiv(base, divisor) => {
                        let base = base.rebuild(sym_map, div_map);
                        let divisor = divisor.rebuild(sym_map, div_map);
                        let rebuilt = floor_div(base, divisor);
                        match rebuilt.as_floor_div() {
                            Some((b, d)) => div_map(&b, &d).unwrap_or(rebuilt),
                            None => rebuilt,
                        }
                    }
                    Atom::Mod(base, divisor) => int_mod(
                        base.rebuild(sym_map, div_map),
                        divisor.rebuild(sym_map, div_map),
                    ),
                };
                term = term * factor.pow(*pow);
            }
            out = out + term;
        }
        out
    }

    pub fn subst(&self, map: &BTreeMap<Sym, Poly>) -> Poly {
        self.rebuild(&|s| map.get(s).cloned(), &|_, _| None)
    }

    /// Evaluate against a symbol binding function. Floor-division and
    /// modulo use floor semantics, which match integer `//` and `%` with a
    /// remainder that takes the divisor's sign.
    pub fn eval(&self, lookup: &dyn Fn(&Sym) -> Option<i64>) -> Result<Rational64, EvalError> {
        let mut total = self.constant;
        for (mono, coeff) in &self.terms {
            let mut term = *coeff;
            for (atom, pow) in &mono.factors {
                let value = eval_atom(atom, lookup)?;
                for _ in 0..*pow {
                    term *= value;
                }
            }
            total += term;
        }
        Ok(total)
    }
}

fn collect_syms(atom: &Atom, out: &mut BTreeSet<Sym>) {
    match atom {
        Atom::Sym(s) => {
            out.insert(s.clone());
        }
        Atom::FloorDiv(base, divisor) | Atom::Mod(base, divisor) => {
            out.extend(base.free_syms());
            out.extend(divisor.free_syms());
        }
    }
}

fn eval_atom(atom: &Atom, lookup: &dyn Fn(&Sym) -> Option<i64>) -> Result<Rational64, EvalError> {
    match atom {
        Atom::Sym(s) => lookup(s)
            .map(Rational64::from_integer)
            .ok_or_else(|| EvalError::UnboundSymbol(s.clone())),
        Atom::FloorDiv(base, divisor) => {
            let base = base.eval(lookup)?;
            let divisor = divisor.eval(lookup)?;
            if divisor.is_zero() {
                return Err(EvalError::DivisionByZero);
            }
            Ok((base / divisor).floor())
        }
        Atom::Mod(base, divisor) => {
            let base = base.eval(lookup)?;
            let divisor = divisor.eval(lookup)?;
            if divisor.is_zero() {
                return Err(EvalError::DivisionByZero);
            }
            Ok(base - divisor * (base / divisor).floor())
        }
    }
}

impl Add for Poly {
    type Output = Poly;

    fn add(mut self, rhs: Poly) -> Poly {
        self.constant += rhs.constant;
        for (mono, coeff) in rhs.terms {
            self.add_term(mono, coeff);
        }
        self
    }
}

impl Add for &Poly {
    type Output = Poly;

    fn add(self, rhs: &Poly) -> Poly {
        self.clone() + rhs.clone()
    }
}

impl Sub for Poly {
    type Output = Poly;

    fn sub(self, rhs: Poly) -> Poly {
        self + (-rhs)
    }
}

impl Sub for &Poly {
    type Output = Poly;

    fn sub(self, rhs: &Poly) -> Poly {
        self.clone() - rhs.clone()
    }
}

impl Neg for Poly {
    type Output = Poly;

    fn neg(self) -> Poly {
        Poly {
            terms: self.terms.into_iter().map(|(m, c)| (m, -c)).collect(),
            constant: -self.constant,
        }
    }
}

impl Mul for Poly {
    type Output = Poly;

    fn mul(self, rhs: Poly) -> Poly {
        let mut out = Poly::rat(self.constant * rhs.constant);
        for (mono, coeff) in &self.terms {
            out.add_term(mono.clone(), *coeff * rhs.constant);
        }
        for (mono, coeff) in &rhs.terms {
            out.add_term(mono.clone(), *coeff * self.constant);
        }
        for (lhs_mono, lhs_coeff) in &self.terms {
            for (rhs_mono, rhs_coeff) in &rhs.terms {
                out.add_term(lhs_mono.mul(rhs_mono), *lhs_coeff * *rhs_coeff);
            }
        }
        out
    }
}

impl Mul for &Poly {
    type Output = Poly;

    fn mul(self, rhs: &Poly) -> Poly {
        self.clone() * rhs.clone()
    }
}

impl From<i64> for Poly {
    fn from(value: i64) -> Poly {
        Poly::int(value)
    }
}

impl From<Sym> for Poly {
    fn from(sym: Sym) -> Poly {
        Poly::sym(sym)
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Atom::Sym(s) => write!(f, "{}", s),
            Atom::FloorDiv(base, divisor) => write!(f, "({} // {})", base, divisor),
            Atom::Mod(base, divisor) => write!(f, "({} % {})", base, divisor),
        }
    }
}

impl fmt::Display for Monomial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, (atom, pow)) in self.factors.iter().enumerate() {
            if idx > 0 {
                write!(f, "*")?;
            }
            if *pow == 1 {
                write!(f, "{}", atom)?;
            } else {
                write!(f, "{}^{}", atom, pow)?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for Poly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.terms.is_empty() {
            return write!(f, "{}", self.constant);
        }
        let mut first = true;
        for (mono, coeff) in &self.terms {
            write_signed(f, first, *coeff, Some(mono))?;
            first = false;
        }
        if !self.constant.is_zero() {
            write_signed(f, false, self.constant, None)?;
        }
        Ok(())
    }
}

fn write_signed(
    f: &mut fmt::Formatter<'_>,
    first: bool,
    value: Rational64,
    mono: Option<&Monomial>,
) -> fmt::Result {
    let magnitude = value.abs();
    match (first, value.is_negative()) {
        (true, false) => {}
        (true, true) => write!(f, "-")?,
        (false, false) => write!(f, " + ")?,
        (false, true) => write!(f, " - ")?,
    }
    match mono {
        None => write!(f, "{}", magnitude),
        Some(mono) if magnitude.is_one() => write!(f, "{}", mono),
        Some(mono) if magnitude.is_integer() => write!(f, "{}*{}", magnitude, mono),
        Some(mono) => write!(f, "({})*{}", magnitude, mono),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(name: &str) -> Poly {
        Poly::sym(Sym::new(name))
    }

    #[test]
    fn like_terms_merge() {
        let x = s("x");
        let sum = x.clone() + x.clone();
        assert_eq!(sum, x.scale(Rational64::from_integer(2)));
        assert_eq!((sum - x.clone()) - x, Poly::zero());
    }

    #[test]
    fn products_expand() {
        let x = s("x");
        // (x + 1)^2 = x^2 + 2x + 1
        let square = (x.clone() + Poly::one()) * (x.clone() + Poly::one());
        let expected = x.pow(2) + x.scale(Rational64::from_integer(2)) + Poly::one();
        assert_eq!(square, expected);
    }

    #[test]
    fn eval_with_bindings() {
        let x = Sym::new("x");
        let y = Sym::new("y");
        let expr = Poly::sym(x.clone()) * Poly::sym(y.clone()) + Poly::int(3);
        let lookup = |sym: &Sym| match sym.name() {
            "x" => Some(4),
            "y" => Some(5),
            _ => None,
        };
        assert_eq!(expr.eval(&lookup), Ok(Rational64::from_integer(23)));

        let partial = |sym: &Sym| (sym == &x).then_some(4);
        assert_eq!(
            Poly::sym(y.clone()).eval(&partial),
            Err(EvalError::UnboundSymbol(y))
        );
    }

    #[test]
    fn subst_rebuilds_through_constructors() {
        use crate::div::floor_div;

        let x = Sym::new("x");
        let expr = floor_div(Poly::sym(x.clone()), Poly::int(2));
        let mut map = BTreeMap::new();
        map.insert(x, Poly::int(8));
        // Substituting a concrete base folds the floor-division node away.
        assert_eq!(expr.subst(&map), Poly::int(4));
    }

    #[test]
    fn free_syms_reach_atom_arguments() {
        use crate::div::int_mod;

        let x = Sym::new("x");
        let y = Sym::new("y");
        let expr = int_mod(Poly::sym(x.clone()), Poly::sym(y.clone()) + Poly::int(1));
        let free = expr.free_syms();
        assert!(free.contains(&x));
        assert!(free.contains(&y));
    }

    #[test]
    fn display_is_deterministic() {
        let expr = s("b").scale(Rational64::from_integer(2)) + s("a") + Poly::int(7);
        assert_eq!(expr.to_string(), "a + 2*b + 7");
        assert_eq!((-expr).to_string(), "-a - 2*b - 7");
    }
}
