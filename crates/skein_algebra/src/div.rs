//! Floor-division and modulo construction.
//!
//! Both operations go through smart constructors that apply their
//! simplification rules on every construction, so a `FloorDiv`/`Mod` atom
//! only ever exists in canonical form.

use std::collections::BTreeMap;
use std::rc::Rc;

use num_integer::Integer;
use num_rational::Rational64;
use num_traits::{One, Zero};

use crate::poly::{Atom, Monomial, Poly};

/// Build `base // divisor` (floor semantics).
///
/// Rules, in order: zero base; unit divisor; concrete fold; nested
/// floor-divisions compose their divisors; both sides reduced by their gcd.
/// Only when none applies is an atom allocated, so reapplying the
/// constructor to an atom's own arguments reproduces the atom.
pub fn floor_div(base: Poly, divisor: Poly) -> Poly {
    let divisor_is_zero = divisor.as_constant().is_some_and(|c| c.is_zero());
    if base.is_zero() && !divisor_is_zero {
        return Poly::zero();
    }
    if divisor.as_constant().is_some_and(|c| c.is_one()) {
        return base;
    }
    if let (Some(b), Some(d)) = (base.as_constant(), divisor.as_constant()) {
        if !d.is_zero() {
            return Poly::rat((b / d).floor());
        }
    }
    if let Some((inner_base, inner_divisor)) = base.as_floor_div() {
        return floor_div(inner_base, inner_divisor * divisor);
    }
    let g = gcd(&base, &divisor);
    if g.as_constant() != Some(Rational64::one()) {
        if let (Some(b), Some(d)) = (divide_exact(&base, &g), divide_exact(&divisor, &g)) {
            return floor_div(b, d);
        }
    }
    Poly::atom(Atom::FloorDiv(Rc::new(base), Rc::new(divisor)))
}

/// Build `base % divisor`, with the remainder taking the divisor's sign
/// (consistent with [`floor_div`]).
pub fn int_mod(base: Poly, divisor: Poly) -> Poly {
    if divisor.as_constant().is_some_and(|c| c.is_one()) {
        return Poly::zero();
    }
    if let (Some(b), Some(d)) = (base.as_constant(), divisor.as_constant()) {
        if !d.is_zero() {
            return Poly::rat(b - d * (b / d).floor());
        }
    }
    if !divisor.is_zero() && divides_exactly(&base, &divisor) {
        return Poly::zero();
    }
    Poly::atom(Atom::Mod(Rc::new(base), Rc::new(divisor)))
}

/// Symbolic gcd: the gcd of every integer coefficient times the factors
/// common to every term of both polynomials. Returns 1 for polynomials
/// with fractional coefficients; cases beyond content-and-common-factors
/// (such as non-monomial common divisors) also fall back to 1, which
/// simply skips canonicalization.
pub fn gcd(a: &Poly, b: &Poly) -> Poly {
    if !a.is_integral() || !b.is_integral() {
        return Poly::one();
    }
    if a.is_zero() {
        return b.clone();
    }
    if b.is_zero() {
        return a.clone();
    }

    let mut content: i64 = 0;
    for poly in [a, b] {
        for (_, coeff) in poly.terms() {
            content = content.gcd(&coeff.to_integer());
        }
        if !poly.constant().is_zero() {
            content = content.gcd(&poly.constant().to_integer());
        }
    }

    let common = match (common_factors(a), common_factors(b)) {
        (Some(fa), Some(fb)) => intersect_factors(fa, fb),
        _ => BTreeMap::new(),
    };

    let mut out = Poly::zero();
    match Monomial::from_map(common) {
        Some(mono) => out.add_term(mono, Rational64::from_integer(content)),
        None => out = Poly::int(content),
    }
    out
}

/// Exact division, or `None` when `q` does not divide `p` term by term.
/// Division by a constant always succeeds (the coefficients absorb it);
/// division by a single-term divisor strips its factors from every term.
pub fn divide_exact(p: &Poly, q: &Poly) -> Option<Poly> {
    if q.is_zero() {
        return None;
    }
    if p.is_zero() {
        return Some(Poly::zero());
    }
    if let Some(c) = q.as_constant() {
        return Some(p.scale(c.recip()));
    }

    let mut q_terms = q.terms();
    let (q_mono, q_coeff) = q_terms.next()?;
    if q_terms.next().is_some() || !q.constant().is_zero() {
        return (p == q).then(Poly::one);
    }

    if !p.constant().is_zero() {
        return None;
    }
    let mut out = Poly::zero();
    for (mono, coeff) in p.terms() {
        match divide_monomial(mono, q_mono)? {
            Some(reduced) => out.add_term(reduced, coeff / q_coeff),
            None => out = out + Poly::rat(coeff / q_coeff),
        }
    }
    Some(out)
}

/// True when `q` divides `p` with an integer-coefficient quotient, i.e.
/// the quotient is integer-valued for every integer assignment.
pub fn divides_exactly(p: &Poly, q: &Poly) -> bool {
    divide_exact(p, q).is_some_and(|quotient| quotient.is_integral())
}

// Factors shared by every term; None when a nonzero constant term rules
// any factor out.
fn common_factors(p: &Poly) -> Option<BTreeMap<Atom, u32>> {
    if !p.constant().is_zero() {
        return None;
    }
    let mut common: Option<BTreeMap<Atom, u32>> = None;
    for (mono, _) in p.terms() {
        let factors: BTreeMap<Atom, u32> = mono.factors().iter().cloned().collect();
        common = Some(match common {
            None => factors,
            Some(prev) => intersect_factors(prev, factors),
        });
    }
    common
}

fn intersect_factors(
    a: BTreeMap<Atom, u32>,
    b: BTreeMap<Atom, u32>,
) -> BTreeMap<Atom, u32> {
    a.into_iter()
        .filter_map(|(atom, pow)| b.get(&atom).map(|other| (atom, pow.min(*other))))
        .collect()
}

fn divide_monomial(m: &Monomial, d: &Monomial) -> Option<Option<Monomial>> {
    let mut factors: BTreeMap<Atom, u32> = m.factors().iter().cloned().collect();
    for (atom, pow) in d.factors() {
        let have = factors.get_mut(atom)?;
        if *have < *pow {
            return None;
        }
        *have -= pow;
        if *have == 0 {
            factors.remove(atom);
        }
    }
    Some(Monomial::from_map(factors))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::Sym;
    use rand::{Rng, SeedableRng};
    use rand_pcg::Pcg64;

    fn s(name: &str) -> Poly {
        Poly::sym(Sym::new(name))
    }

    fn floor_div_ref(a: i64, b: i64) -> i64 {
        let q = a / b;
        if a % b != 0 && ((a < 0) != (b < 0)) {
            q - 1
        } else {
            q
        }
    }

    #[test]
    fn zero_base_and_unit_divisor() {
        assert_eq!(floor_div(Poly::zero(), Poly::int(7)), Poly::zero());
        assert_eq!(floor_div(Poly::zero(), s("x")), Poly::zero());
        let x = s("x");
        assert_eq!(floor_div(x.clone(), Poly::int(1)), x);
    }

    #[test]
    fn concrete_pairs_fold_with_floor_semantics() {
        assert_eq!(floor_div(Poly::int(7), Poly::int(2)), Poly::int(3));
        assert_eq!(floor_div(Poly::int(-7), Poly::int(2)), Poly::int(-4));
        assert_eq!(floor_div(Poly::int(7), Poly::int(-2)), Poly::int(-4));
        assert_eq!(floor_div(Poly::int(-7), Poly::int(-2)), Poly::int(3));
    }

    #[test]
    fn concrete_pairs_match_reference_impl() {
        let mut rng = Pcg64::seed_from_u64(0x5eed);
        for _ in 0..1000 {
            let a = rng.random_range(-1000..=1000);
            let mut b = rng.random_range(-50..=50);
            if b == 0 {
                b = 1;
            }
            assert_eq!(
                floor_div(Poly::int(a), Poly::int(b)).as_int_constant(),
                Some(floor_div_ref(a, b)),
                "floor_div({a}, {b})"
            );
        }
    }

    #[test]
    fn nested_divisions_compose() {
        let x = s("x");
        let nested = floor_div(floor_div(x.clone(), Poly::int(2)), Poly::int(3));
        assert_eq!(nested, floor_div(x, Poly::int(6)));
    }

    #[test]
    fn gcd_reduction_applies_on_construction() {
        let x = s("x");
        // 2x // 2 reduces all the way to x
        assert_eq!(floor_div(x.scale(2.into()), Poly::int(2)), x);
        // 6x // 4 reduces to 3x // 2 and stays an atom
        let reduced = floor_div(x.scale(6.into()), Poly::int(4));
        assert_eq!(reduced.as_floor_div(), Some((x.scale(3.into()), Poly::int(2))));
        // xy // x reduces to y
        let y = s("y");
        assert_eq!(floor_div(x.clone() * y.clone(), x.clone()), y);
    }

    #[test]
    fn canonicalization_is_idempotent() {
        let x = s("x");
        let once = floor_div(x.scale(3.into()), Poly::int(2));
        let (base, divisor) = once.as_floor_div().expect("should stay an atom");
        assert_eq!(floor_div(base, divisor), once);
    }

    #[test]
    fn mod_rules() {
        let x = s("x");
        assert_eq!(int_mod(x.clone(), Poly::int(1)), Poly::zero());
        assert_eq!(int_mod(Poly::int(7), Poly::int(3)), Poly::int(1));
        assert_eq!(int_mod(Poly::int(-7), Poly::int(3)), Poly::int(2));
        // 2x % 2 is provably zero; x % 2 is not
        assert_eq!(int_mod(x.scale(2.into()), Poly::int(2)), Poly::zero());
        assert!(int_mod(x.clone(), Poly::int(2)).as_constant().is_none());
        // xy % y is provably zero even with a symbolic divisor
        let y = s("y");
        assert_eq!(int_mod(x.clone() * y.clone(), y), Poly::zero());
    }

    #[test]
    fn gcd_content_and_common_factors() {
        let x = s("x");
        let y = s("y");
        assert_eq!(gcd(&x.scale(2.into()), &Poly::int(2)), Poly::int(2));
        assert_eq!(gcd(&(x.clone() * y.clone()), &x), x);
        // content reaches through constant terms: gcd(2x + 2, 4) = 2
        let with_const = x.scale(2.into()) + Poly::int(2);
        assert_eq!(gcd(&with_const, &Poly::int(4)), Poly::int(2));
        // fractional coefficients opt out
        assert_eq!(gcd(&x.scale(Rational64::new(1, 2)), &Poly::int(2)), Poly::one());
    }

    #[test]
    fn exact_division() {
        let x = s("x");
        let y = s("y");
        let p = x.clone() * y.clone() + x.scale(2.into());
        assert_eq!(divide_exact(&p, &x), Some(y.clone() + Poly::int(2)));
        assert_eq!(divide_exact(&p, &y), None);
        assert!(divides_exactly(&x.scale(4.into()), &Poly::int(2)));
        assert!(!divides_exactly(&x, &Poly::int(2)));
    }
}
