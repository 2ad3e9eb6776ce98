//! Closed-form solving of `diff == 0` for a single unknown.

use num_rational::Rational64;
use num_traits::Zero;

use crate::poly::{Atom, Poly};
use crate::symbol::Sym;

/// The unknown appears in a position the solver cannot reason about
/// (inside a floor-division or modulo argument). Distinct from a rejected
/// solution: only this case unlocks the caller's modulo fallback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SolveUnsupported;

/// Solve `diff == 0` for `target`.
///
/// Returns `Ok(Some(solution))` only for a unique solution expressible as
/// an integer-coefficient polynomial: the target must occur linearly, with
/// a constant coefficient, and the quotient must have no fractional
/// coefficient. Nonlinear occurrences, symbolic coefficients, and
/// fractional solutions return `Ok(None)` and the equation is kept as an
/// opaque guard.
pub fn solve_for(diff: &Poly, target: &Sym) -> Result<Option<Poly>, SolveUnsupported> {
    for atom in diff.atoms() {
        if let Atom::FloorDiv(base, divisor) | Atom::Mod(base, divisor) = atom {
            if base.contains_sym(target) || divisor.contains_sym(target) {
                return Err(SolveUnsupported);
            }
        }
    }

    let target_atom = Atom::Sym(target.clone());
    let mut coeff = Rational64::zero();
    let mut rest = Poly::rat(diff.constant());
    for (mono, term_coeff) in diff.terms() {
        let target_power = mono
            .factors()
            .iter()
            .find(|(atom, _)| *atom == target_atom)
            .map_or(0, |(_, pow)| *pow);
        match target_power {
            0 => rest.add_term(mono.clone(), term_coeff),
            1 if mono.factors().len() == 1 => coeff += term_coeff,
            // nonlinear, or a symbolic coefficient on the target
            _ => return Ok(None),
        }
    }

    if coeff.is_zero() {
        return Ok(None);
    }
    let solution = (-rest).scale(coeff.recip());
    if !solution.is_integral() {
        return Ok(None);
    }
    Ok(Some(solution))
}

/// When `diff` contains exactly one distinct modulo atom and `diff == 0`
/// forces that atom to zero, return the `(base, divisor)` pair: a proven
/// exact-division fact.
pub fn solve_for_mod(diff: &Poly) -> Option<(Poly, Poly)> {
    let mut mod_atom: Option<&Atom> = None;
    for atom in diff.atoms() {
        if matches!(atom, Atom::Mod(_, _)) {
            match mod_atom {
                None => mod_atom = Some(atom),
                Some(seen) if seen == atom => {}
                Some(_) => return None,
            }
        }
    }
    let mod_atom = mod_atom?;

    let mut coeff = Rational64::zero();
    let mut rest = Poly::rat(diff.constant());
    for (mono, term_coeff) in diff.terms() {
        let occurs = mono.factors().iter().any(|(atom, _)| atom == mod_atom);
        if !occurs {
            rest.add_term(mono.clone(), term_coeff);
        } else if matches!(mono.factors(), [(atom, 1)] if atom == mod_atom) {
            coeff += term_coeff;
        } else {
            return None;
        }
    }

    // c * (base % divisor) + rest == 0 forces the modulo to zero exactly
    // when rest vanishes.
    if coeff.is_zero() || !rest.is_zero() {
        return None;
    }
    match mod_atom {
        Atom::Mod(base, divisor) => Some(((**base).clone(), (**divisor).clone())),
        _ => None,
    }
}
