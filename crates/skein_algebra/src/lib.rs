//! Symbolic integer algebra over named dimension variables.
//!
//! Expressions are kept permanently in expanded sum-of-products form with
//! exact rational coefficients, so "expand" is a property of the
//! representation rather than a pass. Floor-division and modulo appear as
//! opaque function atoms with their own canonicalization rules, applied on
//! every construction.

pub mod div;
pub mod expr;
pub mod poly;
pub mod solve;
pub mod symbol;

pub use div::{divide_exact, divides_exactly, floor_div, gcd, int_mod};
pub use expr::{Expr, Rel, RelOp, Val};
pub use poly::{Atom, EvalError, Monomial, Poly};
pub use solve::{solve_for, solve_for_mod, SolveUnsupported};
pub use symbol::Sym;
