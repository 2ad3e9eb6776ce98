//! Symbolic shape tracking for traced tensor programs.
//!
//! A [`ShapeEnv`] mints symbolic integers for tensor dimensions whose
//! concrete sizes are not known at compile time. Arithmetic on those
//! integers builds algebraic expressions; whenever a branch of the traced
//! program needs a concrete answer, the environment's evaluator either
//! decides it from known structure (proven equalities, divisibility facts)
//! or falls back to the real sizes and records a guard: a condition the
//! compiled artifact's later reuse must satisfy.

pub mod args;
pub mod cache;
pub mod dispatch;
pub mod env;
pub mod error;
pub mod scalar;

pub use args::{create_contiguous, numel, Arg, TensorMeta, TracedArg};
pub use dispatch::{DispatchMode, ModeGuard, SymDispatch, SymOp, SymScalar};
pub use env::{Guard, GuardId, ShapeEnv};
pub use error::ShapeError;
pub use scalar::{IntoOperand, SymBool, SymFloat, SymInt, SymSize};
