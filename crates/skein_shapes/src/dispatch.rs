//! Stack-scoped interception of symbolic scalar operations.
//!
//! While a mode is active, every operation performed on a symbolic scalar
//! is redirected to its handler instead of the default expression
//! building. Operations a handler performs itself route to the next-outer
//! mode, never back into the handler. Single-threaded, cooperative,
//! strict stack discipline.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::error::ShapeError;
use crate::scalar::{SymBool, SymFloat, SymInt};

/// Every operation a symbolic scalar supports, as a static table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum SymOp {
    Add,
    Sub,
    Mul,
    Mod,
    FloorDiv,
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
    Float,
}

impl SymOp {
    /// Operators that also exist in mirrored form, so a plain integer on
    /// the left-hand side works too.
    pub fn is_reflectable(self) -> bool {
        matches!(
            self,
            SymOp::Add | SymOp::Sub | SymOp::Mul | SymOp::Mod | SymOp::FloorDiv
        )
    }

    pub fn is_comparison(self) -> bool {
        matches!(self, SymOp::Eq | SymOp::Lt | SymOp::Le | SymOp::Gt | SymOp::Ge)
    }
}

impl fmt::Display for SymOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SymOp::Add => "add",
            SymOp::Sub => "sub",
            SymOp::Mul => "mul",
            SymOp::Mod => "mod",
            SymOp::FloorDiv => "floordiv",
            SymOp::Eq => "eq",
            SymOp::Lt => "lt",
            SymOp::Le => "le",
            SymOp::Gt => "gt",
            SymOp::Ge => "ge",
            SymOp::Float => "float",
        };
        write!(f, "{}", name)
    }
}

/// The boxed representation handlers receive and return.
#[derive(Clone)]
pub enum SymScalar {
    Int(SymInt),
    Float(SymFloat),
    Bool(SymBool),
}

impl SymScalar {
    pub fn kind(&self) -> &'static str {
        match self {
            SymScalar::Int(_) => "int",
            SymScalar::Float(_) => "float",
            SymScalar::Bool(_) => "bool",
        }
    }

    pub fn into_int(self) -> Option<SymInt> {
        match self {
            SymScalar::Int(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_float(self) -> Option<SymFloat> {
        match self {
            SymScalar::Float(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_bool(self) -> Option<SymBool> {
        match self {
            SymScalar::Bool(value) => Some(value),
            _ => None,
        }
    }
}

/// An interception handler. The handler may perform further symbolic
/// operations; they are dispatched to the mode that was active when this
/// one was entered.
pub trait SymDispatch {
    fn dispatch(&self, op: SymOp, args: &[SymScalar]) -> SymScalar;
}

thread_local! {
    static ACTIVE: RefCell<Option<Rc<DispatchMode>>> = const { RefCell::new(None) };
}

/// A handler bound to the mode stack. Entering makes it the active mode
/// until the returned guard drops; a mode object can be entered at most
/// once over its lifetime.
pub struct DispatchMode {
    handler: Rc<dyn SymDispatch>,
    used: Cell<bool>,
    inner: RefCell<Option<Rc<DispatchMode>>>,
}

impl DispatchMode {
    pub fn new(handler: Rc<dyn SymDispatch>) -> Rc<DispatchMode> {
        Rc::new(DispatchMode {
            handler,
            used: Cell::new(false),
            inner: RefCell::new(None),
        })
    }

    pub fn enter(self: &Rc<Self>) -> Result<ModeGuard, ShapeError> {
        if self.used.replace(true) {
            return Err(ShapeError::ModeReused);
        }
        let prev = ACTIVE.with(|slot| slot.replace(Some(self.clone())));
        *self.inner.borrow_mut() = prev;
        debug!("entered sym dispatch mode");
        Ok(ModeGuard { mode: self.clone() })
    }
}

/// Restores the saved inner mode when dropped.
pub struct ModeGuard {
    mode: Rc<DispatchMode>,
}

impl Drop for ModeGuard {
    fn drop(&mut self) {
        let inner = self.mode.inner.borrow_mut().take();
        ACTIVE.with(|slot| *slot.borrow_mut() = inner);
        debug!("exited sym dispatch mode");
    }
}

pub(crate) fn active_mode() -> Option<Rc<DispatchMode>> {
    ACTIVE.with(|slot| slot.borrow().clone())
}

/// Invoke `mode`'s handler with the next-outer mode active for the
/// duration of the call, so the handler's own operations do not recurse
/// into it.
pub(crate) fn dispatch_via(
    mode: &Rc<DispatchMode>,
    op: SymOp,
    args: &[SymScalar],
) -> SymScalar {
    let inner = mode.inner.borrow().clone();
    ACTIVE.with(|slot| *slot.borrow_mut() = inner);
    let restore = RestoreActive { mode: mode.clone() };
    let result = mode.handler.dispatch(op, args);
    drop(restore);
    result
}

struct RestoreActive {
    mode: Rc<DispatchMode>,
}

impl Drop for RestoreActive {
    fn drop(&mut self) {
        ACTIVE.with(|slot| *slot.borrow_mut() = Some(self.mode.clone()));
    }
}
