use std::fmt;
use std::rc::Rc;

/// A named free variable standing for one unknown tensor dimension.
///
/// Symbols are assumed positive integers. Identity is the name: the
/// environment that mints symbols guarantees names are unique, so two
/// symbols with the same name are the same variable.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Sym {
    name: Rc<str>,
}

impl Sym {
    pub fn new(name: impl Into<Rc<str>>) -> Sym {
        Sym { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Sym {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl fmt::Debug for Sym {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}
