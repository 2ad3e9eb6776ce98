//! Tracing symbolic shapes out of nested argument structures.

use std::rc::Rc;

use rustc_hash::FxHashMap;
use skein_algebra::Sym;

use crate::env::ShapeEnv;
use crate::scalar::SymSize;

/// The shape-relevant view of one tensor argument. Held behind `Rc`:
/// pointer identity is object identity, which is what alias detection
/// keys on.
#[derive(Debug)]
pub struct TensorMeta {
    shape: Vec<i64>,
}

impl TensorMeta {
    pub fn new(shape: Vec<i64>) -> Rc<TensorMeta> {
        Rc::new(TensorMeta { shape })
    }

    pub fn shape(&self) -> &[i64] {
        &self.shape
    }
}

/// An arbitrarily nested argument structure.
#[derive(Clone, Debug)]
pub enum Arg {
    Tensor(Rc<TensorMeta>),
    Scalar(i64),
    Nested(Vec<Arg>),
}

/// One flattened leaf of the traced structure: per-dimension sizes for a
/// tensor, or the untouched value for anything else.
#[derive(Clone, Debug)]
pub enum TracedArg {
    Shape(Vec<SymSize>),
    Scalar(i64),
}

impl TracedArg {
    pub fn as_shape(&self) -> Option<&[SymSize]> {
        match self {
            TracedArg::Shape(sizes) => Some(sizes),
            TracedArg::Scalar(_) => None,
        }
    }
}

impl ShapeEnv {
    /// Flatten `args` and mint one symbol per dimension of every tensor
    /// leaf; non-tensor leaves pass through unchanged.
    ///
    /// Two occurrences of the same tensor object reuse the same
    /// per-dimension scalars. Creating fresh symbols for an alias would
    /// silently desynchronize the guards from the real aliasing
    /// structure, so identity is tracked across the whole walk.
    pub fn create_shapes_for_args(&self, args: &[Arg]) -> Vec<TracedArg> {
        let mut out = Vec::new();
        let mut tensor_count = 0;
        let mut seen: Vec<(*const TensorMeta, Vec<SymSize>)> = Vec::new();
        self.walk_args(args, &mut tensor_count, &mut seen, &mut out);
        out
    }

    fn walk_args(
        &self,
        args: &[Arg],
        tensor_count: &mut usize,
        seen: &mut Vec<(*const TensorMeta, Vec<SymSize>)>,
        out: &mut Vec<TracedArg>,
    ) {
        for arg in args {
            match arg {
                Arg::Nested(inner) => self.walk_args(inner, tensor_count, seen, out),
                Arg::Scalar(value) => out.push(TracedArg::Scalar(*value)),
                Arg::Tensor(meta) => {
                    let ptr = Rc::as_ptr(meta);
                    if let Some((_, sizes)) = seen.iter().find(|(p, _)| *p == ptr) {
                        out.push(TracedArg::Shape(sizes.clone()));
                        continue;
                    }
                    let index = *tensor_count;
                    *tensor_count += 1;
                    let sizes: Vec<SymSize> = meta
                        .shape()
                        .iter()
                        .enumerate()
                        .map(|(dim, &size)| {
                            self.create_symint(&format!("s{}[{}]", index, dim), size)
                        })
                        .collect();
                    seen.push((ptr, sizes.clone()));
                    out.push(TracedArg::Shape(sizes));
                }
            }
        }
    }

    /// Check every logged guard against a fresh set of concrete
    /// arguments, re-deriving the symbol bindings by walking `args` in
    /// the same order tracing did. Used to decide whether a previously
    /// compiled artifact is still valid for new input sizes.
    ///
    /// A replay that is structurally incompatible with the trace (a guard
    /// fails to evaluate) reports `false` rather than an error.
    pub fn evaluate_guards_for_args(&self, args: &[Arg]) -> bool {
        let mut bindings: FxHashMap<String, i64> = FxHashMap::default();
        let mut tensor_count = 0;
        let mut seen: Vec<*const TensorMeta> = Vec::new();
        collect_bindings(args, &mut tensor_count, &mut seen, &mut bindings);
        let lookup = |sym: &Sym| bindings.get(sym.name()).copied();
        self.guards()
            .iter()
            .all(|guard| guard.expr.eval(&lookup).is_ok_and(|value| value == guard.value))
    }
}

fn collect_bindings(
    args: &[Arg],
    tensor_count: &mut usize,
    seen: &mut Vec<*const TensorMeta>,
    bindings: &mut FxHashMap<String, i64>,
) {
    for arg in args {
        match arg {
            Arg::Nested(inner) => collect_bindings(inner, tensor_count, seen, bindings),
            Arg::Scalar(_) => {}
            Arg::Tensor(meta) => {
                let ptr = Rc::as_ptr(meta);
                if seen.contains(&ptr) {
                    continue;
                }
                seen.push(ptr);
                let index = *tensor_count;
                *tensor_count += 1;
                for (dim, &size) in meta.shape().iter().enumerate() {
                    bindings.insert(format!("s{}[{}]", index, dim), size);
                }
            }
        }
    }
}

/// Contiguous row-major strides for a shape, computed symbolically: the
/// innermost dimension has stride 1, and each outer stride is the inner
/// stride times the inner dimension's size.
pub fn create_contiguous(shape: &[SymSize]) -> Vec<SymSize> {
    if shape.is_empty() {
        return Vec::new();
    }
    let mut strides = Vec::with_capacity(shape.len());
    let mut acc = SymSize::Static(1);
    strides.push(acc.clone());
    for dim in shape[1..].iter().rev() {
        acc = size_mul(dim, &acc);
        strides.push(acc.clone());
    }
    strides.reverse();
    strides
}

/// Symbolic element count: the product of the per-dimension sizes.
pub fn numel(shape: &[SymSize]) -> SymSize {
    let mut acc = SymSize::Static(1);
    for dim in shape {
        acc = size_mul(&acc, dim);
    }
    acc
}

fn size_mul(lhs: &SymSize, rhs: &SymSize) -> SymSize {
    match (lhs, rhs) {
        (SymSize::Static(l), SymSize::Static(r)) => SymSize::Static(l * r),
        (SymSize::Symbolic(l), SymSize::Static(r)) => SymSize::Symbolic(l * *r),
        (SymSize::Static(l), SymSize::Symbolic(r)) => SymSize::Symbolic(*l * r),
        (SymSize::Symbolic(l), SymSize::Symbolic(r)) => SymSize::Symbolic(l * r),
    }
}
