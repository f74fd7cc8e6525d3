//! Environment frames for lexical scoping and VM locals.
//!
//! A frame pairs a symbol array fixed at construction with value slots that
//! `set!` may update. Frames are shared: several closures can capture the
//! same chain, and a frame outlives the call that created it for as long as
//! any closure references it. Interior mutability on the slots makes a
//! `set!` through one closure visible through every sibling.

use std::{cell::RefCell, rc::Rc};

use crate::{package::Symbol, value::Value};

/// Compile-time coordinate of a local variable: `(frame_depth, slot_index)`.
///
/// Depth 0 is the innermost frame. A variable that is not local resolves
/// globally instead (`None` where the original design used `(-1, -1)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarPos {
    /// How many parent links to follow from the innermost frame.
    pub frame: usize,
    /// Index into that frame's slots.
    pub slot: usize,
}

/// One node in the environment chain.
#[derive(Debug)]
pub struct Env {
    symbols: Vec<Symbol>,
    values: RefCell<Vec<Value>>,
    parent: Option<Rc<Env>>,
}

impl Env {
    /// Creates a frame. `symbols` and `values` must be the same length.
    #[must_use]
    pub fn new(symbols: Vec<Symbol>, values: Vec<Value>, parent: Option<Rc<Self>>) -> Rc<Self> {
        debug_assert_eq!(symbols.len(), values.len());
        Rc::new(Self {
            symbols,
            values: RefCell::new(values),
            parent,
        })
    }

    /// Number of slots in this frame.
    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// True if the frame has no slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// The symbols bound by this frame, in slot order.
    #[must_use]
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    /// The parent frame, if any.
    #[must_use]
    pub fn parent(&self) -> Option<&Rc<Self>> {
        self.parent.as_ref()
    }

    /// Reads a slot. Returns `None` when the slot does not exist.
    #[must_use]
    pub fn get(&self, slot: usize) -> Option<Value> {
        self.values.borrow().get(slot).cloned()
    }

    /// Writes a slot. Returns `false` when the slot does not exist.
    pub fn set(&self, slot: usize, value: Value) -> bool {
        match self.values.borrow_mut().get_mut(slot) {
            Some(cell) => {
                *cell = value;
                true
            }
            None => false,
        }
    }

    /// Walks `depth` parent links from `env`.
    #[must_use]
    pub fn frame_at(env: &Rc<Self>, depth: usize) -> Option<Rc<Self>> {
        let mut frame = Rc::clone(env);
        for _ in 0..depth {
            frame = Rc::clone(frame.parent()?);
        }
        Some(frame)
    }

    /// Resolves a symbol against the chain; the innermost hit wins.
    #[must_use]
    pub fn lookup(env: &Rc<Self>, sym: &Symbol) -> Option<VarPos> {
        let mut frame = Some(Rc::clone(env));
        let mut depth = 0;
        while let Some(current) = frame {
            if let Some(slot) = current.symbols.iter().position(|s| s.ptr_eq(sym)) {
                return Some(VarPos { frame: depth, slot });
            }
            frame = current.parent().cloned();
            depth += 1;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::{PackageId, Packages};

    #[test]
    fn lookup_prefers_innermost_frame() {
        let mut packages = Packages::new();
        let x = packages.intern(PackageId::GLOBAL, "x");
        let y = packages.intern(PackageId::GLOBAL, "y");
        let outer = Env::new(vec![x.clone(), y.clone()], vec![Value::Int(1), Value::Int(2)], None);
        let inner = Env::new(vec![x.clone()], vec![Value::Int(10)], Some(Rc::clone(&outer)));

        assert_eq!(Env::lookup(&inner, &x), Some(VarPos { frame: 0, slot: 0 }));
        assert_eq!(Env::lookup(&inner, &y), Some(VarPos { frame: 1, slot: 1 }));
        let z = packages.intern(PackageId::GLOBAL, "z");
        assert_eq!(Env::lookup(&inner, &z), None);
    }

    #[test]
    fn set_is_visible_through_shared_frames() {
        let mut packages = Packages::new();
        let x = packages.intern(PackageId::GLOBAL, "x");
        let shared = Env::new(vec![x], vec![Value::Int(0)], None);
        let holder_a = Rc::clone(&shared);
        let holder_b = Rc::clone(&shared);
        holder_a.set(0, Value::Int(42));
        assert_eq!(holder_b.get(0), Some(Value::Int(42)));
    }
}
