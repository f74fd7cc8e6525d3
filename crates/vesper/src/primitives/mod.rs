//! Built-in functions callable from bytecode.
//!
//! A primitive is `(name, min_arity, kind, side_effects?, fn)`. Dispatch is
//! by `(name, argc)`: exact primitives match their arity exactly, varargs
//! match any `argc >= min`. Registration gives every primitive name a
//! synthetic one-instruction stub closure (`CALL_PRIMOP name; RETURN_VAL`)
//! bound to an exported symbol in the core package, so ordinary call paths
//! work uniformly.

mod lists;
mod math;
mod packages;
mod predicates;
mod reflection;
mod vectors;

use ahash::AHashMap;
use smallvec::SmallVec;

use crate::{
    bytecode::{CodeStore, Instruction, Opcode},
    context::Context,
    error::LanguageError,
    package::{PackageId, Packages},
    value::{Closure, Value},
};
use std::rc::Rc;

/// Signature of a primitive implementation. Arguments arrive in call order;
/// the returned value is pushed by CALL_PRIMOP.
pub type PrimitiveFn = fn(&mut Context, SmallVec<[Value; 4]>) -> Result<Value, LanguageError>;

/// How a primitive's declared arity is matched against a call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// `argc == min_args` required.
    Exact,
    /// `argc >= min_args` accepted.
    VarArgs,
}

/// Descriptor of one registered primitive.
#[derive(Debug, Clone, Copy)]
pub struct Primitive {
    /// Name bound in the core package.
    pub name: &'static str,
    /// Declared arity (exact count, or minimum for varargs).
    pub min_args: usize,
    /// Arity matching mode.
    pub arity: Arity,
    /// Whether calls can observe or change state beyond their arguments.
    /// Carried as metadata for embedders; globals are late-bound, so the
    /// compiler never folds primitive calls.
    pub side_effects: bool,
    /// The implementation.
    pub func: PrimitiveFn,
}

impl Primitive {
    /// Whether this primitive is free of side effects.
    #[must_use]
    pub fn has_side_effects(&self) -> bool {
        self.side_effects
    }

    fn accepts(&self, argc: usize) -> bool {
        match self.arity {
            Arity::Exact => argc == self.min_args,
            Arity::VarArgs => argc >= self.min_args,
        }
    }
}

/// Arity-dispatched registry of primitives.
#[derive(Debug)]
pub(crate) struct Primitives {
    table: AHashMap<&'static str, Vec<Primitive>>,
    /// Registration order, for deterministic stub seeding.
    names: Vec<&'static str>,
}

impl Primitives {
    /// Builds the standard registry.
    pub fn standard() -> Self {
        let mut registry = Self {
            table: AHashMap::new(),
            names: Vec::new(),
        };
        for family in [
            math::DEFS,
            lists::DEFS,
            predicates::DEFS,
            vectors::DEFS,
            reflection::DEFS,
            packages::DEFS,
        ] {
            for def in family {
                registry.add(*def);
            }
        }
        registry
    }

    fn add(&mut self, primitive: Primitive) {
        if !self.table.contains_key(primitive.name) {
            self.names.push(primitive.name);
        }
        self.table.entry(primitive.name).or_default().push(primitive);
    }

    /// Finds the primitive matching `(name, argc)`, if any. The same
    /// descriptor is returned whether the call arrives through a stub
    /// closure or a direct registry probe.
    #[must_use]
    pub fn lookup(&self, name: &str, argc: usize) -> Option<&Primitive> {
        self.table.get(name)?.iter().find(|p| p.accepts(argc))
    }

    /// Registered names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.names.iter().copied()
    }

    /// Seeds the core package: one exported symbol per primitive name, bound
    /// to a stub closure whose block is `CALL_PRIMOP name; RETURN_VAL`.
    pub fn install(&self, packages: &mut Packages, code: &mut CodeStore) {
        for name in self.names() {
            let handle = code.register(
                vec![
                    Instruction::unary(Opcode::CallPrimop, Value::string(name)),
                    Instruction::nullary(Opcode::ReturnVal),
                ],
                format!("primitive {name}"),
            );
            let stub = Closure::new(handle, None, Value::Nil, Some(Rc::from(name)));
            let sym = packages.intern(PackageId::CORE, name);
            sym.set_exported(true);
            packages.set_value(&sym, Value::Closure(stub));
        }
    }
}

/// Type-checking helpers shared by the primitive families.
pub(crate) mod support {
    use super::{LanguageError, Value};

    pub fn want_int(value: &Value) -> Result<i32, LanguageError> {
        match value {
            Value::Int(i) => Ok(*i),
            _ => Err(mismatch("int", value)),
        }
    }

    pub fn want_string(value: &Value) -> Result<std::rc::Rc<str>, LanguageError> {
        match value {
            Value::Str(s) => Ok(std::rc::Rc::clone(s)),
            _ => Err(mismatch("string", value)),
        }
    }

    pub fn want_symbol(value: &Value) -> Result<crate::package::Symbol, LanguageError> {
        match value {
            Value::Symbol(s) => Ok(s.clone()),
            _ => Err(mismatch("symbol", value)),
        }
    }

    pub fn want_closure(value: &Value) -> Result<crate::value::Closure, LanguageError> {
        match value {
            Value::Closure(c) => Ok(c.clone()),
            _ => Err(mismatch("closure", value)),
        }
    }

    pub fn want_list_items(value: &Value) -> Result<Vec<Value>, LanguageError> {
        value.proper_list_items().ok_or_else(|| mismatch("proper list", value))
    }

    pub fn mismatch(expected: &'static str, got: &Value) -> LanguageError {
        LanguageError::TypeMismatch {
            expected,
            got: got.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_matches_exact_and_varargs() {
        let registry = Primitives::standard();
        assert!(registry.lookup("car", 1).is_some());
        assert!(registry.lookup("car", 2).is_none());
        assert!(registry.lookup("+", 2).is_some());
        assert!(registry.lookup("+", 5).is_some());
        assert!(registry.lookup("+", 1).is_none());
        assert!(registry.lookup("no-such-primitive", 1).is_none());
    }

    #[test]
    fn dispatcher_returns_the_same_instance_for_any_path() {
        let registry = Primitives::standard();
        let a = registry.lookup("cons", 2).expect("cons is registered");
        let b = registry.lookup("cons", 2).expect("cons is registered");
        assert_eq!(a.name, b.name);
        assert!(std::ptr::fn_addr_eq(a.func, b.func));
    }

    #[test]
    fn purity_metadata() {
        let registry = Primitives::standard();
        assert!(!registry.lookup("+", 2).expect("registered").has_side_effects());
        assert!(registry.lookup("trace", 0).expect("registered").has_side_effects());
        assert!(registry.lookup("vector-set!", 3).expect("registered").has_side_effects());
    }
}
