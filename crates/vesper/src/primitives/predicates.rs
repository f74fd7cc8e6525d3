//! Type and equality predicates.

use smallvec::SmallVec;

use super::{Arity, Primitive};
use crate::{context::Context, error::LanguageError, value::Value};

pub(crate) const DEFS: &[Primitive] = &[
    Primitive {
        name: "not",
        min_args: 1,
        arity: Arity::Exact,
        side_effects: false,
        func: prim_not,
    },
    Primitive {
        name: "null?",
        min_args: 1,
        arity: Arity::Exact,
        side_effects: false,
        func: prim_null,
    },
    Primitive {
        name: "cons?",
        min_args: 1,
        arity: Arity::Exact,
        side_effects: false,
        func: prim_cons,
    },
    Primitive {
        name: "atom?",
        min_args: 1,
        arity: Arity::Exact,
        side_effects: false,
        func: prim_atom,
    },
    Primitive {
        name: "list?",
        min_args: 1,
        arity: Arity::Exact,
        side_effects: false,
        func: prim_list,
    },
    Primitive {
        name: "string?",
        min_args: 1,
        arity: Arity::Exact,
        side_effects: false,
        func: prim_string,
    },
    Primitive {
        name: "number?",
        min_args: 1,
        arity: Arity::Exact,
        side_effects: false,
        func: prim_number,
    },
    Primitive {
        name: "boolean?",
        min_args: 1,
        arity: Arity::Exact,
        side_effects: false,
        func: prim_boolean,
    },
    Primitive {
        name: "symbol?",
        min_args: 1,
        arity: Arity::Exact,
        side_effects: false,
        func: prim_symbol,
    },
    Primitive {
        name: "eq?",
        min_args: 2,
        arity: Arity::Exact,
        side_effects: false,
        func: prim_eq,
    },
];

fn prim_not(_ctx: &mut Context, args: SmallVec<[Value; 4]>) -> Result<Value, LanguageError> {
    Ok(Value::Bool(!args[0].is_truthy()))
}

fn prim_null(_ctx: &mut Context, args: SmallVec<[Value; 4]>) -> Result<Value, LanguageError> {
    Ok(Value::Bool(matches!(args[0], Value::Nil)))
}

fn prim_cons(_ctx: &mut Context, args: SmallVec<[Value; 4]>) -> Result<Value, LanguageError> {
    Ok(Value::Bool(matches!(args[0], Value::Cons(_))))
}

fn prim_atom(_ctx: &mut Context, args: SmallVec<[Value; 4]>) -> Result<Value, LanguageError> {
    Ok(Value::Bool(!matches!(args[0], Value::Cons(_))))
}

fn prim_list(_ctx: &mut Context, args: SmallVec<[Value; 4]>) -> Result<Value, LanguageError> {
    Ok(Value::Bool(args[0].is_proper_list()))
}

fn prim_string(_ctx: &mut Context, args: SmallVec<[Value; 4]>) -> Result<Value, LanguageError> {
    Ok(Value::Bool(matches!(args[0], Value::Str(_))))
}

fn prim_number(_ctx: &mut Context, args: SmallVec<[Value; 4]>) -> Result<Value, LanguageError> {
    Ok(Value::Bool(matches!(args[0], Value::Int(_) | Value::Float(_))))
}

fn prim_boolean(_ctx: &mut Context, args: SmallVec<[Value; 4]>) -> Result<Value, LanguageError> {
    Ok(Value::Bool(matches!(args[0], Value::Bool(_))))
}

fn prim_symbol(_ctx: &mut Context, args: SmallVec<[Value; 4]>) -> Result<Value, LanguageError> {
    Ok(Value::Bool(matches!(args[0], Value::Symbol(_))))
}

/// The Value equality contract as a predicate: strings by content, numbers
/// by bit pattern within variant, reference types by identity.
fn prim_eq(_ctx: &mut Context, args: SmallVec<[Value; 4]>) -> Result<Value, LanguageError> {
    Ok(Value::Bool(args[0] == args[1]))
}
